use crate::Config;
use crate::job::{Job, JobResult, JobSetManager, WatermarkJob};
use crate::placement::WatermarkSpec;
use crate::render::Renderer;
use crate::stream_map::StreamMap;
use crate::telegram::TelegramClient;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use futures::channel::mpsc::{UnboundedReceiver, UnboundedSender, unbounded};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};

const JOBS_DIR: &str = "jobs";

async fn init_workspace(workspace: &Path) -> std::io::Result<()> {
    tokio::fs::create_dir_all(workspace.join(JOBS_DIR)).await
}

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub labels: Arc<[WatermarkSpec]>,
    pub telegram: TelegramClient,
    pub renderer: Arc<Renderer>,
    pub job_tx: UnboundedSender<WatermarkJob>,
    pub jobs_manager: JobSetManager<WatermarkJob>,
    pub jobs_dir: PathBuf,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        let workspace = PathBuf::from(&config.workspace);
        init_workspace(&workspace).await?;
        let (tx, rx) = unbounded();

        let jobs_manager = JobSetManager::new(&workspace, &tx)?;
        let telegram = TelegramClient::new(&config.api_url, config.bot_token())?;
        let renderer = Renderer::from_config(&config);
        let permits = config.permits;

        let this = Self {
            labels: config.labels().into(),
            config: Arc::new(config),
            telegram,
            renderer: Arc::new(renderer),
            job_tx: tx,
            jobs_manager,
            jobs_dir: workspace.join(JOBS_DIR),
            started_at: Utc::now(),
        };

        this.handle_jobs(rx, permits);
        Ok(this)
    }

    pub fn job_dir(&self, job_id: &str) -> PathBuf {
        self.jobs_dir.join(job_id)
    }

    /// Track and queue a job. Returns `false` if the same job is already pending.
    pub async fn submit(&self, job: WatermarkJob) -> bool {
        if !self.jobs_manager.add(&job).await {
            return false;
        }
        _ = self.job_tx.unbounded_send(job);
        true
    }

    fn handle_jobs(&self, rx: UnboundedReceiver<WatermarkJob>, permits: usize) {
        info!(permits, "Job handler started");
        let this = self.clone();
        let semaphore = Arc::new(Semaphore::new(permits));

        tokio::spawn(async move {
            let mut rx = rx.fuse();
            let mut jobs: StreamMap<'static, String, JobResult<WatermarkJob>> =
                StreamMap::default();

            loop {
                debug!("Waiting for job");
                futures::select! {
                    maybe_job = rx.next() => {
                        let Some(job) = maybe_job else {
                            error!("Job queue closed, job handler finished");
                            break;
                        };

                        let kind = job.kind();
                        let job_id = job.id().to_string();

                        let this_c = this.clone();
                        let semaphore_c = semaphore.clone();
                        let task = async move { job.gen_task(this_c, semaphore_c).await };
                        if !jobs.add_if_not_in_progress(job_id.clone(), Box::pin(task)) {
                            warn!(job_id, "Job already in-progress, skipping");
                            continue;
                        }

                        info!(job_id, kind, "Job added to processing queue");
                    }
                    (id, result) = jobs.select_next_some() => {
                        match result {
                            JobResult::Done => {
                                info!(id, "Job completed successfully");
                                this.jobs_manager.remove(&id).await;
                            },
                            JobResult::Retry(job) => {
                                warn!(job_id = %job.id(), "Retrying job");
                                _ = this.job_tx.unbounded_send(job);
                            },
                            JobResult::Err(failure_job) => {
                                info!(id, "Job failed with failure handling");
                                failure_job.execute_actions(&this).await;
                            },
                        }
                    }
                }
            }

            debug!("Job handler finished");
        });
    }
}
