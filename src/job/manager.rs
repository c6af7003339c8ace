use crate::job::Job;
use futures::channel::mpsc::UnboundedSender;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex as TokioMutex;
use tracing::{error, info, warn};

const PENDING_FILE: &str = "pending-jobs.json";

/// Tracks queued and running jobs, persisted so a restart resumes them.
#[derive(Debug, Clone)]
pub struct JobSetManager<J> {
    path: PathBuf,
    pub jobs: Arc<TokioMutex<Vec<J>>>,
}

impl<J> JobSetManager<J>
where
    J: Job + Serialize + DeserializeOwned,
{
    /// Loads pending jobs from the workspace and queues them on `tx`.
    pub fn new(workspace: &Path, tx: &UnboundedSender<J>) -> anyhow::Result<Self> {
        let path = workspace.join(PENDING_FILE);
        let jobs: Vec<J> = if path.exists() {
            let content = fs::read_to_string(&path)?;
            serde_json::from_str(&content)
                .inspect_err(|error| {
                    warn!(?error, ?path, "Failed to parse job file.");
                })
                .unwrap_or_default()
        } else {
            Vec::new()
        };

        info!(
            count = jobs.len(),
            file = %path.display(),
            "Initialize job manager"
        );

        for job in jobs.iter() {
            info!(job_id = %job.id(), kind = %job.kind(), "Loading pending job");
            _ = tx.unbounded_send(job.clone());
        }

        Ok(Self {
            path,
            jobs: Arc::new(TokioMutex::new(jobs)),
        })
    }

    async fn save(&self, jobs: &[J]) -> anyhow::Result<()> {
        let content = serde_json::to_string(jobs)?;
        tracing::debug!(path = %self.path.display(), "Saving jobs to file");

        // write then rename so a crash never leaves a truncated file
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, content).await?;
        Ok(tokio::fs::rename(&tmp, &self.path).await?)
    }

    /// Adds a job unless one with the same id is already tracked.
    /// Returns whether the job was added.
    pub async fn add(&self, job: &J) -> bool {
        let kind = job.kind();
        tracing::debug!(id = %job.id(), kind, "Adding job");
        let mut jobs = self.jobs.lock().await;

        if jobs.iter().any(|j| j.id() == job.id()) {
            return false;
        }
        jobs.push(job.clone());

        if let Err(error) = self.save(&jobs).await {
            error!(?kind, ?error, "Failed to save jobs file after adding a job");
        }
        true
    }

    /// Removes a job from the set by its ID and persists the change.
    pub async fn remove(&self, id: &str) {
        tracing::debug!(id, "Removing job");
        let mut jobs = self.jobs.lock().await;
        jobs.retain(|j| j.id() != id);

        if let Err(error) = self.save(&jobs).await {
            error!(id, ?error, "Failed to save jobs file after removing a job");
        }
    }

    pub async fn contains(&self, id: &str) -> bool {
        self.jobs.lock().await.iter().any(|j| j.id() == id)
    }

    pub async fn len(&self) -> usize {
        self.jobs.lock().await.len()
    }
}
