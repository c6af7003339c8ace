pub mod manager;
pub mod watermark;

use crate::app_state::AppState;
use std::{sync::Arc, time::Duration};
use tokio::sync::Semaphore as TokioSemaphore;
use tokio::task::JoinHandle as TokioJoinHandle;
use tracing::{debug, error, info, warn};

pub use manager::JobSetManager;
pub use watermark::{JobError, WatermarkJob};

pub type JobKind = &'static str;
pub const WATERMARK_KIND: JobKind = "watermark";

pub enum JobResult<J: Job> {
    Done,
    Retry(J),
    Err(FailureJob),
}

impl<J: Job> JobResult<J> {
    pub fn is_retry(&self) -> bool {
        matches!(self, JobResult::Retry(_))
    }
}

pub trait Job: Clone + Sized + Send + Sync + 'static {
    fn kind(&self) -> JobKind;

    fn need_permit(&self) -> bool {
        false
    }

    fn id(&self) -> &str;

    fn gen_job(&self, state: AppState) -> TokioJoinHandle<anyhow::Result<()>>;

    fn wait_for_retry(&self, _state: &AppState, _error: &anyhow::Error) -> Option<Duration> {
        None
    }

    fn on_final_failure(&self, error: &anyhow::Error) -> FailureJob;

    fn gen_task(
        &self,
        state: AppState,
        semaphore: Arc<TokioSemaphore>,
    ) -> impl Future<Output = JobResult<Self>> + Send {
        async move {
            let job = self.clone();
            let job_id = job.id().to_string();
            let kind = job.kind();
            debug!(job_id, kind, "job wait for permit");

            let permit = if self.need_permit() {
                semaphore.acquire_owned().await.ok()
            } else {
                None
            };

            info!(job_id, kind, "job started");
            let result = self.gen_job(state.clone()).await;
            // the back-off below must not hold a render slot
            drop(permit);

            let error = match result {
                Ok(Ok(())) => return JobResult::Done,
                Ok(Err(error)) => error,
                Err(join_error) => anyhow::Error::new(join_error),
            };

            if let Some(retry_interval) = self.wait_for_retry(&state, &error) {
                warn!(?error, %job_id, kind, "Job process failed, wait for retry");
                tokio::time::sleep(retry_interval).await;
                JobResult::Retry(job)
            } else {
                error!(?error, job_id, kind, "Job final failure");
                JobResult::Err(self.on_final_failure(&error))
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Action {
    /// Remove the job's working directory.
    Cleanup,
    /// Tell the requesting chat what went wrong.
    Notify { chat_id: i64, message: String },
}

impl Action {
    async fn execute_action(action: Action, state: &AppState, job_id: &str, kind: JobKind) {
        match action {
            Action::Cleanup => {
                info!(job_id, kind, "Performing cleanup");
                let dir = state.job_dir(job_id);
                if let Err(error) = tokio::fs::remove_dir_all(&dir).await
                    && error.kind() != std::io::ErrorKind::NotFound
                {
                    warn!(job_id, ?dir, %error, "Failed to remove job directory");
                }
            }
            Action::Notify { chat_id, message } => {
                info!(job_id, kind, chat_id, message, "Notifying chat of failure");
                if let Err(error) = state.telegram.send_message(chat_id, &message).await {
                    error!(job_id, chat_id, %error, "Failed to send failure notice");
                }
            }
        }
    }
}

#[derive(Clone, Debug)]
pub struct FailureJob {
    pub job_id: String,
    pub kind: JobKind,
    pub actions: Vec<Action>,
}

impl FailureJob {
    pub fn new(job_id: String, kind: JobKind, actions: Vec<Action>) -> Self {
        Self {
            job_id,
            kind,
            actions,
        }
    }

    pub async fn execute_actions(self, state: &AppState) {
        state.jobs_manager.remove(&self.job_id).await;
        for action in self.actions {
            Action::execute_action(action, state, &self.job_id, self.kind).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Config;
    use crate::telegram::VideoAttachment;
    use std::sync::atomic::Ordering;

    #[tokio::test]
    async fn test_backoff_releases_permit() {
        // nothing listens here, so every download fails with a connect error
        let port = portpicker::pick_unused_port().expect("No available port");
        let workspace = std::env::temp_dir().join(format!("wm-permit-{}", uuid::Uuid::new_v4()));
        let config = Config {
            bot_token: Some("123:abc".to_string()),
            api_url: format!("http://127.0.0.1:{port}"),
            workspace: workspace.to_string_lossy().into_owned(),
            retry_interval_secs: 30,
            ..Default::default()
        };
        let state = AppState::new(config).await.unwrap();

        let job = WatermarkJob::new(
            7,
            &VideoAttachment {
                file_id: "file".to_string(),
                file_unique_id: "unique".to_string(),
                file_name: None,
                file_size: None,
            },
        );
        let retry_times = job.retry_times.clone();
        let semaphore = Arc::new(TokioSemaphore::new(1));

        let semaphore_c = semaphore.clone();
        let task = tokio::spawn(async move { job.gen_task(state, semaphore_c).await.is_retry() });

        let mut waited = 0;
        while retry_times.load(Ordering::Acquire) == 0 && waited < 100 {
            tokio::time::sleep(Duration::from_millis(50)).await;
            waited += 1;
        }
        assert_eq!(retry_times.load(Ordering::Acquire), 1);
        assert!(!task.is_finished());
        assert_eq!(semaphore.available_permits(), 1);

        task.abort();
        _ = std::fs::remove_dir_all(&workspace);
    }
}
