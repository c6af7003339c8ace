use crate::app_state::AppState;
use crate::job::{Action, FailureJob, Job, JobKind, WATERMARK_KIND};
use crate::placement::build_overlay_set;
use crate::probe::probe_or_fallback;
use crate::render::RenderError;
use crate::telegram::{TelegramError, VideoAttachment, messages};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle as TokioJoinHandle;
use tracing::{info, warn};

const INPUT_FILE: &str = "input";
const OUTPUT_FILE: &str = "output.mp4";
const PART_SUFFIX: &str = "part";

#[derive(Debug, Error)]
pub enum JobError {
    #[error("download failed: {0}")]
    Download(#[source] TelegramError),

    #[error("render failed: {0}")]
    Render(#[from] RenderError),

    #[error("upload failed: {0}")]
    Upload(#[source] TelegramError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl JobError {
    fn is_transient(&self) -> bool {
        match self {
            JobError::Download(error) | JobError::Upload(error) => error.is_transient(),
            JobError::Render(_) | JobError::Io(_) => false,
        }
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            JobError::Download(error) | JobError::Upload(error) => error.retry_after(),
            _ => None,
        }
    }

    fn user_message(&self) -> &'static str {
        match self {
            JobError::Download(_) => messages::ERROR_DOWNLOAD,
            JobError::Render(_) => messages::ERROR_PROCESSING,
            JobError::Upload(_) => messages::ERROR_UPLOAD,
            JobError::Io(_) => messages::ERROR_GENERAL,
        }
    }
}

/// Download a video from the chat, burn the watermarks in and send it back.
///
/// Stages write to `*.part` files and rename on success, so a retried or
/// resumed job skips whatever already finished.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct WatermarkJob {
    pub id: String,
    pub chat_id: i64,
    pub file_id: String,
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,

    #[serde(default)]
    #[serde(skip)]
    pub retry_times: Arc<AtomicU8>,
}

impl WatermarkJob {
    pub fn new(chat_id: i64, attachment: &VideoAttachment) -> Self {
        Self {
            id: format!("{chat_id}_{}", attachment.file_unique_id),
            chat_id,
            file_id: attachment.file_id.clone(),
            file_name: attachment.file_name.clone(),
            retry_times: Arc::new(AtomicU8::new(0)),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Name of the file sent back to the chat.
    pub fn output_name(&self) -> String {
        let stem = self
            .file_name
            .as_deref()
            .map(Path::new)
            .and_then(Path::file_stem)
            .and_then(|stem| stem.to_str())
            .filter(|stem| !stem.is_empty())
            .unwrap_or("video");
        format!("watermarked_{stem}.mp4")
    }

    async fn download(&self, state: &AppState, input: &Path) -> Result<(), JobError> {
        if tokio::fs::try_exists(input).await? {
            info!(job_id = self.id(), "Input already downloaded");
            return Ok(());
        }

        let part = input.with_extension(PART_SUFFIX);
        state
            .telegram
            .download_file(&self.file_id, &part)
            .await
            .map_err(JobError::Download)?;
        tokio::fs::rename(&part, input).await?;
        Ok(())
    }

    async fn render(
        &self,
        state: &AppState,
        input: &Path,
        output: &Path,
    ) -> Result<(), JobError> {
        if tokio::fs::try_exists(output).await? {
            info!(job_id = self.id(), "Output already rendered");
            return Ok(());
        }

        let geometry = probe_or_fallback(self.id(), input).await;
        let overlays = build_overlay_set(&geometry, &state.labels);
        let font_size = geometry.font_size();
        info!(
            job_id = self.id(),
            width = geometry.width(),
            height = geometry.height(),
            font_size,
            "Processing video"
        );
        if font_size >= geometry.min_dimension() {
            warn!(
                job_id = self.id(),
                font_size,
                min_dimension = geometry.min_dimension(),
                "Font is not smaller than the frame, watermark may be cut off"
            );
        }

        let part = output.with_extension(PART_SUFFIX);
        let result = state
            .renderer
            .render(self.id(), input, &part, &overlays)
            .await;
        if let Err(error) = result {
            _ = tokio::fs::remove_file(&part).await;
            return Err(error.into());
        }
        tokio::fs::rename(&part, output).await?;
        Ok(())
    }

    async fn process(&self, state: &AppState) -> Result<(), JobError> {
        let dir = state.job_dir(self.id());
        tokio::fs::create_dir_all(&dir).await?;
        let input = dir.join(INPUT_FILE);
        let output = dir.join(OUTPUT_FILE);

        self.download(state, &input).await?;
        self.render(state, &input, &output).await?;

        notify(state, self.chat_id, messages::UPLOADING).await;
        state
            .telegram
            .send_video(self.chat_id, &output, &self.output_name())
            .await
            .map_err(JobError::Upload)?;
        notify(state, self.chat_id, messages::COMPLETE).await;

        if let Err(error) = tokio::fs::remove_dir_all(&dir).await {
            warn!(job_id = self.id(), ?dir, %error, "Failed to remove job directory");
        }
        Ok(())
    }
}

async fn notify(state: &AppState, chat_id: i64, text: &str) {
    if let Err(error) = state.telegram.send_message(chat_id, text).await {
        warn!(chat_id, %error, "Failed to send status message");
    }
}

impl Job for WatermarkJob {
    fn kind(&self) -> JobKind {
        WATERMARK_KIND
    }

    fn need_permit(&self) -> bool {
        true
    }

    fn id(&self) -> &str {
        &self.id
    }

    fn gen_job(&self, state: AppState) -> TokioJoinHandle<anyhow::Result<()>> {
        let job = self.clone();
        tokio::spawn(async move {
            job.process(&state).await?;
            info!(job_id = job.id(), chat_id = job.chat_id, "Watermark job completed");
            Ok(())
        })
    }

    fn wait_for_retry(&self, state: &AppState, error: &anyhow::Error) -> Option<Duration> {
        let error = error.downcast_ref::<JobError>()?;
        if !error.is_transient() {
            return None;
        }

        let retry_times = self.retry_times.load(Ordering::Acquire);
        if retry_times < state.config.max_retries {
            self.retry_times.store(retry_times + 1, Ordering::Release);
            Some(error.retry_after().unwrap_or(state.config.retry_interval()))
        } else {
            None
        }
    }

    fn on_final_failure(&self, error: &anyhow::Error) -> FailureJob {
        let message = error
            .downcast_ref::<JobError>()
            .map_or(messages::ERROR_GENERAL, JobError::user_message);
        FailureJob::new(
            self.id.clone(),
            self.kind(),
            vec![
                Action::Cleanup,
                Action::Notify {
                    chat_id: self.chat_id,
                    message: message.to_string(),
                },
            ],
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Config;
    use std::path::PathBuf;

    fn attachment(file_name: Option<&str>) -> VideoAttachment {
        VideoAttachment {
            file_id: "BAACAgIAAxkBAAIB".to_string(),
            file_unique_id: "AgADxx".to_string(),
            file_name: file_name.map(str::to_string),
            file_size: Some(10 * 1024 * 1024),
        }
    }

    async fn test_state() -> (AppState, PathBuf) {
        let workspace = std::env::temp_dir().join(format!("wm-job-{}", uuid::Uuid::new_v4()));
        let config = Config {
            bot_token: Some("123:abc".to_string()),
            workspace: workspace.to_string_lossy().into_owned(),
            max_retries: 2,
            retry_interval_secs: 1,
            ..Default::default()
        };
        let state = AppState::new(config).await.unwrap();
        (state, workspace)
    }

    fn rate_limited() -> anyhow::Error {
        JobError::Download(TelegramError::Api {
            code: Some(429),
            description: "Too Many Requests".to_string(),
            retry_after: Some(7),
        })
        .into()
    }

    #[test]
    fn test_job_id_and_output_name() {
        let job = WatermarkJob::new(-100123, &attachment(Some("holiday clip.mov")));
        assert_eq!(job.id(), "-100123_AgADxx");
        assert_eq!(job.output_name(), "watermarked_holiday clip.mp4");

        let unnamed = WatermarkJob::new(7, &attachment(None));
        assert_eq!(unnamed.output_name(), "watermarked_video.mp4");
    }

    #[test]
    fn test_retry_counter_not_persisted() {
        let job = WatermarkJob::new(7, &attachment(None));
        job.retry_times.store(2, Ordering::Release);

        let json = serde_json::to_string(&job).unwrap();
        assert!(!json.contains("retry_times"));
        assert!(!json.contains("file_name"));

        let restored: WatermarkJob = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.id(), job.id());
        assert_eq!(restored.retry_times.load(Ordering::Acquire), 0);
    }

    #[test]
    fn test_error_classification() {
        let render = JobError::from(RenderError::Spawn(std::io::Error::other("missing")));
        assert!(!render.is_transient());
        assert_eq!(render.user_message(), messages::ERROR_PROCESSING);

        let missing_path = JobError::Download(TelegramError::MissingFilePath);
        assert!(!missing_path.is_transient());
        assert_eq!(missing_path.user_message(), messages::ERROR_DOWNLOAD);

        let throttled = JobError::Upload(TelegramError::Api {
            code: Some(429),
            description: "Too Many Requests".to_string(),
            retry_after: Some(3),
        });
        assert!(throttled.is_transient());
        assert_eq!(throttled.retry_after(), Some(Duration::from_secs(3)));
        assert_eq!(throttled.user_message(), messages::ERROR_UPLOAD);
    }

    #[tokio::test]
    async fn test_retry_budget() {
        let (state, workspace) = test_state().await;
        let job = WatermarkJob::new(7, &attachment(None));

        let error = rate_limited();
        assert_eq!(job.wait_for_retry(&state, &error), Some(Duration::from_secs(7)));
        assert_eq!(job.wait_for_retry(&state, &error), Some(Duration::from_secs(7)));
        assert_eq!(job.wait_for_retry(&state, &error), None);

        let fresh = WatermarkJob::new(8, &attachment(None));
        let render: anyhow::Error =
            JobError::from(RenderError::Spawn(std::io::Error::other("missing"))).into();
        assert_eq!(fresh.wait_for_retry(&state, &render), None);

        let io: anyhow::Error = JobError::Download(TelegramError::Io(std::io::Error::other(
            "connection reset",
        )))
        .into();
        assert_eq!(fresh.wait_for_retry(&state, &io), Some(Duration::from_secs(1)));

        _ = std::fs::remove_dir_all(&workspace);
    }

    #[test]
    fn test_final_failure_actions() {
        let job = WatermarkJob::new(7, &attachment(None));
        let error: anyhow::Error =
            JobError::from(RenderError::Spawn(std::io::Error::other("missing"))).into();

        let failure = job.on_final_failure(&error);
        assert_eq!(failure.job_id, "7_AgADxx");
        assert_eq!(failure.kind, WATERMARK_KIND);
        assert_eq!(
            failure.actions,
            vec![
                Action::Cleanup,
                Action::Notify {
                    chat_id: 7,
                    message: messages::ERROR_PROCESSING.to_string(),
                },
            ]
        );

        let unknown = job.on_final_failure(&anyhow::anyhow!("boom"));
        assert!(matches!(
            &unknown.actions[1],
            Action::Notify { message, .. } if message == messages::ERROR_GENERAL
        ));
    }
}
