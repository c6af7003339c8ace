use crate::app_state::AppState;
use crate::job::WatermarkJob;
use crate::placement::WatermarkSpec;
use crate::telegram::messages;
use crate::telegram::types::{Command, Intent, Message, VideoAttachment};
use std::time::Duration;
use tracing::{debug, error, info, warn};

const POLL_BACKOFF: Duration = Duration::from_secs(5);

/// What to do with an inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Text(String),
    Enqueue(VideoAttachment),
}

pub fn plan_reply(intent: Intent, max_file_size: u64, labels: &[WatermarkSpec]) -> Reply {
    match intent {
        Intent::Command(Command::Start) => Reply::Text(messages::welcome(max_file_size, labels)),
        Intent::Command(Command::Help) => Reply::Text(messages::help(max_file_size, labels)),
        Intent::NotVideo => Reply::Text(messages::NOT_VIDEO.to_string()),
        Intent::Video(video) if video.file_size.is_some_and(|size| size > max_file_size) => {
            Reply::Text(messages::file_too_large(max_file_size))
        }
        Intent::Video(video) => Reply::Enqueue(video),
    }
}

/// Handle one inbound message.
pub async fn dispatch(state: &AppState, message: &Message) {
    let chat_id = message.chat.id;
    let video = match plan_reply(message.intent(), state.config.max_file_size, &state.labels) {
        Reply::Text(text) => return reply(state, chat_id, &text).await,
        Reply::Enqueue(video) => video,
    };

    info!(
        chat_id,
        file_id = %video.file_id,
        file_size = ?video.file_size,
        "Received video"
    );
    let job = WatermarkJob::new(chat_id, &video);
    if state.jobs_manager.contains(job.id()).await {
        return reply(state, chat_id, messages::ALREADY_QUEUED).await;
    }

    // acknowledge first so no job notice can overtake it
    reply(state, chat_id, messages::PROCESSING).await;
    if !state.submit(job).await {
        warn!(chat_id, file_id = %video.file_id, "Job queued concurrently, skipping");
    }
}

async fn reply(state: &AppState, chat_id: i64, text: &str) {
    if let Err(error) = state.telegram.send_message(chat_id, text).await {
        warn!(chat_id, %error, "Failed to reply");
    }
}

/// Long-poll the Bot API forever, dispatching every message received.
pub async fn run_polling(state: AppState) {
    let timeout = state.config.poll_timeout();
    let mut offset: Option<i64> = None;
    info!(timeout_secs = timeout.as_secs(), "Bot polling started");

    loop {
        let updates = match state.telegram.get_updates(offset, timeout).await {
            Ok(updates) => updates,
            Err(error) => {
                let wait = error.retry_after().unwrap_or(POLL_BACKOFF);
                error!(%error, wait_secs = wait.as_secs(), "Failed to fetch updates");
                tokio::time::sleep(wait).await;
                continue;
            }
        };

        for update in updates {
            debug!(update_id = update.update_id, "Received update");
            offset = Some(update.update_id + 1);
            if let Some(message) = &update.message {
                dispatch(&state, message).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::placement::Anchor;

    const MAX: u64 = 150 * 1024 * 1024;

    fn video(size: Option<u64>) -> VideoAttachment {
        VideoAttachment {
            file_id: "f".to_string(),
            file_unique_id: "u".to_string(),
            file_name: None,
            file_size: size,
        }
    }

    #[test]
    fn test_plan_reply() {
        let labels = [WatermarkSpec::new("TG @x", Anchor::BottomRight)];

        let Reply::Text(text) = plan_reply(Intent::Command(Command::Start), MAX, &labels) else {
            panic!("expected text reply");
        };
        assert!(text.contains("150MB"));
        assert!(text.contains("TG @x"));

        assert_eq!(
            plan_reply(Intent::NotVideo, MAX, &labels),
            Reply::Text(messages::NOT_VIDEO.to_string())
        );
        assert_eq!(
            plan_reply(Intent::Video(video(Some(MAX + 1))), MAX, &labels),
            Reply::Text(messages::file_too_large(MAX))
        );
        assert_eq!(
            plan_reply(Intent::Video(video(Some(MAX))), MAX, &labels),
            Reply::Enqueue(video(Some(MAX)))
        );
        assert_eq!(
            plan_reply(Intent::Video(video(None)), MAX, &labels),
            Reply::Enqueue(video(None))
        );
    }
}
