use super::types::{ApiResponse, File, SendMessage, Update};
use futures::StreamExt;
use reqwest::multipart::{Form, Part};
use serde::de::DeserializeOwned;
use std::fmt;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tokio::io::AsyncWriteExt as _;
use tokio_util::io::ReaderStream;
use tracing::{debug, info};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const TRANSFER_TIMEOUT: Duration = Duration::from_secs(600);

#[derive(Debug, Error)]
pub enum TelegramError {
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("telegram api error {code:?}: {description}")]
    Api {
        code: Option<u16>,
        description: String,
        retry_after: Option<u64>,
    },

    #[error("file has no download path")]
    MissingFilePath,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl TelegramError {
    /// Whether retrying the same request later may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            TelegramError::Http(error) => match error.status() {
                Some(status) => status.is_server_error() || status.as_u16() == 429,
                // decode failures repeat on retry, only transport errors count
                None => {
                    error.is_timeout()
                        || error.is_connect()
                        || error.is_request()
                        || error.is_body()
                }
            },
            TelegramError::Api { code, .. } => matches!(code, Some(429) | Some(500..)),
            TelegramError::MissingFilePath => false,
            TelegramError::Io(_) => true,
        }
    }

    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            TelegramError::Api { retry_after, .. } => retry_after.map(Duration::from_secs),
            _ => None,
        }
    }
}

/// Minimal Bot API client covering what the bot needs.
#[derive(Clone)]
pub struct TelegramClient {
    http: reqwest::Client,
    api_url: String,
    token: String,
}

// The token is part of every URL, keep it out of logs.
impl fmt::Debug for TelegramClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TelegramClient")
            .field("api_url", &self.api_url)
            .finish_non_exhaustive()
    }
}

impl TelegramClient {
    pub fn new(api_url: &str, token: &str) -> Result<Self, TelegramError> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            http,
            api_url: api_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
        })
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{method}", self.api_url, self.token)
    }

    fn file_url(&self, file_path: &str) -> String {
        format!("{}/file/bot{}/{file_path}", self.api_url, self.token)
    }

    async fn parse<T>(response: reqwest::Response) -> Result<T, TelegramError>
    where
        T: DeserializeOwned,
    {
        let status = response.status();
        // error bodies carry the api description, so parse before checking status
        let body: ApiResponse<T> = match response.json().await {
            Ok(body) => body,
            Err(error) if status.is_success() => return Err(error.into()),
            Err(_) => {
                return Err(TelegramError::Api {
                    code: Some(status.as_u16()),
                    description: status.to_string(),
                    retry_after: None,
                });
            }
        };

        match body {
            ApiResponse {
                ok: true,
                result: Some(result),
                ..
            } => Ok(result),
            ApiResponse {
                error_code,
                description,
                parameters,
                ..
            } => Err(TelegramError::Api {
                code: error_code.or(Some(status.as_u16())),
                description: description.unwrap_or_else(|| "missing result".to_string()),
                retry_after: parameters.and_then(|p| p.retry_after),
            }),
        }
    }

    /// Long-poll for updates after `offset`.
    pub async fn get_updates(
        &self,
        offset: Option<i64>,
        timeout: Duration,
    ) -> Result<Vec<Update>, TelegramError> {
        let mut query = vec![
            ("timeout", timeout.as_secs().to_string()),
            ("allowed_updates", r#"["message"]"#.to_string()),
        ];
        if let Some(offset) = offset {
            query.push(("offset", offset.to_string()));
        }

        let response = self
            .http
            .get(self.method_url("getUpdates"))
            .query(&query)
            .timeout(timeout + REQUEST_TIMEOUT)
            .send()
            .await?;
        Self::parse(response).await
    }

    pub async fn send_message(&self, chat_id: i64, text: &str) -> Result<(), TelegramError> {
        let response = self
            .http
            .post(self.method_url("sendMessage"))
            .json(&SendMessage { chat_id, text })
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await?;
        Self::parse::<serde_json::Value>(response).await?;
        debug!(chat_id, "Message sent");
        Ok(())
    }

    pub async fn get_file(&self, file_id: &str) -> Result<File, TelegramError> {
        let response = self
            .http
            .get(self.method_url("getFile"))
            .query(&[("file_id", file_id)])
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await?;
        Self::parse(response).await
    }

    /// Resolve `file_id` and stream its content into `dest`. Returns the byte count.
    pub async fn download_file(&self, file_id: &str, dest: &Path) -> Result<u64, TelegramError> {
        let file = self.get_file(file_id).await?;
        let file_path = file.file_path.ok_or(TelegramError::MissingFilePath)?;

        let response = self
            .http
            .get(self.file_url(&file_path))
            .timeout(TRANSFER_TIMEOUT)
            .send()
            .await?
            .error_for_status()?;

        let mut out = tokio::fs::File::create(dest).await?;
        let mut written = 0u64;
        let mut body = response.bytes_stream();
        while let Some(chunk) = body.next().await {
            let chunk = chunk?;
            out.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        out.flush().await?;

        info!(file_id, written, ?dest, "File downloaded");
        Ok(written)
    }

    /// Upload `path` as a video message.
    pub async fn send_video(
        &self,
        chat_id: i64,
        path: &Path,
        file_name: &str,
    ) -> Result<(), TelegramError> {
        let file = tokio::fs::File::open(path).await?;
        let len = file.metadata().await?.len();
        let mime = mime_guess::from_path(file_name).first_or_octet_stream();

        let body = reqwest::Body::wrap_stream(ReaderStream::new(file));
        let part = Part::stream_with_length(body, len)
            .file_name(file_name.to_string())
            .mime_str(mime.as_ref())?;
        let form = Form::new()
            .text("chat_id", chat_id.to_string())
            .text("supports_streaming", "true")
            .part("video", part);

        let response = self
            .http
            .post(self.method_url("sendVideo"))
            .multipart(form)
            .timeout(TRANSFER_TIMEOUT)
            .send()
            .await?;
        Self::parse::<serde_json::Value>(response).await?;

        info!(chat_id, len, file_name, "Video sent");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_urls() {
        let client = TelegramClient::new("http://localhost:8081/", "123:abc").unwrap();
        assert_eq!(
            client.method_url("getMe"),
            "http://localhost:8081/bot123:abc/getMe"
        );
        assert_eq!(
            client.file_url("videos/file_1.mp4"),
            "http://localhost:8081/file/bot123:abc/videos/file_1.mp4"
        );
        assert!(!format!("{client:?}").contains("123:abc"));
    }

    #[test]
    fn test_transient_api_errors() {
        let api = |code| TelegramError::Api {
            code,
            description: String::new(),
            retry_after: None,
        };
        assert!(api(Some(429)).is_transient());
        assert!(api(Some(502)).is_transient());
        assert!(!api(Some(400)).is_transient());
        assert!(!api(None).is_transient());
        assert!(!TelegramError::MissingFilePath.is_transient());

        let limited = TelegramError::Api {
            code: Some(429),
            description: "Too Many Requests".to_string(),
            retry_after: Some(7),
        };
        assert_eq!(limited.retry_after(), Some(Duration::from_secs(7)));
    }

    #[tokio::test]
    async fn test_connect_error_is_transient() {
        let port = portpicker::pick_unused_port().expect("No available port");
        let client = TelegramClient::new(&format!("http://127.0.0.1:{port}"), "123:abc").unwrap();

        let error = client.get_file("file").await.unwrap_err();
        assert!(matches!(error, TelegramError::Http(_)));
        assert!(error.is_transient());
    }
}
