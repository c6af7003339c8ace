use serde::{Deserialize, Serialize};

/// Envelope of every Bot API response.
#[derive(Debug, Deserialize)]
pub struct ApiResponse<T> {
    pub ok: bool,
    pub result: Option<T>,
    pub description: Option<String>,
    pub error_code: Option<u16>,
    pub parameters: Option<ResponseParameters>,
}

#[derive(Debug, Deserialize)]
pub struct ResponseParameters {
    pub retry_after: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    pub message: Option<Message>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub message_id: i64,
    pub chat: Chat,
    pub text: Option<String>,
    pub video: Option<Video>,
    pub document: Option<Document>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Video {
    pub file_id: String,
    pub file_unique_id: String,
    pub width: u32,
    pub height: u32,
    pub file_name: Option<String>,
    pub mime_type: Option<String>,
    pub file_size: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Document {
    pub file_id: String,
    pub file_unique_id: String,
    pub file_name: Option<String>,
    pub mime_type: Option<String>,
    pub file_size: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct File {
    pub file_id: String,
    pub file_size: Option<u64>,
    pub file_path: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SendMessage<'a> {
    pub chat_id: i64,
    pub text: &'a str,
}

/// A file the user asked to have watermarked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoAttachment {
    pub file_id: String,
    pub file_unique_id: String,
    pub file_name: Option<String>,
    pub file_size: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Start,
    Help,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    Command(Command),
    Video(VideoAttachment),
    NotVideo,
}

impl From<&Video> for VideoAttachment {
    fn from(video: &Video) -> Self {
        Self {
            file_id: video.file_id.clone(),
            file_unique_id: video.file_unique_id.clone(),
            file_name: video.file_name.clone(),
            file_size: video.file_size,
        }
    }
}

impl From<&Document> for VideoAttachment {
    fn from(document: &Document) -> Self {
        Self {
            file_id: document.file_id.clone(),
            file_unique_id: document.file_unique_id.clone(),
            file_name: document.file_name.clone(),
            file_size: document.file_size,
        }
    }
}

impl Document {
    /// Documents count as video by declared MIME type, or by file name when
    /// the client sent none.
    pub fn is_video(&self) -> bool {
        match (&self.mime_type, &self.file_name) {
            (Some(mime), _) => mime.starts_with("video/"),
            (None, Some(name)) => mime_guess::from_path(name)
                .first()
                .is_some_and(|mime| mime.type_() == mime_guess::mime::VIDEO),
            (None, None) => false,
        }
    }
}

impl Message {
    pub fn intent(&self) -> Intent {
        if let Some(command) = self.text.as_deref().and_then(parse_command) {
            return Intent::Command(command);
        }
        if let Some(video) = &self.video {
            return Intent::Video(video.into());
        }
        match &self.document {
            Some(document) if document.is_video() => Intent::Video(document.into()),
            _ => Intent::NotVideo,
        }
    }
}

/// Parses `/start`, `/help` and their `@botname` forms.
fn parse_command(text: &str) -> Option<Command> {
    let word = text.split_whitespace().next()?.strip_prefix('/')?;
    let name = word.split_once('@').map_or(word, |(name, _)| name);
    match name {
        "start" => Some(Command::Start),
        "help" => Some(Command::Help),
        _ => None,
    }
}
