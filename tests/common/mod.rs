//! In-process stand-in for the Telegram Bot API.
#![allow(dead_code)]

use axum::extract::{Multipart, Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use bytes::Bytes;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::time::sleep;

#[derive(Debug, Clone)]
pub struct SentVideo {
    pub chat_id: i64,
    pub file_name: String,
    pub content_type: String,
    pub len: usize,
    pub supports_streaming: bool,
}

#[derive(Debug, Default)]
pub struct MockState {
    pub updates: Vec<Value>,
    pub messages: Vec<(i64, String)>,
    pub videos: Vec<SentVideo>,
    pub files: HashMap<String, Bytes>,
    pub download_delay: Duration,
}

impl MockState {
    pub fn messages_for(&self, chat_id: i64) -> Vec<String> {
        self.messages
            .iter()
            .filter(|(chat, _)| *chat == chat_id)
            .map(|(_, text)| text.clone())
            .collect()
    }
}

#[derive(Clone)]
pub struct MockTelegram {
    pub state: Arc<Mutex<MockState>>,
    pub url: String,
}

type Shared = Arc<Mutex<MockState>>;

impl MockTelegram {
    pub async fn start() -> Self {
        let port = portpicker::pick_unused_port().expect("No available port");
        let state = Shared::default();

        let app = Router::new()
            .route("/{bot}/getUpdates", get(get_updates))
            .route("/{bot}/sendMessage", post(send_message))
            .route("/{bot}/getFile", get(get_file))
            .route("/{bot}/sendVideo", post(send_video))
            .route("/file/{bot}/{*path}", get(download))
            .with_state(state.clone());

        let listener = TcpListener::bind(("127.0.0.1", port)).await.unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            state,
            url: format!("http://127.0.0.1:{port}"),
        }
    }

    pub fn push_update(&self, update: Value) {
        self.state.lock().unwrap().updates.push(update);
    }

    /// Hold every file download for `delay` before answering.
    pub fn delay_downloads(&self, delay: Duration) {
        self.state.lock().unwrap().download_delay = delay;
    }

    pub fn add_file(&self, file_id: &str, content: impl Into<Bytes>) {
        self.state
            .lock()
            .unwrap()
            .files
            .insert(file_id.to_string(), content.into());
    }

    /// Poll `check` every 100ms until it holds or `timeout` passes.
    pub async fn wait_until(&self, timeout: Duration, check: impl Fn(&MockState) -> bool) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        while tokio::time::Instant::now() < deadline {
            if check(&*self.state.lock().unwrap()) {
                return true;
            }
            sleep(Duration::from_millis(100)).await;
        }
        check(&*self.state.lock().unwrap())
    }
}

pub fn text_update(update_id: i64, chat_id: i64, text: &str) -> Value {
    json!({
        "update_id": update_id,
        "message": {
            "message_id": update_id,
            "chat": { "id": chat_id, "type": "private" },
            "date": 0,
            "text": text,
        }
    })
}

pub fn video_update(update_id: i64, chat_id: i64, file_id: &str, file_size: u64) -> Value {
    json!({
        "update_id": update_id,
        "message": {
            "message_id": update_id,
            "chat": { "id": chat_id, "type": "private" },
            "date": 0,
            "video": {
                "file_id": file_id,
                "file_unique_id": format!("u-{file_id}"),
                "width": 640,
                "height": 360,
                "duration": 1,
                "file_name": "clip.mp4",
                "mime_type": "video/mp4",
                "file_size": file_size,
            }
        }
    })
}

fn ok(result: Value) -> (StatusCode, Json<Value>) {
    (StatusCode::OK, Json(json!({ "ok": true, "result": result })))
}

fn bad_request(description: &str) -> (StatusCode, Json<Value>) {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({ "ok": false, "error_code": 400, "description": description })),
    )
}

async fn get_updates(
    State(state): State<Shared>,
    Query(query): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    let offset = query
        .get("offset")
        .and_then(|offset| offset.parse::<i64>().ok())
        .unwrap_or(0);

    let updates = state
        .lock()
        .unwrap()
        .updates
        .iter()
        .filter(|update| update["update_id"].as_i64().unwrap_or_default() >= offset)
        .cloned()
        .collect::<Vec<_>>();

    if updates.is_empty() {
        sleep(Duration::from_millis(50)).await;
    }
    ok(Value::Array(updates))
}

async fn send_message(State(state): State<Shared>, Json(body): Json<Value>) -> impl IntoResponse {
    let chat_id = body["chat_id"].as_i64().unwrap_or_default();
    let text = body["text"].as_str().unwrap_or_default().to_string();
    state.lock().unwrap().messages.push((chat_id, text));
    ok(json!({ "message_id": 1 }))
}

async fn get_file(
    State(state): State<Shared>,
    Query(query): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    let file_id = query.get("file_id").cloned().unwrap_or_default();
    let len = state.lock().unwrap().files.get(&file_id).map(Bytes::len);
    match len {
        Some(len) => ok(json!({
            "file_id": file_id,
            "file_unique_id": format!("u-{file_id}"),
            "file_size": len,
            "file_path": format!("videos/{file_id}.mp4"),
        })),
        None => bad_request("Bad Request: invalid file_id"),
    }
}

async fn download(
    State(state): State<Shared>,
    Path((_bot, path)): Path<(String, String)>,
) -> impl IntoResponse {
    let file_id = path
        .trim_start_matches("videos/")
        .trim_end_matches(".mp4")
        .to_string();
    let (content, delay) = {
        let state = state.lock().unwrap();
        (state.files.get(&file_id).cloned(), state.download_delay)
    };
    sleep(delay).await;
    match content {
        Some(content) => (StatusCode::OK, content),
        None => (StatusCode::NOT_FOUND, Bytes::new()),
    }
}

async fn send_video(State(state): State<Shared>, mut multipart: Multipart) -> impl IntoResponse {
    let mut chat_id = 0;
    let mut supports_streaming = false;
    let mut video = None;

    while let Ok(Some(field)) = multipart.next_field().await {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "chat_id" => chat_id = field.text().await.unwrap().parse().unwrap(),
            "supports_streaming" => supports_streaming = field.text().await.unwrap() == "true",
            "video" => {
                let file_name = field.file_name().unwrap_or_default().to_string();
                let content_type = field.content_type().unwrap_or_default().to_string();
                let len = field.bytes().await.unwrap().len();
                video = Some((file_name, content_type, len));
            }
            _ => {}
        }
    }

    let Some((file_name, content_type, len)) = video else {
        return bad_request("Bad Request: there is no video in the request");
    };
    state.lock().unwrap().videos.push(SentVideo {
        chat_id,
        file_name,
        content_type,
        len,
        supports_streaming,
    });
    ok(json!({ "message_id": 2 }))
}
