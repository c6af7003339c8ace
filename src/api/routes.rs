use crate::AppState;
use axum::extract::Extension;
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Json};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const INDEX_PAGE: &str = "<h1>Bot is Running!</h1>";

#[derive(Debug, Serialize, Deserialize)]
pub struct WaitlistResponse {
    pub pending_jobs: usize,
    pub started_at: DateTime<Utc>,
    pub uptime_secs: i64,
}

/// Liveness page for hosting platforms that ping the root path.
pub async fn index() -> Html<&'static str> {
    Html(INDEX_PAGE)
}

pub async fn waitlist(Extension(state): Extension<AppState>) -> impl IntoResponse {
    let pending_jobs = state.jobs_manager.len().await;
    let uptime_secs = (Utc::now() - state.started_at).num_seconds();

    (
        StatusCode::OK,
        Json(WaitlistResponse {
            pending_jobs,
            started_at: state.started_at,
            uptime_secs,
        }),
    )
}
