pub mod api;
pub mod app_state;
pub mod config;
pub mod job;
pub mod placement;
pub mod probe;
pub mod render;
pub mod stream_map;
pub mod telegram;

use anyhow::Context;
use axum::Router;
use axum::extract::Extension;
use axum::routing::get;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

//
// Re-export
//
pub use api::{index, log_request_errors, waitlist};
pub use app_state::AppState;
pub use config::Config;
pub use job::{Job, JobResult, JobSetManager, WatermarkJob};
pub use placement::{
    Anchor, RenderedOverlay, VideoGeometry, WatermarkSpec, build_overlay_set, place_bottom_right,
    place_top_center, select_font_size,
};
pub use render::Renderer;
pub use stream_map::StreamMap;
pub use telegram::{TelegramClient, TelegramError};

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(index))
        .route("/waitlist", get(waitlist))
        .layer(axum::middleware::from_fn(api::log_request_errors))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(Extension(state))
}

/// Run the health server and the update poller until either stops or the
/// process receives Ctrl-C.
pub async fn run(config: Config) -> anyhow::Result<()> {
    let listen_on_port = config.listen_on_port;
    let state = AppState::new(config)
        .await
        .context("Failed to create app state")?;

    let app = router(state.clone());
    let addr = format!("0.0.0.0:{listen_on_port}");
    info!("Health server listening on {addr}");
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;

    tokio::select! {
        result = axum::serve(listener, app) => {
            result.context("Health server error")?;
        }
        _ = telegram::run_polling(state) => {}
        result = tokio::signal::ctrl_c() => {
            result.context("Failed to listen for shutdown signal")?;
            info!("Shutdown signal received");
        }
    }

    Ok(())
}
