use ffmpeg_next::{self as ffmpeg};
use tracing_subscriber::EnvFilter;
use watermark_bot::Config;

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,hyper=warn,reqwest=warn"));

    tracing_subscriber::fmt().with_env_filter(env_filter).init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    ffmpeg::init()?;

    // Load configuration from CLI, environment and/or config file
    let config = Config::load()?;
    watermark_bot::run(config).await
}
