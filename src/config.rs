use crate::placement::{Anchor, WatermarkSpec};
use anyhow::Result;
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::time::Duration;

/// Main configuration structure that can be loaded from CLI, config file, or environment
///
/// Example configuration file content
/// # Watermark Bot Configuration
///
/// # Telegram
/// bot_token = "123456:ABC..."
/// api_url = "https://api.telegram.org"   # or a self-hosted Bot API server
/// poll_timeout_secs = 30
///
/// # Watermarks
/// watermark_text = "TG @channel"         # bottom right
/// site_text = "example.blogspot.com"     # top center
/// font_file = "/usr/share/fonts/truetype/dejavu/DejaVuSans-Bold.ttf"
///
/// # Jobs
/// workspace = "/tmp/watermark-bot"
/// permits = 1
/// max_file_size = 157286400
/// max_retries = 3
/// retry_interval_secs = 5
///
/// # Encoder
/// ffmpeg_path = "ffmpeg"
/// preset = "medium"
/// crf = 23
///
/// # Health check server
/// listen_on_port = 5000
#[derive(Clone, Serialize, Deserialize, Parser)]
#[serde(default)]
#[command(version, about, long_about = None)]
pub struct Config {
    /// Telegram bot token
    #[arg(long, env = "BOT_TOKEN", hide_env_values = true)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bot_token: Option<String>,

    /// Telegram Bot API base URL
    #[arg(long, default_value = "https://api.telegram.org")]
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Long polling timeout for getUpdates, in seconds
    #[arg(long, default_value_t = 30)]
    #[serde(default = "default_poll_timeout_secs")]
    pub poll_timeout_secs: u64,

    /// Port for the health check server
    #[arg(short, long, default_value_t = 5000)]
    #[serde(default = "default_port")]
    pub listen_on_port: u16,

    /// Number of concurrent render jobs
    #[arg(short, long, default_value_t = 1)]
    #[serde(default = "default_permits")]
    pub permits: usize,

    /// Working directory for downloads, renders and the pending jobs file
    #[arg(short = 'w', long, default_value = "/tmp/watermark-bot")]
    #[serde(default = "default_workspace")]
    pub workspace: String,

    /// TOML configuration file; its values apply where a CLI argument is left at its default
    #[arg(short, long)]
    #[serde(skip)]
    pub config: Option<String>,

    /// Watermark drawn in the bottom right corner
    #[arg(long, default_value = "TG @supplywalah")]
    #[serde(default = "default_watermark_text")]
    pub watermark_text: String,

    /// Watermark drawn at the top center
    #[arg(long, default_value = "Supplywalah.blogspot.com")]
    #[serde(default = "default_site_text")]
    pub site_text: String,

    /// Font used for both watermarks
    #[arg(long, default_value = "/usr/share/fonts/truetype/dejavu/DejaVuSans-Bold.ttf")]
    #[serde(default = "default_font_file")]
    pub font_file: String,

    /// Largest accepted upload, in bytes
    #[arg(long, default_value_t = 150 * 1024 * 1024)]
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,

    /// Retries for transient download and upload failures
    #[arg(long, default_value_t = 3)]
    #[serde(default = "default_max_retries")]
    pub max_retries: u8,

    /// Delay between retries, in seconds
    #[arg(long, default_value_t = 5)]
    #[serde(default = "default_retry_interval_secs")]
    pub retry_interval_secs: u64,

    /// ffmpeg executable
    #[arg(long, default_value = "ffmpeg")]
    #[serde(default = "default_ffmpeg_path")]
    pub ffmpeg_path: String,

    /// x264 preset
    #[arg(long, default_value = "medium")]
    #[serde(default = "default_preset")]
    pub preset: String,

    /// x264 constant rate factor (0-51)
    #[arg(long, default_value_t = 23)]
    #[serde(default = "default_crf")]
    pub crf: u8,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bot_token: None,
            api_url: default_api_url(),
            poll_timeout_secs: default_poll_timeout_secs(),
            listen_on_port: default_port(),
            permits: default_permits(),
            workspace: default_workspace(),
            config: None,
            watermark_text: default_watermark_text(),
            site_text: default_site_text(),
            font_file: default_font_file(),
            max_file_size: default_max_file_size(),
            max_retries: default_max_retries(),
            retry_interval_secs: default_retry_interval_secs(),
            ffmpeg_path: default_ffmpeg_path(),
            preset: default_preset(),
            crf: default_crf(),
        }
    }
}

// The token must never end up in logs.
impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("bot_token", &self.bot_token.as_ref().map(|_| "<redacted>"))
            .field("api_url", &self.api_url)
            .field("poll_timeout_secs", &self.poll_timeout_secs)
            .field("listen_on_port", &self.listen_on_port)
            .field("permits", &self.permits)
            .field("workspace", &self.workspace)
            .field("watermark_text", &self.watermark_text)
            .field("site_text", &self.site_text)
            .field("font_file", &self.font_file)
            .field("max_file_size", &self.max_file_size)
            .field("max_retries", &self.max_retries)
            .field("retry_interval_secs", &self.retry_interval_secs)
            .field("ffmpeg_path", &self.ffmpeg_path)
            .field("preset", &self.preset)
            .field("crf", &self.crf)
            .finish()
    }
}

impl Config {
    /// Load configuration from CLI args, optionally merging with a config file
    pub fn load() -> Result<Self> {
        let mut config = Config::parse();

        if let Some(config_path) = &config.config {
            let file_config = Self::from_file(Path::new(config_path))?;
            config = config.merge_with_file(file_config);
        }

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Merge with file config, CLI args take precedence
    fn merge_with_file(mut self, file_config: Config) -> Self {
        // If CLI value is default, use file value
        if self.api_url == default_api_url() {
            self.api_url = file_config.api_url;
        }
        if self.poll_timeout_secs == default_poll_timeout_secs() {
            self.poll_timeout_secs = file_config.poll_timeout_secs;
        }
        if self.listen_on_port == default_port() {
            self.listen_on_port = file_config.listen_on_port;
        }
        if self.permits == default_permits() {
            self.permits = file_config.permits;
        }
        if self.workspace == default_workspace() {
            self.workspace = file_config.workspace;
        }
        if self.watermark_text == default_watermark_text() {
            self.watermark_text = file_config.watermark_text;
        }
        if self.site_text == default_site_text() {
            self.site_text = file_config.site_text;
        }
        if self.font_file == default_font_file() {
            self.font_file = file_config.font_file;
        }
        if self.max_file_size == default_max_file_size() {
            self.max_file_size = file_config.max_file_size;
        }
        if self.max_retries == default_max_retries() {
            self.max_retries = file_config.max_retries;
        }
        if self.retry_interval_secs == default_retry_interval_secs() {
            self.retry_interval_secs = file_config.retry_interval_secs;
        }
        if self.ffmpeg_path == default_ffmpeg_path() {
            self.ffmpeg_path = file_config.ffmpeg_path;
        }
        if self.preset == default_preset() {
            self.preset = file_config.preset;
        }
        if self.crf == default_crf() {
            self.crf = file_config.crf;
        }

        // For Option fields, CLI takes precedence if Some
        if self.bot_token.is_none() {
            self.bot_token = file_config.bot_token;
        }

        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self
            .bot_token
            .as_ref()
            .map(|s| s.trim().is_empty())
            .unwrap_or(true)
        {
            return Err(anyhow::anyhow!(
                "Bot token is required (--bot-token or BOT_TOKEN)"
            ));
        }

        if !self.api_url.starts_with("http://") && !self.api_url.starts_with("https://") {
            return Err(anyhow::anyhow!(
                "API URL must start with http:// or https://"
            ));
        }

        if self.watermark_text.trim().is_empty() || self.site_text.trim().is_empty() {
            return Err(anyhow::anyhow!("Watermark texts cannot be empty"));
        }

        if self.permits == 0 {
            return Err(anyhow::anyhow!("Permits must be at least 1"));
        }

        if self.crf > 51 {
            return Err(anyhow::anyhow!(
                "Invalid crf {}: x264 accepts 0-51",
                self.crf
            ));
        }

        if self.max_file_size == 0 {
            return Err(anyhow::anyhow!("Max file size must be positive"));
        }

        Ok(())
    }

    /// Watermarks in render order.
    pub fn labels(&self) -> Vec<WatermarkSpec> {
        vec![
            WatermarkSpec::new(self.watermark_text.clone(), Anchor::BottomRight),
            WatermarkSpec::new(self.site_text.clone(), Anchor::TopCenter),
        ]
    }

    pub fn bot_token(&self) -> &str {
        self.bot_token.as_deref().unwrap_or_default()
    }

    pub fn retry_interval(&self) -> Duration {
        Duration::from_secs(self.retry_interval_secs)
    }

    pub fn poll_timeout(&self) -> Duration {
        Duration::from_secs(self.poll_timeout_secs)
    }
}

// Default value functions
fn default_api_url() -> String {
    "https://api.telegram.org".to_string()
}

fn default_poll_timeout_secs() -> u64 {
    30
}

fn default_port() -> u16 {
    5000
}

fn default_permits() -> usize {
    1
}

fn default_workspace() -> String {
    "/tmp/watermark-bot".to_string()
}

fn default_watermark_text() -> String {
    "TG @supplywalah".to_string()
}

fn default_site_text() -> String {
    "Supplywalah.blogspot.com".to_string()
}

fn default_font_file() -> String {
    "/usr/share/fonts/truetype/dejavu/DejaVuSans-Bold.ttf".to_string()
}

fn default_max_file_size() -> u64 {
    150 * 1024 * 1024
}

fn default_max_retries() -> u8 {
    3
}

fn default_retry_interval_secs() -> u64 {
    5
}

fn default_ffmpeg_path() -> String {
    "ffmpeg".to_string()
}

fn default_preset() -> String {
    "medium".to_string()
}

fn default_crf() -> u8 {
    23
}
