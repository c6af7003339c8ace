use crate::Config;
use crate::placement::{Position, RenderedOverlay};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, error, info};

const STDERR_TAIL_LINES: usize = 20;

/// Characters significant inside a single filter option value.
const OPTION_SPECIAL: &[char] = &['\\', '\'', ':'];
/// Characters significant to the filtergraph parser.
const GRAPH_SPECIAL: &[char] = &['\\', '\'', '[', ']', ',', ';'];

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("failed to spawn ffmpeg: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("ffmpeg exited with {status}: {stderr}")]
    Failed { status: ExitStatus, stderr: String },
}

/// Burns overlays into a video with an external `ffmpeg` process.
#[derive(Clone, Debug)]
pub struct Renderer {
    ffmpeg_path: PathBuf,
    font_file: PathBuf,
    preset: String,
    crf: u8,
}

impl Renderer {
    pub fn new(ffmpeg_path: PathBuf, font_file: PathBuf, preset: String, crf: u8) -> Self {
        Self {
            ffmpeg_path,
            font_file,
            preset,
            crf,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            PathBuf::from(&config.ffmpeg_path),
            PathBuf::from(&config.font_file),
            config.preset.clone(),
            config.crf,
        )
    }

    /// One `drawtext` filter per overlay, chained in overlay order.
    pub fn filter_graph(&self, overlays: &[RenderedOverlay]) -> String {
        let font_file = escape_filter_value(&self.font_file.to_string_lossy());
        overlays
            .iter()
            .map(|overlay| {
                format!(
                    "drawtext=fontfile={font_file}:text={text}:expansion=none\
                     :fontsize={size}:fontcolor={fill}:borderw={stroke_w}:bordercolor={stroke}\
                     :x={x}:y={y}",
                    text = escape_filter_value(&overlay.text),
                    size = overlay.font_size_px,
                    fill = overlay.fill_color.as_str(),
                    stroke_w = overlay.stroke_width_px,
                    stroke = overlay.stroke_color.as_str(),
                    x = axis_expr(overlay.x, "w", "tw"),
                    y = axis_expr(overlay.y, "h", "th"),
                )
            })
            .collect::<Vec<_>>()
            .join(",")
    }

    pub fn args(
        &self,
        input: &Path,
        output: &Path,
        overlays: &[RenderedOverlay],
    ) -> Vec<OsString> {
        let mut args: Vec<OsString> = ["-hide_banner", "-nostdin", "-y", "-i"]
            .into_iter()
            .map(OsString::from)
            .collect();
        args.push(input.into());
        let crf = self.crf.to_string();
        if !overlays.is_empty() {
            args.push("-vf".into());
            args.push(self.filter_graph(overlays).into());
        }
        args.extend(
            [
                "-c:v",
                "libx264",
                "-preset",
                self.preset.as_str(),
                "-crf",
                crf.as_str(),
                "-c:a",
                "copy",
                "-movflags",
                "+faststart",
                // the output path may lack an extension while rendering
                "-f",
                "mp4",
            ]
            .into_iter()
            .map(OsString::from),
        );
        args.push(output.into());
        args
    }

    pub async fn render(
        &self,
        job_id: &str,
        input: &Path,
        output: &Path,
        overlays: &[RenderedOverlay],
    ) -> Result<(), RenderError> {
        let args = self.args(input, output, overlays);
        debug!(job_id, ffmpeg = ?self.ffmpeg_path, ?args, "Starting render");

        let result = Command::new(&self.ffmpeg_path)
            .args(&args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(RenderError::Spawn)?;

        if !result.status.success() {
            let stderr = stderr_tail(&String::from_utf8_lossy(&result.stderr));
            error!(job_id, status = %result.status, %stderr, "ffmpeg failed");
            return Err(RenderError::Failed {
                status: result.status,
                stderr,
            });
        }

        info!(job_id, ?output, "Render finished");
        Ok(())
    }
}

fn axis_expr(position: Position, frame: &str, text: &str) -> String {
    match position {
        Position::Pixels(px) => px.to_string(),
        Position::FarEdge { margin } => format!("{frame}-{text}-{margin}"),
        Position::Centered => format!("({frame}-{text})/2"),
    }
}

fn escape_level(value: &str, special: &[char]) -> String {
    let last = value.chars().count().saturating_sub(1);
    let mut escaped = String::with_capacity(value.len());
    for (i, c) in value.chars().enumerate() {
        // the parser trims unescaped whitespace at both ends
        if special.contains(&c) || (c.is_whitespace() && (i == 0 || i == last)) {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Escape a literal for use as a filter option value inside a filtergraph.
///
/// The value is unescaped twice by ffmpeg: once when the graph is split into
/// filters and once when the filter arguments are split into options.
pub fn escape_filter_value(value: &str) -> String {
    escape_level(&escape_level(value, OPTION_SPECIAL), GRAPH_SPECIAL)
}

fn stderr_tail(stderr: &str) -> String {
    let lines = stderr.lines().collect::<Vec<_>>();
    let start = lines.len().saturating_sub(STDERR_TAIL_LINES);
    lines[start..].join("\n")
}
