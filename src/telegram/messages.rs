use crate::placement::WatermarkSpec;

pub const PROCESSING: &str = "🔄 Applying watermark to your video...";
pub const UPLOADING: &str = "⬆️ Uploading watermarked video...";
pub const COMPLETE: &str = "✅ Video processed and sent successfully!";
pub const NOT_VIDEO: &str = "Please send a video file.";
pub const ALREADY_QUEUED: &str = "⏳ This video is already being processed.";
pub const ERROR_PROCESSING: &str = "❌ Error: Failed to process video. Please try again.";
pub const ERROR_DOWNLOAD: &str = "❌ Error: Failed to download video. Please try again.";
pub const ERROR_UPLOAD: &str = "❌ Error: Failed to send video. Please try again.";
pub const ERROR_GENERAL: &str = "❌ An unexpected error occurred. Please try again later.";

fn size_mb(bytes: u64) -> u64 {
    bytes / 1024 / 1024
}

fn label_lines(labels: &[WatermarkSpec]) -> String {
    labels
        .iter()
        .map(|label| format!("• '{}' - {}", label.text, label.anchor.describe()))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn welcome(max_file_size: u64, labels: &[WatermarkSpec]) -> String {
    format!(
        "Welcome! Send me a video file (up to {}MB) and I'll add watermarks.\n\n\
         Watermarks added:\n{}",
        size_mb(max_file_size),
        label_lines(labels)
    )
}

pub fn help(max_file_size: u64, labels: &[WatermarkSpec]) -> String {
    format!(
        "🎥 Video Watermark Bot\n\n\
         Send me a video file (up to {}MB) and I'll add watermarks:\n{}\n\n\
         Supported formats: MP4, AVI, MOV, MKV, etc.\n\
         The bot works with both landscape and portrait videos.",
        size_mb(max_file_size),
        label_lines(labels)
    )
}

pub fn file_too_large(max_file_size: u64) -> String {
    format!(
        "❌ Error: File size exceeds {}MB limit.",
        size_mb(max_file_size)
    )
}
