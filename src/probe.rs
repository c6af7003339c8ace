use crate::placement::{FALLBACK_GEOMETRY, InvalidGeometry, VideoGeometry};
use ffmpeg_next::{self as ffmpeg, codec, format, media};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("failed to read media: {0}")]
    Ffmpeg(#[from] ffmpeg::Error),

    #[error("no video stream found")]
    NoVideoStream,

    #[error(transparent)]
    InvalidGeometry(#[from] InvalidGeometry),

    #[error("probe task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Read the frame size of the best video stream in `path`.
pub fn probe_geometry(path: &Path) -> Result<VideoGeometry, ProbeError> {
    let input = format::input(path)?;
    let stream = input
        .streams()
        .best(media::Type::Video)
        .ok_or(ProbeError::NoVideoStream)?;

    let decoder = codec::context::Context::from_parameters(stream.parameters())?
        .decoder()
        .video()?;
    debug!(
        ?path,
        width = decoder.width(),
        height = decoder.height(),
        "Probed video stream"
    );

    Ok(VideoGeometry::new(decoder.width(), decoder.height())?)
}

pub async fn probe_geometry_async(path: PathBuf) -> Result<VideoGeometry, ProbeError> {
    tokio::task::spawn_blocking(move || probe_geometry(&path)).await?
}

/// Probe, substituting [`FALLBACK_GEOMETRY`] when the file cannot be read.
pub async fn probe_or_fallback(job_id: &str, path: &Path) -> VideoGeometry {
    match probe_geometry_async(path.to_path_buf()).await {
        Ok(geometry) => geometry,
        Err(error) => {
            warn!(
                job_id,
                %error,
                width = FALLBACK_GEOMETRY.width(),
                height = FALLBACK_GEOMETRY.height(),
                "Probe failed, using fallback geometry"
            );
            FALLBACK_GEOMETRY
        }
    }
}
