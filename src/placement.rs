use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Geometry substituted when a video cannot be probed.
pub const FALLBACK_GEOMETRY: VideoGeometry = VideoGeometry {
    width: 1920,
    height: 1080,
};

pub const STROKE_WIDTH_PX: u32 = 2;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("invalid video geometry {width}x{height}: both dimensions must be positive")]
pub struct InvalidGeometry {
    pub width: u32,
    pub height: u32,
}

/// Pixel dimensions of a video frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoGeometry {
    width: u32,
    height: u32,
}

impl VideoGeometry {
    pub fn new(width: u32, height: u32) -> Result<Self, InvalidGeometry> {
        if width == 0 || height == 0 {
            return Err(InvalidGeometry { width, height });
        }
        Ok(Self { width, height })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn min_dimension(&self) -> u32 {
        self.width.min(self.height)
    }

    pub fn font_size(&self) -> u32 {
        select_font_size(self.width, self.height)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Anchor {
    BottomRight,
    TopCenter,
}

impl Anchor {
    pub fn describe(&self) -> &'static str {
        match self {
            Anchor::BottomRight => "bottom right",
            Anchor::TopCenter => "top center",
        }
    }

    fn place(&self, font_size_px: u32) -> (Position, Position) {
        match self {
            Anchor::BottomRight => place_bottom_right(font_size_px),
            Anchor::TopCenter => place_top_center(font_size_px),
        }
    }
}

/// A text label and where it goes on the frame.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatermarkSpec {
    pub text: String,
    pub anchor: Anchor,
}

impl WatermarkSpec {
    pub fn new(text: impl Into<String>, anchor: Anchor) -> Self {
        Self {
            text: text.into(),
            anchor,
        }
    }
}

/// Coordinate on one axis, relative to the frame and the rendered text extent.
///
/// Text extents are measured by the renderer, so positions stay symbolic until
/// they are either translated to the renderer's expression language or
/// evaluated with [`Position::resolve`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Position {
    Pixels(u32),
    /// `frame - text - margin`
    FarEdge { margin: u32 },
    /// `(frame - text) / 2`
    Centered,
}

impl Position {
    pub fn resolve(&self, frame_extent: u32, text_extent: u32) -> i64 {
        let frame = i64::from(frame_extent);
        let text = i64::from(text_extent);
        match *self {
            Position::Pixels(px) => i64::from(px),
            Position::FarEdge { margin } => frame - text - i64::from(margin),
            Position::Centered => (frame - text).div_euclid(2),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Color {
    White,
    Black,
}

impl Color {
    pub fn as_str(&self) -> &'static str {
        match self {
            Color::White => "white",
            Color::Black => "black",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RenderedOverlay {
    pub text: String,
    pub font_size_px: u32,
    pub x: Position,
    pub y: Position,
    pub stroke_color: Color,
    pub stroke_width_px: u32,
    pub fill_color: Color,
}

/// Font size as a step function of the smaller frame dimension, so portrait
/// video gets the same size as its landscape counterpart.
pub fn select_font_size(width: u32, height: u32) -> u32 {
    match width.min(height) {
        d if d >= 1080 => 48,
        d if d >= 720 => 36,
        d if d >= 480 => 28,
        _ => 20,
    }
}

pub fn place_bottom_right(font_size_px: u32) -> (Position, Position) {
    let margin = font_size_px / 2;
    (Position::FarEdge { margin }, Position::FarEdge { margin })
}

pub fn place_top_center(font_size_px: u32) -> (Position, Position) {
    (Position::Centered, Position::Pixels(font_size_px / 2))
}

/// Resolves every label against one geometry. Output order matches `labels`.
pub fn build_overlay_set(
    geometry: &VideoGeometry,
    labels: &[WatermarkSpec],
) -> Vec<RenderedOverlay> {
    let font_size_px = geometry.font_size();
    labels
        .iter()
        .map(|label| {
            let (x, y) = label.anchor.place(font_size_px);
            RenderedOverlay {
                text: label.text.clone(),
                font_size_px,
                x,
                y,
                stroke_color: Color::Black,
                stroke_width_px: STROKE_WIDTH_PX,
                fill_color: Color::White,
            }
        })
        .collect()
}
