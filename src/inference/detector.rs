//! Detector abstraction and raw detection types.

use crate::error::Result;
use image::DynamicImage;
use serde::{Deserialize, Serialize};

/// Axis-aligned box in pixel coordinates of the original image.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BBox {
    /// Left edge.
    pub x_min: f32,
    /// Top edge.
    pub y_min: f32,
    /// Right edge.
    pub x_max: f32,
    /// Bottom edge.
    pub y_max: f32,
}

impl BBox {
    /// Box from corner coordinates.
    pub const fn new(x_min: f32, y_min: f32, x_max: f32, y_max: f32) -> Self {
        Self {
            x_min,
            y_min,
            x_max,
            y_max,
        }
    }

    /// Box from center, width and height.
    pub fn from_center(cx: f32, cy: f32, w: f32, h: f32) -> Self {
        Self::new(cx - w / 2.0, cy - h / 2.0, cx + w / 2.0, cy + h / 2.0)
    }

    /// Box scaled independently on each axis.
    #[must_use]
    pub fn scaled(self, sx: f32, sy: f32) -> Self {
        Self::new(
            self.x_min * sx,
            self.y_min * sy,
            self.x_max * sx,
            self.y_max * sy,
        )
    }

    /// Box clamped to `[0, width] x [0, height]`.
    #[must_use]
    pub fn clamped(self, width: f32, height: f32) -> Self {
        Self::new(
            self.x_min.clamp(0.0, width),
            self.y_min.clamp(0.0, height),
            self.x_max.clamp(0.0, width),
            self.y_max.clamp(0.0, height),
        )
    }

    /// Box width (zero if inverted).
    pub fn width(&self) -> f32 {
        (self.x_max - self.x_min).max(0.0)
    }

    /// Box height (zero if inverted).
    pub fn height(&self) -> f32 {
        (self.y_max - self.y_min).max(0.0)
    }
}

/// One model output before thresholding.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawDetection {
    /// Box in original image pixels.
    pub bbox: BBox,
    /// Class id emitted by the model.
    pub class_id: u32,
    /// Confidence score.
    pub score: f32,
}

/// Object detector over decoded images.
///
/// Implementations return every candidate the model emits; threshold
/// filtering is the caller's job.
pub trait Detector {
    /// Run one forward pass.
    fn detect(&mut self, image: &DynamicImage) -> Result<Vec<RawDetection>>;

    /// Model name for run metadata.
    fn name(&self) -> &str;
}
