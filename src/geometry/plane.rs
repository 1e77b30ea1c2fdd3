//! Image planes and per-axis scale factors.
//!
//! Two planes of the same logical photograph exist per stage: a preview plane
//! bounded to a fixed maximum dimension, used for detection, and a native
//! plane at full resolution, used for cropping and masking. The scale factor
//! between them is derived per pair and never persisted.

use serde::{Deserialize, Serialize};

/// Pixel dimensions of one plane of an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImagePlane {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl ImagePlane {
    /// Creates a plane from pixel dimensions.
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Creates a plane from an image's dimensions.
    pub fn of(image: &image::RgbImage) -> Self {
        let (width, height) = image.dimensions();
        Self { width, height }
    }

    /// Width-over-height aspect ratio. Zero-height planes yield 0.0.
    pub fn aspect_ratio(&self) -> f32 {
        if self.height == 0 {
            0.0
        } else {
            self.width as f32 / self.height as f32
        }
    }
}

/// Per-axis ratio between a native plane and its preview plane.
///
/// Width and height may be resized non-uniformly, so the two axes are always
/// scaled independently; a single isotropic factor is never assumed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScaleFactor {
    /// Horizontal scale: `native.width / preview.width`.
    pub x: f32,
    /// Vertical scale: `native.height / preview.height`.
    pub y: f32,
}

impl ScaleFactor {
    /// Derives the scale factor mapping `preview` coordinates onto `native`.
    pub fn between(preview: ImagePlane, native: ImagePlane) -> Self {
        Self {
            x: native.width as f32 / preview.width.max(1) as f32,
            y: native.height as f32 / preview.height.max(1) as f32,
        }
    }

    /// The identity scale.
    pub fn identity() -> Self {
        Self { x: 1.0, y: 1.0 }
    }
}

/// Checks that two planes agree in aspect ratio within a relative tolerance.
///
/// A mismatch between a preview plane and its native plane signals a corrupt
/// pairing (stale preview, wrong file); between a crop and its mask it
/// signals a stale or misaligned mask.
pub fn aspect_ratio_agrees(a: ImagePlane, b: ImagePlane, tolerance: f32) -> bool {
    let ra = a.aspect_ratio();
    let rb = b.aspect_ratio();
    if ra == 0.0 || rb == 0.0 {
        return false;
    }
    ((ra - rb) / rb).abs() <= tolerance
}
