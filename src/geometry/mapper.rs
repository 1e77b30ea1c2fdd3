//! Preview-to-native coordinate re-projection.
//!
//! Detections are produced on a small preview image and must be re-projected
//! onto the full-resolution native plane before any crop or mask is derived.
//! Box detections may be inflated by a fixed buffer (in preview pixels,
//! applied before scaling) so crops do not clip detection edges; polygon
//! detections already trace the boundary and receive no buffer. All
//! coordinates are clamped to the native plane after scaling; boxes that
//! degenerate under clamping are discarded rather than emitted as zero-size
//! crops.

use crate::core::errors::PipelineError;
use crate::geometry::plane::{aspect_ratio_agrees, ImagePlane, ScaleFactor};
use crate::geometry::point::Point;

/// An axis-aligned rectangle in native-plane pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelRect {
    /// Left edge, inclusive.
    pub x1: u32,
    /// Top edge, inclusive.
    pub y1: u32,
    /// Right edge, exclusive.
    pub x2: u32,
    /// Bottom edge, exclusive.
    pub y2: u32,
}

impl PixelRect {
    /// Width of the rectangle in pixels.
    pub fn width(&self) -> u32 {
        self.x2 - self.x1
    }

    /// Height of the rectangle in pixels.
    pub fn height(&self) -> u32 {
        self.y2 - self.y1
    }
}

/// Maps detections from a preview plane onto its native plane.
///
/// Construction validates that the two planes agree in aspect ratio; a
/// mismatch signals a corrupt pairing and is rejected up front rather than
/// producing skewed crops.
#[derive(Debug, Clone)]
pub struct CoordinateMapper {
    scale: ScaleFactor,
    native: ImagePlane,
    buffer_px: f32,
}

impl CoordinateMapper {
    /// Creates a mapper for a preview/native plane pair.
    ///
    /// `buffer_px` inflates box detections on every side, in preview pixels,
    /// before scaling. `aspect_tolerance` is the relative tolerance for the
    /// pairing check.
    pub fn new(
        preview: ImagePlane,
        native: ImagePlane,
        buffer_px: f32,
        aspect_tolerance: f32,
    ) -> Result<Self, PipelineError> {
        if !aspect_ratio_agrees(preview, native, aspect_tolerance) {
            return Err(PipelineError::validation_error(
                "plane pairing",
                "aspect_ratio",
                &format!("{:.4}", native.aspect_ratio()),
                &format!("{:.4}", preview.aspect_ratio()),
            ));
        }
        Ok(Self {
            scale: ScaleFactor::between(preview, native),
            native,
            buffer_px,
        })
    }

    /// The scale factor between the mapper's planes.
    pub fn scale(&self) -> ScaleFactor {
        self.scale
    }

    /// Projects a box detection (center plus extent, preview coordinates)
    /// onto the native plane.
    ///
    /// Each corner is scaled independently by the per-axis factors and
    /// clamped to the native bounds. Returns `None` when the clamped box has
    /// no area.
    pub fn project_box(&self, cx: f32, cy: f32, width: f32, height: f32) -> Option<PixelRect> {
        let half_w = width / 2.0 + self.buffer_px;
        let half_h = height / 2.0 + self.buffer_px;

        let x1 = (cx - half_w) * self.scale.x;
        let y1 = (cy - half_h) * self.scale.y;
        let x2 = (cx + half_w) * self.scale.x;
        let y2 = (cy + half_h) * self.scale.y;

        let x1 = x1.clamp(0.0, self.native.width as f32).round() as u32;
        let y1 = y1.clamp(0.0, self.native.height as f32).round() as u32;
        let x2 = x2.clamp(0.0, self.native.width as f32).round() as u32;
        let y2 = y2.clamp(0.0, self.native.height as f32).round() as u32;

        if x2 <= x1 || y2 <= y1 {
            return None;
        }
        Some(PixelRect { x1, y1, x2, y2 })
    }

    /// Projects a polygon detection onto the native plane.
    ///
    /// Every vertex is scaled independently and clamped; no buffer is
    /// applied.
    pub fn project_polygon(&self, points: &[Point]) -> Vec<Point> {
        points
            .iter()
            .map(|p| {
                Point::new(
                    (p.x * self.scale.x).clamp(0.0, self.native.width as f32),
                    (p.y * self.scale.y).clamp(0.0, self.native.height as f32),
                )
            })
            .collect()
    }
}
