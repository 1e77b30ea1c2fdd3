//! Calibrated measurement of specimens from their masks.
//!
//! The dominant external contour of a validated mask is selected by maximum
//! enclosed area, which guards against small spurious regions that mask
//! repair did not remove. The contour's minimum-area bounding rectangle
//! gives the specimen length (`longest_px` is the rectangle's longer side);
//! the area proxy is the contour's own pixel area, not the rectangle's,
//! since a bounding rectangle overestimates non-rectangular specimens.
//!
//! With a drawer-level calibration ratio (pixels per millimeter) available,
//! `length_mm = longest_px / ratio` and `area_mm2 = area_px / ratio²`.
//! Absence of a contour or an unreadable mask yields a null measurement, not
//! an error; the stage continues past per-item failures.

pub mod record;

pub use record::{append_measurements, read_measured_ids, MeasurementRecord};

use crate::core::keys::RegionKey;
use crate::geometry::{min_area_rect, polygon_area, Point};
use image::GrayImage;
use imageproc::contours::{find_contours, BorderType};

/// Raw pixel-space measurement of one mask.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PixelMeasurement {
    /// Longer side of the minimum-area rectangle around the dominant contour.
    pub longest_px: f32,
    /// Enclosed pixel area of the dominant contour.
    pub area_px: f32,
}

/// Extracts the dominant-contour measurement from a binary mask.
///
/// Returns `None` when the mask has no external contour.
pub fn measure_mask(mask: &GrayImage) -> Option<PixelMeasurement> {
    let contours = find_contours::<i32>(mask);

    let mut best: Option<(f32, Vec<Point>)> = None;
    for contour in contours {
        if contour.border_type != BorderType::Outer {
            continue;
        }
        let points: Vec<Point> = contour
            .points
            .iter()
            .map(|&p| Point::from_imageproc_point(p))
            .collect();
        let area = polygon_area(&points);
        if best.as_ref().map_or(true, |(a, _)| area > *a) {
            best = Some((area, points));
        }
    }

    let (area, points) = best?;
    let rect = min_area_rect(&points);
    Some(PixelMeasurement {
        longest_px: rect.long_side(),
        area_px: area,
    })
}

/// Derives measurement records with optional calibration.
#[derive(Debug, Clone, Copy)]
pub struct MeasurementEngine {
    /// Derived lengths at or below this value (millimeters) are flagged.
    min_plausible_mm: f32,
}

impl MeasurementEngine {
    /// Creates an engine with the given plausibility floor.
    pub fn new(min_plausible_mm: f32) -> Self {
        Self { min_plausible_mm }
    }

    /// Builds the durable record for one specimen.
    ///
    /// `pixel` is `None` for an unreadable mask or an empty contour, which
    /// yields a null measurement with `missing_size` set. `mask_ok` records
    /// whether the mask passed validation. `px_mm_ratio` is the drawer-level
    /// calibration ratio, when known.
    pub fn record(
        &self,
        key: &RegionKey,
        pixel: Option<PixelMeasurement>,
        mask_ok: bool,
        px_mm_ratio: Option<f32>,
    ) -> MeasurementRecord {
        let (longest_px, area_px) = match pixel {
            Some(p) => (Some(p.longest_px), Some(p.area_px)),
            None => (None, None),
        };

        let length_mm = match (longest_px, px_mm_ratio) {
            (Some(longest), Some(ratio)) if ratio > 0.0 => Some(longest / ratio),
            _ => None,
        };
        let area_mm2 = match (area_px, px_mm_ratio) {
            (Some(area), Some(ratio)) if ratio > 0.0 => Some(area / (ratio * ratio)),
            _ => None,
        };

        let bad_size = length_mm.is_some_and(|len| len <= self.min_plausible_mm);

        MeasurementRecord {
            full_id: key.to_string(),
            drawer_id: key.drawer.clone(),
            tray_id: key.tray,
            spec_length_mm: length_mm,
            spec_area_mm2: area_mm2,
            longest_px,
            area_px,
            px_mm_ratio,
            mask_ok,
            missing_size: pixel.is_none(),
            bad_size,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    fn filled_rect_mask(w: u32, h: u32, x0: u32, y0: u32, rw: u32, rh: u32) -> GrayImage {
        let mut mask = GrayImage::new(w, h);
        for y in y0..y0 + rh {
            for x in x0..x0 + rw {
                mask.put_pixel(x, y, Luma([255]));
            }
        }
        mask
    }

    fn spec_key() -> RegionKey {
        RegionKey::drawer("d1").tray(1).specimen(1).unwrap()
    }

    #[test]
    fn rectangle_mask_measures_long_side() {
        let mask = filled_rect_mask(120, 80, 10, 10, 100, 50);
        let m = measure_mask(&mask).unwrap();
        // The traced contour spans the outer pixel centers; a one-pixel
        // boundary offset is expected.
        assert!((m.longest_px - 100.0).abs() <= 1.5, "longest = {}", m.longest_px);
        assert!((m.area_px - 5000.0).abs() / 5000.0 < 0.05, "area = {}", m.area_px);
    }

    #[test]
    fn dominant_contour_wins_over_noise() {
        let mut mask = filled_rect_mask(200, 100, 20, 20, 100, 50);
        // A small distant noise blob, as left behind by a failed repair.
        for y in 5..8 {
            for x in 160..163 {
                mask.put_pixel(x, y, Luma([255]));
            }
        }
        let m = measure_mask(&mask).unwrap();
        assert!((m.longest_px - 100.0).abs() <= 1.5, "longest = {}", m.longest_px);
    }

    #[test]
    fn empty_mask_measures_none() {
        let mask = GrayImage::new(50, 50);
        assert!(measure_mask(&mask).is_none());
    }

    #[test]
    fn calibration_converts_units() {
        let engine = MeasurementEngine::new(5.0);
        let record = engine.record(
            &spec_key(),
            Some(PixelMeasurement {
                longest_px: 100.0,
                area_px: 5000.0,
            }),
            true,
            Some(10.0),
        );
        assert_eq!(record.spec_length_mm, Some(10.0));
        assert_eq!(record.spec_area_mm2, Some(50.0));
        assert!(!record.bad_size);
        assert!(!record.missing_size);
        assert!(record.mask_ok);
    }

    #[test]
    fn implausibly_small_length_is_flagged() {
        let engine = MeasurementEngine::new(5.0);
        let record = engine.record(
            &spec_key(),
            Some(PixelMeasurement {
                longest_px: 40.0,
                area_px: 400.0,
            }),
            true,
            Some(10.0),
        );
        assert_eq!(record.spec_length_mm, Some(4.0));
        assert!(record.bad_size);
    }

    #[test]
    fn missing_ratio_leaves_calibrated_fields_null() {
        let engine = MeasurementEngine::new(5.0);
        let record = engine.record(
            &spec_key(),
            Some(PixelMeasurement {
                longest_px: 40.0,
                area_px: 400.0,
            }),
            true,
            None,
        );
        assert_eq!(record.spec_length_mm, None);
        assert_eq!(record.spec_area_mm2, None);
        // Plausibility cannot be judged without units.
        assert!(!record.bad_size);
    }

    #[test]
    fn null_measurement_sets_missing_size() {
        let engine = MeasurementEngine::new(5.0);
        let record = engine.record(&spec_key(), None, false, Some(10.0));
        assert!(record.missing_size);
        assert_eq!(record.longest_px, None);
        assert_eq!(record.spec_length_mm, None);
        assert!(!record.mask_ok);
    }
}
