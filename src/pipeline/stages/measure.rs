//! Measurement stage: validated masks to measurement rows.

use crate::core::{PipelineError, RegionKey};
use crate::mask::{check_gray_levels, check_pair_agreement};
use crate::measure::{
    append_measurements, measure_mask, read_measured_ids, MeasurementEngine, MeasurementRecord,
};
use crate::pipeline::context::StageContext;
use crate::pipeline::runner::StageSummary;
use crate::pipeline::stages::keyed_images;
use crate::utils;
use rayon::prelude::*;
use std::path::PathBuf;
use std::time::Instant;
use tracing::warn;

/// Measures every specimen mask not yet present in the measurements table
/// and appends the new rows.
///
/// Masks that fail validation (stray gray levels, aspect disagreement with
/// their specimen crop) are excluded from measurement but still rowed with
/// `mask_OK = false`, so the table stays one-row-per-specimen. Unreadable
/// masks and empty contours yield null rows rather than failures. The table
/// itself is the ledger: keys already present are skipped.
pub fn measure_drawer(
    ctx: &StageContext,
    px_mm_ratio: Option<f32>,
) -> Result<StageSummary, PipelineError> {
    let started = Instant::now();
    let csv_path = ctx.layout.measurements_csv();
    let measured = read_measured_ids(&csv_path)?;
    let engine = MeasurementEngine::new(ctx.config.min_plausible_length_mm);
    let tolerance = ctx.config.mask_aspect_tolerance;

    // Instance-suffixed masks belong to secondary class instances; only the
    // primary mask (stem == specimen key) is measured.
    let mut pending: Vec<(RegionKey, PathBuf)> = Vec::new();
    let mut skipped = 0usize;
    for (key, mask_path) in keyed_images(&ctx.layout.masks_dir(), true, true)? {
        if measured.contains(&key.to_string()) {
            skipped += 1;
        } else {
            pending.push((key, mask_path));
        }
    }

    let records: Vec<MeasurementRecord> = pending
        .par_iter()
        .map(|(key, mask_path)| measure_one(ctx, &engine, key, mask_path, tolerance, px_mm_ratio))
        .collect();

    append_measurements(&csv_path, &records)?;

    let degraded = records
        .iter()
        .filter(|r| r.missing_size || !r.mask_ok)
        .count();
    let summary = StageSummary {
        stage: "measure",
        processed: records.len() - degraded,
        skipped,
        errors: degraded,
        elapsed: started.elapsed(),
    };
    summary.log();
    Ok(summary)
}

fn measure_one(
    ctx: &StageContext,
    engine: &MeasurementEngine,
    key: &RegionKey,
    mask_path: &PathBuf,
    tolerance: f32,
    px_mm_ratio: Option<f32>,
) -> MeasurementRecord {
    let mask = match utils::load_gray_image(mask_path) {
        Ok(mask) => mask,
        Err(err) => {
            warn!(unit = %key, error = %err, "unreadable mask, recording null measurement");
            return engine.record(key, None, false, px_mm_ratio);
        }
    };

    let mut mask_ok = check_gray_levels(&mask).is_valid();
    if mask_ok {
        // Pair validation needs the crop's dimensions; a vanished crop
        // cannot agree.
        let crop_path = ctx.layout.specimen_image(key);
        mask_ok = match utils::image_plane_of(&crop_path) {
            Ok(crop_plane) => {
                let mask_plane = crate::geometry::ImagePlane::new(mask.width(), mask.height());
                check_pair_agreement(crop_plane, mask_plane, tolerance).is_valid()
            }
            Err(_) => false,
        };
    }

    if !mask_ok {
        warn!(unit = %key, "mask failed validation, excluded from measurement");
        return engine.record(key, None, false, px_mm_ratio);
    }

    engine.record(key, measure_mask(&mask), true, px_mm_ratio)
}
