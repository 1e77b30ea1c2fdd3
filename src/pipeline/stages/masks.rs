//! Specimen-level stages: outline detection and mask construction.
//!
//! Specimen crops are already within the preview bound, so the outline
//! detector sees each crop directly and its polygons arrive in the crop's
//! own plane; mask rasters therefore share the specimen crop's dimensions.

use crate::core::{PipelineError, RegionKey};
use crate::detection::{DetectionService, DetectionSet};
use crate::geometry::Point;
use crate::invoke::ResilientInvoker;
use crate::ledger::WorkUnit;
use crate::mask::{build_class_masks, repair_mask};
use crate::pipeline::context::StageContext;
use crate::pipeline::runner::{run_cpu_stage, StageOutcome, StageSummary};
use crate::pipeline::stages::{keyed_images, run_detect_stage, DetectUnit};
use crate::utils;
use std::path::PathBuf;
use tracing::debug;

/// Runs outline detection over every specimen crop.
pub async fn detect_specimen_outlines(
    ctx: &StageContext,
    detector: &dyn DetectionService,
    invoker: &ResilientInvoker,
) -> Result<StageSummary, PipelineError> {
    let units = keyed_images(&ctx.layout.specimens_dir(), true, true)?
        .into_iter()
        .map(|(key, preview)| DetectUnit {
            output: ctx.layout.coordinates_json(&key),
            key,
            preview,
        })
        .collect();
    Ok(run_detect_stage("detect-outlines", ctx, units, detector, invoker).await)
}

/// One specimen's mask construction work.
struct MaskUnit {
    key: RegionKey,
    specimen: PathBuf,
    /// Outline polygons in the crop's plane, in detection order.
    polygons: Vec<Vec<Point>>,
    outputs: Vec<PathBuf>,
}

impl WorkUnit for MaskUnit {
    fn unit_id(&self) -> String {
        self.key.to_string()
    }

    fn expected_outputs(&self) -> Vec<PathBuf> {
        self.outputs.clone()
    }
}

/// Rasterizes and repairs the body mask(s) of every specimen with persisted
/// outline detections.
///
/// Each outline instance gets its own raster so two physically distinct
/// objects never merge into one mask; every raster is repaired down to a
/// single connected component before it is saved.
pub fn build_specimen_masks(ctx: &StageContext) -> Result<StageSummary, PipelineError> {
    let label = &ctx.config.labels.outline;
    let mut units = Vec::new();

    for (key, specimen) in keyed_images(&ctx.layout.specimens_dir(), true, true)? {
        let json = ctx.layout.coordinates_json(&key);
        if !json.exists() {
            debug!(specimen = %key, "no outline detections persisted yet");
            continue;
        }
        let set = DetectionSet::load(&json)?;
        let polygons: Vec<Vec<Point>> = set
            .with_label(label)
            .filter_map(|record| match &record.shape {
                crate::detection::DetectionShape::Polygon { points } => Some(points.clone()),
                crate::detection::DetectionShape::Box { .. } => None,
            })
            .collect();
        if polygons.is_empty() {
            continue;
        }
        let outputs = (1..=polygons.len() as u32)
            .map(|instance| ctx.layout.mask_image(&key, instance))
            .collect();
        units.push(MaskUnit {
            key,
            specimen,
            polygons,
            outputs,
        });
    }

    let label = label.clone();
    Ok(run_cpu_stage(
        "build-masks",
        units,
        &ctx.config.parallel,
        move |unit| {
            let plane = utils::image_plane_of(&unit.specimen)?;
            let labelled: Vec<(String, Vec<Point>)> = unit
                .polygons
                .iter()
                .map(|points| (label.clone(), points.clone()))
                .collect();

            let mut masks = build_class_masks(&labelled, plane);
            if masks.is_empty() {
                return Ok(StageOutcome::Skipped("no outline polygons".to_string()));
            }
            for (mask, output) in masks.iter_mut().zip(&unit.outputs) {
                let report = repair_mask(&mut mask.image);
                if !report.was_clean() {
                    debug!(
                        unit = %unit.key,
                        components = report.components,
                        removed = report.removed_area,
                        "mask repaired"
                    );
                }
                utils::save_gray_image(&mask.image, output)?;
            }
            Ok(StageOutcome::Completed)
        },
    ))
}
