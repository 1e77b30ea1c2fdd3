//! Tray-level stages: tray previews, specimen detection, and specimen
//! cropping.

use crate::core::PipelineError;
use crate::detection::DetectionService;
use crate::invoke::ResilientInvoker;
use crate::pipeline::context::StageContext;
use crate::pipeline::runner::StageSummary;
use crate::pipeline::stages::{
    keyed_images, plan_crops, run_crop_stage, run_detect_stage, run_preview_stage, DetectUnit,
    PreviewUnit,
};

/// Generates bounded previews for every tray crop.
pub fn prepare_tray_previews(ctx: &StageContext) -> Result<StageSummary, PipelineError> {
    let units = keyed_images(&ctx.layout.trays_dir(), true, false)?
        .into_iter()
        .map(|(key, source)| PreviewUnit {
            output: ctx.layout.preview_image(&key),
            key,
            source,
        })
        .collect();
    Ok(run_preview_stage("tray-previews", ctx, units))
}

/// Runs specimen detection over every tray preview.
pub async fn detect_specimens(
    ctx: &StageContext,
    detector: &dyn DetectionService,
    invoker: &ResilientInvoker,
) -> Result<StageSummary, PipelineError> {
    let units = keyed_images(&ctx.layout.preview_dir(), true, false)?
        .into_iter()
        .map(|(key, preview)| DetectUnit {
            output: ctx.layout.coordinates_json(&key),
            key,
            preview,
        })
        .collect();
    Ok(run_detect_stage("detect-specimens", ctx, units, detector, invoker).await)
}

/// Crops every detected specimen out of its tray's native plane.
pub fn crop_specimens(ctx: &StageContext) -> Result<StageSummary, PipelineError> {
    let label = ctx.config.labels.specimen.clone();
    let mut units = Vec::new();
    for (key, native) in keyed_images(&ctx.layout.trays_dir(), true, false)? {
        if let Some(unit) = plan_crops(
            ctx,
            &key,
            &native,
            |parent, index| parent.specimen(index),
            |child| ctx.layout.specimen_image(child),
            &label,
        )? {
            units.push(unit);
        }
    }
    Ok(run_crop_stage("crop-specimens", ctx, units))
}
