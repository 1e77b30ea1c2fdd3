//! Drawer-level stages: previews, tray detection, and tray cropping.

use crate::core::{PipelineError, RegionKey};
use crate::detection::DetectionService;
use crate::invoke::ResilientInvoker;
use crate::pipeline::context::StageContext;
use crate::pipeline::runner::StageSummary;
use crate::pipeline::stages::{
    keyed_images, plan_crops, run_crop_stage, run_detect_stage, run_preview_stage, DetectUnit,
    PreviewUnit,
};

/// Generates bounded previews for every drawer photo in `fullsize/`.
pub fn prepare_drawer_previews(ctx: &StageContext) -> Result<StageSummary, PipelineError> {
    let units = keyed_images(&ctx.layout.fullsize_dir(), false, false)?
        .into_iter()
        .map(|(key, source)| PreviewUnit {
            output: ctx.layout.preview_image(&key),
            key,
            source,
        })
        .collect();
    Ok(run_preview_stage("drawer-previews", ctx, units))
}

/// Runs tray detection over every drawer preview, persisting the raw
/// responses under `coordinates/`.
pub async fn detect_trays(
    ctx: &StageContext,
    detector: &dyn DetectionService,
    invoker: &ResilientInvoker,
) -> Result<StageSummary, PipelineError> {
    let units = keyed_images(&ctx.layout.preview_dir(), false, false)?
        .into_iter()
        .map(|(key, preview)| DetectUnit {
            output: ctx.layout.coordinates_json(&key),
            key,
            preview,
        })
        .collect();
    Ok(run_detect_stage("detect-trays", ctx, units, detector, invoker).await)
}

/// Crops every detected tray out of its drawer's native plane.
pub fn crop_trays(ctx: &StageContext) -> Result<StageSummary, PipelineError> {
    let label = ctx.config.labels.tray.clone();
    let mut units = Vec::new();
    for (key, native) in keyed_images(&ctx.layout.fullsize_dir(), false, false)? {
        if let Some(unit) = plan_crops(
            ctx,
            &key,
            &native,
            |parent: &RegionKey, index| Ok(parent.tray(index)),
            |child| ctx.layout.tray_image(child),
            &label,
        )? {
            units.push(unit);
        }
    }
    Ok(run_crop_stage("crop-trays", ctx, units))
}
