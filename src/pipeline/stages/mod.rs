//! The concrete pipeline stages and their shared work-unit types.
//!
//! Stage order for one drawer:
//!
//! 1. [`prepare_drawer_previews`]: bounded previews of the drawer photos
//! 2. [`detect_trays`] / [`crop_trays`]: drawer to tray regions
//! 3. [`prepare_tray_previews`] / [`detect_specimens`] / [`crop_specimens`]:
//!    tray to specimen regions
//! 4. [`detect_specimen_outlines`] / [`build_specimen_masks`]: specimen to
//!    mask
//! 5. [`measure_drawer`]: mask to measurement row
//! 6. [`transcribe_labels`]: specimen crop to transcription row
//!
//! Each stage is resumable: re-invoking it over the same inputs after a
//! partial failure performs only the remaining work.

mod masks;
mod measure;
mod specimens;
mod transcribe;
mod trays;

pub use masks::{build_specimen_masks, detect_specimen_outlines};
pub use measure::measure_drawer;
pub use specimens::{crop_specimens, detect_specimens, prepare_tray_previews};
pub use transcribe::{transcribe_labels, TRANSCRIPTION_ERROR_MARKER};
pub use trays::{crop_trays, detect_trays, prepare_drawer_previews};

use crate::core::{PipelineError, RegionKey};
use crate::detection::{DetectionService, DetectionSet};
use crate::geometry::PixelRect;
use crate::invoke::ResilientInvoker;
use crate::ledger::WorkUnit;
use crate::pipeline::context::StageContext;
use crate::pipeline::runner::{
    run_cpu_stage, run_service_stage, PipelineReport, StageOutcome, StageSummary,
};
use crate::utils;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// A preview to generate for one source image.
pub(crate) struct PreviewUnit {
    pub key: RegionKey,
    pub source: PathBuf,
    pub output: PathBuf,
}

impl WorkUnit for PreviewUnit {
    fn unit_id(&self) -> String {
        self.key.to_string()
    }

    fn expected_outputs(&self) -> Vec<PathBuf> {
        vec![self.output.clone()]
    }
}

/// One preview to run through a detection service.
pub(crate) struct DetectUnit {
    pub key: RegionKey,
    pub preview: PathBuf,
    pub output: PathBuf,
}

impl WorkUnit for DetectUnit {
    fn unit_id(&self) -> String {
        self.key.to_string()
    }

    fn expected_outputs(&self) -> Vec<PathBuf> {
        vec![self.output.clone()]
    }
}

/// One planned crop out of a parent's native plane.
pub(crate) struct CropPlan {
    pub child: RegionKey,
    pub rect: PixelRect,
    pub output: PathBuf,
}

/// All crops of one parent region. The parent is the unit of work: it is
/// complete only when every one of its crops exists.
pub(crate) struct CropUnit {
    pub parent: RegionKey,
    pub native: PathBuf,
    pub crops: Vec<CropPlan>,
}

impl WorkUnit for CropUnit {
    fn unit_id(&self) -> String {
        self.parent.to_string()
    }

    fn expected_outputs(&self) -> Vec<PathBuf> {
        self.crops.iter().map(|c| c.output.clone()).collect()
    }
}

/// Generates previews for a list of keyed source images.
pub(crate) fn run_preview_stage(
    stage: &'static str,
    ctx: &StageContext,
    units: Vec<PreviewUnit>,
) -> StageSummary {
    let max_dim = ctx.config.preview_max_dim;
    run_cpu_stage(stage, units, &ctx.config.parallel, |unit| {
        let image = utils::load_image(&unit.source)?;
        let preview = utils::make_preview(&image, max_dim);
        utils::save_rgb_image(&preview, &unit.output)?;
        Ok(StageOutcome::Completed)
    })
}

/// Runs a detection service over a list of previews, persisting each raw
/// response as JSON. The JSON is the durable record of the call; resumed
/// runs skip previews whose JSON already exists.
pub(crate) async fn run_detect_stage(
    stage: &'static str,
    ctx: &StageContext,
    units: Vec<DetectUnit>,
    detector: &dyn DetectionService,
    invoker: &ResilientInvoker,
) -> StageSummary {
    let confidence = ctx.config.confidence_threshold;
    let overlap = ctx.config.overlap_threshold;
    run_service_stage(stage, units, |unit| async move {
        if !unit.preview.exists() {
            return Ok(StageOutcome::Skipped(format!(
                "preview missing: {}",
                unit.preview.display()
            )));
        }
        let bytes = std::fs::read(&unit.preview)?;
        let records = invoker
            .invoke(|| detector.detect(&bytes, confidence, overlap))
            .await?;
        debug!(unit = %unit.key, detections = records.len(), "detector response");
        DetectionSet::new(records).save(&unit.output)?;
        Ok(StageOutcome::Completed)
    })
    .await
}

/// Plans the crops of one parent region from its persisted detections.
///
/// Box detections of `label` are ordered into reading order, re-projected
/// onto the parent's native plane, and paired with their deterministic
/// output paths. Degenerate projections are dropped here, so the resulting
/// unit's expected-output set is exact.
pub(crate) fn plan_crops(
    ctx: &StageContext,
    parent: &RegionKey,
    native: &PathBuf,
    make_child: impl Fn(&RegionKey, u32) -> Result<RegionKey, PipelineError>,
    target: impl Fn(&RegionKey) -> PathBuf,
    label: &str,
) -> Result<Option<CropUnit>, PipelineError> {
    let json = ctx.layout.coordinates_json(parent);
    if !json.exists() {
        debug!(parent = %parent, "no detections persisted yet");
        return Ok(None);
    }
    let preview_path = ctx.layout.preview_image(parent);
    if !preview_path.exists() {
        warn!(parent = %parent, "preview missing for persisted detections");
        return Ok(None);
    }

    let preview_plane = utils::image_plane_of(&preview_path)?;
    let native_plane = utils::image_plane_of(native)?;
    let mapper = match ctx.mapper_for(preview_plane, native_plane) {
        Ok(mapper) => mapper,
        Err(err) => {
            warn!(parent = %parent, error = %err, "corrupt preview pairing, skipping");
            return Ok(None);
        }
    };

    let set = DetectionSet::load(&json)?;
    let boxes: Vec<_> = set
        .with_label(label)
        .filter(|r| !r.is_polygon())
        .cloned()
        .collect();
    let ordered = ctx.orderer().order(boxes, preview_plane.height as f32);

    let mut crops = Vec::with_capacity(ordered.len());
    for region in ordered {
        let child = make_child(parent, region.index)?;
        let rect = match &region.record.shape {
            crate::detection::DetectionShape::Box {
                cx,
                cy,
                width,
                height,
            } => mapper.project_box(*cx, *cy, *width, *height),
            crate::detection::DetectionShape::Polygon { .. } => None,
        };
        match rect {
            Some(rect) => crops.push(CropPlan {
                output: target(&child),
                child,
                rect,
            }),
            None => debug!(child = %child, "degenerate projection discarded"),
        }
    }

    if crops.is_empty() {
        return Ok(None);
    }
    Ok(Some(CropUnit {
        parent: parent.clone(),
        native: native.clone(),
        crops,
    }))
}

/// Executes planned crop units: load the native plane once per parent, cut
/// every planned rectangle, and save each crop at its deterministic path.
pub(crate) fn run_crop_stage(
    stage: &'static str,
    ctx: &StageContext,
    units: Vec<CropUnit>,
) -> StageSummary {
    run_cpu_stage(stage, units, &ctx.config.parallel, |unit| {
        let native = utils::load_image(&unit.native)?;
        for plan in &unit.crops {
            let crop = utils::crop_rect(&native, plan.rect);
            utils::save_rgb_image(&crop, &plan.output)?;
        }
        Ok(StageOutcome::Completed)
    })
}

/// Keys of images in a directory whose stems parse at the expected depth.
///
/// `want_tray`/`want_specimen` select the depth: drawer photos, tray crops,
/// or specimen crops. Files that do not parse are ignored with a log line.
pub(crate) fn keyed_images(
    dir: &PathBuf,
    want_tray: bool,
    want_specimen: bool,
) -> Result<Vec<(RegionKey, PathBuf)>, PipelineError> {
    let mut keyed = Vec::new();
    for path in utils::list_images(dir)? {
        let stem = utils::file_stem(&path);
        match RegionKey::parse(&stem) {
            Ok(key)
                if key.tray.is_some() == want_tray
                    && key.specimen.is_some() == want_specimen =>
            {
                keyed.push((key, path));
            }
            Ok(_) => {}
            Err(_) => debug!(file = %path.display(), "unparseable file stem ignored"),
        }
    }
    Ok(keyed)
}

/// The external services one drawer run needs.
#[derive(Clone)]
pub struct DrawerServices {
    /// Detector locating trays on drawer previews.
    pub tray_detector: Arc<dyn DetectionService>,
    /// Detector locating specimens on tray previews.
    pub specimen_detector: Arc<dyn DetectionService>,
    /// Detector producing body-outline polygons on specimen crops.
    pub outline_detector: Arc<dyn DetectionService>,
    /// Optional transcription service for specimen labels.
    pub transcriber: Option<Arc<dyn crate::detection::TranscriptionService>>,
}

/// Runs the full pipeline over one drawer and returns the per-stage report.
///
/// `px_mm_ratio` is the drawer-level calibration ratio (pixels per
/// millimeter) derived externally from capture metadata, when known.
/// `label_prompt` is the transcription prompt for specimen labels.
pub async fn run_drawer(
    ctx: &StageContext,
    services: &DrawerServices,
    px_mm_ratio: Option<f32>,
    label_prompt: &str,
) -> Result<PipelineReport, PipelineError> {
    let detection_invoker = ResilientInvoker::new(
        ctx.config.limits.detection,
        ctx.config.retry.policy(),
    );

    let mut report = PipelineReport::default();
    report.push(prepare_drawer_previews(ctx)?);
    report.push(detect_trays(ctx, services.tray_detector.as_ref(), &detection_invoker).await?);
    report.push(crop_trays(ctx)?);
    report.push(prepare_tray_previews(ctx)?);
    report.push(
        detect_specimens(ctx, services.specimen_detector.as_ref(), &detection_invoker).await?,
    );
    report.push(crop_specimens(ctx)?);
    report.push(
        detect_specimen_outlines(ctx, services.outline_detector.as_ref(), &detection_invoker)
            .await?,
    );
    report.push(build_specimen_masks(ctx)?);
    report.push(measure_drawer(ctx, px_mm_ratio)?);

    if let Some(transcriber) = &services.transcriber {
        let transcription_invoker = ResilientInvoker::new(
            ctx.config.limits.transcription,
            ctx.config.retry.policy(),
        );
        report.push(
            transcribe_labels(ctx, transcriber.as_ref(), &transcription_invoker, label_prompt)
                .await?,
        );
    }

    info!(drawer = ctx.layout.drawer_id(), "{report}");
    Ok(report)
}
