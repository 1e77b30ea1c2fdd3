//! # Trayscan
//!
//! A Rust library that digitizes museum specimen-drawer photographs into
//! individually measured and transcribed specimen records.
//!
//! A single oversized drawer photograph is cascaded through detection stages
//! at progressively finer physical scale: drawer, then tray, then specimen. Each
//! stage locates sub-regions with an external object detector running on a
//! small preview image, then re-projects the detector's coordinates back onto
//! the full-resolution original before cropping.
//!
//! ## Features
//!
//! - Preview/native coordinate re-projection with per-axis scale correction
//! - Deterministic row-major ordering of detected regions
//! - Idempotent, resumable stages gated by durable on-disk state
//! - Polygon mask rasterization, connected-component repair, and validation
//! - Calibrated length/area measurement from mask contours
//! - Resilient external-service invocation (bounded concurrency, retry with
//!   exponential backoff)
//!
//! ## Modules
//!
//! * [`core`] - Error types, configuration, region keys, and on-disk layout
//! * [`geometry`] - Points, image planes, scale factors, coordinate mapping
//! * [`detection`] - Detection records, spatial ordering, service contracts
//! * [`ledger`] - Existence-based skip logic for resumable stages
//! * [`mask`] - Mask construction, repair, and validation
//! * [`measure`] - Contour-based measurement and the measurements table
//! * [`invoke`] - Retry/backoff wrapper for external service calls
//! * [`pipeline`] - Stage runner and the concrete pipeline stages
//! * [`utils`] - Image loading, preview generation, and cropping helpers
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use trayscan::prelude::*;
//! use std::path::PathBuf;
//!
//! # async fn run(detector: std::sync::Arc<dyn trayscan::detection::DetectionService>) -> Result<(), PipelineError> {
//! let layout = DrawerLayout::new(PathBuf::from("drawers/ento-2024-118"), "ento-2024-118");
//! let config = PipelineConfig::default();
//! let ctx = StageContext::new(layout, config);
//!
//! let invoker = ResilientInvoker::new(
//!     ctx.config.limits.detection,
//!     ctx.config.retry.policy(),
//! );
//!
//! trayscan::pipeline::stages::prepare_drawer_previews(&ctx)?;
//! trayscan::pipeline::stages::detect_trays(&ctx, detector.as_ref(), &invoker).await?;
//! trayscan::pipeline::stages::crop_trays(&ctx)?;
//! # Ok(())
//! # }
//! ```

pub mod core;
pub mod detection;
pub mod geometry;
pub mod invoke;
pub mod ledger;
pub mod mask;
pub mod measure;
pub mod pipeline;
pub mod utils;

/// Prelude module for convenient imports.
///
/// Bring the essentials into scope with a single use statement:
///
/// ```rust
/// use trayscan::prelude::*;
/// ```
pub mod prelude {
    pub use crate::core::{DrawerLayout, PipelineConfig, PipelineError, RegionKey};
    pub use crate::detection::{DetectionRecord, DetectionService, TranscriptionService};
    pub use crate::geometry::{CoordinateMapper, ImagePlane, ScaleFactor};
    pub use crate::invoke::{ResilientInvoker, RetryPolicy, ServiceError};
    pub use crate::pipeline::{StageContext, StageSummary};
}
