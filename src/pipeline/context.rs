//! Explicit per-run context passed into every stage.
//!
//! Stages receive the drawer layout and the configuration as one object
//! instead of consulting ambient state, which keeps units independently
//! testable.

use crate::core::{DrawerLayout, PipelineConfig, PipelineError};
use crate::detection::{RowThreshold, SpatialOrderer};
use crate::geometry::{CoordinateMapper, ImagePlane};

/// Context shared by the stages of one drawer run.
#[derive(Debug, Clone)]
pub struct StageContext {
    /// On-disk layout of the drawer being processed.
    pub layout: DrawerLayout,
    /// Pipeline configuration.
    pub config: PipelineConfig,
}

impl StageContext {
    /// Creates a context for one drawer.
    pub fn new(layout: DrawerLayout, config: PipelineConfig) -> Self {
        Self { layout, config }
    }

    /// The spatial orderer configured for this run.
    pub fn orderer(&self) -> SpatialOrderer {
        SpatialOrderer::new(RowThreshold::FractionOfHeight(
            self.config.row_threshold_fraction,
        ))
    }

    /// Builds a coordinate mapper for a preview/native pair, applying the
    /// configured crop buffer and pairing tolerance.
    pub fn mapper_for(
        &self,
        preview: ImagePlane,
        native: ImagePlane,
    ) -> Result<CoordinateMapper, PipelineError> {
        CoordinateMapper::new(
            preview,
            native,
            self.config.crop_buffer_px,
            self.config.pair_aspect_tolerance,
        )
    }
}
