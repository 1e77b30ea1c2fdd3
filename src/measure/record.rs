//! The durable measurements table.
//!
//! One row per specimen, append-only, keyed by the specimen's full region
//! key. Row identity drives the measurement stage's resumability: keys
//! already present in the table are not re-measured.

use crate::core::errors::PipelineError;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs::OpenOptions;
use std::path::Path;

/// One row of `measurements/measurements.csv`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeasurementRecord {
    /// Full region key of the specimen.
    pub full_id: String,
    /// Drawer identifier.
    pub drawer_id: String,
    /// 1-based tray index, when the specimen sits in a tray.
    pub tray_id: Option<u32>,
    /// Calibrated specimen length in millimeters.
    pub spec_length_mm: Option<f32>,
    /// Calibrated specimen area in square millimeters.
    pub spec_area_mm2: Option<f32>,
    /// Longer side of the minimum-area rectangle, in pixels.
    pub longest_px: Option<f32>,
    /// Dominant contour area, in pixels.
    pub area_px: Option<f32>,
    /// Calibration ratio in pixels per millimeter, when known.
    pub px_mm_ratio: Option<f32>,
    /// Whether the mask passed validation.
    #[serde(rename = "mask_OK")]
    pub mask_ok: bool,
    /// Whether the measurement is null (no contour / unreadable mask).
    pub missing_size: bool,
    /// Whether the derived length is implausibly small.
    pub bad_size: bool,
}

/// Appends records to the measurements table, creating it (with headers) on
/// first write.
pub fn append_measurements(
    path: &Path,
    records: &[MeasurementRecord],
) -> Result<(), PipelineError> {
    if records.is_empty() {
        return Ok(());
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let is_new = !path.exists();
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    let mut writer = csv::WriterBuilder::new()
        .has_headers(is_new)
        .from_writer(file);
    for record in records {
        writer.serialize(record)?;
    }
    writer.flush()?;
    Ok(())
}

/// Reads the set of specimen keys already present in the table.
///
/// A missing table yields an empty set.
pub fn read_measured_ids(path: &Path) -> Result<HashSet<String>, PipelineError> {
    let mut ids = HashSet::new();
    if !path.exists() {
        return Ok(ids);
    }
    let mut reader = csv::Reader::from_path(path)?;
    for row in reader.deserialize::<MeasurementRecord>() {
        ids.insert(row?.full_id);
    }
    Ok(ids)
}
