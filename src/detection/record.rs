//! Detection records and their JSON persistence.

use crate::core::errors::PipelineError;
use crate::geometry::Point;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

/// Geometry of a single detection, in preview-plane coordinates.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DetectionShape {
    /// Axis-aligned box given by its center and extent.
    Box {
        /// Center x-coordinate.
        cx: f32,
        /// Center y-coordinate.
        cy: f32,
        /// Box width.
        width: f32,
        /// Box height.
        height: f32,
    },
    /// Closed polygon tracing the object boundary.
    Polygon {
        /// Polygon vertices in order.
        points: Vec<Point>,
    },
}

/// One detection returned by the external detector.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionRecord {
    /// Class label assigned by the detector.
    pub label: String,
    /// Detector confidence in `[0, 1]`.
    pub confidence: f32,
    /// Detection geometry.
    pub shape: DetectionShape,
}

impl DetectionRecord {
    /// Creates a box detection.
    pub fn new_box(label: impl Into<String>, confidence: f32, cx: f32, cy: f32, width: f32, height: f32) -> Self {
        Self {
            label: label.into(),
            confidence,
            shape: DetectionShape::Box {
                cx,
                cy,
                width,
                height,
            },
        }
    }

    /// Creates a polygon detection.
    pub fn new_polygon(label: impl Into<String>, confidence: f32, points: Vec<Point>) -> Self {
        Self {
            label: label.into(),
            confidence,
            shape: DetectionShape::Polygon { points },
        }
    }

    /// Top-left anchor of the detection, used for reading-order sorting.
    pub fn anchor(&self) -> (f32, f32) {
        match &self.shape {
            DetectionShape::Box {
                cx,
                cy,
                width,
                height,
            } => (cx - width / 2.0, cy - height / 2.0),
            DetectionShape::Polygon { points } => {
                let min_x = points.iter().map(|p| p.x).fold(f32::INFINITY, f32::min);
                let min_y = points.iter().map(|p| p.y).fold(f32::INFINITY, f32::min);
                (min_x, min_y)
            }
        }
    }

    /// True when the detection carries polygon geometry.
    pub fn is_polygon(&self) -> bool {
        matches!(self.shape, DetectionShape::Polygon { .. })
    }
}

/// The full detector response for one preview image, as persisted to
/// `coordinates/<key>.json`.
///
/// The file is the durable record of the (slow, rate-limited) service call;
/// resumed runs read it back instead of calling the service again.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DetectionSet {
    /// All detections for the preview, unordered.
    pub records: Vec<DetectionRecord>,
}

impl DetectionSet {
    /// Creates a set from detector output.
    pub fn new(records: Vec<DetectionRecord>) -> Self {
        Self { records }
    }

    /// Records matching a class label.
    pub fn with_label<'a>(&'a self, label: &'a str) -> impl Iterator<Item = &'a DetectionRecord> {
        self.records.iter().filter(move |r| r.label == label)
    }

    /// Writes the set as pretty-printed JSON, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<(), PipelineError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, self)?;
        writer.flush()?;
        Ok(())
    }

    /// Reads a set back from JSON.
    pub fn load(path: &Path) -> Result<Self, PipelineError> {
        let file = File::open(path)?;
        Ok(serde_json::from_reader(BufReader::new(file))?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn box_anchor_is_top_left() {
        let det = DetectionRecord::new_box("tray", 0.9, 100.0, 60.0, 40.0, 20.0);
        assert_eq!(det.anchor(), (80.0, 50.0));
    }

    #[test]
    fn polygon_anchor_is_min_corner() {
        let det = DetectionRecord::new_polygon(
            "specimen",
            0.8,
            vec![
                Point::new(30.0, 40.0),
                Point::new(10.0, 70.0),
                Point::new(50.0, 55.0),
            ],
        );
        assert_eq!(det.anchor(), (10.0, 40.0));
    }

    #[test]
    fn shape_json_round_trips_both_forms() {
        let set = DetectionSet::new(vec![
            DetectionRecord::new_box("tray", 0.95, 10.0, 20.0, 30.0, 40.0),
            DetectionRecord::new_polygon(
                "outline",
                0.7,
                vec![Point::new(1.0, 2.0), Point::new(3.0, 4.0), Point::new(5.0, 0.0)],
            ),
        ]);
        let json = serde_json::to_string(&set).unwrap();
        let back: DetectionSet = serde_json::from_str(&json).unwrap();
        assert_eq!(back.records.len(), 2);
        assert!(!back.records[0].is_polygon());
        assert!(back.records[1].is_polygon());
    }

    #[test]
    fn save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("coordinates").join("d1.json");
        let set = DetectionSet::new(vec![DetectionRecord::new_box("tray", 0.5, 1.0, 2.0, 3.0, 4.0)]);
        set.save(&path).unwrap();
        let back = DetectionSet::load(&path).unwrap();
        assert_eq!(back.records.len(), 1);
        assert_eq!(back.records[0].label, "tray");
    }
}
