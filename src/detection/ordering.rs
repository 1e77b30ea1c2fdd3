//! Stable reading-order assignment for detected regions.
//!
//! Detections within one parent region are sorted left-to-right,
//! top-to-bottom by a single-pass greedy row clustering: the detections are
//! sorted by `(y, x)`, then walked while accumulating a current row; a
//! detection opens a new row when its `y` departs from the row's first member
//! by more than the row threshold. Each closed row is emitted sorted by `x`.
//!
//! This is tolerant of y-jitter within a row but assumes rows do not
//! vertically overlap by more than the threshold; it is not a true row
//! segmentation. Indices are 1-based, assigned in emission order, and become
//! part of derived filenames: they are deterministic across re-runs of the
//! same input set, but not across different detection lists.

use crate::detection::record::DetectionRecord;

/// Row-break threshold for the greedy clustering.
#[derive(Debug, Clone, Copy)]
pub enum RowThreshold {
    /// Threshold as a fraction of the preview height. This form stays
    /// correct when the preview resolution is reconfigured.
    FractionOfHeight(f32),
    /// Absolute threshold in preview pixels. Tied to one preview resolution;
    /// prefer [`RowThreshold::FractionOfHeight`] unless the resolution is
    /// fixed.
    Pixels(f32),
}

impl RowThreshold {
    fn resolve(self, preview_height: f32) -> f32 {
        match self {
            RowThreshold::FractionOfHeight(fraction) => fraction * preview_height,
            RowThreshold::Pixels(px) => px,
        }
    }
}

/// A detection plus its 1-based reading-order index.
#[derive(Debug, Clone)]
pub struct OrderedRegion {
    /// Sequence index, starting at 1. Part of the derived output filename
    /// and therefore durable.
    pub index: u32,
    /// The underlying detection.
    pub record: DetectionRecord,
}

/// Assigns stable reading-order indices to detections within one parent.
#[derive(Debug, Clone, Copy)]
pub struct SpatialOrderer {
    threshold: RowThreshold,
}

impl SpatialOrderer {
    /// Creates an orderer with the given row threshold.
    pub fn new(threshold: RowThreshold) -> Self {
        Self { threshold }
    }

    /// Orders a set of detections into reading order.
    ///
    /// `preview_height` resolves fractional thresholds; it is the height of
    /// the preview plane the detections were produced on.
    pub fn order(&self, records: Vec<DetectionRecord>, preview_height: f32) -> Vec<OrderedRegion> {
        let threshold = self.threshold.resolve(preview_height);

        let mut sorted = records;
        sorted.sort_by(|a, b| {
            let (ax, ay) = a.anchor();
            let (bx, by) = b.anchor();
            ay.partial_cmp(&by)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(ax.partial_cmp(&bx).unwrap_or(std::cmp::Ordering::Equal))
        });

        let mut ordered = Vec::with_capacity(sorted.len());
        let mut row: Vec<DetectionRecord> = Vec::new();
        let mut row_anchor_y = 0.0f32;

        for record in sorted {
            let (_, y) = record.anchor();
            if row.is_empty() {
                row_anchor_y = y;
                row.push(record);
            } else if (y - row_anchor_y).abs() > threshold {
                Self::emit_row(&mut row, &mut ordered);
                row_anchor_y = y;
                row.push(record);
            } else {
                row.push(record);
            }
        }
        Self::emit_row(&mut row, &mut ordered);

        ordered
            .into_iter()
            .enumerate()
            .map(|(i, record)| OrderedRegion {
                index: i as u32 + 1,
                record,
            })
            .collect()
    }

    /// Flushes the current row, sorted by x ascending.
    fn emit_row(row: &mut Vec<DetectionRecord>, out: &mut Vec<DetectionRecord>) {
        row.sort_by(|a, b| {
            let (ax, _) = a.anchor();
            let (bx, _) = b.anchor();
            ax.partial_cmp(&bx).unwrap_or(std::cmp::Ordering::Equal)
        });
        out.append(row);
    }
}

impl Default for SpatialOrderer {
    /// Default threshold: 5% of the preview height (50 px at 1000 px).
    fn default() -> Self {
        Self::new(RowThreshold::FractionOfHeight(0.05))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn box_at(x: f32, y: f32) -> DetectionRecord {
        // Anchor equals (x, y) for a zero-size box centered there.
        DetectionRecord::new_box("tray", 0.9, x, y, 0.0, 0.0)
    }

    fn anchors(ordered: &[OrderedRegion]) -> Vec<(f32, f32)> {
        ordered.iter().map(|r| r.record.anchor()).collect()
    }

    #[test]
    fn two_rows_split_at_threshold() {
        let orderer = SpatialOrderer::new(RowThreshold::Pixels(50.0));
        let detections = vec![
            box_at(300.0, 405.0),
            box_at(100.0, 10.0),
            box_at(200.0, 400.0),
            box_at(50.0, 12.0),
        ];
        let ordered = orderer.order(detections, 1000.0);

        assert_eq!(
            anchors(&ordered),
            vec![(50.0, 12.0), (100.0, 10.0), (200.0, 400.0), (300.0, 405.0)]
        );
        let indices: Vec<u32> = ordered.iter().map(|r| r.index).collect();
        assert_eq!(indices, vec![1, 2, 3, 4]);
    }

    #[test]
    fn ordering_is_idempotent() {
        let orderer = SpatialOrderer::default();
        let detections = vec![
            box_at(500.0, 100.0),
            box_at(100.0, 110.0),
            box_at(300.0, 400.0),
            box_at(120.0, 95.0),
        ];
        let first = orderer.order(detections.clone(), 1000.0);
        let second = orderer.order(detections, 1000.0);
        assert_eq!(anchors(&first), anchors(&second));
    }

    #[test]
    fn fractional_threshold_scales_with_preview_height() {
        // 30 px apart: same row at 1000 px preview (threshold 50), separate
        // rows at 400 px preview (threshold 20).
        let orderer = SpatialOrderer::new(RowThreshold::FractionOfHeight(0.05));
        let detections = vec![box_at(200.0, 40.0), box_at(100.0, 10.0)];

        let at_1000 = orderer.order(detections.clone(), 1000.0);
        assert_eq!(anchors(&at_1000), vec![(100.0, 10.0), (200.0, 40.0)]);

        let at_400 = orderer.order(detections, 400.0);
        assert_eq!(anchors(&at_400), vec![(100.0, 10.0), (200.0, 40.0)]);
    }

    #[test]
    fn fractional_threshold_changes_row_breaks() {
        // 30 px apart with x reversed: one row keeps x-sort, two rows keep
        // y-sort.
        let orderer = SpatialOrderer::new(RowThreshold::FractionOfHeight(0.05));
        let detections = vec![box_at(200.0, 10.0), box_at(100.0, 40.0)];

        // Threshold 50 px: one row, sorted by x.
        let one_row = orderer.order(detections.clone(), 1000.0);
        assert_eq!(anchors(&one_row), vec![(100.0, 40.0), (200.0, 10.0)]);

        // Threshold 20 px: two rows, y order wins.
        let two_rows = orderer.order(detections, 400.0);
        assert_eq!(anchors(&two_rows), vec![(200.0, 10.0), (100.0, 40.0)]);
    }

    #[test]
    fn empty_input_yields_empty_output() {
        let ordered = SpatialOrderer::default().order(Vec::new(), 1000.0);
        assert!(ordered.is_empty());
    }

    #[test]
    fn indices_are_one_based() {
        let ordered = SpatialOrderer::default().order(vec![box_at(0.0, 0.0)], 1000.0);
        assert_eq!(ordered[0].index, 1);
    }
}
