//! Existence-based skip logic that makes every stage resumable.
//!
//! Before doing possibly expensive or fallible work, a stage computes the
//! expected output path(s) of each work unit and enqueues only units whose
//! outputs are absent. A unit counts as done only when its *full* output set
//! exists; a unit with any missing output is re-enqueued. For table-backed
//! stages, a row whose value is the error marker does not count as done, so
//! failed units become eligible again on the next run.
//!
//! The ledger is recomputed from durable state (the filesystem, the
//! accumulated CSV) at the start of every stage invocation; it is never held
//! in memory across runs.

use crate::core::errors::PipelineError;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::debug;

/// An addressable piece of work for one stage.
///
/// A unit carries enough identity to compute its expected output paths
/// deterministically, with no index file.
pub trait WorkUnit {
    /// Stable identifier of this unit, used in logs and summaries.
    fn unit_id(&self) -> String;

    /// Every output path this unit is expected to produce.
    fn expected_outputs(&self) -> Vec<PathBuf>;
}

/// Filesystem-backed completion checks for work units.
#[derive(Debug, Clone, Copy, Default)]
pub struct TaskLedger;

impl TaskLedger {
    /// True when every expected output of the unit exists.
    pub fn is_complete(unit: &impl WorkUnit) -> bool {
        let outputs = unit.expected_outputs();
        !outputs.is_empty() && outputs.iter().all(|path| path.exists())
    }

    /// Splits units into those still pending and the count of skipped ones.
    pub fn partition_pending<U: WorkUnit>(units: Vec<U>) -> (Vec<U>, usize) {
        let mut pending = Vec::with_capacity(units.len());
        let mut skipped = 0usize;
        for unit in units {
            if Self::is_complete(&unit) {
                debug!(unit = %unit.unit_id(), "outputs exist, skipping");
                skipped += 1;
            } else {
                pending.push(unit);
            }
        }
        (pending, skipped)
    }
}

/// Completion ledger for CSV-backed stages, keyed by an identifier column.
///
/// A key is done when its row exists and the value column is not the error
/// marker. Loaded fresh from the table at every stage start.
#[derive(Debug, Clone)]
pub struct CsvKeyLedger {
    done: HashSet<String>,
}

impl CsvKeyLedger {
    /// Loads completed keys from `path`.
    ///
    /// A missing file yields an empty ledger (first run). `key_column` and
    /// `value_column` name header fields; rows whose value equals
    /// `error_marker` are treated as not done.
    pub fn load(
        path: &Path,
        key_column: &str,
        value_column: &str,
        error_marker: &str,
    ) -> Result<Self, PipelineError> {
        let mut done = HashSet::new();
        if !path.exists() {
            return Ok(Self { done });
        }

        let mut reader = csv::Reader::from_path(path)?;
        let headers = reader.headers()?.clone();
        let key_idx = headers.iter().position(|h| h == key_column).ok_or_else(|| {
            PipelineError::invalid_input(format!(
                "table {} has no '{}' column",
                path.display(),
                key_column
            ))
        })?;
        let value_idx = headers
            .iter()
            .position(|h| h == value_column)
            .ok_or_else(|| {
                PipelineError::invalid_input(format!(
                    "table {} has no '{}' column",
                    path.display(),
                    value_column
                ))
            })?;

        for row in reader.records() {
            let row = row?;
            let key = row.get(key_idx).unwrap_or_default();
            let value = row.get(value_idx).unwrap_or_default();
            if !key.is_empty() && value != error_marker {
                done.insert(key.to_string());
            }
        }
        Ok(Self { done })
    }

    /// True when the key has a non-error row.
    pub fn is_done(&self, key: &str) -> bool {
        self.done.contains(key)
    }

    /// Number of completed keys.
    pub fn len(&self) -> usize {
        self.done.len()
    }

    /// True when no key is completed.
    pub fn is_empty(&self) -> bool {
        self.done.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    struct FakeUnit {
        id: String,
        outputs: Vec<PathBuf>,
    }

    impl WorkUnit for FakeUnit {
        fn unit_id(&self) -> String {
            self.id.clone()
        }

        fn expected_outputs(&self) -> Vec<PathBuf> {
            self.outputs.clone()
        }
    }

    #[test]
    fn complete_units_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.png");
        let b = dir.path().join("b.png");
        fs::write(&a, b"x").unwrap();
        fs::write(&b, b"x").unwrap();

        let units = vec![FakeUnit {
            id: "u1".into(),
            outputs: vec![a, b],
        }];
        let (pending, skipped) = TaskLedger::partition_pending(units);
        assert!(pending.is_empty());
        assert_eq!(skipped, 1);
    }

    #[test]
    fn partial_outputs_re_enqueue_the_unit() {
        let dir = tempfile::tempdir().unwrap();
        let present = dir.path().join("present.png");
        let missing = dir.path().join("missing.png");
        fs::write(&present, b"x").unwrap();

        let units = vec![FakeUnit {
            id: "u1".into(),
            outputs: vec![present, missing],
        }];
        let (pending, skipped) = TaskLedger::partition_pending(units);
        assert_eq!(pending.len(), 1);
        assert_eq!(skipped, 0);
    }

    #[test]
    fn unit_with_no_expected_outputs_is_pending() {
        let units = vec![FakeUnit {
            id: "u1".into(),
            outputs: vec![],
        }];
        let (pending, skipped) = TaskLedger::partition_pending(units);
        assert_eq!(pending.len(), 1);
        assert_eq!(skipped, 0);
    }

    #[test]
    fn csv_ledger_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = CsvKeyLedger::load(
            &dir.path().join("absent.csv"),
            "full_id",
            "text",
            "ERROR",
        )
        .unwrap();
        assert!(ledger.is_empty());
    }

    #[test]
    fn csv_ledger_skips_done_and_retries_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("labels.csv");
        fs::write(
            &path,
            "full_id,text\nd_tray-01_spec-001,Carabus auratus\nd_tray-01_spec-002,ERROR\n",
        )
        .unwrap();

        let ledger = CsvKeyLedger::load(&path, "full_id", "text", "ERROR").unwrap();
        assert!(ledger.is_done("d_tray-01_spec-001"));
        assert!(!ledger.is_done("d_tray-01_spec-002"));
        assert!(!ledger.is_done("d_tray-01_spec-003"));
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn csv_ledger_rejects_missing_columns() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("labels.csv");
        fs::write(&path, "id,value\nx,y\n").unwrap();
        assert!(CsvKeyLedger::load(&path, "full_id", "text", "ERROR").is_err());
    }
}
