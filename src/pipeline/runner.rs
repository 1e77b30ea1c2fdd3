//! Generic stage dispatch and summary aggregation.
//!
//! Two scheduling regimes coexist. CPU-bound stages use a process-wide
//! rayon pool (optionally sized by the parallel policy); stages that call
//! external services use bounded-concurrency async dispatch, with the bound
//! enforced by the service's invoker. In both regimes every unit is fully
//! independent, outputs are keyed by unit identity rather than completion
//! order, and a failing unit is converted into an error outcome instead of
//! aborting the pool.

use crate::core::config::ParallelPolicy;
use crate::core::errors::PipelineError;
use crate::ledger::{TaskLedger, WorkUnit};
use futures::future::join_all;
use rayon::prelude::*;
use std::fmt;
use std::future::Future;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Per-unit result of a stage's work function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageOutcome {
    /// The unit's outputs were produced.
    Completed,
    /// The unit was skipped, with a reason (missing input, failed
    /// validation, degenerate geometry).
    Skipped(String),
}

/// Aggregated result of one stage invocation.
#[derive(Debug, Clone)]
pub struct StageSummary {
    /// Stage name.
    pub stage: &'static str,
    /// Units whose outputs were produced in this run.
    pub processed: usize,
    /// Units skipped: outputs already present, or skipped with a reason.
    pub skipped: usize,
    /// Units that failed.
    pub errors: usize,
    /// Wall-clock duration of the stage run.
    pub elapsed: Duration,
}

impl StageSummary {
    fn new(stage: &'static str) -> Self {
        Self {
            stage,
            processed: 0,
            skipped: 0,
            errors: 0,
            elapsed: Duration::ZERO,
        }
    }

    fn absorb(
        &mut self,
        results: Vec<(String, Result<StageOutcome, PipelineError>)>,
    ) {
        for (unit_id, result) in results {
            match result {
                Ok(StageOutcome::Completed) => self.processed += 1,
                Ok(StageOutcome::Skipped(reason)) => {
                    warn!(stage = self.stage, unit = %unit_id, reason = %reason, "unit skipped");
                    self.skipped += 1;
                }
                Err(err) => {
                    warn!(stage = self.stage, unit = %unit_id, error = %err, "unit failed");
                    self.errors += 1;
                }
            }
        }
    }

    /// Logs the completion line for this stage.
    pub fn log(&self) {
        info!(
            stage = self.stage,
            processed = self.processed,
            skipped = self.skipped,
            errors = self.errors,
            elapsed_ms = self.elapsed.as_millis() as u64,
            "stage complete"
        );
    }
}

impl fmt::Display for StageSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} processed, {} skipped, {} errors in {:.2}s",
            self.stage,
            self.processed,
            self.skipped,
            self.errors,
            self.elapsed.as_secs_f64()
        )
    }
}

/// Roll-up of the stage summaries of one drawer run.
#[derive(Debug, Clone, Default)]
pub struct PipelineReport {
    /// Summaries in execution order.
    pub stages: Vec<StageSummary>,
}

impl PipelineReport {
    /// Appends a stage summary.
    pub fn push(&mut self, summary: StageSummary) {
        self.stages.push(summary);
    }

    /// Total units that failed across all stages.
    pub fn total_errors(&self) -> usize {
        self.stages.iter().map(|s| s.errors).sum()
    }
}

impl fmt::Display for PipelineReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Pipeline report:")?;
        for summary in &self.stages {
            writeln!(f, "  {summary}")?;
        }
        Ok(())
    }
}

/// Runs a CPU-bound stage over its work units.
///
/// Units whose outputs already exist are skipped up front. The remainder is
/// processed sequentially below the policy threshold and on the rayon pool
/// above it.
pub fn run_cpu_stage<U, F>(
    stage: &'static str,
    units: Vec<U>,
    policy: &ParallelPolicy,
    f: F,
) -> StageSummary
where
    U: WorkUnit + Send + Sync,
    F: Fn(&U) -> Result<StageOutcome, PipelineError> + Send + Sync,
{
    let started = Instant::now();
    let (pending, already_done) = TaskLedger::partition_pending(units);

    let results: Vec<(String, Result<StageOutcome, PipelineError>)> =
        if pending.len() <= policy.unit_threshold {
            pending
                .iter()
                .map(|unit| (unit.unit_id(), f(unit)))
                .collect()
        } else {
            let run = || {
                pending
                    .par_iter()
                    .map(|unit| (unit.unit_id(), f(unit)))
                    .collect()
            };
            match policy.max_threads {
                Some(threads) => match rayon::ThreadPoolBuilder::new()
                    .num_threads(threads)
                    .build()
                {
                    Ok(pool) => pool.install(run),
                    Err(err) => {
                        warn!(stage, error = %err, "falling back to global pool");
                        run()
                    }
                },
                None => run(),
            }
        };

    let mut summary = StageSummary::new(stage);
    summary.skipped = already_done;
    summary.absorb(results);
    summary.elapsed = started.elapsed();
    summary.log();
    summary
}

/// Runs a service-calling stage over its work units.
///
/// All pending units are dispatched at once; the per-service concurrency
/// ceiling is enforced by the invoker inside `f`, independent of how many
/// futures are in flight here. Completion order is not meaningful.
pub async fn run_service_stage<U, F, Fut>(stage: &'static str, units: Vec<U>, f: F) -> StageSummary
where
    U: WorkUnit,
    F: Fn(U) -> Fut,
    Fut: Future<Output = Result<StageOutcome, PipelineError>>,
{
    let started = Instant::now();
    let (pending, already_done) = TaskLedger::partition_pending(units);

    let ids: Vec<String> = pending.iter().map(|unit| unit.unit_id()).collect();
    let outcomes = join_all(pending.into_iter().map(f)).await;

    let mut summary = StageSummary::new(stage);
    summary.skipped = already_done;
    summary.absorb(ids.into_iter().zip(outcomes).collect());
    summary.elapsed = started.elapsed();
    summary.log();
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Unit {
        id: String,
        outputs: Vec<PathBuf>,
    }

    impl Unit {
        fn ephemeral(id: &str) -> Self {
            Self {
                id: id.to_string(),
                outputs: vec![PathBuf::from(format!("/nonexistent/{id}.png"))],
            }
        }
    }

    impl WorkUnit for Unit {
        fn unit_id(&self) -> String {
            self.id.clone()
        }

        fn expected_outputs(&self) -> Vec<PathBuf> {
            self.outputs.clone()
        }
    }

    #[test]
    fn cpu_stage_counts_outcomes() {
        let units = vec![
            Unit::ephemeral("a"),
            Unit::ephemeral("b"),
            Unit::ephemeral("c"),
        ];
        let summary = run_cpu_stage("test", units, &ParallelPolicy::default(), |unit| {
            match unit.unit_id().as_str() {
                "a" => Ok(StageOutcome::Completed),
                "b" => Ok(StageOutcome::Skipped("no input".into())),
                _ => Err(PipelineError::invalid_input("boom")),
            }
        });
        assert_eq!(summary.processed, 1);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.errors, 1);
    }

    #[test]
    fn cpu_stage_skips_complete_units() {
        let dir = tempfile::tempdir().unwrap();
        let done = dir.path().join("done.png");
        std::fs::write(&done, b"x").unwrap();

        let units = vec![
            Unit {
                id: "done".into(),
                outputs: vec![done],
            },
            Unit::ephemeral("todo"),
        ];
        let calls = AtomicUsize::new(0);
        let summary = run_cpu_stage("test", units, &ParallelPolicy::default(), |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(StageOutcome::Completed)
        });
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(summary.processed, 1);
        assert_eq!(summary.skipped, 1);
    }

    #[test]
    fn cpu_stage_unit_failure_does_not_abort_pool() {
        let units: Vec<Unit> = (0..16).map(|i| Unit::ephemeral(&format!("u{i}"))).collect();
        let summary = run_cpu_stage("test", units, &ParallelPolicy::default(), |unit| {
            if unit.unit_id() == "u7" {
                Err(PipelineError::invalid_input("one bad unit"))
            } else {
                Ok(StageOutcome::Completed)
            }
        });
        assert_eq!(summary.processed, 15);
        assert_eq!(summary.errors, 1);
    }

    #[tokio::test]
    async fn service_stage_counts_outcomes() {
        let units = vec![Unit::ephemeral("x"), Unit::ephemeral("y")];
        let summary = run_service_stage("test", units, |unit| async move {
            if unit.unit_id() == "x" {
                Ok(StageOutcome::Completed)
            } else {
                Err(PipelineError::invalid_input("bad"))
            }
        })
        .await;
        assert_eq!(summary.processed, 1);
        assert_eq!(summary.errors, 1);
    }

    #[test]
    fn report_accumulates() {
        let mut report = PipelineReport::default();
        let mut a = StageSummary::new("a");
        a.errors = 2;
        report.push(a);
        report.push(StageSummary::new("b"));
        assert_eq!(report.total_errors(), 2);
        assert!(report.to_string().contains("a: 0 processed"));
    }
}
