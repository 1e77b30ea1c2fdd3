//! Stage orchestration for the drawer digitization pipeline.
//!
//! Data flows strictly downstream: drawer image → tray regions → specimen
//! regions → masks → measurements, with label transcription branching off
//! the specimen crops. Every stage is an idempotent, resumable batch job:
//! it enumerates its work units, consults the ledger, dispatches the
//! remainder across a worker pool, and aggregates per-unit outcomes into a
//! summary. A failure in one unit never aborts a stage.

pub mod context;
pub mod runner;
pub mod stages;

pub use context::StageContext;
pub use runner::{run_cpu_stage, run_service_stage, PipelineReport, StageOutcome, StageSummary};
