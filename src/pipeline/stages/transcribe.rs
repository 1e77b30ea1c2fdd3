//! Transcription stage: specimen label crops to transcription rows.

use crate::core::{PipelineError, RegionKey};
use crate::detection::TranscriptionService;
use crate::invoke::ResilientInvoker;
use crate::ledger::CsvKeyLedger;
use crate::pipeline::context::StageContext;
use crate::pipeline::runner::StageSummary;
use crate::pipeline::stages::keyed_images;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::warn;

/// Value recorded for a unit whose transcription failed. Rows carrying this
/// marker are retried on the next run.
pub const TRANSCRIPTION_ERROR_MARKER: &str = "ERROR";

/// One row of `transcriptions/labels.csv`.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct TranscriptionRow {
    full_id: String,
    text: String,
}

/// Transcribes the label of every specimen crop not yet rowed in the
/// transcription table.
///
/// The table is the ledger: keys with a non-error row are skipped, keys with
/// an error row become eligible again. Transcribed text is validated locally
/// (non-empty after trimming) before it is recorded; invalid or failed
/// results are recorded with the error marker so they retry on the next run.
pub async fn transcribe_labels(
    ctx: &StageContext,
    service: &dyn TranscriptionService,
    invoker: &ResilientInvoker,
    prompt: &str,
) -> Result<StageSummary, PipelineError> {
    let started = Instant::now();
    let csv_path = ctx.layout.transcriptions_csv();
    let ledger = CsvKeyLedger::load(&csv_path, "full_id", "text", TRANSCRIPTION_ERROR_MARKER)?;

    let mut pending: Vec<(RegionKey, PathBuf)> = Vec::new();
    let mut skipped = 0usize;
    for (key, crop) in keyed_images(&ctx.layout.specimens_dir(), true, true)? {
        if ledger.is_done(&key.to_string()) {
            skipped += 1;
        } else {
            pending.push((key, crop));
        }
    }

    let results = join_all(pending.into_iter().map(|(key, crop)| async move {
        let row = transcribe_one(service, invoker, &key, &crop, prompt).await;
        (key, row)
    }))
    .await;

    let mut rows = Vec::with_capacity(results.len());
    let mut processed = 0usize;
    let mut errors = 0usize;
    for (key, text) in results {
        match text {
            Some(text) => {
                processed += 1;
                rows.push(TranscriptionRow {
                    full_id: key.to_string(),
                    text,
                });
            }
            None => {
                errors += 1;
                rows.push(TranscriptionRow {
                    full_id: key.to_string(),
                    text: TRANSCRIPTION_ERROR_MARKER.to_string(),
                });
            }
        }
    }
    append_rows(&csv_path, &rows)?;

    let summary = StageSummary {
        stage: "transcribe",
        processed,
        skipped,
        errors,
        elapsed: started.elapsed(),
    };
    summary.log();
    Ok(summary)
}

/// Transcribes one crop; `None` marks a failed or invalid result.
async fn transcribe_one(
    service: &dyn TranscriptionService,
    invoker: &ResilientInvoker,
    key: &RegionKey,
    crop: &Path,
    prompt: &str,
) -> Option<String> {
    let bytes = match std::fs::read(crop) {
        Ok(bytes) => bytes,
        Err(err) => {
            warn!(unit = %key, error = %err, "label crop unreadable");
            return None;
        }
    };
    match invoker.invoke(|| service.transcribe(&bytes, prompt)).await {
        Ok(raw) => {
            let text = raw.trim();
            if text.is_empty() || text == TRANSCRIPTION_ERROR_MARKER {
                warn!(unit = %key, "transcription returned no usable text");
                None
            } else {
                Some(text.to_string())
            }
        }
        Err(err) => {
            warn!(unit = %key, error = %err, "transcription failed");
            None
        }
    }
}

/// Appends rows to the transcription table, writing headers on first write.
fn append_rows(path: &Path, rows: &[TranscriptionRow]) -> Result<(), PipelineError> {
    if rows.is_empty() {
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
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(())
}
