//! Contracts for the external detection and transcription services.
//!
//! Both services are slow, fallible, and rate-limited; their internals are
//! out of scope. Callers reach them through these traits and route every
//! call through a [`crate::invoke::ResilientInvoker`], which enforces the
//! per-service concurrency ceiling and the retry budget.

use crate::detection::record::DetectionRecord;
use crate::invoke::ServiceError;
use async_trait::async_trait;

/// An external object detector.
#[async_trait]
pub trait DetectionService: Send + Sync {
    /// Runs detection over an encoded image.
    ///
    /// `image` is the encoded bytes of a preview image. `confidence` filters
    /// low-scoring detections; `overlap` is an optional non-maximum
    /// suppression threshold, forwarded when the provider supports one.
    async fn detect(
        &self,
        image: &[u8],
        confidence: f32,
        overlap: Option<f32>,
    ) -> Result<Vec<DetectionRecord>, ServiceError>;
}

/// An external image transcription service.
#[async_trait]
pub trait TranscriptionService: Send + Sync {
    /// Transcribes an encoded image under a prompt.
    ///
    /// The returned text may be semantically invalid and must be validated
    /// locally before it is recorded.
    async fn transcribe(&self, image: &[u8], prompt: &str) -> Result<String, ServiceError>;
}
