//! Centralized pipeline configuration.
//!
//! This struct tree consolidates the tunable behavior of the pipeline
//! (preview sizing, geometric thresholds, parallelism, retry behavior, and
//! per-service concurrency ceilings) so stages receive one configuration
//! object instead of scattered constants.

use crate::invoke::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Top-level configuration for a pipeline run over one drawer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Maximum dimension of generated preview images, in pixels.
    /// Previews are never upscaled. Default: 1000.
    #[serde(default = "PipelineConfig::default_preview_max_dim")]
    pub preview_max_dim: u32,

    /// Relative tolerance for aspect-ratio agreement between a preview plane
    /// and its native plane. A pairing outside tolerance is treated as
    /// corrupt and skipped. Default: 0.01.
    #[serde(default = "PipelineConfig::default_pair_aspect_tolerance")]
    pub pair_aspect_tolerance: f32,

    /// Relative tolerance for aspect-ratio agreement between a specimen crop
    /// and its mask. Default: 0.01.
    #[serde(default = "PipelineConfig::default_mask_aspect_tolerance")]
    pub mask_aspect_tolerance: f32,

    /// Buffer added around detected boxes before scaling, in preview pixels,
    /// so crops do not clip detection edges. Default: 5.0.
    #[serde(default = "PipelineConfig::default_crop_buffer_px")]
    pub crop_buffer_px: f32,

    /// Row-break threshold for reading-order sorting, as a fraction of the
    /// preview height. Default: 0.05 (50 px at a 1000 px preview).
    #[serde(default = "PipelineConfig::default_row_threshold_fraction")]
    pub row_threshold_fraction: f32,

    /// Confidence threshold forwarded to the detection service. Default: 0.4.
    #[serde(default = "PipelineConfig::default_confidence_threshold")]
    pub confidence_threshold: f32,

    /// Optional overlap (NMS) threshold forwarded to the detection service.
    #[serde(default)]
    pub overlap_threshold: Option<f32>,

    /// Derived lengths at or below this value, in millimeters, are flagged as
    /// implausible rather than silently accepted. Default: 5.0.
    #[serde(default = "PipelineConfig::default_min_plausible_length_mm")]
    pub min_plausible_length_mm: f32,

    /// Detector class labels recognized by the pipeline.
    #[serde(default)]
    pub labels: ClassLabels,

    /// CPU parallelism policy for compute-bound stages.
    #[serde(default)]
    pub parallel: ParallelPolicy,

    /// Retry behavior for external service calls.
    #[serde(default)]
    pub retry: RetryConfig,

    /// Per-service concurrency ceilings.
    #[serde(default)]
    pub limits: ServiceLimits,
}

impl PipelineConfig {
    fn default_preview_max_dim() -> u32 {
        1000
    }

    fn default_pair_aspect_tolerance() -> f32 {
        0.01
    }

    fn default_mask_aspect_tolerance() -> f32 {
        0.01
    }

    fn default_crop_buffer_px() -> f32 {
        5.0
    }

    fn default_row_threshold_fraction() -> f32 {
        0.05
    }

    fn default_confidence_threshold() -> f32 {
        0.4
    }

    fn default_min_plausible_length_mm() -> f32 {
        5.0
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            preview_max_dim: Self::default_preview_max_dim(),
            pair_aspect_tolerance: Self::default_pair_aspect_tolerance(),
            mask_aspect_tolerance: Self::default_mask_aspect_tolerance(),
            crop_buffer_px: Self::default_crop_buffer_px(),
            row_threshold_fraction: Self::default_row_threshold_fraction(),
            confidence_threshold: Self::default_confidence_threshold(),
            overlap_threshold: None,
            min_plausible_length_mm: Self::default_min_plausible_length_mm(),
            labels: ClassLabels::default(),
            parallel: ParallelPolicy::default(),
            retry: RetryConfig::default(),
            limits: ServiceLimits::default(),
        }
    }
}

/// Class labels assigned by the external detectors.
///
/// The labels depend on the deployed detection models, so they are
/// configuration rather than constants.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassLabels {
    /// Label of tray detections on drawer previews. Default: "tray".
    #[serde(default = "ClassLabels::default_tray")]
    pub tray: String,

    /// Label of specimen detections on tray previews. Default: "specimen".
    #[serde(default = "ClassLabels::default_specimen")]
    pub specimen: String,

    /// Label of body-outline polygon detections on specimen crops.
    /// Default: "outline".
    #[serde(default = "ClassLabels::default_outline")]
    pub outline: String,
}

impl ClassLabels {
    fn default_tray() -> String {
        "tray".to_string()
    }

    fn default_specimen() -> String {
        "specimen".to_string()
    }

    fn default_outline() -> String {
        "outline".to_string()
    }
}

impl Default for ClassLabels {
    fn default() -> Self {
        Self {
            tray: Self::default_tray(),
            specimen: Self::default_specimen(),
            outline: Self::default_outline(),
        }
    }
}

/// Parallel processing configuration for CPU-bound stages.
///
/// Work units are fully independent and each owns a distinct output path, so
/// the pool needs no cross-worker coordination; these knobs only size it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParallelPolicy {
    /// Maximum number of worker threads. If None, rayon's default pool size
    /// (typically the number of CPU cores) is used.
    #[serde(default)]
    pub max_threads: Option<usize>,

    /// Unit counts at or below this threshold are processed sequentially to
    /// avoid pool overhead. Default: 1.
    #[serde(default = "ParallelPolicy::default_unit_threshold")]
    pub unit_threshold: usize,
}

impl ParallelPolicy {
    fn default_unit_threshold() -> usize {
        1
    }
}

impl Default for ParallelPolicy {
    fn default() -> Self {
        Self {
            max_threads: None,
            unit_threshold: Self::default_unit_threshold(),
        }
    }
}

/// Retry behavior for external service calls, in serializable form.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Base delay for exponential backoff, in milliseconds. Default: 500.
    #[serde(default = "RetryConfig::default_base_ms")]
    pub base_ms: u64,

    /// Ceiling on any single backoff delay, in milliseconds. Default: 30000.
    #[serde(default = "RetryConfig::default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Number of retries after the initial attempt. Default: 5.
    #[serde(default = "RetryConfig::default_max_retries")]
    pub max_retries: u32,

    /// Upper bound of the random jitter added to each delay, in
    /// milliseconds. Default: 1000.
    #[serde(default = "RetryConfig::default_max_jitter_ms")]
    pub max_jitter_ms: u64,
}

impl RetryConfig {
    fn default_base_ms() -> u64 {
        500
    }

    fn default_max_delay_ms() -> u64 {
        30_000
    }

    fn default_max_retries() -> u32 {
        5
    }

    fn default_max_jitter_ms() -> u64 {
        1_000
    }

    /// Converts this configuration into the invoker's runtime policy.
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            base: Duration::from_millis(self.base_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
            max_retries: self.max_retries,
            max_jitter: Duration::from_millis(self.max_jitter_ms),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            base_ms: Self::default_base_ms(),
            max_delay_ms: Self::default_max_delay_ms(),
            max_retries: Self::default_max_retries(),
            max_jitter_ms: Self::default_max_jitter_ms(),
        }
    }
}

/// Concurrency ceilings for external services.
///
/// The ceilings are distinct per service because rate limits differ per
/// provider; each is enforced by the invoker regardless of how wide the local
/// worker pool is.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceLimits {
    /// Maximum concurrent calls to the detection service. Default: 4.
    #[serde(default = "ServiceLimits::default_detection")]
    pub detection: usize,

    /// Maximum concurrent calls to the transcription service. Default: 2.
    #[serde(default = "ServiceLimits::default_transcription")]
    pub transcription: usize,
}

impl ServiceLimits {
    fn default_detection() -> usize {
        4
    }

    fn default_transcription() -> usize {
        2
    }
}

impl Default for ServiceLimits {
    fn default() -> Self {
        Self {
            detection: Self::default_detection(),
            transcription: Self::default_transcription(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sensible() {
        let config = PipelineConfig::default();
        assert_eq!(config.preview_max_dim, 1000);
        assert_eq!(config.row_threshold_fraction, 0.05);
        assert_eq!(config.limits.detection, 4);
        assert_eq!(config.retry.max_retries, 5);
    }

    #[test]
    fn partial_json_fills_defaults() {
        let config: PipelineConfig =
            serde_json::from_str(r#"{ "preview_max_dim": 1600, "limits": { "detection": 8 } }"#)
                .unwrap();
        assert_eq!(config.preview_max_dim, 1600);
        assert_eq!(config.limits.detection, 8);
        assert_eq!(config.limits.transcription, 2);
        assert_eq!(config.crop_buffer_px, 5.0);
    }

    #[test]
    fn retry_config_converts_to_policy() {
        let retry = RetryConfig {
            base_ms: 100,
            max_delay_ms: 2_000,
            max_retries: 3,
            max_jitter_ms: 0,
        };
        let policy = retry.policy();
        assert_eq!(policy.base, Duration::from_millis(100));
        assert_eq!(policy.max_retries, 3);
        assert_eq!(policy.max_jitter, Duration::ZERO);
    }
}
