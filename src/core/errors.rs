//! Error types for the digitization pipeline.
//!
//! This module defines the error types that can occur while processing a
//! drawer, including image loading errors, geometric processing errors,
//! external service failures, and configuration errors. It also provides
//! utility constructors for creating these errors with context.
//!
//! Errors from individual work units are caught at the stage boundary and
//! converted into per-unit outcomes; they never terminate a stage run.

use thiserror::Error;

/// Enum identifying which processing step of the pipeline an error occurred in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessingStage {
    /// Error occurred while re-projecting preview coordinates.
    Projection,
    /// Error occurred while ordering detected regions.
    Ordering,
    /// Error occurred while cropping a region from the native plane.
    Cropping,
    /// Error occurred during mask rasterization.
    Rasterization,
    /// Error occurred during mask repair.
    MaskRepair,
    /// Error occurred during mask or pair validation.
    Validation,
    /// Error occurred while deriving a measurement.
    Measurement,
    /// Generic processing error.
    Generic,
}

impl std::fmt::Display for ProcessingStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProcessingStage::Projection => write!(f, "projection"),
            ProcessingStage::Ordering => write!(f, "ordering"),
            ProcessingStage::Cropping => write!(f, "cropping"),
            ProcessingStage::Rasterization => write!(f, "rasterization"),
            ProcessingStage::MaskRepair => write!(f, "mask repair"),
            ProcessingStage::Validation => write!(f, "validation"),
            ProcessingStage::Measurement => write!(f, "measurement"),
            ProcessingStage::Generic => write!(f, "processing"),
        }
    }
}

/// Enum representing the errors that can occur in the digitization pipeline.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Error occurred while loading an image.
    #[error("image load")]
    ImageLoad(#[source] image::ImageError),

    /// Error occurred during processing.
    #[error("{kind} failed: {context}")]
    Processing {
        /// The processing step where the error occurred.
        kind: ProcessingStage,
        /// Additional context about the error.
        context: String,
        /// The underlying error that caused this error.
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Error from an external detection or transcription service, after the
    /// retry budget has been exhausted or on a fatal classification.
    #[error("service call")]
    Service(#[from] crate::invoke::ServiceError),

    /// Error indicating invalid input.
    #[error("invalid input: {message}")]
    InvalidInput {
        /// A message describing the invalid input.
        message: String,
    },

    /// Error indicating a configuration problem.
    #[error("configuration: {message}")]
    Config {
        /// A message describing the configuration error.
        message: String,
    },

    /// Error indicating a region key that does not parse.
    #[error("malformed region key: {value}")]
    KeyParse {
        /// The string that failed to parse.
        value: String,
    },

    /// Error from JSON serialization or deserialization.
    #[error("json")]
    Json(#[from] serde_json::Error),

    /// Error from CSV reading or writing.
    #[error("csv")]
    Csv(#[from] csv::Error),

    /// IO error.
    #[error("io")]
    Io(#[from] std::io::Error),
}

impl PipelineError {
    /// Creates a processing error for a specific stage.
    pub fn processing(
        kind: ProcessingStage,
        context: &str,
        error: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Processing {
            kind,
            context: context.to_string(),
            source: Box::new(error),
        }
    }

    /// Creates a processing error carrying only a context message.
    pub fn processing_context(kind: ProcessingStage, context: impl Into<String>) -> Self {
        Self::Processing {
            kind,
            context: context.into(),
            source: Box::new(std::io::Error::other("processing failure")),
        }
    }

    /// Creates an error for invalid input.
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// Creates a configuration error.
    pub fn config_error(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates a validation error with expected/actual context.
    pub fn validation_error(component: &str, field: &str, expected: &str, actual: &str) -> Self {
        Self::InvalidInput {
            message: format!(
                "validation failed in {}: field '{}' expected {}, but got '{}'",
                component, field, expected, actual
            ),
        }
    }
}

impl From<image::ImageError> for PipelineError {
    fn from(error: image::ImageError) -> Self {
        Self::ImageLoad(error)
    }
}
