//! Detection records, reading-order assignment, and service contracts.
//!
//! A detection is produced by an external object detector running on a
//! preview image and is immutable once received. Records are persisted as
//! JSON next to the preview they describe, ordered into a stable reading
//! order, re-projected onto the native plane, and then discarded.

pub mod ordering;
pub mod record;
pub mod remote;
pub mod service;

pub use ordering::{OrderedRegion, RowThreshold, SpatialOrderer};
pub use record::{DetectionRecord, DetectionSet, DetectionShape};
pub use remote::{HostedDetector, VisionTranscriber};
pub use service::{DetectionService, TranscriptionService};
