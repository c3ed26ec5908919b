//! Shared data model for the VPO media library orchestrator.
//!
//! This crate holds the plain data types every other layer exchanges:
//! catalog records (files, tracks, jobs, operations), probe results, the
//! typed [`Plan`] produced by policy evaluation, and transcription /
//! classification results. No I/O lives here.

pub mod error;
pub mod files;
pub mod jobs;
pub mod parsed;
pub mod plan;
pub mod resolution;
pub mod transcription;

pub use error::ModelError;
pub use files::{
    FileRecord, IntrospectionResult, PluginMetadata, ScanStatus, TrackInfo, TrackKind,
    TrackRecord,
};
pub use jobs::{JobRecord, JobStatus, JobType, OperationRecord, OperationStatus};
pub use parsed::ParsedFilename;
pub use plan::{
    ContainerChange, Plan, PlannedAction, QualityMode, TimestampMode, TrackDisposition,
    TrackTranscodePlan,
};
pub use resolution::{codec_aliases, height_to_resolution_label, resolution_label_to_height};
pub use transcription::{
    AudioTrackKind, DetectionMethod, LanguageAnalysisRecord, LanguageClassification,
    TrackClassificationRecord, TranscriptSegment, TranscriptionRecord,
};
