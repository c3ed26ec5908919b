//! Phased workflow processing: analyze → apply → transcode → synthesize →
//! move → timestamp, with skip conditions, conditional rules, and
//! per-phase failure policy.

mod processor;
mod skip;

pub use processor::{FileProcessingResult, PhaseOutcome, WorkflowProcessor};
pub use skip::{evaluate_phase_skip, evaluate_skip_when, SkipReason, SkipReasonType};
