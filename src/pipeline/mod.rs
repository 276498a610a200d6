//! Chapter alignment pipeline.
//!
//! The orchestrator plans windows over the recording, hands each window to a
//! [`ForcedAligner`](crate::aligner::ForcedAligner), waits for all of them,
//! stitches the results into one timeline and evaluates coverage.

pub mod orchestrator;
pub mod summary;

pub use orchestrator::{AlignmentPipeline, PipelineConfig, PipelineOutput, RunRequest};
pub use summary::{CacheStatus, RunSummary};
