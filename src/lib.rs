//! chapalign - chunked forced alignment for long chapter recordings
//!
//! Splits a recording into bounded overlapping windows, hands each window to
//! an external forced aligner, stitches the per-window word timings into one
//! chapter timeline and scores coverage against the reference text. Runs are
//! cached by a content hash of their inputs.

#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![warn(clippy::let_underscore_must_use)]

pub mod aligner;
pub mod alignment;
#[cfg(feature = "cli")]
pub mod app;
pub mod audio;
pub mod cache;
#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod defaults;
pub mod diagnostics;
pub mod error;
pub mod pipeline;
pub mod pronunciation;
pub mod telemetry;
pub mod text;

// Core algorithms
pub use alignment::{
    AlignedWord, ChunkAlignment, ChunkMapEntry, ChunkWindow, CoverageReport, ExitStatus,
    WordSegment, chunk_map, evaluate, exit_status, plan, stitch,
};

// Aligner seam
pub use aligner::{AlignRequest, CancelFlag, ForcedAligner, MfaAligner, MfaConfig, MockAligner};

// Pipeline
pub use pipeline::{AlignmentPipeline, PipelineConfig, PipelineOutput, RunRequest, RunSummary};

// Cache
pub use cache::{CacheKeyInputs, CacheStore, build_key};

// Inputs
pub use audio::AudioSource;
pub use pronunciation::{AlignerResources, PronunciationVariant};
pub use text::TextReference;

// Error handling
pub use error::{ChapalignError, Result};

// Config
pub use config::Config;

/// Build version string with optional git commit hash.
///
/// Returns `"0.1.0+abc1234"` when git hash is available, `"0.1.0"` otherwise.
pub fn version_string() -> String {
    let version = env!("CARGO_PKG_VERSION");
    match option_env!("GIT_HASH") {
        Some(hash) if !hash.is_empty() => format!("{}+{}", version, hash),
        _ => version.to_string(),
    }
}
