//! Default configuration constants for chapalign.
//!
//! Shared limits and defaults used by the planner, stitcher, coverage evaluator,
//! cache and CLI so every entry point agrees on the same numbers.

/// Largest window the planner will produce, in seconds.
///
/// Forced aligners degrade badly (and some refuse to run) on very long utterances,
/// so windows are capped well under a minute.
pub const MAX_CHUNK_SECONDS: u32 = 50;

/// Largest overlap between consecutive windows, in seconds.
pub const MAX_OVERLAP_SECONDS: u32 = 5;

/// Default window size in seconds.
pub const CHUNK_SIZE_SEC: u32 = 50;

/// Default overlap between consecutive windows in seconds.
pub const CHUNK_OVERLAP_SEC: u32 = 5;

/// Default stitching tolerance in milliseconds.
///
/// A word from a later window that starts no more than this long before the
/// previous kept word ends is treated as a second observation of that word.
/// 750ms is roughly one and a half average spoken words.
pub const OVERLAP_TOLERANCE_MS: u64 = 750;

/// Default coverage percentage a chapter must reach to pass.
pub const COVERAGE_THRESHOLD: f64 = 95.0;

/// Default timeout for a single external aligner invocation, in seconds.
pub const ALIGNER_TIMEOUT_SECS: u64 = 3600;

/// Default MFA executable name, resolved through `PATH`.
pub const MFA_EXECUTABLE: &str = "mfa";

/// Default number of windows aligned concurrently (1 = sequential).
pub const MAX_PARALLEL: usize = 1;

/// Default log filter when neither `RUST_LOG` nor `-v` is given.
pub const LOG_LEVEL: &str = "info";

/// Metadata document name inside a cache entry.
pub const METADATA_FILENAME: &str = "metadata.json";

/// Age after which a cache entry's writer claim is treated as abandoned.
///
/// A claim left behind by a killed process would otherwise block the entry forever.
pub const STALE_CLAIM_SECS: u64 = 12 * 60 * 60;

/// Cached run bundle name inside a cache entry.
pub const ALIGNMENT_ARTIFACT: &str = "alignment.json";

/// Process exit code for a successful run.
pub const EXIT_SUCCESS: i32 = 0;

/// Process exit code when coverage falls below the threshold.
pub const EXIT_COVERAGE_FAILURE: i32 = 2;

/// Process exit code for fatal or usage errors.
pub const EXIT_FATAL: i32 = 3;
