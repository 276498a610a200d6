//! Coverage evaluation and exit-status mapping.
//!
//! Coverage below threshold is a normal outcome, not an error: callers get a
//! [`CoverageReport`] with `passed == false` and decide how to exit.

use crate::defaults;
use serde::{Deserialize, Serialize};

/// Coverage metrics for one processed chapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoverageReport {
    pub expected_words: usize,
    pub aligned_words: usize,
    /// Percentage of expected words aligned, rounded to three decimals.
    pub coverage_pct: f64,
    pub threshold: f64,
    pub passed: bool,
}

/// Outcome of a run as seen by the process exit layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    Success,
    CoverageFailure,
}

impl ExitStatus {
    /// Process exit code for this status.
    pub fn code(self) -> i32 {
        match self {
            ExitStatus::Success => defaults::EXIT_SUCCESS,
            ExitStatus::CoverageFailure => defaults::EXIT_COVERAGE_FAILURE,
        }
    }
}

/// Computes coverage of `aligned_words` against `expected_words`.
///
/// An empty reference (`expected_words == 0`) never passes.
pub fn evaluate(expected_words: usize, aligned_words: usize, threshold_pct: f64) -> CoverageReport {
    let coverage_pct = if expected_words > 0 {
        round3(aligned_words as f64 / expected_words as f64 * 100.0)
    } else {
        0.0
    };
    CoverageReport {
        expected_words,
        aligned_words,
        coverage_pct,
        threshold: threshold_pct,
        passed: expected_words > 0 && coverage_pct >= threshold_pct,
    }
}

/// Maps a report onto the exit status the CLI should use.
pub fn exit_status(report: &CoverageReport) -> ExitStatus {
    if report.passed {
        ExitStatus::Success
    } else {
        ExitStatus::CoverageFailure
    }
}

fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}
