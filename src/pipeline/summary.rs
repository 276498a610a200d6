//! Per-run summary metrics.

use crate::alignment::coverage::CoverageReport;
use crate::alignment::types::AlignedWord;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::{Duration, SystemTime};

/// What happened with the cache during a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheStatus {
    /// A complete entry was reused; the aligner was not called.
    Hit,
    /// The run's results were persisted.
    Stored,
    /// Another writer held the entry's claim; results were not persisted.
    Busy,
    /// No cache store was supplied.
    Disabled,
}

impl CacheStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            CacheStatus::Hit => "hit",
            CacheStatus::Stored => "stored",
            CacheStatus::Busy => "busy",
            CacheStatus::Disabled => "disabled",
        }
    }
}

impl std::fmt::Display for CacheStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Summary document written alongside a chapter's alignment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub book: String,
    pub chapter: u32,
    pub expected_words: usize,
    pub aligned_words: usize,
    pub coverage_pct: f64,
    pub coverage_threshold: f64,
    pub coverage_passed: bool,
    pub variant: String,
    pub chunk_count: usize,
    pub avg_confidence: Option<f32>,
    pub min_confidence: Option<f32>,
    /// Wall-clock time per stage, in milliseconds
    pub durations_ms: BTreeMap<String, u64>,
    pub cache_status: CacheStatus,
    /// RFC 3339 timestamp, second precision
    pub created_at: String,
}

impl RunSummary {
    pub fn coverage(&self) -> CoverageReport {
        CoverageReport {
            expected_words: self.expected_words,
            aligned_words: self.aligned_words,
            coverage_pct: self.coverage_pct,
            threshold: self.coverage_threshold,
            passed: self.coverage_passed,
        }
    }
}

/// Average and minimum confidence over the stitched words.
///
/// Both are `None` for an empty timeline.
pub fn confidence_stats(words: &[AlignedWord]) -> (Option<f32>, Option<f32>) {
    if words.is_empty() {
        return (None, None);
    }
    let sum: f64 = words.iter().map(|w| f64::from(w.confidence)).sum();
    let avg = (sum / words.len() as f64) as f32;
    let min = words
        .iter()
        .map(|w| w.confidence)
        .fold(f32::INFINITY, f32::min);
    (Some(avg), Some(min))
}

/// Stage timings accumulated during a run.
#[derive(Debug, Clone, Default)]
pub struct StageTimings {
    stages: BTreeMap<String, u64>,
}

impl StageTimings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, stage: &str, elapsed: Duration) {
        let ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
        *self.stages.entry(stage.to_string()).or_default() += ms;
    }

    pub fn into_map(self) -> BTreeMap<String, u64> {
        self.stages
    }
}

pub fn timestamp_now() -> String {
    humantime::format_rfc3339_seconds(SystemTime::now()).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn word(confidence: f32) -> AlignedWord {
        AlignedWord {
            text: "w".to_string(),
            start_ms: 0,
            end_ms: 10,
            confidence,
            source_window_id: "chunk-001".to_string(),
        }
    }

    #[test]
    fn test_confidence_stats() {
        let (avg, min) = confidence_stats(&[word(0.5), word(1.0), word(0.75)]);
        assert!((avg.unwrap() - 0.75).abs() < 1e-6);
        assert_eq!(min, Some(0.5));
    }

    #[test]
    fn test_confidence_stats_empty() {
        assert_eq!(confidence_stats(&[]), (None, None));
    }

    #[test]
    fn test_stage_timings_accumulate() {
        let mut timings = StageTimings::new();
        timings.record("align", Duration::from_millis(40));
        timings.record("align", Duration::from_millis(2));
        timings.record("stitch", Duration::from_millis(1));
        let map = timings.into_map();
        assert_eq!(map["align"], 42);
        assert_eq!(map["stitch"], 1);
    }

    #[test]
    fn test_cache_status_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&CacheStatus::Busy).unwrap(), "\"busy\"");
        assert_eq!(CacheStatus::Hit.to_string(), "hit");
    }

    #[test]
    fn test_timestamp_is_rfc3339() {
        let ts = timestamp_now();
        assert!(ts.ends_with('Z'));
        assert!(humantime::parse_rfc3339(&ts).is_ok());
    }
}
