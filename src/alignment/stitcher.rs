//! Stitcher for combining per-window alignments.
//!
//! Collects the aligner's per-window results and merges them into one
//! recording-wide word timeline, handling:
//! - Out-of-order arrival (windows are keyed by start time, not arrival)
//! - Duplicate boundary words recognized twice inside an overlap region
//!
//! Reconciliation is a greedy single-lookback rule. A candidate word is compared
//! only with the last kept word: if the kept word ends at most
//! `overlap_tolerance_ms` after the candidate starts (and not before it), both
//! are taken as observations of the same spoken word and the more confident one
//! wins, ties going to the earlier window.
//!
//! Known limitations: a genuine repeat of a word spoken right at a boundary can
//! be merged away if it falls inside the tolerance, and a duplicate recognized
//! with timings further apart than the tolerance is kept twice. In that second
//! case the later copy is appended as is, so `start_ms` in the output is only
//! non-decreasing when overlapping windows agree within the tolerance. Both
//! copies count towards `aligned_words` and therefore coverage.

use crate::alignment::types::{AlignedWord, ChunkAlignment};
use crate::defaults;
use std::collections::BTreeMap;

/// Configuration for the stitcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StitcherConfig {
    /// Maximum overlap between a kept word and a candidate for the two to be merged.
    pub overlap_tolerance_ms: u64,
}

impl Default for StitcherConfig {
    fn default() -> Self {
        Self {
            overlap_tolerance_ms: defaults::OVERLAP_TOLERANCE_MS,
        }
    }
}

/// Stitcher that combines window alignments into a single timeline.
#[derive(Debug, Default)]
pub struct Stitcher {
    config: StitcherConfig,
    /// Alignments indexed by (window start, window id) for ordering.
    alignments: BTreeMap<(u64, String), ChunkAlignment>,
}

impl Stitcher {
    /// Creates a new stitcher with default configuration.
    pub fn new() -> Self {
        Self::with_config(StitcherConfig::default())
    }

    /// Creates a new stitcher with custom configuration.
    pub fn with_config(config: StitcherConfig) -> Self {
        Self {
            config,
            alignments: BTreeMap::new(),
        }
    }

    /// Adds one window's alignment. A second result for the same window replaces the first.
    pub fn add_alignment(&mut self, alignment: ChunkAlignment) {
        let key = (alignment.window.start_ms, alignment.window.id.clone());
        self.alignments.insert(key, alignment);
    }

    /// Returns the number of windows collected.
    pub fn alignment_count(&self) -> usize {
        self.alignments.len()
    }

    /// Merges every collected window into one ordered word sequence.
    pub fn finish(&self) -> Vec<AlignedWord> {
        let tolerance = i128::from(self.config.overlap_tolerance_ms);
        let mut merged: Vec<AlignedWord> = Vec::new();

        for alignment in self.alignments.values() {
            let offset = alignment.window.start_ms;
            for word in &alignment.words {
                let candidate = AlignedWord {
                    text: word.text.clone(),
                    start_ms: offset + word.start_ms,
                    end_ms: offset + word.end_ms,
                    confidence: word.confidence,
                    source_window_id: alignment.window.id.clone(),
                };

                if let Some(prev) = merged.last_mut() {
                    let overlap = i128::from(prev.end_ms) - i128::from(candidate.start_ms);
                    if (0..=tolerance).contains(&overlap) {
                        if candidate.confidence > prev.confidence {
                            *prev = candidate;
                        }
                        continue;
                    }
                }
                merged.push(candidate);
            }
        }

        merged
    }

    /// Clears all collected alignments.
    pub fn reset(&mut self) {
        self.alignments.clear();
    }
}

/// Stitches `alignments` (in any order) with the given tolerance.
pub fn stitch<I>(alignments: I, overlap_tolerance_ms: u64) -> Vec<AlignedWord>
where
    I: IntoIterator<Item = ChunkAlignment>,
{
    let mut stitcher = Stitcher::with_config(StitcherConfig {
        overlap_tolerance_ms,
    });
    for alignment in alignments {
        stitcher.add_alignment(alignment);
    }
    stitcher.finish()
}
