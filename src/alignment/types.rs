//! Data types shared by the planner, stitcher and pipeline.
//!
//! All timings are integer milliseconds. Window-relative timings live on
//! [`WordSegment`]; absolute (recording-wide) timings live on [`AlignedWord`].

use serde::{Deserialize, Serialize};

/// One bounded time slice of the recording, the unit of work sent to the aligner.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChunkWindow {
    /// Stable identifier (`chunk-001`, `chunk-002`, ...).
    pub id: String,
    /// Window start, absolute in the recording.
    pub start_ms: u64,
    /// Window end, absolute in the recording.
    pub end_ms: u64,
    /// How much of this window repeats the end of the previous one (0 for the first).
    pub overlap_ms: u64,
}

impl ChunkWindow {
    /// Creates a window with the canonical id for a 1-based index.
    pub fn new(index: usize, start_ms: u64, end_ms: u64, overlap_ms: u64) -> Self {
        Self {
            id: window_id(index),
            start_ms,
            end_ms,
            overlap_ms,
        }
    }

    /// Length of the window in milliseconds.
    pub fn duration_ms(&self) -> u64 {
        self.end_ms - self.start_ms
    }
}

/// Canonical window id for a 1-based index.
pub fn window_id(index: usize) -> String {
    format!("chunk-{index:03}")
}

/// A word reported by the aligner, timed relative to its window's start.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WordSegment {
    pub text: String,
    pub start_ms: u64,
    pub end_ms: u64,
    /// Aligner confidence; 0.0 when the backend reports none.
    #[serde(default)]
    pub confidence: f32,
}

impl WordSegment {
    pub fn new(text: &str, start_ms: u64, end_ms: u64, confidence: f32) -> Self {
        Self {
            text: text.to_string(),
            start_ms,
            end_ms,
            confidence,
        }
    }
}

/// The aligner's result for one window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkAlignment {
    pub window: ChunkWindow,
    pub words: Vec<WordSegment>,
}

impl ChunkAlignment {
    pub fn new(window: ChunkWindow, words: Vec<WordSegment>) -> Self {
        Self { window, words }
    }
}

/// A stitched word with absolute timings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlignedWord {
    pub text: String,
    pub start_ms: u64,
    pub end_ms: u64,
    pub confidence: f32,
    /// Id of the window whose observation was kept.
    pub source_window_id: String,
}

/// Diagnostic form of a window, as written to `chunk-map.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMapEntry {
    pub id: String,
    pub start_ms: u64,
    pub end_ms: u64,
    pub duration_ms: u64,
    pub overlap_ms: u64,
}

impl From<&ChunkWindow> for ChunkMapEntry {
    fn from(window: &ChunkWindow) -> Self {
        Self {
            id: window.id.clone(),
            start_ms: window.start_ms,
            end_ms: window.end_ms,
            duration_ms: window.duration_ms(),
            overlap_ms: window.overlap_ms,
        }
    }
}
