use crate::alignment::types::{ChunkWindow, WordSegment};
use crate::audio::AudioSlice;
use crate::error::{ChapalignError, Result};
use crate::pronunciation::AlignerResources;
use crate::text::TextReference;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// Shared flag for cooperative cancellation of a run.
///
/// A [`child`](Self::child) flag also reports cancellation raised on any of
/// its ancestors, while cancelling the child leaves the ancestors untouched.
#[derive(Debug, Clone)]
pub struct CancelFlag {
    // flags[0] is this flag's own; the rest belong to ancestors
    flags: Vec<Arc<AtomicBool>>,
}

impl Default for CancelFlag {
    fn default() -> Self {
        Self {
            flags: vec![Arc::new(AtomicBool::new(false))],
        }
    }
}

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// A new flag scoped under this one.
    pub fn child(&self) -> Self {
        let mut flags = Vec::with_capacity(self.flags.len() + 1);
        flags.push(Arc::new(AtomicBool::new(false)));
        flags.extend(self.flags.iter().cloned());
        Self { flags }
    }

    pub fn cancel(&self) {
        if let Some(own) = self.flags.first() {
            own.store(true, Ordering::SeqCst);
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.flags.iter().any(|flag| flag.load(Ordering::SeqCst))
    }
}

/// Everything the aligner needs to align one window.
#[derive(Debug, Clone)]
pub struct AlignRequest<'a> {
    pub window: &'a ChunkWindow,
    /// Locator for the window's audio.
    pub audio: AudioSlice,
    pub text: &'a TextReference,
    pub resources: &'a AlignerResources,
    /// Private working directory for this window; nothing else writes here.
    pub scratch_dir: PathBuf,
    pub cancel: &'a CancelFlag,
}

/// Trait for forced-alignment backends.
///
/// Implementations align exactly one window per call and return words timed
/// relative to the window start. Failures must be one of
/// [`ChapalignError::AlignerUnavailable`], [`ChapalignError::AlignerCommandFailed`]
/// or [`ChapalignError::AlignerTimeout`] (or `Cancelled` if the flag was raised).
pub trait ForcedAligner: Send + Sync {
    /// Align one window.
    fn align(&self, request: &AlignRequest<'_>) -> Result<Vec<WordSegment>>;

    /// Backend name for logs and cache keys.
    fn name(&self) -> &str;
}

/// Implement ForcedAligner for Arc<T> to allow sharing across runs.
impl<T: ForcedAligner> ForcedAligner for Arc<T> {
    fn align(&self, request: &AlignRequest<'_>) -> Result<Vec<WordSegment>> {
        (**self).align(request)
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

/// Failure a [`MockAligner`] can be told to produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockFailure {
    Unavailable,
    CommandFailed,
    Timeout,
}

/// Mock aligner for testing.
///
/// Simulates speech at a steady pace: word `k` of the reference occupies
/// `[k * pitch, k * pitch + pitch / 2)` in absolute time. Each window reports
/// the words starting inside its non-overlapping part, plus the last word
/// before that part (the boundary word a real aligner re-recognizes in the
/// overlap region).
#[derive(Debug)]
pub struct MockAligner {
    name: String,
    word_pitch_ms: u64,
    confidence: f32,
    scripted: HashMap<String, Vec<WordSegment>>,
    failures: HashMap<String, MockFailure>,
    calls: Mutex<Vec<String>>,
}

impl MockAligner {
    /// Create a new mock aligner with default settings (500ms per word, confidence 0.9).
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            word_pitch_ms: 500,
            confidence: 0.9,
            scripted: HashMap::new(),
            failures: HashMap::new(),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Configure the simulated speaking pace.
    pub fn with_word_pitch_ms(mut self, pitch_ms: u64) -> Self {
        self.word_pitch_ms = pitch_ms.max(2);
        self
    }

    /// Configure the confidence reported for simulated words.
    pub fn with_confidence(mut self, confidence: f32) -> Self {
        self.confidence = confidence;
        self
    }

    /// Return exactly `words` for the window with id `window_id`.
    pub fn with_script(mut self, window_id: &str, words: Vec<WordSegment>) -> Self {
        self.scripted.insert(window_id.to_string(), words);
        self
    }

    /// Fail the window with id `window_id`.
    pub fn with_failure(mut self, window_id: &str, failure: MockFailure) -> Self {
        self.failures.insert(window_id.to_string(), failure);
        self
    }

    /// Window ids this aligner was called with, in call order.
    pub fn calls(&self) -> Vec<String> {
        self.calls
            .lock()
            .map(|calls| calls.clone())
            .unwrap_or_default()
    }

    fn simulate(&self, request: &AlignRequest<'_>) -> Vec<WordSegment> {
        let tokens: Vec<&str> = request.text.tokens().collect();
        if tokens.is_empty() {
            return Vec::new();
        }
        let window = request.window;
        let pitch = self.word_pitch_ms;
        let owned_start = window.start_ms + window.overlap_ms;

        // First word starting at or after owned_start, minus the boundary word
        let first_owned = owned_start.div_ceil(pitch);
        let first = if window.overlap_ms > 0 {
            first_owned.saturating_sub(1)
        } else {
            first_owned
        };

        (first..)
            .map(|k| (k, k * pitch))
            .take_while(|&(_, start)| start < window.end_ms)
            .take_while(|&(k, _)| (k as usize) < tokens.len())
            .filter(|&(_, start)| start >= window.start_ms)
            .map(|(k, start)| {
                WordSegment::new(
                    tokens[k as usize],
                    start - window.start_ms,
                    start + pitch / 2 - window.start_ms,
                    self.confidence,
                )
            })
            .collect()
    }
}

impl ForcedAligner for MockAligner {
    fn align(&self, request: &AlignRequest<'_>) -> Result<Vec<WordSegment>> {
        let id = request.window.id.clone();
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(id.clone());
        }

        if request.cancel.is_cancelled() {
            return Err(ChapalignError::Cancelled);
        }

        match self.failures.get(&id) {
            Some(MockFailure::Unavailable) => {
                return Err(ChapalignError::AlignerUnavailable {
                    message: "mock aligner unavailable".to_string(),
                });
            }
            Some(MockFailure::CommandFailed) => {
                return Err(ChapalignError::AlignerCommandFailed {
                    window: id,
                    message: "mock alignment failure".to_string(),
                });
            }
            Some(MockFailure::Timeout) => {
                return Err(ChapalignError::AlignerTimeout {
                    window: id,
                    timeout_secs: 0,
                });
            }
            None => {}
        }

        if let Some(words) = self.scripted.get(&id) {
            return Ok(words.clone());
        }
        Ok(self.simulate(request))
    }

    fn name(&self) -> &str {
        &self.name
    }
}
