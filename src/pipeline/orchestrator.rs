//! Chapter alignment run: plan, align every window, stitch, evaluate.

use crate::aligner::{AlignRequest, CancelFlag, ForcedAligner};
use crate::alignment::coverage;
use crate::alignment::planner;
use crate::alignment::stitcher;
use crate::alignment::types::{AlignedWord, ChunkAlignment, ChunkMapEntry, ChunkWindow, WordSegment};
use crate::audio::AudioSource;
use crate::cache::{CacheClaim, CacheKeyInputs, CacheStore, build_key};
use crate::defaults;
use crate::error::{ChapalignError, Result};
use crate::pipeline::summary::{self, CacheStatus, RunSummary, StageTimings};
use crate::pronunciation::{AlignerResources, PronunciationVariant};
use crate::text::TextReference;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Instant;

/// Configuration for an alignment run.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    pub chunk_size_sec: u32,
    pub chunk_overlap_sec: u32,
    pub overlap_tolerance_ms: u64,
    /// Coverage percentage required to pass
    pub coverage_threshold: f64,
    /// Windows aligned concurrently (1 = sequential)
    pub max_parallel: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            chunk_size_sec: defaults::CHUNK_SIZE_SEC,
            chunk_overlap_sec: defaults::CHUNK_OVERLAP_SEC,
            overlap_tolerance_ms: defaults::OVERLAP_TOLERANCE_MS,
            coverage_threshold: defaults::COVERAGE_THRESHOLD,
            max_parallel: defaults::MAX_PARALLEL,
        }
    }
}

/// Inputs for one chapter.
#[derive(Debug, Clone)]
pub struct RunRequest<'a> {
    pub text: &'a TextReference,
    pub audio: AudioSource,
    pub resources: &'a AlignerResources,
    /// Scratch space; window `chunk-NNN` works in `<working_dir>/chunks/chunk-NNN`.
    pub working_dir: PathBuf,
}

/// Everything a run produces. Also the shape of the cached `alignment.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineOutput {
    pub windows: Vec<ChunkWindow>,
    pub chunk_alignments: Vec<ChunkAlignment>,
    pub aligned_words: Vec<AlignedWord>,
    pub chunk_map: Vec<ChunkMapEntry>,
    pub summary: RunSummary,
    pub cache_key: Option<String>,
}

/// Runs chapters through the aligner.
#[derive(Debug, Clone, Default)]
pub struct AlignmentPipeline {
    config: PipelineConfig,
    cancel: CancelFlag,
}

impl AlignmentPipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            cancel: CancelFlag::new(),
        }
    }

    /// Use an externally owned flag; raising it cancels in-flight and future runs.
    pub fn with_cancel_flag(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn cancel_flag(&self) -> &CancelFlag {
        &self.cancel
    }

    /// Cache key dimensions for a run with this configuration.
    pub fn cache_key_inputs(
        &self,
        audio_fingerprint: &str,
        text: &TextReference,
        variant: PronunciationVariant,
        aligner_name: &str,
    ) -> CacheKeyInputs {
        CacheKeyInputs::new(
            audio_fingerprint,
            &text.version,
            variant.as_str(),
            self.config.chunk_size_sec,
            self.config.chunk_overlap_sec,
        )
        .with_extra("tolerance_ms", self.config.overlap_tolerance_ms)
        .with_extra("aligner", aligner_name)
    }

    /// Align one chapter.
    ///
    /// Every window is sent to `aligner` exactly once. The first failing
    /// window (lowest index) fails the whole run and no partial output is
    /// returned. With a `cache`, a complete entry short-circuits the run and a
    /// fresh result is persisted when the entry's claim can be taken.
    pub fn run(
        &self,
        request: &RunRequest<'_>,
        aligner: &dyn ForcedAligner,
        cache: Option<&CacheStore>,
    ) -> Result<PipelineOutput> {
        let run_started = Instant::now();
        let mut timings = StageTimings::new();
        let span = tracing::info_span!(
            "align_chapter",
            book = %request.text.book,
            chapter = request.text.chapter,
            aligner = aligner.name(),
        );
        let _enter = span.enter();

        if self.config.max_parallel == 0 {
            return Err(ChapalignError::invalid("max_parallel", "must be at least 1"));
        }
        if self.cancel.is_cancelled() {
            return Err(ChapalignError::Cancelled);
        }

        let key = cache.map(|_| {
            build_key(&self.cache_key_inputs(
                &request.audio.fingerprint,
                request.text,
                request.resources.variant,
                aligner.name(),
            ))
        });

        let mut claim: Option<CacheClaim> = None;
        let cache_status = match (cache, key.as_deref()) {
            (Some(store), Some(key)) => {
                let lookup_started = Instant::now();
                // Completion is checked after claiming; a complete entry is never rewritten
                claim = store.claim(key)?;
                if store.is_complete(key)? {
                    drop(claim.take());
                    let cached = load_cached(store, key)?;
                    timings.record("cache_lookup", lookup_started.elapsed());
                    let mut output = self.assemble(
                        request,
                        cached.windows,
                        cached.chunk_alignments,
                        cached.aligned_words,
                        CacheStatus::Hit,
                        Some(key.to_string()),
                    );
                    timings.record("total", run_started.elapsed());
                    output.summary.durations_ms = timings.into_map();
                    tracing::info!(
                        key,
                        coverage_pct = output.summary.coverage_pct,
                        passed = output.summary.coverage_passed,
                        "cache hit, skipping alignment"
                    );
                    return Ok(output);
                }
                timings.record("cache_lookup", lookup_started.elapsed());
                if claim.is_some() {
                    CacheStatus::Stored
                } else {
                    tracing::warn!(key, "cache entry is being written elsewhere, not persisting");
                    CacheStatus::Busy
                }
            }
            _ => CacheStatus::Disabled,
        };

        let stage = Instant::now();
        let windows = planner::plan(
            request.audio.duration_ms,
            self.config.chunk_size_sec,
            self.config.chunk_overlap_sec,
        )?;
        timings.record("plan", stage.elapsed());
        tracing::info!(
            windows = windows.len(),
            duration_ms = request.audio.duration_ms,
            "planned alignment windows"
        );

        let stage = Instant::now();
        let chunk_alignments = self.align_windows(request, aligner, &windows)?;
        timings.record("align", stage.elapsed());

        let stage = Instant::now();
        let aligned_words =
            stitcher::stitch(chunk_alignments.iter().cloned(), self.config.overlap_tolerance_ms);
        timings.record("stitch", stage.elapsed());

        let mut output = self.assemble(
            request,
            windows,
            chunk_alignments,
            aligned_words,
            cache_status,
            key.clone(),
        );

        if let (Some(store), Some(key), Some(_claim)) = (cache, key.as_deref(), claim.as_ref()) {
            let stage = Instant::now();
            let mut stored_timings = timings.clone();
            stored_timings.record("total", run_started.elapsed());
            output.summary.durations_ms = stored_timings.into_map();
            persist(store, key, &output, aligner.name(), &self.cancel)?;
            timings.record("cache_store", stage.elapsed());
        }
        timings.record("total", run_started.elapsed());
        output.summary.durations_ms = timings.into_map();

        tracing::info!(
            expected = output.summary.expected_words,
            aligned = output.summary.aligned_words,
            coverage_pct = output.summary.coverage_pct,
            passed = output.summary.coverage_passed,
            cache = %cache_status,
            "chapter aligned"
        );
        Ok(output)
    }

    /// Scores `aligned_words` against this request's text and threshold.
    ///
    /// Book, chapter and threshold always come from the current run, also when
    /// the alignment itself was replayed from the cache.
    fn assemble(
        &self,
        request: &RunRequest<'_>,
        windows: Vec<ChunkWindow>,
        chunk_alignments: Vec<ChunkAlignment>,
        aligned_words: Vec<AlignedWord>,
        cache_status: CacheStatus,
        cache_key: Option<String>,
    ) -> PipelineOutput {
        let report = coverage::evaluate(
            request.text.word_count(),
            aligned_words.len(),
            self.config.coverage_threshold,
        );
        let (avg_confidence, min_confidence) = summary::confidence_stats(&aligned_words);

        PipelineOutput {
            chunk_map: planner::chunk_map(&windows),
            summary: RunSummary {
                book: request.text.book.clone(),
                chapter: request.text.chapter,
                expected_words: report.expected_words,
                aligned_words: report.aligned_words,
                coverage_pct: report.coverage_pct,
                coverage_threshold: report.threshold,
                coverage_passed: report.passed,
                variant: request.resources.variant.to_string(),
                chunk_count: windows.len(),
                avg_confidence,
                min_confidence,
                durations_ms: Default::default(),
                cache_status,
                created_at: summary::timestamp_now(),
            },
            windows,
            chunk_alignments,
            aligned_words,
            cache_key,
        }
    }

    fn align_windows(
        &self,
        request: &RunRequest<'_>,
        aligner: &dyn ForcedAligner,
        windows: &[ChunkWindow],
    ) -> Result<Vec<ChunkAlignment>> {
        // Scoped to this run so a failure here does not cancel later runs
        let cancel = self.cancel.child();
        let workers = self.config.max_parallel.min(windows.len()).max(1);

        let results = if workers == 1 {
            let mut results = Vec::with_capacity(windows.len());
            for (index, window) in windows.iter().enumerate() {
                if cancel.is_cancelled() {
                    break;
                }
                let result = align_window(request, aligner, window, &cancel);
                let failed = result.is_err();
                results.push((index, result));
                if failed {
                    break;
                }
            }
            results
        } else {
            dispatch_parallel(request, aligner, windows, &cancel, workers)
        };

        collect_results(windows, results, &cancel)
    }
}

fn align_window(
    request: &RunRequest<'_>,
    aligner: &dyn ForcedAligner,
    window: &ChunkWindow,
    cancel: &CancelFlag,
) -> Result<Vec<WordSegment>> {
    let scratch_dir = scratch_dir(&request.working_dir, window);
    fs::create_dir_all(&scratch_dir)?;
    let align_request = AlignRequest {
        window,
        audio: request.audio.slice(window.start_ms, window.end_ms),
        text: request.text,
        resources: request.resources,
        scratch_dir,
        cancel,
    };

    let started = Instant::now();
    let result = aligner.align(&align_request);
    match &result {
        Ok(words) => tracing::debug!(
            window = %window.id,
            words = words.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "window aligned"
        ),
        Err(ChapalignError::Cancelled) => tracing::debug!(window = %window.id, "window cancelled"),
        Err(e) if e.is_aligner_failure() => {
            tracing::warn!(window = %window.id, error = %e, "window alignment failed")
        }
        Err(e) => tracing::error!(window = %window.id, error = %e, "window alignment error"),
    }
    result
}

fn scratch_dir(working_dir: &Path, window: &ChunkWindow) -> PathBuf {
    working_dir.join("chunks").join(&window.id)
}

/// Workers pull windows from a shared queue until it drains or the run is cancelled.
fn dispatch_parallel(
    request: &RunRequest<'_>,
    aligner: &dyn ForcedAligner,
    windows: &[ChunkWindow],
    cancel: &CancelFlag,
    workers: usize,
) -> Vec<(usize, Result<Vec<WordSegment>>)> {
    let (tx, rx) = crossbeam_channel::unbounded();
    for item in windows.iter().enumerate() {
        if tx.send(item).is_err() {
            break;
        }
    }
    drop(tx);

    thread::scope(|scope| {
        let handles: Vec<_> = (0..workers)
            .map(|_| {
                let rx = rx.clone();
                scope.spawn(move || {
                    let mut done = Vec::new();
                    for (index, window) in rx.iter() {
                        if cancel.is_cancelled() {
                            break;
                        }
                        let result = align_window(request, aligner, window, cancel);
                        if result.is_err() {
                            cancel.cancel();
                        }
                        done.push((index, result));
                    }
                    done
                })
            })
            .collect();

        handles
            .into_iter()
            .flat_map(|h| h.join().unwrap_or_else(|panic| std::panic::resume_unwind(panic)))
            .collect()
    })
}

/// Barrier: turn per-window results into ordered alignments or the run's error.
///
/// Among failures, the lowest window index wins. `Cancelled` results caused by
/// another window's failure never mask that failure.
fn collect_results(
    windows: &[ChunkWindow],
    mut results: Vec<(usize, Result<Vec<WordSegment>>)>,
    cancel: &CancelFlag,
) -> Result<Vec<ChunkAlignment>> {
    results.sort_by_key(|(index, _)| *index);

    let mut cancelled = false;
    let mut alignments = Vec::with_capacity(windows.len());
    for (index, result) in results {
        match result {
            Ok(words) => alignments.push(ChunkAlignment::new(windows[index].clone(), words)),
            Err(ChapalignError::Cancelled) => cancelled = true,
            Err(e) => return Err(e),
        }
    }

    if cancelled || cancel.is_cancelled() || alignments.len() != windows.len() {
        return Err(ChapalignError::Cancelled);
    }
    Ok(alignments)
}

fn load_cached(store: &CacheStore, key: &str) -> Result<PipelineOutput> {
    let path = store.artifact_path(key, defaults::ALIGNMENT_ARTIFACT, false)?;
    let contents = fs::read_to_string(&path).map_err(|e| ChapalignError::CacheCorrupt {
        key: key.to_string(),
        message: format!("complete entry without {}: {e}", defaults::ALIGNMENT_ARTIFACT),
    })?;
    serde_json::from_str(&contents).map_err(|e| ChapalignError::CacheCorrupt {
        key: key.to_string(),
        message: format!("unreadable {}: {e}", defaults::ALIGNMENT_ARTIFACT),
    })
}

/// Artifact first, metadata last; the metadata write is what marks completion.
fn persist(
    store: &CacheStore,
    key: &str,
    output: &PipelineOutput,
    aligner_name: &str,
    cancel: &CancelFlag,
) -> Result<()> {
    let path = store.artifact_path(key, defaults::ALIGNMENT_ARTIFACT, true)?;
    let contents = serde_json::to_string_pretty(output)?;
    fs::write(&path, contents).map_err(|e| ChapalignError::cache_io(&path, e))?;

    if cancel.is_cancelled() {
        return Err(ChapalignError::Cancelled);
    }
    let metadata = serde_json::json!({
        "complete": true,
        "book": output.summary.book,
        "chapter": output.summary.chapter,
        "variant": output.summary.variant,
        "aligner": aligner_name,
        "chunk_count": output.summary.chunk_count,
        "coverage_pct": output.summary.coverage_pct,
        "created_at": output.summary.created_at,
        "tool_version": crate::version_string(),
    });
    store.write_metadata(key, &metadata)?;
    tracing::info!(key, "stored alignment in cache");
    Ok(())
}
