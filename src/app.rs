//! Command handlers behind the CLI.
//!
//! Composition root: turns configuration and arguments into a pipeline run
//! and writes the chapter's artifacts.

use crate::aligner::{ForcedAligner, MfaConfig};
use crate::alignment::coverage::exit_status;
use crate::alignment::planner;
use crate::audio::AudioSource;
use crate::cache::{CacheStore, build_key};
use crate::cli::{CacheAction, ProcessArgs, chapter_output_dir, infer_reference_from_filename};
use crate::config::Config;
use crate::defaults;
use crate::pipeline::{AlignmentPipeline, PipelineConfig, PipelineOutput, RunRequest, RunSummary};
use crate::pronunciation::{AlignerResources, PronunciationVariant};
use crate::text::TextReference;
use anyhow::{Context, Result, bail};
use owo_colors::OwoColorize;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const SUMMARY_FILENAME: &str = "summary.json";
pub const CHUNK_MAP_FILENAME: &str = "chunk-map.json";

const WORK_DIRNAME: &str = ".work";

/// Files written for one chapter.
#[derive(Debug, Clone, PartialEq)]
pub struct ChapterArtifacts {
    pub dir: PathBuf,
    pub summary: PathBuf,
    pub chunk_map: PathBuf,
    pub alignment: PathBuf,
}

/// Configuration with command-line overrides applied and validated.
pub fn effective_config(config: &Config, args: &ProcessArgs) -> Result<Config> {
    let mut config = config.clone();
    if let Some(size) = args.chunk_size {
        config.chunking.chunk_size_sec = size;
    }
    if let Some(overlap) = args.chunk_overlap {
        config.chunking.chunk_overlap_sec = overlap;
    }
    if let Some(threshold) = args.coverage_threshold {
        config.coverage.threshold = threshold;
    }
    if let Some(jobs) = args.jobs {
        config.aligner.max_parallel = jobs;
    }
    if let Some(timeout) = args.aligner_timeout {
        config.aligner.timeout_secs = timeout;
    }
    if let Some(dir) = &args.output_dir {
        config.paths.output_root = dir.clone();
    }
    config.validate()?;
    Ok(config)
}

pub fn pipeline_config(config: &Config) -> PipelineConfig {
    PipelineConfig {
        chunk_size_sec: config.chunking.chunk_size_sec,
        chunk_overlap_sec: config.chunking.chunk_overlap_sec,
        overlap_tolerance_ms: config.chunking.overlap_tolerance_ms,
        coverage_threshold: config.coverage.threshold,
        max_parallel: config.aligner.max_parallel,
    }
}

pub fn mfa_config(config: &Config) -> MfaConfig {
    MfaConfig {
        executable: config.aligner.executable.clone(),
        timeout: Duration::from_secs(config.aligner.timeout_secs),
        num_jobs: config.aligner.num_jobs,
    }
}

/// Book and chapter from the arguments, falling back to the audio file name.
pub fn resolve_reference(args: &ProcessArgs) -> Result<(String, u32)> {
    let inferred = infer_reference_from_filename(&args.audio);
    let book = args
        .book
        .clone()
        .or_else(|| inferred.as_ref().map(|(book, _)| book.clone()));
    let chapter = args.chapter.or_else(|| inferred.as_ref().map(|(_, chapter)| *chapter));
    match (book, chapter) {
        (Some(book), Some(chapter)) => Ok((book, chapter)),
        _ => bail!(
            "cannot infer book and chapter from '{}'; pass --book and --chapter",
            args.audio.display()
        ),
    }
}

/// Aligner resources for the requested variant; explicit paths win.
pub fn resolve_resources(config: &Config, args: &ProcessArgs) -> AlignerResources {
    let mut resources = AlignerResources::from_resources_dir(&config.paths.resources_dir, args.variant);
    if let Some(dictionary) = &args.dictionary {
        resources.dictionary = dictionary.clone();
    }
    if let Some(model) = &args.acoustic_model {
        resources.acoustic_model = model.clone();
    }
    resources
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let contents = serde_json::to_string_pretty(value)?;
    fs::write(path, contents).with_context(|| format!("failed to write {}", path.display()))
}

/// Write `summary.json`, `chunk-map.json` and `alignment.json` into `dir`.
pub fn write_artifacts(dir: &Path, output: &PipelineOutput) -> Result<ChapterArtifacts> {
    fs::create_dir_all(dir).with_context(|| format!("failed to create {}", dir.display()))?;
    let artifacts = ChapterArtifacts {
        dir: dir.to_path_buf(),
        summary: dir.join(SUMMARY_FILENAME),
        chunk_map: dir.join(CHUNK_MAP_FILENAME),
        alignment: dir.join(defaults::ALIGNMENT_ARTIFACT),
    };
    write_json(&artifacts.summary, &output.summary)?;
    write_json(&artifacts.chunk_map, &output.chunk_map)?;
    write_json(&artifacts.alignment, &output.aligned_words)?;
    Ok(artifacts)
}

/// Align one chapter and write its artifacts. Returns the process exit code.
pub fn run_process(
    config: &Config,
    args: &ProcessArgs,
    aligner: &dyn ForcedAligner,
    quiet: bool,
) -> Result<i32> {
    let config = effective_config(config, args)?;
    let (book, chapter) = resolve_reference(args)?;
    let text = TextReference::load(&book, chapter, &args.text)?;
    let audio = AudioSource::probe(&args.audio)?;
    let resources = resolve_resources(&config, args);
    let pipeline = AlignmentPipeline::new(pipeline_config(&config));
    let chapter_dir = chapter_output_dir(&config.paths.output_root, &book, chapter);

    tracing::info!(
        book = %book,
        chapter,
        words = text.word_count(),
        duration_ms = audio.duration_ms,
        variant = %args.variant,
        "processing chapter"
    );

    if args.dry_run {
        let windows = planner::plan(
            audio.duration_ms,
            config.chunking.chunk_size_sec,
            config.chunking.chunk_overlap_sec,
        )?;
        let key = build_key(&pipeline.cache_key_inputs(
            &audio.fingerprint,
            &text,
            args.variant,
            aligner.name(),
        ));
        let plan = serde_json::json!({
            "book": book,
            "chapter": chapter,
            "expected_words": text.word_count(),
            "cache_key": key,
            "output_dir": chapter_dir,
            "chunks": planner::chunk_map(&windows),
        });
        println!("{}", serde_json::to_string_pretty(&plan)?);
        return Ok(defaults::EXIT_SUCCESS);
    }

    let cache = if args.no_cache {
        None
    } else {
        Some(CacheStore::open(&config.paths.cache_dir)?)
    };

    let work_dir = chapter_dir.join(WORK_DIRNAME);
    let request = RunRequest {
        text: &text,
        audio,
        resources: &resources,
        working_dir: work_dir.clone(),
    };
    let output = pipeline.run(&request, aligner, cache.as_ref())?;

    let artifacts = write_artifacts(&chapter_dir, &output)?;
    if work_dir.exists()
        && let Err(e) = fs::remove_dir_all(&work_dir)
    {
        tracing::warn!(path = %work_dir.display(), error = %e, "failed to remove work directory");
    }
    tracing::info!(dir = %artifacts.dir.display(), "wrote chapter artifacts");

    if !quiet {
        print_summary(&output.summary, &artifacts.dir);
    }
    Ok(exit_status(&output.summary.coverage()).code())
}

/// One-line coloured summary of a run.
pub fn print_summary(summary: &RunSummary, dir: &Path) {
    let head = format!("{} {}", summary.book, summary.chapter);
    let coverage = format!(
        "{:.3}% (threshold {:.1}%)",
        summary.coverage_pct, summary.coverage_threshold
    );
    if summary.coverage_passed {
        println!(
            "{} {}: {}/{} words, {}, {} windows, cache {}",
            "✓".green().bold(),
            head.bold(),
            summary.aligned_words,
            summary.expected_words,
            coverage.green(),
            summary.chunk_count,
            summary.cache_status,
        );
    } else {
        println!(
            "{} {}: {}/{} words, {}, {} windows, cache {}",
            "✗".red().bold(),
            head.bold(),
            summary.aligned_words,
            summary.expected_words,
            coverage.red(),
            summary.chunk_count,
            summary.cache_status,
        );
    }
    println!("  {}", dir.display().dimmed());
}

/// `chapalign cache ...`
pub fn run_cache(config: &Config, action: &CacheAction, aligner_name: &str, quiet: bool) -> Result<i32> {
    match action {
        CacheAction::Purge { older_than_days } => {
            let store = CacheStore::open(&config.paths.cache_dir)?;
            let removed = store.purge_older_than(*older_than_days)?;
            if !quiet {
                for key in &removed {
                    println!("{key}");
                }
                println!(
                    "Removed {} cache entr{} older than {} day(s) from {}",
                    removed.len(),
                    if removed.len() == 1 { "y" } else { "ies" },
                    older_than_days,
                    store.root().display()
                );
            }
        }
        CacheAction::Key {
            audio,
            text,
            variant,
            chunk_size,
            chunk_overlap,
        } => {
            let key = cache_key_for(config, audio, text, *variant, *chunk_size, *chunk_overlap, aligner_name)?;
            println!("{key}");
        }
    }
    Ok(defaults::EXIT_SUCCESS)
}

fn cache_key_for(
    config: &Config,
    audio: &Path,
    text: &Path,
    variant: PronunciationVariant,
    chunk_size: Option<u32>,
    chunk_overlap: Option<u32>,
    aligner_name: &str,
) -> Result<String> {
    let mut pipeline_config = pipeline_config(config);
    if let Some(size) = chunk_size {
        pipeline_config.chunk_size_sec = size;
    }
    if let Some(overlap) = chunk_overlap {
        pipeline_config.chunk_overlap_sec = overlap;
    }
    // Book and chapter do not contribute to the key
    let reference = TextReference::load("", 0, text)?;
    let fingerprint = crate::audio::fingerprint_file(audio)?;
    let pipeline = AlignmentPipeline::new(pipeline_config);
    Ok(build_key(&pipeline.cache_key_inputs(
        &fingerprint,
        &reference,
        variant,
        aligner_name,
    )))
}
