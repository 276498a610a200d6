//! End-to-end runs over a real WAV file with the mock aligner.

use chapalign::aligner::{MockAligner, MockFailure};
use chapalign::app::{CHUNK_MAP_FILENAME, SUMMARY_FILENAME, run_process};
use chapalign::audio::wav;
use chapalign::cli::{Cli, Commands, ProcessArgs};
use chapalign::config::Config;
use chapalign::defaults::{ALIGNMENT_ARTIFACT, EXIT_COVERAGE_FAILURE, EXIT_SUCCESS};
use chapalign::pipeline::{CacheStatus, RunSummary};
use chapalign::{
    AlignedWord, AlignerResources, AlignmentPipeline, AudioSource, CacheStore, ChapalignError,
    ChunkMapEntry, PipelineConfig, PronunciationVariant, RunRequest, TextReference,
};
use clap::Parser;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const SAMPLE_RATE: u32 = 8000;

struct Workspace {
    dir: TempDir,
    audio: PathBuf,
    text: PathBuf,
    config: Config,
}

impl Workspace {
    /// `seconds` of silence as `genesis-1.wav` and a reference of `words` tokens.
    fn new(seconds: u32, words: usize) -> Self {
        let dir = TempDir::new().unwrap();
        let audio = dir.path().join("genesis-1.wav");
        let samples = vec![0i16; (SAMPLE_RATE * seconds) as usize];
        wav::write_mono_i16(&audio, SAMPLE_RATE, &samples).unwrap();

        let text = dir.path().join("genesis-1.txt");
        let tokens: Vec<String> = (0..words).map(|i| format!("w{i}")).collect();
        let mut contents = String::from("# Genesis 1\n");
        for verse in tokens.chunks(12) {
            contents.push_str(&verse.join(" "));
            contents.push('\n');
        }
        fs::write(&text, contents).unwrap();

        let mut config = Config::default();
        config.paths.output_root = dir.path().join("out");
        config.paths.cache_dir = dir.path().join("cache");
        config.paths.resources_dir = dir.path().join("resources");
        config.chunking.chunk_size_sec = 40;
        config.chunking.chunk_overlap_sec = 5;

        Self {
            dir,
            audio,
            text,
            config,
        }
    }

    fn args(&self, extra: &[&str]) -> ProcessArgs {
        let audio = self.audio.display().to_string();
        let text = self.text.display().to_string();
        let mut argv = vec!["chapalign", "process", audio.as_str(), "--text", text.as_str()];
        argv.extend_from_slice(extra);
        match Cli::try_parse_from(argv).unwrap().command {
            Commands::Process(args) => args,
            other => panic!("Expected Process command, got {other:?}"),
        }
    }

    fn chapter_dir(&self) -> PathBuf {
        self.config.paths.output_root.join("genesis").join("001")
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> T {
    serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap()
}

#[test]
fn process_writes_chapter_artifacts() {
    let ws = Workspace::new(120, 240);
    let aligner = MockAligner::new("mock");

    let code = run_process(&ws.config, &ws.args(&[]), &aligner, true).unwrap();
    assert_eq!(code, EXIT_SUCCESS);
    assert_eq!(aligner.calls().len(), 4);

    let dir = ws.chapter_dir();
    let summary: RunSummary = read_json(&dir.join(SUMMARY_FILENAME));
    assert_eq!(summary.book, "genesis");
    assert_eq!(summary.chapter, 1);
    assert_eq!(summary.expected_words, 240);
    assert_eq!(summary.aligned_words, 240);
    assert_eq!(summary.coverage_pct, 100.0);
    assert!(summary.coverage_passed);
    assert_eq!(summary.cache_status, CacheStatus::Stored);

    let chunk_map: Vec<ChunkMapEntry> = read_json(&dir.join(CHUNK_MAP_FILENAME));
    let bounds: Vec<(u64, u64, u64)> = chunk_map
        .iter()
        .map(|c| (c.start_ms, c.end_ms, c.overlap_ms))
        .collect();
    assert_eq!(
        bounds,
        vec![
            (0, 40_000, 0),
            (35_000, 75_000, 5_000),
            (70_000, 110_000, 5_000),
            (105_000, 120_000, 5_000),
        ]
    );

    let words: Vec<AlignedWord> = read_json(&dir.join(ALIGNMENT_ARTIFACT));
    assert_eq!(words.len(), 240);
    assert_eq!(words[80].text, "w80");
    assert_eq!(words[80].start_ms, 40_000);
    assert_eq!(words[80].source_window_id, "chunk-002");

    assert!(!dir.join(".work").exists());
}

#[test]
fn second_process_is_served_from_cache() {
    let ws = Workspace::new(120, 240);
    run_process(&ws.config, &ws.args(&[]), &MockAligner::new("mock"), true).unwrap();

    let aligner = MockAligner::new("mock");
    let code = run_process(&ws.config, &ws.args(&[]), &aligner, true).unwrap();
    assert_eq!(code, EXIT_SUCCESS);
    assert!(aligner.calls().is_empty());

    let summary: RunSummary = read_json(&ws.chapter_dir().join(SUMMARY_FILENAME));
    assert_eq!(summary.cache_status, CacheStatus::Hit);
    assert_eq!(summary.aligned_words, 240);
}

#[test]
fn no_cache_always_aligns() {
    let ws = Workspace::new(120, 240);
    run_process(&ws.config, &ws.args(&["--no-cache"]), &MockAligner::new("mock"), true).unwrap();

    let aligner = MockAligner::new("mock");
    run_process(&ws.config, &ws.args(&["--no-cache"]), &aligner, true).unwrap();
    assert_eq!(aligner.calls().len(), 4);

    let summary: RunSummary = read_json(&ws.chapter_dir().join(SUMMARY_FILENAME));
    assert_eq!(summary.cache_status, CacheStatus::Disabled);
    assert!(!ws.config.paths.cache_dir.exists());
}

#[test]
fn low_coverage_exits_with_coverage_failure() {
    // 300 reference words, but the recording only holds 240 at the mock's pace
    let ws = Workspace::new(120, 300);
    let code = run_process(&ws.config, &ws.args(&[]), &MockAligner::new("mock"), true).unwrap();
    assert_eq!(code, EXIT_COVERAGE_FAILURE);

    let summary: RunSummary = read_json(&ws.chapter_dir().join(SUMMARY_FILENAME));
    assert_eq!(summary.coverage_pct, 80.0);
    assert!(!summary.coverage_passed);

    // Lowering the threshold turns the same cached alignment into a pass
    let aligner = MockAligner::new("mock");
    let code = run_process(
        &ws.config,
        &ws.args(&["--coverage-threshold", "75", "--book", "Bereshit"]),
        &aligner,
        true,
    )
    .unwrap();
    assert_eq!(code, EXIT_SUCCESS);
    assert!(aligner.calls().is_empty());

    let dir = ws.config.paths.output_root.join("bereshit").join("001");
    let summary: RunSummary = read_json(&dir.join(SUMMARY_FILENAME));
    assert_eq!(summary.cache_status, CacheStatus::Hit);
    assert_eq!(summary.book, "Bereshit");
    assert_eq!(summary.coverage_threshold, 75.0);
    assert!(summary.coverage_passed);
}

#[test]
fn aligner_failure_is_fatal_and_writes_nothing() {
    let ws = Workspace::new(120, 240);
    let aligner = MockAligner::new("mock").with_failure("chunk-003", MockFailure::Timeout);

    let err = run_process(&ws.config, &ws.args(&["-j", "2"]), &aligner, true).unwrap_err();
    let err = err.downcast::<ChapalignError>().unwrap();
    assert!(matches!(err, ChapalignError::AlignerTimeout { ref window, .. } if window == "chunk-003"));
    assert!(!ws.chapter_dir().join(SUMMARY_FILENAME).exists());
}

#[test]
fn dry_run_does_not_align_or_write() {
    let ws = Workspace::new(120, 240);
    let aligner = MockAligner::new("mock");
    let code = run_process(&ws.config, &ws.args(&["--dry-run"]), &aligner, true).unwrap();
    assert_eq!(code, EXIT_SUCCESS);
    assert!(aligner.calls().is_empty());
    assert!(!ws.chapter_dir().exists());
}

#[test]
fn pipeline_results_survive_cache_purge_cycle() {
    let ws = Workspace::new(90, 180);
    let text = TextReference::load("Genesis", 1, &ws.text).unwrap();
    let resources = AlignerResources::from_resources_dir(
        &ws.config.paths.resources_dir,
        PronunciationVariant::Sephardi,
    );
    let store = CacheStore::open(ws.dir.path().join("store")).unwrap();
    let pipeline = AlignmentPipeline::new(PipelineConfig {
        chunk_size_sec: 30,
        chunk_overlap_sec: 3,
        max_parallel: 2,
        ..PipelineConfig::default()
    });
    let request = RunRequest {
        text: &text,
        audio: AudioSource::probe(&ws.audio).unwrap(),
        resources: &resources,
        working_dir: ws.dir.path().join("work"),
    };

    let first = pipeline
        .run(&request, &MockAligner::new("mock"), Some(&store))
        .unwrap();
    assert_eq!(first.summary.variant, "sephardi");
    assert_eq!(first.aligned_words.len(), 180);
    let key = first.cache_key.clone().unwrap();
    assert!(store.is_complete(&key).unwrap());

    // Nothing is old enough to purge yet
    assert!(store.purge_older_than(1).unwrap().is_empty());
    let far_future = std::time::SystemTime::now() + std::time::Duration::from_secs(3 * 86_400);
    assert_eq!(store.purge_older_than_at(2, far_future).unwrap(), vec![key.clone()]);
    assert!(!store.entry_exists(&key));

    let aligner = MockAligner::new("mock");
    let again = pipeline.run(&request, &aligner, Some(&store)).unwrap();
    assert_eq!(aligner.calls().len(), first.windows.len());
    assert_eq!(again.summary.cache_status, CacheStatus::Stored);
    assert_eq!(again.aligned_words, first.aligned_words);
}
