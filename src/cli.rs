//! Command-line interface for chapalign
//!
//! Provides argument parsing using clap derive macros.

use crate::pronunciation::PronunciationVariant;
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};

/// Align chapter recordings to their canonical text
#[derive(Parser, Debug)]
#[command(
    name = "chapalign",
    version,
    about = "Align chapter recordings to their canonical text"
)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Path to configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Suppress the summary output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Verbose logging (-v: debug, -vv: trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Align one chapter recording
    Process(ProcessArgs),

    /// Manage the alignment cache
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },

    /// Check the aligner, resources and cache directory
    Check,
}

/// Arguments for `chapalign process`
#[derive(Args, Debug)]
pub struct ProcessArgs {
    /// Chapter recording (WAV)
    #[arg(value_name = "AUDIO")]
    pub audio: PathBuf,

    /// Reference text (one verse per line)
    #[arg(long, value_name = "FILE")]
    pub text: PathBuf,

    /// Book name (default: inferred from `<book>-<chapter>.wav`)
    #[arg(long)]
    pub book: Option<String>,

    /// Chapter number (default: inferred from `<book>-<chapter>.wav`)
    #[arg(long)]
    pub chapter: Option<u32>,

    /// Pronunciation variant (modern, ashkenazi, sephardi)
    #[arg(long, default_value = "modern")]
    pub variant: PronunciationVariant,

    /// Output root (default: paths.output_root from config)
    #[arg(long, short = 'o', value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Window size in seconds
    #[arg(long, value_name = "SECONDS")]
    pub chunk_size: Option<u32>,

    /// Overlap between consecutive windows in seconds
    #[arg(long, value_name = "SECONDS")]
    pub chunk_overlap: Option<u32>,

    /// Coverage percentage required to exit successfully
    #[arg(long, value_name = "PCT")]
    pub coverage_threshold: Option<f64>,

    /// Windows aligned concurrently
    #[arg(long, short = 'j', value_name = "N")]
    pub jobs: Option<usize>,

    /// Pronunciation dictionary (default: from the resources directory)
    #[arg(long, value_name = "FILE")]
    pub dictionary: Option<PathBuf>,

    /// Acoustic model (default: from the resources directory)
    #[arg(long, value_name = "FILE")]
    pub acoustic_model: Option<PathBuf>,

    /// Per-window aligner timeout. Examples: 600, 10m, 1h
    #[arg(long, value_name = "DURATION", value_parser = parse_timeout_secs)]
    pub aligner_timeout: Option<u64>,

    /// Neither read nor write the cache
    #[arg(long)]
    pub no_cache: bool,

    /// Print the window plan and cache key without aligning
    #[arg(long)]
    pub dry_run: bool,
}

/// Cache management actions
#[derive(Subcommand, Debug)]
pub enum CacheAction {
    /// Remove entries older than N days
    Purge {
        #[arg(long, value_name = "DAYS")]
        older_than_days: u32,
    },
    /// Print the cache key a run would use
    Key {
        /// Chapter recording (WAV)
        #[arg(value_name = "AUDIO")]
        audio: PathBuf,

        /// Reference text (one verse per line)
        #[arg(long, value_name = "FILE")]
        text: PathBuf,

        #[arg(long, default_value = "modern")]
        variant: PronunciationVariant,

        #[arg(long, value_name = "SECONDS")]
        chunk_size: Option<u32>,

        #[arg(long, value_name = "SECONDS")]
        chunk_overlap: Option<u32>,
    },
}

/// Parse a timeout string into seconds.
///
/// Supports any duration format accepted by `humantime`: bare numbers (seconds),
/// single-unit (`30s`, `5m`, `2h`), and compound (`1h30m`).
fn parse_timeout_secs(s: &str) -> Result<u64, String> {
    let s = s.trim();
    let secs = match s.parse::<u64>() {
        Ok(secs) => secs,
        Err(_) => humantime::parse_duration(s)
            .map(|d| d.as_secs())
            .map_err(|e| e.to_string())?,
    };
    if secs == 0 {
        return Err("timeout must be at least one second".to_string());
    }
    Ok(secs)
}

/// Book and chapter from a `<book>-<chapter>.<ext>` file name.
///
/// The book part may itself contain dashes (`song-of-songs-2.wav`).
pub fn infer_reference_from_filename(path: &Path) -> Option<(String, u32)> {
    let stem = path.file_stem()?.to_str()?;
    let (book, chapter) = stem.rsplit_once(['-', '_'])?;
    let chapter = chapter.parse::<u32>().ok().filter(|&c| c > 0)?;
    if book.is_empty() {
        return None;
    }
    Some((book.to_string(), chapter))
}

/// Lowercase, dash-separated form of a book name for directory names.
pub fn book_slug(book: &str) -> String {
    book.split(|c: char| !c.is_alphanumeric())
        .filter(|part| !part.is_empty())
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join("-")
}

/// `<root>/<book-slug>/<chapter:03>`
pub fn chapter_output_dir(root: &Path, book: &str, chapter: u32) -> PathBuf {
    root.join(book_slug(book)).join(format!("{chapter:03}"))
}
