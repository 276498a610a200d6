use crate::defaults;
use crate::error::{ChapalignError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub paths: PathsConfig,
    pub aligner: AlignerConfig,
    pub chunking: ChunkingConfig,
    pub coverage: CoverageConfig,
    pub logging: LoggingConfig,
}

/// Filesystem locations
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PathsConfig {
    pub cache_dir: PathBuf,
    pub output_root: PathBuf,
    /// Directory holding `dictionaries/` and `models/`
    pub resources_dir: PathBuf,
    /// When set, logs are also written to `<logs_dir>/chapalign.log`
    pub logs_dir: Option<PathBuf>,
}

/// External aligner configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AlignerConfig {
    pub executable: String,
    pub timeout_secs: u64,
    pub num_jobs: Option<usize>,
    /// Windows aligned concurrently (1 = sequential)
    pub max_parallel: usize,
}

/// Window planning and stitching configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ChunkingConfig {
    pub chunk_size_sec: u32,
    pub chunk_overlap_sec: u32,
    pub overlap_tolerance_ms: u64,
}

/// Coverage gate configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CoverageConfig {
    pub threshold: f64,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    pub format: LogFormat,
    /// Default filter directive when `RUST_LOG` is unset
    pub level: String,
}

/// Log output format
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = ChapalignError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "text" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            other => Err(ChapalignError::invalid(
                "logging.format",
                format!("unknown log format '{other}' (expected text or json)"),
            )),
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        let data_dir = dirs::data_dir().unwrap_or_else(|| PathBuf::from(".local/share"));
        Self {
            cache_dir: dirs::cache_dir()
                .unwrap_or_else(|| PathBuf::from(".cache"))
                .join("chapalign"),
            output_root: PathBuf::from("output"),
            resources_dir: data_dir.join("chapalign").join("resources"),
            logs_dir: None,
        }
    }
}

impl Default for AlignerConfig {
    fn default() -> Self {
        Self {
            executable: defaults::MFA_EXECUTABLE.to_string(),
            timeout_secs: defaults::ALIGNER_TIMEOUT_SECS,
            num_jobs: None,
            max_parallel: defaults::MAX_PARALLEL,
        }
    }
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size_sec: defaults::CHUNK_SIZE_SEC,
            chunk_overlap_sec: defaults::CHUNK_OVERLAP_SEC,
            overlap_tolerance_ms: defaults::OVERLAP_TOLERANCE_MS,
        }
    }
}

impl Default for CoverageConfig {
    fn default() -> Self {
        Self {
            threshold: defaults::COVERAGE_THRESHOLD,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::Text,
            level: defaults::LOG_LEVEL.to_string(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Returns an error if the file is missing or contains invalid TOML.
    /// Missing fields will use default values.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration from a file or return defaults if file doesn't exist
    ///
    /// Only returns defaults if the file is missing.
    /// Returns errors for invalid TOML.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        match Self::load(path) {
            Err(ChapalignError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                Ok(Self::default())
            }
            other => other,
        }
    }

    /// Apply environment variable overrides
    ///
    /// Supported environment variables:
    /// - CHAPALIGN_CACHE_DIR → paths.cache_dir
    /// - CHAPALIGN_OUTPUT_ROOT → paths.output_root
    /// - CHAPALIGN_RESOURCES_DIR → paths.resources_dir
    /// - CHAPALIGN_LOG_DIR → paths.logs_dir
    /// - CHAPALIGN_LOG_FORMAT → logging.format (invalid values are ignored)
    /// - MFA_BIN → aligner.executable
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(dir) = non_empty_env("CHAPALIGN_CACHE_DIR") {
            self.paths.cache_dir = PathBuf::from(dir);
        }

        if let Some(dir) = non_empty_env("CHAPALIGN_OUTPUT_ROOT") {
            self.paths.output_root = PathBuf::from(dir);
        }

        if let Some(dir) = non_empty_env("CHAPALIGN_RESOURCES_DIR") {
            self.paths.resources_dir = PathBuf::from(dir);
        }

        if let Some(dir) = non_empty_env("CHAPALIGN_LOG_DIR") {
            self.paths.logs_dir = Some(PathBuf::from(dir));
        }

        if let Some(format) = non_empty_env("CHAPALIGN_LOG_FORMAT") {
            match format.parse() {
                Ok(format) => self.logging.format = format,
                // Runs before logging is initialized
                Err(e) => eprintln!("Warning: ignoring CHAPALIGN_LOG_FORMAT: {e}"),
            }
        }

        if let Some(bin) = non_empty_env("MFA_BIN") {
            self.aligner.executable = bin;
        }

        self
    }

    /// Check cross-field constraints that TOML typing cannot express.
    pub fn validate(&self) -> Result<()> {
        let chunking = &self.chunking;
        if chunking.chunk_size_sec == 0 || chunking.chunk_size_sec > defaults::MAX_CHUNK_SECONDS {
            return Err(ChapalignError::invalid(
                "chunking.chunk_size_sec",
                format!("must be between 1 and {}", defaults::MAX_CHUNK_SECONDS),
            ));
        }
        if chunking.chunk_overlap_sec > defaults::MAX_OVERLAP_SECONDS
            || chunking.chunk_overlap_sec >= chunking.chunk_size_sec
        {
            return Err(ChapalignError::invalid(
                "chunking.chunk_overlap_sec",
                format!(
                    "must be at most {} and smaller than chunk_size_sec",
                    defaults::MAX_OVERLAP_SECONDS
                ),
            ));
        }
        if !(0.0..=100.0).contains(&self.coverage.threshold) {
            return Err(ChapalignError::invalid(
                "coverage.threshold",
                "must be between 0 and 100",
            ));
        }
        if self.aligner.max_parallel == 0 {
            return Err(ChapalignError::invalid(
                "aligner.max_parallel",
                "must be at least 1",
            ));
        }
        Ok(())
    }

    /// Get the default configuration file path
    ///
    /// Returns ~/.config/chapalign/config.toml on Linux
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from(".config"))
            .join("chapalign")
            .join("config.toml")
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::Mutex;
    use tempfile::NamedTempFile;

    // Mutex to serialize tests that modify environment variables
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    const ENV_KEYS: [&str; 6] = [
        "CHAPALIGN_CACHE_DIR",
        "CHAPALIGN_OUTPUT_ROOT",
        "CHAPALIGN_RESOURCES_DIR",
        "CHAPALIGN_LOG_DIR",
        "CHAPALIGN_LOG_FORMAT",
        "MFA_BIN",
    ];

    // SAFETY: These helpers are only used in tests with ENV_LOCK held,
    // ensuring no concurrent access to environment variables.
    fn set_env(key: &str, value: &str) {
        unsafe { std::env::set_var(key, value) }
    }

    fn clear_chapalign_env() {
        for key in ENV_KEYS {
            unsafe { std::env::remove_var(key) }
        }
    }

    fn write_config(contents: &str) -> NamedTempFile {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(contents.as_bytes()).unwrap();
        temp_file
    }

    #[test]
    fn test_default_config_has_correct_values() {
        let config = Config::default();

        assert_eq!(config.aligner.executable, "mfa");
        assert_eq!(config.aligner.timeout_secs, 3600);
        assert_eq!(config.aligner.num_jobs, None);
        assert_eq!(config.aligner.max_parallel, 1);

        assert_eq!(config.chunking.chunk_size_sec, 50);
        assert_eq!(config.chunking.chunk_overlap_sec, 5);
        assert_eq!(config.chunking.overlap_tolerance_ms, 750);

        assert_eq!(config.coverage.threshold, 95.0);
        assert_eq!(config.logging.format, LogFormat::Text);
        assert_eq!(config.paths.output_root, PathBuf::from("output"));
        assert!(config.paths.cache_dir.ends_with("chapalign"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_from_toml_file() {
        let file = write_config(
            r#"
            [paths]
            cache_dir = "/var/cache/chapalign"
            output_root = "/srv/alignments"
            logs_dir = "/var/log/chapalign"

            [aligner]
            executable = "/opt/mfa/bin/mfa"
            timeout_secs = 600
            num_jobs = 4
            max_parallel = 3

            [chunking]
            chunk_size_sec = 40
            chunk_overlap_sec = 3
            overlap_tolerance_ms = 500

            [coverage]
            threshold = 90.0

            [logging]
            format = "json"
            level = "debug"
        "#,
        );

        let config = Config::load(file.path()).unwrap();

        assert_eq!(config.paths.cache_dir, PathBuf::from("/var/cache/chapalign"));
        assert_eq!(config.paths.output_root, PathBuf::from("/srv/alignments"));
        assert_eq!(config.paths.logs_dir, Some(PathBuf::from("/var/log/chapalign")));
        assert_eq!(config.aligner.executable, "/opt/mfa/bin/mfa");
        assert_eq!(config.aligner.timeout_secs, 600);
        assert_eq!(config.aligner.num_jobs, Some(4));
        assert_eq!(config.aligner.max_parallel, 3);
        assert_eq!(config.chunking.chunk_size_sec, 40);
        assert_eq!(config.chunking.chunk_overlap_sec, 3);
        assert_eq!(config.chunking.overlap_tolerance_ms, 500);
        assert_eq!(config.coverage.threshold, 90.0);
        assert_eq!(config.logging.format, LogFormat::Json);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_load_partial_config_uses_defaults() {
        let file = write_config(
            r#"
            [chunking]
            chunk_size_sec = 30
        "#,
        );

        let config = Config::load(file.path()).unwrap();

        assert_eq!(config.chunking.chunk_size_sec, 30);
        assert_eq!(config.chunking.chunk_overlap_sec, 5);
        assert_eq!(config.aligner, AlignerConfig::default());
        assert_eq!(config.coverage, CoverageConfig::default());
    }

    #[test]
    fn test_invalid_toml_returns_error() {
        let file = write_config("[chunking\nchunk_size_sec = ");
        assert!(matches!(
            Config::load(file.path()),
            Err(ChapalignError::Config(_))
        ));
    }

    #[test]
    fn test_load_or_default_returns_default_for_missing_file() {
        let missing_path = Path::new("/tmp/nonexistent_chapalign_config_12345.toml");
        let config = Config::load_or_default(missing_path).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_load_or_default_propagates_invalid_toml() {
        let file = write_config("[coverage]\nthreshold = \"high\"");
        assert!(Config::load_or_default(file.path()).is_err());
    }

    #[test]
    fn test_env_overrides() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_chapalign_env();

        set_env("CHAPALIGN_CACHE_DIR", "/tmp/chapalign-cache");
        set_env("CHAPALIGN_LOG_DIR", "/tmp/chapalign-logs");
        set_env("CHAPALIGN_LOG_FORMAT", "json");
        set_env("MFA_BIN", "/usr/local/bin/mfa");
        let config = Config::default().with_env_overrides();

        assert_eq!(config.paths.cache_dir, PathBuf::from("/tmp/chapalign-cache"));
        assert_eq!(config.paths.logs_dir, Some(PathBuf::from("/tmp/chapalign-logs")));
        assert_eq!(config.logging.format, LogFormat::Json);
        assert_eq!(config.aligner.executable, "/usr/local/bin/mfa");
        assert_eq!(config.paths.output_root, PathBuf::from("output"));

        clear_chapalign_env();
    }

    #[test]
    fn test_env_override_empty_and_invalid_values_ignored() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_chapalign_env();

        set_env("MFA_BIN", "");
        set_env("CHAPALIGN_LOG_FORMAT", "xml");
        let config = Config::default().with_env_overrides();

        assert_eq!(config.aligner.executable, "mfa");
        assert_eq!(config.logging.format, LogFormat::Text);

        clear_chapalign_env();
    }

    #[test]
    fn test_validate_rejects_bad_chunking() {
        let mut config = Config::default();
        config.chunking.chunk_size_sec = 60;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.chunking.chunk_size_sec = 4;
        config.chunking.chunk_overlap_sec = 4;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.coverage.threshold = 101.0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.aligner.max_parallel = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_default_path_is_xdg_compliant() {
        let path = Config::default_path();
        let path_str = path.to_string_lossy();

        assert!(path_str.contains("chapalign"));
        assert!(path_str.ends_with("config.toml"));
    }
}
