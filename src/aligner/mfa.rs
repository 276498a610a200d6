//! Montreal Forced Aligner backend.
//!
//! Each window becomes a one-file MFA corpus in the window's scratch directory:
//! the audio slice as `<id>.wav` and the chapter transcript as `<id>.lab`.
//! MFA is run with `--output_format json` and the `words` tier of its output is
//! converted to window-relative [`WordSegment`]s. MFA reports no per-word
//! confidence, so every word carries 0.0.

use crate::aligner::backend::{AlignRequest, CancelFlag, ForcedAligner};
use crate::alignment::types::WordSegment;
use crate::defaults;
use crate::error::{ChapalignError, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::OnceLock;
use std::thread;
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Configuration for the MFA backend.
#[derive(Debug, Clone, PartialEq)]
pub struct MfaConfig {
    /// Executable name (looked up on `PATH`) or path.
    pub executable: String,
    /// Per-invocation timeout.
    pub timeout: Duration,
    /// Value for `-j`; `None` leaves MFA's default.
    pub num_jobs: Option<usize>,
}

impl Default for MfaConfig {
    fn default() -> Self {
        Self {
            executable: defaults::MFA_EXECUTABLE.to_string(),
            timeout: Duration::from_secs(defaults::ALIGNER_TIMEOUT_SECS),
            num_jobs: None,
        }
    }
}

/// Output of a finished MFA command.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub command: Vec<String>,
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
}

/// How a supervised command ended without producing output.
#[derive(Debug)]
enum RunFailure {
    TimedOut,
    Cancelled,
    Spawn(std::io::Error),
    Io(std::io::Error),
}

/// Forced aligner that shells out to MFA.
#[derive(Debug)]
pub struct MfaAligner {
    config: MfaConfig,
    resolved: OnceLock<PathBuf>,
}

impl MfaAligner {
    pub fn new(config: MfaConfig) -> Self {
        Self {
            config,
            resolved: OnceLock::new(),
        }
    }

    pub fn config(&self) -> &MfaConfig {
        &self.config
    }

    /// Locates the executable, remembering the result.
    pub fn resolve_executable(&self) -> Result<PathBuf> {
        if let Some(path) = self.resolved.get() {
            return Ok(path.clone());
        }
        let path = find_executable(&self.config.executable).ok_or_else(|| {
            ChapalignError::AlignerUnavailable {
                message: format!(
                    "Montreal Forced Aligner executable '{}' not found. Set MFA_BIN or install MFA.",
                    self.config.executable
                ),
            }
        })?;
        Ok(self.resolved.get_or_init(|| path).clone())
    }

    /// Runs `mfa version` to verify the backend is callable.
    pub fn check_health(&self) -> Result<String> {
        let output = self.run(&["version".to_string()], "health-check", &CancelFlag::new())?;
        Ok(output.stdout.trim().to_string())
    }

    fn align_args(&self, corpus: &Path, request: &AlignRequest<'_>, output: &Path) -> Vec<String> {
        let mut args = vec![
            "align".to_string(),
            corpus.display().to_string(),
            request.resources.dictionary.display().to_string(),
            request.resources.acoustic_model.display().to_string(),
            output.display().to_string(),
            "--clean".to_string(),
            "--overwrite".to_string(),
            "--output_format".to_string(),
            "json".to_string(),
        ];
        if let Some(jobs) = self.config.num_jobs {
            args.push("-j".to_string());
            args.push(jobs.to_string());
        }
        args
    }

    fn run(&self, args: &[String], window: &str, cancel: &CancelFlag) -> Result<CommandOutput> {
        let executable = self.resolve_executable()?;
        let mut command = vec![executable.display().to_string()];
        command.extend(args.iter().cloned());

        tracing::debug!(window, command = %command.join(" "), "running aligner");
        let result = run_supervised(
            Command::new(&executable).args(args),
            self.config.timeout,
            cancel,
        );
        let (status, stdout, stderr) = match result {
            Ok(parts) => parts,
            Err(RunFailure::TimedOut) => {
                return Err(ChapalignError::AlignerTimeout {
                    window: window.to_string(),
                    timeout_secs: self.config.timeout.as_secs(),
                });
            }
            Err(RunFailure::Cancelled) => return Err(ChapalignError::Cancelled),
            Err(RunFailure::Spawn(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ChapalignError::AlignerUnavailable {
                    message: format!("{}: {e}", executable.display()),
                });
            }
            Err(RunFailure::Spawn(e)) | Err(RunFailure::Io(e)) => {
                return Err(ChapalignError::AlignerCommandFailed {
                    window: window.to_string(),
                    message: e.to_string(),
                });
            }
        };

        if !status.success() {
            return Err(ChapalignError::AlignerCommandFailed {
                window: window.to_string(),
                message: format!(
                    "MFA command failed ({}): {}",
                    status,
                    stderr.trim()
                ),
            });
        }

        Ok(CommandOutput {
            command,
            status,
            stdout,
            stderr,
        })
    }
}

impl ForcedAligner for MfaAligner {
    fn align(&self, request: &AlignRequest<'_>) -> Result<Vec<WordSegment>> {
        let id = request.window.id.as_str();
        let corpus = request.scratch_dir.join("corpus");
        let output = request.scratch_dir.join("output");
        fs::create_dir_all(&corpus)?;
        fs::create_dir_all(&output)?;

        request.audio.write_to(&corpus.join(format!("{id}.wav")))?;
        fs::write(corpus.join(format!("{id}.lab")), request.text.transcript())?;

        let args = self.align_args(&corpus, request, &output);
        self.run(&args, id, request.cancel)?;

        let result_path = output.join(format!("{id}.json"));
        let contents = fs::read_to_string(&result_path).map_err(|e| {
            ChapalignError::AlignerCommandFailed {
                window: id.to_string(),
                message: format!("missing MFA output {}: {e}", result_path.display()),
            }
        })?;
        parse_words(&contents).map_err(|message| ChapalignError::AlignerCommandFailed {
            window: id.to_string(),
            message,
        })
    }

    fn name(&self) -> &str {
        "mfa"
    }
}

#[derive(Debug, Deserialize)]
struct MfaDocument {
    tiers: HashMap<String, MfaTier>,
}

#[derive(Debug, Deserialize)]
struct MfaTier {
    entries: Vec<(f64, f64, String)>,
}

/// Converts MFA's JSON output into window-relative words.
fn parse_words(contents: &str) -> std::result::Result<Vec<WordSegment>, String> {
    let document: MfaDocument =
        serde_json::from_str(contents).map_err(|e| format!("unreadable MFA output: {e}"))?;
    let tier = document
        .tiers
        .get("words")
        .ok_or_else(|| "MFA output has no words tier".to_string())?;

    Ok(tier
        .entries
        .iter()
        .filter(|(_, _, text)| !text.trim().is_empty())
        .map(|(start, end, text)| WordSegment {
            text: text.clone(),
            start_ms: seconds_to_ms(*start),
            end_ms: seconds_to_ms(*end),
            confidence: 0.0,
        })
        .collect())
}

fn seconds_to_ms(seconds: f64) -> u64 {
    (seconds.max(0.0) * 1000.0).round() as u64
}

/// Finds `name` as a file path or on `PATH`.
fn find_executable(name: &str) -> Option<PathBuf> {
    let candidate = Path::new(name);
    if candidate.components().count() > 1 || candidate.is_absolute() {
        return candidate.is_file().then(|| candidate.to_path_buf());
    }
    let paths = std::env::var_os("PATH")?;
    std::env::split_paths(&paths)
        .map(|dir| dir.join(name))
        .find(|path| path.is_file())
}

/// Runs a command to completion, killing it on timeout or cancellation.
///
/// Stdout and stderr are drained on helper threads so a chatty child cannot
/// block on a full pipe.
fn run_supervised(
    command: &mut Command,
    timeout: Duration,
    cancel: &CancelFlag,
) -> std::result::Result<(ExitStatus, String, String), RunFailure> {
    let mut child = command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(RunFailure::Spawn)?;

    let stdout = drain(child.stdout.take());
    let stderr = drain(child.stderr.take());
    let deadline = Instant::now() + timeout;

    let status = loop {
        match child.try_wait().map_err(RunFailure::Io)? {
            Some(status) => break status,
            None if cancel.is_cancelled() => {
                kill(&mut child);
                return Err(RunFailure::Cancelled);
            }
            None if Instant::now() >= deadline => {
                kill(&mut child);
                return Err(RunFailure::TimedOut);
            }
            None => thread::sleep(POLL_INTERVAL),
        }
    };

    let stdout = stdout.join().unwrap_or_default();
    let stderr = stderr.join().unwrap_or_default();
    Ok((status, stdout, stderr))
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> thread::JoinHandle<String> {
    thread::spawn(move || {
        let mut buffer = String::new();
        if let Some(mut pipe) = pipe
            && let Err(e) = pipe.read_to_string(&mut buffer)
        {
            tracing::debug!(error = %e, "failed to read aligner output");
        }
        buffer
    })
}

fn kill(child: &mut Child) {
    if let Err(e) = child.kill() {
        tracing::warn!(error = %e, "failed to kill aligner process");
    }
    if let Err(e) = child.wait() {
        tracing::warn!(error = %e, "failed to reap aligner process");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MFA_JSON: &str = r#"{
        "start": 0.0,
        "end": 4.2,
        "tiers": {
            "words": {
                "type": "interval_tier",
                "entries": [[0.05, 0.41, "bereshit"], [0.41, 0.6, ""], [0.6, 0.93, "bara"]]
            },
            "phones": {
                "type": "interval_tier",
                "entries": [[0.05, 0.1, "b"]]
            }
        }
    }"#;

    #[test]
    fn test_parse_words_skips_silence() {
        let words = parse_words(MFA_JSON).unwrap();
        assert_eq!(
            words,
            vec![
                WordSegment::new("bereshit", 50, 410, 0.0),
                WordSegment::new("bara", 600, 930, 0.0),
            ]
        );
    }

    #[test]
    fn test_parse_words_requires_words_tier() {
        let err = parse_words(r#"{"tiers": {"phones": {"entries": []}}}"#).unwrap_err();
        assert!(err.contains("no words tier"));
        assert!(parse_words("not json").is_err());
    }

    #[test]
    fn test_missing_executable_is_unavailable() {
        let aligner = MfaAligner::new(MfaConfig {
            executable: "chapalign-definitely-missing-mfa".to_string(),
            ..MfaConfig::default()
        });
        assert!(matches!(
            aligner.check_health(),
            Err(ChapalignError::AlignerUnavailable { .. })
        ));
    }

    #[test]
    fn test_missing_executable_path_is_unavailable() {
        let aligner = MfaAligner::new(MfaConfig {
            executable: "/nonexistent/bin/mfa".to_string(),
            ..MfaConfig::default()
        });
        assert!(matches!(
            aligner.resolve_executable(),
            Err(ChapalignError::AlignerUnavailable { .. })
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_nonzero_exit_is_command_failure() {
        let aligner = MfaAligner::new(MfaConfig {
            executable: "false".to_string(),
            ..MfaConfig::default()
        });
        if aligner.resolve_executable().is_err() {
            return;
        }
        assert!(matches!(
            aligner.check_health(),
            Err(ChapalignError::AlignerCommandFailed { .. })
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_slow_command_times_out() {
        let aligner = MfaAligner::new(MfaConfig {
            executable: "sleep".to_string(),
            timeout: Duration::from_millis(100),
            ..MfaConfig::default()
        });
        if aligner.resolve_executable().is_err() {
            return;
        }
        let started = Instant::now();
        let result = aligner.run(&["5".to_string()], "chunk-001", &CancelFlag::new());
        assert!(matches!(
            result,
            Err(ChapalignError::AlignerTimeout { ref window, .. }) if window == "chunk-001"
        ));
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[cfg(unix)]
    #[test]
    fn test_cancelled_command_is_killed() {
        let aligner = MfaAligner::new(MfaConfig {
            executable: "sleep".to_string(),
            ..MfaConfig::default()
        });
        if aligner.resolve_executable().is_err() {
            return;
        }
        let cancel = CancelFlag::new();
        cancel.cancel();
        let result = aligner.run(&["5".to_string()], "chunk-001", &cancel);
        assert!(matches!(result, Err(ChapalignError::Cancelled)));
    }

    #[test]
    fn test_seconds_to_ms_rounds() {
        assert_eq!(seconds_to_ms(0.0016), 2);
        assert_eq!(seconds_to_ms(1.2344), 1234);
        assert_eq!(seconds_to_ms(-0.1), 0);
    }
}
