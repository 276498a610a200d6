//! Error types for chapalign.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ChapalignError {
    // Caller-correctable input errors (window bounds, purge age, ...)
    #[error("Invalid value for {field}: {message}")]
    InvalidInput { field: String, message: String },

    // Aligner errors
    #[error("Aligner unavailable: {message}")]
    AlignerUnavailable { message: String },

    #[error("Aligner failed for {window}: {message}")]
    AlignerCommandFailed { window: String, message: String },

    #[error("Aligner timed out for {window} after {timeout_secs}s")]
    AlignerTimeout { window: String, timeout_secs: u64 },

    #[error("Alignment run cancelled")]
    Cancelled,

    // Cache errors
    #[error("Cache I/O error at {path}: {source}")]
    CacheIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Cache entry {key} is corrupt: {message}")]
    CacheCorrupt { key: String, message: String },

    // Collaborator errors
    #[error("Text reference error: {message}")]
    TextReference { message: String },

    #[error("Audio error: {message}")]
    Audio { message: String },

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ChapalignError {
    /// Shorthand for [`ChapalignError::InvalidInput`].
    pub fn invalid(field: &str, message: impl Into<String>) -> Self {
        Self::InvalidInput {
            field: field.to_string(),
            message: message.into(),
        }
    }

    /// Wraps an I/O error with the cache path it happened on.
    pub fn cache_io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::CacheIo {
            path: path.into(),
            source,
        }
    }

    /// Whether this error came from the external aligner.
    pub fn is_aligner_failure(&self) -> bool {
        matches!(
            self,
            Self::AlignerUnavailable { .. }
                | Self::AlignerCommandFailed { .. }
                | Self::AlignerTimeout { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, ChapalignError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_invalid_input_display() {
        let error = ChapalignError::invalid("chunk_size_sec", "must be between 1 and 50 seconds");
        assert_eq!(
            error.to_string(),
            "Invalid value for chunk_size_sec: must be between 1 and 50 seconds"
        );
    }

    #[test]
    fn test_aligner_unavailable_display() {
        let error = ChapalignError::AlignerUnavailable {
            message: "mfa not found".to_string(),
        };
        assert_eq!(error.to_string(), "Aligner unavailable: mfa not found");
    }

    #[test]
    fn test_aligner_command_failed_display() {
        let error = ChapalignError::AlignerCommandFailed {
            window: "chunk-002".to_string(),
            message: "exit 1".to_string(),
        };
        assert_eq!(error.to_string(), "Aligner failed for chunk-002: exit 1");
    }

    #[test]
    fn test_aligner_timeout_display() {
        let error = ChapalignError::AlignerTimeout {
            window: "chunk-003".to_string(),
            timeout_secs: 30,
        };
        assert_eq!(
            error.to_string(),
            "Aligner timed out for chunk-003 after 30s"
        );
    }

    #[test]
    fn test_cache_io_keeps_source() {
        let error = ChapalignError::cache_io(
            "/tmp/cache/abc",
            io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
        );
        assert!(error.to_string().contains("/tmp/cache/abc"));
        let error_trait: &dyn std::error::Error = &error;
        assert!(error_trait.source().is_some());
    }

    #[test]
    fn test_is_aligner_failure() {
        assert!(
            ChapalignError::AlignerUnavailable {
                message: String::new()
            }
            .is_aligner_failure()
        );
        assert!(
            ChapalignError::AlignerTimeout {
                window: "chunk-001".to_string(),
                timeout_secs: 1
            }
            .is_aligner_failure()
        );
        assert!(!ChapalignError::Cancelled.is_aligner_failure());
        assert!(!ChapalignError::invalid("x", "y").is_aligner_failure());
    }

    #[test]
    fn test_from_io_error() {
        let io_error = io::Error::new(io::ErrorKind::NotFound, "file not found");
        let error: ChapalignError = io_error.into();
        assert!(error.to_string().contains("file not found"));
    }

    #[test]
    fn test_from_toml_error() {
        let toml_error = toml::from_str::<toml::Value>("invalid = toml = syntax").unwrap_err();
        let error: ChapalignError = toml_error.into();
        assert!(error.to_string().contains("Configuration error"));
    }

    #[test]
    fn test_error_is_send_and_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<ChapalignError>();
        assert_sync::<ChapalignError>();
    }
}
