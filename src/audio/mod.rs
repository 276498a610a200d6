//! Source recording metadata and window slice locators.

pub mod wav;

use crate::error::{ChapalignError, Result};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

/// The recording being aligned, as seen by the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioSource {
    pub path: PathBuf,
    /// SHA-256 of the file contents, lowercase hex.
    pub fingerprint: String,
    pub duration_ms: u64,
}

impl AudioSource {
    pub fn new(path: impl Into<PathBuf>, fingerprint: &str, duration_ms: u64) -> Self {
        Self {
            path: path.into(),
            fingerprint: fingerprint.to_string(),
            duration_ms,
        }
    }

    /// Fingerprints a WAV file and reads its duration from the header.
    pub fn probe(path: &Path) -> Result<Self> {
        let fingerprint = fingerprint_file(path)?;
        let duration_ms = wav::duration_ms(path)?;
        Ok(Self::new(path, &fingerprint, duration_ms))
    }

    /// Locator for the part of this recording covered by `[start_ms, end_ms)`.
    pub fn slice(&self, start_ms: u64, end_ms: u64) -> AudioSlice {
        AudioSlice {
            source: self.path.clone(),
            start_ms,
            end_ms,
        }
    }
}

/// Where a window's audio lives: a time range of a source file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioSlice {
    pub source: PathBuf,
    pub start_ms: u64,
    pub end_ms: u64,
}

impl AudioSlice {
    /// Materializes the slice as a standalone WAV file.
    pub fn write_to(&self, dest: &Path) -> Result<()> {
        wav::write_slice(&self.source, self.start_ms, self.end_ms, dest)
    }
}

/// SHA-256 of a file's contents, streamed in 64 KiB blocks.
pub fn fingerprint_file(path: &Path) -> Result<String> {
    let mut file = File::open(path).map_err(|e| ChapalignError::Audio {
        message: format!("failed to open {}: {e}", path.display()),
    })?;
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; 64 * 1024];
    loop {
        let read = file.read(&mut buffer)?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_probe_reads_duration_and_fingerprint() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("genesis-1.wav");
        wav::write_mono_i16(&path, 16000, &vec![0i16; 24000]).unwrap();

        let source = AudioSource::probe(&path).unwrap();
        assert_eq!(source.duration_ms, 1500);
        assert_eq!(source.fingerprint.len(), 64);
        assert_eq!(source.fingerprint, fingerprint_file(&path).unwrap());
    }

    #[test]
    fn test_fingerprint_changes_with_content() {
        let dir = TempDir::new().unwrap();
        let a = dir.path().join("a.wav");
        let b = dir.path().join("b.wav");
        wav::write_mono_i16(&a, 16000, &[0, 1, 2]).unwrap();
        wav::write_mono_i16(&b, 16000, &[0, 1, 3]).unwrap();
        assert_ne!(fingerprint_file(&a).unwrap(), fingerprint_file(&b).unwrap());
    }

    #[test]
    fn test_slice_locator() {
        let source = AudioSource::new("/audio/genesis-1.wav", "abc", 120_000);
        let slice = source.slice(35_000, 75_000);
        assert_eq!(slice.source, PathBuf::from("/audio/genesis-1.wav"));
        assert_eq!((slice.start_ms, slice.end_ms), (35_000, 75_000));
    }
}
