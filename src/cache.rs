//! Content-addressed cache for alignment runs.
//!
//! Each entry lives in `root/<key>/`, where `key` is a SHA-256 digest of the
//! run's semantic inputs (audio fingerprint, text version, pronunciation
//! variant, chunking parameters, plus any extra dimensions). An entry holds a
//! `metadata.json` document and arbitrary named artifacts.
//!
//! A directory on its own means nothing: an entry is only complete once its
//! metadata has been written with `"complete": true`. Metadata is written to a
//! temporary file and renamed into place, so readers never observe a partial
//! document. Writers that want exclusive access take a [`CacheClaim`] first.
//! A claim older than [`STALE_CLAIM_SECS`] is considered abandoned and may be
//! taken over; the takeover itself is not atomic across processes.

use crate::defaults::{METADATA_FILENAME, STALE_CLAIM_SECS};
use crate::error::{ChapalignError, Result};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

const CLAIM_FILENAME: &str = ".claim";
const SECS_PER_DAY: u64 = 24 * 60 * 60;

/// The dimensions a cache key is derived from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheKeyInputs {
    /// Checksum of the source audio (case-insensitive).
    pub audio_fingerprint: String,
    /// Version string of the reference text.
    pub text_version: String,
    /// Pronunciation variant name.
    pub pronunciation_variant: String,
    pub chunk_size_sec: u32,
    pub chunk_overlap_sec: u32,
    /// Open-ended extra dimensions; iteration order never affects the key.
    pub extra: BTreeMap<String, String>,
}

impl CacheKeyInputs {
    pub fn new(
        audio_fingerprint: &str,
        text_version: &str,
        pronunciation_variant: &str,
        chunk_size_sec: u32,
        chunk_overlap_sec: u32,
    ) -> Self {
        Self {
            audio_fingerprint: audio_fingerprint.to_string(),
            text_version: text_version.to_string(),
            pronunciation_variant: pronunciation_variant.to_string(),
            chunk_size_sec,
            chunk_overlap_sec,
            extra: BTreeMap::new(),
        }
    }

    /// Adds an extra dimension.
    pub fn with_extra(mut self, name: &str, value: impl ToString) -> Self {
        self.extra.insert(name.to_string(), value.to_string());
        self
    }
}

/// Derives the cache key for `inputs`: lowercase hex SHA-256, 64 characters.
pub fn build_key(inputs: &CacheKeyInputs) -> String {
    let mut parts = vec![
        inputs.audio_fingerprint.to_lowercase(),
        inputs.text_version.clone(),
        inputs.pronunciation_variant.clone(),
        inputs.chunk_size_sec.to_string(),
        inputs.chunk_overlap_sec.to_string(),
    ];
    // BTreeMap iterates in name order
    for (name, value) in &inputs.extra {
        parts.push(format!("{name}={value}"));
    }

    let mut hasher = Sha256::new();
    hasher.update(parts.join("|").as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Handle to one entry directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub key: String,
    pub path: PathBuf,
    pub metadata_path: PathBuf,
}

impl CacheEntry {
    fn new(root: &Path, key: &str) -> Self {
        let path = root.join(key);
        let metadata_path = path.join(METADATA_FILENAME);
        Self {
            key: key.to_string(),
            path,
            metadata_path,
        }
    }

    /// Path of a named artifact inside this entry.
    pub fn artifact_path(&self, name: &str) -> PathBuf {
        self.path.join(name)
    }
}

/// Exclusive right to complete one cache entry. Released on drop.
#[derive(Debug)]
pub struct CacheClaim {
    key: String,
    path: PathBuf,
}

impl CacheClaim {
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl Drop for CacheClaim {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path)
            && e.kind() != ErrorKind::NotFound
        {
            tracing::warn!(key = %self.key, error = %e, "failed to release cache claim");
        }
    }
}

/// Filesystem-backed cache store.
#[derive(Debug, Clone)]
pub struct CacheStore {
    root: PathBuf,
}

impl CacheStore {
    /// Opens (creating if needed) a store rooted at `root`.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|e| ChapalignError::cache_io(&root, e))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Creates the entry directory if missing and returns its handle.
    pub fn ensure_entry(&self, key: &str) -> Result<CacheEntry> {
        validate_key(key)?;
        let entry = CacheEntry::new(&self.root, key);
        fs::create_dir_all(&entry.path).map_err(|e| ChapalignError::cache_io(&entry.path, e))?;
        Ok(entry)
    }

    /// Whether the entry directory exists. Says nothing about completeness.
    pub fn entry_exists(&self, key: &str) -> bool {
        validate_key(key).is_ok() && self.root.join(key).is_dir()
    }

    /// Resolves an artifact path, creating the entry directory when `ensure` is set.
    pub fn artifact_path(&self, key: &str, name: &str, ensure: bool) -> Result<PathBuf> {
        if ensure {
            return Ok(self.ensure_entry(key)?.artifact_path(name));
        }
        validate_key(key)?;
        Ok(CacheEntry::new(&self.root, key).artifact_path(name))
    }

    /// Reads the entry's metadata document; `None` when there is none.
    pub fn read_metadata(&self, key: &str) -> Result<Option<Value>> {
        validate_key(key)?;
        let path = CacheEntry::new(&self.root, key).metadata_path;
        let contents = match fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(ChapalignError::cache_io(&path, e)),
        };
        let value = serde_json::from_str(&contents).map_err(|e| ChapalignError::CacheCorrupt {
            key: key.to_string(),
            message: format!("unreadable metadata: {e}"),
        })?;
        Ok(Some(value))
    }

    /// Writes the entry's metadata document, replacing any previous one atomically.
    pub fn write_metadata(&self, key: &str, payload: &Value) -> Result<PathBuf> {
        let entry = self.ensure_entry(key)?;
        let contents = serde_json::to_string_pretty(payload)?;
        let tmp_path = entry.path.join(format!("{METADATA_FILENAME}.tmp"));
        write_file(&tmp_path, contents.as_bytes())?;
        fs::rename(&tmp_path, &entry.metadata_path)
            .map_err(|e| ChapalignError::cache_io(&entry.metadata_path, e))?;
        Ok(entry.metadata_path)
    }

    /// Whether the entry has metadata marked `"complete": true`.
    pub fn is_complete(&self, key: &str) -> Result<bool> {
        Ok(self
            .read_metadata(key)?
            .and_then(|meta| meta.get("complete").and_then(Value::as_bool))
            .unwrap_or(false))
    }

    /// Tries to take the exclusive writer claim for `key`.
    ///
    /// Returns `None` when another writer already holds it.
    pub fn claim(&self, key: &str) -> Result<Option<CacheClaim>> {
        self.claim_at(key, SystemTime::now())
    }

    /// [`claim`](Self::claim) against an explicit clock reading.
    ///
    /// An existing claim last touched more than [`STALE_CLAIM_SECS`] before
    /// `now` is removed and taken over.
    pub fn claim_at(&self, key: &str, now: SystemTime) -> Result<Option<CacheClaim>> {
        let entry = self.ensure_entry(key)?;
        let path = entry.path.join(CLAIM_FILENAME);
        if let Some(claim) = create_claim(key, &path)? {
            return Ok(Some(claim));
        }

        let modified = match fs::metadata(&path).and_then(|meta| meta.modified()) {
            Ok(modified) => modified,
            // Released between our attempt and this check
            Err(e) if e.kind() == ErrorKind::NotFound => return create_claim(key, &path),
            Err(e) => return Err(ChapalignError::cache_io(&path, e)),
        };
        let age = now.duration_since(modified).unwrap_or_default();
        if age <= Duration::from_secs(STALE_CLAIM_SECS) {
            return Ok(None);
        }

        tracing::warn!(
            key,
            age = %humantime::format_duration(Duration::from_secs(age.as_secs())),
            "taking over abandoned cache claim"
        );
        match fs::remove_file(&path) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(ChapalignError::cache_io(&path, e)),
        }
        create_claim(key, &path)
    }

    /// Removes every entry last modified more than `days` days ago.
    ///
    /// Returns the removed keys in sorted order.
    pub fn purge_older_than(&self, days: u32) -> Result<Vec<String>> {
        self.purge_older_than_at(days, SystemTime::now())
    }

    /// [`purge_older_than`](Self::purge_older_than) against an explicit clock reading.
    pub fn purge_older_than_at(&self, days: u32, now: SystemTime) -> Result<Vec<String>> {
        if days == 0 {
            return Err(ChapalignError::invalid("days", "days must be positive"));
        }
        let cutoff = now
            .checked_sub(Duration::from_secs(u64::from(days) * SECS_PER_DAY))
            .unwrap_or(SystemTime::UNIX_EPOCH);

        let dir = fs::read_dir(&self.root).map_err(|e| ChapalignError::cache_io(&self.root, e))?;
        let mut removed = Vec::new();
        for candidate in dir {
            let candidate = candidate.map_err(|e| ChapalignError::cache_io(&self.root, e))?;
            let path = candidate.path();
            let metadata = candidate
                .metadata()
                .map_err(|e| ChapalignError::cache_io(&path, e))?;
            if !metadata.is_dir() {
                continue;
            }
            let modified = metadata
                .modified()
                .map_err(|e| ChapalignError::cache_io(&path, e))?;
            if modified < cutoff {
                fs::remove_dir_all(&path).map_err(|e| ChapalignError::cache_io(&path, e))?;
                removed.push(candidate.file_name().to_string_lossy().into_owned());
            }
        }

        removed.sort();
        if !removed.is_empty() {
            tracing::info!(count = removed.len(), days, "purged cache entries");
        }
        Ok(removed)
    }
}

/// Rejects keys that would escape the cache root.
fn validate_key(key: &str) -> Result<()> {
    if key.is_empty()
        || key == "."
        || key == ".."
        || key.contains(['/', '\\'])
    {
        return Err(ChapalignError::invalid(
            "cache_key",
            format!("'{key}' is not a valid cache key"),
        ));
    }
    Ok(())
}

/// Creates the claim file; `None` when it already exists.
fn create_claim(key: &str, path: &Path) -> Result<Option<CacheClaim>> {
    match OpenOptions::new().write(true).create_new(true).open(path) {
        Ok(mut file) => {
            writeln!(
                file,
                "pid={} claimed_at={}",
                std::process::id(),
                humantime::format_rfc3339_seconds(SystemTime::now())
            )
            .map_err(|e| ChapalignError::cache_io(path, e))?;
            Ok(Some(CacheClaim {
                key: key.to_string(),
                path: path.to_path_buf(),
            }))
        }
        Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(None),
        Err(e) => Err(ChapalignError::cache_io(path, e)),
    }
}

fn write_file(path: &Path, contents: &[u8]) -> Result<()> {
    fs::write(path, contents).map_err(|e| ChapalignError::cache_io(path, e))
}
