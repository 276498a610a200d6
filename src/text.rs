//! Reference text for a chapter.
//!
//! The alignment core only needs the expected word count and a version string
//! for cache keys. The loader here reads a plain UTF-8 file with one verse per
//! line and whitespace-separated tokens; blank lines and `#` comments are skipped.

use crate::error::{ChapalignError, Result};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::Path;

/// Ordered verses of word tokens for one chapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextReference {
    pub book: String,
    pub chapter: u32,
    /// Content digest of the token stream; changes whenever any token changes.
    pub version: String,
    pub verses: Vec<Vec<String>>,
}

impl TextReference {
    /// Builds a reference from verses, deriving its version from the tokens.
    pub fn new(book: &str, chapter: u32, verses: Vec<Vec<String>>) -> Self {
        let version = content_version(&verses);
        Self {
            book: book.to_string(),
            chapter,
            version,
            verses,
        }
    }

    /// Parses the plain-text format.
    pub fn parse(book: &str, chapter: u32, contents: &str) -> Self {
        let verses = contents
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .map(|line| line.split_whitespace().map(str::to_string).collect())
            .collect();
        Self::new(book, chapter, verses)
    }

    /// Loads a reference from `path`.
    pub fn load(book: &str, chapter: u32, path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path).map_err(|e| ChapalignError::TextReference {
            message: format!("failed to read {}: {e}", path.display()),
        })?;
        let reference = Self::parse(book, chapter, &contents);
        if reference.word_count() == 0 {
            return Err(ChapalignError::TextReference {
                message: format!("{} contains no words", path.display()),
            });
        }
        Ok(reference)
    }

    /// Total number of tokens across all verses.
    pub fn word_count(&self) -> usize {
        self.verses.iter().map(Vec::len).sum()
    }

    /// All tokens in reading order.
    pub fn tokens(&self) -> impl Iterator<Item = &str> {
        self.verses.iter().flatten().map(String::as_str)
    }

    /// The whole chapter as one space-separated line.
    pub fn transcript(&self) -> String {
        self.tokens().collect::<Vec<_>>().join(" ")
    }
}

fn content_version(verses: &[Vec<String>]) -> String {
    let mut hasher = Sha256::new();
    for verse in verses {
        hasher.update(verse.join(" ").as_bytes());
        hasher.update(b"\n");
    }
    let digest = format!("{:x}", hasher.finalize());
    digest[..16].to_string()
}
