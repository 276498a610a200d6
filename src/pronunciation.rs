//! Pronunciation variants and the shared resources handed to the aligner.
//!
//! [`AlignerResources`] is built once by the caller and passed by reference to
//! every window's alignment request; nothing here is global.

use crate::error::{ChapalignError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Reading tradition used to pick the pronunciation dictionary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PronunciationVariant {
    #[default]
    Modern,
    Ashkenazi,
    Sephardi,
}

impl PronunciationVariant {
    pub const ALL: [PronunciationVariant; 3] = [Self::Modern, Self::Ashkenazi, Self::Sephardi];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Modern => "modern",
            Self::Ashkenazi => "ashkenazi",
            Self::Sephardi => "sephardi",
        }
    }
}

impl fmt::Display for PronunciationVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PronunciationVariant {
    type Err = ChapalignError;

    fn from_str(s: &str) -> Result<Self> {
        let lowered = s.trim().to_lowercase();
        Self::ALL
            .into_iter()
            .find(|v| v.as_str() == lowered)
            .ok_or_else(|| {
                ChapalignError::invalid(
                    "variant",
                    format!("unknown pronunciation variant '{s}' (expected modern, ashkenazi or sephardi)"),
                )
            })
    }
}

/// Read-only resources shared by every aligner invocation in a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlignerResources {
    pub variant: PronunciationVariant,
    /// Pronunciation dictionary for `variant`.
    pub dictionary: PathBuf,
    /// Acoustic model archive.
    pub acoustic_model: PathBuf,
}

impl AlignerResources {
    pub fn new(variant: PronunciationVariant, dictionary: PathBuf, acoustic_model: PathBuf) -> Self {
        Self {
            variant,
            dictionary,
            acoustic_model,
        }
    }

    /// Standard layout under a resources directory:
    /// `dictionaries/<variant>.dict` and `models/acoustic.zip`.
    pub fn from_resources_dir(dir: &Path, variant: PronunciationVariant) -> Self {
        Self::new(
            variant,
            dir.join("dictionaries").join(format!("{variant}.dict")),
            dir.join("models").join("acoustic.zip"),
        )
    }

    /// Fails with `AlignerUnavailable` when a resource file is missing.
    pub fn verify(&self) -> Result<()> {
        for (what, path) in [
            ("dictionary", &self.dictionary),
            ("acoustic model", &self.acoustic_model),
        ] {
            if !path.exists() {
                return Err(ChapalignError::AlignerUnavailable {
                    message: format!("{what} not found at {}", path.display()),
                });
            }
        }
        Ok(())
    }
}
