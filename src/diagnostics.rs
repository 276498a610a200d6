//! Environment diagnostics for `chapalign check`.
//!
//! Verifies that the aligner is callable, pronunciation resources are in
//! place and the cache directory is writable.

use crate::aligner::MfaAligner;
use crate::config::Config;
use crate::pronunciation::{AlignerResources, PronunciationVariant};
use std::fs;
use std::path::Path;

/// Result of a dependency check.
#[derive(Debug, PartialEq)]
pub enum CheckResult {
    /// Working as expected; carries a short detail line
    Ok(String),
    /// Missing entirely
    NotFound(String),
    /// Present but has issues
    Warning(String),
}

impl CheckResult {
    pub fn is_ok(&self) -> bool {
        matches!(self, CheckResult::Ok(_))
    }
}

/// Check that MFA can be found and reports a version.
pub fn check_aligner(aligner: &MfaAligner) -> CheckResult {
    if let Err(e) = aligner.resolve_executable() {
        return CheckResult::NotFound(e.to_string());
    }
    match aligner.check_health() {
        Ok(version) if version.is_empty() => CheckResult::Ok("version unknown".to_string()),
        Ok(version) => CheckResult::Ok(version),
        Err(e) => CheckResult::Warning(format!("'mfa version' failed: {e}")),
    }
}

/// Check that dictionary and acoustic model exist for one variant.
pub fn check_resources(resources_dir: &Path, variant: PronunciationVariant) -> CheckResult {
    let resources = AlignerResources::from_resources_dir(resources_dir, variant);
    match resources.verify() {
        Ok(()) => CheckResult::Ok(resources.dictionary.display().to_string()),
        Err(e) => CheckResult::NotFound(e.to_string()),
    }
}

/// Check that the cache directory exists (or can be created) and is writable.
pub fn check_cache_dir(cache_dir: &Path) -> CheckResult {
    if let Err(e) = fs::create_dir_all(cache_dir) {
        return CheckResult::Warning(format!("cannot create {}: {e}", cache_dir.display()));
    }
    let probe = cache_dir.join(".chapalign-write-test");
    match fs::write(&probe, b"ok") {
        Ok(()) => {
            if let Err(e) = fs::remove_file(&probe) {
                tracing::debug!(error = %e, "failed to remove write probe");
            }
            CheckResult::Ok(cache_dir.display().to_string())
        }
        Err(e) => CheckResult::Warning(format!("{} is not writable: {e}", cache_dir.display())),
    }
}

fn print_result(label: &str, result: &CheckResult) {
    match result {
        CheckResult::Ok(detail) => println!("{label}: ✓ OK ({detail})"),
        CheckResult::NotFound(msg) => println!("{label}: ✗ NOT FOUND\n  {msg}"),
        CheckResult::Warning(msg) => println!("{label}: ⚠ WARNING: {msg}"),
    }
}

/// Run all checks and print results. Returns whether alignment can run.
pub fn check_dependencies(config: &Config, aligner: &MfaAligner) -> bool {
    println!(
        "chapalign {}: checking alignment environment...\n",
        crate::version_string()
    );

    let aligner_result = check_aligner(aligner);
    print_result("Montreal Forced Aligner", &aligner_result);

    let mut any_variant = false;
    for variant in PronunciationVariant::ALL {
        let result = check_resources(&config.paths.resources_dir, variant);
        any_variant |= result.is_ok();
        print_result(&format!("Resources ({variant})"), &result);
    }

    let cache_result = check_cache_dir(&config.paths.cache_dir);
    print_result("Cache directory", &cache_result);

    println!();
    let ready = aligner_result.is_ok() && any_variant;
    if ready {
        println!("✓ Ready to align.");
    } else {
        println!("⚠ Alignment will fail until the problems above are fixed.");
        if !aligner_result.is_ok() {
            println!("  Install MFA: conda install -c conda-forge montreal-forced-aligner");
        }
        if !any_variant {
            println!(
                "  Place dictionaries/<variant>.dict and models/acoustic.zip under {}",
                config.paths.resources_dir.display()
            );
        }
    }
    ready
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aligner::MfaConfig;
    use tempfile::TempDir;

    #[test]
    fn test_check_result_equality() {
        assert_eq!(CheckResult::Ok("a".into()), CheckResult::Ok("a".into()));
        assert_ne!(
            CheckResult::NotFound("a".into()),
            CheckResult::Warning("a".into())
        );
        assert!(CheckResult::Ok(String::new()).is_ok());
        assert!(!CheckResult::Warning(String::new()).is_ok());
    }

    #[test]
    fn test_check_aligner_nonexistent() {
        let aligner = MfaAligner::new(MfaConfig {
            executable: "nonexistent_mfa_binary_12345".to_string(),
            ..MfaConfig::default()
        });
        assert!(matches!(check_aligner(&aligner), CheckResult::NotFound(_)));
    }

    #[test]
    fn test_check_resources() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            check_resources(dir.path(), PronunciationVariant::Ashkenazi),
            CheckResult::NotFound(_)
        ));

        fs::create_dir_all(dir.path().join("dictionaries")).unwrap();
        fs::create_dir_all(dir.path().join("models")).unwrap();
        fs::write(dir.path().join("dictionaries/ashkenazi.dict"), "x\n").unwrap();
        fs::write(dir.path().join("models/acoustic.zip"), "zip").unwrap();
        assert!(check_resources(dir.path(), PronunciationVariant::Ashkenazi).is_ok());
    }

    #[test]
    fn test_check_cache_dir_creates_directory() {
        let dir = TempDir::new().unwrap();
        let cache = dir.path().join("nested/cache");
        assert!(check_cache_dir(&cache).is_ok());
        assert!(cache.is_dir());
        assert!(!cache.join(".chapalign-write-test").exists());
    }

    #[test]
    fn test_check_dependencies_runs_without_panic() {
        let dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.paths.cache_dir = dir.path().join("cache");
        config.paths.resources_dir = dir.path().join("resources");
        let aligner = MfaAligner::new(MfaConfig {
            executable: "nonexistent_mfa_binary_12345".to_string(),
            ..MfaConfig::default()
        });
        assert!(!check_dependencies(&config, &aligner));
    }
}
