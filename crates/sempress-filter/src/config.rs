//! `.sempress.yml` configuration: discovery, defaults, validation.
//!
//! The config file is looked up from the working directory upward toward
//! the repository root (the directory containing `.git`), bounded at
//! [`MAX_SEARCH_DEPTH`] levels. A missing file means defaults; a present
//! but malformed file is a hard error; silently falling back would change
//! compression behavior without the user noticing.

use crate::error::{FilterError, Result};
use serde::{Deserialize, Serialize};
use sempress_core::{ClassifyConfig, Thresholds};
use sempress_vq::{VqParams, MAX_K};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Name of the configuration file.
pub const CONFIG_FILE_NAME: &str = ".sempress.yml";

/// How many directory levels upward discovery will walk.
pub const MAX_SEARCH_DEPTH: usize = 10;

/// The k-means seed. Fixed so identical input and configuration always
/// produce identical containers (the cache depends on this).
pub const CODEBOOK_SEED: u64 = 42;

/// Default config written by `sempress init`.
pub const DEFAULT_CONFIG_YAML: &str = "\
# Sempress configuration.
compression:
  # Codebook size per quantized column (1..=65536).
  k: 64
  # Flag columns whose mean relative error exceeds this (0 < t <= 1).
  uncertainty_threshold: 0.2
  # Auto-lock identifier-like and timestamp-like integer columns.
  auto_lock: true
  # Columns stored exactly, no approximation.
  lock_cols: []
  # Columns quantized with an exact correction delta retained.
  residual_cols: []

thresholds:
  # Files smaller than this are stored raw (megabytes).
  min_size_mb: 1.0
  # Containers must beat this original/stored ratio or the original is kept.
  min_compression_ratio: 1.5

cache:
  enabled: true
  dir: .sempress/cache
  max_size_mb: 512
  max_entries: 1024
";

/// Compression settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CompressionConfig {
    /// Codebook size per quantized column.
    #[serde(default = "default_k")]
    pub k: u32,
    /// Per-column mean relative error above which a promotion is flagged.
    #[serde(default = "default_uncertainty_threshold")]
    pub uncertainty_threshold: f64,
    /// Auto-lock identifier-like integer columns.
    #[serde(default = "default_true")]
    pub auto_lock: bool,
    /// Columns forced to exact storage.
    #[serde(default)]
    pub lock_cols: Vec<String>,
    /// Columns forced to residual storage.
    #[serde(default)]
    pub residual_cols: Vec<String>,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            k: default_k(),
            uncertainty_threshold: default_uncertainty_threshold(),
            auto_lock: true,
            lock_cols: Vec::new(),
            residual_cols: Vec::new(),
        }
    }
}

/// Accept/reject thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ThresholdConfig {
    /// Size floor in megabytes; smaller files are stored raw.
    #[serde(default = "default_min_size_mb")]
    pub min_size_mb: f64,
    /// Ratio floor; containers that do not beat it are discarded.
    #[serde(default = "default_min_ratio")]
    pub min_compression_ratio: f64,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            min_size_mb: default_min_size_mb(),
            min_compression_ratio: default_min_ratio(),
        }
    }
}

/// Cache settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CacheSettings {
    /// Whether the cache is consulted at all.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Cache directory, relative to the working directory unless absolute.
    #[serde(default = "default_cache_dir")]
    pub dir: PathBuf,
    /// Total blob size ceiling in megabytes.
    #[serde(default = "default_cache_size_mb")]
    pub max_size_mb: u64,
    /// Entry count ceiling.
    #[serde(default = "default_cache_entries")]
    pub max_entries: usize,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            dir: default_cache_dir(),
            max_size_mb: default_cache_size_mb(),
            max_entries: default_cache_entries(),
        }
    }
}

/// Full filter configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Compression settings.
    #[serde(default)]
    pub compression: CompressionConfig,
    /// Accept/reject thresholds.
    #[serde(default)]
    pub thresholds: ThresholdConfig,
    /// Cache settings.
    #[serde(default)]
    pub cache: CacheSettings,
}

impl Config {
    /// Parse configuration from YAML text.
    pub fn from_yaml(text: &str) -> Result<Self> {
        let config: Config =
            serde_yaml::from_str(text).map_err(|e| FilterError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Discover and load the configuration for `start_dir`.
    ///
    /// Walks upward looking for [`CONFIG_FILE_NAME`], stopping at the
    /// directory containing `.git` or after [`MAX_SEARCH_DEPTH`] levels.
    /// No file found means defaults.
    pub fn discover(start_dir: &Path) -> Result<Self> {
        match find_config_file(start_dir) {
            Some(path) => {
                debug!("loading config from {}", path.display());
                let text = fs::read_to_string(&path)?;
                Self::from_yaml(&text)
            }
            None => {
                debug!("no config file found, using defaults");
                Ok(Config::default())
            }
        }
    }

    fn validate(&self) -> Result<()> {
        let c = &self.compression;
        if c.k == 0 || c.k > MAX_K {
            return Err(FilterError::Config(format!(
                "compression.k must be in 1..={MAX_K}, got {}",
                c.k
            )));
        }
        if !(c.uncertainty_threshold > 0.0 && c.uncertainty_threshold <= 1.0) {
            return Err(FilterError::Config(format!(
                "compression.uncertainty_threshold must be in (0, 1], got {}",
                c.uncertainty_threshold
            )));
        }
        if let Some(col) = c.lock_cols.iter().find(|l| c.residual_cols.contains(l)) {
            return Err(FilterError::Config(format!(
                "column '{col}' appears in both lock_cols and residual_cols"
            )));
        }
        let t = &self.thresholds;
        if t.min_size_mb < 0.0 {
            return Err(FilterError::Config(format!(
                "thresholds.min_size_mb must be non-negative, got {}",
                t.min_size_mb
            )));
        }
        if t.min_compression_ratio < 0.0 {
            return Err(FilterError::Config(format!(
                "thresholds.min_compression_ratio must be non-negative, got {}",
                t.min_compression_ratio
            )));
        }
        Ok(())
    }

    /// Canonical serialized form used in cache fingerprints.
    ///
    /// Serializing the parsed struct (rather than hashing the file text)
    /// makes the fingerprint insensitive to comments and key order but
    /// sensitive to every effective setting.
    pub fn canonical_bytes(&self) -> Result<Vec<u8>> {
        serde_yaml::to_string(self)
            .map(String::into_bytes)
            .map_err(|e| FilterError::Config(e.to_string()))
    }

    /// Classification inputs derived from this config.
    pub fn classify_config(&self) -> ClassifyConfig {
        ClassifyConfig {
            lock_cols: self.compression.lock_cols.clone(),
            residual_cols: self.compression.residual_cols.clone(),
            auto_lock: self.compression.auto_lock,
        }
    }

    /// Codec parameters derived from this config.
    pub fn vq_params(&self) -> VqParams {
        VqParams {
            k: self.compression.k,
            uncertainty_threshold: self.compression.uncertainty_threshold,
            seed: CODEBOOK_SEED,
        }
    }

    /// Gate thresholds derived from this config.
    pub fn thresholds(&self) -> Thresholds {
        Thresholds {
            min_size_mb: self.thresholds.min_size_mb,
            min_compression_ratio: self.thresholds.min_compression_ratio,
        }
    }
}

fn find_config_file(start_dir: &Path) -> Option<PathBuf> {
    let mut dir = start_dir.to_path_buf();
    for _ in 0..MAX_SEARCH_DEPTH {
        let candidate = dir.join(CONFIG_FILE_NAME);
        if candidate.is_file() {
            return Some(candidate);
        }
        // The repo root is as far up as configs apply.
        if dir.join(".git").exists() {
            return None;
        }
        if !dir.pop() {
            return None;
        }
    }
    None
}

fn default_k() -> u32 {
    64
}
fn default_uncertainty_threshold() -> f64 {
    0.2
}
fn default_true() -> bool {
    true
}
fn default_min_size_mb() -> f64 {
    1.0
}
fn default_min_ratio() -> f64 {
    1.5
}
fn default_cache_dir() -> PathBuf {
    PathBuf::from(".sempress/cache")
}
fn default_cache_size_mb() -> u64 {
    512
}
fn default_cache_entries() -> usize {
    1024
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.compression.k, 64);
        assert_eq!(config.compression.uncertainty_threshold, 0.2);
        assert!(config.compression.auto_lock);
        assert_eq!(config.thresholds.min_size_mb, 1.0);
        assert_eq!(config.thresholds.min_compression_ratio, 1.5);
        assert!(config.cache.enabled);
    }

    #[test]
    fn test_partial_yaml_fills_defaults() {
        let config = Config::from_yaml("compression:\n  k: 128\n").unwrap();
        assert_eq!(config.compression.k, 128);
        assert_eq!(config.compression.uncertainty_threshold, 0.2);
        assert_eq!(config.thresholds.min_compression_ratio, 1.5);
    }

    #[test]
    fn test_default_yaml_matches_defaults() {
        let parsed = Config::from_yaml(DEFAULT_CONFIG_YAML).unwrap();
        assert_eq!(
            parsed.canonical_bytes().unwrap(),
            Config::default().canonical_bytes().unwrap()
        );
    }

    #[test]
    fn test_invalid_k_rejected() {
        assert!(Config::from_yaml("compression:\n  k: 0\n").is_err());
        assert!(Config::from_yaml("compression:\n  k: 100000\n").is_err());
    }

    #[test]
    fn test_invalid_threshold_rejected() {
        assert!(Config::from_yaml("compression:\n  uncertainty_threshold: 0.0\n").is_err());
        assert!(Config::from_yaml("compression:\n  uncertainty_threshold: 1.5\n").is_err());
    }

    #[test]
    fn test_overlapping_role_lists_rejected() {
        let yaml = "compression:\n  lock_cols: [id]\n  residual_cols: [id]\n";
        assert!(Config::from_yaml(yaml).is_err());
    }

    #[test]
    fn test_unknown_key_rejected() {
        assert!(Config::from_yaml("compressionn:\n  k: 64\n").is_err());
    }

    #[test]
    fn test_discovery_walks_up() {
        let root = tempdir().unwrap();
        fs::create_dir_all(root.path().join(".git")).unwrap();
        fs::write(
            root.path().join(CONFIG_FILE_NAME),
            "compression:\n  k: 32\n",
        )
        .unwrap();
        let nested = root.path().join("data/raw");
        fs::create_dir_all(&nested).unwrap();

        let config = Config::discover(&nested).unwrap();
        assert_eq!(config.compression.k, 32);
    }

    #[test]
    fn test_discovery_stops_at_git_root() {
        let root = tempdir().unwrap();
        // Config above the repo root must not be picked up.
        fs::write(
            root.path().join(CONFIG_FILE_NAME),
            "compression:\n  k: 32\n",
        )
        .unwrap();
        let repo = root.path().join("repo");
        fs::create_dir_all(repo.join(".git")).unwrap();

        let config = Config::discover(&repo).unwrap();
        assert_eq!(config.compression.k, 64);
    }

    #[test]
    fn test_missing_config_is_defaults() {
        let dir = tempdir().unwrap();
        let config = Config::discover(dir.path()).unwrap();
        assert_eq!(config.compression.k, 64);
    }

    #[test]
    fn test_canonical_bytes_ignore_comments_and_order() {
        let a = Config::from_yaml("# a comment\ncompression:\n  k: 64\n").unwrap();
        let b = Config::from_yaml("thresholds: {}\ncompression: {k: 64}\n").unwrap();
        assert_eq!(
            a.canonical_bytes().unwrap(),
            b.canonical_bytes().unwrap()
        );
    }

    #[test]
    fn test_canonical_bytes_track_settings() {
        let a = Config::from_yaml("compression:\n  k: 64\n").unwrap();
        let b = Config::from_yaml("compression:\n  k: 128\n").unwrap();
        assert_ne!(
            a.canonical_bytes().unwrap(),
            b.canonical_bytes().unwrap()
        );
    }
}
