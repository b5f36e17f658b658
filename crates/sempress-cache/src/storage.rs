//! On-disk cache of produced containers.
//!
//! Layout under the cache directory:
//!
//! ```text
//! index.json            metadata for every entry
//! data/<aa>/<key>.smp   container bytes, sharded by key prefix
//! ```
//!
//! The cache is shared between concurrent filter processes, so every write
//! is atomic: blob and index both go through a temporary file followed by a
//! rename. A write for a given fingerprint is idempotent (identical input
//! always produces identical container bytes), so a lost race costs a
//! recomputation, never an inconsistent entry.

use crate::error::{Error, Result};
use crate::fingerprint::Fingerprint;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Configuration for the cache store.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Cache directory.
    pub dir: PathBuf,
    /// Maximum total blob size in bytes before eviction.
    pub max_bytes: u64,
    /// Maximum number of entries before eviction.
    pub max_entries: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from(".sempress/cache"),
            max_bytes: 512 * 1024 * 1024,
            max_entries: 1024,
        }
    }
}

/// Metadata for one cached container.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Fingerprint key.
    pub key: String,
    /// Blob size in bytes.
    pub size: u64,
    /// Creation timestamp (unix seconds).
    pub created_at: u64,
    /// Last access timestamp.
    pub last_accessed: u64,
    /// Access count.
    pub access_count: u32,
}

impl CacheEntry {
    fn new(key: String, size: u64) -> Self {
        let now = now();
        CacheEntry {
            key,
            size,
            created_at: now,
            last_accessed: now,
            access_count: 0,
        }
    }

    fn touch(&mut self) {
        self.last_accessed = now();
        self.access_count += 1;
    }

    /// Eviction score: recency weighted by log frequency. Lower evicts
    /// first.
    fn eviction_score(&self) -> f64 {
        let age = now().saturating_sub(self.last_accessed) as f64;
        let recency = 1.0 / (age + 1.0);
        let frequency = (f64::from(self.access_count)).ln().max(1.0);
        recency * frequency
    }
}

/// Aggregate cache statistics.
#[derive(Debug, Clone)]
pub struct CacheStats {
    /// Number of entries.
    pub entries: usize,
    /// Total blob bytes.
    pub size_bytes: u64,
    /// Configured size ceiling.
    pub max_bytes: u64,
}

/// File-backed container cache.
pub struct CacheStore {
    config: CacheConfig,
    index: HashMap<String, CacheEntry>,
    current_size: u64,
}

impl CacheStore {
    /// Open or create the cache at the configured directory.
    ///
    /// A corrupt index is logged and discarded rather than failing the
    /// filter: the cache only ever costs recomputation.
    pub fn open(config: CacheConfig) -> Result<Self> {
        fs::create_dir_all(config.dir.join("data"))?;

        let mut store = CacheStore {
            config,
            index: HashMap::new(),
            current_size: 0,
        };
        store.load_index();
        Ok(store)
    }

    fn load_index(&mut self) {
        let path = self.index_path();
        if !path.exists() {
            return;
        }
        let entries: Vec<CacheEntry> = match fs::read_to_string(&path)
            .map_err(Error::from)
            .and_then(|data| {
                serde_json::from_str(&data).map_err(|e| Error::IndexCorrupt(e.to_string()))
            }) {
            Ok(entries) => entries,
            Err(e) => {
                warn!("discarding unreadable cache index: {e}");
                return;
            }
        };

        for entry in entries {
            self.current_size += entry.size;
            self.index.insert(entry.key.clone(), entry);
        }
        debug!("loaded cache index: {} entries", self.index.len());
    }

    fn save_index(&self) -> Result<()> {
        let entries: Vec<&CacheEntry> = self.index.values().collect();
        let data = serde_json::to_string_pretty(&entries)
            .map_err(|e| Error::IndexCorrupt(e.to_string()))?;

        let path = self.index_path();
        let tmp = path.with_extension("tmp");
        fs::write(&tmp, data)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    /// Look up a container by fingerprint. `None` on miss; a missing blob
    /// behind a live index entry is treated as a miss and pruned.
    pub fn lookup(&mut self, fingerprint: &Fingerprint) -> Result<Option<Vec<u8>>> {
        let key = fingerprint.as_str();
        if !self.index.contains_key(key) {
            return Ok(None);
        }

        let path = self.blob_path(key);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(_) => {
                debug!("cache entry {key} has no blob, pruning");
                if let Some(entry) = self.index.remove(key) {
                    self.current_size = self.current_size.saturating_sub(entry.size);
                }
                let _ = self.save_index();
                return Ok(None);
            }
        };

        if let Some(entry) = self.index.get_mut(key) {
            entry.touch();
        }
        let _ = self.save_index();
        debug!("cache hit for {key} ({} bytes)", bytes.len());
        Ok(Some(bytes))
    }

    /// Store a container under a fingerprint. Idempotent: an existing entry
    /// of the same size is left alone.
    pub fn store(&mut self, fingerprint: &Fingerprint, container: &[u8]) -> Result<()> {
        let key = fingerprint.as_str();
        if self
            .index
            .get(key)
            .is_some_and(|e| e.size == container.len() as u64)
        {
            return Ok(());
        }

        self.ensure_capacity(container.len() as u64)?;

        let path = self.blob_path(key);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp = path.with_extension("tmp");
        fs::write(&tmp, container)?;
        fs::rename(&tmp, &path)?;

        let entry = CacheEntry::new(key.to_string(), container.len() as u64);
        self.current_size += entry.size;
        self.index.insert(entry.key.clone(), entry);
        self.save_index()?;

        debug!("cached {} bytes under {key}", container.len());
        Ok(())
    }

    /// Evict lowest-scoring entries until the new blob fits within the
    /// configured ceilings.
    fn ensure_capacity(&mut self, needed: u64) -> Result<()> {
        let over_count = self.index.len() + 1 > self.config.max_entries;
        let over_size = self.current_size + needed > self.config.max_bytes;
        if !over_count && !over_size {
            return Ok(());
        }

        let mut candidates: Vec<(String, u64, f64)> = self
            .index
            .values()
            .map(|e| (e.key.clone(), e.size, e.eviction_score()))
            .collect();
        candidates.sort_by(|a, b| a.2.partial_cmp(&b.2).unwrap_or(std::cmp::Ordering::Equal));

        let size_target = self.config.max_bytes.saturating_sub(needed);
        let mut evicted = 0usize;
        for (key, size, _) in candidates {
            let fits_count = self.index.len() <= self.config.max_entries.saturating_sub(1);
            let fits_size = self.current_size <= size_target;
            if fits_count && fits_size {
                break;
            }
            let _ = fs::remove_file(self.blob_path(&key));
            self.index.remove(&key);
            self.current_size = self.current_size.saturating_sub(size);
            evicted += 1;
        }

        if evicted > 0 {
            info!("evicted {evicted} cache entries");
            self.save_index()?;
        }
        Ok(())
    }

    /// Current aggregate statistics.
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.index.len(),
            size_bytes: self.current_size,
            max_bytes: self.config.max_bytes,
        }
    }

    /// Remove every entry and blob.
    pub fn clear(&mut self) -> Result<()> {
        let data = self.config.dir.join("data");
        if data.exists() {
            fs::remove_dir_all(&data)?;
            fs::create_dir_all(&data)?;
        }
        self.index.clear();
        self.current_size = 0;
        self.save_index()
    }

    fn index_path(&self) -> PathBuf {
        self.config.dir.join("index.json")
    }

    fn blob_path(&self, key: &str) -> PathBuf {
        let shard = &key[..2.min(key.len())];
        self.config
            .dir
            .join("data")
            .join(shard)
            .join(format!("{key}.smp"))
    }
}

/// Open a cache rooted under `dir`, logging rather than failing on error.
/// Convenience for callers that treat the cache as best-effort.
pub fn open_best_effort(dir: &Path, max_bytes: u64, max_entries: usize) -> Option<CacheStore> {
    let config = CacheConfig {
        dir: dir.to_path_buf(),
        max_bytes,
        max_entries,
    };
    match CacheStore::open(config) {
        Ok(store) => Some(store),
        Err(e) => {
            warn!("cache unavailable, continuing without it: {e}");
            None
        }
    }
}

fn now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
