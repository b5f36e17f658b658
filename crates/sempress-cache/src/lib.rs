//! Fingerprint-keyed cache of compressed containers.
//!
//! Identical file content compressed under an identical configuration always
//! yields an identical container, so the cache key is a combined hash of
//! both. Every operation is best-effort: any failure degrades to a cache
//! miss and the filter recomputes.

pub mod error;
pub mod fingerprint;
pub mod storage;

pub use error::{Error, Result};
pub use fingerprint::Fingerprint;
pub use storage::{open_best_effort, CacheConfig, CacheEntry, CacheStats, CacheStore};
