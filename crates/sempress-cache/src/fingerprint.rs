//! Cache fingerprints over (content, configuration) pairs.

use serde::{Deserialize, Serialize};
use xxhash_rust::xxh3::xxh3_64;

/// Identifies one (input content, configuration) pair.
///
/// Two 64-bit xxh3 hashes, one over each input, rendered as a 32-hex key.
/// Any change to either the content bytes or the canonical configuration
/// bytes produces a different fingerprint, which is how invalidation works:
/// stale entries simply stop being addressable.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Compute the fingerprint of content under a configuration.
    pub fn compute(content: &[u8], config: &[u8]) -> Self {
        Fingerprint(format!("{:016x}{:016x}", xxh3_64(content), xxh3_64(config)))
    }

    /// The hex key.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
