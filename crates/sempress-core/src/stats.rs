//! Statistics from a single filter invocation.

/// Sizes and quality from one clean operation, for logging and the CLI.
#[derive(Debug, Clone, Default)]
pub struct CompressionStats {
    /// Original (raw table) size in bytes.
    pub original_size: usize,
    /// Emitted artifact size in bytes (container or marked raw).
    pub stored_size: usize,
    /// Similarity score from the quality gate, 0–100.
    pub similarity: f64,
    /// Whether the original bytes were stored raw.
    pub stored_raw: bool,
}

impl CompressionStats {
    /// Compression ratio (original / stored). Higher is better.
    pub fn ratio(&self) -> f64 {
        if self.stored_size == 0 {
            return 0.0;
        }
        self.original_size as f64 / self.stored_size as f64
    }

    /// Space savings as a percentage of the original size.
    pub fn savings_percent(&self) -> f64 {
        if self.original_size == 0 {
            return 0.0;
        }
        (1.0 - self.stored_size as f64 / self.original_size as f64) * 100.0
    }

    /// One-line summary for logs.
    pub fn summary(&self) -> String {
        if self.stored_raw {
            format!("{} bytes stored raw", self.original_size)
        } else {
            format!(
                "{} -> {} bytes ({:.2}x, similarity {:.2}%)",
                self.original_size,
                self.stored_size,
                self.ratio(),
                self.similarity
            )
        }
    }
}
