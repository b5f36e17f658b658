//! # Sempress VQ
//!
//! Vector-quantization codec for numeric table columns: learns a per-column
//! codebook of `k` centroids and stores each cell as a codebook index.
//!
//! The crate exposes a value-type interface of two pure functions,
//! [`encode`] and [`decode`], so the filter orchestrator can call it
//! repeatedly with different parameters while gating quality. Encoding is
//! deterministic: identical columns and parameters always produce identical
//! payload bytes (k-means initialization draws from a fixed-seed generator).
//!
//! Null cells round-trip exactly via an explicit per-column null mask; the
//! lossiness is confined to non-null values of columns whose cardinality
//! exceeds `k`.

mod codebook;
mod error;

pub use codebook::Codebook;
pub use error::{Error, Result};

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

/// Payload format version.
const PAYLOAD_VERSION: u16 = 1;

/// Codebook indices are u16, so `k` may not exceed this.
pub const MAX_K: u32 = 65_536;

/// Codec parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VqParams {
    /// Codebook size (cluster count) per column.
    pub k: u32,
    /// Column-level relative-error threshold the caller gates against.
    /// Recorded in the payload for diagnostics; the codec itself always
    /// produces its best reconstruction.
    pub uncertainty_threshold: f64,
    /// Seed for codebook initialization.
    pub seed: u64,
}

impl Default for VqParams {
    fn default() -> Self {
        Self {
            k: 64,
            uncertainty_threshold: 0.2,
            seed: 42,
        }
    }
}

impl VqParams {
    fn validate(&self) -> Result<()> {
        if self.k == 0 || self.k > MAX_K {
            return Err(Error::InvalidParams(format!(
                "k must be in 1..={MAX_K}, got {}",
                self.k
            )));
        }
        if !(self.uncertainty_threshold > 0.0 && self.uncertainty_threshold <= 1.0) {
            return Err(Error::InvalidParams(format!(
                "uncertainty_threshold must be in (0, 1], got {}",
                self.uncertainty_threshold
            )));
        }
        Ok(())
    }
}

/// One numeric column handed to or returned by the codec.
///
/// `values` is row-aligned (null rows hold 0.0); `nulls` lists null row
/// indices, sorted ascending.
#[derive(Debug, Clone, PartialEq)]
pub struct NumericColumn {
    /// Column name.
    pub name: String,
    /// Row-aligned values.
    pub values: Vec<f64>,
    /// Sorted indices of null rows.
    pub nulls: Vec<u32>,
}

#[derive(Serialize, Deserialize)]
struct EncodedColumn {
    name: String,
    row_count: u32,
    codebook: Codebook,
    /// One index per non-null row, in row order.
    indices: Vec<u16>,
    nulls: Vec<u32>,
}

#[derive(Serialize, Deserialize)]
struct Payload {
    version: u16,
    params: VqParams,
    columns: Vec<EncodedColumn>,
}

/// Encode numeric columns into an opaque payload.
pub fn encode(columns: &[NumericColumn], params: &VqParams) -> Result<Vec<u8>> {
    params.validate()?;

    let mut encoded = Vec::with_capacity(columns.len());
    for col in columns {
        for pair in col.nulls.windows(2) {
            if pair[0] >= pair[1] {
                return Err(Error::Encode(format!(
                    "null mask for column '{}' is not sorted",
                    col.name
                )));
            }
        }
        if col.nulls.last().is_some_and(|&n| n as usize >= col.values.len()) {
            return Err(Error::Encode(format!(
                "null mask for column '{}' exceeds row count",
                col.name
            )));
        }

        let non_null = non_null_values(col);
        let mut rng = StdRng::seed_from_u64(params.seed);
        let codebook = if non_null.is_empty() {
            Codebook { centroids: Vec::new() }
        } else {
            Codebook::fit(&non_null, params.k as usize, &mut rng)
        };
        let indices = non_null.iter().map(|&v| codebook.encode(v)).collect();

        encoded.push(EncodedColumn {
            name: col.name.clone(),
            row_count: col.values.len() as u32,
            codebook,
            indices,
            nulls: col.nulls.clone(),
        });
    }

    let payload = Payload {
        version: PAYLOAD_VERSION,
        params: *params,
        columns: encoded,
    };
    bincode::serialize(&payload).map_err(|e| Error::Encode(e.to_string()))
}

/// Decode a payload back into numeric columns, in encoding order.
pub fn decode(bytes: &[u8]) -> Result<Vec<NumericColumn>> {
    let payload: Payload =
        bincode::deserialize(bytes).map_err(|e| Error::Decode(e.to_string()))?;
    if payload.version != PAYLOAD_VERSION {
        return Err(Error::UnsupportedVersion(payload.version));
    }

    let mut columns = Vec::with_capacity(payload.columns.len());
    for col in payload.columns {
        let rows = col.row_count as usize;
        if col.indices.len() + col.nulls.len() != rows {
            return Err(Error::Decode(format!(
                "column '{}': {} indices + {} nulls != {} rows",
                col.name,
                col.indices.len(),
                col.nulls.len(),
                rows
            )));
        }
        if let Some(&max_idx) = col.indices.iter().max() {
            if max_idx as usize >= col.codebook.len() {
                return Err(Error::Decode(format!(
                    "column '{}': index {} out of range for codebook of {}",
                    col.name,
                    max_idx,
                    col.codebook.len()
                )));
            }
        }

        let mut values = Vec::with_capacity(rows);
        let mut null_iter = col.nulls.iter().peekable();
        let mut idx_iter = col.indices.iter();
        for row in 0..rows {
            if null_iter.peek() == Some(&&(row as u32)) {
                null_iter.next();
                values.push(0.0);
            } else {
                let idx = idx_iter
                    .next()
                    .ok_or_else(|| Error::Decode(format!("column '{}': ran out of indices", col.name)))?;
                values.push(col.codebook.decode(*idx));
            }
        }

        columns.push(NumericColumn {
            name: col.name,
            values,
            nulls: col.nulls,
        });
    }
    Ok(columns)
}

fn non_null_values(col: &NumericColumn) -> Vec<f64> {
    let mut null_iter = col.nulls.iter().peekable();
    col.values
        .iter()
        .enumerate()
        .filter_map(|(row, &v)| {
            if null_iter.peek() == Some(&&(row as u32)) {
                null_iter.next();
                None
            } else {
                Some(v)
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn col(name: &str, values: Vec<f64>, nulls: Vec<u32>) -> NumericColumn {
        NumericColumn {
            name: name.to_string(),
            values,
            nulls,
        }
    }

    #[test]
    fn test_roundtrip_exact_when_distinct_fits_k() {
        let input = vec![col("temp", vec![20.1, 20.2, 20.1, 20.3, 20.2], vec![])];
        let payload = encode(&input, &VqParams::default()).unwrap();
        let output = decode(&payload).unwrap();
        assert_eq!(output, input);
    }

    #[test]
    fn test_null_mask_roundtrips_exactly() {
        let input = vec![col("v", vec![1.5, 0.0, 2.5, 0.0], vec![1, 3])];
        let payload = encode(&input, &VqParams::default()).unwrap();
        let output = decode(&payload).unwrap();
        assert_eq!(output[0].nulls, vec![1, 3]);
        assert_eq!(output[0].values, vec![1.5, 0.0, 2.5, 0.0]);
    }

    #[test]
    fn test_all_null_column() {
        let input = vec![col("empty", vec![0.0, 0.0], vec![0, 1])];
        let payload = encode(&input, &VqParams::default()).unwrap();
        let output = decode(&payload).unwrap();
        assert_eq!(output, input);
    }

    #[test]
    fn test_encode_is_deterministic() {
        let input = vec![col(
            "x",
            (0..500).map(|i| ((i * 31) % 173) as f64 * 0.7).collect(),
            vec![],
        )];
        let params = VqParams {
            k: 32,
            ..VqParams::default()
        };
        let a = encode(&input, &params).unwrap();
        let b = encode(&input, &params).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_lossy_reconstruction_bounded_by_value_range() {
        let values: Vec<f64> = (0..1000).map(|i| (i as f64).sin() * 50.0 + 100.0).collect();
        let input = vec![col("wave", values.clone(), vec![])];
        let params = VqParams {
            k: 64,
            ..VqParams::default()
        };
        let output = decode(&encode(&input, &params).unwrap()).unwrap();

        // 64 centroids over a range of 100: every value lands within range,
        // and the mean error is well under the bin width.
        let mean_err: f64 = values
            .iter()
            .zip(output[0].values.iter())
            .map(|(o, r)| (o - r).abs())
            .sum::<f64>()
            / values.len() as f64;
        assert!(mean_err < 5.0, "mean_err {mean_err}");
    }

    #[test]
    fn test_invalid_k_rejected() {
        let input = vec![col("v", vec![1.0], vec![])];
        let params = VqParams {
            k: 0,
            ..VqParams::default()
        };
        assert!(matches!(
            encode(&input, &params),
            Err(Error::InvalidParams(_))
        ));
        let params = VqParams {
            k: MAX_K + 1,
            ..VqParams::default()
        };
        assert!(encode(&input, &params).is_err());
    }

    #[test]
    fn test_invalid_threshold_rejected() {
        let input = vec![col("v", vec![1.0], vec![])];
        for t in [0.0, -0.1, 1.5] {
            let params = VqParams {
                uncertainty_threshold: t,
                ..VqParams::default()
            };
            assert!(encode(&input, &params).is_err());
        }
    }

    #[test]
    fn test_garbage_payload_rejected() {
        assert!(decode(b"not a payload").is_err());
    }

    #[test]
    fn test_unsorted_null_mask_rejected() {
        let input = vec![col("v", vec![1.0, 2.0, 3.0], vec![2, 1])];
        assert!(encode(&input, &VqParams::default()).is_err());
    }
}
