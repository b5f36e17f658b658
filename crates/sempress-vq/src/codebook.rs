//! Scalar codebook learning via seeded k-means.
//!
//! Each numeric column gets its own 1-D codebook of up to `k` centroids.
//! When a column has no more than `k` distinct values the codebook is just
//! the distinct values and reconstruction is exact; otherwise centroids are
//! learned with k-means++ initialization and Lloyd iterations. All
//! randomness flows through a caller-provided seeded generator, so encoding
//! is deterministic for identical inputs and parameters.

use rand::rngs::StdRng;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Maximum Lloyd iterations per fit.
const MAX_ITERATIONS: usize = 25;

/// Stop once no centroid moves more than this fraction of the value range.
const CONVERGENCE_EPSILON: f64 = 1e-12;

/// A learned set of centroids for one column, kept sorted ascending.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Codebook {
    /// Centroid values, sorted ascending, no duplicates.
    pub centroids: Vec<f64>,
}

impl Codebook {
    /// Fit a codebook of at most `k` centroids to `values`.
    ///
    /// `k` is clamped to the distinct-value count; low-cardinality columns
    /// therefore reconstruct exactly.
    pub fn fit(values: &[f64], k: usize, rng: &mut StdRng) -> Self {
        let mut distinct = values.to_vec();
        distinct.sort_unstable_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        distinct.dedup();

        if distinct.len() <= k {
            return Codebook { centroids: distinct };
        }

        let mut centroids = kmeans_pp_init(values, k, rng);
        centroids.sort_unstable_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

        let range = distinct[distinct.len() - 1] - distinct[0];
        let tolerance = CONVERGENCE_EPSILON * range.max(1.0);

        for _ in 0..MAX_ITERATIONS {
            // Assignment + update in one pass over the values.
            let mut sums = vec![0.0f64; centroids.len()];
            let mut counts = vec![0usize; centroids.len()];
            for &v in values {
                let idx = nearest(&centroids, v);
                sums[idx] += v;
                counts[idx] += 1;
            }

            let mut max_shift = 0.0f64;
            for i in 0..centroids.len() {
                if counts[i] > 0 {
                    let next = sums[i] / counts[i] as f64;
                    max_shift = max_shift.max((next - centroids[i]).abs());
                    centroids[i] = next;
                }
            }
            centroids
                .sort_unstable_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

            if max_shift <= tolerance {
                break;
            }
        }

        centroids.dedup();
        Codebook { centroids }
    }

    /// Index of the nearest centroid. Ties resolve to the lower index.
    pub fn encode(&self, v: f64) -> u16 {
        nearest(&self.centroids, v) as u16
    }

    /// Centroid value for an index. Out-of-range indices yield 0.0; the
    /// container codec validates payloads before they get here.
    pub fn decode(&self, idx: u16) -> f64 {
        self.centroids.get(idx as usize).copied().unwrap_or(0.0)
    }

    /// Number of centroids.
    pub fn len(&self) -> usize {
        self.centroids.len()
    }

    /// Whether the codebook holds no centroids (all-null column).
    pub fn is_empty(&self) -> bool {
        self.centroids.is_empty()
    }
}

/// Nearest-centroid search over a sorted centroid list.
fn nearest(centroids: &[f64], v: f64) -> usize {
    debug_assert!(!centroids.is_empty());
    let hi = centroids.partition_point(|&c| c < v);
    if hi == 0 {
        return 0;
    }
    if hi == centroids.len() {
        return centroids.len() - 1;
    }
    let lo = hi - 1;
    if (v - centroids[lo]).abs() <= (centroids[hi] - v).abs() {
        lo
    } else {
        hi
    }
}

/// k-means++ initialization: first centroid uniform, each subsequent one
/// drawn with probability proportional to squared distance from the chosen
/// set.
fn kmeans_pp_init(values: &[f64], k: usize, rng: &mut StdRng) -> Vec<f64> {
    let mut centroids = Vec::with_capacity(k);
    centroids.push(values[rng.gen_range(0..values.len())]);

    let mut dist_sq: Vec<f64> = values
        .iter()
        .map(|&v| (v - centroids[0]).powi(2))
        .collect();

    while centroids.len() < k {
        let total: f64 = dist_sq.iter().sum();
        let next = if total <= 0.0 {
            // Remaining mass is zero; fall back to a uniform draw.
            values[rng.gen_range(0..values.len())]
        } else {
            let mut target = rng.gen_range(0.0..total);
            let mut chosen = values[values.len() - 1];
            for (i, &d) in dist_sq.iter().enumerate() {
                if target < d {
                    chosen = values[i];
                    break;
                }
                target -= d;
            }
            chosen
        };
        centroids.push(next);
        for (i, &v) in values.iter().enumerate() {
            dist_sq[i] = dist_sq[i].min((v - next).powi(2));
        }
    }
    centroids
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn rng() -> StdRng {
        StdRng::seed_from_u64(42)
    }

    #[test]
    fn test_low_cardinality_is_exact() {
        let values = vec![1.0, 2.0, 1.0, 3.0, 2.0, 1.0];
        let cb = Codebook::fit(&values, 8, &mut rng());
        assert_eq!(cb.centroids, vec![1.0, 2.0, 3.0]);
        for &v in &values {
            assert_eq!(cb.decode(cb.encode(v)), v);
        }
    }

    #[test]
    fn test_nearest_assignment() {
        let cb = Codebook {
            centroids: vec![0.0, 10.0, 20.0],
        };
        assert_eq!(cb.encode(-5.0), 0);
        assert_eq!(cb.encode(4.0), 0);
        assert_eq!(cb.encode(6.0), 1);
        assert_eq!(cb.encode(25.0), 2);
        // Equidistant resolves low.
        assert_eq!(cb.encode(5.0), 0);
    }

    #[test]
    fn test_kmeans_reduces_error() {
        let values: Vec<f64> = (0..200).map(|i| (i % 50) as f64 + (i / 50) as f64 * 100.0).collect();
        let cb = Codebook::fit(&values, 16, &mut rng());
        assert_eq!(cb.len(), 16);

        let max_err = values
            .iter()
            .map(|&v| (cb.decode(cb.encode(v)) - v).abs())
            .fold(0.0f64, f64::max);
        // 4 clusters of width 50 covered by 16 centroids.
        assert!(max_err < 50.0, "max_err {max_err}");
    }

    #[test]
    fn test_fit_is_deterministic() {
        let values: Vec<f64> = (0..500).map(|i| ((i * 37) % 251) as f64 * 0.13).collect();
        let a = Codebook::fit(&values, 32, &mut rng());
        let b = Codebook::fit(&values, 32, &mut rng());
        assert_eq!(a, b);
    }

    #[test]
    fn test_centroids_sorted() {
        let values: Vec<f64> = (0..300).map(|i| ((i * 17) % 101) as f64).collect();
        let cb = Codebook::fit(&values, 24, &mut rng());
        assert!(cb.centroids.windows(2).all(|w| w[0] < w[1]));
    }
}
