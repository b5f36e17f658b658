//! Quality evaluation and the accept/reject gate.
//!
//! [`evaluate`] compares an original table against its reconstruction and
//! produces a [`QualityReport`]; [`decide`] turns the report plus the size
//! thresholds into a [`GateDecision`]. Rejection is a policy outcome, not an
//! error; the orchestrator falls back to storing the original bytes.

use crate::classify::ColumnRole;
use crate::error::{Error, Result};
use crate::table::Table;
use std::collections::BTreeMap;

/// Denominator floor for relative error, guarding division by zero.
const REL_ERROR_EPSILON: f64 = 1e-9;

/// Values closer than this are counted as exact numeric matches.
const EXACT_TOLERANCE: f64 = 1e-12;

/// Per-column quality metrics.
#[derive(Debug, Clone)]
pub struct ColumnQuality {
    /// Column name.
    pub name: String,
    /// Role the column was stored under.
    pub role: ColumnRole,
    /// Whether every value matched exactly.
    pub exact: bool,
    /// Mean relative error across rows (0.0 for exact columns).
    pub mean_rel_error: f64,
    /// Maximum relative error across rows.
    pub max_rel_error: f64,
    /// Mean absolute error.
    pub mae: f64,
    /// Maximum absolute error.
    pub max_abs_error: f64,
    /// Share of the original table's bytes this column accounts for.
    pub byte_share: f64,
}

/// Recommendation to promote a column to a safer role.
#[derive(Debug, Clone)]
pub struct Recommendation {
    /// Column to promote.
    pub column: String,
    /// Role it currently holds.
    pub current: ColumnRole,
    /// Role the gate suggests.
    pub recommended: ColumnRole,
    /// Mean relative error that triggered the recommendation.
    pub mean_rel_error: f64,
}

/// Outcome of one compression event. Ephemeral; surfaced to the caller,
/// never persisted.
#[derive(Debug, Clone, Default)]
pub struct QualityReport {
    /// Weighted similarity score, 0–100.
    pub similarity: f64,
    /// Per-column metrics in table order.
    pub columns: Vec<ColumnQuality>,
    /// Locked columns whose values did not match exactly.
    pub locked_violations: Vec<String>,
    /// Columns recommended for promotion to `Residual` or `Locked`.
    pub recommendations: Vec<Recommendation>,
}

impl QualityReport {
    /// Whether any locked column failed its exactness guarantee.
    pub fn has_locked_violation(&self) -> bool {
        !self.locked_violations.is_empty()
    }
}

/// Size and ratio thresholds consulted by [`decide`].
#[derive(Debug, Clone, Copy)]
pub struct Thresholds {
    /// Files smaller than this many megabytes are stored raw.
    pub min_size_mb: f64,
    /// Minimum original/container size ratio to keep the container.
    pub min_compression_ratio: f64,
}

/// Why the gate rejected a container.
#[derive(Debug, Clone, PartialEq)]
pub enum RejectReason {
    /// A locked column failed exact reconstruction. Never downgraded.
    LockedColumnViolation(String),
    /// The achieved ratio fell below the configured floor.
    RatioBelowThreshold { actual: f64, min: f64 },
    /// The original file is below the size floor.
    BelowMinSize { size_bytes: u64, min_mb: f64 },
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RejectReason::LockedColumnViolation(col) => {
                write!(f, "locked column '{col}' did not reconstruct exactly")
            }
            RejectReason::RatioBelowThreshold { actual, min } => {
                write!(f, "compression ratio {actual:.2}x below minimum {min:.2}x")
            }
            RejectReason::BelowMinSize { size_bytes, min_mb } => {
                write!(
                    f,
                    "file size {:.2} MB below minimum {:.2} MB",
                    *size_bytes as f64 / (1024.0 * 1024.0),
                    min_mb
                )
            }
        }
    }
}

/// Gate verdict for one compression event.
#[derive(Debug, Clone, PartialEq)]
pub enum GateDecision {
    /// Ship the container.
    Accept,
    /// Store the original bytes raw.
    Reject(RejectReason),
}

/// Compare `original` against `reconstructed` under the given role map.
///
/// Locked columns require exact cell equality; any mismatch lands in
/// `locked_violations`. Residual and quantized columns get relative-error
/// metrics; a column whose mean relative error exceeds
/// `uncertainty_threshold` is flagged with a promotion recommendation
/// (`Quantized` → `Residual`, `Residual` → `Locked`). Advisory only; the
/// flag never rejects by itself.
pub fn evaluate(
    original: &Table,
    reconstructed: &Table,
    roles: &BTreeMap<String, ColumnRole>,
    uncertainty_threshold: f64,
) -> Result<QualityReport> {
    if original.columns.len() != reconstructed.columns.len()
        || original.row_count() != reconstructed.row_count()
    {
        return Err(Error::ShapeMismatch {
            expected: format!("{}x{}", original.columns.len(), original.row_count()),
            actual: format!(
                "{}x{}",
                reconstructed.columns.len(),
                reconstructed.row_count()
            ),
        });
    }

    let total_bytes = original.byte_size().max(1) as f64;
    let mut report = QualityReport::default();
    let mut similarity = 0.0;

    for orig in &original.columns {
        let recon = reconstructed.column(&orig.name).ok_or_else(|| Error::ShapeMismatch {
            expected: format!("column '{}'", orig.name),
            actual: "missing".to_string(),
        })?;
        let role = roles.get(&orig.name).copied().unwrap_or(ColumnRole::Locked);
        let byte_share = orig.byte_size() as f64 / total_bytes;

        let quality = match role {
            ColumnRole::Locked => {
                let exact = orig.cells == recon.cells;
                if !exact {
                    report.locked_violations.push(orig.name.clone());
                }
                ColumnQuality {
                    name: orig.name.clone(),
                    role,
                    exact,
                    mean_rel_error: if exact { 0.0 } else { 1.0 },
                    max_rel_error: if exact { 0.0 } else { 1.0 },
                    mae: 0.0,
                    max_abs_error: 0.0,
                    byte_share,
                }
            }
            ColumnRole::Residual | ColumnRole::Quantized => {
                let metrics = numeric_metrics(orig, recon)?;
                if metrics.mean_rel_error > uncertainty_threshold {
                    report.recommendations.push(Recommendation {
                        column: orig.name.clone(),
                        current: role,
                        recommended: match role {
                            ColumnRole::Quantized => ColumnRole::Residual,
                            _ => ColumnRole::Locked,
                        },
                        mean_rel_error: metrics.mean_rel_error,
                    });
                }
                ColumnQuality {
                    name: orig.name.clone(),
                    role,
                    exact: metrics.exact,
                    mean_rel_error: metrics.mean_rel_error,
                    max_rel_error: metrics.max_rel_error,
                    mae: metrics.mae,
                    max_abs_error: metrics.max_abs_error,
                    byte_share,
                }
            }
        };

        let score = if quality.exact {
            100.0
        } else {
            (100.0 * (1.0 - quality.mean_rel_error)).clamp(0.0, 100.0)
        };
        similarity += byte_share * score;
        report.columns.push(quality);
    }

    report.similarity = similarity.clamp(0.0, 100.0);
    Ok(report)
}

struct NumericMetrics {
    exact: bool,
    mean_rel_error: f64,
    max_rel_error: f64,
    mae: f64,
    max_abs_error: f64,
}

fn numeric_metrics(orig: &crate::table::Column, recon: &crate::table::Column) -> Result<NumericMetrics> {
    let (orig_vals, orig_nulls) = orig.numeric_values()?;
    let (recon_vals, recon_nulls) = recon.numeric_values()?;

    let rows = orig_vals.len();
    if rows == 0 {
        return Ok(NumericMetrics {
            exact: true,
            mean_rel_error: 0.0,
            max_rel_error: 0.0,
            mae: 0.0,
            max_abs_error: 0.0,
        });
    }

    let mut rel_sum = 0.0;
    let mut rel_max = 0.0f64;
    let mut abs_sum = 0.0;
    let mut abs_max = 0.0f64;
    let mut exact = orig_nulls == recon_nulls;

    let mut orig_null_iter = orig_nulls.iter().peekable();
    for (row, (&o, &r)) in orig_vals.iter().zip(recon_vals.iter()).enumerate() {
        let orig_is_null = orig_null_iter.peek() == Some(&&(row as u32));
        if orig_is_null {
            orig_null_iter.next();
        }
        let recon_is_null = recon_nulls.binary_search(&(row as u32)).is_ok();
        let (abs_err, rel_err) = if orig_is_null != recon_is_null {
            // Null-ness drift: count as a full-magnitude miss.
            (f64::INFINITY, 1.0)
        } else if orig_is_null {
            (0.0, 0.0)
        } else {
            let abs = (r - o).abs();
            (abs, abs / o.abs().max(REL_ERROR_EPSILON))
        };
        if abs_err > EXACT_TOLERANCE {
            exact = false;
        }
        rel_sum += rel_err;
        rel_max = rel_max.max(rel_err);
        if abs_err.is_finite() {
            abs_sum += abs_err;
            abs_max = abs_max.max(abs_err);
        }
    }

    Ok(NumericMetrics {
        exact,
        mean_rel_error: rel_sum / rows as f64,
        max_rel_error: rel_max,
        mae: abs_sum / rows as f64,
        max_abs_error: abs_max,
    })
}

/// Apply gate policy to a report plus the achieved sizes.
///
/// Rejects when any locked column was violated, when the original is below
/// the size floor, or when the achieved ratio is below the configured
/// minimum, checked in that order; the first reason wins. Raising
/// `min_compression_ratio` can only move outcomes from Accept to Reject.
pub fn decide(
    report: &QualityReport,
    original_size: u64,
    container_size: u64,
    thresholds: &Thresholds,
) -> GateDecision {
    if let Some(col) = report.locked_violations.first() {
        return GateDecision::Reject(RejectReason::LockedColumnViolation(col.clone()));
    }

    let min_bytes = thresholds.min_size_mb * 1024.0 * 1024.0;
    if (original_size as f64) < min_bytes {
        return GateDecision::Reject(RejectReason::BelowMinSize {
            size_bytes: original_size,
            min_mb: thresholds.min_size_mb,
        });
    }

    let ratio = if container_size == 0 {
        0.0
    } else {
        original_size as f64 / container_size as f64
    };
    if ratio < thresholds.min_compression_ratio {
        return GateDecision::Reject(RejectReason::RatioBelowThreshold {
            actual: ratio,
            min: thresholds.min_compression_ratio,
        });
    }

    GateDecision::Accept
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::{Column, Table};

    fn roles_of(pairs: &[(&str, ColumnRole)]) -> BTreeMap<String, ColumnRole> {
        pairs.iter().map(|(n, r)| (n.to_string(), *r)).collect()
    }

    fn table_from(cols: Vec<(&str, Vec<&str>)>) -> Table {
        Table::new(
            cols.into_iter()
                .map(|(name, cells)| {
                    Column::new(name, cells.into_iter().map(String::from).collect())
                })
                .collect(),
        )
        .unwrap()
    }

    #[test]
    fn test_exact_locked_column() {
        let orig = table_from(vec![("id", vec!["1", "2", "3"])]);
        let roles = roles_of(&[("id", ColumnRole::Locked)]);
        let report = evaluate(&orig, &orig.clone(), &roles, 0.2).unwrap();
        assert_eq!(report.similarity, 100.0);
        assert!(report.locked_violations.is_empty());
        assert!(report.columns[0].exact);
    }

    #[test]
    fn test_locked_violation_detected_and_rejected() {
        let orig = table_from(vec![("id", vec!["1", "2"])]);
        let recon = table_from(vec![("id", vec!["1", "99"])]);
        let roles = roles_of(&[("id", ColumnRole::Locked)]);
        let report = evaluate(&orig, &recon, &roles, 0.2).unwrap();
        assert_eq!(report.locked_violations, vec!["id"]);

        let thresholds = Thresholds {
            min_size_mb: 0.0,
            min_compression_ratio: 0.0,
        };
        match decide(&report, 1000, 100, &thresholds) {
            GateDecision::Reject(RejectReason::LockedColumnViolation(col)) => {
                assert_eq!(col, "id")
            }
            other => panic!("expected locked violation, got {other:?}"),
        }
    }

    #[test]
    fn test_high_error_column_flagged_for_residual() {
        // Mean relative error 0.35 against a 0.2 threshold.
        let orig = table_from(vec![("v", vec!["1.0", "1.0", "1.0"])]);
        let recon = table_from(vec![("v", vec!["0.65", "0.65", "0.65"])]);
        let roles = roles_of(&[("v", ColumnRole::Quantized)]);
        let report = evaluate(&orig, &recon, &roles, 0.2).unwrap();

        assert_eq!(report.recommendations.len(), 1);
        let rec = &report.recommendations[0];
        assert_eq!(rec.column, "v");
        assert_eq!(rec.recommended, ColumnRole::Residual);
        assert!((rec.mean_rel_error - 0.35).abs() < 1e-9);
    }

    #[test]
    fn test_residual_breach_recommends_locked() {
        let orig = table_from(vec![("v", vec!["1.0", "1.0"])]);
        let recon = table_from(vec![("v", vec!["0.5", "0.5"])]);
        let roles = roles_of(&[("v", ColumnRole::Residual)]);
        let report = evaluate(&orig, &recon, &roles, 0.2).unwrap();
        assert_eq!(report.recommendations[0].recommended, ColumnRole::Locked);
    }

    #[test]
    fn test_flag_is_advisory_not_rejecting() {
        let orig = table_from(vec![("v", vec!["1.0", "1.0"])]);
        let recon = table_from(vec![("v", vec!["0.5", "0.5"])]);
        let roles = roles_of(&[("v", ColumnRole::Quantized)]);
        let report = evaluate(&orig, &recon, &roles, 0.2).unwrap();
        let thresholds = Thresholds {
            min_size_mb: 0.0,
            min_compression_ratio: 1.5,
        };
        assert_eq!(decide(&report, 1000, 500, &thresholds), GateDecision::Accept);
    }

    #[test]
    fn test_ratio_threshold_monotonicity() {
        let report = QualityReport::default();
        let accept_at = |min: f64| {
            decide(
                &report,
                1000,
                400,
                &Thresholds {
                    min_size_mb: 0.0,
                    min_compression_ratio: min,
                },
            ) == GateDecision::Accept
        };
        // ratio = 2.5; raising the floor only flips Accept -> Reject.
        assert!(accept_at(1.0));
        assert!(accept_at(2.5));
        assert!(!accept_at(2.6));
        assert!(!accept_at(10.0));
    }

    #[test]
    fn test_min_size_floor() {
        let report = QualityReport::default();
        let thresholds = Thresholds {
            min_size_mb: 1.0,
            min_compression_ratio: 1.0,
        };
        // 500 KB input is below the 1 MB floor.
        match decide(&report, 500 * 1024, 100, &thresholds) {
            GateDecision::Reject(RejectReason::BelowMinSize { .. }) => {}
            other => panic!("expected size rejection, got {other:?}"),
        }
    }

    #[test]
    fn test_similarity_weighted_by_byte_share() {
        // A wide exact column and a narrow lossy one: similarity stays high.
        let orig = table_from(vec![
            ("text", vec!["aaaaaaaaaaaaaaaaaaaa", "bbbbbbbbbbbbbbbbbbbb"]),
            ("v", vec!["1.0", "1.0"]),
        ]);
        let recon = table_from(vec![
            ("text", vec!["aaaaaaaaaaaaaaaaaaaa", "bbbbbbbbbbbbbbbbbbbb"]),
            ("v", vec!["0.9", "0.9"]),
        ]);
        let roles = roles_of(&[("text", ColumnRole::Locked), ("v", ColumnRole::Quantized)]);
        let report = evaluate(&orig, &recon, &roles, 0.5).unwrap();
        assert!(report.similarity > 95.0, "similarity {}", report.similarity);
        assert!(report.similarity < 100.0);
    }

    #[test]
    fn test_shape_mismatch_is_error() {
        let orig = table_from(vec![("a", vec!["1"])]);
        let recon = table_from(vec![("a", vec!["1", "2"])]);
        assert!(evaluate(&orig, &recon, &BTreeMap::new(), 0.2).is_err());
    }
}
