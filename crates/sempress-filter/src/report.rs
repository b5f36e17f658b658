//! Human-readable rendering of quality reports.

use sempress_core::{ColumnRole, QualityReport};
use std::fmt::Write;

/// Render a report for terminal output (`sempress check`, verbose clean).
pub fn render(report: &QualityReport) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "similarity: {:.2}%", report.similarity);
    let _ = writeln!(out);
    let _ = writeln!(
        out,
        "{:<24} {:<10} {:>8} {:>12} {:>12} {:>12} {:>12}",
        "column", "role", "exact", "mean rel err", "max rel err", "mae", "max abs err"
    );
    for col in &report.columns {
        if col.exact {
            let _ = writeln!(
                out,
                "{:<24} {:<10} {:>8} {:>12} {:>12} {:>12} {:>12}",
                col.name,
                col.role.name(),
                "yes",
                "-",
                "-",
                "-",
                "-"
            );
        } else {
            let _ = writeln!(
                out,
                "{:<24} {:<10} {:>8} {:>12.4} {:>12.4} {:>12.4} {:>12.4}",
                col.name,
                col.role.name(),
                "no",
                col.mean_rel_error,
                col.max_rel_error,
                col.mae,
                col.max_abs_error
            );
        }
    }

    if !report.locked_violations.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(
            out,
            "LOCKED VIOLATIONS: {}",
            report.locked_violations.join(", ")
        );
    }

    if !report.recommendations.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "recommendations:");
        for rec in &report.recommendations {
            let hint = match rec.recommended {
                ColumnRole::Residual => format!("add '{}' to residual_cols", rec.column),
                ColumnRole::Locked => format!("add '{}' to lock_cols", rec.column),
                ColumnRole::Quantized => continue,
            };
            let _ = writeln!(
                out,
                "  {} (mean rel err {:.4} over threshold): {hint}",
                rec.column, rec.mean_rel_error
            );
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use sempress_core::{ColumnQuality, Recommendation};

    #[test]
    fn test_render_mentions_violations_and_recommendations() {
        let report = QualityReport {
            similarity: 87.5,
            columns: vec![ColumnQuality {
                name: "temp".into(),
                role: ColumnRole::Quantized,
                exact: false,
                mean_rel_error: 0.35,
                max_rel_error: 0.5,
                mae: 1.2,
                max_abs_error: 2.0,
                byte_share: 1.0,
            }],
            locked_violations: vec!["id".into()],
            recommendations: vec![Recommendation {
                column: "temp".into(),
                current: ColumnRole::Quantized,
                recommended: ColumnRole::Residual,
                mean_rel_error: 0.35,
            }],
        };
        let text = render(&report);
        assert!(text.contains("87.50%"));
        assert!(text.contains("LOCKED VIOLATIONS: id"));
        assert!(text.contains("residual_cols"));
        assert!(text.contains("0.3500"));
        // Both absolute-error metrics appear alongside the relative ones.
        assert!(text.contains("1.2000"));
        assert!(text.contains("2.0000"));
    }

    #[test]
    fn test_render_exact_column() {
        let report = QualityReport {
            similarity: 100.0,
            columns: vec![ColumnQuality {
                name: "id".into(),
                role: ColumnRole::Locked,
                exact: true,
                mean_rel_error: 0.0,
                max_rel_error: 0.0,
                mae: 0.0,
                max_abs_error: 0.0,
                byte_share: 1.0,
            }],
            locked_violations: vec![],
            recommendations: vec![],
        };
        let text = render(&report);
        assert!(text.contains("100.00%"));
        assert!(!text.contains("VIOLATIONS"));
    }
}
