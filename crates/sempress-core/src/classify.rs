//! Column role assignment.
//!
//! Every column gets exactly one [`ColumnRole`] before a container is built:
//!
//! - `Locked`: must round-trip exactly; stored verbatim.
//! - `Residual`: quantized with an exact per-row correction delta retained.
//! - `Quantized`: fidelity delegated entirely to the numeric codec.
//!
//! Roles carry no behavior; the container codec and the quality gate match
//! on them where it matters.

use crate::error::{Error, Result};
use crate::table::Table;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Role assigned to a column for the lifetime of one container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ColumnRole {
    /// Exact round-trip required.
    Locked,
    /// Approximate with a tracked correction delta.
    Residual,
    /// Approximate, codec fidelity only.
    Quantized,
}

impl ColumnRole {
    /// Role name for logs and reports.
    pub fn name(self) -> &'static str {
        match self {
            ColumnRole::Locked => "locked",
            ColumnRole::Residual => "residual",
            ColumnRole::Quantized => "quantized",
        }
    }
}

/// Inputs to classification, taken from the user configuration.
#[derive(Debug, Clone, Default)]
pub struct ClassifyConfig {
    /// Columns forced to `Locked`.
    pub lock_cols: Vec<String>,
    /// Columns forced to `Residual`.
    pub residual_cols: Vec<String>,
    /// Enable identifier/timestamp detection.
    pub auto_lock: bool,
}

/// Uniqueness ratio at or above which an integer column is treated as an
/// identifier and auto-locked.
const ID_UNIQUENESS_RATIO: f64 = 0.95;

/// Assign a role to every column.
///
/// `lock_cols` and `residual_cols` win unconditionally; a name in either
/// list that does not exist in the table is a [`Error::Config`], reported
/// rather than ignored. Non-numeric columns are always locked, since the
/// codec only accepts numeric input. With `auto_lock`, integer columns that are
/// near-unique or strictly increasing are promoted to `Locked` as well.
/// Everything else numeric defaults to `Quantized`.
///
/// Pure function: borrows the table, retains nothing.
pub fn classify(table: &Table, config: &ClassifyConfig) -> Result<BTreeMap<String, ColumnRole>> {
    let missing: Vec<&str> = config
        .lock_cols
        .iter()
        .chain(config.residual_cols.iter())
        .filter(|name| table.column(name).is_none())
        .map(String::as_str)
        .collect();
    if !missing.is_empty() {
        return Err(Error::config(format!(
            "unknown column(s) in lock_cols/residual_cols: {}",
            missing.join(", ")
        )));
    }

    let mut roles = BTreeMap::new();
    for col in &table.columns {
        let role = if config.lock_cols.iter().any(|n| n == &col.name) {
            ColumnRole::Locked
        } else if config.residual_cols.iter().any(|n| n == &col.name) {
            if !col.is_numeric() {
                return Err(Error::config(format!(
                    "residual_cols entry '{}' is not a numeric column",
                    col.name
                )));
            }
            ColumnRole::Residual
        } else if !col.is_numeric() {
            ColumnRole::Locked
        } else if config.auto_lock && looks_like_identifier(col) {
            ColumnRole::Locked
        } else {
            ColumnRole::Quantized
        };
        roles.insert(col.name.clone(), role);
    }
    Ok(roles)
}

/// Heuristic for key/timestamp columns: integer dtype plus either a
/// near-unique value distribution or a strictly increasing sequence.
fn looks_like_identifier(col: &crate::table::Column) -> bool {
    if col.dtype != crate::table::Dtype::Int {
        return false;
    }
    col.distinct_ratio() >= ID_UNIQUENESS_RATIO || col.is_strictly_increasing()
}
