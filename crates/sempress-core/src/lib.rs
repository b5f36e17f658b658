//! # Sempress Core
//!
//! Table model, column classifier, and quality gate for the Sempress
//! semantic-compression Git filter.
//!
//! This crate is pure: it operates on byte slices and borrowed tables,
//! performs no I/O, and retains no state across invocations. The filter
//! orchestrator (`sempress-filter`) sequences these pieces around the
//! numeric codec (`sempress-vq`) and the container codec
//! (`sempress-container`).
//!
//! ## Pieces
//!
//! - [`Table`]: ordered named columns over typed cells, strict CSV
//!   parse/emit with byte-exact cells for locked columns
//! - [`classify`]: partition columns into `Locked` / `Residual` /
//!   `Quantized` roles from configuration plus auto-lock heuristics
//! - [`evaluate`] / [`decide`]: compare original vs. reconstruction and
//!   apply the accept/reject policy

pub mod classify;
pub mod error;
pub mod quality;
pub mod stats;
pub mod table;

pub use classify::{classify, ClassifyConfig, ColumnRole};
pub use error::{Error, Result};
pub use quality::{
    decide, evaluate, ColumnQuality, GateDecision, QualityReport, Recommendation, RejectReason,
    Thresholds,
};
pub use stats::CompressionStats;
pub use table::{Column, Dtype, LineEnding, Table};
