//! # Sempress Filter
//!
//! Git clean/smudge orchestration for semantic tabular compression: loads
//! `.sempress.yml`, sequences the classifier, numeric codec, container
//! codec, quality gate, and cache, and backs the `sempress` binary.

pub mod config;
pub mod error;
pub mod pipeline;
pub mod report;

pub use config::Config;
pub use error::{FilterError, Result};
pub use pipeline::{CleanOutcome, FilterPipeline};
