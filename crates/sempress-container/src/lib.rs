//! # Sempress Container
//!
//! The `.smp` on-disk format: a versioned, checksummed frame around the
//! three column blocks a compressed table splits into: exact locked cells,
//! residual correction deltas, and the opaque quantized payload.
//!
//! Framing is lossless by construction. Whatever fidelity the quantized
//! payload gives up is the numeric codec's business; this crate guarantees
//! only that the bytes written are the bytes read back, or a hard error.

pub mod error;
pub mod format;

pub use error::{Error, Result};
pub use format::{
    is_container, is_raw_marked, strip_raw_marker, wrap_raw, CodecParams, ColumnMeta, LockedBlock,
    LockedColumn, ResidualBlock, ResidualColumn, SmpContainer, SmpHeader, FORMAT_VERSION,
    RAW_MAGIC, SMP_MAGIC,
};
