//! Binary layout of the `.smp` container.
//!
//! ```text
//! Offset  Size   Field
//! ──────  ────   ─────
//! 0       4      magic ("SMPC")
//! 4       2      version (u16, LE)
//! 6       4      header length (u32, LE)
//! 10      H      header (bincode SmpHeader)
//! ..      8      locked block length (u64, LE)
//! ..      L      locked block (bincode LockedBlock)
//! ..      8      residual block length (u64, LE)
//! ..      R      residual block (bincode ResidualBlock)
//! ..      8      quantized payload length (u64, LE)
//! ..      Q      quantized payload (opaque codec bytes)
//! ```
//!
//! Block order is fixed. The header embeds an xxh3-64 checksum over the
//! locked and residual block bytes; deserialization verifies it and fails
//! hard on mismatch, since the lossless blocks are the system's strongest
//! guarantee. The quantized payload is opaque here; its fidelity is the
//! numeric codec's concern.

use crate::error::{Error, Result};
use sempress_core::{ColumnRole, Dtype, LineEnding};
use serde::{Deserialize, Serialize};
use xxhash_rust::xxh3::xxh3_64;

/// Magic bytes opening a compressed container.
pub const SMP_MAGIC: [u8; 4] = *b"SMPC";

/// Magic bytes opening a raw-passthrough artifact: the original content
/// follows verbatim.
pub const RAW_MAGIC: [u8; 4] = *b"SMPR";

/// Current container format version.
pub const FORMAT_VERSION: u16 = 1;

/// Codec parameters recorded for the quantized payload.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CodecParams {
    /// Codebook size per column.
    pub k: u32,
    /// Column-level uncertainty threshold the payload was gated against.
    pub uncertainty_threshold: f64,
}

/// Per-column metadata: name, role, and inferred dtype, in source order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnMeta {
    /// Column name.
    pub name: String,
    /// Role the column was stored under.
    pub role: ColumnRole,
    /// Inferred dtype, used to re-format reconstructed cells.
    pub dtype: Dtype,
}

/// Container header.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SmpHeader {
    /// Column metadata in original table order.
    pub columns: Vec<ColumnMeta>,
    /// Parameters handed to the numeric codec.
    pub params: CodecParams,
    /// Line-ending convention of the original file.
    pub line_ending: LineEnding,
    /// Whether the original file ended with a newline.
    pub trailing_newline: bool,
    /// Size of the original file in bytes.
    pub original_size: u64,
    /// xxh3-64 of the original file bytes.
    pub content_checksum: u64,
    /// xxh3-64 over the locked + residual block bytes.
    pub lossless_checksum: u64,
}

/// Exact cell text of one locked column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LockedColumn {
    /// Column name.
    pub name: String,
    /// Cell text, verbatim from the source.
    pub cells: Vec<String>,
}

/// Block of locked columns, bit-for-bit recoverable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LockedBlock {
    /// Locked columns in original table order.
    pub columns: Vec<LockedColumn>,
}

/// Correction deltas for one residual column. Reconstruction is
/// `codec output + delta`, bounding the error to f32 rounding of the delta.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResidualColumn {
    /// Column name.
    pub name: String,
    /// One delta per row (0.0 on null rows).
    pub deltas: Vec<f32>,
}

/// Block of residual deltas, bit-for-bit recoverable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResidualBlock {
    /// Residual columns in original table order.
    pub columns: Vec<ResidualColumn>,
}

/// A parsed (or about-to-be-written) `.smp` container.
#[derive(Debug, Clone, PartialEq)]
pub struct SmpContainer {
    /// Header with classification metadata and checksums.
    pub header: SmpHeader,
    /// Locked column data.
    pub locked: LockedBlock,
    /// Residual deltas.
    pub residual: ResidualBlock,
    /// Opaque quantized payload from the numeric codec.
    pub payload: Vec<u8>,
}

impl SmpContainer {
    /// Serialize to container bytes. Computes the lossless checksum over
    /// the serialized locked and residual blocks.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let locked_bytes =
            bincode::serialize(&self.locked).map_err(|e| Error::corrupt(e.to_string()))?;
        let residual_bytes =
            bincode::serialize(&self.residual).map_err(|e| Error::corrupt(e.to_string()))?;

        let mut header = self.header.clone();
        header.lossless_checksum = lossless_checksum(&locked_bytes, &residual_bytes);
        let header_bytes =
            bincode::serialize(&header).map_err(|e| Error::corrupt(e.to_string()))?;
        if header_bytes.len() > u32::MAX as usize {
            return Err(Error::corrupt("header exceeds u32 length prefix"));
        }

        let mut out = Vec::with_capacity(
            10 + header_bytes.len()
                + 24
                + locked_bytes.len()
                + residual_bytes.len()
                + self.payload.len(),
        );
        out.extend_from_slice(&SMP_MAGIC);
        out.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
        out.extend_from_slice(&(header_bytes.len() as u32).to_le_bytes());
        out.extend_from_slice(&header_bytes);
        for block in [&locked_bytes, &residual_bytes, &self.payload] {
            out.extend_from_slice(&(block.len() as u64).to_le_bytes());
            out.extend_from_slice(block);
        }
        Ok(out)
    }

    /// Deserialize container bytes, verifying framing and the lossless
    /// checksum. Never repairs malformed input.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let mut cursor = Cursor::new(bytes);

        let magic = cursor.take(4)?;
        if magic != SMP_MAGIC {
            return Err(Error::corrupt("bad magic bytes"));
        }
        let version = u16::from_le_bytes(cursor.take(2)?.try_into().unwrap_or([0; 2]));
        if version != FORMAT_VERSION {
            return Err(Error::UnsupportedVersion { version });
        }

        let header_len = u32::from_le_bytes(cursor.take(4)?.try_into().unwrap_or([0; 4])) as usize;
        let header_bytes = cursor.take(header_len)?;
        let header: SmpHeader = bincode::deserialize(header_bytes)
            .map_err(|e| Error::corrupt(format!("header: {e}")))?;

        let locked_bytes = cursor.take_block()?;
        let residual_bytes = cursor.take_block()?;
        let payload = cursor.take_block()?.to_vec();
        if !cursor.is_exhausted() {
            return Err(Error::corrupt_at("trailing bytes after payload", cursor.pos));
        }

        let actual = lossless_checksum(locked_bytes, residual_bytes);
        if actual != header.lossless_checksum {
            return Err(Error::ChecksumMismatch {
                expected: header.lossless_checksum,
                actual,
            });
        }

        let locked: LockedBlock = bincode::deserialize(locked_bytes)
            .map_err(|e| Error::corrupt(format!("locked block: {e}")))?;
        let residual: ResidualBlock = bincode::deserialize(residual_bytes)
            .map_err(|e| Error::corrupt(format!("residual block: {e}")))?;

        let container = SmpContainer {
            header,
            locked,
            residual,
            payload,
        };
        container.validate()?;
        Ok(container)
    }

    /// Cross-check that every role in the header is backed by the block
    /// it points at.
    fn validate(&self) -> Result<()> {
        for meta in &self.header.columns {
            let present = match meta.role {
                ColumnRole::Locked => self.locked.columns.iter().any(|c| c.name == meta.name),
                ColumnRole::Residual => self.residual.columns.iter().any(|c| c.name == meta.name),
                // Quantized columns live inside the opaque payload; the
                // numeric codec validates them on decode.
                ColumnRole::Quantized => true,
            };
            if !present {
                return Err(Error::corrupt(format!(
                    "column '{}' has role {} but no matching block entry",
                    meta.name,
                    meta.role.name()
                )));
            }
        }
        Ok(())
    }
}

fn lossless_checksum(locked: &[u8], residual: &[u8]) -> u64 {
    let mut joined = Vec::with_capacity(locked.len() + residual.len());
    joined.extend_from_slice(locked);
    joined.extend_from_slice(residual);
    xxh3_64(&joined)
}

/// Whether `bytes` open with the container magic.
pub fn is_container(bytes: &[u8]) -> bool {
    bytes.len() >= 4 && bytes[..4] == SMP_MAGIC
}

/// Whether `bytes` open with the raw-passthrough marker.
pub fn is_raw_marked(bytes: &[u8]) -> bool {
    bytes.len() >= 4 && bytes[..4] == RAW_MAGIC
}

/// Prefix original content with the raw-passthrough marker.
pub fn wrap_raw(original: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(4 + original.len());
    out.extend_from_slice(&RAW_MAGIC);
    out.extend_from_slice(original);
    out
}

/// Recover the verbatim original from a raw-marked artifact.
pub fn strip_raw_marker(bytes: &[u8]) -> Option<&[u8]> {
    if is_raw_marked(bytes) {
        Some(&bytes[4..])
    } else {
        None
    }
}

/// Bounds-checked reader over the container bytes.
struct Cursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Cursor { bytes, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.pos + n > self.bytes.len() {
            return Err(Error::corrupt_at(
                format!("truncated: need {n} bytes"),
                self.pos,
            ));
        }
        let slice = &self.bytes[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn take_block(&mut self) -> Result<&'a [u8]> {
        let len = u64::from_le_bytes(self.take(8)?.try_into().unwrap_or([0; 8]));
        if len > (self.bytes.len() - self.pos) as u64 {
            return Err(Error::corrupt_at(
                format!("block length {len} exceeds remaining input"),
                self.pos - 8,
            ));
        }
        self.take(len as usize)
    }

    fn is_exhausted(&self) -> bool {
        self.pos == self.bytes.len()
    }
}
