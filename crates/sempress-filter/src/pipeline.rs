//! The clean/smudge pipeline.
//!
//! `clean` turns CSV bytes into a `.smp` container when the quality gate
//! accepts, and into raw-marked original bytes when it rejects; rejection
//! is a logged policy outcome, never an error. `smudge` inverts whichever
//! artifact it is handed. Content that carries neither the container magic
//! nor the raw marker passes through both directions untouched.
//!
//! Fatal conditions (non-zero exit at the CLI): unparseable input on clean,
//! corrupt or unsupported containers on smudge, bad configuration.

use crate::config::Config;
use crate::error::Result;
use sempress_cache::{CacheStore, Fingerprint};
use sempress_container::{
    is_container, strip_raw_marker, wrap_raw, CodecParams, ColumnMeta, LockedBlock, LockedColumn,
    ResidualBlock, ResidualColumn, SmpContainer, SmpHeader,
};
use sempress_core::{
    classify, decide, evaluate, Column, ColumnRole, CompressionStats, GateDecision, QualityReport,
    Table,
};
use sempress_vq::NumericColumn;
use std::collections::BTreeMap;
use tracing::{debug, info, warn};
use xxhash_rust::xxh3::xxh3_64;

/// Outcome of one clean invocation.
#[derive(Debug)]
pub struct CleanOutcome {
    /// Bytes to hand to Git.
    pub bytes: Vec<u8>,
    /// Whether the original was stored raw (gate rejection or size floor).
    pub stored_raw: bool,
    /// Whether the container came from the cache.
    pub cache_hit: bool,
    /// Quality report, when a compression attempt ran to completion.
    pub report: Option<QualityReport>,
    /// Sizes and similarity for logging.
    pub stats: CompressionStats,
}

/// Sequences the classifier, codec, container, gate, and cache.
pub struct FilterPipeline {
    config: Config,
    cache: Option<CacheStore>,
    config_fingerprint_input: Vec<u8>,
}

impl FilterPipeline {
    /// Build a pipeline from a loaded configuration. Opens the cache if
    /// enabled; an unopenable cache degrades to no cache.
    pub fn new(config: Config) -> Result<Self> {
        let config_fingerprint_input = config.canonical_bytes()?;
        let cache = if config.cache.enabled {
            sempress_cache::open_best_effort(
                &config.cache.dir,
                config.cache.max_size_mb * 1024 * 1024,
                config.cache.max_entries,
            )
        } else {
            None
        };
        Ok(FilterPipeline {
            config,
            cache,
            config_fingerprint_input,
        })
    }

    /// Compress CSV bytes for storage.
    pub fn clean(&mut self, raw: &[u8]) -> Result<CleanOutcome> {
        if raw.is_empty() {
            return Ok(CleanOutcome {
                bytes: Vec::new(),
                stored_raw: false,
                cache_hit: false,
                report: None,
                stats: CompressionStats::default(),
            });
        }

        let min_bytes = self.config.thresholds.min_size_mb * 1024.0 * 1024.0;
        if (raw.len() as f64) < min_bytes {
            info!(
                "{} bytes below {:.2} MB floor, storing raw",
                raw.len(),
                self.config.thresholds.min_size_mb
            );
            return Ok(self.raw_outcome(raw, false));
        }

        let fingerprint = Fingerprint::compute(raw, &self.config_fingerprint_input);
        if let Some(bytes) = self.cache_lookup(&fingerprint) {
            debug!("cache hit for {fingerprint}");
            let stats = CompressionStats {
                original_size: raw.len(),
                stored_size: bytes.len(),
                similarity: 0.0,
                stored_raw: false,
            };
            return Ok(CleanOutcome {
                bytes,
                stored_raw: false,
                cache_hit: true,
                report: None,
                stats,
            });
        }

        let table = Table::parse_csv(raw)?;
        // The emitter writes one canonical serialization (uniform line
        // endings, minimal quoting). Input that does not match it cannot
        // round-trip byte-exactly through a container, so store it raw.
        if table.to_csv() != raw {
            info!("input is not canonically serialized, storing raw");
            return Ok(self.raw_outcome(raw, false));
        }
        let roles = classify(&table, &self.config.classify_config())?;

        let (container_bytes, report) = self.compress(&table, &roles, raw)?;
        let decision = decide(
            &report,
            raw.len() as u64,
            container_bytes.len() as u64,
            &self.config.thresholds(),
        );

        match decision {
            GateDecision::Accept => {
                self.cache_store(&fingerprint, &container_bytes);
                let stats = CompressionStats {
                    original_size: raw.len(),
                    stored_size: container_bytes.len(),
                    similarity: report.similarity,
                    stored_raw: false,
                };
                info!("accepted: {}", stats.summary());
                Ok(CleanOutcome {
                    bytes: container_bytes,
                    stored_raw: false,
                    cache_hit: false,
                    report: Some(report),
                    stats,
                })
            }
            GateDecision::Reject(reason) => {
                info!("rejected, storing raw: {reason}");
                let mut outcome = self.raw_outcome(raw, false);
                outcome.stats.similarity = report.similarity;
                outcome.report = Some(report);
                Ok(outcome)
            }
        }
    }

    /// Restore working-tree bytes from a stored artifact.
    pub fn smudge(&self, stored: &[u8]) -> Result<Vec<u8>> {
        if let Some(original) = strip_raw_marker(stored) {
            debug!("raw-marked artifact, {} bytes", original.len());
            return Ok(original.to_vec());
        }
        if !is_container(stored) {
            // Content Git never cleaned (or an empty file): pass through.
            debug!("no marker, passing {} bytes through", stored.len());
            return Ok(stored.to_vec());
        }

        let container = SmpContainer::from_bytes(stored)?;
        let table = reassemble(&container)?;
        Ok(table.to_csv())
    }

    /// Encode the table and produce the container bytes plus the quality
    /// report for the exact reconstruction a later smudge will see.
    fn compress(
        &self,
        table: &Table,
        roles: &BTreeMap<String, ColumnRole>,
        raw: &[u8],
    ) -> Result<(Vec<u8>, QualityReport)> {
        let params = self.config.vq_params();

        let mut locked = LockedBlock::default();
        let mut numeric_inputs: Vec<NumericColumn> = Vec::new();
        for col in &table.columns {
            match roles[&col.name] {
                ColumnRole::Locked => locked.columns.push(LockedColumn {
                    name: col.name.clone(),
                    cells: col.cells.clone(),
                }),
                ColumnRole::Residual | ColumnRole::Quantized => {
                    let (values, nulls) = col.numeric_values()?;
                    numeric_inputs.push(NumericColumn {
                        name: col.name.clone(),
                        values,
                        nulls,
                    });
                }
            }
        }

        let payload = sempress_vq::encode(&numeric_inputs, &params)?;
        // Decode the payload we just produced: the gate must judge the
        // reconstruction a smudge will actually compute.
        let decoded = sempress_vq::decode(&payload)?;
        let decoded_by_name: BTreeMap<&str, &NumericColumn> =
            decoded.iter().map(|c| (c.name.as_str(), c)).collect();

        let mut residual = ResidualBlock::default();
        let mut recon_columns = Vec::with_capacity(table.columns.len());
        for col in &table.columns {
            match roles[&col.name] {
                ColumnRole::Locked => recon_columns.push(col.clone()),
                ColumnRole::Quantized => {
                    let dec = decoded_column(&decoded_by_name, &col.name)?;
                    recon_columns.push(Column::from_numeric(
                        &col.name,
                        col.dtype,
                        &dec.values,
                        &dec.nulls,
                    ));
                }
                ColumnRole::Residual => {
                    let dec = decoded_column(&decoded_by_name, &col.name)?;
                    let (orig_values, _) = col.numeric_values()?;
                    let deltas: Vec<f32> = orig_values
                        .iter()
                        .zip(dec.values.iter())
                        .map(|(o, d)| (o - d) as f32)
                        .collect();
                    let corrected: Vec<f64> = dec
                        .values
                        .iter()
                        .zip(deltas.iter())
                        .map(|(d, delta)| d + f64::from(*delta))
                        .collect();
                    recon_columns.push(Column::from_numeric(
                        &col.name,
                        col.dtype,
                        &corrected,
                        &dec.nulls,
                    ));
                    residual.columns.push(ResidualColumn {
                        name: col.name.clone(),
                        deltas,
                    });
                }
            }
        }

        let mut reconstructed = Table::new(recon_columns)?;
        reconstructed.line_ending = table.line_ending;
        reconstructed.trailing_newline = table.trailing_newline;

        let report = evaluate(
            table,
            &reconstructed,
            roles,
            self.config.compression.uncertainty_threshold,
        )?;

        let header = SmpHeader {
            columns: table
                .columns
                .iter()
                .map(|col| ColumnMeta {
                    name: col.name.clone(),
                    role: roles[&col.name],
                    dtype: col.dtype,
                })
                .collect(),
            params: CodecParams {
                k: params.k,
                uncertainty_threshold: params.uncertainty_threshold,
            },
            line_ending: table.line_ending,
            trailing_newline: table.trailing_newline,
            original_size: raw.len() as u64,
            content_checksum: xxh3_64(raw),
            lossless_checksum: 0,
        };
        let container = SmpContainer {
            header,
            locked,
            residual,
            payload,
        };
        Ok((container.to_bytes()?, report))
    }

    fn raw_outcome(&self, raw: &[u8], cache_hit: bool) -> CleanOutcome {
        let bytes = wrap_raw(raw);
        let stats = CompressionStats {
            original_size: raw.len(),
            stored_size: bytes.len(),
            similarity: 100.0,
            stored_raw: true,
        };
        CleanOutcome {
            bytes,
            stored_raw: true,
            cache_hit,
            report: None,
            stats,
        }
    }

    fn cache_lookup(&mut self, fingerprint: &Fingerprint) -> Option<Vec<u8>> {
        let cache = self.cache.as_mut()?;
        match cache.lookup(fingerprint) {
            Ok(hit) => hit,
            Err(e) => {
                warn!("cache lookup failed, recomputing: {e}");
                None
            }
        }
    }

    fn cache_store(&mut self, fingerprint: &Fingerprint, container: &[u8]) {
        if let Some(cache) = self.cache.as_mut() {
            if let Err(e) = cache.store(fingerprint, container) {
                warn!("cache store failed: {e}");
            }
        }
    }
}

/// Rebuild the table a container describes, in recorded column order.
fn reassemble(container: &SmpContainer) -> Result<Table> {
    let payload_columns = sempress_vq::decode(&container.payload)?;
    let by_name: BTreeMap<&str, &NumericColumn> =
        payload_columns.iter().map(|c| (c.name.as_str(), c)).collect();

    let mut columns = Vec::with_capacity(container.header.columns.len());
    for meta in &container.header.columns {
        let column = match meta.role {
            ColumnRole::Locked => {
                let locked = container
                    .locked
                    .columns
                    .iter()
                    .find(|c| c.name == meta.name)
                    .ok_or_else(|| {
                        sempress_container::Error::corrupt(format!(
                            "locked column '{}' missing from block",
                            meta.name
                        ))
                    })?;
                Column::new(&meta.name, locked.cells.clone())
            }
            ColumnRole::Quantized => {
                let dec = decoded_column(&by_name, &meta.name)?;
                Column::from_numeric(&meta.name, meta.dtype, &dec.values, &dec.nulls)
            }
            ColumnRole::Residual => {
                let dec = decoded_column(&by_name, &meta.name)?;
                let deltas = container
                    .residual
                    .columns
                    .iter()
                    .find(|c| c.name == meta.name)
                    .ok_or_else(|| {
                        sempress_container::Error::corrupt(format!(
                            "residual column '{}' missing from block",
                            meta.name
                        ))
                    })?;
                if deltas.deltas.len() != dec.values.len() {
                    return Err(sempress_container::Error::corrupt(format!(
                        "residual column '{}': {} deltas for {} rows",
                        meta.name,
                        deltas.deltas.len(),
                        dec.values.len()
                    ))
                    .into());
                }
                let corrected: Vec<f64> = dec
                    .values
                    .iter()
                    .zip(deltas.deltas.iter())
                    .map(|(d, delta)| d + f64::from(*delta))
                    .collect();
                Column::from_numeric(&meta.name, meta.dtype, &corrected, &dec.nulls)
            }
        };
        columns.push(column);
    }

    let mut table = Table::new(columns)?;
    table.line_ending = container.header.line_ending;
    table.trailing_newline = container.header.trailing_newline;
    Ok(table)
}

fn decoded_column<'a>(
    by_name: &BTreeMap<&str, &'a NumericColumn>,
    name: &str,
) -> Result<&'a NumericColumn> {
    by_name.get(name).copied().ok_or_else(|| {
        sempress_container::Error::corrupt(format!("column '{name}' missing from payload")).into()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ThresholdConfig;
    use sempress_container::is_raw_marked;

    fn pipeline_with(config: Config) -> FilterPipeline {
        let mut config = config;
        config.cache.enabled = false;
        FilterPipeline::new(config).unwrap()
    }

    fn permissive_config() -> Config {
        Config {
            thresholds: ThresholdConfig {
                min_size_mb: 0.0,
                min_compression_ratio: 0.0,
            },
            ..Config::default()
        }
    }

    #[test]
    fn test_empty_input_is_empty_output() {
        let mut p = pipeline_with(permissive_config());
        let outcome = p.clean(b"").unwrap();
        assert!(outcome.bytes.is_empty());
        assert_eq!(p.smudge(b"").unwrap(), b"");
    }

    #[test]
    fn test_malformed_csv_is_fatal() {
        let mut p = pipeline_with(permissive_config());
        assert!(p.clean(b"a,b\n1\n").is_err());
    }

    #[test]
    fn test_clean_smudge_roundtrip() {
        let mut csv = String::from("id,temp\n");
        for i in 0..200 {
            csv.push_str(&format!("{},{}\n", i, 20.0 + (i % 50) as f64 * 0.1));
        }
        let mut p = pipeline_with(permissive_config());
        let outcome = p.clean(csv.as_bytes()).unwrap();
        assert!(!outcome.stored_raw);
        assert!(is_container(&outcome.bytes));

        let restored = p.smudge(&outcome.bytes).unwrap();
        let orig = Table::parse_csv(csv.as_bytes()).unwrap();
        let back = Table::parse_csv(&restored).unwrap();
        // id auto-locks, temp has <= 64 distinct values: exact both ways.
        assert_eq!(orig, back);
    }

    #[test]
    fn test_small_file_stored_raw_and_restored() {
        let csv = b"a,b\n1,2\n";
        let mut config = permissive_config();
        config.thresholds.min_size_mb = 1.0;
        let mut p = pipeline_with(config);

        let outcome = p.clean(csv).unwrap();
        assert!(outcome.stored_raw);
        assert!(is_raw_marked(&outcome.bytes));
        assert_eq!(p.smudge(&outcome.bytes).unwrap(), csv);
    }

    #[test]
    fn test_mixed_line_endings_stored_raw_and_restored() {
        // Parses fine (and all columns lock), but re-emission would force a
        // uniform terminator, so the original bytes must be kept.
        let csv = b"name,city\nalice,berlin\r\nbob,paris\n";
        let mut p = pipeline_with(permissive_config());

        let outcome = p.clean(csv).unwrap();
        assert!(outcome.stored_raw);
        assert!(is_raw_marked(&outcome.bytes));
        assert_eq!(p.smudge(&outcome.bytes).unwrap(), csv);
    }

    #[test]
    fn test_superfluous_quoting_stored_raw_and_restored() {
        let csv = b"a,b\n\"1\",2\n";
        let mut p = pipeline_with(permissive_config());

        let outcome = p.clean(csv).unwrap();
        assert!(outcome.stored_raw);
        assert_eq!(p.smudge(&outcome.bytes).unwrap(), csv);
    }

    #[test]
    fn test_unmarked_content_passes_through() {
        let p = pipeline_with(permissive_config());
        let plain = b"just some text Git never cleaned\n";
        assert_eq!(p.smudge(plain).unwrap(), plain);
    }

    #[test]
    fn test_corrupt_container_is_fatal_on_smudge() {
        let mut csv = String::from("id,v\n");
        for i in 0..100 {
            csv.push_str(&format!("{i},{}\n", (i % 10) as f64 * 1.5));
        }
        let mut p = pipeline_with(permissive_config());
        let mut bytes = p.clean(csv.as_bytes()).unwrap().bytes;
        assert!(is_container(&bytes));
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;
        assert!(p.smudge(&bytes).is_err());
    }

    #[test]
    fn test_clean_is_deterministic() {
        let mut csv = String::from("id,v\n");
        for i in 0..300 {
            csv.push_str(&format!("{i},{}\n", ((i * 17) % 40) as f64 * 0.25));
        }
        let mut p = pipeline_with(permissive_config());
        let a = p.clean(csv.as_bytes()).unwrap().bytes;
        let b = p.clean(csv.as_bytes()).unwrap().bytes;
        assert_eq!(a, b);
    }

    #[test]
    fn test_residual_columns_get_delta_block() {
        let mut csv = String::from("id,amount\n");
        for i in 0..150 {
            csv.push_str(&format!("{i},{}\n", (i as f64) * 0.013 + 100.0));
        }
        let mut config = permissive_config();
        config.compression.residual_cols = vec!["amount".to_string()];
        let mut p = pipeline_with(config);

        let outcome = p.clean(csv.as_bytes()).unwrap();
        let container = SmpContainer::from_bytes(&outcome.bytes).unwrap();
        assert_eq!(container.residual.columns.len(), 1);
        assert_eq!(container.residual.columns[0].name, "amount");

        // f32 deltas keep the reconstruction within float-rounding of the
        // original values.
        let restored = p.smudge(&outcome.bytes).unwrap();
        let orig = Table::parse_csv(csv.as_bytes()).unwrap();
        let back = Table::parse_csv(&restored).unwrap();
        let (ov, _) = orig.column("amount").unwrap().numeric_values().unwrap();
        let (bv, _) = back.column("amount").unwrap().numeric_values().unwrap();
        for (o, b) in ov.iter().zip(bv.iter()) {
            assert!((o - b).abs() < 1e-4, "{o} vs {b}");
        }
    }
}
