//! Job orchestration: input → enrichment → chunks → coalesced output.

use crate::audio::AudioFeatureFetcher;
use crate::catalog::CatalogClient;
use crate::chunks::{ChunkCoalescer, ChunkedOutputWriter, CoalesceOutcome};
use crate::config::PipelineConfig;
use crate::error::{EnrichError, Result};
use crate::lyrics::{LyricsResolver, PageFetcher};
use crate::manifest::ChunkEntry;
use crate::models::{EnrichStats, EnrichmentRecord, InputPair, Provenance};
use crate::progress::{create_progress_bar, format_duration, log_progress, LOG_INTERVAL};
use crate::record::EnrichmentRecordBuilder;
use crate::resolver::QueryFallbackResolver;
use crate::safety::validate_output_layout;
use crate::slug::SlugVariantGenerator;
use log::{info, warn};
use rayon::prelude::*;
use rayon::ThreadPool;
use std::fs::File;
use std::path::Path;
use std::time::Instant;

// ============================================================================
// Input
// ============================================================================

fn open_input(path: &Path, has_headers: bool) -> Result<csv::Reader<File>> {
    Ok(csv::ReaderBuilder::new()
        .has_headers(has_headers)
        .flexible(true)
        .from_path(path)?)
}

/// Column 0 is the track, column 1 the artist. Short rows yield empty names
/// and invalid UTF-8 is replaced, so every data row becomes a pair.
fn pair_from_row(row: &csv::ByteRecord) -> InputPair {
    let field = |i: usize| {
        row.get(i)
            .map(|bytes| String::from_utf8_lossy(bytes).trim().to_string())
            .unwrap_or_default()
    };
    InputPair::new(field(0), field(1))
}

/// Number of data rows in the input.
pub fn count_input_rows(path: &Path, has_headers: bool) -> Result<u64> {
    let mut reader = open_input(path, has_headers)?;
    let mut row = csv::ByteRecord::new();
    let mut count = 0u64;
    while reader.read_byte_record(&mut row)? {
        count += 1;
    }
    Ok(count)
}

/// Dedicated pool for parallel enrichment; `None` when rows run on the
/// calling thread.
fn worker_pool(workers: usize) -> Result<Option<ThreadPool>> {
    if workers <= 1 {
        return Ok(None);
    }
    rayon::ThreadPoolBuilder::new()
        .num_threads(workers)
        .build()
        .map(Some)
        .map_err(|e| EnrichError::InvalidConfig(format!("worker pool: {}", e)))
}

// ============================================================================
// Orchestrator
// ============================================================================

/// Result of one run.
#[derive(Debug, Clone)]
pub struct PipelineOutcome {
    pub stats: EnrichStats,
    /// All committed chunks of the job, in sequence order.
    pub chunks: Vec<ChunkEntry>,
    pub coalesce: Option<CoalesceOutcome>,
}

pub struct PipelineOrchestrator<'a> {
    config: PipelineConfig,
    catalog: &'a dyn CatalogClient,
    pages: &'a dyn PageFetcher,
}

impl<'a> PipelineOrchestrator<'a> {
    /// Orchestrator for one job over the given capabilities.
    pub fn new(config: PipelineConfig, catalog: &'a dyn CatalogClient, pages: &'a dyn PageFetcher) -> Self {
        Self {
            config,
            catalog,
            pages,
        }
    }

    fn builder(&self) -> EnrichmentRecordBuilder<'a> {
        let retry = self.config.retry.clone();
        EnrichmentRecordBuilder::new(
            QueryFallbackResolver::new(self.catalog, self.config.catalog.clone(), retry.clone()),
            AudioFeatureFetcher::new(self.catalog, retry.clone()),
            LyricsResolver::new(
                self.pages,
                SlugVariantGenerator::new(self.config.lyrics.fold_ascii),
                &self.config.lyrics.base_url,
                retry,
            ),
        )
    }

    /// Runs the job to completion, resuming after whatever chunks the output
    /// directory already holds.
    pub fn run(&self) -> Result<PipelineOutcome> {
        let config = &self.config;
        config.validate()?;
        validate_output_layout(&config.input, &config.output_dir)?;

        let start = Instant::now();
        let total_rows = count_input_rows(&config.input, config.has_headers)?;

        let mut writer = ChunkedOutputWriter::open(&config.output_dir, config.chunk_size)?;
        writer.manifest().set_input_path(&config.input)?;
        let checkpoint = writer.checkpoint();

        let mut stats = EnrichStats {
            rows_skipped_by_resume: checkpoint.rows_to_skip.min(total_rows) as usize,
            ..Default::default()
        };
        if checkpoint.rows_to_skip > total_rows {
            warn!(
                "Output already covers {} rows but {} has only {}",
                checkpoint.rows_to_skip,
                config.input.display(),
                total_rows
            );
        }
        info!(
            "Enriching {} of {} rows from {} ({} per chunk, {} worker(s))",
            total_rows.saturating_sub(checkpoint.rows_to_skip),
            total_rows,
            config.input.display(),
            config.chunk_size,
            config.workers
        );

        let pool = worker_pool(config.workers)?;
        let builder = self.builder();

        let pb = create_progress_bar(total_rows, "Enriching");
        pb.set_position(stats.rows_skipped_by_resume as u64);

        let mut reader = open_input(&config.input, config.has_headers)?;
        let mut row = csv::ByteRecord::new();
        let mut row_index = 0u64;
        let mut batch: Vec<InputPair> = Vec::with_capacity(config.chunk_size);

        loop {
            let more = reader.read_byte_record(&mut row)?;
            if more {
                row_index += 1;
                if row_index <= checkpoint.rows_to_skip {
                    continue;
                }
                batch.push(pair_from_row(&row));
            }
            if batch.len() == config.chunk_size || (!more && !batch.is_empty()) {
                let enriched: Vec<(EnrichmentRecord, Provenance)> = match &pool {
                    Some(pool) => {
                        pool.install(|| batch.par_iter().map(|pair| builder.build(pair)).collect())
                    }
                    None => batch.iter().map(|pair| builder.build(pair)).collect(),
                };
                self.write_batch(&mut writer, enriched, &mut stats, total_rows, &pb)?;
                batch.clear();
            }
            if !more {
                break;
            }
        }
        pb.finish_and_clear();

        let summary = writer.finish()?;
        stats.chunks_written = summary.written_this_run;

        let coalesce = if config.coalesce {
            let outcome = ChunkCoalescer::new(&config.output_dir).coalesce_entries(&summary.chunks)?;
            stats.coalesced = matches!(outcome, CoalesceOutcome::Written { .. });
            Some(outcome)
        } else {
            None
        };

        info!(
            "Done in {}: {} rows enriched, {} catalog matches, {} with lyrics, {} chunk(s) written",
            format_duration(start.elapsed()),
            stats.rows_processed,
            stats.catalog_matches(),
            stats.lyrics_input_names + stats.lyrics_catalog_names,
            stats.chunks_written
        );

        Ok(PipelineOutcome {
            stats,
            chunks: summary.chunks,
            coalesce,
        })
    }

    /// Appends one enriched batch in input order. Only this thread touches the
    /// writer.
    fn write_batch(
        &self,
        writer: &mut ChunkedOutputWriter,
        enriched: Vec<(EnrichmentRecord, Provenance)>,
        stats: &mut EnrichStats,
        total_rows: u64,
        pb: &indicatif::ProgressBar,
    ) -> Result<()> {
        for (record, provenance) in enriched {
            stats.record(&provenance);
            writer.append(record)?;
            pb.inc(1);
            log_progress("enrich", pb.position(), total_rows, LOG_INTERVAL);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn read_input_pairs(path: &Path, has_headers: bool) -> Vec<InputPair> {
        let mut reader = open_input(path, has_headers).unwrap();
        reader.byte_records().map(|row| pair_from_row(&row.unwrap())).collect()
    }

    #[test]
    fn test_short_and_non_utf8_rows_still_yield_pairs() {
        let tmp = TempDir::new().unwrap();
        let input = tmp.path().join("songs.csv");
        std::fs::write(&input, b"track,artist\nHello,Adele\nLonely\n\xff\xfeBad,Bytes\n").unwrap();

        let pairs = read_input_pairs(&input, true);
        assert_eq!(pairs.len(), 3);
        assert_eq!(pairs[0], InputPair::new("Hello", "Adele"));
        assert_eq!(pairs[1], InputPair::new("Lonely", ""));
        assert_eq!(pairs[2].artist, "Bytes");
        assert_eq!(count_input_rows(&input, true).unwrap(), 3);
    }

    #[test]
    fn test_worker_pool_only_for_parallel_runs() {
        assert!(worker_pool(1).unwrap().is_none());
        let pool = worker_pool(3).unwrap().expect("pool for 3 workers");
        assert_eq!(pool.current_num_threads(), 3);
    }

    #[test]
    fn test_headerless_input_counts_first_row() {
        let tmp = TempDir::new().unwrap();
        let input = tmp.path().join("songs.csv");
        std::fs::write(&input, "Hello,Adele\nYellow,Coldplay\n").unwrap();
        assert_eq!(count_input_rows(&input, false).unwrap(), 2);
        assert_eq!(count_input_rows(&input, true).unwrap(), 1);
    }
}
