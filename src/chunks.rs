//! Chunked CSV output and coalescing.
//!
//! Records are buffered up to the chunk capacity, then written to
//! `output<N>.csv` and committed to the manifest. At the end of a job the
//! committed chunks are merged, in sequence order, into `output.csv`.

use crate::error::{EnrichError, Result};
use crate::manifest::{file_sha256, ChunkEntry, Manifest, ResumeCheckpoint};
use crate::models::{EnrichmentRecord, RECORD_COLUMNS};
use log::info;
use once_cell::sync::Lazy;
use regex::Regex;
use std::fs::{self, File};
use std::path::{Path, PathBuf};

pub const CHUNK_PREFIX: &str = "output";
pub const FINAL_FILE: &str = "output.csv";

/// Chunk file names: literal prefix, sequence digits, `.csv`.
static CHUNK_FILE_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^output(\d+)\.csv$").unwrap());

/// `output<sequence>.csv`.
pub fn chunk_file_name(sequence: u64) -> String {
    format!("{}{}.csv", CHUNK_PREFIX, sequence)
}

/// Sequence number encoded in a chunk file name.
pub fn parse_chunk_sequence(file_name: &str) -> Option<u64> {
    CHUNK_FILE_PATTERN
        .captures(file_name)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// Chunk files in `dir`, ordered by numeric sequence (so 2 sorts before 10).
pub fn discover_chunk_files(dir: &Path) -> Result<Vec<(u64, PathBuf)>> {
    let mut found = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let name = entry.file_name();
        if let Some(sequence) = name.to_str().and_then(parse_chunk_sequence) {
            found.push((sequence, entry.path()));
        }
    }
    found.sort_by_key(|(sequence, _)| *sequence);
    Ok(found)
}

fn temp_path_for(target: &Path) -> PathBuf {
    let name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    target.with_file_name(format!(".{}.tmp", name))
}

/// Writes through a temp file and renames into place once synced.
fn write_atomically<F>(target: &Path, fill: F) -> Result<()>
where
    F: FnOnce(&mut csv::Writer<File>) -> Result<()>,
{
    let tmp = temp_path_for(target);
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_path(&tmp)?;
    fill(&mut writer)?;
    let file = writer
        .into_inner()
        .map_err(|err| EnrichError::Io(err.into_error()))?;
    file.sync_all()?;
    drop(file);
    fs::rename(&tmp, target)?;
    Ok(())
}

// ============================================================================
// Writer
// ============================================================================

/// What the writer did over one run.
#[derive(Debug, Clone, Default)]
pub struct WriterSummary {
    /// Every committed chunk of the job, earlier runs included.
    pub chunks: Vec<ChunkEntry>,
    pub written_this_run: usize,
}

pub struct ChunkedOutputWriter {
    dir: PathBuf,
    capacity: usize,
    manifest: Manifest,
    sequence: u64,
    /// Input row index of the first record in `batch`.
    next_row: u64,
    batch: Vec<EnrichmentRecord>,
    written_this_run: usize,
}

impl ChunkedOutputWriter {
    /// Opens the writer for `dir`, positioned after every committed chunk.
    /// Committed chunks are verified against their checksums first.
    pub fn open(dir: &Path, capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(EnrichError::InvalidConfig(
                "chunk capacity must be at least 1".to_string(),
            ));
        }
        fs::create_dir_all(dir)?;
        let manifest = Manifest::open_for_job(dir, capacity)?;
        manifest.verify()?;
        let checkpoint = manifest.checkpoint()?;
        if checkpoint.next_sequence > 0 {
            info!(
                "Resuming at chunk {} ({} input rows already written)",
                checkpoint.next_sequence, checkpoint.rows_to_skip
            );
        }
        Ok(Self {
            dir: dir.to_path_buf(),
            capacity,
            manifest,
            sequence: checkpoint.next_sequence,
            next_row: checkpoint.rows_to_skip,
            batch: Vec::with_capacity(capacity),
            written_this_run: 0,
        })
    }

    /// Where the next chunk starts: its sequence and first input row.
    pub fn checkpoint(&self) -> ResumeCheckpoint {
        ResumeCheckpoint {
            next_sequence: self.sequence,
            rows_to_skip: self.next_row,
        }
    }

    /// Manifest backing this writer.
    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    /// Records waiting for the next flush.
    pub fn buffered(&self) -> usize {
        self.batch.len()
    }

    /// Buffers a record; a full batch is flushed immediately and the path of
    /// the new chunk is returned.
    pub fn append(&mut self, record: EnrichmentRecord) -> Result<Option<PathBuf>> {
        self.batch.push(record);
        if self.batch.len() >= self.capacity {
            return self.flush().map(Some);
        }
        Ok(None)
    }

    /// Flushes the partial batch. A job that has no chunk at all still gets
    /// one (header-only) file; otherwise an empty batch writes nothing.
    pub fn finish(mut self) -> Result<WriterSummary> {
        let has_chunks = self.sequence > 0;
        if !self.batch.is_empty() || !has_chunks {
            self.flush()?;
        }
        Ok(WriterSummary {
            chunks: self.manifest.entries()?,
            written_this_run: self.written_this_run,
        })
    }

    fn flush(&mut self) -> Result<PathBuf> {
        let file_name = chunk_file_name(self.sequence);
        let path = self.dir.join(&file_name);
        let batch = std::mem::take(&mut self.batch);

        write_atomically(&path, |writer| {
            writer.write_record(RECORD_COLUMNS)?;
            for record in &batch {
                writer.serialize(record)?;
            }
            Ok(())
        })?;

        let entry = ChunkEntry {
            sequence: self.sequence,
            file_name,
            record_count: batch.len() as u64,
            first_row: self.next_row,
            sha256: file_sha256(&path)?,
        };
        self.manifest.commit(&entry)?;
        info!(
            "Wrote chunk {} ({} records, rows {}..{}) to {}",
            entry.sequence,
            entry.record_count,
            entry.first_row,
            entry.first_row + entry.record_count,
            path.display()
        );

        self.sequence += 1;
        self.next_row += entry.record_count;
        self.written_this_run += 1;
        self.batch = Vec::with_capacity(self.capacity);
        Ok(path)
    }
}

// ============================================================================
// Coalescer
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoalesceOutcome {
    /// Zero or one chunk; nothing to merge.
    Skipped { chunk_count: usize },
    Written { path: PathBuf, records: u64 },
}

pub struct ChunkCoalescer {
    dir: PathBuf,
}

impl ChunkCoalescer {
    /// Coalescer over the chunks in `dir`.
    pub fn new(dir: &Path) -> Self {
        Self {
            dir: dir.to_path_buf(),
        }
    }

    /// Chunk list for `dir`: the manifest when there is one, otherwise files
    /// discovered by name pattern.
    pub fn listing(&self) -> Result<Vec<ChunkEntry>> {
        if Manifest::exists_in(&self.dir) {
            Manifest::open(&self.dir)?.entries()
        } else {
            crate::manifest::scan_chunk_files(&self.dir)
        }
    }

    /// Merges everything `listing` returns.
    pub fn coalesce(&self) -> Result<CoalesceOutcome> {
        let entries = self.listing()?;
        self.coalesce_entries(&entries)
    }

    /// Concatenates `entries` in ascending sequence order into `output.csv`,
    /// copying rows verbatim.
    pub fn coalesce_entries(&self, entries: &[ChunkEntry]) -> Result<CoalesceOutcome> {
        if entries.len() <= 1 {
            return Ok(CoalesceOutcome::Skipped {
                chunk_count: entries.len(),
            });
        }
        let mut ordered: Vec<&ChunkEntry> = entries.iter().collect();
        ordered.sort_by_key(|entry| entry.sequence);

        let target = self.dir.join(FINAL_FILE);
        let mut total = 0u64;
        write_atomically(&target, |writer| {
            writer.write_record(RECORD_COLUMNS)?;
            for entry in &ordered {
                let path = self.dir.join(&entry.file_name);
                let mut reader = csv::ReaderBuilder::new().has_headers(true).from_path(&path)?;
                let mut copied = 0u64;
                for row in reader.records() {
                    writer.write_record(&row?)?;
                    copied += 1;
                }
                if copied != entry.record_count {
                    return Err(EnrichError::ManifestMismatch {
                        sequence: entry.sequence,
                        path,
                        reason: format!(
                            "holds {} records, manifest says {}",
                            copied, entry.record_count
                        ),
                    });
                }
                total += copied;
            }
            Ok(())
        })?;

        info!(
            "Coalesced {} chunks ({} records) into {}",
            ordered.len(),
            total,
            target.display()
        );
        Ok(CoalesceOutcome::Written {
            path: target,
            records: total,
        })
    }
}
