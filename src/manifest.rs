//! Chunk manifest: the durable record of which chunks a job has sealed.
//!
//! One SQLite file per output directory holds a row per committed chunk
//! (sequence, file name, record count, first input row, SHA-256). Resume
//! offsets and coalescing order come from here, not from directory listings.
//! A chunk file with no manifest row was never committed and gets overwritten.

use crate::chunks::{chunk_file_name, discover_chunk_files};
use crate::error::{EnrichError, Result};
use log::{info, warn};
use rusqlite::{params, Connection, OptionalExtension};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

pub const MANIFEST_FILE: &str = "manifest.sqlite3";

/// One sealed chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkEntry {
    pub sequence: u64,
    pub file_name: String,
    pub record_count: u64,
    /// Zero-based index of the chunk's first record in the input.
    pub first_row: u64,
    pub sha256: String,
}

/// Where a resumed job picks up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ResumeCheckpoint {
    pub next_sequence: u64,
    pub rows_to_skip: u64,
}

/// Lower-case hex SHA-256 of a file.
pub fn file_sha256(path: &Path) -> Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hasher
        .finalize()
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect())
}

/// Counts data rows (header excluded) in a chunk file.
pub fn count_records(path: &Path) -> Result<u64> {
    let mut reader = csv::ReaderBuilder::new().has_headers(true).from_path(path)?;
    let mut count = 0u64;
    for record in reader.records() {
        record?;
        count += 1;
    }
    Ok(count)
}

/// Builds manifest entries for chunk files found by name pattern, in numeric
/// sequence order. Sequences must run 0, 1, 2, ... without gaps.
pub fn scan_chunk_files(dir: &Path) -> Result<Vec<ChunkEntry>> {
    let mut entries = Vec::new();
    let mut first_row = 0u64;
    for (expected, (sequence, path)) in discover_chunk_files(dir)?.into_iter().enumerate() {
        if sequence != expected as u64 {
            return Err(EnrichError::ManifestMismatch {
                sequence: expected as u64,
                path: dir.join(chunk_file_name(expected as u64)),
                reason: format!("chunk file missing (next file found is sequence {})", sequence),
            });
        }
        let record_count = count_records(&path)?;
        entries.push(ChunkEntry {
            sequence,
            file_name: chunk_file_name(sequence),
            record_count,
            first_row,
            sha256: file_sha256(&path)?,
        });
        first_row += record_count;
    }
    Ok(entries)
}

pub struct Manifest {
    conn: Connection,
    dir: PathBuf,
}

impl Manifest {
    /// Manifest location for an output directory.
    pub fn path_in(dir: &Path) -> PathBuf {
        dir.join(MANIFEST_FILE)
    }

    /// Whether `dir` already has a manifest.
    pub fn exists_in(dir: &Path) -> bool {
        Self::path_in(dir).is_file()
    }

    /// Opens (creating if needed) the manifest in `dir`.
    pub fn open(dir: &Path) -> Result<Self> {
        let conn = Connection::open(Self::path_in(dir))?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = FULL;

             CREATE TABLE IF NOT EXISTS job (
                 key TEXT PRIMARY KEY,
                 value TEXT NOT NULL
             );

             CREATE TABLE IF NOT EXISTS chunks (
                 sequence INTEGER PRIMARY KEY,
                 file_name TEXT NOT NULL UNIQUE,
                 record_count INTEGER NOT NULL,
                 first_row INTEGER NOT NULL,
                 sha256 TEXT NOT NULL
             );",
        )?;
        Ok(Self {
            conn,
            dir: dir.to_path_buf(),
        })
    }

    /// Opens the manifest for a job with `capacity` records per chunk,
    /// adopting pattern-named chunk files when no manifest existed yet.
    pub fn open_for_job(dir: &Path, capacity: usize) -> Result<Self> {
        // scan before creating the file so a failed adoption can be retried
        let adopted = if Self::exists_in(dir) {
            Vec::new()
        } else {
            scan_chunk_files(dir)?
        };
        let mut manifest = Self::open(dir)?;
        if !adopted.is_empty() {
            info!(
                "No manifest found; adopting {} existing chunk file(s) from {}",
                adopted.len(),
                dir.display()
            );
            manifest.commit_all(&adopted)?;
        }
        manifest.ensure_capacity(capacity)?;
        Ok(manifest)
    }

    fn job_value(&self, key: &str) -> Result<Option<String>> {
        Ok(self
            .conn
            .query_row("SELECT value FROM job WHERE key = ?1", [key], |row| row.get(0))
            .optional()?)
    }

    fn set_job_value(&self, key: &str, value: &str) -> Result<()> {
        self.conn.execute(
            "INSERT INTO job (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )?;
        Ok(())
    }

    /// Chunk capacity recorded for the job, if any.
    pub fn chunk_capacity(&self) -> Result<Option<usize>> {
        match self.job_value("chunk_capacity")? {
            Some(raw) => raw.parse::<usize>().map(Some).map_err(|_| {
                EnrichError::InvalidConfig(format!("manifest has unreadable chunk capacity '{}'", raw))
            }),
            None => Ok(None),
        }
    }

    /// Records `capacity` on first use; afterwards it must not change, or the
    /// resume offset of a half-finished job would be wrong.
    pub fn ensure_capacity(&self, capacity: usize) -> Result<()> {
        match self.chunk_capacity()? {
            Some(recorded) if recorded != capacity => Err(EnrichError::InvalidConfig(format!(
                "chunk size {} differs from the {} this job was started with",
                capacity, recorded
            ))),
            Some(_) => Ok(()),
            None => self.set_job_value("chunk_capacity", &capacity.to_string()),
        }
    }

    /// Input file the job was last run with.
    pub fn input_path(&self) -> Result<Option<String>> {
        self.job_value("input_path")
    }

    /// Records the input file, warning when it changed since the last run.
    pub fn set_input_path(&self, input: &Path) -> Result<()> {
        let value = input.display().to_string();
        if let Some(previous) = self.input_path()? {
            if previous != value {
                warn!("Resuming with input {} (job was started with {})", value, previous);
            }
        }
        self.set_job_value("input_path", &value)
    }

    /// Committed chunks in sequence order.
    pub fn entries(&self) -> Result<Vec<ChunkEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT sequence, file_name, record_count, first_row, sha256
             FROM chunks ORDER BY sequence ASC",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(ChunkEntry {
                sequence: row.get::<_, i64>(0)? as u64,
                file_name: row.get(1)?,
                record_count: row.get::<_, i64>(2)? as u64,
                first_row: row.get::<_, i64>(3)? as u64,
                sha256: row.get(4)?,
            })
        })?;
        let mut entries = Vec::new();
        for entry in rows {
            entries.push(entry?);
        }
        Ok(entries)
    }

    /// Records one sealed chunk.
    pub fn commit(&mut self, entry: &ChunkEntry) -> Result<()> {
        self.commit_all(std::slice::from_ref(entry))
    }

    fn commit_all(&mut self, entries: &[ChunkEntry]) -> Result<()> {
        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT INTO chunks (sequence, file_name, record_count, first_row, sha256)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;
            for entry in entries {
                stmt.execute(params![
                    entry.sequence as i64,
                    entry.file_name,
                    entry.record_count as i64,
                    entry.first_row as i64,
                    entry.sha256,
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    /// Next sequence number and the count of input rows already covered.
    pub fn checkpoint(&self) -> Result<ResumeCheckpoint> {
        let entries = self.entries()?;
        Ok(ResumeCheckpoint {
            next_sequence: entries.last().map(|e| e.sequence + 1).unwrap_or(0),
            rows_to_skip: entries.iter().map(|e| e.record_count).sum(),
        })
    }

    /// Checks that committed chunks are contiguous and unchanged on disk.
    pub fn verify(&self) -> Result<()> {
        let mut expected_first_row = 0u64;
        for (index, entry) in self.entries()?.iter().enumerate() {
            let path = self.dir.join(&entry.file_name);
            let mismatch = |reason: String| EnrichError::ManifestMismatch {
                sequence: entry.sequence,
                path: path.clone(),
                reason,
            };
            if entry.sequence != index as u64 {
                return Err(mismatch(format!("expected sequence {}", index)));
            }
            if entry.first_row != expected_first_row {
                return Err(mismatch(format!(
                    "first row {} but previous chunks end at {}",
                    entry.first_row, expected_first_row
                )));
            }
            if !path.is_file() {
                return Err(mismatch("file is missing".to_string()));
            }
            let actual = file_sha256(&path)?;
            if actual != entry.sha256 {
                return Err(mismatch(format!(
                    "checksum {} does not match recorded {}",
                    actual, entry.sha256
                )));
            }
            expected_first_row += entry.record_count;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write_chunk(dir: &Path, sequence: u64, rows: usize) {
        let mut body = String::from("song,artist\n");
        for i in 0..rows {
            body.push_str(&format!("Song {i},Artist {i}\n"));
        }
        fs::write(dir.join(chunk_file_name(sequence)), body).unwrap();
    }

    fn entry_for(dir: &Path, sequence: u64, first_row: u64) -> ChunkEntry {
        let path = dir.join(chunk_file_name(sequence));
        ChunkEntry {
            sequence,
            file_name: chunk_file_name(sequence),
            record_count: count_records(&path).unwrap(),
            first_row,
            sha256: file_sha256(&path).unwrap(),
        }
    }

    #[test]
    fn test_fresh_manifest_starts_at_zero() {
        let tmp = TempDir::new().unwrap();
        let manifest = Manifest::open_for_job(tmp.path(), 10).unwrap();
        assert_eq!(manifest.checkpoint().unwrap(), ResumeCheckpoint::default());
        assert_eq!(manifest.chunk_capacity().unwrap(), Some(10));
    }

    #[test]
    fn test_checkpoint_sums_committed_chunks() {
        let tmp = TempDir::new().unwrap();
        write_chunk(tmp.path(), 0, 3);
        write_chunk(tmp.path(), 1, 3);
        let mut manifest = Manifest::open(tmp.path()).unwrap();
        manifest.commit(&entry_for(tmp.path(), 0, 0)).unwrap();
        manifest.commit(&entry_for(tmp.path(), 1, 3)).unwrap();

        assert_eq!(
            manifest.checkpoint().unwrap(),
            ResumeCheckpoint {
                next_sequence: 2,
                rows_to_skip: 6
            }
        );
        assert!(manifest.verify().is_ok());
    }

    #[test]
    fn test_capacity_change_is_rejected() {
        let tmp = TempDir::new().unwrap();
        Manifest::open_for_job(tmp.path(), 10).unwrap();
        let err = Manifest::open_for_job(tmp.path(), 20).err().unwrap();
        assert!(err.to_string().contains("chunk size 20"));
    }

    #[test]
    fn test_verify_detects_modified_chunk() {
        let tmp = TempDir::new().unwrap();
        write_chunk(tmp.path(), 0, 2);
        let mut manifest = Manifest::open(tmp.path()).unwrap();
        manifest.commit(&entry_for(tmp.path(), 0, 0)).unwrap();

        write_chunk(tmp.path(), 0, 5);
        assert!(matches!(
            manifest.verify(),
            Err(EnrichError::ManifestMismatch { sequence: 0, .. })
        ));

        fs::remove_file(tmp.path().join(chunk_file_name(0))).unwrap();
        let err = manifest.verify().unwrap_err();
        assert!(err.to_string().contains("missing"));
    }

    #[test]
    fn test_legacy_chunk_files_are_adopted_in_numeric_order() {
        let tmp = TempDir::new().unwrap();
        for sequence in 0..11 {
            write_chunk(tmp.path(), sequence, 2);
        }
        let manifest = Manifest::open_for_job(tmp.path(), 2).unwrap();
        let entries = manifest.entries().unwrap();

        assert_eq!(entries.len(), 11);
        assert_eq!(entries[2].file_name, "output2.csv");
        assert_eq!(entries[10].file_name, "output10.csv");
        assert_eq!(entries[10].first_row, 20);
        assert_eq!(manifest.checkpoint().unwrap().rows_to_skip, 22);
    }

    #[test]
    fn test_gap_in_legacy_chunks_is_an_error() {
        let tmp = TempDir::new().unwrap();
        write_chunk(tmp.path(), 0, 1);
        write_chunk(tmp.path(), 2, 1);
        assert!(scan_chunk_files(tmp.path()).is_err());
    }
}
