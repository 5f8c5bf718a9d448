//! Pipeline configuration.
//!
//! The binary gathers its arguments into a [`PipelineConfig`]; library code
//! only ever sees the validated struct.

use crate::error::{EnrichError, Result};
use crate::retry::RetryPolicy;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_CHUNK_SIZE: usize = 3000;
pub const DEFAULT_SEARCH_LIMIT: u32 = 2;
pub const DEFAULT_MARKET: &str = "US";
pub const DEFAULT_CATALOG_URL: &str = "https://api.spotify.com/v1";
pub const DEFAULT_LYRICS_URL: &str = "https://genius.com/";

/// Settings for one enrichment job.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub input: PathBuf,
    pub output_dir: PathBuf,
    /// Records per chunk file.
    pub chunk_size: usize,
    /// Rows enriched concurrently inside one chunk; 1 is strictly sequential.
    pub workers: usize,
    /// Whether the input's first row is a header.
    pub has_headers: bool,
    /// Merge chunk files into `output.csv` at the end of the run.
    pub coalesce: bool,
    pub catalog: CatalogSettings,
    pub lyrics: LyricsSettings,
    pub retry: RetryPolicy,
}

#[derive(Debug, Clone)]
pub struct CatalogSettings {
    pub base_url: String,
    pub market: String,
    pub search_limit: u32,
}

impl Default for CatalogSettings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_CATALOG_URL.to_string(),
            market: DEFAULT_MARKET.to_string(),
            search_limit: DEFAULT_SEARCH_LIMIT,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LyricsSettings {
    pub base_url: String,
    /// Transliterate names to ASCII before slugging.
    pub fold_ascii: bool,
}

impl Default for LyricsSettings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_LYRICS_URL.to_string(),
            fold_ascii: true,
        }
    }
}

impl PipelineConfig {
    /// Defaults for everything but the input file and output directory.
    pub fn new(input: impl Into<PathBuf>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            input: input.into(),
            output_dir: output_dir.into(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            workers: 1,
            has_headers: true,
            coalesce: true,
            catalog: CatalogSettings::default(),
            lyrics: LyricsSettings::default(),
            retry: RetryPolicy::default(),
        }
    }

    /// Rejects settings the pipeline cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(EnrichError::InvalidConfig(
                "chunk size must be at least 1".to_string(),
            ));
        }
        if self.workers == 0 {
            return Err(EnrichError::InvalidConfig(
                "workers must be at least 1".to_string(),
            ));
        }
        if self.catalog.search_limit == 0 || self.catalog.search_limit > 50 {
            return Err(EnrichError::InvalidConfig(format!(
                "search limit must be between 1 and 50, got {}",
                self.catalog.search_limit
            )));
        }
        if self.retry.max_attempts == 0 {
            return Err(EnrichError::InvalidConfig(
                "max attempts must be at least 1".to_string(),
            ));
        }
        if self.retry.max_delay < self.retry.base_delay {
            return Err(EnrichError::InvalidConfig(format!(
                "max delay ({:?}) is shorter than base delay ({:?})",
                self.retry.max_delay, self.retry.base_delay
            )));
        }
        if !self.lyrics.base_url.starts_with("http://") && !self.lyrics.base_url.starts_with("https://") {
            return Err(EnrichError::InvalidConfig(format!(
                "lyrics URL must be http(s): {}",
                self.lyrics.base_url
            )));
        }
        Ok(())
    }
}

/// HTTP timeouts shared by the catalog and page clients.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
pub const READ_TIMEOUT: Duration = Duration::from_secs(15);
