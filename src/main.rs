use anyhow::{Context, Result};
use clap::Parser;
use log::info;
use std::path::PathBuf;
use std::time::Duration;
use track_enrich::chunks::CoalesceOutcome;
use track_enrich::config::{
    CatalogSettings, LyricsSettings, PipelineConfig, DEFAULT_CATALOG_URL, DEFAULT_CHUNK_SIZE,
    DEFAULT_LYRICS_URL, DEFAULT_MARKET, DEFAULT_SEARCH_LIMIT,
};
use track_enrich::lyrics::HttpPageFetcher;
use track_enrich::pipeline::PipelineOrchestrator;
use track_enrich::progress;
use track_enrich::retry::RetryPolicy;
use track_enrich::spotify::SpotifyClient;

#[derive(Parser)]
#[command(name = "track-enrich")]
#[command(about = "Enrich (track, artist) pairs with catalog metadata, audio features and lyrics")]
struct Args {
    /// CSV input: column 1 is the track, column 2 the artist
    input: PathBuf,

    /// Directory for chunk files, output.csv and the manifest
    #[arg(long, default_value = ".")]
    output_dir: PathBuf,

    /// Records per chunk file
    #[arg(long, default_value_t = DEFAULT_CHUNK_SIZE)]
    chunk_size: usize,

    /// Rows enriched concurrently within a chunk (1 = sequential)
    #[arg(long, default_value_t = 1)]
    workers: usize,

    #[arg(long, default_value = DEFAULT_MARKET)]
    market: String,

    /// Catalog search window; the first result is used
    #[arg(long, default_value_t = DEFAULT_SEARCH_LIMIT)]
    search_limit: u32,

    /// Bearer token for the catalog API
    #[arg(long, env = "SPOTIFY_ACCESS_TOKEN", hide_env_values = true)]
    access_token: String,

    #[arg(long, env = "TRACK_ENRICH_CATALOG_URL", default_value = DEFAULT_CATALOG_URL)]
    catalog_url: String,

    #[arg(long, env = "TRACK_ENRICH_LYRICS_URL", default_value = DEFAULT_LYRICS_URL)]
    lyrics_url: String,

    /// Attempts per remote call, including the first
    #[arg(long, default_value_t = 5)]
    max_attempts: u32,

    #[arg(long, default_value_t = 500)]
    base_delay_ms: u64,

    #[arg(long, default_value_t = 8000)]
    max_delay_ms: u64,

    /// Keep non-ASCII letters in lyric page slugs
    #[arg(long)]
    no_ascii_fold: bool,

    /// The input has no header row
    #[arg(long)]
    no_headers: bool,

    /// Leave chunk files as they are instead of writing output.csv
    #[arg(long)]
    no_coalesce: bool,

    /// Write run statistics as JSON to this path
    #[arg(long)]
    stats: Option<PathBuf>,

    /// Disable progress bars, log progress lines instead (for tail -f)
    #[arg(long)]
    log_only: bool,
}

impl Args {
    fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            input: self.input.clone(),
            output_dir: self.output_dir.clone(),
            chunk_size: self.chunk_size,
            workers: self.workers,
            has_headers: !self.no_headers,
            coalesce: !self.no_coalesce,
            catalog: CatalogSettings {
                base_url: self.catalog_url.clone(),
                market: self.market.clone(),
                search_limit: self.search_limit,
            },
            lyrics: LyricsSettings {
                base_url: self.lyrics_url.clone(),
                fold_ascii: !self.no_ascii_fold,
            },
            retry: RetryPolicy {
                max_attempts: self.max_attempts,
                base_delay: Duration::from_millis(self.base_delay_ms),
                max_delay: Duration::from_millis(self.max_delay_ms),
                jitter: true,
            },
        }
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    progress::set_log_only(args.log_only);

    let config = args.pipeline_config();
    config.validate().context("Invalid arguments")?;

    let catalog = SpotifyClient::new(&config.catalog.base_url, args.access_token.as_str());
    let pages = HttpPageFetcher::new();

    let orchestrator = PipelineOrchestrator::new(config, &catalog, &pages);
    let outcome = orchestrator
        .run()
        .with_context(|| format!("Enrichment of {:?} failed", args.input))?;

    match &outcome.coalesce {
        Some(CoalesceOutcome::Written { path, records }) => {
            info!("Final output: {} ({} records)", path.display(), records)
        }
        Some(CoalesceOutcome::Skipped { .. }) | None => {
            if let Some(last) = outcome.chunks.last() {
                info!(
                    "Output left in {} chunk file(s), last is {}",
                    outcome.chunks.len(),
                    args.output_dir.join(&last.file_name).display()
                );
            }
        }
    }

    if let Some(path) = &args.stats {
        let json = serde_json::to_string_pretty(&outcome.stats)?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write stats to {:?}", path))?;
        info!("Stats written to {:?}", path);
    }

    Ok(())
}
