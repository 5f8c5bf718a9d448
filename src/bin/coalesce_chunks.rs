//! Re-run chunk coalescing over an output directory.
//!
//! Uses the manifest when present and falls back to `output<N>.csv` name
//! discovery otherwise. No network access.

use anyhow::{Context, Result};
use clap::Parser;
use log::info;
use std::path::PathBuf;
use track_enrich::chunks::{ChunkCoalescer, CoalesceOutcome};
use track_enrich::manifest::Manifest;

#[derive(Parser)]
#[command(name = "coalesce-chunks")]
#[command(about = "Merge output<N>.csv chunk files into output.csv in sequence order")]
struct Args {
    /// Directory holding the chunk files
    #[arg(default_value = ".")]
    dir: PathBuf,

    /// Verify committed chunk checksums before merging
    #[arg(long)]
    verify: bool,

    /// Only list the chunks that would be merged
    #[arg(long)]
    dry_run: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    if args.verify {
        if Manifest::exists_in(&args.dir) {
            Manifest::open(&args.dir)?
                .verify()
                .context("Manifest verification failed")?;
            info!("All committed chunks match the manifest");
        } else {
            info!("No manifest in {:?}, nothing to verify", args.dir);
        }
    }

    let coalescer = ChunkCoalescer::new(&args.dir);
    let entries = coalescer
        .listing()
        .with_context(|| format!("Failed to list chunks in {:?}", args.dir))?;

    if args.dry_run {
        for entry in &entries {
            println!(
                "{:>6}  {:<20} {:>8} records  rows {}..{}",
                entry.sequence,
                entry.file_name,
                entry.record_count,
                entry.first_row,
                entry.first_row + entry.record_count
            );
        }
        return Ok(());
    }

    match coalescer.coalesce_entries(&entries)? {
        CoalesceOutcome::Written { path, records } => {
            println!("Wrote {} records from {} chunks to {:?}", records, entries.len(), path)
        }
        CoalesceOutcome::Skipped { chunk_count } => {
            println!("{} chunk file(s) found, nothing to coalesce", chunk_count)
        }
    }
    Ok(())
}
