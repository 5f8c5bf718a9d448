//! Print slug forms and candidate lyric page URLs for an (artist, track)
//! pair. No network access.

use anyhow::Result;
use clap::Parser;
use track_enrich::config::DEFAULT_LYRICS_URL;
use track_enrich::error::RemoteError;
use track_enrich::lyrics::{LyricsResolver, PageFetcher};
use track_enrich::retry::RetryPolicy;
use track_enrich::slug::SlugVariantGenerator;

#[derive(Parser)]
#[command(name = "slug-preview")]
#[command(about = "Show the lyric page candidates tried for an artist and track")]
struct Args {
    artist: String,

    track: String,

    #[arg(long, default_value = DEFAULT_LYRICS_URL)]
    lyrics_url: String,

    /// Keep non-ASCII letters
    #[arg(long)]
    no_ascii_fold: bool,
}

/// Never fetches; only here so the resolver can build URLs.
struct Offline;

impl PageFetcher for Offline {
    fn fetch(&self, _url: &str) -> Result<Option<String>, RemoteError> {
        Ok(None)
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let slugs = SlugVariantGenerator::new(!args.no_ascii_fold);

    for (label, raw) in [("artist", &args.artist), ("track", &args.track)] {
        let forms = slugs.forms(raw);
        println!("{label}: {raw:?}");
        println!("  word-interior: {}", forms.word_interior);
        println!("  strip:         {}", forms.strip);
        if !forms.differ() {
            println!("  (one variant: {})", slugs.variants(raw).join(", "));
        }
    }

    let resolver = LyricsResolver::new(&Offline, slugs, &args.lyrics_url, RetryPolicy::immediate(1));
    let urls = resolver.candidate_urls(&args.artist, &args.track);
    if urls.is_empty() {
        println!("\nNo candidate pages (a name slugs to nothing)");
    } else {
        println!("\nCandidates in lookup order:");
        for (i, url) in urls.iter().enumerate() {
            println!("  {}. {}", i + 1, url);
        }
    }
    Ok(())
}
