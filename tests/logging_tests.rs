//! Diagnostic output for rows that fail every lookup.
//!
//! Installs a process-wide logger, so this file holds a single test.

use log::{Level, LevelFilter, Log, Metadata, Record};
use serde_json::{json, Value};
use std::sync::Mutex;
use track_enrich::audio::AudioFeatureFetcher;
use track_enrich::catalog::CatalogClient;
use track_enrich::config::CatalogSettings;
use track_enrich::error::RemoteError;
use track_enrich::lyrics::{LyricsResolver, PageFetcher};
use track_enrich::models::InputPair;
use track_enrich::record::EnrichmentRecordBuilder;
use track_enrich::resolver::QueryFallbackResolver;
use track_enrich::retry::RetryPolicy;
use track_enrich::slug::SlugVariantGenerator;

struct CapturingLogger {
    lines: Mutex<Vec<String>>,
}

impl Log for CapturingLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= Level::Info
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            self.lines
                .lock()
                .unwrap()
                .push(format!("{} {}", record.level(), record.args()));
        }
    }

    fn flush(&self) {}
}

static LOGGER: CapturingLogger = CapturingLogger {
    lines: Mutex::new(Vec::new()),
};

struct EmptyCatalog;

impl CatalogClient for EmptyCatalog {
    fn search(&self, _query: &str, _limit: u32, _market: &str) -> Result<Value, RemoteError> {
        Ok(json!({ "tracks": { "items": [] } }))
    }

    fn audio_features(&self, _id: &str) -> Result<Value, RemoteError> {
        Ok(Value::Null)
    }
}

struct MissingPages;

impl PageFetcher for MissingPages {
    fn fetch(&self, _url: &str) -> Result<Option<String>, RemoteError> {
        Ok(None)
    }
}

#[test]
fn test_total_miss_is_logged_at_default_level() {
    log::set_logger(&LOGGER).unwrap();
    log::set_max_level(LevelFilter::Info);

    let retry = RetryPolicy::immediate(1);
    let builder = EnrichmentRecordBuilder::new(
        QueryFallbackResolver::new(&EmptyCatalog, CatalogSettings::default(), retry.clone()),
        AudioFeatureFetcher::new(&EmptyCatalog, retry.clone()),
        LyricsResolver::new(
            &MissingPages,
            SlugVariantGenerator::default(),
            "https://lyrics.test/",
            retry,
        ),
    );
    let (record, _) = builder.build(&InputPair::new("Don't Go", "Nobody Known"));
    assert!(record.lyrics.is_none());

    let lines = LOGGER.lines.lock().unwrap().clone();
    let catalog_line = lines
        .iter()
        .find(|line| line.contains("No catalog match"))
        .expect("catalog miss should be logged");
    assert!(catalog_line.contains("Nobody Known"));
    assert!(catalog_line.contains("track:Don't Go artist:Nobody Known"));
    assert!(catalog_line.contains("track:Dont Go artist:Nobody Known"));
    assert!(catalog_line.contains("after 3 queries"));
    assert!(catalog_line.ends_with("| track:Don't Go"));

    let lyrics_line = lines
        .iter()
        .find(|line| line.contains("No lyrics"))
        .expect("lyrics miss should be logged");
    assert!(lyrics_line.contains("https://lyrics.test/Nobody-Known-Dont-Go-lyrics"));
    assert!(lyrics_line.contains("https://lyrics.test/Nobody-Known-Don-t-Go-lyrics"));

    assert!(lines
        .iter()
        .any(|line| line.starts_with("WARN") && line.contains("without catalog data or lyrics")));
}
