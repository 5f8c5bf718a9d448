//! Core data models for track enrichment.
//!
//! This module contains the input pair, the catalog/audio/lyrics results,
//! the flat output record and the run statistics used throughout the pipeline.

use serde::{Deserialize, Serialize};

// ============================================================================
// Input
// ============================================================================

/// One (track, artist) row from the input table. Row order is processing order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InputPair {
    pub track: String,
    pub artist: String,
}

impl InputPair {
    /// Pair from a track and artist name.
    pub fn new(track: impl Into<String>, artist: impl Into<String>) -> Self {
        Self {
            track: track.into(),
            artist: artist.into(),
        }
    }
}

// ============================================================================
// Lookup Outcome
// ============================================================================

/// Outcome of a single remote lookup.
///
/// `NotFound` drives fallback to the next strategy; `Transient` is what is left
/// after the retry policy gave up, and callers treat it as a miss after logging.
#[derive(Clone, Debug, PartialEq)]
pub enum Lookup<T> {
    Found(T),
    NotFound,
    Transient(String),
}

impl<T> Lookup<T> {
    /// The value, if one was found.
    pub fn found(self) -> Option<T> {
        match self {
            Lookup::Found(value) => Some(value),
            Lookup::NotFound | Lookup::Transient(_) => None,
        }
    }

    /// Whether the lookup produced a value.
    pub fn is_found(&self) -> bool {
        matches!(self, Lookup::Found(_))
    }
}

// ============================================================================
// Catalog Models
// ============================================================================

/// Granularity of a catalog release date ("1999", "1999-03", "1999-03-02").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReleaseDatePrecision {
    Year,
    Month,
    Day,
}

impl ReleaseDatePrecision {
    /// Parses the catalog's lowercase name.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "year" => Some(ReleaseDatePrecision::Year),
            "month" => Some(ReleaseDatePrecision::Month),
            "day" => Some(ReleaseDatePrecision::Day),
            _ => None,
        }
    }
}

/// First search hit for a query, as resolved from the catalog.
#[derive(Clone, Debug, PartialEq)]
pub struct CatalogMatch {
    pub resolved_song: String,
    pub resolved_artist: String,
    /// Every credited artist after the primary one, in catalog order.
    pub featured_artists: Vec<String>,
    pub catalog_id: String,
    pub popularity: i64,
    pub release_date: String,
    pub release_date_precision: ReleaseDatePrecision,
}

impl CatalogMatch {
    /// Featured artists as stored in the output: comma separated, no trailing comma.
    pub fn features_joined(&self) -> String {
        self.featured_artists.join(",")
    }
}

/// Per-track audio descriptors from the catalog.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct AudioDescriptor {
    pub danceability: f64,
    pub energy: f64,
    pub key: i64,
    pub loudness: f64,
    pub mode: i64,
    pub speechiness: f64,
    pub acousticness: f64,
    pub instrumentalness: f64,
    pub liveness: f64,
    pub valence: f64,
    pub tempo: f64,
    pub time_signature: i64,
    pub duration_ms: i64,
}

// ============================================================================
// Output Models
// ============================================================================

/// Flat output row (21 columns).
///
/// ## Field provenance
///
/// - `song`, `artist`: catalog names when a catalog match exists, otherwise the
///   raw input names.
/// - `features` .. `release_date_precision`: catalog match only.
/// - `danceability` .. `duration_ms`: audio descriptors only.
/// - `lyrics`: scraped text with newlines escaped as the two characters `\n`.
///
/// Column order is the serialization order below and must not change: chunk
/// files written by earlier runs are concatenated verbatim during coalescing.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct EnrichmentRecord {
    pub song: String,
    pub artist: String,
    pub features: Option<String>,
    pub track_id: Option<String>,
    pub popularity: Option<i64>,
    pub release_date: Option<String>,
    pub release_date_precision: Option<ReleaseDatePrecision>,
    pub danceability: Option<f64>,
    pub energy: Option<f64>,
    pub key: Option<i64>,
    pub loudness: Option<f64>,
    pub mode: Option<i64>,
    pub speechiness: Option<f64>,
    pub acousticness: Option<f64>,
    pub instrumentalness: Option<f64>,
    pub liveness: Option<f64>,
    pub valence: Option<f64>,
    pub tempo: Option<f64>,
    pub time_signature: Option<i64>,
    pub duration_ms: Option<i64>,
    pub lyrics: Option<String>,
}

/// Output column names, in file order.
pub const RECORD_COLUMNS: [&str; 21] = [
    "song",
    "artist",
    "features",
    "track_id",
    "popularity",
    "release_date",
    "release_date_precision",
    "danceability",
    "energy",
    "key",
    "loudness",
    "mode",
    "speechiness",
    "acousticness",
    "instrumentalness",
    "liveness",
    "valence",
    "tempo",
    "time_signature",
    "duration_ms",
    "lyrics",
];

impl EnrichmentRecord {
    /// Record carrying only the raw input names.
    pub fn from_input(pair: &InputPair) -> Self {
        Self {
            song: pair.track.clone(),
            artist: pair.artist.clone(),
            ..Self::default()
        }
    }

    /// Record seeded from a catalog match.
    pub fn from_match(m: &CatalogMatch) -> Self {
        Self {
            song: m.resolved_song.clone(),
            artist: m.resolved_artist.clone(),
            features: Some(m.features_joined()),
            track_id: Some(m.catalog_id.clone()),
            popularity: Some(m.popularity),
            release_date: Some(m.release_date.clone()),
            release_date_precision: Some(m.release_date_precision),
            ..Self::default()
        }
    }

    /// Fills the audio columns from `audio`.
    pub fn merge_audio(&mut self, audio: &AudioDescriptor) {
        self.danceability = Some(audio.danceability);
        self.energy = Some(audio.energy);
        self.key = Some(audio.key);
        self.loudness = Some(audio.loudness);
        self.mode = Some(audio.mode);
        self.speechiness = Some(audio.speechiness);
        self.acousticness = Some(audio.acousticness);
        self.instrumentalness = Some(audio.instrumentalness);
        self.liveness = Some(audio.liveness);
        self.valence = Some(audio.valence);
        self.tempo = Some(audio.tempo);
        self.time_signature = Some(audio.time_signature);
        self.duration_ms = Some(audio.duration_ms);
    }
}

// ============================================================================
// Provenance & Statistics
// ============================================================================

/// Which catalog query produced the match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryStrategy {
    /// `track:<track> artist:<artist>`
    Combined,
    /// Same as `Combined` with apostrophes removed from both fields.
    CombinedNoApostrophes,
    /// `track:<track>` alone.
    TrackOnly,
}

/// Which names produced the lyrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LyricsSource {
    InputNames,
    CatalogNames,
}

/// How a single record was assembled. Returned alongside every record so the
/// orchestrator can aggregate statistics without shared mutable state.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Provenance {
    pub strategy: Option<QueryStrategy>,
    pub audio_found: bool,
    pub lyrics: Option<LyricsSource>,
}

/// Per-run statistics, logged at the end and optionally written as JSON.
#[derive(Default, Debug, Clone, Serialize)]
pub struct EnrichStats {
    pub rows_processed: usize,
    pub rows_skipped_by_resume: usize,

    // Catalog resolution
    pub matched_combined: usize,
    pub matched_no_apostrophes: usize,
    pub matched_track_only: usize,
    pub catalog_misses: usize,
    pub audio_found: usize,

    // Lyrics
    pub lyrics_input_names: usize,
    pub lyrics_catalog_names: usize,
    pub lyrics_misses: usize,

    // Output
    pub chunks_written: usize,
    pub coalesced: bool,
}

impl EnrichStats {
    /// Counts one finished row.
    pub fn record(&mut self, provenance: &Provenance) {
        self.rows_processed += 1;
        match provenance.strategy {
            Some(QueryStrategy::Combined) => self.matched_combined += 1,
            Some(QueryStrategy::CombinedNoApostrophes) => self.matched_no_apostrophes += 1,
            Some(QueryStrategy::TrackOnly) => self.matched_track_only += 1,
            None => self.catalog_misses += 1,
        }
        if provenance.audio_found {
            self.audio_found += 1;
        }
        match provenance.lyrics {
            Some(LyricsSource::InputNames) => self.lyrics_input_names += 1,
            Some(LyricsSource::CatalogNames) => self.lyrics_catalog_names += 1,
            None => self.lyrics_misses += 1,
        }
    }

    /// Rows matched by any query strategy.
    pub fn catalog_matches(&self) -> usize {
        self.matched_combined + self.matched_no_apostrophes + self.matched_track_only
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_match() -> CatalogMatch {
        CatalogMatch {
            resolved_song: "Drunk in Love".to_string(),
            resolved_artist: "Beyoncé".to_string(),
            featured_artists: vec!["JAY-Z".to_string(), "Someone".to_string()],
            catalog_id: "6jG2YzhxptolDzLHTGLt7S".to_string(),
            popularity: 71,
            release_date: "2013-12-13".to_string(),
            release_date_precision: ReleaseDatePrecision::Day,
        }
    }

    #[test]
    fn test_features_joined_has_no_trailing_comma() {
        assert_eq!(sample_match().features_joined(), "JAY-Z,Someone");

        let mut solo = sample_match();
        solo.featured_artists.clear();
        assert_eq!(solo.features_joined(), "");
    }

    #[test]
    fn test_record_from_input_leaves_catalog_fields_empty() {
        let record = EnrichmentRecord::from_input(&InputPair::new("Song", "Artist"));
        assert_eq!(record.song, "Song");
        assert_eq!(record.artist, "Artist");
        assert!(record.track_id.is_none());
        assert!(record.tempo.is_none());
        assert!(record.lyrics.is_none());
    }

    #[test]
    fn test_record_from_match_uses_catalog_names() {
        let record = EnrichmentRecord::from_match(&sample_match());
        assert_eq!(record.song, "Drunk in Love");
        assert_eq!(record.artist, "Beyoncé");
        assert_eq!(record.track_id.as_deref(), Some("6jG2YzhxptolDzLHTGLt7S"));
        assert_eq!(record.release_date_precision, Some(ReleaseDatePrecision::Day));
    }

    #[test]
    fn test_release_date_precision_parse() {
        assert_eq!(ReleaseDatePrecision::parse("year"), Some(ReleaseDatePrecision::Year));
        assert_eq!(ReleaseDatePrecision::parse("month"), Some(ReleaseDatePrecision::Month));
        assert_eq!(ReleaseDatePrecision::parse("day"), Some(ReleaseDatePrecision::Day));
        assert_eq!(ReleaseDatePrecision::parse("week"), None);
    }

    #[test]
    fn test_stats_record_counts_each_dimension() {
        let mut stats = EnrichStats::default();
        stats.record(&Provenance {
            strategy: Some(QueryStrategy::TrackOnly),
            audio_found: true,
            lyrics: Some(LyricsSource::CatalogNames),
        });
        stats.record(&Provenance::default());

        assert_eq!(stats.rows_processed, 2);
        assert_eq!(stats.matched_track_only, 1);
        assert_eq!(stats.catalog_misses, 1);
        assert_eq!(stats.catalog_matches(), 1);
        assert_eq!(stats.audio_found, 1);
        assert_eq!(stats.lyrics_catalog_names, 1);
        assert_eq!(stats.lyrics_misses, 1);
    }

    #[test]
    fn test_lookup_found_discards_misses() {
        assert_eq!(Lookup::Found(3).found(), Some(3));
        assert_eq!(Lookup::<i32>::NotFound.found(), None);
        assert_eq!(Lookup::<i32>::Transient("timeout".into()).found(), None);
    }
}
