//! Assembly of one output record per input pair.
//!
//! Order of operations:
//! 1. catalog resolution; on a match, audio descriptors for its id
//! 2. without a match the record keeps the raw input names
//! 3. lyrics with the input names
//! 4. if that failed and the catalog names differ, lyrics with the catalog names
//!
//! Nothing here fails: missing data is an empty field.

use crate::audio::AudioFeatureFetcher;
use crate::lyrics::LyricsResolver;
use crate::models::{EnrichmentRecord, InputPair, LyricsSource, Provenance};
use crate::resolver::QueryFallbackResolver;
use log::warn;

pub struct EnrichmentRecordBuilder<'a> {
    resolver: QueryFallbackResolver<'a>,
    audio: AudioFeatureFetcher<'a>,
    lyrics: LyricsResolver<'a>,
}

impl<'a> EnrichmentRecordBuilder<'a> {
    /// Builder over the three lookup stages.
    pub fn new(
        resolver: QueryFallbackResolver<'a>,
        audio: AudioFeatureFetcher<'a>,
        lyrics: LyricsResolver<'a>,
    ) -> Self {
        Self {
            resolver,
            audio,
            lyrics,
        }
    }

    /// One output record for `pair`, plus how each part was found.
    pub fn build(&self, pair: &InputPair) -> (EnrichmentRecord, Provenance) {
        let mut provenance = Provenance::default();

        let mut record = match self.resolver.resolve(&pair.artist, &pair.track) {
            Some(resolution) => {
                provenance.strategy = Some(resolution.strategy);
                let mut record = EnrichmentRecord::from_match(&resolution.catalog_match);
                if let Some(audio) = self.audio.fetch(&resolution.catalog_match.catalog_id).found() {
                    record.merge_audio(&audio);
                    provenance.audio_found = true;
                }
                record
            }
            None => EnrichmentRecord::from_input(pair),
        };

        if let Some(text) = self.lyrics.resolve(&pair.artist, &pair.track) {
            record.lyrics = Some(text);
            provenance.lyrics = Some(LyricsSource::InputNames);
        } else if record.artist != pair.artist || record.song != pair.track {
            if let Some(text) = self.lyrics.resolve(&record.artist, &record.song) {
                record.lyrics = Some(text);
                provenance.lyrics = Some(LyricsSource::CatalogNames);
            }
        }

        if provenance.strategy.is_none() && provenance.lyrics.is_none() {
            warn!(
                "Row \"{}\" / \"{}\" written without catalog data or lyrics",
                pair.track, pair.artist
            );
        }

        (record, provenance)
    }
}
