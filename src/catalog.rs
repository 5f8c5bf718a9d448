//! Catalog capability consumed by the resolver and the audio fetcher.
//!
//! Implementations return the raw JSON payload; interpreting its shape is the
//! caller's job so a malformed payload is a miss rather than a client error.

use crate::error::RemoteError;
use serde_json::Value;

pub trait CatalogClient: Send + Sync {
    /// Track search. The payload follows the Web API search shape
    /// (`tracks.items[]`).
    fn search(&self, query: &str, limit: u32, market: &str) -> Result<Value, RemoteError>;

    /// Audio-features object for one catalog id (may be JSON `null`).
    fn audio_features(&self, catalog_id: &str) -> Result<Value, RemoteError>;
}

impl<C: CatalogClient + ?Sized> CatalogClient for &C {
    fn search(&self, query: &str, limit: u32, market: &str) -> Result<Value, RemoteError> {
        (**self).search(query, limit, market)
    }

    fn audio_features(&self, catalog_id: &str) -> Result<Value, RemoteError> {
        (**self).audio_features(catalog_id)
    }
}

/// Builds the query strings used by the resolver.
pub mod query {
    /// `track:<track> artist:<artist>`
    pub fn combined(artist: &str, track: &str) -> String {
        format!("track:{} artist:{}", track, artist)
    }

    /// `track:<track>`
    pub fn track_only(track: &str) -> String {
        format!("track:{}", track)
    }

    /// Removes straight and typographic apostrophes.
    pub fn strip_apostrophes(s: &str) -> String {
        s.chars().filter(|c| !matches!(c, '\'' | '\u{2019}' | '\u{2018}')).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::query;

    #[test]
    fn test_query_formats() {
        assert_eq!(query::combined("Adele", "Hello"), "track:Hello artist:Adele");
        assert_eq!(query::track_only("Hello"), "track:Hello");
    }

    #[test]
    fn test_strip_apostrophes() {
        assert_eq!(query::strip_apostrophes("Don't Stop Me Now"), "Dont Stop Me Now");
        assert_eq!(query::strip_apostrophes("Rock \u{2019}n\u{2019} Roll"), "Rock n Roll");
        assert_eq!(query::strip_apostrophes("Plain"), "Plain");
    }
}
