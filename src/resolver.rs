//! Catalog resolution with ordered query fallback.
//!
//! Strategies are tried in order and the first hit wins:
//! 1. `track:<track> artist:<artist>`
//! 2. the same with apostrophes removed from both fields
//! 3. `track:<track>` alone (catalog bills the track under another artist)
//!
//! Empty results, malformed payloads and exhausted retries all mean
//! "this strategy found nothing"; none of them stop the job.

use crate::catalog::{query, CatalogClient};
use crate::config::CatalogSettings;
use crate::models::{CatalogMatch, Lookup, QueryStrategy, ReleaseDatePrecision};
use crate::retry::RetryPolicy;
use log::{debug, info, warn};
use serde_json::Value;

/// A catalog match together with the strategy that found it.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub catalog_match: CatalogMatch,
    pub strategy: QueryStrategy,
}

pub struct QueryFallbackResolver<'a> {
    client: &'a dyn CatalogClient,
    settings: CatalogSettings,
    retry: RetryPolicy,
}

impl<'a> QueryFallbackResolver<'a> {
    /// Resolver issuing searches through `client`.
    pub fn new(client: &'a dyn CatalogClient, settings: CatalogSettings, retry: RetryPolicy) -> Self {
        Self {
            client,
            settings,
            retry,
        }
    }

    /// Ordered (strategy, query) plan for one pair. The apostrophe-free query
    /// is left out when it is identical to the combined one.
    pub fn plan(artist: &str, track: &str) -> Vec<(QueryStrategy, String)> {
        let combined = query::combined(artist, track);
        let stripped = query::combined(
            &query::strip_apostrophes(artist),
            &query::strip_apostrophes(track),
        );
        let mut plan = vec![(QueryStrategy::Combined, combined.clone())];
        if stripped != combined {
            plan.push((QueryStrategy::CombinedNoApostrophes, stripped));
        }
        plan.push((QueryStrategy::TrackOnly, query::track_only(track)));
        plan
    }

    /// First catalog match over the query plan, or `None` once every
    /// strategy missed.
    pub fn resolve(&self, artist: &str, track: &str) -> Option<Resolution> {
        let plan = Self::plan(artist, track);
        for (strategy, q) in &plan {
            let strategy = *strategy;
            let q = q.as_str();
            match self.run_query(q) {
                Lookup::Found(catalog_match) => {
                    debug!("Catalog hit via {:?} for \"{}\" / \"{}\"", strategy, artist, track);
                    return Some(Resolution {
                        catalog_match,
                        strategy,
                    });
                }
                Lookup::NotFound => {
                    debug!("No catalog candidate for query \"{}\"", q);
                }
                Lookup::Transient(reason) => {
                    warn!(
                        "Giving up on query \"{}\" (artist \"{}\", track \"{}\"): {}",
                        q, artist, track, reason
                    );
                }
            }
        }
        let queries: Vec<&str> = plan.iter().map(|(_, q)| q.as_str()).collect();
        info!(
            "No catalog match for artist \"{}\", track \"{}\" after {} queries: {}",
            artist,
            track,
            queries.len(),
            queries.join(" | ")
        );
        None
    }

    fn run_query(&self, q: &str) -> Lookup<CatalogMatch> {
        let label = format!("catalog search \"{}\"", q);
        let payload = match self.retry.run(&label, || {
            self.client
                .search(q, self.settings.search_limit, &self.settings.market)
        }) {
            Ok(payload) => payload,
            Err(error) if error.is_transient() => return Lookup::Transient(error.to_string()),
            Err(error) => {
                warn!("Catalog search failed for query \"{}\": {}", q, error);
                return Lookup::NotFound;
            }
        };

        match parse_search_result(&payload) {
            Ok(Some(catalog_match)) => Lookup::Found(catalog_match),
            Ok(None) => Lookup::NotFound,
            Err(reason) => {
                warn!("Malformed catalog response for query \"{}\": {}", q, reason);
                Lookup::NotFound
            }
        }
    }
}

fn str_field<'v>(value: &'v Value, field: &str) -> Result<&'v str, String> {
    value
        .get(field)
        .and_then(Value::as_str)
        .ok_or_else(|| format!("missing string field '{}'", field))
}

/// Reads the first search hit. `Ok(None)` means the search had no items.
pub fn parse_search_result(payload: &Value) -> Result<Option<CatalogMatch>, String> {
    let items = payload
        .get("tracks")
        .and_then(|tracks| tracks.get("items"))
        .and_then(Value::as_array)
        .ok_or_else(|| "missing tracks.items".to_string())?;
    let Some(first) = items.first() else {
        return Ok(None);
    };

    let artists = first
        .get("artists")
        .and_then(Value::as_array)
        .ok_or_else(|| "missing artists".to_string())?;
    let mut names = artists
        .iter()
        .map(|artist| str_field(artist, "name").map(str::to_string))
        .collect::<Result<Vec<_>, _>>()?
        .into_iter();
    let resolved_artist = names.next().ok_or_else(|| "empty artists".to_string())?;
    let featured_artists: Vec<String> = names.collect();

    let album = first
        .get("album")
        .ok_or_else(|| "missing album".to_string())?;
    let precision_raw = str_field(album, "release_date_precision")?;
    let release_date_precision = ReleaseDatePrecision::parse(precision_raw)
        .ok_or_else(|| format!("unknown release date precision '{}'", precision_raw))?;

    let popularity = first
        .get("popularity")
        .and_then(Value::as_i64)
        .ok_or_else(|| "missing popularity".to_string())?;

    Ok(Some(CatalogMatch {
        resolved_song: str_field(first, "name")?.to_string(),
        resolved_artist,
        featured_artists,
        catalog_id: str_field(first, "id")?.to_string(),
        popularity,
        release_date: str_field(album, "release_date")?.to_string(),
        release_date_precision,
    }))
}
