//! Lyric page resolution.
//!
//! Walks the slug candidates for an (artist, track) pair in priority order,
//! fetching `<base>/<artist>-<track>-lyrics` for each until one page yields
//! lyric text. A missing page is the common case and is not an error.

use crate::config::{CONNECT_TIMEOUT, READ_TIMEOUT};
use crate::error::RemoteError;
use crate::models::Lookup;
use crate::retry::RetryPolicy;
use crate::slug::{SlugCandidate, SlugVariantGenerator};
use log::{debug, info, warn};
use once_cell::sync::Lazy;
use scraper::{Html, Selector};

/// Lyric page capability. `Ok(None)` means the page does not exist.
pub trait PageFetcher: Send + Sync {
    fn fetch(&self, url: &str) -> Result<Option<String>, RemoteError>;
}

/// `ureq`-backed page fetcher.
pub struct HttpPageFetcher {
    http_client: ureq::Agent,
}

impl HttpPageFetcher {
    /// Fetcher with the default timeouts and user agent.
    pub fn new() -> Self {
        let http_client = ureq::AgentBuilder::new()
            .timeout_connect(CONNECT_TIMEOUT)
            .timeout_read(READ_TIMEOUT)
            .timeout_write(READ_TIMEOUT)
            .user_agent(concat!("track-enrich/", env!("CARGO_PKG_VERSION")))
            .build();
        Self { http_client }
    }
}

impl Default for HttpPageFetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl PageFetcher for HttpPageFetcher {
    fn fetch(&self, url: &str) -> Result<Option<String>, RemoteError> {
        match self.http_client.get(url).call() {
            Ok(response) => response
                .into_string()
                .map(Some)
                .map_err(RemoteError::from_io),
            Err(ureq::Error::Status(404, _)) | Err(ureq::Error::Status(410, _)) => Ok(None),
            Err(error) => Err(RemoteError::from_ureq(error)),
        }
    }
}

// ============================================================================
// EXTRACTION
// ============================================================================

/// Legacy page layout: one `<div class="lyrics">`.
static LEGACY_CONTAINER: Lazy<Selector> = Lazy::new(|| Selector::parse("div.lyrics").unwrap());

/// Current layout: one or more `<div class="Lyrics__Container-...">` blocks.
static CURRENT_CONTAINER: Lazy<Selector> =
    Lazy::new(|| Selector::parse(r#"div[class^="Lyrics__Container"]"#).unwrap());

/// Replaces line breaks with the two characters `\n`.
pub fn escape_newlines(text: &str) -> String {
    text.replace("\r\n", "\n").replace('\n', "\\n")
}

fn container_text(document: &Html, selector: &Selector) -> Option<String> {
    let pieces: Vec<&str> = document
        .select(selector)
        .flat_map(|element| element.text())
        .filter(|piece| !piece.is_empty())
        .collect();
    let text = pieces.join("\n");
    let text = text.trim();
    (!text.is_empty()).then(|| text.to_string())
}

/// Pulls lyric text out of a page, legacy container first. The returned text
/// has its newlines already escaped.
pub fn extract_lyrics(html: &str) -> Option<String> {
    let document = Html::parse_document(html);
    container_text(&document, &LEGACY_CONTAINER)
        .or_else(|| container_text(&document, &CURRENT_CONTAINER))
        .map(|text| escape_newlines(&text))
}

// ============================================================================
// RESOLVER
// ============================================================================

pub struct LyricsResolver<'a> {
    fetcher: &'a dyn PageFetcher,
    slugs: SlugVariantGenerator,
    base_url: String,
    retry: RetryPolicy,
}

impl<'a> LyricsResolver<'a> {
    /// Resolver building page URLs under `base_url`.
    pub fn new(
        fetcher: &'a dyn PageFetcher,
        slugs: SlugVariantGenerator,
        base_url: &str,
        retry: RetryPolicy,
    ) -> Self {
        let mut base_url = base_url.trim().to_string();
        if !base_url.ends_with('/') {
            base_url.push('/');
        }
        Self {
            fetcher,
            slugs,
            base_url,
            retry,
        }
    }

    /// Lyric page URL for one slug pair.
    pub fn page_url(&self, candidate: &SlugCandidate) -> String {
        format!(
            "{}{}-{}-lyrics",
            self.base_url,
            urlencoding::encode(&candidate.artist),
            urlencoding::encode(&candidate.track)
        )
    }

    /// Candidate page URLs in the order they are tried.
    pub fn candidate_urls(&self, artist: &str, track: &str) -> Vec<String> {
        self.slugs
            .candidates(artist, track)
            .iter()
            .map(|candidate| self.page_url(candidate))
            .collect()
    }

    /// Lyric text of the first candidate page that has any.
    pub fn resolve(&self, artist: &str, track: &str) -> Option<String> {
        let urls = self.candidate_urls(artist, track);
        for url in &urls {
            match self.try_page(url) {
                Lookup::Found(text) => return Some(text),
                Lookup::NotFound => debug!("No lyrics at {}", url),
                Lookup::Transient(reason) => warn!("Giving up on {}: {}", url, reason),
            }
        }
        info!(
            "No lyrics for artist \"{}\", track \"{}\" after {} candidate page(s): {}",
            artist,
            track,
            urls.len(),
            urls.join(" ")
        );
        None
    }

    fn try_page(&self, url: &str) -> Lookup<String> {
        match self.retry.run(url, || self.fetcher.fetch(url)) {
            Ok(Some(html)) => match extract_lyrics(&html) {
                Some(text) => Lookup::Found(text),
                None => Lookup::NotFound,
            },
            Ok(None) => Lookup::NotFound,
            Err(error) if error.is_transient() => Lookup::Transient(error.to_string()),
            Err(error) => {
                warn!("Fetching {} failed: {}", url, error);
                Lookup::NotFound
            }
        }
    }
}
