//! Spotify Web API adapter backed by `ureq`.

use crate::catalog::CatalogClient;
use crate::config::{CONNECT_TIMEOUT, READ_TIMEOUT};
use crate::error::RemoteError;
use serde_json::Value;

/// Catalog client authenticated with a caller-supplied bearer token.
pub struct SpotifyClient {
    http_client: ureq::Agent,
    base_url: String,
    access_token: String,
}

impl SpotifyClient {
    /// Client for `base_url` authenticating with `access_token`.
    pub fn new(base_url: &str, access_token: impl Into<String>) -> Self {
        let http_client = ureq::AgentBuilder::new()
            .timeout_connect(CONNECT_TIMEOUT)
            .timeout_read(READ_TIMEOUT)
            .timeout_write(READ_TIMEOUT)
            .build();
        Self {
            http_client,
            base_url: base_url.trim().trim_end_matches('/').to_string(),
            access_token: access_token.into(),
        }
    }

    fn get_json(&self, request: ureq::Request) -> Result<Value, RemoteError> {
        let response = request
            .set("Authorization", &format!("Bearer {}", self.access_token))
            .call()
            .map_err(RemoteError::from_ureq)?;
        response.into_json::<Value>().map_err(|err| {
            if err.kind() == std::io::ErrorKind::InvalidData {
                RemoteError::Malformed(err.to_string())
            } else {
                RemoteError::from_io(err)
            }
        })
    }
}

impl CatalogClient for SpotifyClient {
    fn search(&self, query: &str, limit: u32, market: &str) -> Result<Value, RemoteError> {
        let url = format!("{}/search", self.base_url);
        let request = self
            .http_client
            .get(&url)
            .query("q", query)
            .query("type", "track")
            .query("limit", &limit.to_string())
            .query("offset", "0")
            .query("market", market);
        self.get_json(request)
    }

    fn audio_features(&self, catalog_id: &str) -> Result<Value, RemoteError> {
        let url = format!(
            "{}/audio-features/{}",
            self.base_url,
            urlencoding::encode(catalog_id)
        );
        self.get_json(self.http_client.get(&url))
    }
}
