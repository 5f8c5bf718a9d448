//! Audio descriptor lookup for a resolved catalog id.

use crate::catalog::CatalogClient;
use crate::models::{AudioDescriptor, Lookup};
use crate::retry::RetryPolicy;
use log::warn;
use serde_json::Value;

pub struct AudioFeatureFetcher<'a> {
    client: &'a dyn CatalogClient,
    retry: RetryPolicy,
}

impl<'a> AudioFeatureFetcher<'a> {
    /// Fetcher issuing lookups through `client`.
    pub fn new(client: &'a dyn CatalogClient, retry: RetryPolicy) -> Self {
        Self { client, retry }
    }

    /// Audio descriptors for `catalog_id`, retrying transient failures.
    pub fn fetch(&self, catalog_id: &str) -> Lookup<AudioDescriptor> {
        let label = format!("audio features {}", catalog_id);
        let payload = match self
            .retry
            .run(&label, || self.client.audio_features(catalog_id))
        {
            Ok(payload) => payload,
            Err(error) if error.is_transient() => {
                warn!("Giving up on audio features for track id \"{}\": {}", catalog_id, error);
                return Lookup::Transient(error.to_string());
            }
            Err(error) => {
                warn!("Audio features failed for track id \"{}\": {}", catalog_id, error);
                return Lookup::NotFound;
            }
        };

        match parse_audio_features(payload) {
            Ok(Some(descriptor)) => Lookup::Found(descriptor),
            Ok(None) => Lookup::NotFound,
            Err(reason) => {
                warn!("Malformed audio features for track id \"{}\": {}", catalog_id, reason);
                Lookup::NotFound
            }
        }
    }
}

/// Accepts either the bare object or the batch shape `{"audio_features": [obj]}`.
/// `Ok(None)` means the catalog has no descriptors for the id.
pub fn parse_audio_features(payload: Value) -> Result<Option<AudioDescriptor>, String> {
    let object = match payload {
        Value::Null => return Ok(None),
        Value::Object(mut map) if map.contains_key("audio_features") => {
            match map.remove("audio_features") {
                Some(Value::Array(mut items)) if !items.is_empty() => items.swap_remove(0),
                Some(Value::Array(_)) | Some(Value::Null) => return Ok(None),
                _ => return Err("audio_features is not an array".to_string()),
            }
        }
        other => other,
    };
    if object.is_null() {
        return Ok(None);
    }
    serde_json::from_value(object)
        .map(Some)
        .map_err(|err| err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RemoteError;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn features_json() -> Value {
        json!({
            "danceability": 0.735, "energy": 0.578, "key": 5, "loudness": -11.84,
            "mode": 0, "speechiness": 0.0461, "acousticness": 0.514,
            "instrumentalness": 0.0902, "liveness": 0.159, "valence": 0.624,
            "tempo": 98.002, "time_signature": 4, "duration_ms": 255349,
            "id": "06AKEBrKUckW0KREUWRnvT", "type": "audio_features"
        })
    }

    struct FlakyCatalog {
        timeouts_before_success: usize,
        calls: AtomicUsize,
        payload: Value,
    }

    impl CatalogClient for FlakyCatalog {
        fn search(&self, _q: &str, _limit: u32, _market: &str) -> Result<Value, RemoteError> {
            unreachable!("audio fetcher never searches")
        }

        fn audio_features(&self, _id: &str) -> Result<Value, RemoteError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.timeouts_before_success {
                Err(RemoteError::Timeout("read timed out".into()))
            } else {
                Ok(self.payload.clone())
            }
        }
    }

    #[test]
    fn test_parse_bare_and_batch_shapes() {
        let bare = parse_audio_features(features_json()).unwrap().unwrap();
        assert_eq!(bare.key, 5);
        assert_eq!(bare.duration_ms, 255349);
        assert!((bare.tempo - 98.002).abs() < f64::EPSILON);

        let batch = parse_audio_features(json!({ "audio_features": [features_json()] }))
            .unwrap()
            .unwrap();
        assert_eq!(batch, bare);
    }

    #[test]
    fn test_parse_null_and_incomplete() {
        assert_eq!(parse_audio_features(Value::Null), Ok(None));
        assert_eq!(parse_audio_features(json!({ "audio_features": [null] })), Ok(None));
        assert!(parse_audio_features(json!({ "danceability": 0.5 })).is_err());
    }

    #[test]
    fn test_timeouts_are_retried() {
        let catalog = FlakyCatalog {
            timeouts_before_success: 2,
            calls: AtomicUsize::new(0),
            payload: features_json(),
        };
        let fetcher = AudioFeatureFetcher::new(&catalog, RetryPolicy::immediate(5));
        assert!(fetcher.fetch("06AKEBrKUckW0KREUWRnvT").is_found());
        assert_eq!(catalog.calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_retry_budget_exhausted_is_transient() {
        let catalog = FlakyCatalog {
            timeouts_before_success: 10,
            calls: AtomicUsize::new(0),
            payload: features_json(),
        };
        let fetcher = AudioFeatureFetcher::new(&catalog, RetryPolicy::immediate(3));
        assert!(matches!(fetcher.fetch("x"), Lookup::Transient(_)));
        assert_eq!(catalog.calls.load(Ordering::SeqCst), 3);
    }
}
