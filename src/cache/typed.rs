//! Typed Helpers Module
//!
//! Convenience wrappers over `CacheSystem` for the three consumers: page
//! images, recognized text and dictionary/translation API responses.
//! Like the facade they are best-effort, but they flatten every failure into
//! `None` after logging it.

use serde_json::Value;
use tracing::warn;

use crate::cache::{CacheNamespace, CacheSystem, EntryMetadata, KeyInput};

impl CacheSystem {
    // == Images ==
    /// Caches encoded image bytes, returning their content key.
    pub fn cache_image(&self, image: &[u8]) -> Option<String> {
        self.put(CacheNamespace::Image, image, EntryMetadata::default(), None)
            .map_err(|e| warn!("Failed to cache image: {}", e))
            .ok()
    }

    pub fn cached_image(&self, key: &str) -> Option<Vec<u8>> {
        self.get(CacheNamespace::Image, key)
            .map_err(|e| warn!(key, "Failed to read cached image: {}", e))
            .ok()
            .flatten()
    }

    // == Recognition Results ==
    /// Caches recognized text, keyed by the text itself.
    pub fn cache_recognition(&self, text: &str, language: &str) -> Option<String> {
        self.put_keyed(
            CacheNamespace::RecognitionResult,
            KeyInput::Text(text),
            text.as_bytes(),
            EntryMetadata::recognition(language),
            None,
        )
        .map_err(|e| warn!("Failed to cache recognition result: {}", e))
        .ok()
    }

    /// Returns the text and its recognition language.
    pub fn cached_recognition(&self, key: &str) -> Option<(String, Option<String>)> {
        let value = self
            .lookup(CacheNamespace::RecognitionResult, key)
            .map_err(|e| warn!(key, "Failed to read cached recognition result: {}", e))
            .ok()??;
        match String::from_utf8(value.payload) {
            Ok(text) => Some((text, value.metadata.language)),
            Err(e) => {
                warn!(key, "Cached recognition result is not UTF-8: {}", e);
                None
            }
        }
    }

    // == API Responses ==
    /// Caches a JSON response under the canonical form of its request.
    pub fn cache_api_response(
        &self,
        endpoint: &str,
        params: &Value,
        response: &Value,
        ttl: Option<u64>,
    ) -> Option<String> {
        let body = serde_json::to_vec(response)
            .map_err(|e| warn!(endpoint, "Failed to serialize API response: {}", e))
            .ok()?;
        self.put_keyed(
            CacheNamespace::ApiResponse,
            KeyInput::Request { endpoint, params },
            &body,
            EntryMetadata::api(endpoint),
            ttl,
        )
        .map_err(|e| warn!(endpoint, "Failed to cache API response: {}", e))
        .ok()
    }

    pub fn cached_api_response(&self, endpoint: &str, params: &Value) -> Option<Value> {
        let key = self.key_for(CacheNamespace::ApiResponse, KeyInput::Request { endpoint, params });
        let body = self
            .get(CacheNamespace::ApiResponse, &key)
            .map_err(|e| warn!(endpoint, "Failed to read cached API response: {}", e))
            .ok()??;
        serde_json::from_slice(&body)
            .map_err(|e| warn!(endpoint, "Cached API response is not valid JSON: {}", e))
            .ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::ManualClock;
    use crate::config::Config;
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;

    fn cache() -> (CacheSystem, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(1_700_000_000_000));
        let cache = CacheSystem::in_memory(Config::default(), clock.clone()).unwrap();
        (cache, clock)
    }

    #[test]
    fn test_image_round_trip() {
        let (cache, _) = cache();
        let png = [&b"\x89PNG\r\n\x1a\n"[..], &[0u8; 2048][..]].concat();

        let key = cache.cache_image(&png).unwrap();
        assert!(key.starts_with("img_"));
        assert_eq!(cache.cached_image(&key), Some(png));
        assert_eq!(cache.cached_image("img_missing"), None);
        assert_eq!(cache.cached_image(""), None);
    }

    #[test]
    fn test_recognition_keeps_language() {
        let (cache, _) = cache();
        let key = cache.cache_recognition("Gallia est omnis divisa", "lat").unwrap();
        assert!(key.starts_with("ocr_"));

        let (text, language) = cache.cached_recognition(&key).unwrap();
        assert_eq!(text, "Gallia est omnis divisa");
        assert_eq!(language.as_deref(), Some("lat"));
    }

    #[test]
    fn test_api_response_param_order_irrelevant() {
        let (cache, _) = cache();
        let response = json!({"lemma": "λόγος", "senses": ["word", "reason"]});
        cache
            .cache_api_response("/lookup", &json!({"word": "λόγου", "lang": "grc"}), &response, None)
            .unwrap();

        let found = cache.cached_api_response("/lookup", &json!({"lang": "grc", "word": "λόγου"}));
        assert_eq!(found, Some(response));
        assert_eq!(cache.cached_api_response("/other", &json!({"lang": "grc", "word": "λόγου"})), None);
    }

    #[test]
    fn test_api_response_honors_ttl() {
        let (cache, clock) = cache();
        let params = json!({"q": "amicus"});
        let first = cache.cache_api_response("/translate", &params, &json!("friend"), Some(1)).unwrap();

        clock.advance(Duration::from_secs(2));
        assert_eq!(cache.cached_api_response("/translate", &params), None);

        let second = cache.cache_api_response("/translate", &params, &json!("friend"), Some(1)).unwrap();
        assert_eq!(first, second);
        assert_eq!(cache.cached_api_response("/translate", &params), Some(json!("friend")));
    }

    #[test]
    fn test_zero_ttl_is_logged_not_returned() {
        let (cache, _) = cache();
        assert_eq!(cache.cache_api_response("/x", &json!({}), &json!(null), Some(0)), None);
    }
}
