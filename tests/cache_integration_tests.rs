//! Integration Tests for the Cache System
//!
//! Exercises the public API end to end against real database files.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::sleep;
use std::time::Duration;

use ocr_cache::cache::{EntryMetadata, KeyInput};
use ocr_cache::{CacheNamespace, CacheSystem, ClearScope, Config};
use serde_json::json;
use tempfile::TempDir;

// == Helper Functions ==

fn open_cache(dir: &TempDir) -> CacheSystem {
    let config = Config::default().with_db_path(dir.path().join("cache.db"));
    CacheSystem::open(config).unwrap()
}

/// PNG signature followed by a scanline-like body that compresses well.
fn page_image(len: usize) -> Vec<u8> {
    let mut image = b"\x89PNG\r\n\x1a\n".to_vec();
    image.extend((0..len).map(|i| if (i / 64) % 7 == 0 { 0x00 } else { (i % 251) as u8 }));
    image
}

// == Image Tests ==

#[test]
fn test_image_round_trip_and_unknown_key() {
    let dir = TempDir::new().unwrap();
    let cache = open_cache(&dir);
    assert!(cache.is_persistent());

    let image = page_image(1024 * 1024);
    let key = cache.put(CacheNamespace::Image, &image, EntryMetadata::default(), None).unwrap();
    assert!(key.starts_with("img_"));
    assert_eq!(cache.get(CacheNamespace::Image, &key).unwrap(), Some(image));

    let before = cache.statistics().misses;
    assert_eq!(cache.get(CacheNamespace::Image, "unknown-key").unwrap(), None);
    assert_eq!(cache.statistics().misses, before + 1);
}

#[test]
fn test_large_image_is_stored_compressed() {
    let dir = TempDir::new().unwrap();
    let cache = open_cache(&dir);

    let image = page_image(1024 * 1024);
    cache.put(CacheNamespace::Image, &image, EntryMetadata::default(), None).unwrap();

    let stats = cache.statistics();
    let images = stats.namespace(CacheNamespace::Image).unwrap();
    assert_eq!(images.entries, 1);
    assert!(images.size < image.len() as u64);
    assert_eq!(stats.compressions, 1);
}

// == API Response Tests ==

#[test]
fn test_api_response_expires_and_recaches() {
    let dir = TempDir::new().unwrap();
    let cache = open_cache(&dir);
    let params = json!({"word": "arma", "lang": "la"});
    let response = json!({"translation": "weapons"});

    let first = cache.cache_api_response("/translate", &params, &response, Some(1)).unwrap();
    assert_eq!(cache.cached_api_response("/translate", &params), Some(response.clone()));

    sleep(Duration::from_secs(2));
    assert_eq!(cache.cached_api_response("/translate", &params), None);

    let second = cache.cache_api_response("/translate", &params, &response, Some(1)).unwrap();
    assert_eq!(first, second);
    assert_eq!(cache.cached_api_response("/translate", &params), Some(response));
}

// == Persistence Tests ==

#[test]
fn test_entries_survive_reopen() {
    let dir = TempDir::new().unwrap();
    let text_key = {
        let cache = open_cache(&dir);
        cache.cache_recognition("μῆνιν ἄειδε θεὰ", "grc").unwrap()
    };

    let cache = open_cache(&dir);
    let (text, language) = cache.cached_recognition(&text_key).unwrap();
    assert_eq!(text, "μῆνιν ἄειδε θεὰ");
    assert_eq!(language.as_deref(), Some("grc"));

    let stats = cache.statistics();
    assert_eq!(stats.hits, 1);
    assert_eq!(stats.memory_entries, 1);
}

#[test]
fn test_clear_all_persists() {
    let dir = TempDir::new().unwrap();
    {
        let cache = open_cache(&dir);
        cache.cache_image(b"page one").unwrap();
        cache.cache_recognition("page one", "eng").unwrap();
        assert_eq!(cache.clear(ClearScope::All), 2);
    }

    let cache = open_cache(&dir);
    assert_eq!(cache.statistics().total_size, 0);
}

// == Degraded Mode Tests ==

#[test]
fn test_unwritable_location_runs_memory_only() {
    let dir = TempDir::new().unwrap();
    let file = dir.path().join("not-a-directory");
    std::fs::write(&file, b"").unwrap();

    let cache = CacheSystem::open(Config::default().with_db_path(file.join("cache.db"))).unwrap();
    assert!(!cache.is_persistent());

    let key = cache.cache_image(b"scan").unwrap();
    assert_eq!(cache.cached_image(&key), Some(b"scan".to_vec()));
    assert!(!cache.statistics().storage_available);
}

// == Get Or Compute Tests ==

#[tokio::test]
async fn test_get_or_compute_async_shares_results() {
    let dir = TempDir::new().unwrap();
    let cache = Arc::new(open_cache(&dir));
    let calls = Arc::new(AtomicUsize::new(0));
    let params = json!({"lemma": "amo"});

    for _ in 0..2 {
        let calls = calls.clone();
        let body = cache
            .get_or_compute_async(
                CacheNamespace::ApiResponse,
                KeyInput::Request { endpoint: "/conjugate", params: &params },
                || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, std::io::Error>(br#"{"present":"amo"}"#.to_vec())
                },
            )
            .await
            .unwrap();
        assert_eq!(body, br#"{"present":"amo"}"#.to_vec());
    }

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(cache.cached_api_response("/conjugate", &params), Some(json!({"present": "amo"})));
}

#[test]
fn test_shared_across_threads() {
    let dir = TempDir::new().unwrap();
    let cache = Arc::new(open_cache(&dir));

    let handles: Vec<_> = (0..4)
        .map(|t| {
            let cache = cache.clone();
            std::thread::spawn(move || {
                for i in 0..25 {
                    let text = format!("thread {} line {}", t, i);
                    let key = cache.cache_recognition(&text, "eng").unwrap();
                    assert_eq!(cache.cached_recognition(&key).map(|(t, _)| t), Some(text));
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let stats = cache.statistics();
    assert_eq!(stats.namespace(CacheNamespace::RecognitionResult).unwrap().entries, 100);
    assert_eq!(stats.hits, 100);
}
