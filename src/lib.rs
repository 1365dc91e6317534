//! OCR Cache - Tiered cache for an OCR workstation
//!
//! Caches page images, recognition results and dictionary/translation API
//! responses behind content-addressed keys, with zlib compression, per-entry
//! TTL and size-bounded LRU eviction over a memory tier and a SQLite tier.

pub mod cache;
pub mod config;
pub mod error;

pub use cache::{CacheNamespace, CacheSystem, ClearScope};
pub use config::Config;
pub use error::CacheError;
