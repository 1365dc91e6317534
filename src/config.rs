//! Configuration Module
//!
//! Handles loading and validating cache configuration. Every value has a
//! built-in default and may be overridden through environment variables or
//! directly by the embedding application.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use crate::cache::CacheNamespace;
use crate::error::{CacheError, Result};

const MIB: u64 = 1024 * 1024;

// == Namespace Config ==
/// Capacity and default TTL of one namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NamespaceConfig {
    /// Aggregate stored size cap in bytes
    pub max_size: u64,
    /// TTL in seconds for entries stored without an explicit TTL
    pub default_ttl: u64,
}

impl NamespaceConfig {
    pub const fn new(max_size: u64, default_ttl: u64) -> Self {
        Self {
            max_size,
            default_ttl,
        }
    }
}

/// Cache configuration parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// SQLite file backing the persistent tier
    pub db_path: PathBuf,
    pub image: NamespaceConfig,
    pub recognition: NamespaceConfig,
    pub api: NamespaceConfig,
    /// Maximum number of entries mirrored in memory
    pub memory_tier_capacity: usize,
    /// Payloads smaller than this many bytes are mirrored in memory
    pub memory_promotion_threshold: usize,
    /// zlib level, 0-9
    pub compression_level: u32,
    /// Fraction of `max_size` a namespace is trimmed down to
    pub eviction_target_ratio: f64,
    /// Fraction of a namespace's entries removed per eviction batch
    pub eviction_batch_fraction: f64,
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `OCR_CACHE_DB_PATH` - Database file (default: `$HOME/.ocr_cache/cache.db`)
    /// - `OCR_CACHE_IMAGE_MAX_SIZE` / `OCR_CACHE_OCR_MAX_SIZE` / `OCR_CACHE_API_MAX_SIZE` - Bytes
    /// - `OCR_CACHE_IMAGE_TTL` / `OCR_CACHE_OCR_TTL` / `OCR_CACHE_API_TTL` - Seconds
    /// - `OCR_CACHE_MEMORY_CAPACITY` - Memory tier entry count (default: 100)
    /// - `OCR_CACHE_MEMORY_THRESHOLD` - Memory promotion threshold in bytes (default: 1 MiB)
    /// - `OCR_CACHE_COMPRESSION_LEVEL` - zlib level (default: 9)
    ///
    /// Unparseable values fall back to their defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            db_path: env::var_os("OCR_CACHE_DB_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.db_path),
            image: NamespaceConfig::new(
                env_or("OCR_CACHE_IMAGE_MAX_SIZE", defaults.image.max_size),
                env_or("OCR_CACHE_IMAGE_TTL", defaults.image.default_ttl),
            ),
            recognition: NamespaceConfig::new(
                env_or("OCR_CACHE_OCR_MAX_SIZE", defaults.recognition.max_size),
                env_or("OCR_CACHE_OCR_TTL", defaults.recognition.default_ttl),
            ),
            api: NamespaceConfig::new(
                env_or("OCR_CACHE_API_MAX_SIZE", defaults.api.max_size),
                env_or("OCR_CACHE_API_TTL", defaults.api.default_ttl),
            ),
            memory_tier_capacity: env_or("OCR_CACHE_MEMORY_CAPACITY", defaults.memory_tier_capacity),
            memory_promotion_threshold: env_or(
                "OCR_CACHE_MEMORY_THRESHOLD",
                defaults.memory_promotion_threshold,
            ),
            compression_level: env_or("OCR_CACHE_COMPRESSION_LEVEL", defaults.compression_level),
            eviction_target_ratio: defaults.eviction_target_ratio,
            eviction_batch_fraction: defaults.eviction_batch_fraction,
        }
    }

    pub fn with_db_path(mut self, db_path: impl Into<PathBuf>) -> Self {
        self.db_path = db_path.into();
        self
    }

    pub fn namespace(&self, namespace: CacheNamespace) -> &NamespaceConfig {
        match namespace {
            CacheNamespace::Image => &self.image,
            CacheNamespace::RecognitionResult => &self.recognition,
            CacheNamespace::ApiResponse => &self.api,
        }
    }

    pub fn namespace_mut(&mut self, namespace: CacheNamespace) -> &mut NamespaceConfig {
        match namespace {
            CacheNamespace::Image => &mut self.image,
            CacheNamespace::RecognitionResult => &mut self.recognition,
            CacheNamespace::ApiResponse => &mut self.api,
        }
    }

    // == Validate ==
    /// Rejects configurations the cache cannot honor.
    pub fn validate(&self) -> Result<()> {
        for ns in CacheNamespace::ALL {
            let settings = self.namespace(ns);
            if settings.max_size == 0 {
                return Err(CacheError::Validation(format!("{}: max_size must be positive", ns)));
            }
            if settings.default_ttl == 0 {
                return Err(CacheError::Validation(format!("{}: default_ttl must be positive", ns)));
            }
        }
        if self.compression_level > 9 {
            return Err(CacheError::Validation(format!(
                "compression_level must be between 0 and 9, got {}",
                self.compression_level
            )));
        }
        if self.db_path.as_os_str().is_empty() {
            return Err(CacheError::Validation("db_path cannot be empty".to_string()));
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            image: NamespaceConfig::new(500 * MIB, 24 * 60 * 60),
            recognition: NamespaceConfig::new(100 * MIB, 24 * 60 * 60),
            api: NamespaceConfig::new(50 * MIB, 60 * 60),
            memory_tier_capacity: 100,
            memory_promotion_threshold: MIB as usize,
            compression_level: 9,
            eviction_target_ratio: 0.9,
            eviction_batch_fraction: 0.1,
        }
    }
}

/// `$HOME/.ocr_cache/cache.db`, or relative to the working directory without `HOME`.
pub fn default_db_path() -> PathBuf {
    env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".ocr_cache")
        .join("cache.db")
}

fn env_or<T: FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}
