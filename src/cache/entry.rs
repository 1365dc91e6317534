//! Cache Entry Module
//!
//! Defines stored entries, their namespace-specific metadata and TTL checks.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::cache::codec::{Compressed, Encoding};
use crate::cache::CacheNamespace;

// == Entry Metadata ==
/// Namespace-specific attributes stored alongside a payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntryMetadata {
    /// Source language of a recognition result
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    /// Endpoint that produced an API response
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, String>,
}

impl EntryMetadata {
    pub fn recognition(language: impl Into<String>) -> Self {
        Self {
            language: Some(language.into()),
            ..Self::default()
        }
    }

    pub fn api(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: Some(endpoint.into()),
            ..Self::default()
        }
    }

    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }
}

// == Cache Entry ==
/// A persisted entry. Timestamps are Unix milliseconds.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub namespace: CacheNamespace,
    pub key: String,
    /// Stored bytes, zlib-encoded or raw according to `encoding`
    pub data: Vec<u8>,
    pub encoding: Encoding,
    pub raw_size: u64,
    pub stored_size: u64,
    pub compression_ratio: f64,
    pub created_at: i64,
    pub accessed_at: i64,
    pub ttl_secs: u64,
    pub metadata: EntryMetadata,
}

impl CacheEntry {
    // == Constructor ==
    /// Builds a fresh entry created and accessed at `now_ms`.
    pub fn new(
        namespace: CacheNamespace,
        key: String,
        compressed: Compressed,
        raw_size: u64,
        ttl_secs: u64,
        metadata: EntryMetadata,
        now_ms: i64,
    ) -> Self {
        let stored_size = compressed.data.len() as u64;
        Self {
            namespace,
            key,
            data: compressed.data,
            encoding: compressed.encoding,
            raw_size,
            stored_size,
            compression_ratio: compressed.ratio,
            created_at: now_ms,
            accessed_at: now_ms,
            ttl_secs,
            metadata,
        }
    }

    pub fn expires_at(&self) -> i64 {
        expiry_ms(self.created_at, self.ttl_secs)
    }

    // == Is Expired ==
    /// An entry is live while `now - created_at < ttl`.
    pub fn is_expired(&self, now_ms: i64) -> bool {
        now_ms >= self.expires_at()
    }

    /// Remaining lifetime in milliseconds, 0 once expired.
    pub fn ttl_remaining_ms(&self, now_ms: i64) -> u64 {
        self.expires_at().saturating_sub(now_ms).max(0) as u64
    }

    // == Touch ==
    /// Refreshes the access time, never moving it before creation.
    pub fn touch(&mut self, now_ms: i64) {
        self.accessed_at = now_ms.max(self.created_at);
    }
}

// == Cached Value ==
/// A decoded entry as handed back to consumers.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedValue {
    pub namespace: CacheNamespace,
    pub key: String,
    pub payload: Vec<u8>,
    pub metadata: EntryMetadata,
    pub compression_ratio: f64,
    pub created_at: i64,
    pub accessed_at: i64,
    pub ttl_secs: u64,
}

impl CachedValue {
    pub fn from_entry(entry: CacheEntry, payload: Vec<u8>) -> Self {
        Self {
            namespace: entry.namespace,
            key: entry.key,
            payload,
            metadata: entry.metadata,
            compression_ratio: entry.compression_ratio,
            created_at: entry.created_at,
            accessed_at: entry.accessed_at,
            ttl_secs: entry.ttl_secs,
        }
    }

    pub fn is_expired(&self, now_ms: i64) -> bool {
        now_ms >= expiry_ms(self.created_at, self.ttl_secs)
    }
}

// == Utility Functions ==
/// Expiry instant in Unix milliseconds, saturating on absurd TTLs.
pub fn expiry_ms(created_at: i64, ttl_secs: u64) -> i64 {
    let ttl_ms = i64::try_from(ttl_secs)
        .unwrap_or(i64::MAX)
        .saturating_mul(1000);
    created_at.saturating_add(ttl_ms)
}
