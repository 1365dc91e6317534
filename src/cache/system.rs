//! Cache System Module
//!
//! The facade consumers talk to. Lookups go memory tier first, persistent
//! tier second; writes compress, persist, mirror small payloads in memory and
//! then trim the namespace if it grew past its cap.
//!
//! Caching is best-effort: only validation errors are returned to callers.
//! Storage failures are logged and the call continues memory-only; a payload
//! that fails to decode is evicted and reported as a miss.

use std::future::Future;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, info, warn};

use crate::cache::{
    validate_key, CacheEntry, CacheNamespace, CacheStatistics, CachedValue, ClearScope, Clock,
    CompressionCodec, EntryMetadata, EvictionPolicy, KeyGenerator, KeyInput, Lookup, MemoryTier,
    NamespaceStatistics, PersistentStore, StatisticsCollector, SystemClock,
};
use crate::config::Config;
use crate::error::{CacheError, Result};

// == Cache System ==
/// Tiered cache shared by every consumer, usually behind an `Arc`.
#[derive(Debug)]
pub struct CacheSystem {
    config: Config,
    clock: Arc<dyn Clock>,
    keys: KeyGenerator,
    codec: CompressionCodec,
    /// `None` when the persistent tier could not be opened
    store: Option<PersistentStore>,
    memory: MemoryTier,
    /// Held for reading while a lookup copies a persistent entry into the
    /// memory tier, and for writing while a mutation updates both tiers.
    /// Always taken before either tier's own lock.
    tiers: RwLock<()>,
    eviction: EvictionPolicy,
    stats: StatisticsCollector,
}

impl CacheSystem {
    // == Constructors ==
    /// Opens the cache at `config.db_path` using the system clock.
    ///
    /// Only an invalid configuration is an error. If the database cannot be
    /// opened the cache still starts, serving from memory only.
    pub fn open(config: Config) -> Result<Self> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Like [`CacheSystem::open`] with an injected clock.
    pub fn with_clock(config: Config, clock: Arc<dyn Clock>) -> Result<Self> {
        config.validate()?;
        let store = match PersistentStore::open(&config.db_path) {
            Ok(store) => Some(store),
            Err(e) => {
                warn!(
                    "Persistent cache unavailable at {}, running memory-only: {}",
                    config.db_path.display(),
                    e
                );
                None
            }
        };
        Self::assemble(config, clock, store)
    }

    /// A cache whose persistent tier is a private in-memory database.
    pub fn in_memory(config: Config, clock: Arc<dyn Clock>) -> Result<Self> {
        config.validate()?;
        let store = PersistentStore::open_in_memory()?;
        Self::assemble(config, clock, Some(store))
    }

    /// A cache without a persistent tier.
    pub fn memory_only(config: Config, clock: Arc<dyn Clock>) -> Result<Self> {
        config.validate()?;
        Self::assemble(config, clock, None)
    }

    fn assemble(config: Config, clock: Arc<dyn Clock>, store: Option<PersistentStore>) -> Result<Self> {
        let codec = CompressionCodec::new(config.compression_level)?;
        let eviction = EvictionPolicy::new(config.eviction_target_ratio, config.eviction_batch_fraction)?;
        let memory = MemoryTier::new(config.memory_tier_capacity, config.memory_promotion_threshold);

        info!(
            "Cache system initialized: persistent={}, memory_capacity={}, compression_level={}",
            store.is_some(),
            config.memory_tier_capacity,
            config.compression_level
        );

        Ok(Self {
            config,
            clock,
            keys: KeyGenerator::new(),
            codec,
            store,
            memory,
            tiers: RwLock::new(()),
            eviction,
            stats: StatisticsCollector::new(),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Whether the persistent tier is available.
    pub fn is_persistent(&self) -> bool {
        self.store.is_some()
    }

    /// Key a `put_keyed`/`get_or_compute` call would use for this input.
    pub fn key_for(&self, namespace: CacheNamespace, input: KeyInput<'_>) -> String {
        self.keys.derive(namespace, input)
    }

    // == Put ==
    /// Stores a payload under the key derived from its own bytes.
    pub fn put(
        &self,
        namespace: CacheNamespace,
        payload: &[u8],
        metadata: EntryMetadata,
        ttl: Option<u64>,
    ) -> Result<String> {
        self.put_keyed(namespace, KeyInput::Bytes(payload), payload, metadata, ttl)
    }

    /// Stores a payload under the key derived from `input`.
    pub fn put_keyed(
        &self,
        namespace: CacheNamespace,
        input: KeyInput<'_>,
        payload: &[u8],
        metadata: EntryMetadata,
        ttl: Option<u64>,
    ) -> Result<String> {
        let key = self.keys.derive(namespace, input);
        self.put_with_key(namespace, &key, payload, metadata, ttl)?;
        Ok(key)
    }

    /// Stores a payload under a caller-chosen key, replacing any previous entry.
    pub fn put_with_key(
        &self,
        namespace: CacheNamespace,
        key: &str,
        payload: &[u8],
        metadata: EntryMetadata,
        ttl: Option<u64>,
    ) -> Result<()> {
        validate_key(key)?;
        let ttl_secs = self.resolve_ttl(namespace, ttl)?;
        let now = self.clock.now_ms();

        let compressed = self.codec.compress(payload);
        match compressed.error() {
            Some(e) => warn!(namespace = %namespace, key = %key, "Storing uncompressed: {}", e),
            None => self.stats.record_compression(),
        }

        let entry = CacheEntry::new(
            namespace,
            key.to_string(),
            compressed,
            payload.len() as u64,
            ttl_secs,
            metadata,
            now,
        );
        let ratio = entry.compression_ratio;

        let _tiers = self.tiers.write();
        let persisted = match self.persistent("put", namespace) {
            Some(store) => match store.put(&entry) {
                Ok(()) => true,
                Err(e) => {
                    warn!(namespace = %namespace, key = %key, "Persistent write failed, keeping memory copy only: {}", e);
                    false
                }
            },
            None => false,
        };

        if self.memory.is_eligible(payload.len()) {
            self.memory.insert(CachedValue::from_entry(entry, payload.to_vec()));
        } else {
            // A mirror of the previous payload must not outlive the replacement
            self.memory.remove(namespace, key);
        }

        if persisted {
            self.enforce_capacity(namespace);
        }

        debug!(
            namespace = %namespace,
            key,
            size = payload.len(),
            "Cached entry (compression: {:.2})",
            ratio
        );
        Ok(())
    }

    // == Get ==
    /// Returns the payload stored under `key`, or `None` on a miss.
    pub fn get(&self, namespace: CacheNamespace, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.lookup(namespace, key)?.map(|value| value.payload))
    }

    /// Like [`CacheSystem::get`] but also returns metadata and timestamps.
    pub fn lookup(&self, namespace: CacheNamespace, key: &str) -> Result<Option<CachedValue>> {
        validate_key(key)?;
        let now = self.clock.now_ms();

        if let Some(mirrored) = self.memory.get(namespace, key, now) {
            if let Some(store) = self.store.as_ref() {
                if let Err(e) = store.touch(namespace, key, now) {
                    warn!(namespace = %namespace, key = %key, "Failed to refresh access time: {}", e);
                }
            }
            self.stats.record_hit();
            debug!(namespace = %namespace, key, tier = "memory", "Cache hit");

            let mut value = CachedValue::clone(&mirrored);
            value.accessed_at = now.max(value.created_at);
            return Ok(Some(value));
        }

        let _tiers = self.tiers.read();
        let Some(store) = self.persistent("get", namespace) else {
            self.stats.record_miss();
            return Ok(None);
        };

        let found = match store.lookup(namespace, key, now) {
            Ok(Lookup::Hit(entry)) => {
                match self.codec.decompress(&entry.data, entry.encoding, entry.raw_size) {
                    Ok(payload) => Some(CachedValue::from_entry(entry, payload)),
                    Err(e) => {
                        self.discard_corrupted(store, namespace, key, &e);
                        None
                    }
                }
            }
            Ok(Lookup::Expired) => {
                debug!(namespace = %namespace, key = %key, "Cache entry expired");
                None
            }
            Ok(Lookup::Missing) => None,
            Err(e @ CacheError::Corrupted(_)) => {
                self.discard_corrupted(store, namespace, key, &e);
                None
            }
            Err(e) => {
                warn!(namespace = %namespace, key = %key, "Persistent lookup failed, treating as miss: {}", e);
                None
            }
        };

        match found {
            Some(value) => {
                self.stats.record_hit();
                debug!(namespace = %namespace, key, tier = "persistent", "Cache hit");
                self.memory.insert(value.clone());
                Ok(Some(value))
            }
            None => {
                self.stats.record_miss();
                debug!(namespace = %namespace, key = %key, "Cache miss");
                Ok(None)
            }
        }
    }

    // == Get Or Compute ==
    /// Returns the cached result for `input`, or runs `compute`, caches its
    /// output and returns it. A failing `compute` caches nothing.
    ///
    /// Concurrent callers missing on the same key may each run `compute`;
    /// the last write wins.
    pub fn get_or_compute<F, E>(
        &self,
        namespace: CacheNamespace,
        input: KeyInput<'_>,
        compute: F,
    ) -> std::result::Result<Vec<u8>, E>
    where
        F: FnOnce() -> std::result::Result<Vec<u8>, E>,
    {
        let key = self.keys.derive(namespace, input);
        match self.get(namespace, &key) {
            Ok(Some(payload)) => return Ok(payload),
            Ok(None) => {}
            Err(e) => warn!(namespace = %namespace, key = %key, "Cache lookup failed: {}", e),
        }

        let payload = compute()?;
        if let Err(e) = self.put_with_key(namespace, &key, &payload, metadata_for(&input), None) {
            warn!(namespace = %namespace, key = %key, "Failed to cache computed result: {}", e);
        }
        Ok(payload)
    }

    /// Async variant of [`CacheSystem::get_or_compute`]. Storage work runs on
    /// tokio's blocking pool so the calling task is never parked on SQLite.
    pub async fn get_or_compute_async<F, Fut, E>(
        self: &Arc<Self>,
        namespace: CacheNamespace,
        input: KeyInput<'_>,
        compute: F,
    ) -> std::result::Result<Vec<u8>, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<Vec<u8>, E>>,
    {
        let key = self.keys.derive(namespace, input);
        let metadata = metadata_for(&input);

        let cache = Arc::clone(self);
        let lookup_key = key.clone();
        match tokio::task::spawn_blocking(move || cache.get(namespace, &lookup_key)).await {
            Ok(Ok(Some(payload))) => return Ok(payload),
            Ok(Ok(None)) => {}
            Ok(Err(e)) => warn!(namespace = %namespace, key = %key, "Cache lookup failed: {}", e),
            Err(e) => warn!(namespace = %namespace, key = %key, "Cache lookup task failed: {}", e),
        }

        let payload = compute().await?;

        let cache = Arc::clone(self);
        let stored = payload.clone();
        let write_key = key.clone();
        let written = tokio::task::spawn_blocking(move || {
            cache.put_with_key(namespace, &write_key, &stored, metadata, None)
        })
        .await;
        match written {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(namespace = %namespace, key = %key, "Failed to cache computed result: {}", e),
            Err(e) => warn!(namespace = %namespace, key = %key, "Cache write task failed: {}", e),
        }
        Ok(payload)
    }

    // == Remove ==
    /// Removes one entry from both tiers. Returns whether anything was removed.
    pub fn remove(&self, namespace: CacheNamespace, key: &str) -> Result<bool> {
        validate_key(key)?;
        let _tiers = self.tiers.write();
        let mirrored = self.memory.remove(namespace, key);
        let persisted = match self.persistent("remove", namespace) {
            Some(store) => store.remove(namespace, key).unwrap_or_else(|e| {
                warn!(namespace = %namespace, key = %key, "Persistent delete failed: {}", e);
                false
            }),
            None => false,
        };
        Ok(mirrored || persisted)
    }

    // == Clear ==
    /// Irreversibly removes every entry in scope from both tiers.
    /// Returns the number of persistent entries deleted.
    pub fn clear(&self, scope: impl Into<ClearScope>) -> usize {
        let scope = scope.into();
        let _tiers = self.tiers.write();
        let mut removed = 0;
        for namespace in scope.namespaces() {
            if let Some(store) = self.persistent("clear", namespace) {
                match store.clear(namespace) {
                    Ok(count) => removed += count,
                    Err(e) => warn!(namespace = %namespace, "Persistent clear failed: {}", e),
                }
            }
        }
        let mirrored = self.memory.clear(scope);
        info!(?scope, removed, mirrored, "Cache cleared");
        removed
    }

    // == Purge Expired ==
    /// Deletes expired entries from both tiers. Expiry is otherwise only
    /// applied lazily, so this exists for explicit maintenance runs.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now_ms();
        let _tiers = self.tiers.write();
        let mut removed = 0;
        for namespace in CacheNamespace::ALL {
            if let Some(store) = self.persistent("purge", namespace) {
                match store.purge_expired(namespace, now) {
                    Ok(count) => removed += count,
                    Err(e) => warn!(namespace = %namespace, "Expired entry purge failed: {}", e),
                }
            }
        }
        let mirrored = self.memory.purge_expired(now);
        info!(removed, mirrored, "Expired entries purged");
        removed
    }

    // == Statistics ==
    pub fn statistics(&self) -> CacheStatistics {
        let namespaces = CacheNamespace::ALL
            .iter()
            .map(|&namespace| {
                let (entries, size) = match self.store.as_ref() {
                    Some(store) => store.usage(namespace).unwrap_or_else(|e| {
                        warn!(namespace = %namespace, "Failed to read namespace usage: {}", e);
                        (0, 0)
                    }),
                    None => (0, 0),
                };
                NamespaceStatistics::new(
                    namespace,
                    entries,
                    size,
                    self.config.namespace(namespace).max_size,
                    self.memory.len_for(namespace),
                )
            })
            .collect();
        CacheStatistics::new(&self.stats, namespaces, self.store.is_some())
    }

    // == Internals ==
    fn resolve_ttl(&self, namespace: CacheNamespace, ttl: Option<u64>) -> Result<u64> {
        match ttl {
            Some(0) => Err(CacheError::Validation("TTL must be at least one second".to_string())),
            Some(secs) => Ok(secs),
            None => Ok(self.config.namespace(namespace).default_ttl),
        }
    }

    /// The persistent tier, warning on every call made while it is unavailable.
    fn persistent(&self, operation: &str, namespace: CacheNamespace) -> Option<&PersistentStore> {
        if self.store.is_none() {
            warn!(
                operation,
                namespace = %namespace,
                "Persistent tier unavailable, continuing memory-only"
            );
        }
        self.store.as_ref()
    }

    fn discard_corrupted(&self, store: &PersistentStore, namespace: CacheNamespace, key: &str, cause: &CacheError) {
        warn!(namespace = %namespace, key = %key, "Evicting corrupted cache entry: {}", cause);
        self.memory.remove(namespace, key);
        if let Err(e) = store.remove(namespace, key) {
            warn!(namespace = %namespace, key = %key, "Failed to evict corrupted entry: {}", e);
        }
    }

    fn enforce_capacity(&self, namespace: CacheNamespace) {
        let Some(store) = self.store.as_ref() else {
            return;
        };
        let max_size = self.config.namespace(namespace).max_size;
        match self.eviction.enforce(store, namespace, max_size) {
            Ok(report) if report.batches > 0 => {
                self.stats.record_evictions(report.batches);
                self.memory.remove_keys(namespace, &report.removed);
            }
            Ok(_) => {}
            Err(e) => warn!(namespace = %namespace, "Eviction pass failed: {}", e),
        }
    }
}

/// Metadata recorded for results cached through `get_or_compute`.
fn metadata_for(input: &KeyInput<'_>) -> EntryMetadata {
    match input {
        KeyInput::Request { endpoint, .. } => EntryMetadata::api(*endpoint),
        _ => EntryMetadata::default(),
    }
}
