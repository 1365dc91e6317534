//! Cache Statistics Module
//!
//! Tracks cache performance metrics including hits, misses, eviction batches
//! and compressions. Counters are atomics so any thread may record without
//! taking a lock; the hit rate is always derived on demand.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::cache::CacheNamespace;

// == Statistics Collector ==
#[derive(Debug, Default)]
pub struct StatisticsCollector {
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    compressions: AtomicU64,
}

impl StatisticsCollector {
    // == Constructor ==
    /// Creates a collector with all counters at zero.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    /// Counts eviction batches, not individual entries.
    pub fn record_evictions(&self, batches: u64) {
        self.evictions.fetch_add(batches, Ordering::Relaxed);
    }

    pub fn record_compression(&self) {
        self.compressions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    pub fn evictions(&self) -> u64 {
        self.evictions.load(Ordering::Relaxed)
    }

    pub fn compressions(&self) -> u64 {
        self.compressions.load(Ordering::Relaxed)
    }

    // == Hit Rate ==
    /// Returns hits / (hits + misses), or 0.0 if no lookups have been made.
    pub fn hit_rate(&self) -> f64 {
        hit_rate(self.hits(), self.misses())
    }
}

fn hit_rate(hits: u64, misses: u64) -> f64 {
    let total = hits + misses;
    if total == 0 {
        0.0
    } else {
        hits as f64 / total as f64
    }
}

fn usage_percent(size: u64, max_size: u64) -> f64 {
    if max_size == 0 {
        0.0
    } else {
        size as f64 / max_size as f64 * 100.0
    }
}

// == Namespace Statistics ==
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NamespaceStatistics {
    pub namespace: CacheNamespace,
    /// Entries in the persistent tier
    pub entries: u64,
    /// Aggregate stored (compressed) size in bytes
    pub size: u64,
    pub max_size: u64,
    pub usage_percent: f64,
    pub memory_entries: usize,
}

impl NamespaceStatistics {
    pub fn new(namespace: CacheNamespace, entries: u64, size: u64, max_size: u64, memory_entries: usize) -> Self {
        Self {
            namespace,
            entries,
            size,
            max_size,
            usage_percent: usage_percent(size, max_size),
            memory_entries,
        }
    }
}

// == Cache Statistics ==
/// Point-in-time snapshot returned by `CacheSystem::statistics`.
#[derive(Debug, Clone, Serialize)]
pub struct CacheStatistics {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub compressions: u64,
    pub hit_rate: f64,
    pub total_size: u64,
    pub max_size: u64,
    pub usage_percent: f64,
    pub memory_entries: usize,
    /// False while the cache runs memory-only
    pub storage_available: bool,
    pub namespaces: Vec<NamespaceStatistics>,
    pub taken_at: DateTime<Utc>,
}

impl CacheStatistics {
    pub fn new(
        collector: &StatisticsCollector,
        namespaces: Vec<NamespaceStatistics>,
        storage_available: bool,
    ) -> Self {
        let hits = collector.hits();
        let misses = collector.misses();
        let total_size = namespaces.iter().map(|ns| ns.size).sum();
        let max_size = namespaces.iter().map(|ns| ns.max_size).sum();
        let memory_entries = namespaces.iter().map(|ns| ns.memory_entries).sum();

        Self {
            hits,
            misses,
            evictions: collector.evictions(),
            compressions: collector.compressions(),
            hit_rate: hit_rate(hits, misses),
            total_size,
            max_size,
            usage_percent: usage_percent(total_size, max_size),
            memory_entries,
            storage_available,
            namespaces,
            taken_at: Utc::now(),
        }
    }

    pub fn namespace(&self, namespace: CacheNamespace) -> Option<&NamespaceStatistics> {
        self.namespaces.iter().find(|ns| ns.namespace == namespace)
    }
}
