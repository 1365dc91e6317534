//! Eviction Policy Module
//!
//! Size-based LRU trimming of a persistent namespace. Entries are removed in
//! batches rather than one at a time, so a namespace may briefly overshoot its
//! cap by up to one write before the next pass brings it back under target.

use tracing::info;

use crate::cache::{CacheNamespace, PersistentStore};
use crate::error::{CacheError, Result};

// == Eviction Report ==
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EvictionReport {
    /// Number of batches deleted
    pub batches: u64,
    /// Keys removed across all batches, least recently used first
    pub removed: Vec<String>,
    pub size_before: u64,
    pub size_after: u64,
}

// == Eviction Policy ==
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EvictionPolicy {
    /// Fraction of `max_size` to trim down to once over the cap
    target_ratio: f64,
    /// Fraction of the namespace's entry count deleted per batch
    batch_fraction: f64,
}

impl EvictionPolicy {
    pub fn new(target_ratio: f64, batch_fraction: f64) -> Result<Self> {
        if !(target_ratio > 0.0 && target_ratio <= 1.0) {
            return Err(CacheError::Validation(format!(
                "Eviction target ratio must be in (0, 1], got {}",
                target_ratio
            )));
        }
        if !(batch_fraction > 0.0 && batch_fraction <= 1.0) {
            return Err(CacheError::Validation(format!(
                "Eviction batch fraction must be in (0, 1], got {}",
                batch_fraction
            )));
        }
        Ok(Self {
            target_ratio,
            batch_fraction,
        })
    }

    pub fn target_size(&self, max_size: u64) -> u64 {
        (max_size as f64 * self.target_ratio) as u64
    }

    /// Entries removed per pass, never less than one.
    pub fn batch_size(&self, entry_count: u64) -> u64 {
        ((entry_count as f64 * self.batch_fraction) as u64).max(1)
    }

    // == Enforce ==
    /// Trims `namespace` if its aggregate size exceeds `max_size`.
    pub fn enforce(
        &self,
        store: &PersistentStore,
        namespace: CacheNamespace,
        max_size: u64,
    ) -> Result<EvictionReport> {
        let (mut count, mut size) = store.usage(namespace)?;
        let mut report = EvictionReport {
            size_before: size,
            size_after: size,
            ..EvictionReport::default()
        };
        if size <= max_size {
            return Ok(report);
        }

        let target = self.target_size(max_size);
        while size > target && count > 0 {
            let removed = store.delete_least_recent(namespace, self.batch_size(count))?;
            if removed.is_empty() {
                break;
            }
            report.batches += 1;
            report.removed.extend(removed);
            (count, size) = store.usage(namespace)?;
        }
        report.size_after = size;

        info!(
            namespace = %namespace,
            batches = report.batches,
            removed = report.removed.len(),
            "Cache trimmed (LRU): {} -> {} bytes (max {})",
            report.size_before,
            report.size_after,
            max_size
        );
        Ok(report)
    }
}

impl Default for EvictionPolicy {
    fn default() -> Self {
        Self {
            target_ratio: 0.9,
            batch_fraction: 0.1,
        }
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::codec::{Compressed, CompressionOutcome, Encoding};
    use crate::cache::{CacheEntry, EntryMetadata};

    /// Raw 100-byte entry accessed at `at`.
    fn put_raw(store: &PersistentStore, key: &str, at: i64) {
        let compressed = Compressed {
            data: vec![0u8; 100],
            ratio: 1.0,
            encoding: Encoding::Raw,
            outcome: CompressionOutcome::Incompressible,
        };
        let entry = CacheEntry::new(
            CacheNamespace::Image,
            key.to_string(),
            compressed,
            100,
            3600,
            EntryMetadata::default(),
            at,
        );
        store.put(&entry).unwrap();
    }

    #[test]
    fn test_batch_and_target_sizes() {
        let policy = EvictionPolicy::default();
        assert_eq!(policy.batch_size(0), 1);
        assert_eq!(policy.batch_size(9), 1);
        assert_eq!(policy.batch_size(55), 5);
        assert_eq!(policy.target_size(1000), 900);
    }

    #[test]
    fn test_invalid_parameters_rejected() {
        assert!(EvictionPolicy::new(0.0, 0.1).is_err());
        assert!(EvictionPolicy::new(0.9, 1.5).is_err());
        assert!(EvictionPolicy::new(1.0, 1.0).is_ok());
    }

    #[test]
    fn test_under_cap_is_noop() {
        let store = PersistentStore::open_in_memory().unwrap();
        put_raw(&store, "a", 0);

        let report = EvictionPolicy::default().enforce(&store, CacheNamespace::Image, 1_000).unwrap();
        assert_eq!(report.batches, 0);
        assert!(report.removed.is_empty());
        assert_eq!(report.size_after, 100);
    }

    #[test]
    fn test_trims_to_target_in_lru_order() {
        let store = PersistentStore::open_in_memory().unwrap();
        for i in 0..11 {
            put_raw(&store, &format!("k{:02}", i), i);
        }

        // 1100 bytes against a 1000 cap, target 900: two single-entry batches
        let report = EvictionPolicy::default().enforce(&store, CacheNamespace::Image, 1_000).unwrap();
        assert_eq!(report.batches, 2);
        assert_eq!(report.removed, vec!["k00".to_string(), "k01".to_string()]);
        assert_eq!(report.size_before, 1_100);
        assert_eq!(report.size_after, 900);
        assert_eq!(store.entry_count(CacheNamespace::Image).unwrap(), 9);
    }

    #[test]
    fn test_large_namespace_uses_bigger_batches() {
        let store = PersistentStore::open_in_memory().unwrap();
        for i in 0..40 {
            put_raw(&store, &format!("k{:02}", i), i);
        }

        // 4000 bytes against 2000: batches of 4, 3, 3, ... until <= 1800
        let report = EvictionPolicy::default().enforce(&store, CacheNamespace::Image, 2_000).unwrap();
        assert!(report.size_after <= 1_800);
        assert_eq!(report.removed.first().map(String::as_str), Some("k00"));
        assert!(report.batches < report.removed.len() as u64);
    }

    #[test]
    fn test_single_oversized_namespace_empties() {
        let store = PersistentStore::open_in_memory().unwrap();
        put_raw(&store, "only", 0);

        let report = EvictionPolicy::default().enforce(&store, CacheNamespace::Image, 50).unwrap();
        assert_eq!(report.removed, vec!["only".to_string()]);
        assert_eq!(report.size_after, 0);
    }
}
