//! Memory Tier Module
//!
//! Bounded in-process hot cache checked before the persistent tier. Holds
//! decoded values so a hit costs no decompression. Eviction is a hard cap on
//! entry count, oldest insertion first.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::cache::{CacheNamespace, CachedValue, ClearScope};

// == Memory Tier ==
#[derive(Debug)]
pub struct MemoryTier {
    inner: Mutex<Inner>,
    /// Maximum number of mirrored entries
    capacity: usize,
    /// Payloads must be strictly smaller than this many bytes to be mirrored
    promotion_threshold: usize,
}

#[derive(Debug, Default)]
struct Inner {
    entries: HashMap<CacheNamespace, HashMap<String, Arc<CachedValue>>>,
    /// Insertion order: front = oldest
    order: VecDeque<(CacheNamespace, String)>,
}

impl Inner {
    fn remove(&mut self, namespace: CacheNamespace, key: &str) -> bool {
        let removed = self
            .entries
            .get_mut(&namespace)
            .and_then(|slots| slots.remove(key))
            .is_some();
        if removed {
            self.order.retain(|(ns, k)| !(*ns == namespace && k == key));
        }
        removed
    }

    fn len(&self) -> usize {
        self.entries.values().map(HashMap::len).sum()
    }
}

impl MemoryTier {
    // == Constructor ==
    pub fn new(capacity: usize, promotion_threshold: usize) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            capacity,
            promotion_threshold,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    // == Is Eligible ==
    /// Whether a payload of this size may be mirrored here.
    pub fn is_eligible(&self, payload_len: usize) -> bool {
        self.capacity > 0 && payload_len < self.promotion_threshold
    }

    // == Insert ==
    /// Mirrors a value, evicting the oldest insertions beyond capacity.
    /// Re-inserting an existing key counts as a fresh insertion.
    /// Returns false when the payload is not eligible.
    pub fn insert(&self, value: CachedValue) -> bool {
        if !self.is_eligible(value.payload.len()) {
            return false;
        }

        let namespace = value.namespace;
        let key = value.key.clone();
        let mut inner = self.inner.lock();

        inner.remove(namespace, &key);
        while inner.order.len() >= self.capacity {
            match inner.order.pop_front() {
                Some((ns, oldest)) => {
                    if let Some(slots) = inner.entries.get_mut(&ns) {
                        slots.remove(&oldest);
                    }
                }
                None => break,
            }
        }

        inner
            .entries
            .entry(namespace)
            .or_default()
            .insert(key.clone(), Arc::new(value));
        inner.order.push_back((namespace, key));
        true
    }

    // == Get ==
    /// Returns a live mirrored value; an expired one is dropped instead.
    pub fn get(&self, namespace: CacheNamespace, key: &str, now_ms: i64) -> Option<Arc<CachedValue>> {
        let mut inner = self.inner.lock();
        let value = inner.entries.get(&namespace)?.get(key).cloned()?;
        if value.is_expired(now_ms) {
            inner.remove(namespace, key);
            return None;
        }
        Some(value)
    }

    // == Remove ==
    pub fn remove(&self, namespace: CacheNamespace, key: &str) -> bool {
        self.inner.lock().remove(namespace, key)
    }

    /// Drops the mirrors of keys removed from the persistent tier.
    pub fn remove_keys(&self, namespace: CacheNamespace, keys: &[String]) -> usize {
        let mut inner = self.inner.lock();
        keys.iter().filter(|key| inner.remove(namespace, key)).count()
    }

    // == Clear ==
    pub fn clear(&self, scope: ClearScope) -> usize {
        let mut inner = self.inner.lock();
        let before = inner.len();
        for ns in scope.namespaces() {
            inner.entries.remove(&ns);
        }
        inner.order.retain(|(ns, _)| !scope.includes(*ns));
        before - inner.len()
    }

    // == Purge Expired ==
    pub fn purge_expired(&self, now_ms: i64) -> usize {
        let mut inner = self.inner.lock();
        let expired: Vec<(CacheNamespace, String)> = inner
            .entries
            .iter()
            .flat_map(|(ns, slots)| {
                slots
                    .iter()
                    .filter(|(_, value)| value.is_expired(now_ms))
                    .map(move |(key, _)| (*ns, key.clone()))
            })
            .collect();
        for (ns, key) in &expired {
            inner.remove(*ns, key);
        }
        expired.len()
    }

    // == Length ==
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn len_for(&self, namespace: CacheNamespace) -> usize {
        self.inner
            .lock()
            .entries
            .get(&namespace)
            .map_or(0, HashMap::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
