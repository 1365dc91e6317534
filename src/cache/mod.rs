//! Cache Module
//!
//! Tiered caching engine: a bounded memory tier in front of a persistent
//! SQLite tier, with content-addressed keys, zlib compression, per-entry TTL
//! and size-based LRU eviction per namespace.

mod clock;
pub mod codec;
mod entry;
mod eviction;
mod key;
mod memory;
mod namespace;
mod persistent;
mod stats;
mod system;
mod typed;


// Re-export public types
pub use clock::{Clock, ManualClock, SystemClock};
pub use codec::{CompressionCodec, Encoding};
pub use entry::{CacheEntry, CachedValue, EntryMetadata};
pub use eviction::{EvictionPolicy, EvictionReport};
pub use key::{canonical_request, validate_key, KeyGenerator, KeyInput};
pub use memory::MemoryTier;
pub use namespace::{CacheNamespace, ClearScope};
pub use persistent::{Lookup, PersistentStore};
pub use stats::{CacheStatistics, NamespaceStatistics, StatisticsCollector};
pub use system::CacheSystem;

// == Public Constants ==
/// Maximum allowed key length in bytes
pub const MAX_KEY_LENGTH: usize = 256;
