//! Persistent Store Module
//!
//! Durable entry storage in an embedded SQLite database, one table per
//! namespace. Every mutation runs inside a transaction so readers never see a
//! partially written entry. All database and I/O failures surface as
//! `CacheError::StorageUnavailable`.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::{debug, info};

use crate::cache::codec::{plausible_raw_size, Encoding};
use crate::cache::{CacheEntry, CacheNamespace, EntryMetadata};
use crate::error::{CacheError, Result};

/// How long a statement waits on a locked database before failing.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const COLUMNS: &str = "key, data, encoding, raw_size, size, compression_ratio, \
                       created_at, accessed_at, ttl, metadata";

// == Lookup ==
/// Outcome of a point lookup.
#[derive(Debug)]
pub enum Lookup {
    /// Live entry; its `accessed_at` has already been refreshed
    Hit(CacheEntry),
    /// The entry had outlived its TTL and was deleted
    Expired,
    Missing,
}

// == Persistent Store ==
#[derive(Debug)]
pub struct PersistentStore {
    conn: Mutex<Connection>,
    path: Option<PathBuf>,
}

impl PersistentStore {
    // == Open ==
    /// Opens (creating if needed) the database file and its schema.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        let store = Self::init(conn, Some(path.to_path_buf()))?;
        info!("Persistent cache opened at {}", path.display());
        Ok(store)
    }

    /// Opens a private in-memory database with the same schema.
    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?, None)
    }

    fn init(conn: Connection, path: Option<PathBuf>) -> Result<Self> {
        conn.busy_timeout(BUSY_TIMEOUT)?;
        for ns in CacheNamespace::ALL {
            let table = ns.table();
            conn.execute_batch(&format!(
                "CREATE TABLE IF NOT EXISTS {table} (
                    key TEXT PRIMARY KEY,
                    data BLOB NOT NULL,
                    encoding TEXT NOT NULL,
                    raw_size INTEGER NOT NULL,
                    size INTEGER NOT NULL,
                    compression_ratio REAL NOT NULL,
                    created_at INTEGER NOT NULL,
                    accessed_at INTEGER NOT NULL,
                    ttl INTEGER NOT NULL,
                    metadata TEXT NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_{table}_accessed ON {table}(accessed_at);"
            ))?;
        }
        Ok(Self {
            conn: Mutex::new(conn),
            path,
        })
    }

    /// Backing file, `None` for in-memory stores.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    // == Put ==
    /// Inserts or replaces the entry with the same key.
    pub fn put(&self, entry: &CacheEntry) -> Result<()> {
        let metadata = serde_json::to_string(&entry.metadata)
            .map_err(|e| CacheError::Validation(format!("Unserializable metadata: {}", e)))?;

        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        tx.execute(
            &format!(
                "INSERT OR REPLACE INTO {} ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                entry.namespace.table(),
                COLUMNS
            ),
            params![
                entry.key,
                entry.data,
                entry.encoding.as_str(),
                to_sql_int(entry.raw_size),
                to_sql_int(entry.stored_size),
                entry.compression_ratio,
                entry.created_at,
                entry.accessed_at,
                to_sql_int(entry.ttl_secs),
                metadata,
            ],
        )?;
        tx.commit()?;
        Ok(())
    }

    // == Lookup ==
    /// Fetches a live entry and refreshes its access time in one transaction.
    /// Expired entries are deleted on the spot.
    pub fn lookup(&self, namespace: CacheNamespace, key: &str, now_ms: i64) -> Result<Lookup> {
        let table = namespace.table();
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;

        let row = tx
            .query_row(
                &format!("SELECT {} FROM {} WHERE key = ?1", COLUMNS, table),
                params![key],
                StoredRow::from_row,
            )
            .optional()
            .map_err(row_error)?;

        let outcome = match row {
            None => Lookup::Missing,
            Some(row) => {
                let mut entry = row.into_entry(namespace)?;
                if entry.is_expired(now_ms) {
                    tx.execute(&format!("DELETE FROM {} WHERE key = ?1", table), params![key])?;
                    Lookup::Expired
                } else {
                    entry.touch(now_ms);
                    tx.execute(
                        &format!("UPDATE {} SET accessed_at = ?2 WHERE key = ?1", table),
                        params![key, entry.accessed_at],
                    )?;
                    Lookup::Hit(entry)
                }
            }
        };
        tx.commit()?;
        Ok(outcome)
    }

    // == Touch ==
    /// Refreshes `accessed_at` without reading the payload.
    pub fn touch(&self, namespace: CacheNamespace, key: &str, now_ms: i64) -> Result<bool> {
        let conn = self.conn.lock();
        let changed = conn.execute(
            &format!(
                "UPDATE {} SET accessed_at = MAX(created_at, ?2) WHERE key = ?1",
                namespace.table()
            ),
            params![key, now_ms],
        )?;
        Ok(changed > 0)
    }

    // == Remove ==
    pub fn remove(&self, namespace: CacheNamespace, key: &str) -> Result<bool> {
        let conn = self.conn.lock();
        let removed = conn.execute(
            &format!("DELETE FROM {} WHERE key = ?1", namespace.table()),
            params![key],
        )?;
        Ok(removed > 0)
    }

    // == Usage ==
    /// Returns `(entry count, aggregate stored size)` for a namespace.
    pub fn usage(&self, namespace: CacheNamespace) -> Result<(u64, u64)> {
        let conn = self.conn.lock();
        let (count, size): (i64, i64) = conn.query_row(
            &format!(
                "SELECT COUNT(*), COALESCE(SUM(size), 0) FROM {}",
                namespace.table()
            ),
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        Ok((count.max(0) as u64, size.max(0) as u64))
    }

    pub fn aggregate_size(&self, namespace: CacheNamespace) -> Result<u64> {
        self.usage(namespace).map(|(_, size)| size)
    }

    pub fn entry_count(&self, namespace: CacheNamespace) -> Result<u64> {
        self.usage(namespace).map(|(count, _)| count)
    }

    // == Delete Least Recent ==
    /// Deletes up to `limit` least-recently-accessed entries and returns their
    /// keys. Insertion order breaks ties between equal access times.
    pub fn delete_least_recent(&self, namespace: CacheNamespace, limit: u64) -> Result<Vec<String>> {
        let table = namespace.table();
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;

        let keys = {
            let mut select = tx.prepare(&format!(
                "SELECT key FROM {} ORDER BY accessed_at ASC, rowid ASC LIMIT ?1",
                table
            ))?;
            let rows = select.query_map(params![to_sql_int(limit)], |row| row.get::<_, String>(0))?;
            rows.collect::<rusqlite::Result<Vec<String>>>()?
        };
        {
            let mut delete = tx.prepare(&format!("DELETE FROM {} WHERE key = ?1", table))?;
            for key in &keys {
                delete.execute(params![key])?;
            }
        }
        tx.commit()?;

        debug!(namespace = %namespace, removed = keys.len(), "Deleted least recently used entries");
        Ok(keys)
    }

    // == Clear ==
    /// Removes every entry of a namespace, returning how many were deleted.
    pub fn clear(&self, namespace: CacheNamespace) -> Result<usize> {
        let conn = self.conn.lock();
        let removed = conn.execute(&format!("DELETE FROM {}", namespace.table()), [])?;
        Ok(removed)
    }

    // == Purge Expired ==
    /// Deletes every entry of a namespace whose TTL has elapsed.
    pub fn purge_expired(&self, namespace: CacheNamespace, now_ms: i64) -> Result<usize> {
        let conn = self.conn.lock();
        let removed = conn.execute(
            &format!(
                "DELETE FROM {} WHERE ?1 - created_at >= ttl * 1000",
                namespace.table()
            ),
            params![now_ms],
        )?;
        Ok(removed)
    }
}

// == Stored Row ==
/// Raw column values, converted to a `CacheEntry` outside the row callback so
/// that decoding problems surface as corruption rather than database errors.
struct StoredRow {
    key: String,
    data: Vec<u8>,
    encoding: String,
    raw_size: i64,
    size: i64,
    compression_ratio: f64,
    created_at: i64,
    accessed_at: i64,
    ttl: i64,
    metadata: String,
}

impl StoredRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            key: row.get(0)?,
            data: row.get(1)?,
            encoding: row.get(2)?,
            raw_size: row.get(3)?,
            size: row.get(4)?,
            compression_ratio: row.get(5)?,
            created_at: row.get(6)?,
            accessed_at: row.get(7)?,
            ttl: row.get(8)?,
            metadata: row.get(9)?,
        })
    }

    fn into_entry(self, namespace: CacheNamespace) -> Result<CacheEntry> {
        let encoding = Encoding::parse(&self.encoding)?;
        let metadata: EntryMetadata = serde_json::from_str(&self.metadata)
            .map_err(|e| CacheError::Corrupted(format!("Unreadable metadata for {}: {}", self.key, e)))?;
        if self.raw_size < 0 || self.size < 0 || self.ttl < 0 {
            return Err(CacheError::Corrupted(format!("Negative size or TTL for {}", self.key)));
        }
        if !plausible_raw_size(encoding, self.data.len(), self.raw_size as u64) {
            return Err(CacheError::Corrupted(format!(
                "Recorded size {} does not fit {} stored bytes for {}",
                self.raw_size,
                self.data.len(),
                self.key
            )));
        }

        Ok(CacheEntry {
            namespace,
            key: self.key,
            data: self.data,
            encoding,
            raw_size: self.raw_size as u64,
            stored_size: self.size as u64,
            compression_ratio: self.compression_ratio,
            created_at: self.created_at,
            accessed_at: self.accessed_at,
            ttl_secs: self.ttl as u64,
            metadata,
        })
    }
}

/// Column values of the wrong type mean the row itself is damaged.
fn row_error(err: rusqlite::Error) -> CacheError {
    match err {
        rusqlite::Error::InvalidColumnType(..) | rusqlite::Error::FromSqlConversionFailure(..) => {
            CacheError::Corrupted(format!("Unreadable row: {}", err))
        }
        other => other.into(),
    }
}

fn to_sql_int(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}
