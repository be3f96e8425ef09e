//! # Netatlas Store
//!
//! DuckDB-backed persistent key/value tier for the netatlas data cache.
//!
//! ## Overview
//!
//! Entries are opaque JSON strings keyed by `"<datasetKind>:<serializedQuery>"`.
//! Each row carries its creation and expiry time (Unix epoch milliseconds)
//! and the table is indexed on expiry so that bulk cleanup stays cheap.
//!
//! The store never reads the wall clock: callers pass `now_ms`, which keeps
//! expiry decisions consistent with the caller's (possibly simulated) clock.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use netatlas_store::{CacheStore, StoredEntry};
//!
//! fn main() -> Result<(), netatlas_store::StoreError> {
//!     let store = CacheStore::open_default()?;
//!     store.put(&StoredEntry::new("cables:", "{\"data\":[]}", 1_000, 60_000))?;
//!
//!     if let Some(entry) = store.get("cables:", 2_000)? {
//!         println!("cached {} bytes", entry.value.len());
//!     }
//!
//!     let removed = store.clean_expired(120_000)?;
//!     println!("removed {removed} expired entries");
//!     Ok(())
//! }
//! ```
//!
//! ## Tables
//!
//! | Table | Description |
//! |-------|-------------|
//! | `cache_entries` | Cached values with creation/expiry timestamps |
//! | `schema_migrations` | Applied migration versions |

pub mod duckdb;
pub mod migrations;

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

pub use crate::duckdb::{DuckDbConnectionManager, PooledConnection};

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// `DuckDB` database error.
    #[error(transparent)]
    DuckDb(#[from] ::duckdb::Error),

    /// I/O error (creating the store directory).
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// An entry was rejected before reaching the database.
    #[error("invalid cache entry '{key}': {reason}")]
    InvalidEntry { key: String, reason: String },
}

/// Configuration for the persistent store.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Root directory for netatlas data.
    pub netatlas_home: PathBuf,
    /// Path to the `DuckDB` database file.
    pub db_path: PathBuf,
    /// Maximum number of idle connections kept in the pool.
    pub max_pool_size: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self::in_dir(resolve_netatlas_home())
    }
}

impl StoreConfig {
    /// Configuration rooted at an explicit home directory.
    pub fn in_dir(netatlas_home: impl Into<PathBuf>) -> Self {
        let netatlas_home = netatlas_home.into();
        let db_path = netatlas_home.join("cache").join("netatlas.duckdb");
        Self {
            netatlas_home,
            db_path,
            max_pool_size: 4,
        }
    }
}

/// A persisted cache row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredEntry {
    pub key: String,
    /// Serialized value (JSON text).
    pub value: String,
    pub created_at_ms: i64,
    pub expires_at_ms: i64,
}

impl StoredEntry {
    pub fn new(
        key: impl Into<String>,
        value: impl Into<String>,
        created_at_ms: i64,
        ttl_ms: i64,
    ) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            created_at_ms,
            expires_at_ms: created_at_ms.saturating_add(ttl_ms.max(0)),
        }
    }

    pub const fn is_expired(&self, now_ms: i64) -> bool {
        now_ms > self.expires_at_ms
    }
}

/// Aggregate view of the store contents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StoreStats {
    pub entries: u64,
    pub expired: u64,
    pub value_bytes: u64,
}

/// The persistent cache store.
#[derive(Clone)]
pub struct CacheStore {
    config: StoreConfig,
    manager: DuckDbConnectionManager,
}

impl CacheStore {
    /// Open a store with default configuration.
    pub fn open_default() -> Result<Self, StoreError> {
        Self::open(StoreConfig::default())
    }

    /// Open a store with the specified configuration.
    pub fn open(config: StoreConfig) -> Result<Self, StoreError> {
        if let Some(parent) = config.db_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let manager = DuckDbConnectionManager::open(config.db_path.clone(), config.max_pool_size)?;
        let store = Self { config, manager };
        store.initialize()?;
        tracing::debug!(path = %store.db_path().display(), "opened persistent cache store");
        Ok(store)
    }

    /// Apply schema migrations.
    pub fn initialize(&self) -> Result<(), StoreError> {
        let connection = self.manager.acquire()?;
        migrations::apply_migrations(&connection)?;
        Ok(())
    }

    /// Get the path to the database file.
    pub fn db_path(&self) -> &Path {
        self.manager.db_path()
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Read an entry. Entries past their expiry are reported as missing and
    /// left for [`CacheStore::clean_expired`].
    pub fn get(&self, key: &str, now_ms: i64) -> Result<Option<StoredEntry>, StoreError> {
        let connection = self.manager.acquire()?;
        let mut statement = connection.prepare(
            "SELECT key, value, created_at_ms, expires_at_ms FROM cache_entries WHERE key = ?",
        )?;
        let mut rows = statement.query([key])?;

        let Some(row) = rows.next()? else {
            return Ok(None);
        };

        let entry = StoredEntry {
            key: row.get(0)?,
            value: row.get(1)?,
            created_at_ms: row.get(2)?,
            expires_at_ms: row.get(3)?,
        };

        if entry.is_expired(now_ms) {
            return Ok(None);
        }

        Ok(Some(entry))
    }

    /// Insert or replace an entry.
    pub fn put(&self, entry: &StoredEntry) -> Result<(), StoreError> {
        if entry.key.trim().is_empty() {
            return Err(StoreError::InvalidEntry {
                key: entry.key.clone(),
                reason: String::from("key must not be empty"),
            });
        }
        if entry.expires_at_ms < entry.created_at_ms {
            return Err(StoreError::InvalidEntry {
                key: entry.key.clone(),
                reason: String::from("expiry precedes creation"),
            });
        }

        let connection = self.manager.acquire()?;
        // Replace as delete + insert: DuckDB cannot upsert rows whose indexed
        // columns change.
        connection.execute("DELETE FROM cache_entries WHERE key = ?", [&entry.key])?;
        connection.execute(
            "INSERT INTO cache_entries (key, value, created_at_ms, expires_at_ms) \
             VALUES (?, ?, ?, ?)",
            ::duckdb::params![
                entry.key,
                entry.value,
                entry.created_at_ms,
                entry.expires_at_ms
            ],
        )?;
        Ok(())
    }

    /// Delete one entry, returning whether it existed.
    pub fn delete(&self, key: &str) -> Result<bool, StoreError> {
        let connection = self.manager.acquire()?;
        let removed = connection.execute("DELETE FROM cache_entries WHERE key = ?", [key])?;
        Ok(removed > 0)
    }

    /// Delete every entry whose key starts with `prefix`.
    pub fn delete_prefix(&self, prefix: &str) -> Result<usize, StoreError> {
        let connection = self.manager.acquire()?;
        let removed = connection.execute(
            "DELETE FROM cache_entries WHERE starts_with(key, ?)",
            [prefix],
        )?;
        Ok(removed)
    }

    /// Remove all entries.
    pub fn clear(&self) -> Result<usize, StoreError> {
        let connection = self.manager.acquire()?;
        let removed = connection.execute("DELETE FROM cache_entries", [])?;
        Ok(removed)
    }

    /// Remove every entry past its expiry and return the number removed.
    pub fn clean_expired(&self, now_ms: i64) -> Result<usize, StoreError> {
        let connection = self.manager.acquire()?;
        let removed = connection.execute(
            "DELETE FROM cache_entries WHERE expires_at_ms < ?",
            [now_ms],
        )?;
        if removed > 0 {
            tracing::debug!(removed, "cleaned expired persistent cache entries");
        }
        Ok(removed)
    }

    /// Number of stored rows, expired ones included.
    pub fn len(&self) -> Result<usize, StoreError> {
        let connection = self.manager.acquire()?;
        let count: i64 =
            connection.query_row("SELECT COUNT(*) FROM cache_entries", [], |row| row.get(0))?;
        Ok(usize::try_from(count).unwrap_or_default())
    }

    pub fn is_empty(&self) -> Result<bool, StoreError> {
        Ok(self.len()? == 0)
    }

    pub fn stats(&self, now_ms: i64) -> Result<StoreStats, StoreError> {
        let connection = self.manager.acquire()?;
        let (entries, expired, value_bytes): (i64, i64, i64) = connection.query_row(
            "SELECT COUNT(*), \
                    COUNT(*) FILTER (WHERE expires_at_ms < ?), \
                    COALESCE(SUM(strlen(value)), 0)::BIGINT \
             FROM cache_entries",
            [now_ms],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )?;

        Ok(StoreStats {
            entries: u64::try_from(entries).unwrap_or_default(),
            expired: u64::try_from(expired).unwrap_or_default(),
            value_bytes: u64::try_from(value_bytes).unwrap_or_default(),
        })
    }
}

/// Resolve the netatlas home directory from environment or default.
fn resolve_netatlas_home() -> PathBuf {
    if let Some(path) = env::var_os("NETATLAS_HOME") {
        let path = PathBuf::from(path);
        if !path.as_os_str().is_empty() {
            return path;
        }
    }

    if let Some(home) = env::var_os("HOME") {
        return PathBuf::from(home).join(".netatlas");
    }

    PathBuf::from(".netatlas")
}
