use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use netatlas_store::{CacheStore, StoredEntry};

use super::CacheError;
use crate::clock::{duration_ms, Clock};
use crate::DataResult;

pub type CacheFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, CacheError>> + Send + 'a>>;

/// A live persistent entry and the instant it expires.
#[derive(Debug, Clone, PartialEq)]
pub struct PersistedEntry {
    pub value: DataResult,
    pub expires_at_ms: i64,
}

impl PersistedEntry {
    /// Time left before expiry, zero once passed.
    pub fn remaining(&self, now_ms: i64) -> Duration {
        let left = self.expires_at_ms.saturating_sub(now_ms).max(0);
        Duration::from_millis(u64::try_from(left).unwrap_or(0))
    }
}

/// Durable cache tier. Same logical contract as the memory tier.
pub trait PersistentTier: Send + Sync {
    fn get<'a>(&'a self, key: &'a str) -> CacheFuture<'a, Option<PersistedEntry>>;

    fn set<'a>(&'a self, key: &'a str, value: &'a DataResult, ttl: Duration)
        -> CacheFuture<'a, ()>;

    fn delete<'a>(&'a self, key: &'a str) -> CacheFuture<'a, bool>;

    fn delete_prefix<'a>(&'a self, prefix: &'a str) -> CacheFuture<'a, usize>;

    fn clear(&self) -> CacheFuture<'_, usize>;

    /// Remove every expired entry and return how many were removed.
    fn clean_expired(&self) -> CacheFuture<'_, usize>;
}

/// [`PersistentTier`] on the DuckDB-backed [`CacheStore`].
///
/// Store calls are blocking and run on the tokio blocking pool.
#[derive(Clone)]
pub struct DuckDbTier {
    store: CacheStore,
    clock: Arc<dyn Clock>,
}

impl DuckDbTier {
    pub fn new(store: CacheStore, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    pub fn store(&self) -> &CacheStore {
        &self.store
    }

    async fn blocking<T, F>(&self, operation: F) -> Result<T, CacheError>
    where
        T: Send + 'static,
        F: FnOnce(CacheStore) -> Result<T, netatlas_store::StoreError> + Send + 'static,
    {
        let store = self.store.clone();
        tokio::task::spawn_blocking(move || operation(store))
            .await
            .map_err(|error| CacheError::Worker(error.to_string()))?
            .map_err(CacheError::from)
    }
}

impl PersistentTier for DuckDbTier {
    fn get<'a>(&'a self, key: &'a str) -> CacheFuture<'a, Option<PersistedEntry>> {
        Box::pin(async move {
            let now = self.clock.now_ms();
            let owned_key = key.to_owned();
            let entry = self
                .blocking(move |store| store.get(&owned_key, now))
                .await?;

            match entry {
                Some(entry) => Ok(Some(PersistedEntry {
                    value: serde_json::from_str(&entry.value)?,
                    expires_at_ms: entry.expires_at_ms,
                })),
                None => Ok(None),
            }
        })
    }

    fn set<'a>(
        &'a self,
        key: &'a str,
        value: &'a DataResult,
        ttl: Duration,
    ) -> CacheFuture<'a, ()> {
        Box::pin(async move {
            let encoded = serde_json::to_string(value)?;
            let entry = StoredEntry::new(key, encoded, self.clock.now_ms(), duration_ms(ttl));
            self.blocking(move |store| store.put(&entry)).await
        })
    }

    fn delete<'a>(&'a self, key: &'a str) -> CacheFuture<'a, bool> {
        Box::pin(async move {
            let owned_key = key.to_owned();
            self.blocking(move |store| store.delete(&owned_key)).await
        })
    }

    fn delete_prefix<'a>(&'a self, prefix: &'a str) -> CacheFuture<'a, usize> {
        Box::pin(async move {
            let owned_prefix = prefix.to_owned();
            self.blocking(move |store| store.delete_prefix(&owned_prefix))
                .await
        })
    }

    fn clear(&self) -> CacheFuture<'_, usize> {
        Box::pin(async move { self.blocking(|store| store.clear()).await })
    }

    fn clean_expired(&self) -> CacheFuture<'_, usize> {
        Box::pin(async move {
            let now = self.clock.now_ms();
            self.blocking(move |store| store.clean_expired(now)).await
        })
    }
}
