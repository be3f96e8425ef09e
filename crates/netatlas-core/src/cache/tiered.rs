use std::collections::HashSet;
use std::fmt::Display;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Serialize;

use super::invalidation::InvalidationStrategy;
use super::memory::{MemoryStats, MemoryTier};
use super::persistent::PersistentTier;
use crate::clock::{Clock, SystemClock};
use crate::events::{RevalidationEvent, RevalidationListener};
use crate::DataResult;

/// Occupancy and counters across both tiers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CacheStats {
    pub memory: MemoryStats,
    pub persistent_enabled: bool,
    pub persistent_hits: u64,
    pub revalidating: usize,
}

struct TieredInner {
    memory: MemoryTier,
    persistent: Option<Arc<dyn PersistentTier>>,
    strategy: InvalidationStrategy,
    clock: Arc<dyn Clock>,
    /// Kept past the rule TTL so expired-by-rule data can still be served stale.
    stale_retention: Duration,
    revalidating: Mutex<HashSet<String>>,
    persistent_hits: Mutex<u64>,
}

/// Memory tier in front of an optional persistent tier.
///
/// Cheap to clone; clones share both tiers.
#[derive(Clone)]
pub struct TieredCache {
    inner: Arc<TieredInner>,
}

impl Default for TieredCache {
    fn default() -> Self {
        Self::memory_only(MemoryTier::default(), Arc::new(SystemClock))
    }
}

impl TieredCache {
    pub fn new(
        memory: MemoryTier,
        persistent: Option<Arc<dyn PersistentTier>>,
        strategy: InvalidationStrategy,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self::with_retention(memory, persistent, strategy, clock, Duration::ZERO)
    }

    /// Like [`TieredCache::new`], with default-TTL writes retained for
    /// `stale_retention` past the rule TTL.
    pub fn with_retention(
        memory: MemoryTier,
        persistent: Option<Arc<dyn PersistentTier>>,
        strategy: InvalidationStrategy,
        clock: Arc<dyn Clock>,
        stale_retention: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(TieredInner {
                memory,
                persistent,
                strategy,
                clock,
                stale_retention,
                revalidating: Mutex::new(HashSet::new()),
                persistent_hits: Mutex::new(0),
            }),
        }
    }

    pub fn memory_only(memory: MemoryTier, clock: Arc<dyn Clock>) -> Self {
        Self::new(memory, None, InvalidationStrategy::default(), clock)
    }

    pub fn strategy(&self) -> &InvalidationStrategy {
        &self.inner.strategy
    }

    pub fn memory(&self) -> &MemoryTier {
        &self.inner.memory
    }

    pub fn has_persistent_tier(&self) -> bool {
        self.inner.persistent.is_some()
    }

    /// Storage TTL of a default write: rule TTL plus stale retention.
    pub fn retention_ttl(&self, key: &str) -> Duration {
        self.inner
            .strategy
            .rule_for_key(key)
            .ttl
            .saturating_add(self.inner.stale_retention)
    }

    /// Memory first, then the persistent tier; persistent hits are promoted
    /// into memory for whatever lifetime the persistent entry has left.
    pub async fn get(&self, key: &str) -> Option<DataResult> {
        if let Some(value) = self.inner.memory.get(key) {
            return Some(value);
        }

        let persistent = self.inner.persistent.as_ref()?;
        match persistent.get(key).await {
            Ok(Some(entry)) => {
                let ttl = entry.remaining(self.inner.clock.now_ms());
                let value = entry.value;
                self.inner.memory.set(key, value.clone(), ttl);
                *self
                    .inner
                    .persistent_hits
                    .lock()
                    .expect("persistent hit counter is not poisoned") += 1;
                tracing::debug!(key, "promoted persistent cache entry into memory");
                Some(value)
            }
            Ok(None) => None,
            Err(error) => {
                tracing::warn!(key, %error, "persistent cache read failed");
                None
            }
        }
    }

    /// Write to memory, and to the persistent tier when `persist` is set.
    /// `ttl` defaults to [`TieredCache::retention_ttl`].
    pub async fn set(&self, key: &str, value: DataResult, ttl: Option<Duration>, persist: bool) {
        let ttl = ttl.unwrap_or_else(|| self.retention_ttl(key));

        if persist {
            if let Some(persistent) = &self.inner.persistent {
                if let Err(error) = persistent.set(key, &value, ttl).await {
                    tracing::warn!(key, %error, "persistent cache write failed");
                }
            }
        }

        self.inner.memory.set(key, value, ttl);
    }

    pub async fn delete(&self, key: &str) -> bool {
        let mut removed = self.inner.memory.delete(key);
        if let Some(persistent) = &self.inner.persistent {
            match persistent.delete(key).await {
                Ok(deleted) => removed |= deleted,
                Err(error) => tracing::warn!(key, %error, "persistent cache delete failed"),
            }
        }
        removed
    }

    /// Remove every key starting with `prefix` from both tiers.
    pub async fn delete_prefix(&self, prefix: &str) -> usize {
        let mut removed = self.inner.memory.delete_prefix(prefix);
        if let Some(persistent) = &self.inner.persistent {
            match persistent.delete_prefix(prefix).await {
                Ok(count) => removed = removed.max(count),
                Err(error) => tracing::warn!(prefix, %error, "persistent cache delete failed"),
            }
        }
        removed
    }

    pub async fn clear(&self) {
        self.inner.memory.clear();
        if let Some(persistent) = &self.inner.persistent {
            if let Err(error) = persistent.clear().await {
                tracing::warn!(%error, "persistent cache clear failed");
            }
        }
    }

    /// Drop expired entries from both tiers, returning the total removed.
    pub async fn clean_expired(&self) -> usize {
        let mut removed = self.inner.memory.clean_expired();
        if let Some(persistent) = &self.inner.persistent {
            match persistent.clean_expired().await {
                Ok(count) => removed += count,
                Err(error) => tracing::warn!(%error, "persistent cache cleanup failed"),
            }
        }
        removed
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            memory: self.inner.memory.stats(),
            persistent_enabled: self.inner.persistent.is_some(),
            persistent_hits: *self
                .inner
                .persistent_hits
                .lock()
                .expect("persistent hit counter is not poisoned"),
            revalidating: self.revalidating_count(),
        }
    }

    pub fn is_revalidating(&self, key: &str) -> bool {
        self.inner
            .revalidating
            .lock()
            .expect("revalidating set is not poisoned")
            .contains(key)
    }

    pub fn revalidating_count(&self) -> usize {
        self.inner
            .revalidating
            .lock()
            .expect("revalidating set is not poisoned")
            .len()
    }

    /// Serve cached data immediately, refreshing it in the background once
    /// it is older than the rule TTL.
    ///
    /// Without a cached value, or when the key's rule disables
    /// stale-while-revalidate and the value is stale, `fetcher` runs inline
    /// and its error is returned. Background failures are only logged; a
    /// successful background refresh replaces the entry and notifies
    /// `listener`.
    pub async fn stale_while_revalidate<F, Fut, E>(
        &self,
        key: &str,
        fetcher: F,
        listener: Option<Arc<dyn RevalidationListener>>,
    ) -> Result<DataResult, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<DataResult, E>> + Send + 'static,
        E: Display + Send + 'static,
    {
        let now = self.inner.clock.now_ms();
        let rule = self.inner.strategy.rule_for_key(key);

        let cached = self.get(key).await;
        let Some(cached) = cached else {
            let fresh = fetcher().await?;
            self.set(key, fresh.clone(), None, true).await;
            return Ok(fresh);
        };

        if !self.inner.strategy.is_stale(key, &cached, now) {
            return Ok(cached);
        }

        if !rule.stale_while_revalidate {
            let fresh = fetcher().await?;
            self.set(key, fresh.clone(), None, true).await;
            return Ok(fresh);
        }

        let started = self
            .inner
            .revalidating
            .lock()
            .expect("revalidating set is not poisoned")
            .insert(key.to_owned());

        if started {
            tracing::debug!(key, "serving stale entry, revalidating in background");
            let cache = self.clone();
            let owned_key = key.to_owned();
            let refresh = fetcher();
            tokio::spawn(async move {
                match refresh.await {
                    Ok(fresh) => {
                        cache.set(&owned_key, fresh.clone(), None, true).await;
                        if let Some(listener) = listener {
                            listener.on_revalidated(RevalidationEvent::new(owned_key.clone(), fresh));
                        }
                    }
                    Err(error) => {
                        tracing::warn!(key = %owned_key, %error, "background revalidation failed");
                    }
                }
                cache
                    .inner
                    .revalidating
                    .lock()
                    .expect("revalidating set is not poisoned")
                    .remove(&owned_key);
            });
        }

        Ok(cached)
    }
}
