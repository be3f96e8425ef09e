use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Serialize;

use crate::clock::{duration_ms, Clock, SystemClock};
use crate::DataResult;

pub const DEFAULT_MEMORY_BUDGET_BYTES: usize = 50 * 1024 * 1024;

#[derive(Debug, Clone)]
struct MemoryEntry {
    value: DataResult,
    created_at_ms: i64,
    expires_at_ms: i64,
    accessed_at_ms: i64,
    /// Tie-breaker for entries touched within the same millisecond.
    access_seq: u64,
    size_bytes: usize,
}

#[derive(Debug, Default)]
struct MemoryInner {
    entries: HashMap<String, MemoryEntry>,
    used_bytes: usize,
    access_seq: u64,
    hits: u64,
    misses: u64,
    evictions: u64,
    rejections: u64,
}

impl MemoryInner {
    fn next_seq(&mut self) -> u64 {
        self.access_seq = self.access_seq.wrapping_add(1);
        self.access_seq
    }

    fn remove(&mut self, key: &str) -> Option<MemoryEntry> {
        let entry = self.entries.remove(key)?;
        self.used_bytes = self.used_bytes.saturating_sub(entry.size_bytes);
        Some(entry)
    }

    fn evict_least_recent(&mut self) -> bool {
        let victim = self
            .entries
            .iter()
            .min_by_key(|(_, entry)| (entry.accessed_at_ms, entry.access_seq))
            .map(|(key, _)| key.clone());

        match victim {
            Some(key) => {
                self.remove(&key);
                self.evictions += 1;
                tracing::debug!(key = %key, "evicted least recently used cache entry");
                true
            }
            None => false,
        }
    }
}

/// Counters and occupancy of the memory tier.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MemoryStats {
    pub entries: usize,
    pub used_bytes: usize,
    pub max_bytes: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub rejections: u64,
    /// Percentage of lookups served, 0 when nothing was looked up.
    pub hit_rate: f64,
    /// Percentage of the byte budget in use.
    pub utilization: f64,
}

/// Byte-bounded in-memory tier with least-recently-used eviction.
pub struct MemoryTier {
    max_bytes: usize,
    clock: Arc<dyn Clock>,
    inner: Mutex<MemoryInner>,
}

impl Default for MemoryTier {
    fn default() -> Self {
        Self::new(DEFAULT_MEMORY_BUDGET_BYTES, Arc::new(SystemClock))
    }
}

impl MemoryTier {
    pub fn new(max_bytes: usize, clock: Arc<dyn Clock>) -> Self {
        Self {
            max_bytes,
            clock,
            inner: Mutex::new(MemoryInner::default()),
        }
    }

    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    /// Look up `key`. Expired entries are dropped and reported as a miss.
    pub fn get(&self, key: &str) -> Option<DataResult> {
        let now = self.clock.now_ms();
        let mut inner = self.inner.lock().expect("memory tier lock is not poisoned");

        match inner.entries.get(key).map(|entry| now > entry.expires_at_ms) {
            None => {
                inner.misses += 1;
                return None;
            }
            Some(true) => {
                inner.remove(key);
                inner.misses += 1;
                return None;
            }
            Some(false) => {}
        }

        let seq = inner.next_seq();
        inner.hits += 1;
        let entry = inner.entries.get_mut(key)?;
        entry.accessed_at_ms = now;
        entry.access_seq = seq;
        Some(entry.value.clone())
    }

    /// Store `value` for `ttl`, evicting least recently used entries until it
    /// fits. Returns `false` when the value alone exceeds the whole budget;
    /// any previous entry for `key` is dropped either way.
    pub fn set(&self, key: &str, value: DataResult, ttl: Duration) -> bool {
        let size_bytes = estimate_size(&value);
        let now = self.clock.now_ms();
        let mut inner = self.inner.lock().expect("memory tier lock is not poisoned");

        inner.remove(key);
        if size_bytes > self.max_bytes {
            inner.rejections += 1;
            tracing::warn!(
                key,
                size_bytes,
                max_bytes = self.max_bytes,
                "cache entry larger than memory budget, not cached"
            );
            return false;
        }

        while inner.used_bytes + size_bytes > self.max_bytes {
            if !inner.evict_least_recent() {
                break;
            }
        }

        let access_seq = inner.next_seq();
        inner.used_bytes += size_bytes;
        inner.entries.insert(
            key.to_owned(),
            MemoryEntry {
                value,
                created_at_ms: now,
                expires_at_ms: now.saturating_add(duration_ms(ttl)),
                accessed_at_ms: now,
                access_seq,
                size_bytes,
            },
        );
        true
    }

    pub fn delete(&self, key: &str) -> bool {
        self.inner
            .lock()
            .expect("memory tier lock is not poisoned")
            .remove(key)
            .is_some()
    }

    pub fn delete_prefix(&self, prefix: &str) -> usize {
        let mut inner = self.inner.lock().expect("memory tier lock is not poisoned");
        let keys: Vec<String> = inner
            .entries
            .keys()
            .filter(|key| key.starts_with(prefix))
            .cloned()
            .collect();
        for key in &keys {
            inner.remove(key);
        }
        keys.len()
    }

    pub fn clear(&self) {
        let mut inner = self.inner.lock().expect("memory tier lock is not poisoned");
        inner.entries.clear();
        inner.used_bytes = 0;
    }

    pub fn clean_expired(&self) -> usize {
        let now = self.clock.now_ms();
        let mut inner = self.inner.lock().expect("memory tier lock is not poisoned");
        let expired: Vec<String> = inner
            .entries
            .iter()
            .filter(|(_, entry)| now > entry.expires_at_ms)
            .map(|(key, _)| key.clone())
            .collect();
        for key in &expired {
            inner.remove(key);
        }
        expired.len()
    }

    pub fn len(&self) -> usize {
        self.inner
            .lock()
            .expect("memory tier lock is not poisoned")
            .entries
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Creation time of the entry under `key`, if cached.
    pub fn created_at_ms(&self, key: &str) -> Option<i64> {
        self.inner
            .lock()
            .expect("memory tier lock is not poisoned")
            .entries
            .get(key)
            .map(|entry| entry.created_at_ms)
    }

    pub fn stats(&self) -> MemoryStats {
        let inner = self.inner.lock().expect("memory tier lock is not poisoned");
        let lookups = inner.hits + inner.misses;
        MemoryStats {
            entries: inner.entries.len(),
            used_bytes: inner.used_bytes,
            max_bytes: self.max_bytes,
            hits: inner.hits,
            misses: inner.misses,
            evictions: inner.evictions,
            rejections: inner.rejections,
            hit_rate: percentage(inner.hits, lookups),
            utilization: if self.max_bytes == 0 {
                0.0
            } else {
                inner.used_bytes as f64 / self.max_bytes as f64 * 100.0
            },
        }
    }

    pub fn reset_stats(&self) {
        let mut inner = self.inner.lock().expect("memory tier lock is not poisoned");
        inner.hits = 0;
        inner.misses = 0;
        inner.evictions = 0;
        inner.rejections = 0;
    }
}

/// Approximate footprint: length of the JSON encoding.
fn estimate_size(value: &DataResult) -> usize {
    serde_json::to_vec(value).map_or(0, |bytes| bytes.len())
}

pub(crate) fn percentage(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64 * 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::{DatasetKind, ProviderId, Record};

    fn result(records: usize) -> DataResult {
        let data = (0..records)
            .map(|index| Record::new(format!("c{index}"), "cable", DatasetKind::Cables))
            .collect();
        DataResult::live(data, ProviderId::TeleGeography, 0.95, 0)
    }

    #[test]
    fn entry_expires_after_ttl() {
        let clock = ManualClock::new(0);
        let tier = MemoryTier::new(1 << 20, Arc::new(clock.clone()));

        tier.set("cables:", result(1), Duration::from_millis(100));
        assert!(tier.get("cables:").is_some());

        clock.advance(Duration::from_millis(150));
        assert!(tier.get("cables:").is_none());
        assert_eq!(tier.len(), 0);

        let stats = tier.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hit_rate, 50.0);
    }

    #[test]
    fn evicts_least_recently_accessed_entry() {
        let clock = ManualClock::new(0);
        let one = estimate_size(&result(1));
        let tier = MemoryTier::new(one * 2, Arc::new(clock.clone()));

        tier.set("a:", result(1), Duration::from_secs(60));
        clock.advance(Duration::from_millis(1));
        tier.set("b:", result(1), Duration::from_secs(60));
        clock.advance(Duration::from_millis(1));
        assert!(tier.get("a:").is_some());

        clock.advance(Duration::from_millis(1));
        assert!(tier.set("c:", result(1), Duration::from_secs(60)));

        assert!(tier.get("a:").is_some());
        assert!(tier.get("b:").is_none());
        assert!(tier.get("c:").is_some());
        assert_eq!(tier.stats().evictions, 1);
    }

    #[test]
    fn oversized_entry_is_rejected_without_evicting() {
        let clock = ManualClock::new(0);
        let tier = MemoryTier::new(estimate_size(&result(1)) + 8, Arc::new(clock));

        tier.set("small:", result(1), Duration::from_secs(60));
        assert!(!tier.set("big:", result(50), Duration::from_secs(60)));

        assert!(tier.get("small:").is_some());
        assert_eq!(tier.stats().rejections, 1);
        assert_eq!(tier.stats().evictions, 0);
    }

    #[test]
    fn delete_prefix_and_clean_expired_report_counts() {
        let clock = ManualClock::new(0);
        let tier = MemoryTier::new(1 << 20, Arc::new(clock.clone()));
        tier.set("ixps:", result(1), Duration::from_millis(10));
        tier.set("ixps:limit=5", result(1), Duration::from_secs(60));
        tier.set("cables:", result(1), Duration::from_secs(60));

        clock.advance(Duration::from_millis(20));
        assert_eq!(tier.clean_expired(), 1);
        assert_eq!(tier.delete_prefix("ixps:"), 1);
        assert_eq!(tier.len(), 1);
        assert!(tier.stats().utilization > 0.0);
    }

    #[test]
    fn repeated_reads_are_identical() {
        let tier = MemoryTier::default();
        tier.set("cables:", result(3), Duration::from_secs(60));

        let first = serde_json::to_string(&tier.get("cables:")).expect("encode");
        let second = serde_json::to_string(&tier.get("cables:")).expect("encode");
        assert_eq!(first, second);
    }
}
