use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

use crate::cache::CacheStats;

/// Running counters, updated lock-free.
#[derive(Debug, Default)]
pub(crate) struct Counters {
    requests: AtomicU64,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    live_calls: AtomicU64,
    stale_serves: AtomicU64,
    fallbacks: AtomicU64,
    errors: AtomicU64,
}

#[derive(Debug, Clone, Copy)]
pub(crate) enum Counter {
    Requests,
    CacheHits,
    CacheMisses,
    LiveCalls,
    StaleServes,
    Fallbacks,
    Errors,
}

impl Counters {
    fn slot(&self, counter: Counter) -> &AtomicU64 {
        match counter {
            Counter::Requests => &self.requests,
            Counter::CacheHits => &self.cache_hits,
            Counter::CacheMisses => &self.cache_misses,
            Counter::LiveCalls => &self.live_calls,
            Counter::StaleServes => &self.stale_serves,
            Counter::Fallbacks => &self.fallbacks,
            Counter::Errors => &self.errors,
        }
    }

    pub(crate) fn incr(&self, counter: Counter) {
        self.slot(counter).fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn reset(&self) {
        for counter in [
            Counter::Requests,
            Counter::CacheHits,
            Counter::CacheMisses,
            Counter::LiveCalls,
            Counter::StaleServes,
            Counter::Fallbacks,
            Counter::Errors,
        ] {
            self.slot(counter).store(0, Ordering::Relaxed);
        }
    }

    pub(crate) fn snapshot(&self, cache: Option<CacheStats>) -> Statistics {
        let load = |counter| self.slot(counter).load(Ordering::Relaxed);
        let requests = load(Counter::Requests);
        let cache_hits = load(Counter::CacheHits);
        let cache_misses = load(Counter::CacheMisses);
        let fallbacks = load(Counter::Fallbacks);

        Statistics {
            requests,
            cache_hits,
            cache_misses,
            live_calls: load(Counter::LiveCalls),
            stale_serves: load(Counter::StaleServes),
            fallbacks,
            errors: load(Counter::Errors),
            hit_rate: percentage(cache_hits, cache_hits + cache_misses),
            fallback_rate: percentage(fallbacks, requests),
            cache,
        }
    }
}

/// Orchestrator statistics with derived percentages.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Statistics {
    pub requests: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub live_calls: u64,
    pub stale_serves: u64,
    pub fallbacks: u64,
    pub errors: u64,
    /// Cache hits over cache lookups, in percent.
    pub hit_rate: f64,
    /// Fallback serves over requests, in percent.
    pub fallback_rate: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache: Option<CacheStats>,
}

fn percentage(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        0.0
    } else {
        (part as f64 / whole as f64 * 10_000.0).round() / 100.0
    }
}
