//! Shared fixtures for the netatlas behavior tests.

use std::sync::Arc;

use netatlas_core::{DataResult, DatasetKind, ManualClock, MemoryTier, ProviderId, Record};

/// A single-record live cable result stamped at `at_ms`.
pub fn cable_result(id: &str, at_ms: i64) -> DataResult {
    DataResult::live(
        vec![Record::new(id, "Cable", DatasetKind::Cables)],
        ProviderId::TeleGeography,
        0.95,
        at_ms,
    )
}

/// Memory tier of `max_bytes` driven by `clock`.
pub fn memory_tier(clock: &ManualClock, max_bytes: usize) -> MemoryTier {
    MemoryTier::new(max_bytes, Arc::new(clock.clone()))
}
