//! Two-tier result cache with per-dataset invalidation rules.
//!
//! | Tier | Backing | Bound |
//! |------|---------|-------|
//! | [`MemoryTier`] | `HashMap` behind a mutex | byte budget, LRU eviction |
//! | [`PersistentTier`] | DuckDB file via [`DuckDbTier`] | expiry index, bulk cleanup |
//!
//! [`TieredCache`] reads memory first, falls back to the persistent tier and
//! promotes hits upward. Writes always land in memory and, unless disabled
//! per call, in the persistent tier as well. The two writes are not
//! transactional.

mod invalidation;
mod memory;
mod persistent;
mod tiered;

use thiserror::Error;

pub use invalidation::{dataset_kind_of, InvalidationRule, InvalidationStrategy, RevalidateTrigger};
pub use memory::{MemoryStats, MemoryTier, DEFAULT_MEMORY_BUDGET_BYTES};
pub use persistent::{CacheFuture, DuckDbTier, PersistedEntry, PersistentTier};
pub use tiered::{CacheStats, TieredCache};

/// Errors raised by a cache tier.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error(transparent)]
    Store(#[from] netatlas_store::StoreError),

    #[error("cache value serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("cache worker failed: {0}")]
    Worker(String),
}
