//! Notifications emitted after background cache revalidation.

use serde::Serialize;
use tokio::sync::broadcast;

use crate::cache::dataset_kind_of;
use crate::DataResult;

/// A cache entry was refreshed in the background.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RevalidationEvent {
    pub key: String,
    /// Dataset kind segment of `key`.
    pub dataset: String,
    pub result: DataResult,
}

impl RevalidationEvent {
    pub fn new(key: impl Into<String>, result: DataResult) -> Self {
        let key = key.into();
        let dataset = dataset_kind_of(&key).to_owned();
        Self {
            key,
            dataset,
            result,
        }
    }
}

/// Observer injected into the orchestrator at construction.
pub trait RevalidationListener: Send + Sync {
    fn on_revalidated(&self, event: RevalidationEvent);
}

/// Listener that fans events out over a `tokio` broadcast channel.
#[derive(Debug, Clone)]
pub struct BroadcastListener {
    sender: broadcast::Sender<RevalidationEvent>,
}

impl Default for BroadcastListener {
    fn default() -> Self {
        Self::new(64)
    }
}

impl BroadcastListener {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RevalidationEvent> {
        self.sender.subscribe()
    }

    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl RevalidationListener for BroadcastListener {
    fn on_revalidated(&self, event: RevalidationEvent) {
        // No subscribers is not an error.
        let _ = self.sender.send(event);
    }
}
