use std::collections::BTreeMap;
use std::sync::{Mutex, Weak};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use super::DataOrchestrator;
use crate::cache::RevalidateTrigger;
use crate::DatasetKind;

/// One recurring refresh task per dataset kind.
///
/// Tasks hold only a [`Weak`] reference, so they never keep the
/// orchestrator alive and exit on their own once it is dropped.
#[derive(Default)]
pub(crate) struct RefreshTimers {
    handles: Mutex<BTreeMap<DatasetKind, JoinHandle<()>>>,
}

impl RefreshTimers {
    /// Start (or restart) the timer for `kind`.
    pub(crate) fn start(
        &self,
        orchestrator: Weak<DataOrchestrator>,
        kind: DatasetKind,
        interval: Duration,
    ) {
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                let Some(orchestrator) = orchestrator.upgrade() else {
                    break;
                };
                tracing::debug!(dataset = %kind, "scheduled refresh");
                if let Err(error) = orchestrator
                    .refresh_with(kind, RevalidateTrigger::Scheduled)
                    .await
                {
                    tracing::warn!(dataset = %kind, %error, "scheduled refresh failed");
                }
            }
        });

        let previous = self
            .handles
            .lock()
            .expect("refresh timers are not poisoned")
            .insert(kind, handle);
        if let Some(previous) = previous {
            previous.abort();
        }
    }

    pub(crate) fn cancel(&self, kind: DatasetKind) -> bool {
        let handle = self
            .handles
            .lock()
            .expect("refresh timers are not poisoned")
            .remove(&kind);
        match handle {
            Some(handle) => {
                handle.abort();
                true
            }
            None => false,
        }
    }

    pub(crate) fn cancel_all(&self) -> usize {
        let handles = std::mem::take(
            &mut *self
                .handles
                .lock()
                .expect("refresh timers are not poisoned"),
        );
        let count = handles.len();
        for handle in handles.into_values() {
            handle.abort();
        }
        count
    }

    pub(crate) fn active(&self) -> Vec<DatasetKind> {
        self.handles
            .lock()
            .expect("refresh timers are not poisoned")
            .keys()
            .copied()
            .collect()
    }
}

impl Drop for RefreshTimers {
    fn drop(&mut self) {
        if let Ok(handles) = self.handles.get_mut() {
            for handle in handles.values() {
                handle.abort();
            }
        }
    }
}
