//! Background task that evicts expired sessions.

use std::sync::Weak;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use super::{Inner, SessionStore};

pub(super) struct SweeperHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SweeperHandle {
    /// Signal the task and wait until it has exited.
    pub(super) async fn stop(self) {
        // The receiver is gone only if the task already exited.
        let _ = self.shutdown.send(true);
        if let Err(e) = self.task.await {
            warn!(error = %e, "Session sweeper ended abnormally");
        }
    }
}

/// Spawn the sweeper. It holds only a weak reference to the store and
/// exits on its own if the store is dropped.
pub(super) fn spawn(store: Weak<Inner>) -> SweeperHandle {
    let (shutdown, mut shutdown_rx) = watch::channel(false);

    let period = match store.upgrade() {
        Some(inner) => inner.config.cleanup_interval(),
        None => std::time::Duration::from_secs(60),
    };

    let task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let Some(inner) = store.upgrade() else { break };
                    run_once(SessionStore::from_inner(inner)).await;
                }
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        break;
                    }
                }
            }
        }
        debug!("Session sweeper stopped");
    });

    SweeperHandle { shutdown, task }
}

async fn run_once(store: SessionStore) {
    store.sweep();

    if store.inner.config.persist_on_mutation && store.is_dirty() {
        if let Err(e) = store.save().await {
            warn!(error = %e, "Periodic session snapshot failed");
        }
    }
}
