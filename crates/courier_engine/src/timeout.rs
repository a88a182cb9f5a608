use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use courier_core::{FrameId, Outbound, TabId, TimeoutKey, TimeoutTable};
use courier_logging::courier_debug;
use futures_util::future::BoxFuture;

use crate::transport::Transport;

/// Cancellation handle for one scheduled trigger.
pub struct TriggerHandle {
    cancel: Box<dyn FnOnce() + Send>,
}

impl TriggerHandle {
    pub fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            cancel: Box::new(cancel),
        }
    }

    /// Stops the pending trigger. Cancelling one that already fired is a no-op.
    pub fn cancel(self) {
        (self.cancel)();
    }
}

impl fmt::Debug for TriggerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("TriggerHandle")
    }
}

/// One-shot deferred execution, decoupled from any concrete timer primitive.
pub trait TriggerScheduler: Send + Sync {
    fn schedule(&self, delay: Duration, fire: BoxFuture<'static, ()>) -> TriggerHandle;
}

/// Production scheduler: a spawned task that sleeps through the delay and
/// then runs the trigger; cancellation aborts the task.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioScheduler;

impl TriggerScheduler for TokioScheduler {
    fn schedule(&self, delay: Duration, fire: BoxFuture<'static, ()>) -> TriggerHandle {
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            fire.await;
        });
        let abort = task.abort_handle();
        TriggerHandle::new(move || abort.abort())
    }
}

#[derive(Debug)]
struct Entry {
    generation: u64,
    handle: TriggerHandle,
}

/// Pending deferred triggers, keyed by (tab, frame, type tag).
///
/// At most one trigger is pending per key at any time; installing over a
/// live entry cancels the previous trigger before the new one lands.
pub struct TimeoutRegistry {
    transport: Arc<dyn Transport>,
    scheduler: Arc<dyn TriggerScheduler>,
    table: Arc<Mutex<TimeoutTable<Entry>>>,
    generations: AtomicU64,
}

impl TimeoutRegistry {
    pub fn new(transport: Arc<dyn Transport>, scheduler: Arc<dyn TriggerScheduler>) -> Self {
        Self {
            transport,
            scheduler,
            table: Arc::new(Mutex::new(TimeoutTable::new())),
            generations: AtomicU64::new(0),
        }
    }

    /// Installs a trigger, replacing (and cancelling) any pending one for
    /// the same key. When the delay elapses the entry is removed before the
    /// notification goes out; a notification that cannot be delivered is
    /// swallowed.
    pub fn set(&self, tab: TabId, frame: FrameId, type_tag: &str, delay_ms: u64) {
        let key = TimeoutKey::new(tab, frame, type_tag);
        let generation = self.generations.fetch_add(1, Ordering::Relaxed);

        let fire: BoxFuture<'static, ()> = {
            let table = Arc::clone(&self.table);
            let transport = Arc::clone(&self.transport);
            let key = key.clone();
            let type_tag = type_tag.to_owned();
            Box::pin(async move {
                // Delete the entry before notifying, and only if it is still
                // ours: a clear or replacement that happened while we slept
                // wins, and this notification is suppressed.
                let still_ours = {
                    let mut table = table.lock().unwrap_or_else(PoisonError::into_inner);
                    table
                        .remove_if(&key, |entry| entry.generation == generation)
                        .is_some()
                };
                if !still_ours {
                    return;
                }
                let Ok(message) = serde_json::to_value(Outbound::TimeoutFired { type_tag }) else {
                    return;
                };
                if let Err(err) = transport.send_to_frame(key.tab, key.frame, message).await {
                    courier_debug!(
                        "timeout notification for tab {} frame {} dropped: {err}",
                        key.tab,
                        key.frame
                    );
                }
            })
        };

        // Hold the lock across schedule+insert so a zero-delay trigger
        // cannot observe the table before its own entry is installed.
        let mut table = self.table.lock().unwrap_or_else(PoisonError::into_inner);
        let handle = self
            .scheduler
            .schedule(Duration::from_millis(delay_ms), fire);
        if let Some(previous) = table.insert(key, Entry { generation, handle }) {
            previous.handle.cancel();
        }
    }

    /// Cancels and removes the pending trigger for the key; no-op if absent.
    pub fn clear(&self, tab: TabId, frame: FrameId, type_tag: &str) {
        let key = TimeoutKey::new(tab, frame, type_tag);
        let removed = {
            self.table
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(&key)
        };
        if let Some(entry) = removed {
            entry.handle.cancel();
        }
    }

    /// Evicts every pending trigger owned by the closed tab. Each underlying
    /// trigger is cancelled explicitly; dropping the entries alone would not
    /// stop the scheduled actions.
    pub fn on_tab_removed(&self, tab: TabId) {
        let drained = {
            self.table
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .remove_tab(tab)
        };
        for entry in drained {
            entry.handle.cancel();
        }
    }

    /// Number of triggers currently pending across all tabs.
    pub fn pending(&self) -> usize {
        self.table
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}
