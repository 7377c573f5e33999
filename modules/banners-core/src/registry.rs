//! Topic registry: one live watcher registration per topic, with join
//! semantics on deregistration.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::warn;

use crate::error::{BannerError, Result};
use crate::watch::Subscriber;

/// Registration served by the shared signal-dispatch task.
#[derive(Clone)]
pub(crate) struct SharedRegistration {
    pub(crate) subscriber: Arc<dyn Subscriber>,
    /// Timestamp boundary below which signaled events are not delivered.
    /// Empty means deliver everything.
    pub(crate) start_cursor: String,
    /// Held for the duration of each delivery. Deregistration acquires it
    /// once to wait out an in-flight callback.
    pub(crate) gate: Arc<tokio::sync::Mutex<()>>,
}

impl SharedRegistration {
    pub(crate) fn new(subscriber: Arc<dyn Subscriber>, start_cursor: String) -> Self {
        Self {
            subscriber,
            start_cursor,
            gate: Arc::new(tokio::sync::Mutex::new(())),
        }
    }
}

struct TaskHandle {
    cancel: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl TaskHandle {
    /// Signal cancellation and block until the task has fully stopped.
    async fn stop(self) {
        let _ = self.cancel.send(true);
        if let Err(e) = self.task.await {
            warn!(error = %e, "watcher task did not stop cleanly");
        }
    }
}

enum WatcherEntry {
    /// Per-topic polling task (passive backends).
    Dedicated(TaskHandle),
    /// Slice of the shared signal-dispatch task (active backends).
    Shared(SharedRegistration),
}

/// Process-wide-within-instance map from topic to its live watcher state.
/// Mutated only under one lock; deregistration guarantees no further
/// subscriber invocation for the topic once it returns.
#[derive(Default)]
pub(crate) struct TopicRegistry {
    topics: Mutex<HashMap<String, WatcherEntry>>,
    /// The shared dispatch task, alive while any `Shared` entry exists.
    /// Start and stop are serialized through this lock so a 1→0→1 flicker
    /// cannot strand a registration without a running task.
    shared: tokio::sync::Mutex<Option<TaskHandle>>,
}

impl TopicRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    fn lock_topics(&self) -> MutexGuard<'_, HashMap<String, WatcherEntry>> {
        self.topics.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn is_watched(&self, topic: &str) -> bool {
        self.lock_topics().contains_key(topic)
    }

    pub(crate) fn has_live_watchers(&self) -> bool {
        !self.lock_topics().is_empty()
    }

    /// Look up the shared registration routing a signaled topic.
    pub(crate) fn shared_registration(&self, topic: &str) -> Option<SharedRegistration> {
        match self.lock_topics().get(topic) {
            Some(WatcherEntry::Shared(registration)) => Some(registration.clone()),
            _ => None,
        }
    }

    /// Register a topic backed by its own polling task. `spawn` receives the
    /// cancellation receiver and returns the running task.
    pub(crate) fn watch_dedicated<F>(&self, topic: &str, spawn: F) -> Result<()>
    where
        F: FnOnce(watch::Receiver<bool>) -> JoinHandle<()>,
    {
        let mut topics = self.lock_topics();
        if topics.contains_key(topic) {
            return Err(BannerError::AlreadyWatched(topic.to_string()));
        }
        let (cancel, cancel_rx) = watch::channel(false);
        let task = spawn(cancel_rx);
        topics.insert(
            topic.to_string(),
            WatcherEntry::Dedicated(TaskHandle { cancel, task }),
        );
        Ok(())
    }

    /// Register a topic served by the shared dispatch task, starting that
    /// task on the 0→1 registration transition.
    pub(crate) async fn watch_shared<F>(
        &self,
        topic: &str,
        registration: SharedRegistration,
        start: F,
    ) -> Result<()>
    where
        F: FnOnce(watch::Receiver<bool>) -> JoinHandle<()>,
    {
        {
            let mut topics = self.lock_topics();
            if topics.contains_key(topic) {
                return Err(BannerError::AlreadyWatched(topic.to_string()));
            }
            topics.insert(topic.to_string(), WatcherEntry::Shared(registration));
        }

        let mut shared = self.shared.lock().await;
        if shared.is_none() {
            let (cancel, cancel_rx) = watch::channel(false);
            let task = start(cancel_rx);
            *shared = Some(TaskHandle { cancel, task });
        }
        Ok(())
    }

    /// Deregister a topic. No-op if absent. Returns only once no in-flight
    /// or future invocation of the topic's subscriber can occur.
    pub(crate) async fn unwatch(&self, topic: &str) {
        let entry = self.lock_topics().remove(topic);
        match entry {
            None => {}
            Some(WatcherEntry::Dedicated(handle)) => handle.stop().await,
            Some(WatcherEntry::Shared(registration)) => {
                // The dispatch loop rechecks liveness under the gate, so
                // holding it once here joins any in-flight delivery and
                // fences off future ones.
                drop(registration.gate.lock().await);
                self.stop_shared_if_idle().await;
            }
        }
    }

    /// Deregister every topic, blocking until all watchers have stopped.
    pub(crate) async fn unwatch_all(&self) {
        let topics: Vec<String> = self.lock_topics().keys().cloned().collect();
        for topic in topics {
            self.unwatch(&topic).await;
        }
        self.stop_shared_if_idle().await;
    }

    /// Stop the shared task on the 1→0 transition. The count is checked
    /// under the `shared` lock so a concurrent subscribe either lands before
    /// the check (and keeps the task alive) or waits and starts a fresh one.
    async fn stop_shared_if_idle(&self) {
        let mut shared = self.shared.lock().await;
        let any_shared = self
            .lock_topics()
            .values()
            .any(|entry| matches!(entry, WatcherEntry::Shared(_)));
        if any_shared {
            return;
        }
        if let Some(handle) = shared.take() {
            handle.stop().await;
        }
    }

    /// Last-resort teardown for a dropped-without-close instance: abort
    /// tasks without joining. Never blocks, never panics.
    pub(crate) fn abort_all(&self) {
        for (_, entry) in self.lock_topics().drain() {
            if let WatcherEntry::Dedicated(handle) = entry {
                handle.task.abort();
            }
        }
        if let Ok(mut shared) = self.shared.try_lock() {
            if let Some(handle) = shared.take() {
                handle.task.abort();
            }
        }
    }
}
