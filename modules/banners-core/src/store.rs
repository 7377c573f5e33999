//! The capability contract every storage backend implements.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;
use crate::event::Event;

/// Reference to a stored event.
///
/// `timestamp` is the topic-local sort key. Drivers that key events by a row
/// id set `id` as well; a ref minted from a notification payload may carry
/// only the id, with an empty timestamp, and is then only usable for fetch.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EventRef {
    pub timestamp: String,
    pub id: Option<i64>,
}

impl EventRef {
    pub fn from_timestamp(timestamp: impl Into<String>) -> Self {
        Self {
            timestamp: timestamp.into(),
            id: None,
        }
    }

    pub fn from_id(id: i64) -> Self {
        Self {
            timestamp: String::new(),
            id: Some(id),
        }
    }
}

impl fmt::Display for EventRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.id {
            Some(id) if self.timestamp.is_empty() => write!(f, "id {id}"),
            Some(id) => write!(f, "{} (id {id})", self.timestamp),
            None => f.write_str(&self.timestamp),
        }
    }
}

/// Storage driver contract. One implementation per backend kind.
///
/// Events handed to [`append`](Self::append) are already validated: the
/// `topic` and `banner_timestamp` fields are present.
#[async_trait]
pub trait EventStore: Send + Sync + 'static {
    /// Persist the event under its timestamp. Visible to subsequent
    /// [`list_ordered`](Self::list_ordered) calls.
    async fn append(&self, topic: &str, event: &Event) -> Result<EventRef>;

    /// All currently visible refs for a topic in ascending timestamp order.
    /// A topic with no events, or that does not yet exist, yields an empty
    /// vec, not an error.
    async fn list_ordered(&self, topic: &str) -> Result<Vec<EventRef>>;

    /// Resolve a ref to full event content. Fails with `NotFound` when the
    /// ref no longer exists; callers racing with retirement tolerate that
    /// instead of treating it as fatal.
    async fn fetch(&self, topic: &str, event_ref: &EventRef) -> Result<Event>;

    /// Remove the given events. Idempotent: deleting an already-absent ref
    /// is not an error.
    async fn delete(&self, topic: &str, refs: &[EventRef]) -> Result<()>;

    /// The push-style notification channel, present only on
    /// active-notification backends. Its presence selects the watcher
    /// strategy: a shared signal-dispatch task instead of per-topic polling.
    fn signals(&self) -> Option<Arc<dyn SignalChannel>> {
        None
    }
}

/// New-event notification primitive of an active backend, abstracting a
/// relational LISTEN/NOTIFY channel. Shared between the publish path
/// ([`signal`](Self::signal)) and the watcher ([`await_signal`](Self::await_signal));
/// implementations tolerate concurrent use from both.
#[async_trait]
pub trait SignalChannel: Send + Sync + 'static {
    /// Start receiving signals for a topic.
    async fn listen(&self, topic: &str) -> Result<()>;

    /// Stop receiving signals for a topic.
    async fn unlisten(&self, topic: &str) -> Result<()>;

    /// Announce a newly appended event. Fired by the publish path.
    async fn signal(&self, topic: &str, event_ref: &EventRef) -> Result<()>;

    /// Block until at least one signal fires, or return an empty vec after
    /// `timeout`.
    async fn await_signal(&self, timeout: Duration) -> Result<Vec<(String, EventRef)>>;
}
