//! In-process event store, for tests and embedded use.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use crate::error::{BannerError, Result};
use crate::event::Event;
use crate::store::{EventRef, EventStore};

type Topics = HashMap<String, BTreeMap<String, Event>>;

/// Passive in-memory backend. Topics are maps keyed by timestamp, so
/// listing order falls out of the key order.
#[derive(Debug, Default)]
pub struct MemoryStore {
    topics: Mutex<Topics>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Topics> {
        self.topics.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl EventStore for MemoryStore {
    async fn append(&self, topic: &str, event: &Event) -> Result<EventRef> {
        let timestamp = event
            .timestamp()
            .ok_or_else(|| {
                BannerError::InvalidArgument("event is missing banner_timestamp".to_string())
            })?
            .to_string();
        self.lock()
            .entry(topic.to_string())
            .or_default()
            .insert(timestamp.clone(), event.clone());
        Ok(EventRef::from_timestamp(timestamp))
    }

    async fn list_ordered(&self, topic: &str) -> Result<Vec<EventRef>> {
        Ok(self
            .lock()
            .get(topic)
            .map(|events| events.keys().cloned().map(EventRef::from_timestamp).collect())
            .unwrap_or_default())
    }

    async fn fetch(&self, topic: &str, event_ref: &EventRef) -> Result<Event> {
        self.lock()
            .get(topic)
            .and_then(|events| events.get(&event_ref.timestamp))
            .cloned()
            .ok_or_else(|| BannerError::NotFound(format!("{topic}/{event_ref}")))
    }

    async fn delete(&self, topic: &str, refs: &[EventRef]) -> Result<()> {
        let mut topics = self.lock();
        if let Some(events) = topics.get_mut(topic) {
            for event_ref in refs {
                events.remove(&event_ref.timestamp);
            }
        }
        Ok(())
    }
}
