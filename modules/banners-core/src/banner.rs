//! The public facade composing the store, the retention engine, and the
//! watcher machinery.

use std::sync::Arc;

use tracing::warn;

use crate::config::BannerConfig;
use crate::error::{BannerError, Result};
use crate::event::{Event, TIMESTAMP_FIELD, TOPIC_FIELD};
use crate::registry::{SharedRegistration, TopicRegistry};
use crate::retire::compute_retire_set;
use crate::store::{EventRef, EventStore};
use crate::timestamp::TimestampSource;
use crate::watch::{self, Subscriber};

/// A handle on one event log. Owns the watcher registrations made through
/// it; exactly one live subscription per topic.
///
/// The owner is expected to call [`close`](Self::close) when done; it
/// cancels every live watcher with join semantics. Dropping a `Banner`
/// without closing aborts watcher tasks without waiting for them.
pub struct Banner {
    store: Arc<dyn EventStore>,
    config: BannerConfig,
    stamps: TimestampSource,
    registry: Arc<TopicRegistry>,
}

impl Banner {
    pub fn new(store: Arc<dyn EventStore>, config: BannerConfig) -> Self {
        Self {
            store,
            config,
            stamps: TimestampSource::new(),
            registry: Arc::new(TopicRegistry::new()),
        }
    }

    pub fn config(&self) -> &BannerConfig {
        &self.config
    }

    /// Publish an event to a topic, then retire the topic down to
    /// `max_events_in_topic`.
    ///
    /// Missing `topic` / `banner_timestamp` fields are injected before
    /// persistence; caller-provided values are preserved verbatim. The
    /// first publish materializes the topic.
    pub async fn publish(&self, topic: &str, body: Event) -> Result<EventRef> {
        let mut event = body;
        if event.topic().is_none() {
            event.insert(TOPIC_FIELD, topic);
        }
        if event.timestamp().is_none() {
            event.insert(TIMESTAMP_FIELD, self.stamps.next());
        }

        let event_ref = self.store.append(topic, &event).await?;
        if let Some(signals) = self.store.signals() {
            signals.signal(topic, &event_ref).await?;
        }
        self.retire(topic, self.config.max_events_in_topic).await?;
        Ok(event_ref)
    }

    /// Subscribe to a topic from the beginning of its retained window.
    /// Fails with `AlreadyWatched` if the topic already has a live
    /// subscription on this instance.
    pub async fn subscribe(&self, topic: &str, subscriber: Arc<dyn Subscriber>) -> Result<()> {
        self.subscribe_from(topic, subscriber, "").await
    }

    /// Subscribe to a topic, ignoring events with timestamps at or before
    /// `start`.
    pub async fn subscribe_from(
        &self,
        topic: &str,
        subscriber: Arc<dyn Subscriber>,
        start: &str,
    ) -> Result<()> {
        match self.store.signals() {
            None => {
                let store = Arc::clone(&self.store);
                let watched_topic = topic.to_string();
                let cursor = start.to_string();
                let rate = self.config.watch_rate;
                self.registry.watch_dedicated(topic, move |cancel| {
                    tokio::spawn(watch::poll_topic(
                        store,
                        watched_topic,
                        subscriber,
                        cursor,
                        rate,
                        cancel,
                    ))
                })
            }
            Some(signals) => {
                let registration = SharedRegistration::new(subscriber, start.to_string());
                let store = Arc::clone(&self.store);
                let registry = Arc::clone(&self.registry);
                let channel = Arc::clone(&signals);
                let rate = self.config.watch_rate;
                self.registry
                    .watch_shared(topic, registration, move |cancel| {
                        tokio::spawn(watch::dispatch_signals(
                            store, channel, registry, rate, cancel,
                        ))
                    })
                    .await?;

                // The channel subscription must be active before subscribe
                // returns, or a publish racing this call could go unseen.
                if let Err(e) = signals.listen(topic).await {
                    self.registry.unwatch(topic).await;
                    return Err(e);
                }
                Ok(())
            }
        }
    }

    /// Unsubscribe from a topic. No-op if not subscribed. Once this
    /// returns, no further `on_event` invocation for the topic occurs,
    /// even against a concurrent publish.
    pub async fn unsubscribe(&self, topic: &str) {
        if self.registry.is_watched(topic) {
            if let Some(signals) = self.store.signals() {
                if let Err(e) = signals.unlisten(topic).await {
                    warn!(topic = %topic, error = %e, "unlisten failed during unsubscribe");
                }
            }
        }
        self.registry.unwatch(topic).await;
    }

    /// Delete the oldest events beyond `keep_count`. Negative `keep_count`
    /// disables retirement for this call. Events already gone when the
    /// delete lands count as deleted.
    pub async fn retire(&self, topic: &str, keep_count: i64) -> Result<()> {
        if keep_count < 0 {
            return Ok(());
        }
        let refs = self.store.list_ordered(topic).await?;
        let doomed = compute_retire_set(&refs, keep_count);
        if doomed.is_empty() {
            return Ok(());
        }
        self.store.delete(topic, doomed).await
    }

    /// The most recent `count` events of a topic in ascending timestamp
    /// order. Fails with `InvalidArgument` for `count < 1`; a topic that
    /// was never published to yields an empty vec.
    pub async fn recall(&self, topic: &str, count: i64) -> Result<Vec<Event>> {
        if count < 1 {
            return Err(BannerError::InvalidArgument(format!(
                "recall count must be a positive integer, got {count}"
            )));
        }

        let refs = self.store.list_ordered(topic).await?;
        let skip = refs.len().saturating_sub(count as usize);
        let mut events = Vec::with_capacity(refs.len() - skip);
        for event_ref in &refs[skip..] {
            match self.store.fetch(topic, event_ref).await {
                Ok(event) => events.push(event),
                Err(e) if e.is_not_found() => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(events)
    }

    /// Cancel every live watcher, blocking until each has fully stopped.
    /// Never fails; must be called before the instance is dropped for a
    /// clean shutdown.
    pub async fn close(&self) {
        self.registry.unwatch_all().await;
    }
}

impl Drop for Banner {
    fn drop(&mut self) {
        if self.registry.has_live_watchers() {
            warn!("banner dropped with live watchers, aborting them; call close() for a clean shutdown");
            self.registry.abort_all();
        }
    }
}
