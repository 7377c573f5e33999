//! Watcher loops: deliver new events to subscribers.
//!
//! Passive backends get one polling task per watched topic. An active
//! backend gets a single task per [`Banner`](crate::Banner) instance that
//! multiplexes every registration over the backend's signal channel, since
//! the underlying channel mechanism is connection-wide.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::event::Event;
use crate::registry::TopicRegistry;
use crate::store::{EventStore, SignalChannel};

/// Receives events for one watched topic.
///
/// Invocations for a single topic arrive in ascending timestamp order and
/// never overlap; invocations for different topics may interleave. Delivery
/// is at-least-once. Execution time is the subscriber's own business: a
/// slow `on_event` delays that topic's deliveries, nothing else.
#[async_trait]
pub trait Subscriber: Send + Sync + 'static {
    async fn on_event(&self, event: Event);
}

/// Per-topic polling loop for passive backends.
///
/// Each cycle: interruptible sleep of `rate`, list the topic, deliver
/// everything strictly newer than the cursor, advance the cursor. A topic
/// whose storage location does not exist yet is zero new events. Transient
/// backend failures are retried on the next cycle.
pub(crate) async fn poll_topic(
    store: Arc<dyn EventStore>,
    topic: String,
    subscriber: Arc<dyn Subscriber>,
    mut cursor: String,
    rate: Duration,
    mut cancel: watch::Receiver<bool>,
) {
    info!(topic = %topic, "watcher started");
    loop {
        // Cancellation interrupts the sleep itself, so teardown latency is
        // bounded by one cycle rather than by `rate`.
        tokio::select! {
            changed = cancel.changed() => {
                if changed.is_err() || *cancel.borrow() {
                    break;
                }
                continue;
            }
            _ = tokio::time::sleep(rate) => {}
        }

        let refs = match store.list_ordered(&topic).await {
            Ok(refs) => refs,
            Err(e) => {
                warn!(topic = %topic, error = %e, "listing failed, retrying next cycle");
                continue;
            }
        };

        for event_ref in refs {
            if event_ref.timestamp.as_str() <= cursor.as_str() {
                continue;
            }
            match store.fetch(&topic, &event_ref).await {
                Ok(event) => {
                    subscriber.on_event(event).await;
                    cursor = event_ref.timestamp;
                }
                Err(e) if e.is_not_found() => {
                    // Raced with retirement between list and fetch.
                    debug!(topic = %topic, event_ref = %event_ref, "event retired mid-cycle, skipping");
                    cursor = event_ref.timestamp;
                }
                Err(e) => {
                    warn!(topic = %topic, error = %e, "fetch failed, retrying next cycle");
                    break;
                }
            }
        }
    }
    info!(topic = %topic, "watcher stopped");
}

/// Shared signal-dispatch loop for an active backend.
///
/// Blocks on the signal channel up to `rate` per cycle and routes each
/// fired (topic, ref) to its live registration. Delivery happens under the
/// registration's gate so an unsubscribe can wait out an in-flight callback
/// without stopping the shared task.
pub(crate) async fn dispatch_signals(
    store: Arc<dyn EventStore>,
    signals: Arc<dyn SignalChannel>,
    registry: Arc<TopicRegistry>,
    rate: Duration,
    mut cancel: watch::Receiver<bool>,
) {
    info!("signal watcher started");
    loop {
        let batch = tokio::select! {
            changed = cancel.changed() => {
                if changed.is_err() || *cancel.borrow() {
                    break;
                }
                continue;
            }
            result = signals.await_signal(rate) => match result {
                Ok(batch) => batch,
                Err(e) => {
                    warn!(error = %e, "signal wait failed, retrying next cycle");
                    continue;
                }
            }
        };

        for (topic, event_ref) in batch {
            let Some(registration) = registry.shared_registration(&topic) else {
                continue;
            };
            let event = match store.fetch(&topic, &event_ref).await {
                Ok(event) => event,
                Err(e) if e.is_not_found() => {
                    debug!(topic = %topic, event_ref = %event_ref, "signaled event already gone, skipping");
                    continue;
                }
                Err(e) => {
                    warn!(topic = %topic, error = %e, "fetch failed, dropping signal");
                    continue;
                }
            };
            if !registration.start_cursor.is_empty() {
                let old = event
                    .timestamp()
                    .is_some_and(|ts| ts <= registration.start_cursor.as_str());
                if old {
                    continue;
                }
            }

            // The gate orders deliveries per topic and lets deregistration
            // join an in-flight callback. Liveness is rechecked once held:
            // an unsubscribe that removed the registration first wins.
            let _delivering = registration.gate.lock().await;
            if !registry.is_watched(&topic) {
                continue;
            }
            registration.subscriber.on_event(event).await;
        }
    }
    info!("signal watcher stopped");
}
