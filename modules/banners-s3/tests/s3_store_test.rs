//! Object-store backend behavior over an in-memory object store.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use banners_core::{
    Banner, BannerConfig, Event, EventStore, Subscriber, TIMESTAMP_FIELD, TOPIC_FIELD,
};
use banners_s3::S3Store;
use object_store::memory::InMemory;

struct Collector {
    events: Mutex<Vec<Event>>,
}

impl Collector {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            events: Mutex::new(Vec::new()),
        })
    }

    fn count(&self) -> usize {
        self.events.lock().unwrap().len()
    }
}

#[async_trait]
impl Subscriber for Collector {
    async fn on_event(&self, event: Event) {
        self.events.lock().unwrap().push(event);
    }
}

fn memory_store() -> Arc<S3Store> {
    Arc::new(S3Store::new(Arc::new(InMemory::new()), "banners"))
}

const RATE: Duration = Duration::from_millis(50);

async fn wait_until(check: impl Fn() -> bool) -> bool {
    for _ in 0..500 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

fn stamped(topic: &str, timestamp: &str) -> Event {
    Event::new()
        .with_field(TOPIC_FIELD, topic)
        .with_field(TIMESTAMP_FIELD, timestamp)
}

#[tokio::test]
async fn listing_sorts_keys_regardless_of_append_order() {
    let store = memory_store();
    for ts in ["b", "a", "c"] {
        store.append("t", &stamped("t", ts)).await.unwrap();
    }

    let refs = store.list_ordered("t").await.unwrap();
    let stamps: Vec<_> = refs.iter().map(|r| r.timestamp.as_str()).collect();
    assert_eq!(stamps, ["a", "b", "c"]);
}

#[tokio::test]
async fn listing_an_unpublished_topic_is_empty() {
    let store = memory_store();
    assert!(store.list_ordered("ghost").await.unwrap().is_empty());
}

#[tokio::test]
async fn fetch_after_delete_is_not_found() {
    let store = memory_store();
    let event_ref = store.append("t", &stamped("t", "a")).await.unwrap();

    store.delete("t", std::slice::from_ref(&event_ref)).await.unwrap();
    // Idempotent: a second delete of the same ref is still success.
    store.delete("t", std::slice::from_ref(&event_ref)).await.unwrap();

    let err = store.fetch("t", &event_ref).await.unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn publish_recall_and_retire_through_the_facade() {
    let banner = Banner::new(
        memory_store(),
        BannerConfig::default().with_max_events_in_topic(3),
    );

    for n in 0..5 {
        banner
            .publish("t", Event::new().with_field("n", n))
            .await
            .unwrap();
    }

    let events = banner.recall("t", 100).await.unwrap();
    assert_eq!(events.len(), 3);
    let order: Vec<_> = events.iter().map(|e| e.get("n").unwrap().clone()).collect();
    assert_eq!(order, vec![2, 3, 4]);
    assert_eq!(events[0].topic(), Some("t"));
}

#[tokio::test]
async fn watcher_delivers_from_the_object_store() {
    let banner = Banner::new(
        memory_store(),
        BannerConfig::default().with_watch_rate(RATE),
    );

    let collector = Collector::new();
    banner.subscribe("t", collector.clone()).await.unwrap();

    banner
        .publish("t", Event::new().with_field("n", 1))
        .await
        .unwrap();

    let seen = {
        let collector = collector.clone();
        wait_until(move || collector.count() == 1).await
    };
    assert!(seen, "event was not delivered");
    banner.close().await;
}
