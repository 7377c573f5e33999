//! Facade behavior over the in-memory store: publish/recall/retire
//! semantics and the watcher lifecycle.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use banners_core::{
    Banner, BannerConfig, BannerError, Event, MemoryStore, Subscriber, TIMESTAMP_FIELD,
    TOPIC_FIELD,
};

/// Subscriber that records everything it receives.
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

    fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }
}

#[async_trait]
impl Subscriber for Collector {
    async fn on_event(&self, event: Event) {
        self.events.lock().unwrap().push(event);
    }
}

fn banner(max_events: i64, rate: Duration) -> Banner {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    Banner::new(
        Arc::new(MemoryStore::new()),
        BannerConfig::default()
            .with_max_events_in_topic(max_events)
            .with_watch_rate(rate),
    )
}

const RATE: Duration = Duration::from_millis(50);

/// Poll until `check` passes or five seconds elapse.
async fn wait_until(check: impl Fn() -> bool) -> bool {
    for _ in 0..500 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

// =========================================================================
// Publish / recall / retire
// =========================================================================

#[tokio::test]
async fn publish_injects_missing_fields() {
    let banner = banner(50, RATE);
    banner.publish("alerts", Event::new()).await.unwrap();

    let events = banner.recall("alerts", 1).await.unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].topic(), Some("alerts"));
    assert!(events[0].timestamp().is_some());
}

#[tokio::test]
async fn publish_preserves_caller_fields_verbatim() {
    let banner = banner(50, RATE);
    let body = Event::new()
        .with_field(TOPIC_FIELD, "custom-topic")
        .with_field(TIMESTAMP_FIELD, "20260101-000000000000")
        .with_field("n", 1);
    banner.publish("alerts", body).await.unwrap();

    let events = banner.recall("alerts", 1).await.unwrap();
    assert_eq!(events[0].topic(), Some("custom-topic"));
    assert_eq!(events[0].timestamp(), Some("20260101-000000000000"));
}

#[tokio::test]
async fn recall_returns_last_n_in_publish_order() {
    let banner = banner(50, RATE);
    for n in 0..5 {
        banner
            .publish("t", Event::new().with_field("n", n))
            .await
            .unwrap();
    }

    let all = banner.recall("t", 5).await.unwrap();
    let order: Vec<_> = all.iter().map(|e| e.get("n").unwrap().clone()).collect();
    assert_eq!(order, vec![0, 1, 2, 3, 4]);

    let last_three = banner.recall("t", 3).await.unwrap();
    let order: Vec<_> = last_three
        .iter()
        .map(|e| e.get("n").unwrap().clone())
        .collect();
    assert_eq!(order, vec![2, 3, 4]);
}

#[tokio::test]
async fn recall_rejects_non_positive_counts() {
    let banner = banner(50, RATE);
    banner.publish("t", Event::new()).await.unwrap();

    for count in [0, -1, -100] {
        let err = banner.recall("t", count).await.unwrap_err();
        assert!(matches!(err, BannerError::InvalidArgument(_)));
    }
}

#[tokio::test]
async fn recall_on_unknown_topic_is_empty() {
    let banner = banner(50, RATE);
    assert!(banner.recall("never-published", 10).await.unwrap().is_empty());
}

#[tokio::test]
async fn retire_keeps_exactly_the_newest() {
    let banner = banner(100, RATE);
    for n in 0..6 {
        banner
            .publish("t", Event::new().with_field("n", n))
            .await
            .unwrap();
    }

    banner.retire("t", 2).await.unwrap();
    let events = banner.recall("t", 100).await.unwrap();
    let order: Vec<_> = events.iter().map(|e| e.get("n").unwrap().clone()).collect();
    assert_eq!(order, vec![4, 5]);

    // Keep-count above the current size is a no-op.
    banner.retire("t", 10).await.unwrap();
    assert_eq!(banner.recall("t", 100).await.unwrap().len(), 2);
}

#[tokio::test]
async fn negative_keep_count_disables_retirement() {
    let banner = banner(100, RATE);
    for _ in 0..4 {
        banner.publish("t", Event::new()).await.unwrap();
    }
    banner.retire("t", -1).await.unwrap();
    assert_eq!(banner.recall("t", 100).await.unwrap().len(), 4);
}

#[tokio::test]
async fn publish_retires_to_the_configured_cap() {
    let banner = banner(10, RATE);
    for n in 0..10 {
        banner
            .publish("t", Event::new().with_field("n", n))
            .await
            .unwrap();
    }

    let events = banner.recall("t", 100).await.unwrap();
    assert_eq!(events.len(), 10);
    let stamps: Vec<_> = events
        .iter()
        .map(|e| e.timestamp().unwrap().to_string())
        .collect();
    let mut sorted = stamps.clone();
    sorted.sort();
    assert_eq!(stamps, sorted);

    // One more pushes the oldest out.
    banner
        .publish("t", Event::new().with_field("n", 10))
        .await
        .unwrap();
    let events = banner.recall("t", 100).await.unwrap();
    assert_eq!(events.len(), 10);
    assert_eq!(events[0].get("n").unwrap(), 1);
    assert_eq!(events[9].get("n").unwrap(), 10);
}

// =========================================================================
// Watcher lifecycle
// =========================================================================

#[tokio::test]
async fn second_subscribe_fails_until_unsubscribed() {
    let banner = banner(50, RATE);
    banner.subscribe("t", Collector::new()).await.unwrap();

    let err = banner.subscribe("t", Collector::new()).await.unwrap_err();
    assert!(matches!(err, BannerError::AlreadyWatched(_)));

    banner.unsubscribe("t").await;
    banner.subscribe("t", Collector::new()).await.unwrap();
    banner.close().await;
}

#[tokio::test]
async fn subscriber_receives_a_publish_within_one_cycle() {
    let banner = banner(50, RATE);
    let collector = Collector::new();
    banner.subscribe("t", collector.clone()).await.unwrap();

    banner
        .publish("t", Event::new().with_field("msg", "hello"))
        .await
        .unwrap();

    let seen = {
        let collector = collector.clone();
        wait_until(move || collector.count() == 1).await
    };
    assert!(seen, "event was not delivered");
    let events = collector.events();
    assert_eq!(events[0].get("msg").and_then(|v| v.as_str()), Some("hello"));
    assert_eq!(events[0].topic(), Some("t"));
    banner.close().await;
}

#[tokio::test]
async fn subscribing_without_a_cursor_replays_the_retained_window() {
    let banner = banner(50, RATE);
    banner
        .publish("t", Event::new().with_field("n", 0))
        .await
        .unwrap();
    banner
        .publish("t", Event::new().with_field("n", 1))
        .await
        .unwrap();

    let collector = Collector::new();
    banner.subscribe("t", collector.clone()).await.unwrap();

    let seen = {
        let collector = collector.clone();
        wait_until(move || collector.count() == 2).await
    };
    assert!(seen);
    banner.close().await;
}

#[tokio::test]
async fn start_cursor_skips_earlier_events() {
    let banner = banner(50, RATE);
    let early = banner.publish("t", Event::new().with_field("n", 0)).await.unwrap();

    let collector = Collector::new();
    banner
        .subscribe_from("t", collector.clone(), &early.timestamp)
        .await
        .unwrap();

    banner
        .publish("t", Event::new().with_field("n", 1))
        .await
        .unwrap();

    let seen = {
        let collector = collector.clone();
        wait_until(move || collector.count() == 1).await
    };
    assert!(seen);
    assert_eq!(collector.events()[0].get("n").unwrap(), 1);
    banner.close().await;
}

#[tokio::test]
async fn delivery_is_in_timestamp_order() {
    let banner = banner(50, RATE);
    let collector = Collector::new();
    banner.subscribe("t", collector.clone()).await.unwrap();

    for n in 0..5 {
        banner
            .publish("t", Event::new().with_field("n", n))
            .await
            .unwrap();
    }

    let seen = {
        let collector = collector.clone();
        wait_until(move || collector.count() == 5).await
    };
    assert!(seen);
    let order: Vec<_> = collector
        .events()
        .iter()
        .map(|e| e.get("n").unwrap().clone())
        .collect();
    assert_eq!(order, vec![0, 1, 2, 3, 4]);
    banner.close().await;
}

#[tokio::test]
async fn unsubscribe_is_synchronous() {
    let banner = banner(50, RATE);
    let collector = Collector::new();
    banner.subscribe("t", collector.clone()).await.unwrap();

    banner.publish("t", Event::new()).await.unwrap();
    let seen = {
        let collector = collector.clone();
        wait_until(move || collector.count() == 1).await
    };
    assert!(seen);

    banner.unsubscribe("t").await;
    let count_at_unsubscribe = collector.count();

    // Anything published after unsubscribe returns must never arrive.
    banner.publish("t", Event::new()).await.unwrap();
    tokio::time::sleep(RATE * 5).await;
    assert_eq!(collector.count(), count_at_unsubscribe);
}

#[tokio::test]
async fn unsubscribe_of_unknown_topic_is_a_noop() {
    let banner = banner(50, RATE);
    banner.unsubscribe("never-subscribed").await;
}

#[tokio::test]
async fn close_stops_every_watcher() {
    let banner = banner(50, RATE);
    let first = Collector::new();
    let second = Collector::new();
    banner.subscribe("a", first.clone()).await.unwrap();
    banner.subscribe("b", second.clone()).await.unwrap();

    banner.close().await;

    banner.publish("a", Event::new()).await.unwrap();
    banner.publish("b", Event::new()).await.unwrap();
    tokio::time::sleep(RATE * 5).await;
    assert_eq!(first.count(), 0);
    assert_eq!(second.count(), 0);

    // A closed instance accepts fresh subscriptions.
    banner.subscribe("a", Collector::new()).await.unwrap();
    banner.close().await;
}
