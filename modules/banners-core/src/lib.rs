//! banners-core — topic-based publish/subscribe event log.
//!
//! Producers append JSON events to named topics; subscribers receive new
//! events as they arrive; a retention policy bounds each topic's size. The
//! storage medium is pluggable behind [`EventStore`]: passive backends are
//! polled on a timer, active backends push notifications through a
//! [`SignalChannel`] and share one listener task per [`Banner`] instance.

pub mod banner;
pub mod config;
pub mod error;
pub mod event;
pub mod memory;
mod registry;
pub mod retire;
pub mod store;
pub mod timestamp;
pub mod watch;

pub use banner::Banner;
pub use config::BannerConfig;
pub use error::{BannerError, Result};
pub use event::{Event, TIMESTAMP_FIELD, TOPIC_FIELD};
pub use memory::MemoryStore;
pub use retire::compute_retire_set;
pub use store::{EventRef, EventStore, SignalChannel};
pub use timestamp::TimestampSource;
pub use watch::Subscriber;
