use std::env;
use std::time::Duration;

/// Per-instance configuration. Backend location and credentials live with
/// the driver crates.
#[derive(Debug, Clone)]
pub struct BannerConfig {
    /// Retention keep-count applied after every publish. Negative disables
    /// automatic retirement.
    pub max_events_in_topic: i64,
    /// Watcher cycle period: the poll interval for passive backends, the
    /// signal-wait timeout for active ones.
    pub watch_rate: Duration,
}

impl Default for BannerConfig {
    fn default() -> Self {
        Self {
            max_events_in_topic: 50,
            watch_rate: Duration::from_secs(5),
        }
    }
}

impl BannerConfig {
    /// Load configuration from `BANNERS_MAX_EVENTS_IN_TOPIC` and
    /// `BANNERS_WATCH_RATE_SECS`, falling back to the defaults.
    /// Panics with a clear message if a variable is present but malformed.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_events_in_topic: env::var("BANNERS_MAX_EVENTS_IN_TOPIC")
                .map(|v| {
                    v.parse()
                        .expect("BANNERS_MAX_EVENTS_IN_TOPIC must be an integer")
                })
                .unwrap_or(defaults.max_events_in_topic),
            watch_rate: env::var("BANNERS_WATCH_RATE_SECS")
                .map(|v| {
                    Duration::from_secs(
                        v.parse().expect("BANNERS_WATCH_RATE_SECS must be an integer"),
                    )
                })
                .unwrap_or(defaults.watch_rate),
        }
    }

    pub fn with_max_events_in_topic(mut self, max: i64) -> Self {
        self.max_events_in_topic = max;
        self
    }

    pub fn with_watch_rate(mut self, rate: Duration) -> Self {
        self.watch_rate = rate;
        self
    }
}
