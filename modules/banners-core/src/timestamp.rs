//! Timestamp generation for event ordering.

use std::sync::{Mutex, PoisonError};

use chrono::Utc;

/// Issues `%Y%m%d-%H%M%S%6f` stamps (microsecond resolution) that are
/// strictly increasing for a single source, even when two calls land in the
/// same microsecond or the wall clock steps backwards: colliding stamps get
/// a fixed-width counter suffix that preserves lexicographic order.
#[derive(Debug, Default)]
pub struct TimestampSource {
    last: Mutex<Last>,
}

#[derive(Debug, Default)]
struct Last {
    base: String,
    dups: u32,
}

impl TimestampSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// The next stamp, strictly greater than every stamp issued before it.
    pub fn next(&self) -> String {
        self.advance(Utc::now().format("%Y%m%d-%H%M%S%6f").to_string())
    }

    fn advance(&self, candidate: String) -> String {
        let mut last = self.last.lock().unwrap_or_else(PoisonError::into_inner);
        if candidate.as_str() <= last.base.as_str() {
            last.dups += 1;
            return format!("{}-{:04}", last.base, last.dups);
        }
        last.base = candidate.clone();
        last.dups = 0;
        candidate
    }
}
