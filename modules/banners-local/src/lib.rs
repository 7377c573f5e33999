//! banners-local — filesystem backend for the banners event log.
//!
//! One file per event, `{root}/{topic}/{timestamp}.json`. Passive: watchers
//! poll the topic directory on a timer.

mod store;

pub use store::LocalStore;
