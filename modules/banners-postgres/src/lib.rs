//! banners-postgres — active-notification backend for the banners event log.
//!
//! Events are rows; new-event signals ride Postgres LISTEN/NOTIFY, so one
//! shared listener task serves every subscription instead of per-topic
//! polling. The NOTIFY channel is the topic name, the payload the row id.

mod store;

pub use store::{PostgresStore, DEFAULT_TABLE};
