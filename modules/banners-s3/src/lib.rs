//! banners-s3 — object-store backend for the banners event log.
//!
//! Wraps any [`object_store::ObjectStore`] (Amazon S3 and compatibles, or
//! `InMemory` in tests) under a key prefix, one object per event at
//! `{prefix}/{topic}/{timestamp}.json`. Passive: watchers poll the listing.

mod store;

pub use store::S3Store;
