use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use object_store::aws::AmazonS3Builder;
use object_store::path::Path;
use object_store::{ObjectStore, PutPayload};

use banners_core::{BannerError, Event, EventRef, EventStore, Result};

/// Event store over an object store, keyed under a root prefix.
pub struct S3Store {
    store: Arc<dyn ObjectStore>,
    root: Path,
}

impl S3Store {
    pub fn new(store: Arc<dyn ObjectStore>, root: impl AsRef<str>) -> Self {
        Self {
            store,
            root: Path::from(root.as_ref()),
        }
    }

    /// S3 client from the standard AWS environment (`AWS_ACCESS_KEY_ID`,
    /// `AWS_SECRET_ACCESS_KEY`, `AWS_ENDPOINT`, ...), bucket from
    /// `BANNERS_S3_BUCKET`, root prefix from `BANNERS_ROOT_PATH`
    /// (default `banners`).
    pub fn from_env() -> Result<Self> {
        let bucket = std::env::var("BANNERS_S3_BUCKET").map_err(|_| {
            BannerError::BackendUnavailable("BANNERS_S3_BUCKET is not set".to_string())
        })?;
        let s3 = AmazonS3Builder::from_env()
            .with_bucket_name(bucket)
            .build()
            .map_err(|e| BannerError::BackendUnavailable(e.to_string()))?;
        let root =
            std::env::var("BANNERS_ROOT_PATH").unwrap_or_else(|_| "banners".to_string());
        Ok(Self::new(Arc::new(s3), root))
    }

    fn event_path(&self, topic: &str, timestamp: &str) -> Path {
        self.root.child(topic).child(format!("{timestamp}.json"))
    }
}

fn backend_err(e: object_store::Error) -> BannerError {
    match e {
        object_store::Error::NotFound { path, .. } => BannerError::NotFound(path),
        other => BannerError::BackendUnavailable(other.to_string()),
    }
}

#[async_trait]
impl EventStore for S3Store {
    async fn append(&self, topic: &str, event: &Event) -> Result<EventRef> {
        let timestamp = event
            .timestamp()
            .ok_or_else(|| {
                BannerError::InvalidArgument("event is missing banner_timestamp".to_string())
            })?
            .to_string();

        let body = serde_json::to_vec(event)?;
        self.store
            .put(&self.event_path(topic, &timestamp), PutPayload::from(body))
            .await
            .map_err(backend_err)?;
        Ok(EventRef::from_timestamp(timestamp))
    }

    async fn list_ordered(&self, topic: &str) -> Result<Vec<EventRef>> {
        let prefix = self.root.child(topic);
        let mut entries = self.store.list(Some(&prefix));

        let mut stamps = Vec::new();
        while let Some(meta) = entries.next().await {
            let meta = meta.map_err(backend_err)?;
            if let Some(stamp) = meta
                .location
                .filename()
                .and_then(|name| name.strip_suffix(".json"))
            {
                stamps.push(stamp.to_string());
            }
        }
        // Listings are not guaranteed to come back in key order.
        stamps.sort();
        Ok(stamps.into_iter().map(EventRef::from_timestamp).collect())
    }

    async fn fetch(&self, topic: &str, event_ref: &EventRef) -> Result<Event> {
        let result = self
            .store
            .get(&self.event_path(topic, &event_ref.timestamp))
            .await
            .map_err(backend_err)?;
        let bytes = result.bytes().await.map_err(backend_err)?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    async fn delete(&self, topic: &str, refs: &[EventRef]) -> Result<()> {
        for event_ref in refs {
            match self
                .store
                .delete(&self.event_path(topic, &event_ref.timestamp))
                .await
            {
                Ok(()) => {}
                Err(object_store::Error::NotFound { .. }) => {}
                Err(e) => return Err(backend_err(e)),
            }
        }
        Ok(())
    }
}
