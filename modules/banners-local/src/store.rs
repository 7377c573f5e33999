use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;

use banners_core::{BannerError, Event, EventRef, EventStore, Result};

/// Event store rooted at a local directory. Topic directories are created
/// on first publish; event files are named by timestamp, so a plain sorted
/// listing yields the topic order.
pub struct LocalStore {
    root: PathBuf,
}

impl LocalStore {
    /// Open a store rooted at `root`, creating the directory if needed.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root).await.map_err(|e| {
            BannerError::BackendUnavailable(format!("creating {}: {e}", root.display()))
        })?;
        Ok(Self { root })
    }

    /// Root from `BANNERS_ROOT_PATH`, else `{tempdir}/banners`.
    pub async fn open_from_env() -> Result<Self> {
        let root = std::env::var("BANNERS_ROOT_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| std::env::temp_dir().join("banners"));
        Self::open(root).await
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn topic_dir(&self, topic: &str) -> PathBuf {
        self.root.join(topic)
    }

    fn event_path(&self, topic: &str, timestamp: &str) -> PathBuf {
        self.topic_dir(topic).join(format!("{timestamp}.json"))
    }
}

fn backend_err(e: io::Error) -> BannerError {
    BannerError::BackendUnavailable(e.to_string())
}

#[async_trait]
impl EventStore for LocalStore {
    async fn append(&self, topic: &str, event: &Event) -> Result<EventRef> {
        let timestamp = event
            .timestamp()
            .ok_or_else(|| {
                BannerError::InvalidArgument("event is missing banner_timestamp".to_string())
            })?
            .to_string();

        fs::create_dir_all(self.topic_dir(topic))
            .await
            .map_err(backend_err)?;
        let body = serde_json::to_vec(event)?;
        fs::write(self.event_path(topic, &timestamp), body)
            .await
            .map_err(backend_err)?;
        Ok(EventRef::from_timestamp(timestamp))
    }

    async fn list_ordered(&self, topic: &str) -> Result<Vec<EventRef>> {
        let mut dir = match fs::read_dir(self.topic_dir(topic)).await {
            Ok(dir) => dir,
            // A topic that has never been published to has no directory.
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(backend_err(e)),
        };

        let mut stamps = Vec::new();
        while let Some(entry) = dir.next_entry().await.map_err(backend_err)? {
            let name = entry.file_name();
            if let Some(stamp) = name.to_string_lossy().strip_suffix(".json") {
                stamps.push(stamp.to_string());
            }
        }
        stamps.sort();
        Ok(stamps.into_iter().map(EventRef::from_timestamp).collect())
    }

    async fn fetch(&self, topic: &str, event_ref: &EventRef) -> Result<Event> {
        let bytes = match fs::read(self.event_path(topic, &event_ref.timestamp)).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(BannerError::NotFound(format!("{topic}/{event_ref}")));
            }
            Err(e) => return Err(backend_err(e)),
        };
        Ok(serde_json::from_slice(&bytes)?)
    }

    async fn delete(&self, topic: &str, refs: &[EventRef]) -> Result<()> {
        for event_ref in refs {
            match fs::remove_file(self.event_path(topic, &event_ref.timestamp)).await {
                Ok(()) => {}
                // Someone else retired it first; that is still success.
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(backend_err(e)),
            }
        }
        Ok(())
    }
}
