use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use sqlx::postgres::{PgListener, PgNotification};
use sqlx::PgPool;
use tracing::warn;

use banners_core::{
    BannerError, Event, EventRef, EventStore, Result, SignalChannel, TIMESTAMP_FIELD, TOPIC_FIELD,
};

pub const DEFAULT_TABLE: &str = "banner_events";

/// Event store backed by one Postgres table. The `topic` and
/// `banner_timestamp` fields live in their own columns; the rest of the
/// event body is a JSONB column, reassembled on fetch.
pub struct PostgresStore {
    pool: PgPool,
    table: String,
    signals: Arc<PostgresSignals>,
}

impl PostgresStore {
    /// Connect and provision the default table. Connection or provisioning
    /// failure is fatal here, not retried.
    pub async fn connect(url: &str) -> Result<Self> {
        Self::connect_with_table(url, DEFAULT_TABLE).await
    }

    /// Connection string from `SQL_CONNECTION_STRING`.
    pub async fn connect_from_env() -> Result<Self> {
        let url = std::env::var("SQL_CONNECTION_STRING").map_err(|_| {
            BannerError::BackendUnavailable("SQL_CONNECTION_STRING is not set".to_string())
        })?;
        Self::connect(&url).await
    }

    pub async fn connect_with_table(url: &str, table: &str) -> Result<Self> {
        validate_table_name(table)?;
        let pool = PgPool::connect(url).await.map_err(unavailable)?;

        sqlx::query(&format!(
            r#"
            CREATE TABLE IF NOT EXISTS {table} (
                id               BIGSERIAL  PRIMARY KEY,
                topic            TEXT       NOT NULL,
                banner_timestamp TEXT       NOT NULL,
                body             JSONB      NOT NULL
            )
            "#
        ))
        .execute(&pool)
        .await
        .map_err(unavailable)?;

        sqlx::query(&format!(
            "CREATE INDEX IF NOT EXISTS {table}_topic_timestamp_idx \
             ON {table} (topic, banner_timestamp)"
        ))
        .execute(&pool)
        .await
        .map_err(unavailable)?;

        let listener = PgListener::connect_with(&pool).await.map_err(unavailable)?;
        Ok(Self {
            table: table.to_string(),
            signals: Arc::new(PostgresSignals {
                pool: pool.clone(),
                listener: tokio::sync::Mutex::new(listener),
            }),
            pool,
        })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// The table name is interpolated into SQL, so restrict it to identifier
/// characters.
fn validate_table_name(table: &str) -> Result<()> {
    let mut chars = table.chars();
    let head_ok = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
    if head_ok && chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Ok(());
    }
    Err(BannerError::InvalidArgument(format!(
        "table name must be a plain identifier, got {table:?}"
    )))
}

fn unavailable(e: sqlx::Error) -> BannerError {
    BannerError::BackendUnavailable(e.to_string())
}

#[async_trait]
impl EventStore for PostgresStore {
    async fn append(&self, topic: &str, event: &Event) -> Result<EventRef> {
        let timestamp = event
            .timestamp()
            .ok_or_else(|| {
                BannerError::InvalidArgument("event is missing banner_timestamp".to_string())
            })?
            .to_string();

        // Column split: the mandatory fields get columns, the rest is body.
        let mut body = event.clone();
        body.remove(TOPIC_FIELD);
        body.remove(TIMESTAMP_FIELD);

        let row = sqlx::query_as::<_, (i64,)>(&format!(
            "INSERT INTO {} (topic, banner_timestamp, body) VALUES ($1, $2, $3) RETURNING id",
            self.table
        ))
        .bind(topic)
        .bind(&timestamp)
        .bind(body.into_value())
        .fetch_one(&self.pool)
        .await
        .map_err(unavailable)?;

        Ok(EventRef {
            timestamp,
            id: Some(row.0),
        })
    }

    async fn list_ordered(&self, topic: &str) -> Result<Vec<EventRef>> {
        let rows = sqlx::query_as::<_, (i64, String)>(&format!(
            "SELECT id, banner_timestamp FROM {} \
             WHERE topic = $1 ORDER BY banner_timestamp ASC, id ASC",
            self.table
        ))
        .bind(topic)
        .fetch_all(&self.pool)
        .await
        .map_err(unavailable)?;

        Ok(rows
            .into_iter()
            .map(|(id, timestamp)| EventRef {
                timestamp,
                id: Some(id),
            })
            .collect())
    }

    async fn fetch(&self, topic: &str, event_ref: &EventRef) -> Result<Event> {
        let row: Option<(String, String, Value)> = match event_ref.id {
            Some(id) => {
                sqlx::query_as(&format!(
                    "SELECT topic, banner_timestamp, body FROM {} WHERE id = $1",
                    self.table
                ))
                .bind(id)
                .fetch_optional(&self.pool)
                .await
            }
            None => {
                sqlx::query_as(&format!(
                    "SELECT topic, banner_timestamp, body FROM {} \
                     WHERE topic = $1 AND banner_timestamp = $2 LIMIT 1",
                    self.table
                ))
                .bind(topic)
                .bind(&event_ref.timestamp)
                .fetch_optional(&self.pool)
                .await
            }
        }
        .map_err(unavailable)?;

        let (topic, timestamp, body) =
            row.ok_or_else(|| BannerError::NotFound(format!("{topic}/{event_ref}")))?;

        let mut event = Event::from_value(body)?;
        event.insert(TOPIC_FIELD, topic);
        event.insert(TIMESTAMP_FIELD, timestamp);
        Ok(event)
    }

    async fn delete(&self, topic: &str, refs: &[EventRef]) -> Result<()> {
        let ids: Vec<i64> = refs.iter().filter_map(|r| r.id).collect();
        if !ids.is_empty() {
            sqlx::query(&format!("DELETE FROM {} WHERE id = ANY($1)", self.table))
                .bind(&ids)
                .execute(&self.pool)
                .await
                .map_err(unavailable)?;
        }

        let stamps: Vec<String> = refs
            .iter()
            .filter(|r| r.id.is_none() && !r.timestamp.is_empty())
            .map(|r| r.timestamp.clone())
            .collect();
        if !stamps.is_empty() {
            sqlx::query(&format!(
                "DELETE FROM {} WHERE topic = $1 AND banner_timestamp = ANY($2)",
                self.table
            ))
            .bind(topic)
            .bind(&stamps)
            .execute(&self.pool)
            .await
            .map_err(unavailable)?;
        }
        Ok(())
    }

    fn signals(&self) -> Option<Arc<dyn SignalChannel>> {
        Some(self.signals.clone())
    }
}

/// LISTEN/NOTIFY plumbing. The listener connection is shared by
/// `await_signal` and the listen/unlisten management calls; the mutex
/// serializes them, so a listen issued mid-wait lands within one cycle.
struct PostgresSignals {
    pool: PgPool,
    listener: tokio::sync::Mutex<PgListener>,
}

fn push_notification(out: &mut Vec<(String, EventRef)>, notification: PgNotification) {
    match notification.payload().parse::<i64>() {
        Ok(id) => out.push((notification.channel().to_string(), EventRef::from_id(id))),
        Err(_) => warn!(
            channel = %notification.channel(),
            payload = %notification.payload(),
            "ignoring notification with a non-numeric payload"
        ),
    }
}

#[async_trait]
impl SignalChannel for PostgresSignals {
    async fn listen(&self, topic: &str) -> Result<()> {
        self.listener
            .lock()
            .await
            .listen(topic)
            .await
            .map_err(unavailable)
    }

    async fn unlisten(&self, topic: &str) -> Result<()> {
        self.listener
            .lock()
            .await
            .unlisten(topic)
            .await
            .map_err(unavailable)
    }

    async fn signal(&self, topic: &str, event_ref: &EventRef) -> Result<()> {
        let id = event_ref.id.ok_or_else(|| {
            BannerError::InvalidArgument("cannot signal a ref without a row id".to_string())
        })?;
        sqlx::query("SELECT pg_notify($1, $2)")
            .bind(topic)
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(unavailable)?;
        Ok(())
    }

    async fn await_signal(&self, timeout: Duration) -> Result<Vec<(String, EventRef)>> {
        let mut listener = self.listener.lock().await;
        let mut out = Vec::new();

        match tokio::time::timeout(timeout, listener.recv()).await {
            Err(_elapsed) => return Ok(out),
            Ok(Ok(notification)) => push_notification(&mut out, notification),
            Ok(Err(e)) => return Err(unavailable(e)),
        }

        // Drain whatever else is already buffered before reporting.
        while let Ok(Some(notification)) = listener.try_recv().await {
            push_notification(&mut out, notification);
        }
        Ok(out)
    }
}
