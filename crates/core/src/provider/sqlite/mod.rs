//! SQLite-backed key-value provider.
//!
//! Opens the database with WAL pragmas, runs migrations, and stores each
//! value as a blob keyed by the cache key. Non-zero TTL hints are recorded
//! as an `expires_at` timestamp; expired rows read as absent.

pub mod migrations;

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{SecondsFormat, Utc};
use tokio_rusqlite::rusqlite::OptionalExtension;
use tokio_rusqlite::{Connection, params};

use super::StorageProvider;
use crate::StorageError;

const PRAGMAS: &str = "PRAGMA journal_mode=WAL;
     PRAGMA synchronous=NORMAL;
     PRAGMA temp_store=MEMORY;
     PRAGMA foreign_keys=ON;";

/// Persistent provider handle.
///
/// Wraps a tokio-rusqlite Connection that runs database operations
/// on a background thread. Clones share the connection.
#[derive(Clone, Debug)]
pub struct SqliteProvider {
    pub(crate) conn: Connection,
}

impl SqliteProvider {
    /// Open a database at the specified path.
    ///
    /// Creates the file if it doesn't exist, applies pragmas, and runs any
    /// pending migrations.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let conn = Connection::open(path)
            .await
            .map_err(|e| StorageError::Unavailable(e.to_string()))?;
        Self::init(conn).await
    }

    /// Open an in-memory database for testing.
    pub async fn open_in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()
            .await
            .map_err(|e| StorageError::Unavailable(e.to_string()))?;
        Self::init(conn).await
    }

    async fn init(conn: Connection) -> Result<Self, StorageError> {
        conn.call(|conn| conn.execute_batch(PRAGMAS))
            .await
            .map_err(StorageError::from)?;

        migrations::run(&conn).await?;

        tracing::debug!("sqlite provider ready");

        Ok(Self { conn })
    }
}

fn timestamp(at: chrono::DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[async_trait]
impl StorageProvider for SqliteProvider {
    async fn get(&self, key: &str) -> Result<Option<Bytes>, StorageError> {
        let key = key.to_string();
        let now = timestamp(Utc::now());
        let value = self
            .conn
            .call(move |conn| -> Result<Option<Vec<u8>>, StorageError> {
                let value = conn
                    .query_row(
                        "SELECT value FROM entries
                         WHERE key = ?1 AND (expires_at IS NULL OR expires_at > ?2)",
                        params![key, now],
                        |row| row.get::<_, Vec<u8>>(0),
                    )
                    .optional()?;
                Ok(value)
            })
            .await
            .map_err(StorageError::from)?;

        Ok(value.filter(|v| !v.is_empty()).map(Bytes::from))
    }

    async fn set(&self, key: &str, value: Bytes, ttl_hint: Duration) -> Result<(), StorageError> {
        let key = key.to_string();
        let now = Utc::now();
        let expires_at = if ttl_hint.is_zero() {
            None
        } else {
            let ttl = chrono::Duration::from_std(ttl_hint).map_err(|e| StorageError::Backend(e.to_string()))?;
            Some(timestamp(now + ttl))
        };
        let stored_at = timestamp(now);

        tracing::debug!(key = %key, bytes = value.len(), "sqlite provider set");

        self.conn
            .call(move |conn| -> Result<(), StorageError> {
                conn.execute(
                    "INSERT INTO entries (key, value, stored_at, expires_at) VALUES (?1, ?2, ?3, ?4)
                     ON CONFLICT(key) DO UPDATE SET
                        value = excluded.value,
                        stored_at = excluded.stored_at,
                        expires_at = excluded.expires_at",
                    params![key, value.as_ref(), stored_at, expires_at],
                )?;
                Ok(())
            })
            .await
            .map_err(StorageError::from)
    }
}
