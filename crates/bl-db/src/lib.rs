//! Storage layer for the baby log.
//!
//! Persists event timeline snapshots using `rusqlite`.
//!
//! # Thread Safety
//!
//! The [`Database`] type wraps a `rusqlite::Connection`, which is `Send` but not `Sync`.
//! A `Database` can be moved into the thread that owns the tracker but not shared
//! without external synchronization.
//!
//! # Schema
//!
//! A single `snapshots` table holds one JSON payload per storage key. Writes
//! replace the whole payload (last write wins); there is no merge between
//! processes.
//!
//! Timestamps are stored as TEXT in ISO 8601 format (e.g., `2025-01-29T12:00:00.000Z`).

use std::path::Path;

use bl_core::SnapshotStorage;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use thiserror::Error;
use tracing::debug;

/// Database errors.
#[derive(Debug, Error)]
pub enum DbError {
    /// An error from the underlying database.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    /// Failed to parse a stored timestamp.
    #[error("invalid timestamp for snapshot {key}: {timestamp}")]
    TimestampParse {
        key: String,
        timestamp: String,
        #[source]
        source: chrono::ParseError,
    },
}

/// Database connection wrapper.
///
/// See the [module documentation](self) for thread safety considerations.
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Opens a database at the given path, creating it if necessary.
    ///
    /// The database schema is automatically initialized on first open.
    pub fn open(path: &Path) -> Result<Self, DbError> {
        let conn = Connection::open(path)?;
        let db = Self { conn };
        db.init()?;
        debug!(path = %path.display(), "opened snapshot database");
        Ok(db)
    }

    /// Opens an in-memory database.
    ///
    /// Useful for testing. The database is destroyed when the connection closes.
    pub fn open_in_memory() -> Result<Self, DbError> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Initializes the database schema.
    ///
    /// This is idempotent - safe to call on an already-initialized database.
    fn init(&self) -> Result<(), DbError> {
        self.conn.execute_batch(
            "
            -- One serialized timeline per key
            -- payload: JSON array of events, insertion order
            -- updated_at: ISO 8601 time of the last write
            CREATE TABLE IF NOT EXISTS snapshots (
                key TEXT PRIMARY KEY,
                payload TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            ",
        )?;
        Ok(())
    }

    /// Returns the stored payload for `key`, if any.
    pub fn load_snapshot(&self, key: &str) -> Result<Option<String>, DbError> {
        let payload = self
            .conn
            .query_row(
                "SELECT payload FROM snapshots WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(payload)
    }

    /// Replaces the payload for `key`.
    pub fn save_snapshot(&mut self, key: &str, payload: &str) -> Result<(), DbError> {
        self.save_snapshot_at(key, payload, Utc::now())
    }

    fn save_snapshot_at(
        &mut self,
        key: &str,
        payload: &str,
        now: DateTime<Utc>,
    ) -> Result<(), DbError> {
        self.conn.execute(
            "
            INSERT INTO snapshots (key, payload, updated_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(key) DO UPDATE SET
                payload = excluded.payload,
                updated_at = excluded.updated_at
            ",
            params![key, payload, format_timestamp(now)],
        )?;
        debug!(key, bytes = payload.len(), "saved snapshot");
        Ok(())
    }

    /// Deletes the payload for `key`. Returns whether a row existed.
    pub fn delete_snapshot(&mut self, key: &str) -> Result<bool, DbError> {
        let deleted = self
            .conn
            .execute("DELETE FROM snapshots WHERE key = ?1", params![key])?;
        Ok(deleted > 0)
    }

    /// When `key` was last written.
    pub fn snapshot_updated_at(&self, key: &str) -> Result<Option<DateTime<Utc>>, DbError> {
        let timestamp: Option<String> = self
            .conn
            .query_row(
                "SELECT updated_at FROM snapshots WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        timestamp
            .map(|timestamp| parse_timestamp(&timestamp, key))
            .transpose()
    }
}

impl SnapshotStorage for Database {
    type Error = DbError;

    fn read(&self, key: &str) -> Result<Option<String>, Self::Error> {
        self.load_snapshot(key)
    }

    fn write(&mut self, key: &str, payload: &str) -> Result<(), Self::Error> {
        self.save_snapshot(key, payload)
    }

    fn remove(&mut self, key: &str) -> Result<(), Self::Error> {
        self.delete_snapshot(key).map(|_| ())
    }
}

fn parse_timestamp(timestamp: &str, key: &str) -> Result<DateTime<Utc>, DbError> {
    DateTime::parse_from_rfc3339(timestamp)
        .map(|parsed| parsed.with_timezone(&Utc))
        .map_err(|source| DbError::TimestampParse {
            key: key.to_string(),
            timestamp: timestamp.to_string(),
            source,
        })
}

fn format_timestamp(timestamp: DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)
}
