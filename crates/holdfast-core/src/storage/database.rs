//! SQLite key-value store for client-local state.
//!
//! Captured photos are mirrored here as data URLs under
//! `camera_photo_<epoch_ms>`, independent of whether their upload succeeds.

use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};

use super::data_dir;
use crate::capture::FrameCache;
use crate::error::{CoreError, DatabaseError};

/// Key prefix for photos mirrored by capture sessions.
pub const PHOTO_PREFIX: &str = "camera_photo_";

/// A cached capture as listed from the kv store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedPhoto {
    pub key: String,
    pub captured_at_ms: Option<u64>,
    /// Length of the stored data URL.
    pub data_url_len: usize,
}

/// SQLite database for client-local state.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Open the database at `~/.config/holdfast/holdfast.db`.
    ///
    /// Creates the database file and schema if they don't exist.
    pub fn open() -> Result<Self, CoreError> {
        let path = data_dir()?.join("holdfast.db");
        Ok(Self::open_at(&path)?)
    }

    pub fn open_at(path: &Path) -> Result<Self, DatabaseError> {
        let conn = Connection::open(path).map_err(|source| DatabaseError::OpenFailed {
            path: path.to_path_buf(),
            source,
        })?;
        let db = Self {
            conn: Mutex::new(conn),
        };
        db.migrate()?;
        Ok(db)
    }

    /// Open an in-memory database (for tests).
    pub fn open_memory() -> Result<Self, DatabaseError> {
        let conn = Connection::open_in_memory()?;
        let db = Self {
            conn: Mutex::new(conn),
        };
        db.migrate()?;
        Ok(db)
    }

    fn migrate(&self) -> Result<(), DatabaseError> {
        self.conn().execute_batch(
            "CREATE TABLE IF NOT EXISTS kv (
                key   TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );",
        )?;
        Ok(())
    }

    /// Get a value from the kv store.
    pub fn kv_get(&self, key: &str) -> Result<Option<String>, DatabaseError> {
        let conn = self.conn();
        let mut stmt = conn.prepare("SELECT value FROM kv WHERE key = ?1")?;
        let result = stmt.query_row(params![key], |row| row.get::<_, String>(0));
        match result {
            Ok(v) => Ok(Some(v)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Set a value in the kv store.
    pub fn kv_set(&self, key: &str, value: &str) -> Result<(), DatabaseError> {
        self.conn().execute(
            "INSERT OR REPLACE INTO kv (key, value) VALUES (?1, ?2)",
            params![key, value],
        )?;
        Ok(())
    }

    pub fn kv_delete(&self, key: &str) -> Result<bool, DatabaseError> {
        let n = self
            .conn()
            .execute("DELETE FROM kv WHERE key = ?1", params![key])?;
        Ok(n > 0)
    }

    /// Keys starting with `prefix`, in key order.
    pub fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, DatabaseError> {
        let conn = self.conn();
        let mut stmt = conn.prepare("SELECT key FROM kv WHERE substr(key, 1, ?2) = ?1 ORDER BY key")?;
        let rows = stmt.query_map(params![prefix, prefix.chars().count() as i64], |row| {
            row.get::<_, String>(0)
        })?;
        let keys = rows.collect::<Result<Vec<_>, _>>()?;
        Ok(keys)
    }

    /// Cached captures, oldest first.
    pub fn photos(&self) -> Result<Vec<CachedPhoto>, DatabaseError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT key, length(value) FROM kv WHERE substr(key, 1, ?2) = ?1",
        )?;
        let rows = stmt.query_map(
            params![PHOTO_PREFIX, PHOTO_PREFIX.len() as i64],
            |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)),
        )?;

        let mut photos = Vec::new();
        for row in rows {
            let (key, len) = row?;
            photos.push(CachedPhoto {
                captured_at_ms: key.strip_prefix(PHOTO_PREFIX).and_then(|s| s.parse().ok()),
                data_url_len: usize::try_from(len).unwrap_or_default(),
                key,
            });
        }
        photos.sort_by_key(|p| (p.captured_at_ms, p.key.clone()));
        Ok(photos)
    }
}

impl FrameCache for Database {
    fn put(&self, key: &str, data_url: &str) -> Result<(), CoreError> {
        Ok(self.kv_set(key, data_url)?)
    }
}
