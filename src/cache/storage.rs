//! Cache storage trait and SQLite implementation.

use chrono::{DateTime, Utc};
use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Mutex;
use url::Url;

use super::traits::RequestKey;
use crate::net::Response;
use crate::worker::{PendingWrite, QueuedWrite, SyncStorage, WorkerState};

/// A single cached response.
#[derive(Debug, Clone)]
pub struct CachedEntry {
  /// The captured response
  pub response: Response,
  /// When the response was cached
  pub cached_at: DateTime<Utc>,
}

/// Trait for cache storage backends.
///
/// A backend holds any number of named stores. Writes into a store that does
/// not exist yet create it.
pub trait CacheStorage: Send + Sync {
  /// Names of all existing stores, oldest first.
  fn store_names(&self) -> Result<Vec<String>>;

  /// Create a store if it is missing.
  fn open_store(&self, name: &str) -> Result<()>;

  /// Delete a store and everything in it. Returns false if it did not exist.
  fn delete_store(&self, name: &str) -> Result<bool>;

  /// Look up a cached response.
  fn get_entry(&self, store: &str, key: &RequestKey) -> Result<Option<CachedEntry>>;

  /// Store a response, replacing any previous one under the same key.
  fn put_entry(&self, store: &str, key: &RequestKey, response: &Response) -> Result<()>;

  /// Store several responses atomically: either all are written or none.
  fn put_all(&self, store: &str, entries: &[(RequestKey, Response)]) -> Result<()>;

  /// Persisted lifecycle state for a version.
  fn load_state(&self, version: &str) -> Result<Option<WorkerState>>;

  fn save_state(&self, version: &str, state: WorkerState) -> Result<()>;

  /// The version most recently persisted as active, if any.
  fn active_version(&self) -> Result<Option<String>>;
}

/// SQLite-based storage for the cache stores, the worker state and the
/// deferred-sync outbox.
pub struct SqliteStorage {
  conn: Mutex<Connection>,
}

impl SqliteStorage {
  /// Open (or create) the database at `path`.
  pub fn open(path: &Path) -> Result<Self> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create cache directory: {}", e))?;
    }

    let conn = Connection::open(path)
      .map_err(|e| eyre!("Failed to open cache database at {}: {}", path.display(), e))?;

    Self::with_connection(conn)
  }

  /// Open a private in-memory database.
  pub fn open_in_memory() -> Result<Self> {
    let conn = Connection::open_in_memory()
      .map_err(|e| eyre!("Failed to open in-memory cache database: {}", e))?;

    Self::with_connection(conn)
  }

  fn with_connection(conn: Connection) -> Result<Self> {
    let storage = Self {
      conn: Mutex::new(conn),
    };
    storage.run_migrations()?;

    Ok(storage)
  }

  fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
    self.conn.lock().map_err(|e| eyre!("Lock poisoned: {}", e))
  }

  /// Run database migrations for cache tables.
  fn run_migrations(&self) -> Result<()> {
    let conn = self.lock()?;

    conn
      .execute_batch(CACHE_SCHEMA)
      .map_err(|e| eyre!("Failed to run cache migrations: {}", e))?;

    Ok(())
  }
}

/// Schema for cache tables.
const CACHE_SCHEMA: &str = r#"
-- One row per versioned cache store
CREATE TABLE IF NOT EXISTS cache_stores (
    name TEXT PRIMARY KEY,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Captured responses, keyed by sha256("METHOD URL")
CREATE TABLE IF NOT EXISTS cache_entries (
    store_name TEXT NOT NULL,
    key_hash TEXT NOT NULL,
    method TEXT NOT NULL,
    url TEXT NOT NULL,
    status INTEGER NOT NULL,
    headers TEXT NOT NULL,
    body BLOB NOT NULL,
    response_url TEXT NOT NULL,
    cached_at TEXT NOT NULL DEFAULT (datetime('now')),
    PRIMARY KEY (store_name, key_hash)
);

-- Lifecycle state per cache version
CREATE TABLE IF NOT EXISTS worker_state (
    version TEXT PRIMARY KEY,
    state TEXT NOT NULL,
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Registered background-sync tags
CREATE TABLE IF NOT EXISTS sync_tags (
    tag TEXT PRIMARY KEY,
    registered_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Writes waiting for connectivity (FIFO by id)
CREATE TABLE IF NOT EXISTS sync_queue (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    tag TEXT NOT NULL,
    method TEXT NOT NULL,
    path TEXT NOT NULL,
    body TEXT,
    attempts INTEGER NOT NULL DEFAULT 0,
    last_error TEXT,
    queued_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE INDEX IF NOT EXISTS idx_sync_queue_tag
    ON sync_queue(tag, id);
"#;

const INSERT_ENTRY: &str =
  "INSERT OR REPLACE INTO cache_entries (store_name, key_hash, method, url, status, headers, body, response_url, cached_at)
   VALUES (?, ?, ?, ?, ?, ?, ?, ?, datetime('now'))";

fn insert_entry(
  conn: &Connection,
  store: &str,
  key: &RequestKey,
  response: &Response,
) -> Result<()> {
  let headers = serde_json::to_string(&response.headers)
    .map_err(|e| eyre!("Failed to serialize headers: {}", e))?;

  conn
    .execute(
      "INSERT OR IGNORE INTO cache_stores (name) VALUES (?)",
      params![store],
    )
    .map_err(|e| eyre!("Failed to open cache store {}: {}", store, e))?;

  conn
    .execute(
      INSERT_ENTRY,
      params![
        store,
        key.cache_hash(),
        key.method(),
        key.url(),
        response.status,
        headers,
        response.body,
        response.url.as_str()
      ],
    )
    .map_err(|e| eyre!("Failed to store {}: {}", key, e))?;

  Ok(())
}

impl CacheStorage for SqliteStorage {
  fn store_names(&self) -> Result<Vec<String>> {
    let conn = self.lock()?;

    let mut stmt = conn
      .prepare("SELECT name FROM cache_stores ORDER BY created_at, name")
      .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

    let names = stmt
      .query_map([], |row| row.get(0))
      .map_err(|e| eyre!("Failed to list cache stores: {}", e))?
      .collect::<rusqlite::Result<Vec<String>>>()
      .map_err(|e| eyre!("Failed to read cache store name: {}", e))?;

    Ok(names)
  }

  fn open_store(&self, name: &str) -> Result<()> {
    let conn = self.lock()?;

    conn
      .execute(
        "INSERT OR IGNORE INTO cache_stores (name) VALUES (?)",
        params![name],
      )
      .map_err(|e| eyre!("Failed to open cache store {}: {}", name, e))?;

    Ok(())
  }

  fn delete_store(&self, name: &str) -> Result<bool> {
    let mut conn = self.lock()?;
    let tx = conn
      .transaction()
      .map_err(|e| eyre!("Failed to begin transaction: {}", e))?;

    tx.execute(
      "DELETE FROM cache_entries WHERE store_name = ?",
      params![name],
    )
    .map_err(|e| eyre!("Failed to delete entries of {}: {}", name, e))?;
    tx.execute("DELETE FROM worker_state WHERE version = ?", params![name])
      .map_err(|e| eyre!("Failed to delete state of {}: {}", name, e))?;
    let removed = tx
      .execute("DELETE FROM cache_stores WHERE name = ?", params![name])
      .map_err(|e| eyre!("Failed to delete cache store {}: {}", name, e))?;

    tx.commit()
      .map_err(|e| eyre!("Failed to commit transaction: {}", e))?;

    Ok(removed > 0)
  }

  fn get_entry(&self, store: &str, key: &RequestKey) -> Result<Option<CachedEntry>> {
    let conn = self.lock()?;

    let mut stmt = conn
      .prepare(
        "SELECT status, headers, body, response_url, cached_at FROM cache_entries
         WHERE store_name = ? AND key_hash = ?",
      )
      .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

    let row: Option<(u16, String, Vec<u8>, String, String)> = stmt
      .query_row(params![store, key.cache_hash()], |row| {
        Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?))
      })
      .optional()
      .map_err(|e| eyre!("Failed to look up {}: {}", key, e))?;

    let Some((status, headers, body, response_url, cached_at)) = row else {
      return Ok(None);
    };

    let headers: Vec<(String, String)> = serde_json::from_str(&headers)
      .map_err(|e| eyre!("Failed to deserialize headers of {}: {}", key, e))?;
    let url = Url::parse(&response_url)
      .map_err(|e| eyre!("Invalid cached URL '{}': {}", response_url, e))?;

    Ok(Some(CachedEntry {
      response: Response {
        status,
        headers,
        body,
        url,
      },
      cached_at: parse_datetime(&cached_at)?,
    }))
  }

  fn put_entry(&self, store: &str, key: &RequestKey, response: &Response) -> Result<()> {
    let conn = self.lock()?;
    insert_entry(&conn, store, key, response)
  }

  fn put_all(&self, store: &str, entries: &[(RequestKey, Response)]) -> Result<()> {
    let mut conn = self.lock()?;
    let tx = conn
      .transaction()
      .map_err(|e| eyre!("Failed to begin transaction: {}", e))?;

    tx.execute(
      "INSERT OR IGNORE INTO cache_stores (name) VALUES (?)",
      params![store],
    )
    .map_err(|e| eyre!("Failed to open cache store {}: {}", store, e))?;

    for (key, response) in entries {
      insert_entry(&tx, store, key, response)?;
    }

    tx.commit()
      .map_err(|e| eyre!("Failed to commit transaction: {}", e))?;

    Ok(())
  }

  fn load_state(&self, version: &str) -> Result<Option<WorkerState>> {
    let conn = self.lock()?;

    let state: Option<String> = conn
      .query_row(
        "SELECT state FROM worker_state WHERE version = ?",
        params![version],
        |row| row.get(0),
      )
      .optional()
      .map_err(|e| eyre!("Failed to load worker state: {}", e))?;

    state.map(|s| s.parse()).transpose()
  }

  fn save_state(&self, version: &str, state: WorkerState) -> Result<()> {
    let conn = self.lock()?;

    conn
      .execute(
        "INSERT OR REPLACE INTO worker_state (version, state, updated_at)
         VALUES (?, ?, datetime('now'))",
        params![version, state.as_str()],
      )
      .map_err(|e| eyre!("Failed to save worker state: {}", e))?;

    Ok(())
  }

  fn active_version(&self) -> Result<Option<String>> {
    let conn = self.lock()?;

    conn
      .query_row(
        "SELECT version FROM worker_state WHERE state = ?
         ORDER BY updated_at DESC, rowid DESC LIMIT 1",
        params![WorkerState::Active.as_str()],
        |row| row.get(0),
      )
      .optional()
      .map_err(|e| eyre!("Failed to load active version: {}", e))
  }
}

impl SyncStorage for SqliteStorage {
  fn register_tag(&self, tag: &str) -> Result<()> {
    let conn = self.lock()?;

    conn
      .execute(
        "INSERT OR IGNORE INTO sync_tags (tag) VALUES (?)",
        params![tag],
      )
      .map_err(|e| eyre!("Failed to register sync tag {}: {}", tag, e))?;

    Ok(())
  }

  fn registered_tags(&self) -> Result<Vec<String>> {
    let conn = self.lock()?;

    let mut stmt = conn
      .prepare("SELECT tag FROM sync_tags ORDER BY registered_at, tag")
      .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

    let tags = stmt
      .query_map([], |row| row.get(0))
      .map_err(|e| eyre!("Failed to list sync tags: {}", e))?
      .collect::<rusqlite::Result<Vec<String>>>()
      .map_err(|e| eyre!("Failed to read sync tag: {}", e))?;

    Ok(tags)
  }

  fn take_tag(&self, tag: &str) -> Result<bool> {
    let conn = self.lock()?;

    let removed = conn
      .execute("DELETE FROM sync_tags WHERE tag = ?", params![tag])
      .map_err(|e| eyre!("Failed to consume sync tag {}: {}", tag, e))?;

    Ok(removed > 0)
  }

  fn enqueue_write(&self, tag: &str, write: &PendingWrite) -> Result<i64> {
    let conn = self.lock()?;
    let body = write
      .body
      .as_ref()
      .map(serde_json::to_string)
      .transpose()
      .map_err(|e| eyre!("Failed to serialize queued body: {}", e))?;

    conn
      .execute(
        "INSERT INTO sync_queue (tag, method, path, body) VALUES (?, ?, ?, ?)",
        params![tag, write.method.as_str(), write.path, body],
      )
      .map_err(|e| eyre!("Failed to queue write: {}", e))?;

    Ok(conn.last_insert_rowid())
  }

  fn queued_writes(&self, tag: &str) -> Result<Vec<QueuedWrite>> {
    let conn = self.lock()?;

    let mut stmt = conn
      .prepare(
        "SELECT id, method, path, body, attempts, last_error, queued_at FROM sync_queue
         WHERE tag = ? ORDER BY id",
      )
      .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

    type Row = (i64, String, String, Option<String>, u32, Option<String>, String);
    let rows = stmt
      .query_map(params![tag], |row| {
        Ok((
          row.get(0)?,
          row.get(1)?,
          row.get(2)?,
          row.get(3)?,
          row.get(4)?,
          row.get(5)?,
          row.get(6)?,
        ))
      })
      .map_err(|e| eyre!("Failed to query sync queue: {}", e))?
      .collect::<rusqlite::Result<Vec<Row>>>()
      .map_err(|e| eyre!("Failed to read sync queue: {}", e))?;

    rows
      .into_iter()
      .map(|(id, method, path, body, attempts, last_error, queued_at)| {
        let body = body
          .map(|b| serde_json::from_str(&b))
          .transpose()
          .map_err(|e| eyre!("Failed to deserialize queued body {}: {}", id, e))?;
        Ok(QueuedWrite {
          id,
          tag: tag.to_string(),
          write: PendingWrite {
            method: method.parse()?,
            path,
            body,
          },
          attempts,
          last_error,
          queued_at: parse_datetime(&queued_at)?,
        })
      })
      .collect()
  }

  fn remove_write(&self, id: i64) -> Result<()> {
    let conn = self.lock()?;

    conn
      .execute("DELETE FROM sync_queue WHERE id = ?", params![id])
      .map_err(|e| eyre!("Failed to remove queued write {}: {}", id, e))?;

    Ok(())
  }

  fn record_failure(&self, id: i64, attempts: u32, error: &str) -> Result<()> {
    let conn = self.lock()?;

    conn
      .execute(
        "UPDATE sync_queue SET attempts = attempts + ?, last_error = ? WHERE id = ?",
        params![attempts, error, id],
      )
      .map_err(|e| eyre!("Failed to update queued write {}: {}", id, e))?;

    Ok(())
  }
}

/// Parse a datetime string from SQLite format.
fn parse_datetime(s: &str) -> Result<DateTime<Utc>> {
  // SQLite stores as "YYYY-MM-DD HH:MM:SS"
  chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
    .map(|dt| dt.and_utc())
    .map_err(|e| eyre!("Failed to parse datetime '{}': {}", s, e))
}
