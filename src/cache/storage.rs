//! SQLite-backed cache storage.

use chrono::{DateTime, Utc};
use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use super::traits::{ensure_storable, CacheStorage, EntrySummary, QueuedSubmission, SyncQueue};
use crate::http::{Request, Response, ResponseType};

/// SQLite-based cache storage implementation.
pub struct SqliteStorage {
  conn: Mutex<Connection>,
}

impl SqliteStorage {
  /// Open the storage at the default location.
  pub fn open() -> Result<Self> {
    Self::open_at(&Self::default_path()?)
  }

  /// Open (or create) the storage at an explicit path.
  pub fn open_at(path: &Path) -> Result<Self> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create cache directory: {}", e))?;
    }

    let conn = Connection::open(path)
      .map_err(|e| eyre!("Failed to open cache database at {}: {}", path.display(), e))?;

    let storage = Self {
      conn: Mutex::new(conn),
    };
    storage.run_migrations()?;

    Ok(storage)
  }

  /// Get the default database path.
  pub fn default_path() -> Result<PathBuf> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| eyre!("Could not determine data directory"))?;

    Ok(data_dir.join("portfolio-sw").join("cache.db"))
  }

  /// Run database migrations for cache tables.
  fn run_migrations(&self) -> Result<()> {
    self
      .conn()?
      .execute_batch(CACHE_SCHEMA)
      .map_err(|e| eyre!("Failed to run cache migrations: {}", e))?;

    Ok(())
  }

  fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
    self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))
  }
}

/// Schema for cache tables.
const CACHE_SCHEMA: &str = r#"
-- Named caches, id preserves creation order
CREATE TABLE IF NOT EXISTS caches (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Response snapshots keyed by request identity
CREATE TABLE IF NOT EXISTS cache_entries (
    cache_name TEXT NOT NULL,
    entry_key TEXT NOT NULL,
    method TEXT NOT NULL,
    url TEXT NOT NULL,
    status INTEGER NOT NULL,
    status_text TEXT NOT NULL,
    headers TEXT NOT NULL,
    body BLOB NOT NULL,
    response_type TEXT NOT NULL,
    cached_at TEXT NOT NULL DEFAULT (datetime('now')),
    PRIMARY KEY (cache_name, entry_key)
);

CREATE INDEX IF NOT EXISTS idx_cache_entries_key ON cache_entries(entry_key);

-- Payloads waiting for background sync
CREATE TABLE IF NOT EXISTS sync_queue (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    tag TEXT NOT NULL,
    payload TEXT NOT NULL,
    queued_at TEXT NOT NULL DEFAULT (datetime('now'))
);
"#;

/// Columns needed to rebuild a `Response`, in this order.
const RESPONSE_COLUMNS: &str = "e.status, e.status_text, e.headers, e.body, e.response_type";

type ResponseRow = (u16, String, String, Vec<u8>, String);

fn read_response_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ResponseRow> {
  Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?))
}

fn into_response((status, status_text, headers, body, kind): ResponseRow) -> Result<Response> {
  let headers: Vec<(String, String)> =
    serde_json::from_str(&headers).map_err(|e| eyre!("Failed to decode headers: {}", e))?;

  Ok(Response {
    status,
    status_text,
    headers,
    body,
    kind: ResponseType::parse(&kind)?,
  })
}

fn insert_entry(
  conn: &Connection,
  cache_name: &str,
  request: &Request,
  response: &Response,
) -> Result<()> {
  ensure_storable(request)?;
  let headers = serde_json::to_string(&response.headers)
    .map_err(|e| eyre!("Failed to encode headers: {}", e))?;

  conn
    .execute(
      "INSERT OR IGNORE INTO caches (name) VALUES (?)",
      params![cache_name],
    )
    .map_err(|e| eyre!("Failed to open cache {}: {}", cache_name, e))?;

  conn
    .execute(
      "INSERT OR REPLACE INTO cache_entries
         (cache_name, entry_key, method, url, status, status_text, headers, body, response_type, cached_at)
       VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, datetime('now'))",
      params![
        cache_name,
        request.cache_key(),
        request.method.as_str(),
        request.cache_url().as_str(),
        response.status,
        response.status_text,
        headers,
        response.body,
        response.kind.as_str(),
      ],
    )
    .map_err(|e| eyre!("Failed to store {} in {}: {}", request.url, cache_name, e))?;

  Ok(())
}

impl CacheStorage for SqliteStorage {
  #[cfg(test)]
  fn open(&self, cache_name: &str) -> Result<()> {
    self
      .conn()?
      .execute(
        "INSERT OR IGNORE INTO caches (name) VALUES (?)",
        params![cache_name],
      )
      .map_err(|e| eyre!("Failed to open cache {}: {}", cache_name, e))?;
    Ok(())
  }

  fn has(&self, cache_name: &str) -> Result<bool> {
    let found: Option<i64> = self
      .conn()?
      .query_row(
        "SELECT id FROM caches WHERE name = ?",
        params![cache_name],
        |row| row.get(0),
      )
      .optional()
      .map_err(|e| eyre!("Failed to look up cache {}: {}", cache_name, e))?;
    Ok(found.is_some())
  }

  fn keys(&self) -> Result<Vec<String>> {
    let conn = self.conn()?;
    let mut stmt = conn
      .prepare("SELECT name FROM caches ORDER BY id")
      .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

    let names = stmt
      .query_map([], |row| row.get(0))
      .map_err(|e| eyre!("Failed to list caches: {}", e))?
      .collect::<rusqlite::Result<Vec<String>>>()
      .map_err(|e| eyre!("Failed to read cache name: {}", e))?;

    Ok(names)
  }

  fn delete(&self, cache_name: &str) -> Result<bool> {
    let mut conn = self.conn()?;
    let tx = conn
      .transaction()
      .map_err(|e| eyre!("Failed to begin transaction: {}", e))?;

    tx.execute(
      "DELETE FROM cache_entries WHERE cache_name = ?",
      params![cache_name],
    )
    .map_err(|e| eyre!("Failed to delete entries of {}: {}", cache_name, e))?;

    let removed = tx
      .execute("DELETE FROM caches WHERE name = ?", params![cache_name])
      .map_err(|e| eyre!("Failed to delete cache {}: {}", cache_name, e))?;

    tx.commit()
      .map_err(|e| eyre!("Failed to commit transaction: {}", e))?;

    Ok(removed > 0)
  }

  fn put(&self, cache_name: &str, request: &Request, response: &Response) -> Result<()> {
    let conn = self.conn()?;
    insert_entry(&conn, cache_name, request, response)
  }

  fn put_all(&self, cache_name: &str, entries: &[(Request, Response)]) -> Result<()> {
    let mut conn = self.conn()?;
    let tx = conn
      .transaction()
      .map_err(|e| eyre!("Failed to begin transaction: {}", e))?;

    tx.execute(
      "INSERT OR IGNORE INTO caches (name) VALUES (?)",
      params![cache_name],
    )
    .map_err(|e| eyre!("Failed to open cache {}: {}", cache_name, e))?;

    // Dropping the transaction on error rolls every insert back
    for (request, response) in entries {
      insert_entry(&tx, cache_name, request, response)?;
    }

    tx.commit()
      .map_err(|e| eyre!("Failed to commit transaction: {}", e))?;

    Ok(())
  }

  fn match_in(&self, cache_name: &str, request: &Request) -> Result<Option<Response>> {
    if ensure_storable(request).is_err() {
      return Ok(None);
    }

    let conn = self.conn()?;
    let row = conn
      .query_row(
        &format!(
          "SELECT {} FROM cache_entries e WHERE e.cache_name = ? AND e.entry_key = ?",
          RESPONSE_COLUMNS
        ),
        params![cache_name, request.cache_key()],
        read_response_row,
      )
      .optional()
      .map_err(|e| eyre!("Failed to look up {} in {}: {}", request.url, cache_name, e))?;

    row.map(into_response).transpose()
  }

  fn match_any(&self, request: &Request) -> Result<Option<Response>> {
    if ensure_storable(request).is_err() {
      return Ok(None);
    }

    let conn = self.conn()?;
    let row = conn
      .query_row(
        &format!(
          "SELECT {} FROM cache_entries e
           INNER JOIN caches c ON c.name = e.cache_name
           WHERE e.entry_key = ?
           ORDER BY c.id
           LIMIT 1",
          RESPONSE_COLUMNS
        ),
        params![request.cache_key()],
        read_response_row,
      )
      .optional()
      .map_err(|e| eyre!("Failed to look up {}: {}", request.url, e))?;

    row.map(into_response).transpose()
  }

  fn entries(&self, cache_name: &str) -> Result<Vec<EntrySummary>> {
    let conn = self.conn()?;
    let mut stmt = conn
      .prepare(
        "SELECT method, url, status, length(body), cached_at FROM cache_entries
         WHERE cache_name = ?
         ORDER BY url",
      )
      .map_err(|e| eyre!("Failed to prepare entry query: {}", e))?;

    let rows: Vec<(String, String, u16, usize, String)> = stmt
      .query_map(params![cache_name], |row| {
        Ok((
          row.get(0)?,
          row.get(1)?,
          row.get(2)?,
          row.get(3)?,
          row.get(4)?,
        ))
      })
      .map_err(|e| eyre!("Failed to query entries: {}", e))?
      .collect::<rusqlite::Result<_>>()
      .map_err(|e| eyre!("Failed to read entry: {}", e))?;

    rows
      .into_iter()
      .map(|(method, url, status, size, cached_at)| {
        Ok(EntrySummary {
          method,
          url,
          status,
          size,
          cached_at: parse_datetime(&cached_at)?,
        })
      })
      .collect()
  }
}

impl SyncQueue for SqliteStorage {
  fn enqueue(&self, tag: &str, payload: &serde_json::Value) -> Result<i64> {
    let conn = self.conn()?;
    let payload =
      serde_json::to_string(payload).map_err(|e| eyre!("Failed to encode payload: {}", e))?;

    conn
      .execute(
        "INSERT INTO sync_queue (tag, payload, queued_at) VALUES (?, ?, datetime('now'))",
        params![tag, payload],
      )
      .map_err(|e| eyre!("Failed to queue submission: {}", e))?;

    Ok(conn.last_insert_rowid())
  }

  fn pending(&self, tag: &str) -> Result<Vec<QueuedSubmission>> {
    let conn = self.conn()?;
    let mut stmt = conn
      .prepare("SELECT id, payload, queued_at FROM sync_queue WHERE tag = ? ORDER BY id")
      .map_err(|e| eyre!("Failed to prepare queue query: {}", e))?;

    let rows: Vec<(i64, String, String)> = stmt
      .query_map(params![tag], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))
      .map_err(|e| eyre!("Failed to query sync queue: {}", e))?
      .collect::<rusqlite::Result<_>>()
      .map_err(|e| eyre!("Failed to read queued submission: {}", e))?;

    rows
      .into_iter()
      .map(|(id, payload, queued_at)| {
        Ok(QueuedSubmission {
          id,
          tag: tag.to_string(),
          payload: serde_json::from_str(&payload)
            .map_err(|e| eyre!("Failed to decode queued payload {}: {}", id, e))?,
          queued_at: parse_datetime(&queued_at)?,
        })
      })
      .collect()
  }

  fn remove(&self, id: i64) -> Result<()> {
    self
      .conn()?
      .execute("DELETE FROM sync_queue WHERE id = ?", params![id])
      .map_err(|e| eyre!("Failed to remove queued submission {}: {}", id, e))?;
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
