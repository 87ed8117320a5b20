//! Partition store trait and SQLite implementation.

use chrono::{DateTime, Utc};
use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Mutex;

use super::traits::{CacheKey, CachedResponse};
use crate::http::{Headers, Response};

/// Trait for partition store backends.
///
/// Every method is a single atomic operation; implementations serialize
/// access internally so concurrent interceptions may share one store.
pub trait CacheStore: Send + Sync + 'static {
  /// Create the partition if it does not exist yet.
  #[allow(dead_code)]
  fn open(&self, partition: &str) -> Result<()>;

  /// Store a response, creating the partition if needed. Overwrites any
  /// previous record for the same key.
  fn put(&self, partition: &str, key: &CacheKey, response: &Response) -> Result<()>;

  /// Store a batch of responses atomically: either all are written or none.
  fn put_all(&self, partition: &str, entries: &[(CacheKey, Response)]) -> Result<()>;

  /// Look up a response in one partition.
  fn get(&self, partition: &str, key: &CacheKey) -> Result<Option<CachedResponse>>;

  /// Remove a response. Returns whether a record existed.
  #[allow(dead_code)]
  fn delete(&self, partition: &str, key: &CacheKey) -> Result<bool>;

  /// Keys stored in a partition, sorted.
  fn keys(&self, partition: &str) -> Result<Vec<CacheKey>>;

  /// Names of all existing partitions, sorted.
  fn partitions(&self) -> Result<Vec<String>>;

  /// Drop a partition and everything in it. Returns whether it existed.
  fn delete_partition(&self, partition: &str) -> Result<bool>;
}

/// SQLite-based partition store.
pub struct SqliteStore {
  conn: Mutex<Connection>,
}

impl SqliteStore {
  /// Open the store at the default location.
  pub fn open_default() -> Result<Self> {
    let path = Self::default_path()?;
    Self::open_at(&path)
  }

  /// Open or create a store at `path`.
  pub fn open_at(path: &Path) -> Result<Self> {
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create cache directory: {}", e))?;
    }

    let conn = Connection::open(path)
      .map_err(|e| eyre!("Failed to open cache database at {}: {}", path.display(), e))?;

    Self::with_connection(conn)
  }

  /// A throwaway store that lives only as long as the process.
  #[allow(dead_code)]
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

  /// Get the default database path.
  fn default_path() -> Result<std::path::PathBuf> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| eyre!("Could not determine data directory"))?;

    Ok(data_dir.join("offline-agent").join("cache.db"))
  }

  fn run_migrations(&self) -> Result<()> {
    let conn = self.lock()?;

    conn
      .execute_batch(CACHE_SCHEMA)
      .map_err(|e| eyre!("Failed to run cache migrations: {}", e))?;

    Ok(())
  }

  fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
    self.conn.lock().map_err(|e| eyre!("Lock poisoned: {}", e))
  }
}

/// Schema for cache tables.
const CACHE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS partitions (
    name TEXT PRIMARY KEY,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- One row per (partition, request); key_hash is sha256 of "METHOD url"
CREATE TABLE IF NOT EXISTS entries (
    partition TEXT NOT NULL,
    key_hash TEXT NOT NULL,
    method TEXT NOT NULL,
    url TEXT NOT NULL,
    status INTEGER NOT NULL,
    headers TEXT NOT NULL,
    body BLOB NOT NULL,
    cached_at TEXT NOT NULL DEFAULT (datetime('now')),
    PRIMARY KEY (partition, key_hash)
);

CREATE INDEX IF NOT EXISTS idx_entries_partition ON entries(partition);
"#;

fn ensure_partition(conn: &Connection, partition: &str) -> Result<()> {
  conn
    .execute(
      "INSERT OR IGNORE INTO partitions (name) VALUES (?)",
      params![partition],
    )
    .map_err(|e| eyre!("Failed to create partition {}: {}", partition, e))?;
  Ok(())
}

fn insert_entry(
  conn: &Connection,
  partition: &str,
  key: &CacheKey,
  response: &Response,
) -> Result<()> {
  let headers = serde_json::to_string(&response.headers)
    .map_err(|e| eyre!("Failed to serialize headers: {}", e))?;

  conn
    .execute(
      "INSERT OR REPLACE INTO entries (partition, key_hash, method, url, status, headers, body, cached_at)
       VALUES (?, ?, ?, ?, ?, ?, ?, datetime('now'))",
      params![
        partition,
        key.digest(),
        key.method,
        key.url,
        response.status,
        headers,
        response.body
      ],
    )
    .map_err(|e| eyre!("Failed to store {}: {}", key, e))?;

  Ok(())
}

impl CacheStore for SqliteStore {
  fn open(&self, partition: &str) -> Result<()> {
    let conn = self.lock()?;
    ensure_partition(&conn, partition)
  }

  fn put(&self, partition: &str, key: &CacheKey, response: &Response) -> Result<()> {
    self.put_all(partition, &[(key.clone(), response.clone())])
  }

  fn put_all(&self, partition: &str, entries: &[(CacheKey, Response)]) -> Result<()> {
    let mut conn = self.lock()?;

    let tx = conn
      .transaction()
      .map_err(|e| eyre!("Failed to begin transaction: {}", e))?;

    ensure_partition(&tx, partition)?;
    for (key, response) in entries {
      insert_entry(&tx, partition, key, response)?;
    }

    tx.commit()
      .map_err(|e| eyre!("Failed to commit transaction: {}", e))?;

    Ok(())
  }

  fn get(&self, partition: &str, key: &CacheKey) -> Result<Option<CachedResponse>> {
    let conn = self.lock()?;

    let row: Option<(u16, String, Vec<u8>, String)> = conn
      .query_row(
        "SELECT status, headers, body, cached_at FROM entries
         WHERE partition = ? AND key_hash = ?",
        params![partition, key.digest()],
        |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
      )
      .optional()
      .map_err(|e| eyre!("Failed to look up {}: {}", key, e))?;

    match row {
      Some((status, headers, body, cached_at_str)) => {
        let headers: Headers = serde_json::from_str(&headers)
          .map_err(|e| eyre!("Failed to deserialize headers of {}: {}", key, e))?;
        let cached_at = parse_datetime(&cached_at_str)?;
        Ok(Some(CachedResponse {
          response: Response {
            status,
            headers,
            body,
          },
          cached_at,
        }))
      }
      None => Ok(None),
    }
  }

  fn delete(&self, partition: &str, key: &CacheKey) -> Result<bool> {
    let conn = self.lock()?;

    let removed = conn
      .execute(
        "DELETE FROM entries WHERE partition = ? AND key_hash = ?",
        params![partition, key.digest()],
      )
      .map_err(|e| eyre!("Failed to delete {}: {}", key, e))?;

    Ok(removed > 0)
  }

  fn keys(&self, partition: &str) -> Result<Vec<CacheKey>> {
    let conn = self.lock()?;

    let mut stmt = conn
      .prepare("SELECT method, url FROM entries WHERE partition = ? ORDER BY url, method")
      .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

    let keys = stmt
      .query_map(params![partition], |row| {
        Ok(CacheKey {
          method: row.get(0)?,
          url: row.get(1)?,
        })
      })
      .map_err(|e| eyre!("Failed to list keys of {}: {}", partition, e))?
      .filter_map(|r| r.ok())
      .collect();

    Ok(keys)
  }

  fn partitions(&self) -> Result<Vec<String>> {
    let conn = self.lock()?;

    let mut stmt = conn
      .prepare("SELECT name FROM partitions ORDER BY name")
      .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

    let names = stmt
      .query_map([], |row| row.get(0))
      .map_err(|e| eyre!("Failed to list partitions: {}", e))?
      .filter_map(|r| r.ok())
      .collect();

    Ok(names)
  }

  fn delete_partition(&self, partition: &str) -> Result<bool> {
    let mut conn = self.lock()?;

    let tx = conn
      .transaction()
      .map_err(|e| eyre!("Failed to begin transaction: {}", e))?;

    tx.execute("DELETE FROM entries WHERE partition = ?", params![partition])
      .map_err(|e| eyre!("Failed to delete entries of {}: {}", partition, e))?;
    let removed = tx
      .execute("DELETE FROM partitions WHERE name = ?", params![partition])
      .map_err(|e| eyre!("Failed to delete partition {}: {}", partition, e))?;

    tx.commit()
      .map_err(|e| eyre!("Failed to commit transaction: {}", e))?;

    Ok(removed > 0)
  }
}

/// Parse a datetime string from SQLite format.
fn parse_datetime(s: &str) -> Result<DateTime<Utc>> {
  // SQLite stores as "YYYY-MM-DD HH:MM:SS"
  chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
    .map(|dt| dt.and_utc())
    .map_err(|e| eyre!("Failed to parse datetime '{}': {}", s, e))
}

#[cfg(test)]
mod tests {
  use super::*;
  use url::Url;

  fn key(path: &str) -> CacheKey {
    CacheKey::get(&Url::parse(&format!("https://example.com{}", path)).unwrap())
  }

  #[test]
  fn test_put_get_roundtrip_preserves_response() {
    let store = SqliteStore::open_in_memory().unwrap();
    let response = Response::new(200, b"body { color: red }".to_vec())
      .with_header("Content-Type", "text/css");

    store.put("static-v1", &key("/a.css"), &response).unwrap();

    let cached = store.get("static-v1", &key("/a.css")).unwrap().unwrap();
    assert_eq!(cached.response, response);
    assert!(store.get("dynamic-v1", &key("/a.css")).unwrap().is_none());
  }

  #[test]
  fn test_put_overwrites_previous_record() {
    let store = SqliteStore::open_in_memory().unwrap();
    store
      .put("p", &key("/x"), &Response::new(200, b"old".to_vec()))
      .unwrap();
    store
      .put("p", &key("/x"), &Response::new(200, b"new".to_vec()))
      .unwrap();

    let cached = store.get("p", &key("/x")).unwrap().unwrap();
    assert_eq!(cached.response.text(), "new");
    assert_eq!(store.keys("p").unwrap().len(), 1);
  }

  #[test]
  fn test_partitions_are_created_lazily_and_deleted_with_entries() {
    let store = SqliteStore::open_in_memory().unwrap();
    assert!(store.partitions().unwrap().is_empty());

    store.open("b").unwrap();
    store
      .put("a", &key("/x"), &Response::new(200, b"x".to_vec()))
      .unwrap();
    assert_eq!(store.partitions().unwrap(), vec!["a", "b"]);

    assert!(store.delete_partition("a").unwrap());
    assert!(!store.delete_partition("a").unwrap());
    assert_eq!(store.partitions().unwrap(), vec!["b"]);
    assert!(store.get("a", &key("/x")).unwrap().is_none());
  }

  #[test]
  fn test_delete_single_entry() {
    let store = SqliteStore::open_in_memory().unwrap();
    store
      .put("p", &key("/x"), &Response::new(200, b"x".to_vec()))
      .unwrap();

    assert!(store.delete("p", &key("/x")).unwrap());
    assert!(!store.delete("p", &key("/x")).unwrap());
    assert!(store.get("p", &key("/x")).unwrap().is_none());
  }

  #[test]
  fn test_put_all_writes_every_entry() {
    let store = SqliteStore::open_in_memory().unwrap();
    let entries = vec![
      (key("/a"), Response::new(200, b"a".to_vec())),
      (key("/b"), Response::new(200, b"b".to_vec())),
    ];

    store.put_all("p", &entries).unwrap();

    let keys = store.keys("p").unwrap();
    assert_eq!(keys, vec![key("/a"), key("/b")]);
  }

  #[test]
  fn test_store_survives_reopen() {
    let dir = std::env::temp_dir().join(format!("offline-agent-test-{}", std::process::id()));
    let path = dir.join("cache.db");

    {
      let store = SqliteStore::open_at(&path).unwrap();
      store
        .put("p", &key("/x"), &Response::new(200, b"persisted".to_vec()))
        .unwrap();
    }

    let store = SqliteStore::open_at(&path).unwrap();
    let cached = store.get("p", &key("/x")).unwrap().unwrap();
    assert_eq!(cached.response.text(), "persisted");

    let _ = std::fs::remove_dir_all(&dir);
  }
}
