//! SQLite-backed key-value storage.

use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use super::traits::{KeyValueStore, Namespace, StoreError};

/// Schema for the namespaced key-value table.
const STORE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS kv_store (
    namespace TEXT NOT NULL,
    key TEXT NOT NULL,
    value BLOB NOT NULL,
    updated_at TEXT NOT NULL DEFAULT (datetime('now')),
    PRIMARY KEY (namespace, key)
);
"#;

/// SQLite storage implementation.
///
/// The connection sits behind a mutex, so every write is serialized.
pub struct SqliteStore {
  conn: Mutex<Connection>,
}

impl SqliteStore {
  /// Open (or create) the database at `path`.
  pub fn open(path: &Path) -> Result<Self, StoreError> {
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent).map_err(|e| {
        StoreError::Unavailable(format!(
          "failed to create store directory {}: {}",
          parent.display(),
          e
        ))
      })?;
    }

    let conn = Connection::open(path).map_err(|e| {
      StoreError::Unavailable(format!(
        "failed to open store at {}: {}",
        path.display(),
        e
      ))
    })?;

    Self::with_connection(conn)
  }

  /// Open a private in-memory database.
  #[cfg(test)]
  pub fn open_in_memory() -> Result<Self, StoreError> {
    let conn = Connection::open_in_memory()
      .map_err(|e| StoreError::Unavailable(format!("failed to open in-memory store: {}", e)))?;
    Self::with_connection(conn)
  }

  /// Get the default database path.
  pub fn default_path() -> Result<PathBuf, StoreError> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| StoreError::Unavailable("could not determine data directory".into()))?;

    Ok(data_dir.join("ghs-sync").join("sync.db"))
  }

  fn with_connection(conn: Connection) -> Result<Self, StoreError> {
    conn
      .execute_batch(STORE_SCHEMA)
      .map_err(|e| StoreError::Unavailable(format!("failed to run store migrations: {}", e)))?;

    Ok(Self {
      conn: Mutex::new(conn),
    })
  }

  fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, StoreError> {
    self.conn.lock().map_err(|_| StoreError::Poisoned)
  }
}

impl KeyValueStore for SqliteStore {
  fn get(&self, ns: &Namespace, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
    let conn = self.lock()?;
    let value = conn
      .query_row(
        "SELECT value FROM kv_store WHERE namespace = ? AND key = ?",
        params![ns.as_str(), key],
        |row| row.get(0),
      )
      .optional()?;
    Ok(value)
  }

  fn set(&self, ns: &Namespace, key: &str, value: &[u8]) -> Result<(), StoreError> {
    let conn = self.lock()?;
    conn.execute(
      "INSERT OR REPLACE INTO kv_store (namespace, key, value, updated_at)
       VALUES (?, ?, ?, datetime('now'))",
      params![ns.as_str(), key, value],
    )?;
    Ok(())
  }

  fn delete(&self, ns: &Namespace, key: &str) -> Result<(), StoreError> {
    let conn = self.lock()?;
    conn.execute(
      "DELETE FROM kv_store WHERE namespace = ? AND key = ?",
      params![ns.as_str(), key],
    )?;
    Ok(())
  }

  fn list_keys(&self, ns: &Namespace) -> Result<Vec<String>, StoreError> {
    let conn = self.lock()?;
    let mut stmt = conn.prepare("SELECT key FROM kv_store WHERE namespace = ? ORDER BY key")?;
    let keys = stmt
      .query_map(params![ns.as_str()], |row| row.get(0))?
      .collect::<Result<Vec<String>, _>>()?;
    Ok(keys)
  }

  fn clear(&self, ns: &Namespace) -> Result<(), StoreError> {
    let conn = self.lock()?;
    conn.execute(
      "DELETE FROM kv_store WHERE namespace = ?",
      params![ns.as_str()],
    )?;
    Ok(())
  }

  fn namespaces(&self) -> Result<Vec<Namespace>, StoreError> {
    let conn = self.lock()?;
    let mut stmt = conn.prepare("SELECT DISTINCT namespace FROM kv_store ORDER BY namespace")?;
    let names = stmt
      .query_map([], |row| row.get::<_, String>(0))?
      .collect::<Result<Vec<_>, _>>()?;
    Ok(names.into_iter().map(Namespace::from_raw).collect())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_set_get_overwrite() {
    let store = SqliteStore::open_in_memory().unwrap();
    let ns = Namespace::CACHE_RESPONSES;

    assert_eq!(store.get(&ns, "/api/fences").unwrap(), None);
    store.set(&ns, "/api/fences", b"one").unwrap();
    store.set(&ns, "/api/fences", b"two").unwrap();
    assert_eq!(store.get(&ns, "/api/fences").unwrap(), Some(b"two".to_vec()));
    assert_eq!(store.list_keys(&ns).unwrap(), vec!["/api/fences".to_string()]);
  }

  #[test]
  fn test_namespaces_are_isolated() {
    let store = SqliteStore::open_in_memory().unwrap();
    store.set(&Namespace::CACHE_RESPONSES, "k", b"a").unwrap();
    store.set(&Namespace::MUTATION_QUEUE, "k", b"b").unwrap();
    store.set(&Namespace::shell("v1"), "k", b"c").unwrap();

    store.delete(&Namespace::MUTATION_QUEUE, "k").unwrap();
    assert_eq!(store.get(&Namespace::CACHE_RESPONSES, "k").unwrap(), Some(b"a".to_vec()));
    assert_eq!(store.get(&Namespace::MUTATION_QUEUE, "k").unwrap(), None);

    let names = store.namespaces().unwrap();
    assert_eq!(names, vec![Namespace::CACHE_RESPONSES, Namespace::shell("v1")]);
  }

  #[test]
  fn test_survives_reopen() {
    let path = std::env::temp_dir()
      .join(format!("ghs-sync-test-{}", uuid::Uuid::new_v4()))
      .join("sync.db");

    {
      let store = SqliteStore::open(&path).unwrap();
      store.set(&Namespace::MUTATION_QUEUE, "id-1", b"payload").unwrap();
    }

    let reopened = SqliteStore::open(&path).unwrap();
    assert_eq!(
      reopened.get(&Namespace::MUTATION_QUEUE, "id-1").unwrap(),
      Some(b"payload".to_vec())
    );

    if let Some(dir) = path.parent() {
      let _ = std::fs::remove_dir_all(dir);
    }
  }
}
