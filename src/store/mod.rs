//! Durable storage for the sync engine.
//!
//! Two namespaces that never share keys:
//! - `cache-responses`: last successful GET response per URL
//! - `mutation-queue`: mutations waiting for replay, keyed by generated id
//!
//! The raw [`KeyValueStore`] trait keeps the engine independent of the
//! backend; [`DurableStore`] adds the typed cache and queue operations.

mod durable;
mod memory;
mod sqlite;
mod traits;

pub use durable::{DurableStore, MutationMethod, NewMutation, QueuedMutation};
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use traits::{KeyValueStore, Namespace, StoreError};

use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;

/// What to do when the SQLite backend cannot be opened.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StoreFallback {
  /// Surface the error to the caller
  #[default]
  Fail,
  /// Continue with a non-durable in-memory store
  Memory,
}

/// Open the storage backend, applying the fallback policy on failure.
pub fn open_backend(
  path: Option<&Path>,
  fallback: StoreFallback,
) -> Result<Arc<dyn KeyValueStore>, StoreError> {
  let opened = match path {
    Some(p) => SqliteStore::open(p),
    None => SqliteStore::default_path().and_then(|p| SqliteStore::open(&p)),
  };

  match (opened, fallback) {
    (Ok(store), _) => Ok(Arc::new(store)),
    (Err(e), StoreFallback::Memory) => {
      tracing::warn!(error = %e, "durable storage unavailable, falling back to memory; queued changes will not survive a restart");
      Ok(Arc::new(MemoryStore::new()))
    }
    (Err(e), StoreFallback::Fail) => Err(e),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_fallback_policy() {
    // A path under a regular file cannot be created.
    let file = std::env::temp_dir().join(format!("ghs-sync-blocker-{}", uuid::Uuid::new_v4()));
    std::fs::write(&file, b"not a directory").unwrap();
    let bad = file.join("nested").join("sync.db");

    let err = open_backend(Some(&bad), StoreFallback::Fail).err().unwrap();
    assert!(matches!(err, StoreError::Unavailable(_)));

    let store = open_backend(Some(&bad), StoreFallback::Memory).unwrap();
    store.set(&Namespace::CACHE_RESPONSES, "k", b"v").unwrap();
    assert_eq!(store.get(&Namespace::CACHE_RESPONSES, "k").unwrap(), Some(b"v".to_vec()));

    let _ = std::fs::remove_file(&file);
  }
}
