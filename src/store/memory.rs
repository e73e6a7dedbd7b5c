//! In-memory store, used by tests and as the non-durable fallback backend.

use std::collections::BTreeMap;
use std::sync::RwLock;

use super::traits::{KeyValueStore, Namespace, StoreError};

/// `KeyValueStore` backed by nested `BTreeMap`s. Nothing survives a restart.
#[derive(Debug, Default)]
pub struct MemoryStore {
  inner: RwLock<BTreeMap<Namespace, BTreeMap<String, Vec<u8>>>>,
}

impl MemoryStore {
  pub fn new() -> Self {
    Self::default()
  }
}

impl KeyValueStore for MemoryStore {
  fn get(&self, ns: &Namespace, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
    let guard = self.inner.read().map_err(|_| StoreError::Poisoned)?;
    Ok(guard.get(ns).and_then(|m| m.get(key)).cloned())
  }

  fn set(&self, ns: &Namespace, key: &str, value: &[u8]) -> Result<(), StoreError> {
    let mut guard = self.inner.write().map_err(|_| StoreError::Poisoned)?;
    guard
      .entry(ns.clone())
      .or_default()
      .insert(key.to_string(), value.to_vec());
    Ok(())
  }

  fn delete(&self, ns: &Namespace, key: &str) -> Result<(), StoreError> {
    let mut guard = self.inner.write().map_err(|_| StoreError::Poisoned)?;
    if let Some(map) = guard.get_mut(ns) {
      map.remove(key);
      if map.is_empty() {
        guard.remove(ns);
      }
    }
    Ok(())
  }

  fn list_keys(&self, ns: &Namespace) -> Result<Vec<String>, StoreError> {
    let guard = self.inner.read().map_err(|_| StoreError::Poisoned)?;
    Ok(
      guard
        .get(ns)
        .map(|m| m.keys().cloned().collect())
        .unwrap_or_default(),
    )
  }

  fn clear(&self, ns: &Namespace) -> Result<(), StoreError> {
    let mut guard = self.inner.write().map_err(|_| StoreError::Poisoned)?;
    guard.remove(ns);
    Ok(())
  }

  fn namespaces(&self) -> Result<Vec<Namespace>, StoreError> {
    let guard = self.inner.read().map_err(|_| StoreError::Poisoned)?;
    Ok(guard.keys().cloned().collect())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_namespaces_do_not_collide() {
    let store = MemoryStore::new();
    store
      .set(&Namespace::CACHE_RESPONSES, "/api/x", b"cached")
      .unwrap();
    store
      .set(&Namespace::MUTATION_QUEUE, "/api/x", b"queued")
      .unwrap();

    assert_eq!(
      store.get(&Namespace::CACHE_RESPONSES, "/api/x").unwrap(),
      Some(b"cached".to_vec())
    );
    assert_eq!(
      store.get(&Namespace::MUTATION_QUEUE, "/api/x").unwrap(),
      Some(b"queued".to_vec())
    );

    store.clear(&Namespace::CACHE_RESPONSES).unwrap();
    assert!(store.list_keys(&Namespace::CACHE_RESPONSES).unwrap().is_empty());
    assert_eq!(store.list_keys(&Namespace::MUTATION_QUEUE).unwrap().len(), 1);
  }

  #[test]
  fn test_delete_missing_key_is_noop() {
    let store = MemoryStore::new();
    store.delete(&Namespace::MUTATION_QUEUE, "nope").unwrap();
    assert!(store.namespaces().unwrap().is_empty());
  }
}
