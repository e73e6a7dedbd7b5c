//! Core traits and types for the key-value storage layer.

use std::borrow::Cow;
use std::fmt;

use thiserror::Error;

/// A logically separate key space inside a store.
///
/// Identical keys in different namespaces never collide.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Namespace(Cow<'static, str>);

impl Namespace {
  /// Cached GET responses, keyed by request URL.
  pub const CACHE_RESPONSES: Namespace = Namespace(Cow::Borrowed("cache-responses"));

  /// Pending mutations, keyed by generated entry id.
  pub const MUTATION_QUEUE: Namespace = Namespace(Cow::Borrowed("mutation-queue"));

  const SHELL_PREFIX: &'static str = "shell:";

  /// Namespace holding one generation of the static asset shell cache.
  pub fn shell(generation: &str) -> Self {
    Namespace(Cow::Owned(format!("{}{}", Self::SHELL_PREFIX, generation)))
  }

  /// Wrap a raw namespace name, as returned by [`KeyValueStore::namespaces`].
  pub fn from_raw(name: impl Into<String>) -> Self {
    Namespace(Cow::Owned(name.into()))
  }

  /// The shell generation this namespace belongs to, if it is a shell namespace.
  pub fn shell_generation(&self) -> Option<&str> {
    self.0.strip_prefix(Self::SHELL_PREFIX)
  }

  pub fn as_str(&self) -> &str {
    &self.0
  }
}

impl fmt::Display for Namespace {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

#[derive(Debug, Error)]
pub enum StoreError {
  /// The backend could not be opened at all.
  #[error("storage unavailable: {0}")]
  Unavailable(String),
  #[error("storage backend error: {0}")]
  Backend(#[from] rusqlite::Error),
  #[error("failed to encode or decode stored value: {0}")]
  Codec(#[from] serde_json::Error),
  #[error("storage lock poisoned")]
  Poisoned,
}

/// Raw, namespaced byte storage.
///
/// Every operation is atomic from the caller's point of view; implementations
/// must serialize writes so concurrent callers never lose an update.
pub trait KeyValueStore: Send + Sync {
  fn get(&self, ns: &Namespace, key: &str) -> Result<Option<Vec<u8>>, StoreError>;

  /// Insert or overwrite.
  fn set(&self, ns: &Namespace, key: &str, value: &[u8]) -> Result<(), StoreError>;

  /// Remove a key. Removing an absent key is not an error.
  fn delete(&self, ns: &Namespace, key: &str) -> Result<(), StoreError>;

  fn list_keys(&self, ns: &Namespace) -> Result<Vec<String>, StoreError>;

  /// Remove every key in the namespace.
  fn clear(&self, ns: &Namespace) -> Result<(), StoreError>;

  /// All namespaces that currently hold at least one key.
  fn namespaces(&self) -> Result<Vec<Namespace>, StoreError>;
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_shell_namespace_generation() {
    let ns = Namespace::shell("ghs-hinder-v2");
    assert_eq!(ns.as_str(), "shell:ghs-hinder-v2");
    assert_eq!(ns.shell_generation(), Some("ghs-hinder-v2"));
    assert_eq!(Namespace::CACHE_RESPONSES.shell_generation(), None);
  }

  #[test]
  fn test_fixed_namespaces_are_distinct() {
    assert_ne!(Namespace::CACHE_RESPONSES, Namespace::MUTATION_QUEUE);
    assert_eq!(
      Namespace::from_raw("mutation-queue"),
      Namespace::MUTATION_QUEUE
    );
  }
}
