//! Typed response cache and mutation queue on top of a [`KeyValueStore`].

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use super::traits::{KeyValueStore, Namespace, StoreError};

/// Last known good response for a URL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedResponse {
  pub url: String,
  pub data: Value,
  /// When the response was captured. Informational only, never an expiry.
  #[serde(with = "chrono::serde::ts_milliseconds")]
  pub timestamp: DateTime<Utc>,
}

/// The HTTP methods a mutation may be queued with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MutationMethod {
  Post,
  Patch,
  Delete,
}

impl MutationMethod {
  pub fn as_str(&self) -> &'static str {
    match self {
      MutationMethod::Post => "POST",
      MutationMethod::Patch => "PATCH",
      MutationMethod::Delete => "DELETE",
    }
  }
}

impl fmt::Display for MutationMethod {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl std::str::FromStr for MutationMethod {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.to_ascii_uppercase().as_str() {
      "POST" => Ok(MutationMethod::Post),
      "PATCH" => Ok(MutationMethod::Patch),
      "DELETE" => Ok(MutationMethod::Delete),
      other => Err(format!("unsupported mutation method: {}", other)),
    }
  }
}

/// A mutation that could not reach the server, waiting for replay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedMutation {
  pub id: String,
  pub url: String,
  pub method: MutationMethod,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub body: Option<Value>,
  /// Enqueue time; the replay order key.
  #[serde(with = "chrono::serde::ts_milliseconds")]
  pub timestamp: DateTime<Utc>,
  pub retries: u32,
}

/// A mutation before the store has assigned it an id, timestamp and retry count.
#[derive(Debug, Clone, PartialEq)]
pub struct NewMutation {
  pub url: String,
  pub method: MutationMethod,
  pub body: Option<Value>,
}

/// Response cache and mutation queue, each in its own namespace.
#[derive(Clone)]
pub struct DurableStore {
  kv: Arc<dyn KeyValueStore>,
  last_enqueued: Arc<Mutex<Option<DateTime<Utc>>>>,
}

impl DurableStore {
  pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
    Self {
      kv,
      last_enqueued: Arc::new(Mutex::new(None)),
    }
  }

  // --- Response cache ---

  pub fn get_cached(&self, url: &str) -> Result<Option<CachedResponse>, StoreError> {
    match self.kv.get(&Namespace::CACHE_RESPONSES, url)? {
      Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
      None => Ok(None),
    }
  }

  pub fn set_cached(&self, url: &str, data: &Value) -> Result<(), StoreError> {
    let entry = CachedResponse {
      url: url.to_string(),
      data: data.clone(),
      timestamp: Utc::now(),
    };
    let bytes = serde_json::to_vec(&entry)?;
    self.kv.set(&Namespace::CACHE_RESPONSES, url, &bytes)
  }

  pub fn clear_cache(&self) -> Result<(), StoreError> {
    self.kv.clear(&Namespace::CACHE_RESPONSES)
  }

  // --- Mutation queue ---

  /// All queued mutations, oldest first. Entries that no longer decode can
  /// never be replayed; they are removed here so the queue length stays
  /// truthful.
  pub fn list_queue(&self) -> Result<Vec<QueuedMutation>, StoreError> {
    let keys = self.kv.list_keys(&Namespace::MUTATION_QUEUE)?;
    let mut entries = Vec::with_capacity(keys.len());

    for key in keys {
      let Some(bytes) = self.kv.get(&Namespace::MUTATION_QUEUE, &key)? else {
        continue;
      };
      match serde_json::from_slice::<QueuedMutation>(&bytes) {
        Ok(entry) => entries.push(entry),
        Err(e) => {
          tracing::error!(
            key = %key,
            error = %e,
            raw = %String::from_utf8_lossy(&bytes),
            "dropping unreadable queue entry"
          );
          self.kv.delete(&Namespace::MUTATION_QUEUE, &key)?;
        }
      }
    }

    entries.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| a.id.cmp(&b.id)));
    Ok(entries)
  }

  /// Persist a new mutation at the tail of the queue.
  pub fn enqueue(&self, mutation: NewMutation) -> Result<QueuedMutation, StoreError> {
    let entry = QueuedMutation {
      id: Uuid::new_v4().to_string(),
      url: mutation.url,
      method: mutation.method,
      body: mutation.body,
      timestamp: self.next_timestamp()?,
      retries: 0,
    };
    self.write_entry(&entry)?;
    Ok(entry)
  }

  /// Remove an entry. Absent ids are ignored.
  pub fn dequeue(&self, id: &str) -> Result<(), StoreError> {
    self.kv.delete(&Namespace::MUTATION_QUEUE, id)
  }

  pub fn update_queue_entry(&self, entry: &QueuedMutation) -> Result<(), StoreError> {
    self.write_entry(entry)
  }

  pub fn queue_length(&self) -> Result<usize, StoreError> {
    Ok(self.kv.list_keys(&Namespace::MUTATION_QUEUE)?.len())
  }

  pub fn clear_queue(&self) -> Result<(), StoreError> {
    self.kv.clear(&Namespace::MUTATION_QUEUE)
  }

  fn write_entry(&self, entry: &QueuedMutation) -> Result<(), StoreError> {
    let bytes = serde_json::to_vec(entry)?;
    self.kv.set(&Namespace::MUTATION_QUEUE, &entry.id, &bytes)
  }

  /// Wall clock time, bumped so that it is strictly later than the previous enqueue.
  fn next_timestamp(&self) -> Result<DateTime<Utc>, StoreError> {
    let mut last = self.last_enqueued.lock().map_err(|_| StoreError::Poisoned)?;
    // Millisecond precision, matching what is persisted.
    let now = DateTime::from_timestamp_millis(Utc::now().timestamp_millis()).unwrap_or_else(Utc::now);
    let next = match *last {
      Some(prev) if now <= prev => prev + Duration::milliseconds(1),
      _ => now,
    };
    *last = Some(next);
    Ok(next)
  }
}
