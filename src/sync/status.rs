//! Sync status and its observer registry.

use std::fmt;
use std::sync::{Arc, Mutex};

/// Replay state, as shown to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStatus {
  Idle,
  Syncing,
  Error,
}

impl SyncStatus {
  pub fn as_str(&self) -> &'static str {
    match self {
      SyncStatus::Idle => "idle",
      SyncStatus::Syncing => "syncing",
      SyncStatus::Error => "error",
    }
  }
}

impl fmt::Display for SyncStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// Handle returned by [`StatusBroadcaster::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Listener = Arc<dyn Fn(SyncStatus, usize) + Send + Sync>;

#[derive(Default)]
struct Registry {
  next_id: u64,
  listeners: Vec<(SubscriptionId, Listener)>,
}

/// Delivers every `(status, queue_length)` change to all current subscribers.
///
/// Delivery is synchronous, at the point of change. Subscribers only see
/// changes made after they subscribed.
#[derive(Default)]
pub struct StatusBroadcaster {
  registry: Mutex<Registry>,
}

impl StatusBroadcaster {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn subscribe<F>(&self, listener: F) -> SubscriptionId
  where
    F: Fn(SyncStatus, usize) + Send + Sync + 'static,
  {
    let mut registry = self.registry.lock().unwrap_or_else(|e| e.into_inner());
    registry.next_id += 1;
    let id = SubscriptionId(registry.next_id);
    registry.listeners.push((id, Arc::new(listener)));
    id
  }

  /// Returns whether the subscription existed.
  pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
    let mut registry = self.registry.lock().unwrap_or_else(|e| e.into_inner());
    let before = registry.listeners.len();
    registry.listeners.retain(|(sid, _)| *sid != id);
    registry.listeners.len() != before
  }

  pub fn notify(&self, status: SyncStatus, queue_length: usize) {
    // Snapshot first so a listener may (un)subscribe without deadlocking.
    let listeners: Vec<Listener> = {
      let registry = self.registry.lock().unwrap_or_else(|e| e.into_inner());
      registry.listeners.iter().map(|(_, l)| Arc::clone(l)).collect()
    };

    tracing::debug!(%status, queue_length, subscribers = listeners.len(), "sync status");

    for listener in listeners {
      listener(status, queue_length);
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn recorder(
    broadcaster: &StatusBroadcaster,
  ) -> (SubscriptionId, Arc<Mutex<Vec<(SyncStatus, usize)>>>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let id = broadcaster.subscribe(move |s, n| sink.lock().unwrap().push((s, n)));
    (id, seen)
  }

  #[test]
  fn test_all_subscribers_notified() {
    let broadcaster = StatusBroadcaster::new();
    let (_, a) = recorder(&broadcaster);
    let (_, b) = recorder(&broadcaster);

    broadcaster.notify(SyncStatus::Syncing, 3);

    assert_eq!(*a.lock().unwrap(), vec![(SyncStatus::Syncing, 3)]);
    assert_eq!(*b.lock().unwrap(), vec![(SyncStatus::Syncing, 3)]);
  }

  #[test]
  fn test_late_subscriber_gets_no_history() {
    let broadcaster = StatusBroadcaster::new();
    broadcaster.notify(SyncStatus::Error, 2);

    let (_, seen) = recorder(&broadcaster);
    assert!(seen.lock().unwrap().is_empty());

    broadcaster.notify(SyncStatus::Idle, 0);
    assert_eq!(*seen.lock().unwrap(), vec![(SyncStatus::Idle, 0)]);
  }

  #[test]
  fn test_unsubscribe() {
    let broadcaster = StatusBroadcaster::new();
    let (id, seen) = recorder(&broadcaster);

    assert!(broadcaster.unsubscribe(id));
    assert!(!broadcaster.unsubscribe(id));

    broadcaster.notify(SyncStatus::Idle, 0);
    assert!(seen.lock().unwrap().is_empty());
  }

  #[test]
  fn test_separate_broadcasters_do_not_cross_talk() {
    let first = StatusBroadcaster::new();
    let second = StatusBroadcaster::new();
    let (_, seen) = recorder(&first);

    second.notify(SyncStatus::Syncing, 1);
    assert!(seen.lock().unwrap().is_empty());
  }
}
