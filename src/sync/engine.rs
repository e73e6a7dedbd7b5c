//! Read path, write path and queue replay.

use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::http::{HttpRequest, HttpResponse, Method, Transport};
use crate::store::{DurableStore, MutationMethod, NewMutation, QueuedMutation};

use super::error::SyncError;
use super::status::{StatusBroadcaster, SyncStatus};

/// Replay gives up on an entry after this many failed attempts.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// A write issued through [`SyncEngine::mutation_fetch`].
#[derive(Debug, Clone, PartialEq)]
pub struct MutationRequest {
  pub method: MutationMethod,
  pub headers: Vec<(String, String)>,
  /// JSON text, sent as-is.
  pub body: Option<String>,
}

impl MutationRequest {
  pub fn new(method: MutationMethod) -> Self {
    Self {
      method,
      headers: Vec::new(),
      body: None,
    }
  }

  pub fn json(mut self, body: impl Into<String>) -> Self {
    self
      .headers
      .push(("Content-Type".into(), "application/json".into()));
    self.body = Some(body.into());
    self
  }
}

/// Outcome of one replay pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplayReport {
  /// Another pass was already running; nothing was done.
  pub skipped: bool,
  /// Entries removed because the server accepted them (or the target was gone).
  pub sent: usize,
  /// Application-level failures this pass, including dropped entries.
  pub failed: usize,
  /// Entries dropped for good after reaching the retry limit.
  pub dropped: usize,
  /// The pass stopped early on a transport failure.
  pub aborted: bool,
  /// Queue length after the pass.
  pub remaining: usize,
}

impl ReplayReport {
  fn skipped() -> Self {
    Self {
      skipped: true,
      ..Self::default()
    }
  }

  fn had_failures(&self) -> bool {
    self.failed > 0 || self.aborted
  }
}

/// Clears the replay flag however the pass ends.
struct ReplayGuard<'a>(&'a AtomicBool);

impl<'a> ReplayGuard<'a> {
  fn acquire(flag: &'a AtomicBool) -> Option<Self> {
    flag
      .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
      .ok()
      .map(|_| ReplayGuard(flag))
  }
}

impl Drop for ReplayGuard<'_> {
  fn drop(&mut self) {
    self.0.store(false, Ordering::Release);
  }
}

/// Network-first reads with cache fallback, writes that queue when the
/// network is unreachable, and in-order replay of that queue.
pub struct SyncEngine<T> {
  transport: T,
  store: DurableStore,
  status: Arc<StatusBroadcaster>,
  max_retries: u32,
  replaying: AtomicBool,
}

impl<T: Transport> SyncEngine<T> {
  pub fn new(transport: T, store: DurableStore, status: Arc<StatusBroadcaster>) -> Self {
    Self {
      transport,
      store,
      status,
      max_retries: DEFAULT_MAX_RETRIES,
      replaying: AtomicBool::new(false),
    }
  }

  pub fn with_max_retries(mut self, max_retries: u32) -> Self {
    self.max_retries = max_retries.max(1);
    self
  }

  pub fn store(&self) -> &DurableStore {
    &self.store
  }

  pub fn status(&self) -> &Arc<StatusBroadcaster> {
    &self.status
  }

  #[cfg(test)]
  pub fn is_replaying(&self) -> bool {
    self.replaying.load(Ordering::Acquire)
  }

  /// Read `url` from the network, falling back to the last cached copy only
  /// when the network could not be reached at all.
  pub async fn cached_fetch(&self, url: &str) -> Result<Value, SyncError> {
    let request = HttpRequest::get(url).no_cache();

    match self.transport.send(request).await {
      Ok(res) if res.is_success() => {
        let data: Value = res.json().map_err(|source| SyncError::Decode {
          url: url.to_string(),
          source,
        })?;

        if let Err(e) = self.store.set_cached(url, &data) {
          tracing::warn!(url, error = %e, "failed to cache response");
        }
        Ok(data)
      }
      Ok(res) => Err(SyncError::Application {
        url: url.to_string(),
        status: res.status,
        body: res.text(),
      }),
      Err(e) if e.allows_cache_fallback() => {
        tracing::debug!(url, error = %e, "network read failed, trying cache");
        match self.store.get_cached(url)? {
          Some(cached) => {
            tracing::info!(url, cached_at = %cached.timestamp, "serving from cache");
            Ok(cached.data)
          }
          None => Err(SyncError::OfflineNoCache {
            url: url.to_string(),
          }),
        }
      }
      Err(e) => Err(e.into()),
    }
  }

  /// Send a mutation once. Any server response is returned unchanged; if the
  /// server could not be reached the mutation is queued and the synthetic
  /// [`HttpResponse::queued`] response is returned instead. A response whose
  /// body was cut off comes back as
  /// [`crate::http::TransportError::Incomplete`] and is
  /// never queued, since the server already has the write.
  pub async fn mutation_fetch(
    &self,
    url: &str,
    request: MutationRequest,
  ) -> Result<HttpResponse, SyncError> {
    let mut live = HttpRequest::new(Method::from(request.method), url);
    live.headers = request.headers.clone();
    live.body = request.body.clone();

    let err = match self.transport.send(live).await {
      Ok(res) => return Ok(res),
      Err(e) if e.is_network() => e,
      Err(e) => return Err(e.into()),
    };

    let body = request
      .body
      .as_deref()
      .map(|b| serde_json::from_str::<Value>(b))
      .transpose()
      .map_err(|source| SyncError::InvalidBody {
        url: url.to_string(),
        source,
      })?;

    let entry = self.store.enqueue(NewMutation {
      url: url.to_string(),
      method: request.method,
      body,
    })?;
    tracing::info!(id = %entry.id, method = %entry.method, url, error = %err, "queued mutation");

    let queue_length = self.store.queue_length()?;
    self.status.notify(SyncStatus::Idle, queue_length);

    Ok(HttpResponse::queued())
  }

  /// Replay queued mutations in FIFO order. Only one pass runs at a time; a
  /// call made while a pass is running returns immediately.
  pub async fn replay_queue(&self) -> Result<ReplayReport, SyncError> {
    let Some(_guard) = ReplayGuard::acquire(&self.replaying) else {
      tracing::debug!("replay already running");
      return Ok(ReplayReport::skipped());
    };

    let queue = match self.store.list_queue() {
      Ok(queue) => queue,
      Err(e) => return Err(self.fail_pass(e.into())),
    };

    if queue.is_empty() {
      self.status.notify(SyncStatus::Idle, 0);
      return Ok(ReplayReport::default());
    }

    tracing::info!(entries = queue.len(), "replaying mutation queue");
    self.status.notify(SyncStatus::Syncing, queue.len());

    let mut report = match self.replay_entries(queue).await {
      Ok(report) => report,
      Err(e) => return Err(self.fail_pass(e)),
    };

    report.remaining = match self.store.queue_length() {
      Ok(n) => n,
      Err(e) => return Err(self.fail_pass(e.into())),
    };

    let status = if report.had_failures() {
      SyncStatus::Error
    } else {
      SyncStatus::Idle
    };
    tracing::info!(
      sent = report.sent,
      failed = report.failed,
      dropped = report.dropped,
      aborted = report.aborted,
      remaining = report.remaining,
      "replay finished"
    );
    self.status.notify(status, report.remaining);

    Ok(report)
  }

  async fn replay_entries(&self, queue: Vec<QueuedMutation>) -> Result<ReplayReport, SyncError> {
    let mut report = ReplayReport::default();

    for mut entry in queue {
      let mut request = HttpRequest::new(Method::from(entry.method), entry.url.clone())
        .header("Content-Type", "application/json");
      if let Some(body) = &entry.body {
        request = request.body(body.to_string());
      }

      // `None`: the request could not even be built. That will not get
      // better by itself, so it counts against the retry bound.
      let status = match self.transport.send(request).await {
        Ok(res) => Some(res.status),
        Err(e) if e.is_network() => {
          tracing::warn!(id = %entry.id, url = %entry.url, error = %e, "network lost during replay, stopping pass");
          report.aborted = true;
          break;
        }
        Err(e) => {
          if e.received_status().is_none() {
            tracing::warn!(id = %entry.id, url = %entry.url, error = %e, "replay request could not be sent");
          }
          e.received_status()
        }
      };

      if status.is_some_and(replay_done) {
        self.store.dequeue(&entry.id)?;
        report.sent += 1;
        continue;
      }

      report.failed += 1;
      entry.retries += 1;
      if entry.retries >= self.max_retries {
        tracing::error!(
          id = %entry.id,
          method = %entry.method,
          url = %entry.url,
          status = ?status,
          retries = entry.retries,
          body = ?entry.body,
          "dropping mutation after repeated failures"
        );
        self.store.dequeue(&entry.id)?;
        report.dropped += 1;
      } else {
        tracing::warn!(id = %entry.id, url = %entry.url, status = ?status, retries = entry.retries, "replay rejected, will retry");
        self.store.update_queue_entry(&entry)?;
      }
    }

    Ok(report)
  }

  fn fail_pass(&self, err: SyncError) -> SyncError {
    let remaining = self.store.queue_length().unwrap_or(0);
    tracing::error!(error = %err, "replay pass failed");
    self.status.notify(SyncStatus::Error, remaining);
    err
  }
}

/// Whether a replayed entry is finished with. 404 counts: the target is
/// already gone, which is what a replayed delete wanted anyway.
fn replay_done(status: u16) -> bool {
  (200..300).contains(&status) || status == 404
}
