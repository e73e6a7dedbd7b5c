//! Versioned cache of the static application shell.
//!
//! Lives in its own `shell:<generation>` namespace and never touches the sync
//! engine's response cache. API calls and non-GET requests are never handled
//! here.

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use thiserror::Error;
use url::Url;

use crate::http::{HttpRequest, HttpResponse, Method, ResponseOrigin, Transport};
use crate::store::{KeyValueStore, Namespace, StoreError};

#[derive(Debug, Error)]
pub enum ShellError {
  #[error("failed to precache {path}: {reason}")]
  Install { path: String, reason: String },
  #[error(transparent)]
  Store(#[from] StoreError),
  #[error("stored asset is corrupt: {0}")]
  Corrupt(String),
}

/// Settings for a [`ShellCache`].
#[derive(Debug, Clone)]
pub struct ShellSettings {
  pub generation: String,
  pub precache: Vec<String>,
  pub static_prefixes: Vec<String>,
  pub offline_page: String,
}

/// A request as seen by the shell cache.
#[derive(Debug, Clone, PartialEq)]
pub struct ShellRequest {
  pub method: Method,
  pub url: String,
  /// Top-level page navigation, eligible for the offline page.
  pub navigate: bool,
}

impl ShellRequest {
  pub fn get(url: impl Into<String>) -> Self {
    Self {
      method: Method::Get,
      url: url.into(),
      navigate: false,
    }
  }

  pub fn navigate(url: impl Into<String>) -> Self {
    Self {
      navigate: true,
      ..Self::get(url)
    }
  }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ShellOutcome {
  /// Not ours; let the request go to the network untouched.
  Passthrough,
  Respond(HttpResponse),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Strategy {
  CacheFirst,
  NetworkFirst,
}

#[derive(Serialize, Deserialize)]
struct StoredAsset {
  url: String,
  status: u16,
  headers: Vec<(String, String)>,
  body_hex: String,
}

pub struct ShellCache<T> {
  transport: T,
  kv: Arc<dyn KeyValueStore>,
  namespace: Namespace,
  settings: ShellSettings,
}

impl<T: Transport> ShellCache<T> {
  pub fn new(transport: T, kv: Arc<dyn KeyValueStore>, settings: ShellSettings) -> Self {
    Self {
      transport,
      kv,
      namespace: Namespace::shell(&settings.generation),
      settings,
    }
  }

  pub fn generation(&self) -> &str {
    &self.settings.generation
  }

  /// Fetch and store every precache path. All or nothing: if any fetch fails
  /// nothing is written.
  pub async fn install(&self) -> Result<usize, ShellError> {
    let fetches = self.settings.precache.iter().map(|path| async move {
      let res = self
        .transport
        .send(HttpRequest::get(path.clone()).no_cache())
        .await;
      (path, res)
    });

    let mut fetched = Vec::with_capacity(self.settings.precache.len());
    for (path, res) in join_all(fetches).await {
      match res {
        Ok(res) if res.is_success() => fetched.push((path, res)),
        Ok(res) => {
          return Err(ShellError::Install {
            path: path.clone(),
            reason: format!("HTTP {}", res.status),
          })
        }
        Err(e) => {
          return Err(ShellError::Install {
            path: path.clone(),
            reason: e.to_string(),
          })
        }
      }
    }

    for (path, res) in &fetched {
      self.put(path, res)?;
    }

    tracing::info!(generation = %self.settings.generation, assets = fetched.len(), "shell installed");
    Ok(fetched.len())
  }

  /// Delete every shell generation other than the current one.
  pub fn activate(&self) -> Result<Vec<String>, ShellError> {
    let mut removed = Vec::new();
    for ns in self.kv.namespaces()? {
      let Some(generation) = ns.shell_generation() else {
        continue;
      };
      if generation != self.settings.generation {
        self.kv.clear(&ns)?;
        removed.push(generation.to_string());
      }
    }

    if !removed.is_empty() {
      tracing::info!(?removed, "removed old shell generations");
    }
    Ok(removed)
  }

  pub async fn handle(&self, request: &ShellRequest) -> Result<ShellOutcome, ShellError> {
    let Some((strategy, path)) = self.classify(request) else {
      return Ok(ShellOutcome::Passthrough);
    };

    match strategy {
      Strategy::CacheFirst => {
        if let Some(cached) = self.lookup(&path)? {
          return Ok(ShellOutcome::Respond(cached));
        }
        self.network_then_fallback(request, &path).await
      }
      Strategy::NetworkFirst => self.network_then_fallback(request, &path).await,
    }
  }

  async fn network_then_fallback(
    &self,
    request: &ShellRequest,
    path: &str,
  ) -> Result<ShellOutcome, ShellError> {
    match self.transport.send(HttpRequest::get(request.url.clone())).await {
      Ok(res) => {
        if res.is_success() {
          self.put(path, &res)?;
        }
        Ok(ShellOutcome::Respond(res))
      }
      Err(e) => {
        tracing::debug!(url = %request.url, error = %e, "shell fetch failed, serving fallback");
        if let Some(cached) = self.lookup(path)? {
          return Ok(ShellOutcome::Respond(cached));
        }
        if request.navigate {
          if let Some(page) = self.lookup(&self.settings.offline_page)? {
            return Ok(ShellOutcome::Respond(page));
          }
        }
        Ok(ShellOutcome::Respond(HttpResponse {
          origin: ResponseOrigin::Local,
          ..HttpResponse::new(503, "Offline").with_header("Content-Type", "text/plain")
        }))
      }
    }
  }

  /// Strategy and cache path for a request, `None` when it is not ours.
  fn classify(&self, request: &ShellRequest) -> Option<(Strategy, String)> {
    if request.method != Method::Get {
      return None;
    }
    let path = request_path(&request.url)?;
    if path.starts_with("/api/") {
      return None;
    }
    if self
      .settings
      .static_prefixes
      .iter()
      .any(|prefix| path.starts_with(prefix.as_str()))
    {
      return Some((Strategy::CacheFirst, path));
    }
    Some((Strategy::NetworkFirst, path))
  }

  fn lookup(&self, path: &str) -> Result<Option<HttpResponse>, ShellError> {
    let Some(bytes) = self.kv.get(&self.namespace, &asset_key(path))? else {
      return Ok(None);
    };
    let asset: StoredAsset =
      serde_json::from_slice(&bytes).map_err(|e| ShellError::Corrupt(e.to_string()))?;
    let body = hex::decode(&asset.body_hex).map_err(|e| ShellError::Corrupt(e.to_string()))?;

    Ok(Some(HttpResponse {
      status: asset.status,
      headers: asset.headers,
      body,
      origin: ResponseOrigin::Local,
    }))
  }

  fn put(&self, path: &str, res: &HttpResponse) -> Result<(), ShellError> {
    let asset = StoredAsset {
      url: path.to_string(),
      status: res.status,
      headers: res.headers.clone(),
      body_hex: hex::encode(&res.body),
    };
    let bytes = serde_json::to_vec(&asset).map_err(StoreError::from)?;
    self.kv.set(&self.namespace, &asset_key(path), &bytes)?;
    Ok(())
  }
}

/// Path and query of an http(s) URL or a root-relative path. `None` for
/// other schemes.
fn request_path(url: &str) -> Option<String> {
  if url.starts_with('/') {
    return Some(url.to_string());
  }
  let parsed = Url::parse(url).ok()?;
  if !matches!(parsed.scheme(), "http" | "https") {
    return None;
  }
  let mut path = parsed.path().to_string();
  if let Some(query) = parsed.query() {
    path.push('?');
    path.push_str(query);
  }
  Some(path)
}

/// Fixed-length storage key for a request path.
fn asset_key(path: &str) -> String {
  let mut hasher = Sha256::new();
  hasher.update(path.as_bytes());
  hex::encode(hasher.finalize())
}
