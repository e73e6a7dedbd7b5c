use std::future::Future;

use crate::http::{HttpRequest, Method, Transport};

/// Active reachability check.
pub trait ConnectivityProbe: Send + Sync + 'static {
  /// `true` when the backend answered with success. Must not be relied on to
  /// return promptly; the monitor bounds it with a timeout.
  fn check(&self) -> impl Future<Output = bool> + Send;
}

/// HEAD request against the backend's health endpoint, bypassing caches.
/// The response body is ignored.
pub struct HealthProbe<T> {
  transport: T,
  health_path: String,
}

impl<T: Transport> HealthProbe<T> {
  pub fn new(transport: T, health_path: impl Into<String>) -> Self {
    Self {
      transport,
      health_path: health_path.into(),
    }
  }
}

impl<T: Transport> ConnectivityProbe for HealthProbe<T> {
  async fn check(&self) -> bool {
    let request = HttpRequest::new(Method::Head, self.health_path.clone()).no_cache();
    match self.transport.send(request).await {
      Ok(res) => {
        tracing::debug!(status = res.status, "health probe answered");
        res.is_success()
      }
      Err(e) => {
        tracing::debug!(error = %e, "health probe failed");
        false
      }
    }
  }
}
