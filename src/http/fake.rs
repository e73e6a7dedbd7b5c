//! Scripted in-process transport for tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::client::Transport;
use super::types::{HttpRequest, HttpResponse, Method, TransportError};

type Route = Box<dyn Fn(&HttpRequest) -> Result<HttpResponse, TransportError> + Send + Sync>;

#[derive(Default)]
struct FakeInner {
  offline: bool,
  delay: Option<Duration>,
  routes: HashMap<(Method, String), Route>,
  sent: Vec<HttpRequest>,
}

/// Transport that answers from registered routes and records every request.
///
/// Unrouted requests get a 404. While offline every request fails with
/// [`TransportError::Unreachable`] (and is still recorded as attempted).
#[derive(Clone, Default)]
pub struct FakeTransport {
  inner: Arc<Mutex<FakeInner>>,
}

impl FakeTransport {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn set_offline(&self, offline: bool) {
    self.inner.lock().unwrap().offline = offline;
  }

  pub fn set_delay(&self, delay: Duration) {
    self.inner.lock().unwrap().delay = Some(delay);
  }

  pub fn route<F>(&self, method: Method, url: &str, f: F)
  where
    F: Fn(&HttpRequest) -> Result<HttpResponse, TransportError> + Send + Sync + 'static,
  {
    self
      .inner
      .lock()
      .unwrap()
      .routes
      .insert((method, url.to_string()), Box::new(f));
  }

  pub fn respond(&self, method: Method, url: &str, status: u16, body: serde_json::Value) {
    self.route(method, url, move |_| Ok(HttpResponse::json_body(status, &body)));
  }

  pub fn sent(&self) -> Vec<HttpRequest> {
    self.inner.lock().unwrap().sent.clone()
  }

  pub fn sent_count(&self) -> usize {
    self.inner.lock().unwrap().sent.len()
  }
}

impl Transport for FakeTransport {
  async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
    let delay = self.inner.lock().unwrap().delay;
    if let Some(delay) = delay {
      tokio::time::sleep(delay).await;
    }

    let mut inner = self.inner.lock().unwrap();
    inner.sent.push(request.clone());

    if inner.offline {
      return Err(TransportError::Unreachable {
        url: request.url.clone(),
        reason: "network down".into(),
      });
    }

    match inner.routes.get(&(request.method, request.url.clone())) {
      Some(route) => route(&request),
      None => Ok(HttpResponse::new(404, "not found")),
    }
  }
}
