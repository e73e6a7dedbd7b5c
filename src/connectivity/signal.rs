use std::sync::Arc;

use crate::http::{HttpRequest, HttpResponse, Transport, TransportError};

use super::monitor::ConnectivityMonitor;
use super::probe::ConnectivityProbe;

/// Receiver of passive reachability observations.
pub trait PlatformSignals: Send + Sync + 'static {
  fn platform_online(&self);
  fn platform_offline(&self);
}

impl<P: ConnectivityProbe> PlatformSignals for ConnectivityMonitor<P> {
  fn platform_online(&self) {
    ConnectivityMonitor::platform_online(self);
  }

  fn platform_offline(&self) {
    ConnectivityMonitor::platform_offline(self);
  }
}

/// Transport that reports the outcome of ordinary traffic as a passive
/// signal: any answer from the server means online, a request that never
/// got one means offline.
#[derive(Clone)]
pub struct SignalingTransport<T> {
  inner: T,
  signals: Arc<dyn PlatformSignals>,
}

impl<T: Transport> SignalingTransport<T> {
  pub fn new(inner: T, signals: Arc<dyn PlatformSignals>) -> Self {
    Self { inner, signals }
  }
}

impl<T: Transport> Transport for SignalingTransport<T> {
  async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
    let result = self.inner.send(request).await;
    match &result {
      Ok(_) => self.signals.platform_online(),
      Err(e) if e.is_network() => self.signals.platform_offline(),
      Err(e) if e.received_status().is_some() => self.signals.platform_online(),
      // Never left the client; says nothing about the network.
      Err(_) => {}
    }
    result
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::connectivity::{Connectivity, HealthProbe};
  use crate::http::fake::FakeTransport;
  use crate::http::Method;
  use std::time::Duration;
  use tokio::sync::broadcast::error::TryRecvError;

  fn monitored(
    initial: Connectivity,
  ) -> (
    FakeTransport,
    Arc<ConnectivityMonitor<HealthProbe<FakeTransport>>>,
    SignalingTransport<FakeTransport>,
  ) {
    let fake = FakeTransport::new();
    let monitor = Arc::new(ConnectivityMonitor::new(
      HealthProbe::new(fake.clone(), "/api/health"),
      initial,
      Duration::from_secs(1),
    ));
    let transport = SignalingTransport::new(fake.clone(), monitor.clone());
    (fake, monitor, transport)
  }

  #[tokio::test]
  async fn test_any_answer_marks_online_and_recovers() {
    let (_fake, monitor, transport) = monitored(Connectivity::Offline);
    let mut recovered = monitor.subscribe_recovered();

    // Unrouted: a 404 is still an answer.
    let res = transport.send(HttpRequest::get("/api/fences")).await.unwrap();
    assert_eq!(res.status, 404);
    assert!(monitor.is_online());
    assert!(recovered.try_recv().is_ok());

    transport.send(HttpRequest::get("/api/fences")).await.unwrap();
    assert_eq!(recovered.try_recv(), Err(TryRecvError::Empty));
  }

  #[tokio::test]
  async fn test_network_failure_marks_offline() {
    let (fake, monitor, transport) = monitored(Connectivity::Online);
    fake.set_offline(true);

    assert!(transport.send(HttpRequest::get("/api/fences")).await.is_err());
    assert_eq!(monitor.state(), Connectivity::Offline);
  }

  #[tokio::test]
  async fn test_unsendable_request_leaves_state_alone() {
    let (fake, monitor, transport) = monitored(Connectivity::Offline);
    fake.route(Method::Post, "/api/images", |req| {
      Err(TransportError::InvalidRequest {
        url: req.url.clone(),
        reason: "bad header".into(),
      })
    });

    let request = HttpRequest::new(Method::Post, "/api/images");
    assert!(transport.send(request).await.is_err());
    assert_eq!(monitor.state(), Connectivity::Offline);
  }

  #[tokio::test]
  async fn test_cut_off_answer_counts_as_online() {
    let (fake, monitor, transport) = monitored(Connectivity::Offline);
    fake.route(Method::Post, "/api/fences", |req| {
      Err(TransportError::Incomplete {
        url: req.url.clone(),
        status: 201,
        reason: "connection closed".into(),
      })
    });

    let request = HttpRequest::new(Method::Post, "/api/fences");
    assert!(transport.send(request).await.is_err());
    assert!(monitor.is_online());
  }
}
