use serde::de::DeserializeOwned;
use std::fmt;
use thiserror::Error;

use crate::store::MutationMethod;

/// Status code of the locally fabricated "queued" response.
pub const QUEUED_STATUS: u16 = 202;

/// Body of the locally fabricated "queued" response.
pub const QUEUED_BODY: &str = r#"{"queued":true}"#;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
  Get,
  Head,
  Post,
  Patch,
  Delete,
}

impl Method {
  pub fn as_str(&self) -> &'static str {
    match self {
      Method::Get => "GET",
      Method::Head => "HEAD",
      Method::Post => "POST",
      Method::Patch => "PATCH",
      Method::Delete => "DELETE",
    }
  }
}

impl fmt::Display for Method {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl From<MutationMethod> for Method {
  fn from(m: MutationMethod) -> Self {
    match m {
      MutationMethod::Post => Method::Post,
      MutationMethod::Patch => Method::Patch,
      MutationMethod::Delete => Method::Delete,
    }
  }
}

/// An outgoing request. `url` may be relative to the transport's base URL.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
  pub method: Method,
  pub url: String,
  pub headers: Vec<(String, String)>,
  pub body: Option<String>,
}

impl HttpRequest {
  pub fn new(method: Method, url: impl Into<String>) -> Self {
    Self {
      method,
      url: url.into(),
      headers: Vec::new(),
      body: None,
    }
  }

  pub fn get(url: impl Into<String>) -> Self {
    Self::new(Method::Get, url)
  }

  pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
    self.headers.push((name.into(), value.into()));
    self
  }

  /// Ask every cache between us and the origin to stay out of the way.
  pub fn no_cache(self) -> Self {
    self
      .header("Cache-Control", "no-cache, no-store")
      .header("Pragma", "no-cache")
  }

  pub fn body(mut self, body: impl Into<String>) -> Self {
    self.body = Some(body.into());
    self
  }
}

/// Where a response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseOrigin {
  /// The server answered
  Server,
  /// Fabricated locally after the request was queued
  Queued,
  /// Fabricated locally by the shell cache
  Local,
}

/// A received (or fabricated) response.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
  pub status: u16,
  pub headers: Vec<(String, String)>,
  pub body: Vec<u8>,
  pub origin: ResponseOrigin,
}

impl HttpResponse {
  pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
    Self {
      status,
      headers: Vec::new(),
      body: body.into(),
      origin: ResponseOrigin::Server,
    }
  }

  #[cfg(test)]
  pub fn json_body(status: u16, value: &serde_json::Value) -> Self {
    Self::new(status, value.to_string()).with_header("Content-Type", "application/json")
  }

  /// The sentinel returned when a mutation was accepted into the local queue.
  pub fn queued() -> Self {
    Self {
      origin: ResponseOrigin::Queued,
      ..Self::new(QUEUED_STATUS, QUEUED_BODY).with_header("Content-Type", "application/json")
    }
  }

  pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
    self.headers.push((name.into(), value.into()));
    self
  }

  pub fn is_success(&self) -> bool {
    (200..300).contains(&self.status)
  }

  /// True when this response was fabricated because the request was queued.
  pub fn is_queued(&self) -> bool {
    self.origin == ResponseOrigin::Queued
  }

  #[cfg(test)]
  pub fn header_value(&self, name: &str) -> Option<&str> {
    self
      .headers
      .iter()
      .find(|(k, _)| k.eq_ignore_ascii_case(name))
      .map(|(_, v)| v.as_str())
  }

  pub fn json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
    serde_json::from_slice(&self.body)
  }

  pub fn text(&self) -> String {
    String::from_utf8_lossy(&self.body).into_owned()
  }
}

/// The request never produced a response.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
  #[error("request to {url} timed out")]
  Timeout { url: String },
  #[error("could not reach {url}: {reason}")]
  Unreachable { url: String, reason: String },
  /// The request could not even be built; not a connectivity problem.
  #[error("invalid request for {url}: {reason}")]
  InvalidRequest { url: String, reason: String },
  /// Status and headers arrived but the body was cut off. The server saw
  /// the request, so a write must not be sent again.
  #[error("response from {url} ({status}) was cut off: {reason}")]
  Incomplete {
    url: String,
    status: u16,
    reason: String,
  },
}

impl TransportError {
  /// Whether this failure means the server was never reached.
  pub fn is_network(&self) -> bool {
    matches!(
      self,
      TransportError::Timeout { .. } | TransportError::Unreachable { .. }
    )
  }

  /// Whether a read may be answered from the cache instead. A cut-off body
  /// is as useless to a reader as no response at all.
  pub fn allows_cache_fallback(&self) -> bool {
    self.is_network() || matches!(self, TransportError::Incomplete { .. })
  }

  /// Status line of a response whose body never fully arrived.
  pub fn received_status(&self) -> Option<u16> {
    match self {
      TransportError::Incomplete { status, .. } => Some(*status),
      _ => None,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::{json, Value};

  #[test]
  fn test_queued_sentinel() {
    let res = HttpResponse::queued();
    assert_eq!(res.status, 202);
    assert!(res.is_queued());
    assert!(res.is_success());
    assert_eq!(res.json::<Value>().unwrap(), json!({"queued": true}));
    assert_eq!(res.header_value("content-type"), Some("application/json"));
  }

  #[test]
  fn test_server_202_is_not_queued() {
    let res = HttpResponse::json_body(202, &json!({"queued": true}));
    assert!(!res.is_queued());
  }

  #[test]
  fn test_invalid_request_is_not_network() {
    let err = TransportError::InvalidRequest {
      url: "::".into(),
      reason: "bad".into(),
    };
    assert!(!err.is_network());
    assert!(TransportError::Timeout { url: "/".into() }.is_network());
  }

  #[test]
  fn test_cut_off_body_reached_server() {
    let err = TransportError::Incomplete {
      url: "/api/fences".into(),
      status: 201,
      reason: "connection closed".into(),
    };
    assert!(!err.is_network());
    assert!(err.allows_cache_fallback());
    assert_eq!(err.received_status(), Some(201));
    assert_eq!(TransportError::Timeout { url: "/".into() }.received_status(), None);
  }
}
