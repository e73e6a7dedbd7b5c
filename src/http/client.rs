use std::future::Future;
use std::time::Duration;

use color_eyre::{eyre::eyre, Result};
use url::Url;

use super::types::{HttpRequest, HttpResponse, Method, TransportError};

/// Sends requests and reports whether any response came back at all.
///
/// Implementations decide transport failure vs. application failure exactly
/// once: any received response is `Ok`, whatever its status.
pub trait Transport: Send + Sync + 'static {
  fn send(&self, request: HttpRequest)
    -> impl Future<Output = Result<HttpResponse, TransportError>> + Send;
}

/// `reqwest`-backed transport resolving relative paths against a base URL.
#[derive(Clone)]
pub struct HttpClient {
  client: reqwest::Client,
  base_url: Url,
}

impl HttpClient {
  pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
    let base_url =
      Url::parse(base_url).map_err(|e| eyre!("Invalid server URL {}: {}", base_url, e))?;

    let client = reqwest::Client::builder()
      .timeout(timeout)
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self { client, base_url })
  }

  /// Resolve a request path (`/api/fences`) or absolute URL.
  pub fn resolve(&self, url: &str) -> Result<Url, TransportError> {
    self
      .base_url
      .join(url)
      .map_err(|e| TransportError::InvalidRequest {
        url: url.to_string(),
        reason: e.to_string(),
      })
  }
}

fn to_reqwest_method(method: Method) -> reqwest::Method {
  match method {
    Method::Get => reqwest::Method::GET,
    Method::Head => reqwest::Method::HEAD,
    Method::Post => reqwest::Method::POST,
    Method::Patch => reqwest::Method::PATCH,
    Method::Delete => reqwest::Method::DELETE,
  }
}

fn classify(url: &str, err: reqwest::Error) -> TransportError {
  if err.is_timeout() {
    TransportError::Timeout {
      url: url.to_string(),
    }
  } else if err.is_builder() {
    TransportError::InvalidRequest {
      url: url.to_string(),
      reason: err.to_string(),
    }
  } else {
    TransportError::Unreachable {
      url: url.to_string(),
      reason: err.to_string(),
    }
  }
}

impl Transport for HttpClient {
  async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
    let target = self.resolve(&request.url)?;

    let mut builder = self
      .client
      .request(to_reqwest_method(request.method), target);
    for (name, value) in &request.headers {
      builder = builder.header(name.as_str(), value.as_str());
    }
    if let Some(body) = request.body {
      builder = builder.body(body);
    }

    let response = builder.send().await.map_err(|e| classify(&request.url, e))?;

    let status = response.status().as_u16();
    let headers = response
      .headers()
      .iter()
      .filter_map(|(k, v)| v.to_str().ok().map(|v| (k.as_str().to_string(), v.to_string())))
      .collect();

    // The status line made it, so the server has seen the request even if
    // the body is lost on the way back.
    let body = match response.bytes().await {
      Ok(body) => body,
      Err(e) if e.is_timeout() => return Err(classify(&request.url, e)),
      Err(e) => {
        return Err(TransportError::Incomplete {
          url: request.url.clone(),
          status,
          reason: e.to_string(),
        })
      }
    };

    tracing::debug!(method = %request.method, url = %request.url, status, "response received");

    Ok(HttpResponse {
      status,
      headers,
      body: body.to_vec(),
      origin: super::types::ResponseOrigin::Server,
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_resolve_relative_paths() {
    let client = HttpClient::new("http://localhost:3000", Duration::from_secs(1)).unwrap();
    assert_eq!(
      client.resolve("/api/fences").unwrap().as_str(),
      "http://localhost:3000/api/fences"
    );
    assert_eq!(
      client.resolve("https://other.example/x").unwrap().as_str(),
      "https://other.example/x"
    );
  }

  #[test]
  fn test_rejects_bad_base_url() {
    assert!(HttpClient::new("not a url", Duration::from_secs(1)).is_err());
  }

  /// Accept one connection, read the request through `body`, answer with the
  /// raw `response` bytes and hang up.
  async fn serve_once(response: &'static str, body: &'static str) -> String {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
      let (mut socket, _) = listener.accept().await.unwrap();
      let mut received = Vec::new();
      let mut buf = [0u8; 1024];
      while !received.ends_with(body.as_bytes()) {
        let n = socket.read(&mut buf).await.unwrap();
        if n == 0 {
          break;
        }
        received.extend_from_slice(&buf[..n]);
      }
      socket.write_all(response.as_bytes()).await.unwrap();
      socket.shutdown().await.unwrap();
    });

    format!("http://{}", addr)
  }

  #[tokio::test]
  async fn test_full_response_is_returned() {
    let base = serve_once(
      "HTTP/1.1 201 Created\r\nContent-Length: 8\r\nConnection: close\r\n\r\n{\"id\":1}",
      r#"{"name":"x"}"#,
    )
    .await;
    let client = HttpClient::new(&base, Duration::from_secs(5)).unwrap();

    let res = client
      .send(HttpRequest::new(Method::Post, "/api/fences").body(r#"{"name":"x"}"#))
      .await
      .unwrap();
    assert_eq!(res.status, 201);
    assert_eq!(res.text(), r#"{"id":1}"#);
  }

  #[tokio::test]
  async fn test_cut_off_body_is_not_a_network_failure() {
    let base = serve_once(
      "HTTP/1.1 201 Created\r\nContent-Length: 100\r\n\r\nabc",
      r#"{"name":"x"}"#,
    )
    .await;
    let client = HttpClient::new(&base, Duration::from_secs(5)).unwrap();

    let err = client
      .send(HttpRequest::new(Method::Post, "/api/fences").body(r#"{"name":"x"}"#))
      .await
      .unwrap_err();
    assert!(!err.is_network(), "{:?}", err);
    assert_eq!(err.received_status(), Some(201));
  }

  #[tokio::test]
  async fn test_unreachable_host_is_transport_failure() {
    // Port 9 on localhost: nothing listens there in the test environment.
    let client = HttpClient::new("http://127.0.0.1:9", Duration::from_secs(2)).unwrap();
    let err = client.send(HttpRequest::get("/api/health")).await.unwrap_err();
    assert!(err.is_network());
  }
}
