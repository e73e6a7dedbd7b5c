use thiserror::Error;

use crate::http::TransportError;
use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum SyncError {
  /// Neither the network nor the local cache could serve the read.
  #[error("offline and no cached data for {url}")]
  OfflineNoCache { url: String },

  /// The server answered with a non-success status.
  #[error("{url} responded with HTTP {status}")]
  Application {
    url: String,
    status: u16,
    body: String,
  },

  #[error("response from {url} is not valid JSON: {source}")]
  Decode {
    url: String,
    #[source]
    source: serde_json::Error,
  },

  /// A mutation body that cannot be stored as JSON for later replay.
  #[error("mutation body for {url} is not valid JSON: {source}")]
  InvalidBody {
    url: String,
    #[source]
    source: serde_json::Error,
  },

  #[error(transparent)]
  Transport(#[from] TransportError),

  #[error(transparent)]
  Store(#[from] StoreError),
}

impl SyncError {
  pub fn is_offline_no_cache(&self) -> bool {
    matches!(self, SyncError::OfflineNoCache { .. })
  }

  /// The HTTP status, whenever the server answered at all.
  pub fn status(&self) -> Option<u16> {
    match self {
      SyncError::Application { status, .. } => Some(*status),
      SyncError::Transport(e) => e.received_status(),
      _ => None,
    }
  }
}
