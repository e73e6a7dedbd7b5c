//! The sync engine: cached reads, queued writes, ordered replay.
//!
//! Reads go to the network first and fall back to the response cache only on
//! transport failure. Writes that cannot reach the server are persisted to
//! the mutation queue and answered with a synthetic `202 {"queued":true}`.
//! When connectivity returns the queue is replayed oldest first.

mod engine;
mod error;
mod status;

pub use engine::{MutationRequest, ReplayReport, SyncEngine, DEFAULT_MAX_RETRIES};
pub use error::SyncError;
pub use status::{StatusBroadcaster, SubscriptionId, SyncStatus};
