//! Online/offline detection.
//!
//! Passive signals move the state directly. In this client they come from
//! ordinary traffic through [`SignalingTransport`]. An active probe against
//! the health endpoint corrects them when they are wrong (connected to a
//! network with no real egress, for instance).

mod monitor;
mod probe;
mod signal;

pub use monitor::{Connectivity, ConnectivityMonitor};
pub use probe::{ConnectivityProbe, HealthProbe};
pub use signal::SignalingTransport;
