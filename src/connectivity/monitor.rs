use chrono::{DateTime, Utc};
use std::time::Duration;
use tokio::sync::{broadcast, watch};

use super::probe::ConnectivityProbe;

/// Current connectivity belief.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Connectivity {
  Online,
  Offline,
}

impl Connectivity {
  pub fn from_online(online: bool) -> Self {
    if online {
      Connectivity::Online
    } else {
      Connectivity::Offline
    }
  }

  pub fn is_online(&self) -> bool {
    matches!(self, Connectivity::Online)
  }
}

/// Emitted once for every Offline -> Online transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Recovered {
  pub at: DateTime<Utc>,
}

/// What moved the state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Signal {
  Platform,
  Probe,
}

/// Online/offline state machine fed by passive signals and an active probe.
pub struct ConnectivityMonitor<P> {
  probe: P,
  probe_timeout: Duration,
  state: watch::Sender<Connectivity>,
  recovered: broadcast::Sender<Recovered>,
}

impl<P: ConnectivityProbe> ConnectivityMonitor<P> {
  pub fn new(probe: P, initial: Connectivity, probe_timeout: Duration) -> Self {
    let (state, _) = watch::channel(initial);
    let (recovered, _) = broadcast::channel(16);
    Self {
      probe,
      probe_timeout,
      state,
      recovered,
    }
  }

  pub fn state(&self) -> Connectivity {
    *self.state.borrow()
  }

  pub fn is_online(&self) -> bool {
    self.state().is_online()
  }

  /// Follow the connectivity state.
  pub fn subscribe_state(&self) -> watch::Receiver<Connectivity> {
    self.state.subscribe()
  }

  /// Receive one event per Offline -> Online transition from now on.
  pub fn subscribe_recovered(&self) -> broadcast::Receiver<Recovered> {
    self.recovered.subscribe()
  }

  /// The platform reports the network became reachable.
  pub fn platform_online(&self) {
    self.transition(Connectivity::Online, Signal::Platform);
  }

  /// The platform reports the network became unreachable.
  pub fn platform_offline(&self) {
    self.transition(Connectivity::Offline, Signal::Platform);
  }

  /// Run the active probe. A probe that does not finish within the timeout
  /// counts as offline.
  pub async fn probe(&self) -> Connectivity {
    let online = match tokio::time::timeout(self.probe_timeout, self.probe.check()).await {
      Ok(online) => online,
      Err(_) => {
        tracing::debug!(timeout_ms = self.probe_timeout.as_millis() as u64, "connectivity probe timed out");
        false
      }
    };
    let next = Connectivity::from_online(online);
    self.transition(next, Signal::Probe);
    next
  }

  fn transition(&self, next: Connectivity, signal: Signal) {
    // Atomic swap: concurrent callers see exactly one Offline -> Online edge.
    let previous = self.state.send_replace(next);
    if previous == next {
      return;
    }

    tracing::info!(?previous, ?next, ?signal, "connectivity changed");

    if previous == Connectivity::Offline && next == Connectivity::Online {
      // No receivers is fine; nobody is waiting to replay.
      let _ = self.recovered.send(Recovered { at: Utc::now() });
    }
  }
}
