use crossterm::event::{self, Event as CrosstermEvent, KeyEvent};
use std::time::Duration;
use tokio::sync::mpsc;

use crate::connectivity::Connectivity;
use crate::sync::{ReplayReport, SyncStatus};

/// Input poll window; also bounds how late a banner change is drawn
pub const POLL_RATE: Duration = Duration::from_millis(250);

/// Events driving the `watch` loop
#[derive(Debug)]
pub enum Event {
  /// Terminal key press
  Key(KeyEvent),
  /// Input poll window elapsed; redraw so timed banner changes show
  Render,
  /// Periodic tick; triggers a connectivity probe
  Tick,
  /// Connectivity came back after being lost
  Recovered,
  /// Connectivity belief changed
  Connectivity(Connectivity),
  /// Sync status broadcast from the engine
  Sync {
    status: SyncStatus,
    queue_length: usize,
  },
  /// A replay pass finished
  Replayed(ReplayReport),
  /// Background task failure, logged
  Error(String),
}

/// Event handler that produces events from terminal input and a tick timer
pub struct EventHandler {
  tx: mpsc::UnboundedSender<Event>,
  rx: mpsc::UnboundedReceiver<Event>,
}

impl EventHandler {
  /// Create a new event handler. Input is polled every `poll_rate` (with an
  /// [`Event::Render`] when nothing arrived); a [`Event::Tick`] is emitted
  /// every `tick_rate`.
  pub fn new(poll_rate: Duration, tick_rate: Duration) -> Self {
    let (tx, rx) = mpsc::unbounded_channel();

    // crossterm polling blocks, so keep it off the async workers
    let input_tx = tx.clone();
    tokio::task::spawn_blocking(move || {
      while !input_tx.is_closed() {
        let evt = if event::poll(poll_rate).unwrap_or(false) {
          match event::read() {
            Ok(CrosstermEvent::Key(key)) => Event::Key(key),
            _ => continue,
          }
        } else {
          Event::Render
        };
        if input_tx.send(evt).is_err() {
          break;
        }
      }
    });

    let tick_tx = tx.clone();
    tokio::spawn(async move {
      let mut interval = tokio::time::interval(tick_rate);
      interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
      // The first tick fires immediately; the caller probes at startup anyway
      interval.tick().await;
      loop {
        interval.tick().await;
        if tick_tx.send(Event::Tick).is_err() {
          break;
        }
      }
    });

    Self { tx, rx }
  }

  /// Sender for background tasks to report back on
  pub fn sender(&self) -> mpsc::UnboundedSender<Event> {
    self.tx.clone()
  }

  /// Receive the next event
  pub async fn next(&mut self) -> Option<Event> {
    self.rx.recv().await
  }
}
