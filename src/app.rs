use crate::connectivity::{ConnectivityMonitor, ConnectivityProbe};
use crate::event::{Event, EventHandler};
use crate::http::Transport;
use crate::sync::{SubscriptionId, SyncEngine, SyncStatus};
use crate::ui::{self, Banner, BannerState};
use color_eyre::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use ratatui::prelude::*;
use ratatui::{TerminalOptions, Viewport};
use std::io::stdout;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{broadcast, mpsc};

/// State behind `ghs-sync watch`: one banner line kept in sync with the
/// connectivity monitor and the engine's status broadcasts.
pub struct App<T, P> {
  engine: Arc<SyncEngine<T>>,
  monitor: Arc<ConnectivityMonitor<P>>,

  online: bool,
  status: SyncStatus,
  queue_length: usize,
  banner: Banner,

  /// Event sender for async tasks
  event_tx: mpsc::UnboundedSender<Event>,

  /// Whether to quit
  should_quit: bool,
}

impl<T: Transport, P: ConnectivityProbe> App<T, P> {
  /// `event_tx` is where background tasks report back; normally
  /// [`EventHandler::sender`] of the handler later passed to [`App::run`].
  pub fn new(
    engine: Arc<SyncEngine<T>>,
    monitor: Arc<ConnectivityMonitor<P>>,
    event_tx: mpsc::UnboundedSender<Event>,
  ) -> Result<Self> {
    let queue_length = engine.store().queue_length()?;
    let online = monitor.is_online();

    let mut app = Self {
      engine,
      monitor,
      online,
      status: SyncStatus::Idle,
      queue_length,
      banner: Banner::default(),
      event_tx,
      should_quit: false,
    };
    app.refresh_banner();
    Ok(app)
  }

  pub fn banner(&self) -> &Banner {
    &self.banner
  }

  pub fn should_quit(&self) -> bool {
    self.should_quit
  }

  pub async fn run(&mut self, mut events: EventHandler) -> Result<()> {
    // Setup terminal: a single inline line rather than a full screen
    enable_raw_mode()?;
    let mut terminal = Terminal::with_options(
      CrosstermBackend::new(stdout()),
      TerminalOptions {
        viewport: Viewport::Inline(1),
      },
    )?;

    let subscription = self.wire_sources();

    // Check where we stand, then flush anything left from last time
    self.spawn_startup();

    let result = self.event_loop(&mut terminal, &mut events).await;

    self.engine.status().unsubscribe(subscription);

    // Cleanup terminal
    terminal.clear()?;
    disable_raw_mode()?;

    result
  }

  async fn event_loop<B: Backend>(
    &mut self,
    terminal: &mut Terminal<B>,
    events: &mut EventHandler,
  ) -> Result<()> {
    while !self.should_quit() {
      terminal.draw(|frame| ui::draw(frame, self.banner(), Instant::now()))?;

      match events.next().await {
        Some(event) => self.handle_event(event),
        None => break,
      }
    }
    Ok(())
  }

  /// Route engine status and monitor signals into the event channel.
  fn wire_sources(&self) -> SubscriptionId {
    let tx = self.event_tx.clone();
    let subscription = self.engine.status().subscribe(move |status, queue_length| {
      let _ = tx.send(Event::Sync {
        status,
        queue_length,
      });
    });

    let tx = self.event_tx.clone();
    let mut recovered = self.monitor.subscribe_recovered();
    tokio::spawn(async move {
      loop {
        match recovered.recv().await {
          Ok(event) => {
            tracing::debug!(at = %event.at, "connectivity recovered");
            if tx.send(Event::Recovered).is_err() {
              break;
            }
          }
          // A lagged receiver still means at least one recovery happened
          Err(broadcast::error::RecvError::Lagged(_)) => {
            if tx.send(Event::Recovered).is_err() {
              break;
            }
          }
          Err(broadcast::error::RecvError::Closed) => break,
        }
      }
    });

    let tx = self.event_tx.clone();
    let mut state = self.monitor.subscribe_state();
    tokio::spawn(async move {
      while state.changed().await.is_ok() {
        let current = *state.borrow_and_update();
        if tx.send(Event::Connectivity(current)).is_err() {
          break;
        }
      }
    });

    subscription
  }

  fn spawn_startup(&self) {
    let engine = Arc::clone(&self.engine);
    let monitor = Arc::clone(&self.monitor);
    let tx = self.event_tx.clone();

    tokio::spawn(async move {
      if monitor.probe().await.is_online() {
        replay(&engine, &tx).await;
      }
    });
  }

  fn spawn_probe(&self) {
    let monitor = Arc::clone(&self.monitor);
    tokio::spawn(async move {
      monitor.probe().await;
    });
  }

  fn spawn_replay(&self) {
    let engine = Arc::clone(&self.engine);
    let tx = self.event_tx.clone();
    tokio::spawn(async move {
      replay(&engine, &tx).await;
    });
  }

  pub fn handle_event(&mut self, event: Event) {
    match event {
      Event::Key(key) => self.handle_key(key),
      Event::Render => {} // redraw happens in the loop
      Event::Tick => self.spawn_probe(),
      Event::Recovered => {
        tracing::info!("connectivity recovered, replaying queue");
        self.spawn_replay();
      }
      Event::Connectivity(state) => {
        self.online = state.is_online();
        self.refresh_banner();
      }
      Event::Sync {
        status,
        queue_length,
      } => {
        self.status = status;
        self.queue_length = queue_length;
        self.refresh_banner();
      }
      Event::Replayed(report) => {
        if !report.skipped {
          self.queue_length = report.remaining;
          self.refresh_banner();
        }
      }
      Event::Error(msg) => {
        tracing::warn!(error = %msg, "background task failed");
      }
    }
  }

  fn handle_key(&mut self, key: KeyEvent) {
    match key.code {
      KeyCode::Char('q') | KeyCode::Esc => self.should_quit = true,
      KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
        self.should_quit = true;
      }
      KeyCode::Char('r') => self.spawn_replay(),
      KeyCode::Char('p') => self.spawn_probe(),
      _ => {}
    }
  }

  fn refresh_banner(&mut self) {
    let state = BannerState::from_parts(self.online, self.status, self.queue_length);
    self.banner.update(state, Instant::now());
  }
}

async fn replay<T: Transport>(engine: &SyncEngine<T>, tx: &mpsc::UnboundedSender<Event>) {
  let event = match engine.replay_queue().await {
    Ok(report) => Event::Replayed(report),
    Err(e) => Event::Error(e.to_string()),
  };
  let _ = tx.send(event);
}
