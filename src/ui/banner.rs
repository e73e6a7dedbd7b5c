use ratatui::prelude::*;
use ratatui::widgets::Paragraph;
use std::time::{Duration, Instant};

use crate::sync::SyncStatus;

/// How long the "all synced" banner stays up after everything settled.
pub const SYNCED_LINGER: Duration = Duration::from_secs(2);

/// What the connection banner says.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BannerState {
  Offline { queued: usize },
  Syncing { queued: usize },
  Pending { queued: usize },
  Synced,
}

impl BannerState {
  pub fn from_parts(online: bool, status: SyncStatus, queued: usize) -> Self {
    if !online {
      BannerState::Offline { queued }
    } else if status == SyncStatus::Syncing {
      BannerState::Syncing { queued }
    } else if queued > 0 {
      BannerState::Pending { queued }
    } else {
      BannerState::Synced
    }
  }

  pub fn needs_attention(&self) -> bool {
    !matches!(self, BannerState::Synced)
  }

  pub fn text(&self) -> String {
    match *self {
      BannerState::Offline { queued: 0 } => "Offline - changes are saved locally".to_string(),
      BannerState::Offline { queued } => format!("Offline - {} waiting", changes(queued)),
      BannerState::Syncing { queued } => format!("Syncing {}...", changes(queued)),
      BannerState::Pending { queued } => format!("{} to sync", changes(queued)),
      BannerState::Synced => "Online - all synced".to_string(),
    }
  }

  pub fn icon(&self) -> &'static str {
    match self {
      BannerState::Offline { .. } => "📡",
      BannerState::Syncing { .. } => "🔄",
      BannerState::Pending { .. } => "⏳",
      BannerState::Synced => "✅",
    }
  }

  pub fn color(&self) -> Color {
    match self {
      BannerState::Offline { .. } => Color::Red,
      BannerState::Syncing { .. } | BannerState::Pending { .. } => Color::Yellow,
      BannerState::Synced => Color::Green,
    }
  }
}

fn changes(n: usize) -> String {
  if n == 1 {
    "1 change".to_string()
  } else {
    format!("{} changes", n)
  }
}

/// Banner visibility: shown while anything needs attention, then kept up
/// briefly once everything is synced.
#[derive(Debug, Clone)]
pub struct Banner {
  state: BannerState,
  shown: bool,
  hide_at: Option<Instant>,
}

impl Default for Banner {
  fn default() -> Self {
    Self {
      state: BannerState::Synced,
      shown: false,
      hide_at: None,
    }
  }
}

impl Banner {
  pub fn state(&self) -> BannerState {
    self.state
  }

  pub fn update(&mut self, state: BannerState, now: Instant) {
    self.state = state;
    if state.needs_attention() {
      self.shown = true;
      self.hide_at = None;
    } else if self.shown && self.hide_at.is_none() {
      self.hide_at = Some(now + SYNCED_LINGER);
    }
  }

  pub fn is_visible(&self, now: Instant) -> bool {
    self.shown && self.hide_at.map_or(true, |at| now < at)
  }
}

/// Draw the one-line connection banner.
pub fn draw_banner(frame: &mut Frame, area: Rect, banner: &Banner, now: Instant) {
  if !banner.is_visible(now) {
    frame.render_widget(Paragraph::new(""), area);
    return;
  }

  let state = banner.state();
  let line = Line::from(vec![
    Span::raw(format!(" {} ", state.icon())),
    Span::styled(state.text(), Style::default().fg(Color::White).bold()),
  ]);

  let paragraph = Paragraph::new(line)
    .alignment(Alignment::Center)
    .style(Style::default().bg(state.color()));
  frame.render_widget(paragraph, area);
}
