mod banner;

pub use banner::{draw_banner, Banner, BannerState};

use ratatui::prelude::*;
use std::time::Instant;

/// Main draw function
pub fn draw(frame: &mut Frame, banner: &Banner, now: Instant) {
  let area = frame.area();
  draw_banner(frame, area, banner, now);
}
