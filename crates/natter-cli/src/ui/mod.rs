//! TUI rendering: orchestrates all panes.

pub mod message_list;

use chrono::Local;
use natter_core::MessageStore;
use ratatui::{
  Frame,
  layout::{Constraint, Direction, Layout, Rect},
  style::{Color, Modifier, Style},
  text::{Line, Span},
  widgets::{Block, Borders, Paragraph},
};

use crate::app::App;

// ─── Root draw ────────────────────────────────────────────────────────────────

/// Main draw function called each frame.
pub fn draw<S: MessageStore + 'static>(f: &mut Frame, app: &App<S>) {
  let area = f.area();

  // Vertical stack: header, messages, input, status bar.
  let rows = Layout::default()
    .direction(Direction::Vertical)
    .constraints([
      Constraint::Length(1), // header
      Constraint::Min(0),    // messages
      Constraint::Length(3), // input
      Constraint::Length(1), // status bar
    ])
    .split(area);

  draw_header(f, rows[0], app);
  message_list::draw(f, rows[1], app);
  draw_input(f, rows[2], app);
  draw_status(f, rows[3], app);
}

// ─── Header ───────────────────────────────────────────────────────────────────

fn draw_header<S: MessageStore + 'static>(f: &mut Frame, area: Rect, app: &App<S>) {
  let date = Local::now().format("%Y-%m-%d").to_string();

  let left = Span::styled(
    format!(" natter — connected as {}", app.name),
    Style::default()
      .fg(Color::White)
      .add_modifier(Modifier::BOLD),
  );
  let right = Span::styled(
    format!("{date} "),
    Style::default().fg(Color::Gray),
  );

  let left_width = left.width() as u16;
  let right_width = right.width() as u16;
  let pad = area
    .width
    .saturating_sub(left_width)
    .saturating_sub(right_width);

  let line = Line::from(vec![
    left,
    Span::raw(" ".repeat(pad as usize)),
    right,
  ]);

  let block = Block::default().style(Style::default().bg(Color::DarkGray));
  let inner = block.inner(area);
  f.render_widget(block, area);
  f.render_widget(Paragraph::new(line), inner);
}

// ─── Input ────────────────────────────────────────────────────────────────────

fn draw_input<S: MessageStore + 'static>(f: &mut Frame, area: Rect, app: &App<S>) {
  let block = Block::default()
    .title(" Message ")
    .borders(Borders::ALL)
    .border_style(Style::default().fg(Color::Cyan));
  let inner = block.inner(area);
  f.render_widget(block, area);
  f.render_widget(Paragraph::new(format!("{}_", app.input)), inner);
}

// ─── Status bar ───────────────────────────────────────────────────────────────

fn draw_status<S: MessageStore + 'static>(f: &mut Frame, area: Rect, app: &App<S>) {
  let snapshot = &app.snapshot;
  let counts = format!(
    " {} messages  {} pending  cursor {} ",
    snapshot.len(),
    snapshot.pending(),
    app.cursor(),
  );

  let status = if app.status_msg.is_empty() {
    "Enter send  Esc quit".to_string()
  } else {
    app.status_msg.clone()
  };

  let counts_span = Span::styled(
    counts,
    Style::default()
      .fg(Color::Black)
      .bg(Color::Cyan)
      .add_modifier(Modifier::BOLD),
  );
  let hint_span = Span::styled(
    format!("  {status}"),
    Style::default().fg(Color::DarkGray),
  );

  let line = Line::from(vec![counts_span, hint_span]);
  f.render_widget(
    Paragraph::new(line).style(Style::default().bg(Color::Black)),
    area,
  );
}
