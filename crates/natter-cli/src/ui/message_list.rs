//! Message list pane.

use natter_core::{Message, MessageStore};
use ratatui::{
  Frame,
  layout::Rect,
  style::{Color, Modifier, Style},
  text::{Line, Span},
  widgets::{Block, Borders, List, ListItem, ListState},
};

use crate::app::App;

/// Render the conversation into `area`, scrolled to the newest message.
pub fn draw<S: MessageStore + 'static>(f: &mut Frame, area: Rect, app: &App<S>) {
  let snapshot = &app.snapshot;

  let block = Block::default()
    .title(format!(" Messages ({}) ", snapshot.len()))
    .borders(Borders::ALL)
    .border_style(Style::default().fg(Color::DarkGray));

  let items: Vec<ListItem> = snapshot
    .iter()
    .map(|message| item(message, message.author == app.name))
    .collect();

  // Selecting the last row keeps the list pinned to the bottom.
  let mut state = ListState::default();
  state.select(snapshot.len().checked_sub(1));

  f.render_stateful_widget(List::new(items).block(block), area, &mut state);
}

fn item(message: &Message, own: bool) -> ListItem<'static> {
  let author_style = if own {
    Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD)
  } else {
    Style::default().fg(Color::Yellow)
  };
  let body_style = Style::default();

  let mut spans = vec![
    Span::styled(format!("{}: ", message.author), author_style),
    Span::styled(message.body.clone(), body_style),
  ];

  if message.is_pending() {
    spans.push(Span::styled("  sending…", Style::default().fg(Color::DarkGray)));
    let dimmed = Style::default().add_modifier(Modifier::DIM);
    return ListItem::new(Line::from(spans)).style(dimmed);
  }

  ListItem::new(Line::from(spans))
}
