//! Application state and key dispatcher.

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use natter_core::{Cursor, MessageStore, NewMessage};
use natter_sync::{Snapshot, SyncEngine, ViewSubscription};
use uuid::Uuid;

// ─── App ──────────────────────────────────────────────────────────────────────

/// Top-level application state.
pub struct App<S> {
  /// Display name used as the author of outgoing messages.
  pub name: String,

  /// Text typed into the input line but not yet sent.
  pub input: String,

  /// Latest view of the conversation, refreshed once per frame.
  pub snapshot: Snapshot,

  /// One-line status message shown in the status bar.
  pub status_msg: String,

  engine: SyncEngine<S>,
  view:   ViewSubscription,
}

impl<S> App<S>
where
  S: MessageStore + 'static,
{
  pub fn new(engine: SyncEngine<S>, name: impl Into<String>) -> Self {
    let view = engine.subscribe();
    Self {
      name: name.into(),
      input: String::new(),
      snapshot: view.current(),
      status_msg: String::new(),
      engine,
      view,
    }
  }

  /// Pick up the latest snapshot. Returns `true` if it changed.
  pub fn refresh(&mut self) -> bool {
    if !self.view.has_changed() {
      return false;
    }
    self.snapshot = self.view.mark_seen();
    true
  }

  pub fn cursor(&self) -> Cursor { self.engine.cursor() }

  // ── Key handling ──────────────────────────────────────────────────────────

  /// Process a key event. Returns `true` to continue, `false` to quit.
  pub fn handle_key(&mut self, key: KeyEvent) -> bool {
    if key.modifiers.contains(KeyModifiers::CONTROL) {
      return key.code != KeyCode::Char('c');
    }

    match key.code {
      KeyCode::Esc => return false,
      KeyCode::Enter => self.send(),
      KeyCode::Backspace => {
        self.input.pop();
      }
      KeyCode::Char(c) => {
        self.input.push(c);
        self.status_msg.clear();
      }
      _ => {}
    }
    true
  }

  fn send(&mut self) {
    if self.input.is_empty() {
      self.status_msg = "Nothing to send.".into();
      return;
    }

    let id = Uuid::new_v4().to_string();
    let result = NewMessage::new(id, self.name.as_str(), self.input.as_str())
      .map_err(|e| e.to_string())
      .and_then(|message| self.engine.insert(message).map_err(|e| e.to_string()));

    match result {
      Ok(()) => {
        self.input.clear();
        self.status_msg.clear();
        self.refresh();
      }
      Err(e) => self.status_msg = format!("Error: {e}"),
    }
  }
}
