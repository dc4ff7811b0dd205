//! Decoding helpers between SQLite rows and domain types.
//!
//! Timestamps are stored as integer milliseconds since the Unix epoch, which
//! keeps the `confirmed_at` index usable for range scans.

use natter_core::{Message, Version};

use crate::Result;

/// Column list shared by every `SELECT` that feeds [`RawMessage::from_row`].
pub const MESSAGE_COLUMNS: &str = "id, author, body, confirmed_at";

/// Raw values read directly from a `messages` row.
pub struct RawMessage {
  pub id:           String,
  pub author:       String,
  pub body:         String,
  pub confirmed_at: i64,
}

impl RawMessage {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      id:           row.get(0)?,
      author:       row.get(1)?,
      body:         row.get(2)?,
      confirmed_at: row.get(3)?,
    })
  }

  pub fn into_message(self) -> Result<Message> {
    Ok(Message {
      id:           self.id,
      author:       self.author,
      body:         self.body,
      confirmed_at: Version::confirmed(self.confirmed_at)?,
    })
  }
}

/// The timestamp to stamp on a new row: the wall clock, bumped past the
/// newest stored row so stamps stay strictly increasing.
pub fn next_stamp(now_ms: i64, latest: Option<i64>) -> i64 {
  match latest {
    Some(latest) if latest >= now_ms => latest + 1,
    _ => now_ms,
  }
}

#[cfg(test)]
mod tests {
  use super::next_stamp;

  #[test]
  fn stamp_follows_the_clock_when_it_is_ahead() {
    assert_eq!(next_stamp(1_000, None), 1_000);
    assert_eq!(next_stamp(1_000, Some(900)), 1_000);
  }

  #[test]
  fn stamp_is_bumped_past_latest_when_clock_lags() {
    assert_eq!(next_stamp(1_000, Some(1_000)), 1_001);
    assert_eq!(next_stamp(1_000, Some(5_000)), 5_001);
  }
}
