//! The `MessageStore` trait: the authoritative store as seen by clients.
//!
//! The trait is implemented by storage backends (`natter-store-sqlite`) and by
//! remote proxies (the HTTP client in `natter-cli`). The sync engine depends on
//! this abstraction, not on any concrete backend.

use std::future::Future;

use serde::{Deserialize, Serialize};

use crate::message::{Cursor, Message, NewMessage};

/// Result of [`MessageStore::write`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "message", rename_all = "snake_case")]
pub enum WriteOutcome {
  /// The message was stored and stamped with a fresh timestamp.
  Created(Message),
  /// A message with the same id already exists; nothing was written.
  AlreadyExists,
}

/// Abstraction over the authoritative, append-only message store.
///
/// All methods return `Send` futures so the trait can be used in
/// multi-threaded async runtimes.
pub trait MessageStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// Create a message. Never overwrites: an existing id yields
  /// [`WriteOutcome::AlreadyExists`]. On success the stored message carries a
  /// store-assigned `confirmed_at` strictly greater than every earlier one.
  fn write(
    &self,
    input: NewMessage,
  ) -> impl Future<Output = Result<WriteOutcome, Self::Error>> + Send + '_;

  /// Return every message with `confirmed_at > cursor`, ascending by
  /// `confirmed_at`.
  fn read_since(
    &self,
    cursor: Cursor,
  ) -> impl Future<Output = Result<Vec<Message>, Self::Error>> + Send + '_;
}
