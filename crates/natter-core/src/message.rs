//! Message types: the unit of synchronization.
//!
//! A message is created on a client with a client-chosen `id` and starts life
//! [`Version::Unconfirmed`]. It becomes confirmed once the authoritative store
//! has stamped it and the stamped copy has been read back. Messages are never
//! deleted.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

// ─── Version ─────────────────────────────────────────────────────────────────

/// The version marker used for last-writer-wins conflict resolution.
///
/// Ordering is total: `Unconfirmed` sorts below every `Confirmed` value, and
/// confirmed values compare by timestamp. On the wire this is `number | null`.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default,
  Serialize, Deserialize,
)]
#[serde(try_from = "Option<i64>", into = "Option<i64>")]
pub enum Version {
  /// Local only; the store has not stamped this message yet.
  #[default]
  Unconfirmed,
  /// Stamped by the store, in milliseconds since the Unix epoch.
  Confirmed(i64),
}

impl Version {
  /// Build a confirmed version, rejecting negative timestamps.
  pub fn confirmed(timestamp: i64) -> Result<Self> {
    if timestamp < 0 {
      return Err(Error::InvalidTimestamp(timestamp));
    }
    Ok(Self::Confirmed(timestamp))
  }

  pub fn is_confirmed(&self) -> bool { matches!(self, Self::Confirmed(_)) }

  pub fn timestamp(&self) -> Option<i64> {
    match self {
      Self::Unconfirmed => None,
      Self::Confirmed(ts) => Some(*ts),
    }
  }
}

impl TryFrom<Option<i64>> for Version {
  type Error = Error;

  fn try_from(value: Option<i64>) -> Result<Self> {
    value.map_or(Ok(Self::Unconfirmed), Self::confirmed)
  }
}

impl From<Version> for Option<i64> {
  fn from(value: Version) -> Self { value.timestamp() }
}

impl fmt::Display for Version {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Unconfirmed => f.write_str("unconfirmed"),
      Self::Confirmed(ts) => write!(f, "{ts}"),
    }
  }
}

// ─── Cursor ──────────────────────────────────────────────────────────────────

/// High-water mark of confirmed timestamps a reader has fully processed.
///
/// Reads are bounded by `confirmed_at > cursor`. A cursor only moves forward.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default,
  Serialize, Deserialize,
)]
#[serde(try_from = "i64", into = "i64")]
pub struct Cursor(i64);

impl Cursor {
  /// Beginning of time: every confirmed message is newer than this.
  pub const BEGINNING: Self = Self(0);

  pub fn new(timestamp: i64) -> Self { Self(timestamp.max(0)) }

  pub fn value(self) -> i64 { self.0 }

  /// Whether `version` lies strictly after this cursor.
  pub fn admits(self, version: Version) -> bool {
    matches!(version, Version::Confirmed(ts) if ts > self.0)
  }

  /// Move the cursor to `version` if it is newer. Returns `true` if the
  /// cursor moved.
  pub fn advance(&mut self, version: Version) -> bool {
    if self.admits(version) {
      if let Version::Confirmed(ts) = version {
        self.0 = ts;
      }
      return true;
    }
    false
  }
}

impl TryFrom<i64> for Cursor {
  type Error = Error;

  fn try_from(value: i64) -> Result<Self> {
    if value < 0 {
      return Err(Error::InvalidTimestamp(value));
    }
    Ok(Self(value))
  }
}

impl From<Cursor> for i64 {
  fn from(value: Cursor) -> Self { value.0 }
}

impl fmt::Display for Cursor {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.0)
  }
}

// ─── Message ─────────────────────────────────────────────────────────────────

/// A chat message as held in the local view or returned by the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
  /// Client-chosen identity; the merge key.
  pub id:           String,
  pub author:       String,
  pub body:         String,
  /// Set by the store; never sent by clients.
  pub confirmed_at: Version,
}

impl Message {
  /// A message that has not been confirmed by the store yet.
  pub fn is_pending(&self) -> bool { !self.confirmed_at.is_confirmed() }
}

// ─── NewMessage ──────────────────────────────────────────────────────────────

/// Input to [`crate::store::MessageStore::write`]. Carries no timestamp; the
/// store assigns one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewMessage {
  pub id:     String,
  pub author: String,
  pub body:   String,
}

impl NewMessage {
  pub fn new(
    id: impl Into<String>,
    author: impl Into<String>,
    body: impl Into<String>,
  ) -> Result<Self> {
    let id = id.into();
    if id.is_empty() {
      return Err(Error::EmptyId);
    }
    Ok(Self { id, author: author.into(), body: body.into() })
  }

  /// The local placeholder shown until the store confirms the write.
  pub fn into_optimistic(self) -> Message {
    self.into_message(Version::Unconfirmed)
  }

  /// The stored form, stamped with `timestamp` by the store.
  pub fn into_confirmed(self, timestamp: i64) -> Result<Message> {
    Ok(self.into_message(Version::confirmed(timestamp)?))
  }

  fn into_message(self, confirmed_at: Version) -> Message {
    Message {
      id: self.id,
      author: self.author,
      body: self.body,
      confirmed_at,
    }
  }
}
