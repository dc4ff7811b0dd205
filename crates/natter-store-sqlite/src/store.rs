//! [`SqliteStore`]: the SQLite implementation of [`MessageStore`].

use std::path::Path;

use chrono::Utc;
use rusqlite::OptionalExtension as _;
use tracing::debug;

use natter_core::{Cursor, Message, MessageStore, NewMessage, WriteOutcome};

use crate::{
  encode::{MESSAGE_COLUMNS, RawMessage, next_stamp},
  schema::SCHEMA,
  Result,
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// A natter message store backed by a single SQLite file.
///
/// Cloning is cheap: the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store, mainly for tests.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// The newest stamp in the store, or [`Cursor::BEGINNING`] if it is empty.
  pub async fn latest(&self) -> Result<Cursor> {
    let latest: Option<i64> = self
      .conn
      .call(|conn| {
        Ok(conn.query_row("SELECT MAX(confirmed_at) FROM messages", [], |r| {
          r.get(0)
        })?)
      })
      .await?;
    Ok(latest.map_or(Cursor::BEGINNING, Cursor::new))
  }
}

// ─── MessageStore impl ───────────────────────────────────────────────────────

impl MessageStore for SqliteStore {
  type Error = crate::Error;

  async fn write(&self, input: NewMessage) -> Result<WriteOutcome> {
    let id     = input.id.clone();
    let author = input.author.clone();
    let body   = input.body.clone();
    let now_ms = Utc::now().timestamp_millis();

    // The existence check, stamp and insert share one transaction so two
    // writers can neither both succeed nor observe the same stamp.
    let stamped: Option<i64> = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;

        let exists = tx
          .query_row(
            "SELECT 1 FROM messages WHERE id = ?1",
            rusqlite::params![id],
            |_| Ok(true),
          )
          .optional()?
          .unwrap_or(false);
        if exists {
          return Ok(None);
        }

        let latest: Option<i64> = tx.query_row(
          "SELECT MAX(confirmed_at) FROM messages",
          [],
          |r| r.get(0),
        )?;
        let stamp = next_stamp(now_ms, latest);

        tx.execute(
          "INSERT INTO messages (id, author, body, confirmed_at)
           VALUES (?1, ?2, ?3, ?4)",
          rusqlite::params![id, author, body, stamp],
        )?;
        tx.commit()?;
        Ok(Some(stamp))
      })
      .await?;

    match stamped {
      Some(stamp) => {
        debug!(id = %input.id, stamp, "stored message");
        Ok(WriteOutcome::Created(input.into_confirmed(stamp)?))
      }
      None => {
        debug!(id = %input.id, "rejected duplicate message id");
        Ok(WriteOutcome::AlreadyExists)
      }
    }
  }

  async fn read_since(&self, cursor: Cursor) -> Result<Vec<Message>> {
    let after = cursor.value();

    let raws: Vec<RawMessage> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {MESSAGE_COLUMNS}
           FROM messages
           WHERE confirmed_at > ?1
           ORDER BY confirmed_at ASC"
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![after], RawMessage::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawMessage::into_message).collect()
  }
}
