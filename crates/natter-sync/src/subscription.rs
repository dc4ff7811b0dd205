//! The read side: one task per subscription generation.
//!
//! A subscription is pinned to the cursor it was opened with and re-reads
//! `confirmed_at > cursor` every poll interval. Because the store is
//! append-only its result set only grows, so a longer result means new
//! messages. The engine replaces the subscription (new generation, newer
//! cursor) once enough new messages have been observed, which keeps any one
//! subscription's result set bounded.

use std::{sync::Arc, time::Duration};

use natter_core::{Cursor, MessageStore};
use tracing::{trace, warn};

use crate::engine::WeakEngine;

pub(crate) async fn run<S>(
  engine: WeakEngine<S>,
  store: Arc<S>,
  generation: u64,
  cursor: Cursor,
  delay: Duration,
  poll_interval: Duration,
) where
  S: MessageStore + 'static,
{
  if !delay.is_zero() {
    tokio::time::sleep(delay).await;
  }

  let mut delivered = 0;
  loop {
    match store.read_since(cursor).await {
      Ok(batch) => {
        if batch.len() > delivered {
          delivered = batch.len();
          trace!(generation, %cursor, len = delivered, "subscription result changed");
          let Some(live) = engine.upgrade() else { return };
          if !live.deliver(generation, batch) {
            return;
          }
        }
      }
      Err(err) => {
        warn!(generation, %cursor, error = %err, "subscription read failed");
        if let Some(live) = engine.upgrade() {
          live.subscription_lost(generation);
        }
        return;
      }
    }
    tokio::time::sleep(poll_interval).await;
  }
}
