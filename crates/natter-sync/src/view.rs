//! The live view: a sorted, read-only projection of the engine's messages.
//!
//! Every change to the engine's message map publishes one new [`Snapshot`]
//! before the mutating call returns. Consumers either read the latest
//! snapshot or hold a [`ViewSubscription`] and await changes.

use std::{cmp::Ordering, slice, sync::Arc};

use natter_core::{Message, Version};
use tokio::sync::watch;

// ─── Snapshot ────────────────────────────────────────────────────────────────

/// One published state of the view.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
  revision: u64,
  messages: Arc<[Message]>,
}

impl Snapshot {
  /// Increases by exactly one per published recomputation; `0` is the empty
  /// view before any change.
  pub fn revision(&self) -> u64 { self.revision }

  /// Confirmed messages by ascending `confirmed_at`, then pending messages in
  /// the order they were inserted.
  pub fn messages(&self) -> &[Message] { &self.messages }

  pub fn len(&self) -> usize { self.messages.len() }

  pub fn is_empty(&self) -> bool { self.messages.is_empty() }

  pub fn iter(&self) -> slice::Iter<'_, Message> { self.messages.iter() }

  /// Number of messages still waiting for the store to confirm them.
  pub fn pending(&self) -> usize {
    self.messages.iter().filter(|m| m.is_pending()).count()
  }
}

impl<'a> IntoIterator for &'a Snapshot {
  type IntoIter = slice::Iter<'a, Message>;
  type Item = &'a Message;

  fn into_iter(self) -> Self::IntoIter { self.iter() }
}

// ─── Projection ──────────────────────────────────────────────────────────────

/// Display order: confirmed ascending, unconfirmed ("nulls") last.
///
/// This differs from [`Version`]'s own ordering, where `Unconfirmed` is the
/// smallest value.
fn display_order(a: Version, b: Version) -> Ordering {
  match (a, b) {
    (Version::Confirmed(x), Version::Confirmed(y)) => x.cmp(&y),
    (Version::Confirmed(_), Version::Unconfirmed) => Ordering::Less,
    (Version::Unconfirmed, Version::Confirmed(_)) => Ordering::Greater,
    (Version::Unconfirmed, Version::Unconfirmed) => Ordering::Equal,
  }
}

/// Sort `(message, insertion_seq)` pairs into display order. Ties on
/// `confirmed_at` fall back to insertion order.
pub(crate) fn project<'a>(
  entries: impl IntoIterator<Item = (&'a Message, u64)>,
) -> Vec<Message> {
  let mut entries: Vec<_> = entries.into_iter().collect();
  entries.sort_by(|(a, a_seq), (b, b_seq)| {
    display_order(a.confirmed_at, b.confirmed_at).then(a_seq.cmp(b_seq))
  });
  entries.into_iter().map(|(m, _)| m.clone()).collect()
}

// ─── LiveView ────────────────────────────────────────────────────────────────

/// Publisher side of the view. Cloning shares the same channel.
#[derive(Clone)]
pub struct LiveView {
  tx: Arc<watch::Sender<Snapshot>>,
}

impl LiveView {
  pub(crate) fn new() -> Self {
    let (tx, _rx) = watch::channel(Snapshot::default());
    Self { tx: Arc::new(tx) }
  }

  /// Replace the published messages and bump the revision. Returns the new
  /// revision.
  pub(crate) fn publish(&self, messages: Vec<Message>) -> u64 {
    let mut revision = 0;
    self.tx.send_modify(|snapshot| {
      snapshot.revision += 1;
      snapshot.messages = messages.into();
      revision = snapshot.revision;
    });
    revision
  }

  /// The most recently published snapshot.
  pub fn snapshot(&self) -> Snapshot { self.tx.borrow().clone() }

  pub fn subscribe(&self) -> ViewSubscription {
    ViewSubscription { rx: self.tx.subscribe() }
  }
}

// ─── ViewSubscription ────────────────────────────────────────────────────────

/// Receiver side of the view.
///
/// A slow consumer sees the latest snapshot, not every intermediate one;
/// [`Snapshot::revision`] tells it how many it skipped.
pub struct ViewSubscription {
  rx: watch::Receiver<Snapshot>,
}

impl ViewSubscription {
  pub fn current(&self) -> Snapshot { self.rx.borrow().clone() }

  /// Whether a snapshot has been published since this subscription last
  /// looked.
  pub fn has_changed(&self) -> bool { self.rx.has_changed().unwrap_or(false) }

  /// Wait for the next published snapshot. Returns `None` once the engine is
  /// gone.
  pub async fn changed(&mut self) -> Option<Snapshot> {
    self.rx.changed().await.ok()?;
    Some(self.rx.borrow_and_update().clone())
  }

  /// The latest snapshot, marking it as seen.
  pub fn mark_seen(&mut self) -> Snapshot { self.rx.borrow_and_update().clone() }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn msg(id: &str, confirmed_at: Version) -> Message {
    Message {
      id: id.into(),
      author: "bob".into(),
      body: id.into(),
      confirmed_at,
    }
  }

  fn ids(messages: &[Message]) -> Vec<&str> {
    messages.iter().map(|m| m.id.as_str()).collect()
  }

  #[test]
  fn confirmed_ascending_then_pending() {
    let a = msg("A", Version::Confirmed(5));
    let b = msg("B", Version::Unconfirmed);
    let c = msg("C", Version::Confirmed(2));

    let sorted = project([(&a, 0), (&b, 1), (&c, 2)]);
    assert_eq!(ids(&sorted), ["C", "A", "B"]);
  }

  #[test]
  fn pending_keep_insertion_order() {
    let first = msg("first", Version::Unconfirmed);
    let second = msg("second", Version::Unconfirmed);
    let third = msg("third", Version::Unconfirmed);

    let sorted = project([(&third, 7), (&first, 1), (&second, 4)]);
    assert_eq!(ids(&sorted), ["first", "second", "third"]);
  }

  #[test]
  fn publish_bumps_revision_once() {
    let view = LiveView::new();
    let mut sub = view.subscribe();
    assert_eq!(view.snapshot().revision(), 0);
    assert!(!sub.has_changed());

    let revision = view.publish(vec![msg("A", Version::Confirmed(1))]);
    assert_eq!(revision, 1);
    assert!(sub.has_changed());

    let seen = sub.mark_seen();
    assert_eq!(seen.revision(), 1);
    assert_eq!(seen.len(), 1);
    assert_eq!(seen.pending(), 0);
    assert!(!sub.has_changed());
  }

  #[tokio::test]
  async fn changed_yields_latest_snapshot() {
    let view = LiveView::new();
    let mut sub = view.subscribe();

    view.publish(vec![msg("A", Version::Unconfirmed)]);
    let snapshot = sub.changed().await.unwrap();
    assert_eq!(snapshot.revision(), 1);
    assert_eq!(snapshot.pending(), 1);
  }
}
