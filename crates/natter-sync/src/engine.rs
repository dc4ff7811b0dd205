//! [`SyncEngine`]: merges optimistic local writes with confirmed reads.
//!
//! All state lives behind one mutex. Every public operation takes the lock,
//! applies its change, publishes at most one snapshot and releases the lock,
//! so no reader ever sees a half-applied batch. Store I/O happens on spawned
//! tasks that call back in through [`SyncEngine::deliver`] and
//! [`SyncEngine::subscription_lost`]; the lock is never held across an await.

use std::{
  collections::{HashMap, hash_map::Entry},
  sync::{Arc, Mutex, MutexGuard, PoisonError, Weak},
  time::Duration,
};

use natter_core::{Cursor, Message, MessageStore, NewMessage, WriteOutcome};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info, trace, warn};

use crate::{
  Error, Result,
  config::SyncConfig,
  subscription,
  view::{self, LiveView, Snapshot, ViewSubscription},
};

// ─── State ───────────────────────────────────────────────────────────────────

struct Slot {
  message: Message,
  /// Insertion order; kept when the message is replaced in place.
  seq:     u64,
}

struct EngineState {
  messages:            HashMap<String, Slot>,
  next_seq:            u64,
  cursor:              Cursor,
  /// Newly observed confirmed messages since the current subscription began.
  observed:            usize,
  /// Bumped on every (re)subscription; `0` means never subscribed.
  generation:          u64,
  subscription_cursor: Option<Cursor>,
  subscription:        Option<JoinHandle<()>>,
  writes:              JoinSet<()>,
  shut_down:           bool,
}

impl EngineState {
  fn new() -> Self {
    Self {
      messages:            HashMap::new(),
      next_seq:            0,
      cursor:              Cursor::BEGINNING,
      observed:            0,
      generation:          0,
      subscription_cursor: None,
      subscription:        None,
      writes:              JoinSet::new(),
      shut_down:           false,
    }
  }

  /// Insert or replace by last-writer-wins. Returns `true` if the map
  /// changed.
  ///
  /// `Unconfirmed` ranks below every confirmed version, so a confirmed copy
  /// always replaces an optimistic placeholder, and among confirmed copies
  /// only a strictly newer one wins.
  fn merge(&mut self, incoming: Message) -> bool {
    match self.messages.entry(incoming.id.clone()) {
      Entry::Vacant(vacant) => {
        let seq = self.next_seq;
        self.next_seq += 1;
        vacant.insert(Slot { message: incoming, seq });
        true
      }
      Entry::Occupied(mut occupied) => {
        let slot = occupied.get_mut();
        if incoming.confirmed_at > slot.message.confirmed_at {
          slot.message = incoming;
          true
        } else {
          false
        }
      }
    }
  }

  fn stop_subscription(&mut self) {
    if let Some(handle) = self.subscription.take() {
      handle.abort();
    }
    self.subscription_cursor = None;
  }
}

struct Shared<S> {
  store:  Arc<S>,
  config: SyncConfig,
  view:   LiveView,
  state:  Mutex<EngineState>,
}

impl<S> Drop for Shared<S> {
  fn drop(&mut self) {
    // In-flight writes are aborted when the `JoinSet` drops.
    let state = self.state.get_mut().unwrap_or_else(PoisonError::into_inner);
    state.stop_subscription();
  }
}

// ─── Engine ──────────────────────────────────────────────────────────────────

/// Local materialized view of the message list, kept in sync with `S`.
///
/// Cloning is cheap and every clone drives the same engine. Methods that
/// start background work must be called from within a tokio runtime.
pub struct SyncEngine<S> {
  shared: Arc<Shared<S>>,
}

impl<S> Clone for SyncEngine<S> {
  fn clone(&self) -> Self { Self { shared: Arc::clone(&self.shared) } }
}

impl<S> SyncEngine<S>
where
  S: MessageStore + 'static,
{
  /// Create an idle engine over `store`. Call [`start`](Self::start) to begin
  /// pulling confirmed messages.
  pub fn new(store: Arc<S>, config: SyncConfig) -> Self {
    Self {
      shared: Arc::new(Shared {
        store,
        config,
        view: LiveView::new(),
        state: Mutex::new(EngineState::new()),
      }),
    }
  }

  fn lock(&self) -> MutexGuard<'_, EngineState> {
    self.shared.state.lock().unwrap_or_else(PoisonError::into_inner)
  }

  pub fn config(&self) -> &SyncConfig { &self.shared.config }

  // ── Lifecycle ────────────────────────────────────────────────────────────

  /// Open the first subscription at the current cursor. Does nothing if a
  /// subscription is already running.
  pub fn start(&self) -> Result<()> {
    let mut state = self.lock();
    if state.shut_down {
      return Err(Error::ShutDown);
    }
    if state.subscription.is_none() {
      self.resubscribe(&mut state, Duration::ZERO);
    }
    Ok(())
  }

  /// Tear down the subscription and abandon in-flight writes. Pending
  /// messages stay in the view.
  pub fn shutdown(&self) {
    let mut state = self.lock();
    if state.shut_down {
      return;
    }
    state.shut_down = true;
    state.stop_subscription();
    state.writes.abort_all();
    info!(cursor = %state.cursor, "sync engine shut down");
  }

  // ── Writes ───────────────────────────────────────────────────────────────

  /// Show `input` immediately as pending and write it to the store in the
  /// background.
  ///
  /// The id must be fresh. Returns before the store has seen the write; the
  /// message is confirmed later by a subscription read, never by the write
  /// acknowledgement itself.
  pub fn insert(&self, input: NewMessage) -> Result<()> {
    let mut state = self.lock();
    if state.shut_down {
      return Err(Error::ShutDown);
    }
    if state.messages.contains_key(&input.id) {
      warn!(id = %input.id, "ignoring insert for an id already in the view");
      return Ok(());
    }

    state.merge(input.clone().into_optimistic());
    self.publish(&state);

    while state.writes.try_join_next().is_some() {}
    let store = Arc::clone(&self.shared.store);
    state.writes.spawn(write_through(store, input));
    Ok(())
  }

  // ── Confirmed reads ──────────────────────────────────────────────────────

  /// Merge a batch of confirmed messages. Returns how many entries changed.
  ///
  /// Redelivered or out-of-order messages are harmless: a message only
  /// replaces what the view holds if its `confirmed_at` is newer. The view
  /// is recomputed once for the whole batch, and not at all if nothing
  /// changed.
  pub fn apply_confirmed(&self, batch: Vec<Message>) -> usize {
    let mut state = self.lock();
    self.apply(&mut state, batch)
  }

  /// Entry point for subscription tasks. Batches from a superseded
  /// subscription are dropped. Returns whether `generation` is still the
  /// live subscription afterwards.
  pub(crate) fn deliver(&self, generation: u64, batch: Vec<Message>) -> bool {
    let mut state = self.lock();
    if state.shut_down || state.generation != generation {
      debug!(
        generation,
        current = state.generation,
        len = batch.len(),
        "discarding batch from superseded subscription"
      );
      return false;
    }
    self.apply(&mut state, batch);
    state.generation == generation
  }

  /// Called by a subscription task whose read failed. Re-subscribes from the
  /// current cursor after the configured delay.
  pub(crate) fn subscription_lost(&self, generation: u64) {
    let mut state = self.lock();
    if state.shut_down || state.generation != generation {
      return;
    }
    let delay = self.shared.config.retry_delay;
    self.resubscribe(&mut state, delay);
  }

  fn apply(&self, state: &mut EngineState, batch: Vec<Message>) -> usize {
    let before = state.cursor;
    let mut changed = 0;
    let mut fresh = 0;

    for incoming in batch {
      if incoming.is_pending() {
        warn!(id = %incoming.id, "skipping unconfirmed message in a confirmed batch");
        continue;
      }
      if before.admits(incoming.confirmed_at) {
        fresh += 1;
      }
      state.cursor.advance(incoming.confirmed_at);
      if state.merge(incoming) {
        changed += 1;
      }
    }

    if changed > 0 {
      self.publish(state);
    }
    if state.cursor != before {
      debug!(from = %before, to = %state.cursor, "cursor advanced");
    }

    state.observed += fresh;
    let threshold = self.shared.config.resubscribe_threshold.get();
    if state.observed >= threshold && state.subscription.is_some() {
      self.resubscribe(state, Duration::ZERO);
    }
    changed
  }

  // ── Internals ────────────────────────────────────────────────────────────

  fn publish(&self, state: &EngineState) {
    let projected =
      view::project(state.messages.values().map(|s| (&s.message, s.seq)));
    let revision = self.shared.view.publish(projected);
    trace!(revision, len = state.messages.len(), "view recomputed");
  }

  /// Replace the running subscription (if any) with a new generation reading
  /// after the current cursor. Runs under the state lock, so no batch can
  /// land between tear-down and set-up.
  fn resubscribe(&self, state: &mut EngineState, delay: Duration) {
    state.stop_subscription();
    state.generation += 1;
    state.observed = 0;
    state.subscription_cursor = Some(state.cursor);

    let generation = state.generation;
    let cursor = state.cursor;
    info!(generation, %cursor, "subscribing");

    state.subscription = Some(tokio::spawn(subscription::run(
      WeakEngine { shared: Arc::downgrade(&self.shared) },
      Arc::clone(&self.shared.store),
      generation,
      cursor,
      delay,
      self.shared.config.poll_interval,
    )));
  }

  // ── Reads ────────────────────────────────────────────────────────────────

  pub fn view(&self) -> &LiveView { &self.shared.view }

  pub fn snapshot(&self) -> Snapshot { self.shared.view.snapshot() }

  pub fn subscribe(&self) -> ViewSubscription { self.shared.view.subscribe() }

  pub fn get(&self, id: &str) -> Option<Message> {
    self.lock().messages.get(id).map(|s| s.message.clone())
  }

  pub fn len(&self) -> usize { self.lock().messages.len() }

  pub fn is_empty(&self) -> bool { self.lock().messages.is_empty() }

  /// Highest `confirmed_at` seen so far.
  pub fn cursor(&self) -> Cursor { self.lock().cursor }

  /// Generation of the current subscription; `0` before [`start`](Self::start).
  pub fn generation(&self) -> u64 { self.lock().generation }

  /// The cursor the running subscription reads after, if one is running.
  pub fn subscription_cursor(&self) -> Option<Cursor> {
    self.lock().subscription_cursor
  }
}

/// Handle held by subscription tasks so they do not keep the engine alive.
pub(crate) struct WeakEngine<S> {
  shared: Weak<Shared<S>>,
}

impl<S> WeakEngine<S> {
  pub(crate) fn upgrade(&self) -> Option<SyncEngine<S>> {
    self.shared.upgrade().map(|shared| SyncEngine { shared })
  }
}

async fn write_through<S: MessageStore>(store: Arc<S>, input: NewMessage) {
  let id = input.id.clone();
  match store.write(input).await {
    Ok(WriteOutcome::Created(message)) => {
      debug!(%id, confirmed_at = %message.confirmed_at, "write acknowledged");
    }
    Ok(WriteOutcome::AlreadyExists) => {
      warn!(%id, "store already holds this id; leaving it to the next read");
    }
    Err(err) => {
      error!(%id, error = %err, "write failed; message stays pending");
    }
  }
}
