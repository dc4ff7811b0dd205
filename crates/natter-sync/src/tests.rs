//! Engine tests against a scriptable in-memory store, plus an end-to-end run
//! against `SqliteStore`.

use std::{
  sync::{
    Arc, Mutex,
    atomic::{AtomicBool, Ordering},
  },
  time::Duration,
};

use natter_core::{Cursor, Message, MessageStore, NewMessage, Version, WriteOutcome};
use natter_store_sqlite::SqliteStore;
use tokio::sync::Notify;

use crate::{Error, SyncConfig, SyncEngine};

// ─── Fake store ──────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
#[error("store unavailable")]
struct Unavailable;

/// Append-only store with a deterministic clock and switchable failures.
struct MemoryStore {
  inner:       Mutex<MemoryInner>,
  fail_reads:  AtomicBool,
  fail_writes: AtomicBool,
  /// While set, writes park on `write_gate` before touching the store.
  hold_writes: AtomicBool,
  write_gate:  Notify,
}

struct MemoryInner {
  messages:       Vec<Message>,
  clock:          i64,
  write_attempts: usize,
  read_cursors:   Vec<Cursor>,
}

impl MemoryStore {
  fn starting_at(clock: i64) -> Self {
    Self {
      inner:       Mutex::new(MemoryInner {
        messages: Vec::new(),
        clock,
        write_attempts: 0,
        read_cursors: Vec::new(),
      }),
      fail_reads:  AtomicBool::new(false),
      fail_writes: AtomicBool::new(false),
      hold_writes: AtomicBool::new(false),
      write_gate:  Notify::new(),
    }
  }

  /// Store a message directly, as if another client had written it.
  fn seed(&self, id: &str, author: &str, body: &str) -> Message {
    let mut inner = self.inner.lock().unwrap();
    let stamp = inner.clock;
    inner.clock += 1;
    let msg = NewMessage::new(id, author, body)
      .unwrap()
      .into_confirmed(stamp)
      .unwrap();
    inner.messages.push(msg.clone());
    msg
  }

  fn write_attempts(&self) -> usize { self.inner.lock().unwrap().write_attempts }

  fn stored(&self) -> usize { self.inner.lock().unwrap().messages.len() }

  fn read_cursors(&self) -> Vec<Cursor> {
    self.inner.lock().unwrap().read_cursors.clone()
  }
}

impl MessageStore for MemoryStore {
  type Error = Unavailable;

  async fn write(&self, input: NewMessage) -> Result<WriteOutcome, Unavailable> {
    self.inner.lock().unwrap().write_attempts += 1;
    if self.hold_writes.load(Ordering::SeqCst) {
      self.write_gate.notified().await;
    }

    let mut inner = self.inner.lock().unwrap();
    if self.fail_writes.load(Ordering::SeqCst) {
      return Err(Unavailable);
    }
    if inner.messages.iter().any(|m| m.id == input.id) {
      return Ok(WriteOutcome::AlreadyExists);
    }
    let stamp = inner.clock;
    inner.clock += 1;
    let msg = input.into_confirmed(stamp).unwrap();
    inner.messages.push(msg.clone());
    Ok(WriteOutcome::Created(msg))
  }

  async fn read_since(&self, cursor: Cursor) -> Result<Vec<Message>, Unavailable> {
    let mut inner = self.inner.lock().unwrap();
    inner.read_cursors.push(cursor);
    if self.fail_reads.load(Ordering::SeqCst) {
      return Err(Unavailable);
    }
    Ok(
      inner
        .messages
        .iter()
        .filter(|m| cursor.admits(m.confirmed_at))
        .cloned()
        .collect(),
    )
  }
}

// ─── Helpers ─────────────────────────────────────────────────────────────────

fn fast_config(threshold: usize) -> SyncConfig {
  SyncConfig::new(threshold)
    .unwrap()
    .with_poll_interval(Duration::from_millis(5))
    .with_retry_delay(Duration::from_millis(5))
}

fn engine(store: &Arc<MemoryStore>, threshold: usize) -> SyncEngine<MemoryStore> {
  SyncEngine::new(Arc::clone(store), fast_config(threshold))
}

fn new_message(id: &str, body: &str) -> NewMessage {
  NewMessage::new(id, "bob", body).unwrap()
}

fn confirmed(id: &str, body: &str, at: i64) -> Message {
  new_message(id, body).into_confirmed(at).unwrap()
}

fn ids<S: MessageStore + 'static>(engine: &SyncEngine<S>) -> Vec<String> {
  engine.snapshot().iter().map(|m| m.id.clone()).collect()
}

/// Poll `cond` until it holds, failing the test after two seconds.
async fn wait_for(what: &str, mut cond: impl FnMut() -> bool) {
  for _ in 0..400 {
    if cond() {
      return;
    }
    tokio::time::sleep(Duration::from_millis(5)).await;
  }
  panic!("timed out waiting for {what}");
}

// ─── Optimistic inserts ──────────────────────────────────────────────────────

#[tokio::test]
async fn insert_shows_pending_message_immediately() {
  let store = Arc::new(MemoryStore::starting_at(100));
  let engine = engine(&store, 1);
  let mut sub = engine.subscribe();

  engine.insert(new_message("a", "hi")).unwrap();

  assert!(sub.has_changed());
  let snapshot = sub.mark_seen();
  assert_eq!(snapshot.revision(), 1);
  assert_eq!(snapshot.len(), 1);
  assert_eq!(snapshot.pending(), 1);
  assert_eq!(snapshot.messages()[0].confirmed_at, Version::Unconfirmed);
}

#[tokio::test]
async fn insert_writes_through_without_timestamp() {
  let store = Arc::new(MemoryStore::starting_at(100));
  let engine = engine(&store, 1);

  engine.insert(new_message("a", "hi")).unwrap();
  wait_for("write", || store.write_attempts() == 1).await;

  // The write alone never confirms the local copy.
  assert!(engine.get("a").unwrap().is_pending());
  let stored = store.read_since(Cursor::BEGINNING).await.unwrap();
  assert_eq!(stored, vec![confirmed("a", "hi", 100)]);
}

#[tokio::test]
async fn insert_of_known_id_is_ignored() {
  let store = Arc::new(MemoryStore::starting_at(100));
  let engine = engine(&store, 10);
  engine.apply_confirmed(vec![confirmed("a", "original", 5)]);
  let revision = engine.snapshot().revision();

  engine.insert(new_message("a", "again")).unwrap();

  assert_eq!(engine.snapshot().revision(), revision);
  assert_eq!(engine.get("a").unwrap().body, "original");
}

#[tokio::test]
async fn duplicate_write_leaves_optimistic_copy_until_read() {
  let store = Arc::new(MemoryStore::starting_at(40));
  store.seed("a", "alice", "already here");
  let engine = engine(&store, 10);

  engine.insert(new_message("a", "mine")).unwrap();
  wait_for("write", || store.write_attempts() == 1).await;

  let pending = engine.get("a").unwrap();
  assert!(pending.is_pending());
  assert_eq!(pending.body, "mine");

  let batch = store.read_since(engine.cursor()).await.unwrap();
  engine.apply_confirmed(batch);

  let snapshot = engine.snapshot();
  assert_eq!(snapshot.len(), 1);
  assert_eq!(snapshot.messages()[0].body, "already here");
  assert_eq!(snapshot.messages()[0].confirmed_at, Version::Confirmed(40));
}

#[tokio::test]
async fn failed_write_keeps_message_pending() {
  let store = Arc::new(MemoryStore::starting_at(100));
  store.fail_writes.store(true, Ordering::SeqCst);
  let engine = engine(&store, 1);

  engine.insert(new_message("a", "hi")).unwrap();
  wait_for("write", || store.write_attempts() == 1).await;
  tokio::time::sleep(Duration::from_millis(20)).await;

  assert_eq!(store.write_attempts(), 1, "writes are not retried");
  assert_eq!(engine.snapshot().pending(), 1);
}

// ─── Confirmed batches ───────────────────────────────────────────────────────

#[tokio::test]
async fn sort_puts_pending_last() {
  let store = Arc::new(MemoryStore::starting_at(100));
  let engine = engine(&store, 10);

  engine.apply_confirmed(vec![confirmed("A", "a", 5)]);
  engine.insert(new_message("B", "b")).unwrap();
  engine.apply_confirmed(vec![confirmed("C", "c", 2)]);

  assert_eq!(ids(&engine), ["C", "A", "B"]);
}

#[tokio::test]
async fn confirmed_copy_replaces_optimistic_in_place() {
  let store = Arc::new(MemoryStore::starting_at(100));
  let engine = engine(&store, 10);

  engine.insert(new_message("x", "first")).unwrap();
  engine.insert(new_message("y", "second")).unwrap();
  engine.apply_confirmed(vec![confirmed("x", "first", 10)]);

  let snapshot = engine.snapshot();
  assert_eq!(snapshot.len(), 2);
  assert_eq!(ids(&engine), ["x", "y"]);
  assert_eq!(snapshot.messages()[0].confirmed_at, Version::Confirmed(10));
  assert!(snapshot.messages()[1].is_pending());
}

#[tokio::test]
async fn applying_a_batch_twice_is_idempotent() {
  let store = Arc::new(MemoryStore::starting_at(100));
  let engine = engine(&store, 10);
  let batch = vec![confirmed("a", "one", 1), confirmed("b", "two", 2)];

  assert_eq!(engine.apply_confirmed(batch.clone()), 2);
  let once = engine.snapshot();

  assert_eq!(engine.apply_confirmed(batch), 0);
  let twice = engine.snapshot();

  assert_eq!(once.messages(), twice.messages());
  assert_eq!(once.revision(), twice.revision(), "no-op batch must not notify");
  assert_eq!(engine.cursor(), Cursor::new(2));
}

#[tokio::test]
async fn batch_publishes_one_snapshot() {
  let store = Arc::new(MemoryStore::starting_at(100));
  let engine = engine(&store, 10);
  let before = engine.snapshot().revision();

  engine.apply_confirmed(vec![
    confirmed("a", "one", 1),
    confirmed("b", "two", 2),
    confirmed("c", "three", 3),
  ]);

  assert_eq!(engine.snapshot().revision(), before + 1);
  assert_eq!(engine.snapshot().len(), 3);
}

#[tokio::test]
async fn last_writer_wins_regardless_of_arrival_order() {
  let store = Arc::new(MemoryStore::starting_at(100));
  let forward = engine(&store, 10);
  let backward = engine(&store, 10);

  let events = [
    confirmed("a", "v1", 10),
    confirmed("a", "v3", 30),
    confirmed("a", "v2", 20),
  ];

  forward.insert(new_message("a", "local")).unwrap();
  for e in &events {
    forward.apply_confirmed(vec![e.clone()]);
  }
  for e in events.iter().rev() {
    backward.apply_confirmed(vec![e.clone()]);
  }
  backward.insert(new_message("a", "local")).unwrap();

  for engine in [&forward, &backward] {
    let snapshot = engine.snapshot();
    assert_eq!(snapshot.len(), 1);
    assert_eq!(snapshot.messages()[0].body, "v3");
    assert_eq!(snapshot.messages()[0].confirmed_at, Version::Confirmed(30));
  }
}

#[tokio::test]
async fn cursor_never_moves_backwards() {
  let store = Arc::new(MemoryStore::starting_at(100));
  let engine = engine(&store, 10);

  engine.apply_confirmed(vec![confirmed("x", "x", 50)]);
  assert_eq!(engine.cursor(), Cursor::new(50));

  engine.apply_confirmed(vec![confirmed("y", "y", 30)]);
  assert_eq!(engine.cursor(), Cursor::new(50));
  assert_eq!(ids(&engine), ["y", "x"]);

  engine.apply_confirmed(vec![]);
  assert_eq!(engine.cursor(), Cursor::new(50));
}

#[tokio::test]
async fn unconfirmed_messages_in_batches_are_skipped() {
  let store = Arc::new(MemoryStore::starting_at(100));
  let engine = engine(&store, 10);

  let stray = new_message("z", "stray").into_optimistic();
  assert_eq!(engine.apply_confirmed(vec![stray]), 0);
  assert!(engine.is_empty());
}

// ─── Subscriptions ───────────────────────────────────────────────────────────

#[tokio::test]
async fn threshold_one_resubscribes_after_every_message() {
  let store = Arc::new(MemoryStore::starting_at(100));
  let engine = engine(&store, 1);
  engine.start().unwrap();
  assert_eq!(engine.generation(), 1);
  assert_eq!(engine.subscription_cursor(), Some(Cursor::BEGINNING));

  let mut previous = Cursor::BEGINNING;
  for (i, id) in ["a", "b", "c"].into_iter().enumerate() {
    engine.apply_confirmed(vec![confirmed(id, id, i as i64 + 1)]);

    assert_eq!(engine.generation(), i as u64 + 2);
    let cursor = engine.subscription_cursor().unwrap();
    assert!(cursor > previous, "{cursor} <= {previous}");
    previous = cursor;
  }
  assert_eq!(engine.generation(), 4, "exactly three resubscriptions");
  assert_eq!(previous, Cursor::new(3));
}

#[tokio::test]
async fn higher_threshold_batches_resubscriptions() {
  let store = Arc::new(MemoryStore::starting_at(100));
  let engine = engine(&store, 3);
  engine.start().unwrap();

  engine.apply_confirmed(vec![confirmed("a", "a", 1)]);
  engine.apply_confirmed(vec![confirmed("b", "b", 2)]);
  assert_eq!(engine.generation(), 1);

  // Redelivery is not a newly observed message.
  engine.apply_confirmed(vec![confirmed("b", "b", 2)]);
  assert_eq!(engine.generation(), 1);

  engine.apply_confirmed(vec![confirmed("c", "c", 3)]);
  assert_eq!(engine.generation(), 2);
  assert_eq!(engine.subscription_cursor(), Some(Cursor::new(3)));
}

#[tokio::test]
async fn stale_generation_batches_are_discarded() {
  let store = Arc::new(MemoryStore::starting_at(100));
  let engine = engine(&store, 1);
  engine.start().unwrap();
  engine.apply_confirmed(vec![confirmed("a", "a", 1)]);
  assert_eq!(engine.generation(), 2);
  let revision = engine.snapshot().revision();

  assert!(!engine.deliver(1, vec![confirmed("late", "late", 9)]));
  assert!(engine.get("late").is_none());
  assert_eq!(engine.snapshot().revision(), revision);
  assert_eq!(engine.cursor(), Cursor::new(1));
}

#[tokio::test]
async fn failed_read_resubscribes_from_current_cursor() {
  let store = Arc::new(MemoryStore::starting_at(100));
  store.fail_reads.store(true, Ordering::SeqCst);
  let engine = engine(&store, 10);
  engine.apply_confirmed(vec![confirmed("a", "a", 7)]);

  engine.start().unwrap();
  wait_for("resubscription", || engine.generation() >= 3).await;

  assert_eq!(engine.subscription_cursor(), Some(Cursor::new(7)));
  let cursors = store.read_cursors();
  assert!(!cursors.is_empty());
  assert!(cursors.iter().all(|c| *c == Cursor::new(7)), "{cursors:?}");
}

#[tokio::test]
async fn subscription_recovers_once_reads_succeed() {
  let store = Arc::new(MemoryStore::starting_at(100));
  store.fail_reads.store(true, Ordering::SeqCst);
  store.seed("a", "alice", "hello");
  let engine = engine(&store, 10);

  engine.start().unwrap();
  wait_for("first failure", || engine.generation() >= 2).await;
  store.fail_reads.store(false, Ordering::SeqCst);

  wait_for("message", || engine.get("a").is_some()).await;
  assert_eq!(engine.cursor(), Cursor::new(100));
}

#[tokio::test]
async fn shutdown_stops_subscription_and_rejects_inserts() {
  let store = Arc::new(MemoryStore::starting_at(100));
  let engine = engine(&store, 1);
  engine.start().unwrap();
  engine.insert(new_message("a", "hi")).unwrap();

  engine.shutdown();

  assert_eq!(engine.subscription_cursor(), None);
  assert!(matches!(
    engine.insert(new_message("b", "late")),
    Err(Error::ShutDown)
  ));
  assert!(matches!(engine.start(), Err(Error::ShutDown)));

  let generation = engine.generation();
  engine.apply_confirmed(vec![confirmed("c", "c", 5)]);
  assert_eq!(engine.generation(), generation, "no resubscription after shutdown");
  assert_eq!(engine.snapshot().pending(), 1);
}

#[tokio::test]
async fn shutdown_abandons_in_flight_writes() {
  let store = Arc::new(MemoryStore::starting_at(100));
  store.hold_writes.store(true, Ordering::SeqCst);
  let engine = engine(&store, 1);

  engine.insert(new_message("a", "hi")).unwrap();
  wait_for("write to start", || store.write_attempts() == 1).await;

  engine.shutdown();
  store.write_gate.notify_waiters();
  tokio::time::sleep(Duration::from_millis(30)).await;

  assert_eq!(store.stored(), 0, "aborted write must not land");
  assert_eq!(store.write_attempts(), 1, "no retry");
  assert!(engine.get("a").unwrap().is_pending());
}

#[tokio::test]
async fn dropping_the_engine_abandons_in_flight_writes() {
  let store = Arc::new(MemoryStore::starting_at(100));
  store.hold_writes.store(true, Ordering::SeqCst);
  let engine = engine(&store, 1);

  engine.insert(new_message("a", "hi")).unwrap();
  wait_for("write to start", || store.write_attempts() == 1).await;

  drop(engine);
  store.write_gate.notify_waiters();
  tokio::time::sleep(Duration::from_millis(30)).await;

  assert_eq!(store.stored(), 0);
  assert_eq!(store.write_attempts(), 1);
}

#[tokio::test]
async fn held_write_completes_when_released() {
  let store = Arc::new(MemoryStore::starting_at(100));
  store.hold_writes.store(true, Ordering::SeqCst);
  let engine = engine(&store, 1);

  engine.insert(new_message("a", "hi")).unwrap();
  wait_for("write to start", || store.write_attempts() == 1).await;

  store.write_gate.notify_waiters();
  wait_for("write to land", || store.stored() == 1).await;
}

#[tokio::test]
async fn dropping_every_handle_stops_polling() {
  let store = Arc::new(MemoryStore::starting_at(100));
  let engine = engine(&store, 1);
  let other = engine.clone();
  engine.start().unwrap();
  wait_for("first read", || !store.read_cursors().is_empty()).await;

  drop(engine);
  drop(other);
  tokio::time::sleep(Duration::from_millis(20)).await;

  let reads = store.read_cursors().len();
  tokio::time::sleep(Duration::from_millis(50)).await;
  assert_eq!(store.read_cursors().len(), reads, "subscription kept polling");
}

// ─── End to end ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn optimistic_insert_round_trips_to_confirmed() {
  let store = Arc::new(MemoryStore::starting_at(100));
  let engine = engine(&store, 1);
  engine.start().unwrap();

  engine.insert(new_message("a", "hi")).unwrap();
  let snapshot = engine.snapshot();
  assert_eq!(snapshot.len(), 1);
  assert_eq!(snapshot.pending(), 1);

  wait_for("confirmation", || engine.snapshot().pending() == 0).await;

  let snapshot = engine.snapshot();
  assert_eq!(snapshot.len(), 1);
  assert_eq!(snapshot.messages()[0], confirmed("a", "hi", 100));
  assert_eq!(engine.cursor(), Cursor::new(100));
  assert_eq!(engine.subscription_cursor(), Some(Cursor::new(100)));
}

#[tokio::test]
async fn two_clients_converge_through_sqlite() {
  let store = Arc::new(SqliteStore::open_in_memory().await.unwrap());
  let alice = SyncEngine::new(Arc::clone(&store), fast_config(1));
  let bob = SyncEngine::new(Arc::clone(&store), fast_config(2));
  alice.start().unwrap();
  bob.start().unwrap();

  alice.insert(NewMessage::new("m1", "alice", "hi bob").unwrap()).unwrap();
  bob.insert(NewMessage::new("m2", "bob", "hi alice").unwrap()).unwrap();
  alice.insert(NewMessage::new("m3", "alice", "how are you").unwrap()).unwrap();

  let settled = |engine: &SyncEngine<SqliteStore>| {
    let snapshot = engine.snapshot();
    snapshot.len() == 3 && snapshot.pending() == 0
  };
  wait_for("alice to settle", || settled(&alice)).await;
  wait_for("bob to settle", || settled(&bob)).await;

  assert_eq!(alice.snapshot().messages(), bob.snapshot().messages());
  assert_eq!(alice.cursor(), bob.cursor());
  assert_eq!(alice.cursor(), store.latest().await.unwrap());
}
