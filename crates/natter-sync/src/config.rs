//! Tuning knobs for [`SyncEngine`](crate::SyncEngine).

use std::{num::NonZeroUsize, time::Duration};

use crate::{Error, Result};

/// Configuration consumed by the sync engine.
///
/// The key and version of a record are fixed by the type: `Message::id` and
/// `Message::confirmed_at`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncConfig {
  /// Number of newly observed confirmed messages after which the engine tears
  /// down its subscription and opens a new one at the current cursor. Low
  /// values churn more; high values let one subscription's result set grow.
  pub resubscribe_threshold: NonZeroUsize,
  /// How often a subscription re-reads the store.
  pub poll_interval:         Duration,
  /// Pause before re-subscribing after a failed read.
  pub retry_delay:           Duration,
}

impl SyncConfig {
  pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);
  pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(1);

  /// There is no default threshold; callers must choose one.
  pub fn new(resubscribe_threshold: usize) -> Result<Self> {
    let resubscribe_threshold =
      NonZeroUsize::new(resubscribe_threshold).ok_or(Error::InvalidThreshold)?;
    Ok(Self {
      resubscribe_threshold,
      poll_interval: Self::DEFAULT_POLL_INTERVAL,
      retry_delay: Self::DEFAULT_RETRY_DELAY,
    })
  }

  pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
    self.poll_interval = poll_interval;
    self
  }

  pub fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
    self.retry_delay = retry_delay;
    self
  }
}
