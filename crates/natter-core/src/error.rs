//! Error types for `natter-core`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("message id must not be empty")]
  EmptyId,

  #[error("invalid confirmation timestamp: {0}")]
  InvalidTimestamp(i64),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
