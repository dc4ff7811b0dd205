//! Error type for `natter-sync`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("resubscribe threshold must be a positive integer")]
  InvalidThreshold,

  #[error("sync engine has been shut down")]
  ShutDown,
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
