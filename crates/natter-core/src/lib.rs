//! Core types and trait definitions for natter.
//!
//! This crate is deliberately free of HTTP and database dependencies.
//! All other crates depend on it.

// We intentionally use native `async fn` in traits (stabilised in Rust 1.75).
// Suppress the advisory lint about `Send` bounds on the returned futures.
#![allow(async_fn_in_trait)]

pub mod error;
pub mod message;
pub mod store;

pub use error::{Error, Result};
pub use message::{Cursor, Message, NewMessage, Version};
pub use store::{MessageStore, WriteOutcome};
