//! Client-side synchronization for natter.
//!
//! [`SyncEngine`] keeps a local, optimistically mutable map of messages in
//! step with an authoritative [`MessageStore`](natter_core::MessageStore):
//!
//! - [`SyncEngine::insert`] shows a message immediately as pending and writes
//!   it to the store in the background.
//! - A subscription task pulls only messages newer than the engine's cursor
//!   and hands them to [`SyncEngine::apply_confirmed`], where the store's
//!   version wins by last-writer-wins on `confirmed_at`.
//! - [`LiveView`] publishes a sorted [`Snapshot`] after every change.

mod subscription;

pub mod config;
pub mod engine;
pub mod error;
pub mod view;

pub use config::SyncConfig;
pub use engine::SyncEngine;
pub use error::{Error, Result};
pub use view::{LiveView, Snapshot, ViewSubscription};

#[cfg(test)]
mod tests;
