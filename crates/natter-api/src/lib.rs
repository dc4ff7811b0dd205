//! JSON REST API for natter.
//!
//! Exposes an axum [`Router`] backed by any [`natter_core::MessageStore`].
//! Auth, TLS, and transport concerns are the caller's responsibility.
//!
//! # Mounting
//!
//! ```rust,ignore
//! .nest("/api", natter_api::api_router(store.clone()))
//! ```

pub mod error;
pub mod messages;

use std::sync::Arc;

use axum::{Router, http::Uri, routing::get};
use natter_core::MessageStore;

pub use error::ApiError;

/// Build a fully-materialised API router for `store`.
///
/// The returned `Router<()>` can be nested into any parent router regardless
/// of its own state type.
pub fn api_router<S>(store: Arc<S>) -> Router<()>
where
  S: MessageStore + 'static,
{
  Router::new()
    .route("/messages", get(messages::list::<S>).post(messages::create::<S>))
    .fallback(not_found)
    .with_state(store)
}

async fn not_found(uri: Uri) -> ApiError {
  ApiError::NotFound(format!("no route for {}", uri.path()))
}

// ─── Integration tests ────────────────────────────────────────────────────────
