//! Handlers for `/messages` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/messages` | Optional `?after=<cursor>` (default 0); ascending by `confirmed_at` |
//! | `POST` | `/messages` | Body: [`NewMessageBody`]; 201 + stored message, 409 if the id exists |

use std::sync::Arc;

use axum::{
  Json,
  extract::{Query, State, rejection::QueryRejection},
  http::StatusCode,
  response::IntoResponse,
};
use natter_core::{Cursor, Message, MessageStore, NewMessage, WriteOutcome};
use serde::Deserialize;

use crate::error::ApiError;

// ─── List ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ListParams {
  /// Only messages confirmed strictly after this cursor are returned.
  #[serde(default)]
  pub after: Cursor,
}

/// `GET /messages[?after=<cursor>]`
pub async fn list<S>(
  State(store): State<Arc<S>>,
  params: Result<Query<ListParams>, QueryRejection>,
) -> Result<Json<Vec<Message>>, ApiError>
where
  S: MessageStore,
{
  let Query(params) = params.map_err(|e| ApiError::BadRequest(e.body_text()))?;
  let messages = store
    .read_since(params.after)
    .await
    .map_err(|e| ApiError::Store(Box::new(e)))?;
  Ok(Json(messages))
}

// ─── Create ───────────────────────────────────────────────────────────────────

/// JSON body accepted by `POST /messages`. Any timestamp sent by the client
/// is ignored; the store assigns one.
#[derive(Debug, Deserialize)]
pub struct NewMessageBody {
  pub id:     String,
  pub author: String,
  pub body:   String,
}

impl TryFrom<NewMessageBody> for NewMessage {
  type Error = natter_core::Error;

  fn try_from(b: NewMessageBody) -> Result<Self, Self::Error> {
    NewMessage::new(b.id, b.author, b.body)
  }
}

/// `POST /messages`: returns 201 + the stored [`Message`].
pub async fn create<S>(
  State(store): State<Arc<S>>,
  Json(body): Json<NewMessageBody>,
) -> Result<impl IntoResponse, ApiError>
where
  S: MessageStore,
{
  let input = NewMessage::try_from(body)?;
  let id = input.id.clone();
  let outcome = store
    .write(input)
    .await
    .map_err(|e| ApiError::Store(Box::new(e)))?;

  match outcome {
    WriteOutcome::Created(message) => Ok((StatusCode::CREATED, Json(message))),
    WriteOutcome::AlreadyExists => {
      Err(ApiError::Conflict(format!("message {id} already exists")))
    }
  }
}
