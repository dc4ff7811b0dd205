//! [`MessageStore`] backed by the natter JSON API.

use std::time::Duration;

use natter_core::{Cursor, Message, MessageStore, NewMessage, WriteOutcome};
use reqwest::{Client, StatusCode};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
  #[error("HTTP error: {0}")]
  Http(#[from] reqwest::Error),

  #[error("{method} {path} → {status}")]
  Status {
    method: &'static str,
    path:   &'static str,
    status: StatusCode,
  },
}

/// Async HTTP proxy for a remote message store.
///
/// Cheap to clone; the inner [`reqwest::Client`] is `Arc`-based.
#[derive(Clone)]
pub struct HttpStore {
  client:   Client,
  base_url: String,
}

impl HttpStore {
  pub fn new(base_url: impl Into<String>) -> Result<Self, ClientError> {
    let client = Client::builder().timeout(Duration::from_secs(30)).build()?;
    Ok(Self { client, base_url: base_url.into() })
  }

  fn url(&self, path: &str) -> String {
    format!("{}/api{}", self.base_url.trim_end_matches('/'), path)
  }
}

impl MessageStore for HttpStore {
  type Error = ClientError;

  /// `POST /api/messages`
  async fn write(&self, input: NewMessage) -> Result<WriteOutcome, ClientError> {
    let resp = self
      .client
      .post(self.url("/messages"))
      .json(&input)
      .send()
      .await?;

    match resp.status() {
      StatusCode::CREATED => Ok(WriteOutcome::Created(resp.json().await?)),
      StatusCode::CONFLICT => Ok(WriteOutcome::AlreadyExists),
      status => Err(ClientError::Status {
        method: "POST",
        path: "/messages",
        status,
      }),
    }
  }

  /// `GET /api/messages?after=<cursor>`
  async fn read_since(&self, cursor: Cursor) -> Result<Vec<Message>, ClientError> {
    let resp = self
      .client
      .get(self.url("/messages"))
      .query(&[("after", cursor.value())])
      .send()
      .await?;

    if !resp.status().is_success() {
      return Err(ClientError::Status {
        method: "GET",
        path:   "/messages",
        status: resp.status(),
      });
    }
    Ok(resp.json().await?)
  }
}

#[cfg(test)]
mod tests {
  use std::sync::Arc;

  use natter_core::Version;
  use natter_store_sqlite::SqliteStore;
  use tokio::net::TcpListener;

  use super::*;

  /// Serve the real API over an in-memory store on an ephemeral port.
  async fn spawn_server() -> HttpStore {
    let store = SqliteStore::open_in_memory().await.unwrap();
    let app = axum::Router::new().nest("/api", natter_api::api_router(Arc::new(store)));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move { axum::serve(listener, app).await });
    HttpStore::new(format!("http://{addr}/")).unwrap()
  }

  fn new_message(id: &str) -> NewMessage {
    NewMessage::new(id, "alice", format!("body {id}")).unwrap()
  }

  #[tokio::test]
  async fn write_then_read_round_trips_through_the_api() {
    let store = spawn_server().await;

    let WriteOutcome::Created(stored) = store.write(new_message("a")).await.unwrap() else {
      panic!("expected Created");
    };
    assert!(stored.confirmed_at.is_confirmed());

    let all = store.read_since(Cursor::BEGINNING).await.unwrap();
    assert_eq!(all, vec![stored.clone()]);

    let Version::Confirmed(ts) = stored.confirmed_at else { unreachable!() };
    assert!(store.read_since(Cursor::new(ts)).await.unwrap().is_empty());
  }

  #[tokio::test]
  async fn duplicate_id_maps_to_already_exists() {
    let store = spawn_server().await;
    store.write(new_message("a")).await.unwrap();
    let outcome = store.write(new_message("a")).await.unwrap();
    assert_eq!(outcome, WriteOutcome::AlreadyExists);
  }

  #[tokio::test]
  async fn unreachable_server_is_an_error() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let store = HttpStore::new(format!("http://{addr}")).unwrap();
    let err = store.read_since(Cursor::BEGINNING).await.unwrap_err();
    assert!(matches!(err, ClientError::Http(_)));
  }
}
