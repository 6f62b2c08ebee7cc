//! Persistence gateway: the client's boundary to the block store.
//!
//! [`PersistenceGateway`] turns save payloads into store mutations and
//! classifies every outcome into a [`GatewayError`]. Nothing else crosses
//! the boundary: transport failures, bad statuses and undecodable bodies
//! all arrive at the coordinator as classified values.
//!
//! Two implementations:
//! - **[`HttpGateway`]** talks to the block store endpoints over HTTP.
//! - **[`StoreGateway`]** calls any [`BlockStore`] in-process (local
//!   transport, tests).
//!
//! # Classification
//!
//! | Outcome | Variant | Transient |
//! |---------|---------|-----------|
//! | 2xx with the expected JSON | `Ok` | – |
//! | 2xx with any other body | [`GatewayError::Protocol`] | yes |
//! | 4xx | [`GatewayError::Client`] | no |
//! | 5xx | [`GatewayError::Server`] | yes |
//! | connect / timeout / I/O | [`GatewayError::Network`] | yes |
//!
//! # Retry
//!
//! The gateway does not retry unless `client.max_retries > 0`. When enabled,
//! transient failures are retried with exponential backoff: 1s, 2s, 4s, …
//! (capped at 2^5). Client errors are never retried. Retrying an upsert is
//! safe: the store derives a created fragment's id from `(noteId, slug)`,
//! so a replayed payload updates rather than duplicates.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, warn};

use note_sync_core::models::{
    Fragment, NewNote, Note, NoteId, NoteKey, RenameNote, SavePayload, UpsertResponse,
};
use note_sync_core::store::{BlockStore, StoreError};

use crate::config::ClientConfig;

/// Classified gateway failure.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GatewayError {
    /// 4xx: the request itself is wrong (unknown note, malformed body).
    #[error("client error {status}: {message}")]
    Client { status: u16, message: String },

    /// 5xx: the store failed.
    #[error("server error {status}: {message}")]
    Server { status: u16, message: String },

    /// The request never produced a response.
    #[error("network error: {0}")]
    Network(String),

    /// A success status with a body that is not the expected JSON.
    #[error("unexpected response: {0}")]
    Protocol(String),
}

impl GatewayError {
    /// Whether retrying the same request could succeed.
    pub fn is_transient(&self) -> bool {
        !matches!(self, GatewayError::Client { .. })
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            GatewayError::Client { status, .. } | GatewayError::Server { status, .. } => {
                Some(*status)
            }
            _ => None,
        }
    }
}

impl From<StoreError> for GatewayError {
    fn from(e: StoreError) -> Self {
        let message = e.to_string();
        match e {
            StoreError::NoteNotFound(_) => GatewayError::Client {
                status: 404,
                message,
            },
            StoreError::Invalid(_) => GatewayError::Client {
                status: 400,
                message,
            },
            StoreError::Conflict(_) => GatewayError::Client {
                status: 409,
                message,
            },
            StoreError::Backend(_) => GatewayError::Server {
                status: 500,
                message,
            },
        }
    }
}

pub type GatewayResult<T> = std::result::Result<T, GatewayError>;

/// Client-side contract to the block store.
#[async_trait]
pub trait PersistenceGateway: Send + Sync {
    /// `PUT /blocks`: update `payload.id` in place, or create a fragment.
    async fn upsert(&self, payload: &SavePayload) -> GatewayResult<Fragment>;

    /// `GET /blocks?noteId=`: every fragment of a note.
    async fn list_fragments(&self, note_id: NoteId) -> GatewayResult<Vec<Fragment>>;

    /// `GET /notes/{key}`.
    async fn fetch_note(&self, key: &NoteKey) -> GatewayResult<Note>;

    /// `POST /notes`.
    async fn create_note(&self, new: &NewNote) -> GatewayResult<Note>;

    /// `PATCH /notes/{id}`: titles are saved separately from content.
    async fn rename_note(&self, id: NoteId, title: &str) -> GatewayResult<Note>;
}

// ============ In-process gateway ============

/// Gateway over an in-process [`BlockStore`].
///
/// Store errors are classified as the HTTP server would classify them,
/// so the coordinator sees identical outcomes on either transport.
pub struct StoreGateway {
    store: Arc<dyn BlockStore>,
}

impl StoreGateway {
    pub fn new(store: Arc<dyn BlockStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl PersistenceGateway for StoreGateway {
    async fn upsert(&self, payload: &SavePayload) -> GatewayResult<Fragment> {
        Ok(self.store.upsert_fragment(payload).await?)
    }

    async fn list_fragments(&self, note_id: NoteId) -> GatewayResult<Vec<Fragment>> {
        Ok(self.store.list_fragments(note_id).await?)
    }

    async fn fetch_note(&self, key: &NoteKey) -> GatewayResult<Note> {
        self.store
            .get_note(key)
            .await?
            .ok_or_else(|| GatewayError::from(StoreError::NoteNotFound(key.to_string())))
    }

    async fn create_note(&self, new: &NewNote) -> GatewayResult<Note> {
        Ok(self.store.create_note(new).await?)
    }

    async fn rename_note(&self, id: NoteId, title: &str) -> GatewayResult<Note> {
        Ok(self.store.rename_note(id, title).await?)
    }
}

// ============ HTTP gateway ============

/// Error body returned by the block store server.
#[derive(Deserialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
    message: String,
}

/// Gateway speaking the block store's HTTP API.
pub struct HttpGateway {
    client: reqwest::Client,
    base_url: String,
    max_retries: u32,
}

impl HttpGateway {
    pub fn new(config: &ClientConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            max_retries: config.max_retries,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Sends the request built by `build`, retrying transient failures
    /// when `max_retries > 0`.
    async fn send_json<T, F>(&self, build: F) -> GatewayResult<T>
    where
        T: DeserializeOwned,
        F: Fn(&reqwest::Client) -> reqwest::RequestBuilder + Send + Sync,
    {
        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                // Exponential backoff: 1s, 2s, 4s, 8s, ...
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            match self.attempt(&build).await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() => {
                    debug!(attempt, error = %e, "transient gateway failure");
                    last_err = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_err.unwrap_or_else(|| GatewayError::Network("no attempt made".into())))
    }

    async fn attempt<T, F>(&self, build: &F) -> GatewayResult<T>
    where
        T: DeserializeOwned,
        F: Fn(&reqwest::Client) -> reqwest::RequestBuilder + Send + Sync,
    {
        let response = build(&self.client)
            .send()
            .await
            .map_err(|e| GatewayError::Network(e.to_string()))?;
        let status = response.status();

        if status.is_success() {
            let body = response
                .bytes()
                .await
                .map_err(|e| GatewayError::Network(e.to_string()))?;
            return serde_json::from_slice(&body).map_err(|e| GatewayError::Protocol(e.to_string()));
        }

        let body = response.text().await.unwrap_or_default();
        Err(classify_status(status, &body))
    }
}

/// Maps a non-success status and its body to a [`GatewayError`].
fn classify_status(status: StatusCode, body: &str) -> GatewayError {
    let message = serde_json::from_str::<ErrorBody>(body)
        .map(|b| b.error.message)
        .unwrap_or_else(|_| body.to_string());
    if status.is_client_error() {
        GatewayError::Client {
            status: status.as_u16(),
            message,
        }
    } else if status.is_server_error() {
        GatewayError::Server {
            status: status.as_u16(),
            message,
        }
    } else {
        warn!(%status, "unexpected non-success status");
        GatewayError::Protocol(format!("unexpected status {}", status))
    }
}

#[async_trait]
impl PersistenceGateway for HttpGateway {
    async fn upsert(&self, payload: &SavePayload) -> GatewayResult<Fragment> {
        let url = self.url("/blocks");
        let response: UpsertResponse = self
            .send_json(|client| client.put(&url).json(payload))
            .await?;
        Ok(response.block)
    }

    async fn list_fragments(&self, note_id: NoteId) -> GatewayResult<Vec<Fragment>> {
        let url = self.url("/blocks");
        self.send_json(|client| client.get(&url).query(&[("noteId", note_id)]))
            .await
    }

    async fn fetch_note(&self, key: &NoteKey) -> GatewayResult<Note> {
        let url = self.url(&format!("/notes/{}", key));
        self.send_json(|client| client.get(&url)).await
    }

    async fn create_note(&self, new: &NewNote) -> GatewayResult<Note> {
        let url = self.url("/notes");
        self.send_json(|client| client.post(&url).json(new)).await
    }

    async fn rename_note(&self, id: NoteId, title: &str) -> GatewayResult<Note> {
        let url = self.url(&format!("/notes/{}", id));
        let body = RenameNote {
            title: title.to_string(),
        };
        self.send_json(|client| client.patch(&url).json(&body)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use note_sync_core::models::FragmentMetadata;
    use note_sync_core::store::memory::InMemoryBlockStore;

    #[test]
    fn test_transient_classification() {
        assert!(!GatewayError::Client {
            status: 404,
            message: String::new()
        }
        .is_transient());
        assert!(GatewayError::Server {
            status: 503,
            message: String::new()
        }
        .is_transient());
        assert!(GatewayError::Network("refused".into()).is_transient());
        assert!(GatewayError::Protocol("html".into()).is_transient());
    }

    #[test]
    fn test_classify_status_reads_error_body() {
        let err = classify_status(
            StatusCode::NOT_FOUND,
            r#"{"error":{"code":"not_found","message":"note not found: 4"}}"#,
        );
        assert_eq!(
            err,
            GatewayError::Client {
                status: 404,
                message: "note not found: 4".into()
            }
        );
        let err = classify_status(StatusCode::BAD_GATEWAY, "upstream down");
        assert_eq!(err.status(), Some(502));
        assert!(err.is_transient());
    }

    #[test]
    fn test_store_error_mapping() {
        let e: GatewayError = StoreError::Invalid("x".into()).into();
        assert_eq!(e.status(), Some(400));
        let e: GatewayError = StoreError::Conflict("x".into()).into();
        assert_eq!(e.status(), Some(409));
        let e: GatewayError = StoreError::Backend(anyhow::anyhow!("disk")).into();
        assert_eq!(e.status(), Some(500));
    }

    #[tokio::test]
    async fn test_store_gateway_upsert_is_idempotent() {
        let store = Arc::new(InMemoryBlockStore::new());
        let gateway = StoreGateway::new(store.clone());
        let note = gateway
            .create_note(&NewNote {
                title: "n".into(),
                content: None,
            })
            .await
            .unwrap();
        let mut payload = SavePayload {
            content: "<p>same</p>".into(),
            note_id: note.id,
            slug: SavePayload::fresh_slug(),
            metadata: FragmentMetadata::default(),
            block_type: "text".into(),
            order: 0,
            id: None,
        };
        let first = gateway.upsert(&payload).await.unwrap();
        payload.id = Some(first.id.clone());
        payload.slug = SavePayload::fresh_slug();
        let second = gateway.upsert(&payload).await.unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(first.content, second.content);
        assert_eq!(store.fragment_count(), 1);
    }

    #[tokio::test]
    async fn test_store_gateway_unknown_note_is_client_error() {
        let gateway = StoreGateway::new(Arc::new(InMemoryBlockStore::new()));
        let err = gateway.fetch_note(&NoteKey::Id(3)).await.unwrap_err();
        assert_eq!(err.status(), Some(404));
        assert!(!err.is_transient());
    }
}
