//! Block store HTTP server.
//!
//! Serves any [`BlockStore`] over the JSON API that [`HttpGateway`]
//! speaks. `nsync serve` runs it over the SQLite store; the integration
//! tests run it over the in-memory one.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Health check (returns version) |
//! | `PUT`  | `/blocks` | Upsert a fragment, returns `{ "block": … }` |
//! | `GET`  | `/blocks?noteId=` | All fragments of a note |
//! | `POST` | `/notes` | Create a note |
//! | `GET`  | `/notes/{key}` | Fetch a note by id or slug |
//! | `PATCH`| `/notes/{id}` | Rename a note |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "not_found", "message": "note not found: 7" } }
//! ```
//!
//! Error codes: `bad_request` (400), `not_found` (404), `conflict` (409),
//! `internal` (500).
//!
//! [`HttpGateway`]: crate::gateway::HttpGateway

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

use note_sync_core::models::{
    Fragment, NewNote, Note, NoteId, NoteKey, RenameNote, SavePayload, UpsertResponse,
};
use note_sync_core::store::{BlockStore, StoreError};

use crate::config::Config;
use crate::sqlite_store::SqliteBlockStore;

#[derive(Clone)]
struct AppState {
    store: Arc<dyn BlockStore>,
}

/// Starts the server on `[server].bind` over the configured SQLite database.
///
/// Runs until the process is terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let pool = crate::db::connect(config).await?;
    crate::migrate::apply(&pool).await?;
    let store: Arc<dyn BlockStore> = Arc::new(SqliteBlockStore::new(pool));

    let listener = TcpListener::bind(&config.server.bind).await?;
    info!(addr = %listener.local_addr()?, "block store listening");
    serve(listener, store).await
}

/// Serves `store` on an already-bound listener.
pub async fn serve(listener: TcpListener, store: Arc<dyn BlockStore>) -> anyhow::Result<()> {
    axum::serve(listener, router(store)).await?;
    Ok(())
}

/// Builds the router. Exposed so callers can mount it elsewhere.
pub fn router(store: Arc<dyn BlockStore>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/blocks", put(handle_upsert).get(handle_list_blocks))
        .route("/notes", post(handle_create_note))
        .route("/notes/{key}", get(handle_get_note).patch(handle_rename_note))
        .layer(cors)
        .with_state(AppState { store })
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code.to_string(),
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request",
        message: message.into(),
    }
}

fn not_found(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        code: "not_found",
        message: message.into(),
    }
}

impl From<StoreError> for AppError {
    fn from(e: StoreError) -> Self {
        let message = e.to_string();
        match e {
            StoreError::NoteNotFound(_) => not_found(message),
            StoreError::Invalid(_) => bad_request(message),
            StoreError::Conflict(_) => AppError {
                status: StatusCode::CONFLICT,
                code: "conflict",
                message,
            },
            StoreError::Backend(_) => {
                error!(error = %message, "store failure");
                AppError {
                    status: StatusCode::INTERNAL_SERVER_ERROR,
                    code: "internal",
                    message,
                }
            }
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        bad_request(rejection.body_text())
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ /blocks ============

async fn handle_upsert(
    State(state): State<AppState>,
    payload: Result<Json<SavePayload>, JsonRejection>,
) -> Result<Json<UpsertResponse>, AppError> {
    let Json(payload) = payload?;
    let block = state.store.upsert_fragment(&payload).await?;
    Ok(Json(UpsertResponse { block }))
}

#[derive(Deserialize)]
struct ListQuery {
    #[serde(rename = "noteId")]
    note_id: Option<NoteId>,
}

async fn handle_list_blocks(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<Fragment>>, AppError> {
    let note_id = query
        .note_id
        .ok_or_else(|| bad_request("noteId query parameter is required"))?;
    Ok(Json(state.store.list_fragments(note_id).await?))
}

// ============ /notes ============

async fn handle_create_note(
    State(state): State<AppState>,
    new: Result<Json<NewNote>, JsonRejection>,
) -> Result<(StatusCode, Json<Note>), AppError> {
    let Json(new) = new?;
    let note = state.store.create_note(&new).await?;
    Ok((StatusCode::CREATED, Json(note)))
}

async fn handle_get_note(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<Note>, AppError> {
    let key = NoteKey::parse(&key);
    state
        .store
        .get_note(&key)
        .await?
        .map(Json)
        .ok_or_else(|| not_found(format!("note not found: {}", key)))
}

async fn handle_rename_note(
    State(state): State<AppState>,
    Path(key): Path<String>,
    body: Result<Json<RenameNote>, JsonRejection>,
) -> Result<Json<Note>, AppError> {
    let id: NoteId = key
        .parse()
        .map_err(|_| bad_request(format!("note id must be numeric: {}", key)))?;
    let Json(body) = body?;
    Ok(Json(state.store.rename_note(id, &body.title).await?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_errors_map_to_statuses() {
        let cases = [
            (StoreError::NoteNotFound("1".into()), StatusCode::NOT_FOUND, "not_found"),
            (StoreError::Invalid("x".into()), StatusCode::BAD_REQUEST, "bad_request"),
            (StoreError::Conflict("x".into()), StatusCode::CONFLICT, "conflict"),
            (
                StoreError::Backend(anyhow::anyhow!("disk full")),
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal",
            ),
        ];
        for (err, status, code) in cases {
            let app: AppError = err.into();
            assert_eq!(app.status, status);
            assert_eq!(app.code, code);
        }
    }
}
