//! HTTP and WebSocket server.
//!
//! Exposes the [`Workspace`] to the editor UI as a JSON API plus a
//! WebSocket channel for change notifications.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET` | `/api/document?path=` | Read a document |
//! | `PUT` | `/api/document` | Conditional write |
//! | `DELETE` | `/api/document?path=` | Delete a document |
//! | `GET` | `/api/documents` | Nested document tree |
//! | `GET` | `/api/search?q=` | Literal search |
//! | `GET` | `/api/search/bm25?q=` | Ranked lexical search |
//! | `GET` | `/api/search/vector?q=&k=` | Semantic search |
//! | `POST` | `/api/search/vector/backfill?limit=` | Embed documents lacking vectors |
//! | `GET` | `/api/tags` | Tag counts |
//! | `GET` | `/api/tags/{name}/files` | Documents carrying a tag |
//! | `GET` | `/api/backlinks?path=` | Links pointing at a document |
//! | `GET` | `/api/resolve-wikilink?link=` | Resolve a wikilink target |
//! | `GET`/`PUT` | `/api/settings` | Embedding settings |
//! | `GET` | `/api/stats` | Index and cache statistics |
//! | `POST` | `/api/reindex` | Full recrawl |
//! | `GET` | `/ws` | Change notifications |
//! | `GET` | `/health` | Health check |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "not_found", "message": "document not found: a.md" } }
//! ```
//!
//! Codes: `invalid_path` (400), `bad_request` (400), `embeddings_disabled` (400),
//! `not_found` (404), `provider_error` (502), `index_unavailable` (503),
//! `internal` (500).
//!
//! A write conflict is **not** an error. It comes back with status 200 as
//! `{"error": "conflict", "serverContent", "serverVersion"}` so the editor
//! can offer a merge.

use std::future::Future;
use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};

use crate::concurrency::WriteOutcome;
use crate::config::Config;
use crate::error::WorkspaceError;
use crate::models::{
    Backlink, Document, SearchResults, TagCount, TaggedFile, TreeNode, Version,
    WikilinkResolution,
};
use crate::semantic::BackfillReport;
use crate::settings::{SettingsUpdate, SettingsView};
use crate::workspace::{Workspace, WorkspaceStats};

#[derive(Clone)]
struct AppState {
    workspace: Arc<Workspace>,
}

/// Opens the workspace described by `config`, starts it, and serves until
/// Ctrl-C.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let workspace = Workspace::open(config.clone()).await?;
    workspace.start().await?;

    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    tracing::info!("listening on http://{}", listener.local_addr()?);

    serve(workspace.clone(), listener, async {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("shutdown requested");
    })
    .await?;

    workspace.stop().await;
    Ok(())
}

/// Serves an already-started workspace on `listener` until `shutdown`
/// completes.
pub async fn serve<F>(
    workspace: Arc<Workspace>,
    listener: tokio::net::TcpListener,
    shutdown: F,
) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    axum::serve(listener, router(workspace))
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}

pub fn router(workspace: Arc<Workspace>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route(
            "/api/document",
            get(handle_read).put(handle_write).delete(handle_delete),
        )
        .route("/api/documents", get(handle_tree))
        .route("/api/search", get(handle_search))
        .route("/api/search/bm25", get(handle_search_bm25))
        .route("/api/search/vector", get(handle_search_vector))
        .route("/api/search/vector/backfill", post(handle_backfill))
        .route("/api/tags", get(handle_tags))
        .route("/api/tags/{name}/files", get(handle_tag_files))
        .route("/api/backlinks", get(handle_backlinks))
        .route("/api/resolve-wikilink", get(handle_resolve_wikilink))
        .route("/api/settings", get(handle_get_settings).put(handle_put_settings))
        .route("/api/stats", get(handle_stats))
        .route("/api/reindex", post(handle_reindex))
        .route("/ws", get(handle_ws))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(AppState { workspace })
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

impl From<WorkspaceError> for AppError {
    fn from(err: WorkspaceError) -> Self {
        let (status, code) = match &err {
            WorkspaceError::InvalidPath(_) => (StatusCode::BAD_REQUEST, "invalid_path"),
            WorkspaceError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            WorkspaceError::EmbeddingsDisabled => {
                (StatusCode::BAD_REQUEST, "embeddings_disabled")
            }
            WorkspaceError::Provider(_) => (StatusCode::BAD_GATEWAY, "provider_error"),
            WorkspaceError::IndexUnavailable => {
                (StatusCode::SERVICE_UNAVAILABLE, "index_unavailable")
            }
            WorkspaceError::Io(_) | WorkspaceError::Database(_) => {
                tracing::error!("request failed: {}", err);
                (StatusCode::INTERNAL_SERVER_ERROR, "internal")
            }
        };
        AppError {
            status,
            code,
            message: err.to_string(),
        }
    }
}

type ApiResult<T> = Result<Json<T>, AppError>;

fn require(value: Option<String>, name: &str) -> Result<String, AppError> {
    value
        .filter(|v| !v.is_empty())
        .ok_or_else(|| bad_request(format!("missing query parameter: {}", name)))
}

// ============ Documents ============

#[derive(Deserialize)]
struct PathQuery {
    path: Option<String>,
}

async fn handle_read(
    State(state): State<AppState>,
    Query(q): Query<PathQuery>,
) -> ApiResult<Document> {
    let path = require(q.path, "path")?;
    Ok(Json(state.workspace.read(&path).await?))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WriteRequest {
    path: String,
    content: String,
    #[serde(default)]
    expected_version: Option<Version>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum WriteResponse {
    Committed {
        ok: bool,
        version: Version,
    },
    #[serde(rename_all = "camelCase")]
    Conflict {
        error: &'static str,
        server_content: String,
        server_version: Version,
    },
}

async fn handle_write(
    State(state): State<AppState>,
    Json(req): Json<WriteRequest>,
) -> ApiResult<WriteResponse> {
    let outcome = state
        .workspace
        .write(&req.path, &req.content, req.expected_version)
        .await?;
    Ok(Json(match outcome {
        WriteOutcome::Committed { version } => WriteResponse::Committed { ok: true, version },
        WriteOutcome::Conflict {
            server_content,
            server_version,
        } => WriteResponse::Conflict {
            error: "conflict",
            server_content,
            server_version,
        },
    }))
}

async fn handle_delete(
    State(state): State<AppState>,
    Query(q): Query<PathQuery>,
) -> ApiResult<serde_json::Value> {
    let path = require(q.path, "path")?;
    state.workspace.delete(&path).await?;
    Ok(Json(serde_json::json!({ "ok": true })))
}

async fn handle_tree(State(state): State<AppState>) -> ApiResult<Vec<TreeNode>> {
    Ok(Json(state.workspace.tree().await?))
}

// ============ Search ============

#[derive(Deserialize)]
struct SearchQuery {
    #[serde(default)]
    q: String,
    k: Option<usize>,
}

async fn handle_search(
    State(state): State<AppState>,
    Query(q): Query<SearchQuery>,
) -> Json<SearchResults> {
    Json(state.workspace.search_literal(&q.q))
}

async fn handle_search_bm25(
    State(state): State<AppState>,
    Query(q): Query<SearchQuery>,
) -> Json<SearchResults> {
    Json(state.workspace.search_bm25(&q.q))
}

async fn handle_search_vector(
    State(state): State<AppState>,
    Query(q): Query<SearchQuery>,
) -> ApiResult<SearchResults> {
    Ok(Json(state.workspace.search_vector(&q.q, q.k).await?))
}

#[derive(Deserialize)]
struct BackfillQuery {
    limit: Option<usize>,
}

async fn handle_backfill(
    State(state): State<AppState>,
    Query(q): Query<BackfillQuery>,
) -> ApiResult<BackfillReport> {
    Ok(Json(state.workspace.backfill(q.limit).await?))
}

// ============ Tags and links ============

async fn handle_tags(State(state): State<AppState>) -> Json<Vec<TagCount>> {
    Json(state.workspace.tags())
}

async fn handle_tag_files(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Json<Vec<TaggedFile>> {
    Json(state.workspace.files_for_tag(&name))
}

async fn handle_backlinks(
    State(state): State<AppState>,
    Query(q): Query<PathQuery>,
) -> ApiResult<Vec<Backlink>> {
    let path = require(q.path, "path")?;
    Ok(Json(state.workspace.backlinks(&path)?))
}

#[derive(Deserialize)]
struct LinkQuery {
    link: Option<String>,
}

async fn handle_resolve_wikilink(
    State(state): State<AppState>,
    Query(q): Query<LinkQuery>,
) -> ApiResult<WikilinkResolution> {
    let link = require(q.link, "link")?;
    Ok(Json(state.workspace.resolve_wikilink(&link)))
}

// ============ Settings and maintenance ============

async fn handle_get_settings(State(state): State<AppState>) -> Json<SettingsView> {
    Json(state.workspace.settings())
}

async fn handle_put_settings(
    State(state): State<AppState>,
    Json(update): Json<SettingsUpdate>,
) -> ApiResult<SettingsView> {
    state
        .workspace
        .update_settings(update)
        .map(Json)
        .map_err(|e| bad_request(e.to_string()))
}

async fn handle_stats(State(state): State<AppState>) -> ApiResult<WorkspaceStats> {
    Ok(Json(state.workspace.stats().await?))
}

async fn handle_reindex(State(state): State<AppState>) -> ApiResult<serde_json::Value> {
    match state.workspace.reindex().await {
        Ok(report) => Ok(Json(serde_json::json!({ "status": "done", "report": report }))),
        Err(WorkspaceError::IndexUnavailable) => {
            Ok(Json(serde_json::json!({ "status": "in-progress" })))
        }
        Err(e) => Err(e.into()),
    }
}

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

// ============ WebSocket ============

async fn handle_ws(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| run_session(socket, state.workspace))
}

/// Pushes change frames to one client until either side goes away.
/// Inbound messages are ignored apart from close.
async fn run_session(socket: WebSocket, workspace: Arc<Workspace>) {
    let (client_id, mut frames) = workspace.events().subscribe();
    let (mut sink, mut stream) = socket.split();

    loop {
        tokio::select! {
            frame = frames.recv() => {
                let Some(frame) = frame else { break };
                let text = match serde_json::to_string(&frame) {
                    Ok(text) => text,
                    Err(e) => {
                        tracing::warn!("failed to encode change frame: {}", e);
                        continue;
                    }
                };
                if sink.send(Message::Text(text.into())).await.is_err() {
                    break;
                }
            }
            incoming = stream.next() => match incoming {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }

    workspace.events().unsubscribe(&client_id);
}
