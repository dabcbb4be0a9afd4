//! HTTP API over the registry, ingestion pipeline, and retrieval engine.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Health check (returns version) |
//! | `GET`  | `/providers` | List providers (credentials masked) |
//! | `GET`  | `/providers/{id}/models` | A provider's model catalog |
//! | `POST` | `/providers/{id}/test` | Run a connection test |
//! | `POST` | `/providers/{id}/refresh` | Refresh the model catalog |
//! | `GET`  | `/collections` | List collections |
//! | `POST` | `/collections` | Create a collection |
//! | `POST` | `/collections/{id}/documents?filename=` | Upload a file (raw body) |
//! | `GET`  | `/documents/{id}/status` | Background ingestion status |
//! | `POST` | `/search` | Semantic search |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "validation", "message": "Validation error: limit must be at least 1" } }
//! ```
//!
//! Validation, unsupported-type, and parse errors map to 400, missing
//! entities to 404, name collisions to 409, provider failures to 502,
//! and everything else to 500.

use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

use docrag_core::models::{Collection, Document, Model, ProviderView};
use docrag_core::search::SearchHit;

use crate::app::App;
use crate::error::Error;
use crate::ingest::NewCollection;
use crate::registry::TestOutcome;
use crate::tasks::TaskState;

/// Largest accepted upload body.
const MAX_UPLOAD_BYTES: usize = 64 * 1024 * 1024;

#[derive(Clone)]
struct AppState {
    app: App,
}

/// Build the router. Exposed for tests that serve it on an ephemeral port.
pub fn router(app: App) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/providers", get(handle_list_providers))
        .route("/providers/{id}/models", get(handle_list_models))
        .route("/providers/{id}/test", post(handle_test_provider))
        .route("/providers/{id}/refresh", post(handle_refresh_models))
        .route(
            "/collections",
            get(handle_list_collections).post(handle_create_collection),
        )
        .route(
            "/collections/{id}/documents",
            post(handle_upload).layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES)),
        )
        .route("/documents/{id}/status", get(handle_document_status))
        .route("/search", post(handle_search))
        .layer(cors)
        .with_state(AppState { app })
}

/// Serve the API on `[server].bind` until the process is terminated.
pub async fn run_server(app: App) -> anyhow::Result<()> {
    let bind_addr = app.config.server.bind.clone();
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("docrag server listening on http://{}", bind_addr);
    axum::serve(listener, router(app)).await?;
    Ok(())
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

struct AppError(Error);

impl From<Error> for AppError {
    fn from(err: Error) -> Self {
        AppError(err)
    }
}

fn status_for(err: &Error) -> StatusCode {
    match err {
        Error::Validation(_) | Error::UnsupportedType(_) | Error::Parse(_) => {
            StatusCode::BAD_REQUEST
        }
        Error::NotFound { .. } => StatusCode::NOT_FOUND,
        Error::Duplicate { .. } => StatusCode::CONFLICT,
        Error::Provider(_) => StatusCode::BAD_GATEWAY,
        Error::Database(_) | Error::Config(_) | Error::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = status_for(&self.0);
        if status.is_server_error() {
            error!(error = %self.0, "Request failed");
        }
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.0.code().to_string(),
                message: self.0.to_string(),
            },
        };
        (status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<T, AppError>;

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

// ============ providers ============

async fn handle_list_providers(State(state): State<AppState>) -> ApiResult<Json<Vec<ProviderView>>> {
    Ok(Json(state.app.registry.list().await?))
}

async fn handle_list_models(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Vec<Model>>> {
    Ok(Json(state.app.registry.list_models(&id).await?))
}

/// The outcome is a 200 whether or not the connection succeeded; only an
/// unknown provider is an error.
async fn handle_test_provider(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<TestOutcome>> {
    Ok(Json(state.app.registry.test_provider(&id).await?))
}

async fn handle_refresh_models(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Vec<Model>>> {
    Ok(Json(state.app.registry.refresh_models(&id).await?))
}

// ============ collections ============

async fn handle_list_collections(
    State(state): State<AppState>,
) -> ApiResult<Json<Vec<Collection>>> {
    Ok(Json(state.app.pipeline.list_collections().await?))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateCollectionRequest {
    name: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    chunk_size: Option<usize>,
    #[serde(default)]
    chunk_overlap: Option<usize>,
    embedding_provider_id: String,
    embedding_model_id: String,
}

async fn handle_create_collection(
    State(state): State<AppState>,
    Json(req): Json<CreateCollectionRequest>,
) -> ApiResult<(StatusCode, Json<Collection>)> {
    let collection = state
        .app
        .pipeline
        .create_collection(NewCollection {
            name: req.name,
            description: req.description,
            chunk_size: req.chunk_size,
            chunk_overlap: req.chunk_overlap,
            embedding_provider_id: req.embedding_provider_id,
            embedding_model_id: req.embedding_model_id,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(collection)))
}

// ============ documents ============

#[derive(Deserialize)]
struct UploadParams {
    filename: String,
}

/// Write the raw body under the upload directory, then hand it to the
/// pipeline. Responds once the document is stored; chunking and embedding
/// continue in the background.
async fn handle_upload(
    State(state): State<AppState>,
    Path(collection_id): Path<String>,
    Query(params): Query<UploadParams>,
    body: Bytes,
) -> ApiResult<(StatusCode, Json<Document>)> {
    let filename = std::path::Path::new(&params.filename)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .filter(|n| !n.trim().is_empty())
        .ok_or_else(|| Error::Validation("filename must not be empty".to_string()))?;

    // Reject before touching disk.
    state.app.pipeline.get_collection(&collection_id).await?;
    if docrag_core::models::FileType::from_filename(&filename).is_none() {
        return Err(Error::UnsupportedType(filename).into());
    }

    let dir = state.app.config.upload_dir();
    tokio::fs::create_dir_all(&dir).await.map_err(Error::from)?;
    let stored = dir.join(format!("{}-{}", uuid::Uuid::new_v4(), filename));
    tokio::fs::write(&stored, &body).await.map_err(Error::from)?;

    match state
        .app
        .pipeline
        .upload(&collection_id, &stored, Some(&filename))
        .await
    {
        Ok(document) => Ok((StatusCode::ACCEPTED, Json(document))),
        Err(e) => {
            let _ = tokio::fs::remove_file(&stored).await;
            Err(e.into())
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DocumentStatus {
    document_id: String,
    /// `None` when the run predates this process.
    task: Option<TaskState>,
    chunk_count: usize,
    embedded_count: usize,
}

async fn handle_document_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<DocumentStatus>> {
    let chunks = state.app.pipeline.list_chunks(&id).await?;
    Ok(Json(DocumentStatus {
        task: state.app.pipeline.ingest_status(&id),
        chunk_count: chunks.len(),
        embedded_count: chunks.iter().filter(|c| c.embedding.is_some()).count(),
        document_id: id,
    }))
}

// ============ POST /search ============

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchRequest {
    query: String,
    #[serde(default)]
    collection_ids: Vec<String>,
    #[serde(default)]
    limit: Option<usize>,
}

#[derive(Serialize)]
struct SearchResponse {
    hits: Vec<SearchHit>,
}

async fn handle_search(
    State(state): State<AppState>,
    Json(req): Json<SearchRequest>,
) -> ApiResult<Json<SearchResponse>> {
    let hits = state
        .app
        .retrieval
        .search(&req.query, &req.collection_ids, req.limit)
        .await?;
    Ok(Json(SearchResponse { hits }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProviderError;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (Error::Validation("x".into()), StatusCode::BAD_REQUEST),
            (Error::UnsupportedType("a.txt".into()), StatusCode::BAD_REQUEST),
            (Error::Parse("bad".into()), StatusCode::BAD_REQUEST),
            (Error::not_found("Collection", "c1"), StatusCode::NOT_FOUND),
            (Error::duplicate("Collection", "docs"), StatusCode::CONFLICT),
            (
                Error::Provider(ProviderError::RateLimited {
                    provider: "openai".into(),
                }),
                StatusCode::BAD_GATEWAY,
            ),
            (
                Error::Database(anyhow::anyhow!("locked")),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(status_for(&err), status, "{}", err);
        }
    }
}
