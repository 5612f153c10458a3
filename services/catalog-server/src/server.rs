//! HTTP API for file storage, slice queries and the catalog.
//!
//! Provides endpoints for:
//! - Uploading, downloading and deleting files by virtual path
//! - Extracting a hyperslab of one variable as little-endian bytes
//! - Dumping the catalog
//! - Health checks

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::{DefaultBodyLimit, Extension, Path},
    http::{header, HeaderName, Request, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{delete, get, post},
    Router,
};
use bytes::Bytes;
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, info_span, warn};
use uuid::Uuid;

use catalog_common::{CatalogError, CatalogResult, FileRef, QueryRequest, SliceResult};
use netcdf_reader::lookup;

use crate::state::AppState;

/// Element kind of a query response body.
pub const VALUE_TYPE_HEADER: HeaderName = HeaderName::from_static("x-value-type");

const QUERY_RETRY_DELAY: Duration = Duration::from_millis(100);

// ============================================================================
// Response Types
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct StoredFileResponse {
    pub path: String,
    pub id: String,
}

impl From<&FileRef> for StoredFileResponse {
    fn from(file: &FileRef) -> Self {
        Self {
            path: file.virtual_path.clone(),
            id: file.id.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub pending_jobs: usize,
}

/// A catalog error rendered as JSON with an explicit status.
pub struct ApiError {
    status: StatusCode,
    error: CatalogError,
}

impl ApiError {
    fn new(status: StatusCode, error: CatalogError) -> Self {
        Self { status, error }
    }
}

impl From<CatalogError> for ApiError {
    fn from(error: CatalogError) -> Self {
        let status = StatusCode::from_u16(error.http_status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        Self { status, error }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(serde_json::json!({ "error": self.error.to_string() })),
        )
            .into_response()
    }
}

// ============================================================================
// Router
// ============================================================================

pub fn create_router(state: Arc<AppState>, max_upload_bytes: usize) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let trace = TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
        info_span!(
            "request",
            id = %Uuid::new_v4(),
            method = %request.method(),
            uri = %request.uri(),
        )
    });

    Router::new()
        .route("/upload/*path", post(upload_handler))
        .route("/download/*path", get(download_handler))
        .route("/delete/*path", delete(delete_handler))
        .route("/query/*path", post(query_handler))
        .route("/catalog", get(catalog_handler))
        .route("/health", get(health_handler))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(trace)
        .layer(cors)
        .layer(Extension(state))
}

pub async fn run_server(
    state: Arc<AppState>,
    port: u16,
    max_upload_bytes: usize,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let app = create_router(state, max_upload_bytes);
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
    info!(port, "Catalog server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /upload/*path - store a file, replacing any previous one
async fn upload_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(path): Path<String>,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let file = state
        .storage
        .save(&path, &mut body.as_ref())
        .await
        .map_err(|e| match e {
            CatalogError::InvalidPath(_) => ApiError::from(e),
            other => ApiError::new(StatusCode::CONFLICT, other),
        })?;

    info!(path = %file.virtual_path, bytes = body.len(), "Upload stored");
    Ok((StatusCode::ACCEPTED, Json(StoredFileResponse::from(&file))))
}

/// GET /download/*path
async fn download_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(path): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let mut contents = Vec::new();
    state.storage.read(&path, &mut contents).await?;

    Ok((
        [(header::CONTENT_TYPE, "application/x-netcdf")],
        contents,
    ))
}

/// DELETE /delete/*path
async fn delete_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(path): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    // Hook failures after the file is gone are server-side.
    let file = state.storage.delete(&path).await.map_err(|e| {
        if e.is_client_error() {
            ApiError::from(e)
        } else {
            ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, e)
        }
    })?;

    info!(path = %file.virtual_path, "File deleted");
    Ok(Json(StoredFileResponse::from(&file)))
}

/// POST /query/*path - extract a hyperslab as little-endian bytes
async fn query_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(path): Path<String>,
    Json(request): Json<QueryRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let file = state.locate(&path).await?;
    let result = run_query(&state, &file, request).await?;

    Ok((
        [
            (header::CONTENT_TYPE, "application/octet-stream"),
            (VALUE_TYPE_HEADER, result.kind.as_str()),
        ],
        result.value,
    ))
}

/// GET /catalog - every distinct catalog entry
async fn catalog_handler(
    Extension(state): Extension<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.catalog_records().await?))
}

/// GET /health
async fn health_handler(Extension(state): Extension<Arc<AppState>>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok",
        pending_jobs: state.sync.pool().pending(),
    })
}

/// Run the lookup on a blocking thread, retrying failures that aren't the
/// request's fault.
async fn run_query(
    state: &AppState,
    file: &FileRef,
    request: QueryRequest,
) -> CatalogResult<SliceResult> {
    let mut attempt = 1;
    loop {
        let opener = state.opener.clone();
        let real_path = file.real_path.clone();
        let query = request.clone();

        let result = tokio::task::spawn_blocking(move || lookup(opener.as_ref(), &real_path, &query))
            .await
            .map_err(|e| CatalogError::Internal(format!("query task failed: {}", e)))
            .and_then(|result| result);

        match result {
            Err(e) if !e.is_client_error() && attempt < state.query_retries => {
                warn!(
                    path = %file.virtual_path,
                    attempt,
                    error = %e,
                    "Query failed, retrying"
                );
                tokio::time::sleep(QUERY_RETRY_DELAY * attempt).await;
                attempt += 1;
            }
            other => return other,
        }
    }
}
