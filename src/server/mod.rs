//! HTTP surface over the ingestion pipeline.
//!
//! Thin pass-through: handlers read the request, invoke the pipeline with
//! injected clients and store, and map [`PipelineError`] onto HTTP
//! statuses. No pipeline logic lives here.
//!
//! | Method/Path | Drives |
//! |---|---|
//! | GET `/chunks/{query}` | remote query |
//! | GET `/recursive/chunks/{query}` | remote query with hit expansion |
//! | POST `/chunks` | single-fragment embed+insert |
//! | POST `/batch` | asynchronous job ingestion |
//! | POST `/rtbatch` | synchronous batch ingestion |
//! | POST `/local/rtbatch` | local sequential ingestion |
//! | GET `/local/chunks/{query}` | local query |
//! | GET `/healthz` | store row count |

use std::sync::Arc;

use axum::extract::{Multipart, Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::error;

use crate::embeddings::{JobClient, LocalEmbedder, RemoteEmbedder};
use crate::pipeline::{
    IngestPipeline, RECURSIVE_DEPTH, TOP_K, recursive_search_chunks, search_chunks,
};
use crate::stores::{ChunkRow, ChunkStore, ScoredChunk};
use crate::types::PipelineError;

/// Injected collaborators shared by all handlers.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: IngestPipeline,
    pub remote: Arc<RemoteEmbedder>,
    pub local: Arc<LocalEmbedder>,
    pub jobs: Arc<JobClient>,
    pub store: Arc<dyn ChunkStore>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/chunks/{query}", get(query_remote))
        .route("/recursive/chunks/{query}", get(query_recursive))
        .route("/chunks", post(insert_chunk))
        .route("/batch", post(ingest_batch_job))
        .route("/rtbatch", post(ingest_rtbatch))
        .route("/local/rtbatch", post(ingest_local_rtbatch))
        .route("/local/chunks/{query}", get(query_local))
        .route("/healthz", get(healthz))
        .with_state(state)
}

/// Wrapper mapping pipeline errors onto HTTP responses.
struct ApiError(PipelineError);

impl From<PipelineError> for ApiError {
    fn from(err: PipelineError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            PipelineError::Validation(_) => StatusCode::BAD_REQUEST,
            PipelineError::Provider(_)
            | PipelineError::JobTerminal { .. }
            | PipelineError::RetryExhausted { .. } => StatusCode::BAD_GATEWAY,
            PipelineError::Storage(_) | PipelineError::Reconciliation(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        error!(error = %self.0, %status, "request failed");
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InsertChunkRequest {
    document_id: String,
    chunk_index: usize,
    content: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct IngestResponse {
    success: bool,
    chunks_processed: usize,
}

async fn query_remote(
    State(state): State<AppState>,
    Path(query): Path<String>,
) -> Result<Json<Vec<ScoredChunk>>, ApiError> {
    let hits = search_chunks(state.remote.as_ref(), state.store.as_ref(), &query, TOP_K).await?;
    Ok(Json(hits))
}

async fn query_recursive(
    State(state): State<AppState>,
    Path(query): Path<String>,
) -> Result<Json<Vec<ScoredChunk>>, ApiError> {
    let hits = recursive_search_chunks(
        state.remote.as_ref(),
        state.store.as_ref(),
        &query,
        TOP_K,
        RECURSIVE_DEPTH,
    )
    .await?;
    Ok(Json(hits))
}

async fn query_local(
    State(state): State<AppState>,
    Path(query): Path<String>,
) -> Result<Json<Vec<ScoredChunk>>, ApiError> {
    let hits = search_chunks(state.local.as_ref(), state.store.as_ref(), &query, TOP_K).await?;
    Ok(Json(hits))
}

async fn insert_chunk(
    State(state): State<AppState>,
    Json(request): Json<InsertChunkRequest>,
) -> Result<Json<ChunkRow>, ApiError> {
    let row = state
        .pipeline
        .insert_one(
            state.remote.as_ref(),
            state.store.as_ref(),
            &request.document_id,
            request.chunk_index,
            &request.content,
        )
        .await?;
    Ok(Json(row))
}

async fn ingest_batch_job(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<StatusCode, ApiError> {
    let upload = read_upload(multipart).await?;
    state
        .pipeline
        .ingest_job(
            state.jobs.as_ref(),
            state.store.as_ref(),
            &upload.name,
            &upload.text,
        )
        .await?;
    Ok(StatusCode::OK)
}

async fn ingest_rtbatch(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<IngestResponse>, ApiError> {
    let upload = read_upload(multipart).await?;
    let report = state
        .pipeline
        .ingest_sync(
            state.remote.as_ref(),
            state.store.as_ref(),
            &upload.name,
            &upload.text,
        )
        .await?;
    Ok(Json(IngestResponse {
        success: true,
        chunks_processed: report.chunks_processed,
    }))
}

async fn ingest_local_rtbatch(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<IngestResponse>, ApiError> {
    let upload = read_upload(multipart).await?;
    let report = state
        .pipeline
        .ingest_local(
            state.local.as_ref(),
            state.store.as_ref(),
            &upload.name,
            &upload.text,
        )
        .await?;
    Ok(Json(IngestResponse {
        success: true,
        chunks_processed: report.chunks_processed,
    }))
}

async fn healthz(State(state): State<AppState>) -> Result<Json<serde_json::Value>, ApiError> {
    let chunks = state.store.count().await?;
    Ok(Json(json!({ "chunks": chunks })))
}

struct Upload {
    /// Uploaded file name, used as the document id.
    name: String,
    text: String,
}

/// Pulls the first file field out of a multipart upload. A missing file is
/// a validation error, not a panic.
async fn read_upload(mut multipart: Multipart) -> Result<Upload, PipelineError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| PipelineError::Validation(format!("malformed multipart body: {err}")))?
    {
        let is_file = field.file_name().is_some() || field.name() == Some("file");
        if !is_file {
            continue;
        }
        let name = field
            .file_name()
            .map(str::to_string)
            .unwrap_or_else(|| "upload".to_string());
        let text = field
            .text()
            .await
            .map_err(|err| PipelineError::Validation(format!("unreadable upload: {err}")))?;
        return Ok(Upload { name, text });
    }
    Err(PipelineError::Validation(
        "missing file upload".to_string(),
    ))
}
