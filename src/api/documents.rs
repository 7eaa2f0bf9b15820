use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;

use crate::api::{error_response, ApiError};
use crate::models::{DocumentInfo, IngestReport, IngestRequest};
use crate::state::AppState;

/// POST /api/documents - Chunk and index loader output for one file.
///
/// The lexical index is not refreshed; call `/api/index/rebuild` after a batch.
pub async fn ingest(
    State(state): State<AppState>,
    Json(req): Json<IngestRequest>,
) -> Result<(StatusCode, Json<IngestReport>), ApiError> {
    if req.file_name.trim().is_empty() {
        return Err((StatusCode::BAD_REQUEST, "file_name is required".to_string()));
    }
    let report = state
        .ingestor
        .ingest(req.file_name.trim(), req.doc_id.as_deref(), &req.sections)
        .await
        .map_err(error_response)?;
    Ok((StatusCode::CREATED, Json(report)))
}

/// GET /api/documents
pub async fn list_documents(State(state): State<AppState>) -> Json<Vec<DocumentInfo>> {
    Json(state.store.documents())
}

/// DELETE /api/documents/{doc_id} - Vectors go immediately; lexical results
/// stay stale until the next rebuild.
pub async fn delete_document(
    State(state): State<AppState>,
    Path(doc_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.ingestor.delete(&doc_id).await.map_err(error_response)?;
    Ok(StatusCode::NO_CONTENT)
}
