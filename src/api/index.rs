use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;

use crate::api::{error_response, ApiError};
use crate::models::IndexStats;
use crate::state::AppState;

/// POST /api/index/rebuild - Rebuild the lexical index from the chunk store.
pub async fn rebuild(State(state): State<AppState>) -> Result<Json<IndexStats>, ApiError> {
    let lexical = state.lexical.clone();
    tokio::task::spawn_blocking(move || lexical.rebuild())
        .await
        .map_err(|e| {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Index rebuild task failed: {e}"),
            )
        })?
        .map_err(error_response)?;
    Ok(Json(stats_for(&state)))
}

/// GET /api/index/stats
pub async fn stats(State(state): State<AppState>) -> Json<IndexStats> {
    Json(stats_for(&state))
}

fn stats_for(state: &AppState) -> IndexStats {
    IndexStats {
        documents: state.store.documents().len(),
        chunks: state.store.len(),
        lexical_built: state.lexical.is_built(),
        lexical_indexed_chunks: state.lexical.indexed_len(),
        lexical_built_at: state.lexical.built_at(),
    }
}
