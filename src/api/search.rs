use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;

use crate::api::{error_response, ApiError};
use crate::models::{SearchHit, SearchRequest, SearchResponse};
use crate::state::AppState;

const MAX_LIMIT: usize = 50;

/// POST /api/search - Fused BM25 + vector ranking (or vector-only on request).
pub async fn search(
    State(state): State<AppState>,
    Json(req): Json<SearchRequest>,
) -> Result<Json<SearchResponse>, ApiError> {
    let query = req.query.trim().to_string();
    if query.is_empty() {
        return Err((StatusCode::BAD_REQUEST, "Query is required".to_string()));
    }
    let limit = req.limit.clamp(1, MAX_LIMIT);
    let doc_filter = req.doc_id.as_deref();

    let (results, lexical_hits, vector_hits) = if req.vector_only {
        let results = state
            .retriever
            .vector_only(&query, limit, doc_filter)
            .await
            .map_err(error_response)?;
        let n = results.len();
        (results, 0, n)
    } else {
        let retrieval = state.retriever.fuse(&query, limit, doc_filter).await;
        (retrieval.results, retrieval.lexical_hits, retrieval.vector_hits)
    };

    let results = results
        .into_iter()
        .map(|r| SearchHit {
            doc_id: r.chunk.doc_id,
            chunk_index: r.chunk.chunk_index,
            source_locator: r.chunk.source_locator,
            text: r.chunk.text,
            score: r.score,
        })
        .collect();

    Ok(Json(SearchResponse {
        query,
        results,
        lexical_hits,
        vector_hits,
    }))
}
