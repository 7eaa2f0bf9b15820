use std::convert::Infallible;

use axum::extract::State;
use axum::response::sse::{Event, Sse};
use axum::Json;
use futures_util::stream::Stream;

use crate::api::{acquire_stream_permit, error_response, sse_response, ApiError};
use crate::models::{ComparisonRequest, SummaryRequest};
use crate::state::AppState;

/// POST /api/analyze/summary - Document summary; map-reduce progress events
/// precede the merged text for long documents.
pub async fn summary(
    State(state): State<AppState>,
    Json(req): Json<SummaryRequest>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let permit = acquire_stream_permit(&state).await?;
    let events = state
        .synthesizer
        .summarize(req.doc_id.trim(), req.kind)
        .map_err(error_response)?;
    Ok(sse_response(events, permit))
}

/// POST /api/analyze/comparison - Comparison table event, then the analysis.
pub async fn comparison(
    State(state): State<AppState>,
    Json(req): Json<ComparisonRequest>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let permit = acquire_stream_permit(&state).await?;
    let events = state
        .synthesizer
        .compare(req.doc_ids, req.aspects)
        .map_err(error_response)?;
    Ok(sse_response(events, permit))
}
