use std::convert::Infallible;

use axum::extract::State;
use axum::response::sse::{Event, Sse};
use axum::Json;
use futures_util::stream::Stream;

use crate::api::{acquire_stream_permit, error_response, sse_response, ApiError};
use crate::models::ChatRequest;
use crate::state::AppState;

/// POST /api/chat - Retrieval-augmented answer, streamed as SSE.
///
/// The first event carries the citations (when anything was retrieved), then
/// text deltas, then `[DONE]`.
pub async fn chat(
    State(state): State<AppState>,
    Json(req): Json<ChatRequest>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let permit = acquire_stream_permit(&state).await?;
    let events = state.synthesizer.answer(req).map_err(error_response)?;
    Ok(sse_response(events, permit))
}
