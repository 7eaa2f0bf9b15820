use std::convert::Infallible;

use axum::extract::State;
use axum::response::sse::{Event, Sse};
use axum::Json;
use futures_util::stream::Stream;

use crate::api::{acquire_stream_permit, error_response, sse_response, ApiError};
use crate::models::WritingRequest;
use crate::state::AppState;

/// POST /api/write
pub async fn write(
    State(state): State<AppState>,
    Json(req): Json<WritingRequest>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let permit = acquire_stream_permit(&state).await?;
    let events = state.synthesizer.write(req).map_err(error_response)?;
    Ok(sse_response(events, permit))
}
