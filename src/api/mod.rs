//! Axum handlers. Thin: each one validates, calls into the library and maps
//! [`RagError`] onto an HTTP status.

pub mod analysis;
pub mod chat;
pub mod documents;
pub mod index;
pub mod search;
pub mod writing;

use std::convert::Infallible;

use axum::http::StatusCode;
use axum::response::sse::{Event, Sse};
use futures_util::stream::{Stream, StreamExt};
use tokio::sync::OwnedSemaphorePermit;

use crate::error::RagError;
use crate::state::AppState;
use crate::synthesis::events::frame_payload;
use crate::synthesis::EventStream;

pub type ApiError = (StatusCode, String);

pub fn error_response(e: RagError) -> ApiError {
    let status = match &e {
        RagError::UnsupportedFormat(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
        RagError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
        RagError::DocumentNotFound(_) => StatusCode::NOT_FOUND,
        RagError::IndexUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        RagError::UpstreamTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
        RagError::Upstream { .. } | RagError::ParseFailure(_) => StatusCode::BAD_GATEWAY,
        RagError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, e.to_string())
}

/// Wait for a generation slot; the permit lives as long as the stream.
async fn acquire_stream_permit(state: &AppState) -> Result<OwnedSemaphorePermit, ApiError> {
    state
        .stream_semaphore
        .clone()
        .acquire_owned()
        .await
        .map_err(|_| {
            (
                StatusCode::SERVICE_UNAVAILABLE,
                "Generation service at capacity".to_string(),
            )
        })
}

/// One SSE `data:` line per event.
fn sse_response(
    events: EventStream,
    permit: OwnedSemaphorePermit,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let stream = events.map(move |event| {
        let _permit = &permit;
        Ok(Event::default().data(frame_payload(&event)))
    });
    Sse::new(stream)
}
