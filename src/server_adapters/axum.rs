//! Axum-specific server adapter
//!
//! Converts a [`CompositionStream`] into an Axum SSE response. Axum writes
//! the `data: ` prefix and blank-line terminator itself, so events carry
//! only the JSON payload (or the literal `[DONE]` marker).

use std::convert::Infallible;

use axum::response::sse::{Event, Sse};
use futures::{Stream, StreamExt};

use crate::pipeline::{CompositionEvent, CompositionStream};

/// Convert a composition stream into an Axum SSE response.
///
/// ```rust,no_run
/// use axum::response::sse::Sse;
/// use tandem::pipeline::CompositionStream;
/// use tandem::server_adapters::axum::to_sse_response;
///
/// async fn handler(stream: CompositionStream) -> Sse<impl futures::Stream<Item = Result<axum::response::sse::Event, std::convert::Infallible>>> {
///     to_sse_response(stream)
/// }
/// ```
pub fn to_sse_response(
    stream: CompositionStream,
) -> Sse<impl Stream<Item = Result<Event, Infallible>> + Send> {
    let event_stream = stream.map(|event| {
        let sse_event = match event {
            CompositionEvent::Chunk(chunk) => {
                let json =
                    serde_json::to_string(&chunk).unwrap_or_else(|_| "{}".to_string());
                Event::default().data(json)
            }
            CompositionEvent::Done => Event::default().data("[DONE]"),
        };
        Ok(sse_event)
    });

    Sse::new(event_stream)
}
