//! Common SSE streaming plumbing
//!
//! Provider adapters all speak server-sent events over a streaming HTTP
//! body. This module owns the shared transport path: issuing the request,
//! classifying transport failures, parsing the body with
//! `eventsource-stream`, and flat-mapping adapter-specific event conversion
//! into a [`DeltaStream`].

use crate::error::PipelineError;
use crate::stream::{ContentDelta, DeltaStream};
use eventsource_stream::{Event, EventStreamError, Eventsource};
use futures_util::StreamExt;
use std::future::Future;
use std::pin::Pin;

/// Type alias for SSE event conversion futures
type SseDeltaFuture<'a> =
    Pin<Box<dyn Future<Output = Vec<Result<ContentDelta, PipelineError>>> + Send + Sync + 'a>>;

/// Converts provider-specific SSE events into typed content deltas.
///
/// One provider event may yield zero or more deltas (for example a chunk
/// carrying both a reasoning field and answer text).
pub trait SseDeltaConverter: Send + Sync {
    /// Convert an SSE event to zero or more content deltas
    fn convert_event(&self, event: Event) -> SseDeltaFuture<'_>;
}

/// Factory for provider delta streams
pub struct StreamFactory;

impl StreamFactory {
    /// Issue a streaming request and convert its SSE body into a
    /// [`DeltaStream`].
    ///
    /// Non-success statuses are read to completion and surfaced as
    /// [`PipelineError::ApiError`] with the response body. The literal
    /// `[DONE]` event and empty keep-alive events are consumed here; the
    /// converter only ever sees data events.
    pub async fn create_delta_stream<C>(
        request_builder: reqwest::RequestBuilder,
        converter: C,
    ) -> Result<DeltaStream, PipelineError>
    where
        C: SseDeltaConverter + Clone + Send + 'static,
    {
        let response = request_builder.send().await.map_err(classify_send_error)?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(PipelineError::ApiError {
                code: status.as_u16(),
                message: body.clone(),
                details: serde_json::from_str(&body).ok(),
            });
        }

        let delta_stream = response
            .bytes_stream()
            .eventsource()
            .take_while(|item| {
                // Stop at the terminal [DONE] frame; the connection is torn
                // down when the stream is dropped.
                let done = matches!(item, Ok(event) if event.data.trim() == "[DONE]");
                futures::future::ready(!done)
            })
            .then(move |item| {
                let converter = converter.clone();
                async move {
                    match item {
                        Ok(event) => {
                            if event.data.trim().is_empty() {
                                return vec![];
                            }
                            converter.convert_event(event).await
                        }
                        Err(e) => vec![Err(classify_stream_error(e))],
                    }
                }
            })
            .flat_map(futures::stream::iter);

        Ok(Box::pin(delta_stream))
    }
}

fn classify_send_error(e: reqwest::Error) -> PipelineError {
    if e.is_timeout() {
        PipelineError::TimeoutError(format!("request timed out: {e}"))
    } else {
        PipelineError::HttpError(format!("failed to send request: {e}"))
    }
}

fn classify_stream_error(e: EventStreamError<reqwest::Error>) -> PipelineError {
    match e {
        EventStreamError::Transport(inner) if inner.is_timeout() => {
            PipelineError::TimeoutError(format!("stream read timed out: {inner}"))
        }
        EventStreamError::Transport(inner) => {
            PipelineError::StreamError(format!("stream transport error: {inner}"))
        }
        other => PipelineError::StreamError(format!("SSE parsing error: {other}")),
    }
}
