//! Server adapters: render a [`CompositionStream`] for HTTP responses
//!
//! `sse_frames` is framework-agnostic: each yielded `String` is one
//! ready-to-write SSE frame (`data: <json>\n\n`), with the terminal
//! `data: [DONE]\n\n` frame emitted only when the run completed normally.
//! The Axum integration lives behind the `server-adapters` feature.

use std::pin::Pin;

use futures::{Stream, StreamExt};

use crate::pipeline::{CompositionEvent, CompositionStream};
use crate::wire::DONE_FRAME;

#[cfg(feature = "server-adapters")]
pub mod axum;

/// Convert a composition stream into SSE frames ready for the wire.
pub fn sse_frames(stream: CompositionStream) -> Pin<Box<dyn Stream<Item = String> + Send>> {
    let frames = stream.map(|event| match event {
        CompositionEvent::Chunk(chunk) => chunk.to_sse_frame(),
        CompositionEvent::Done => DONE_FRAME.to_string(),
    });
    Box::pin(frames)
}
