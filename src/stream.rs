//! Provider delta stream types

use crate::error::PipelineError;
use futures::Stream;
use std::pin::Pin;

/// One typed content delta produced by a provider adapter.
///
/// The reasoning/answer classification is adapter-internal (field markers or
/// text heuristics); downstream code only ever sees the tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentDelta {
    /// Intermediate thought content, not part of the final answer
    Reasoning { delta: String },
    /// User-visible completion content
    Answer { delta: String },
}

impl ContentDelta {
    pub fn reasoning<S: Into<String>>(delta: S) -> Self {
        Self::Reasoning {
            delta: delta.into(),
        }
    }

    pub fn answer<S: Into<String>>(delta: S) -> Self {
        Self::Answer {
            delta: delta.into(),
        }
    }
}

/// Delta stream - the lazy sequence a provider adapter produces.
///
/// Finite and not restartable. Dropping the stream releases the underlying
/// HTTP connection so the provider stops generating tokens.
pub type DeltaStream = Pin<Box<dyn Stream<Item = Result<ContentDelta, PipelineError>> + Send>>;
