//! Provider stream adapters
//!
//! Each adapter wraps one upstream inference API and exposes a single
//! operation: turn a message list plus model parameters into a lazy, finite
//! sequence of typed content deltas. How an upstream marks reasoning versus
//! answer content (a dedicated field, a tag heuristic) stays inside the
//! adapter.

use async_trait::async_trait;

use crate::error::PipelineError;
use crate::stream::DeltaStream;
use crate::types::{ChatMessage, GenerationParams};

pub mod anthropic;
pub mod deepseek;
pub mod openai;

pub use anthropic::AnthropicProvider;
pub use deepseek::DeepSeekProvider;
pub use openai::OpenAiCompatibleProvider;

/// One streaming request at the provider boundary
#[derive(Debug, Clone)]
pub struct StreamRequest {
    /// Conversation turns (system turns already extracted for providers
    /// that take instructions out of band)
    pub messages: Vec<ChatMessage>,
    /// Model identifier to request from the upstream
    pub model: String,
    /// Passthrough sampling parameters
    pub params: GenerationParams,
    /// System-level instruction, when the caller extracted one
    pub system: Option<String>,
}

impl StreamRequest {
    pub fn new(messages: Vec<ChatMessage>, model: impl Into<String>) -> Self {
        Self {
            messages,
            model: model.into(),
            params: GenerationParams::default(),
            system: None,
        }
    }

    pub fn with_params(mut self, params: GenerationParams) -> Self {
        self.params = params;
        self
    }

    pub fn with_system(mut self, system: Option<String>) -> Self {
        self.system = system;
        self
    }
}

/// A streaming inference provider.
///
/// `stream` issues one HTTP request and returns the typed delta sequence.
/// The sequence is finite and not restartable; dropping it releases the
/// transport resources.
#[async_trait]
pub trait ProviderStream: Send + Sync {
    /// Stable identifier used in logs
    fn provider_id(&self) -> &'static str;

    /// Open the delta stream for one request
    async fn stream(&self, request: StreamRequest) -> Result<DeltaStream, PipelineError>;
}
