//! DeepSeek provider adapter
//!
//! Wraps DeepSeek's OpenAI-compatible chat completions API, typically as the
//! reasoning provider. Reasoning/answer classification is adapter-internal
//! and has two modes:
//!
//! - [`ReasoningMode::Native`] (`deepseek-reasoner` and other R-series
//!   models): reasoning text arrives in the dedicated `reasoning_content`
//!   delta field, answer text in `content`.
//! - [`ReasoningMode::ThinkTags`]: for deployments that inline reasoning in
//!   `content` between `<think>` and `</think>` markers. The markers arrive
//!   as standalone delta tokens (DeepSeek's tokenizer emits them whole);
//!   text between them is classified as reasoning, the rest as answer, and
//!   the marker tokens themselves are swallowed.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use eventsource_stream::Event;
use serde::Deserialize;
use std::future::Future;
use std::pin::Pin;
use tokio::sync::Mutex;

use crate::error::PipelineError;
use crate::stream::{ContentDelta, DeltaStream};
use crate::utils::streaming::{SseDeltaConverter, StreamFactory};

use super::{ProviderStream, StreamRequest};

/// DeepSeek model constants
pub mod models {
    /// General-purpose chat model
    pub const CHAT: &str = "deepseek-chat";
    /// Reasoning model with native `reasoning_content` output
    pub const REASONER: &str = "deepseek-reasoner";
}

const DEFAULT_BASE_URL: &str = "https://api.deepseek.com/v1";

/// How reasoning content is marked inside the stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReasoningMode {
    /// Dedicated `reasoning_content` field (R-series models)
    #[default]
    Native,
    /// `<think>`/`</think>` markers inlined in `content`
    ThinkTags,
}

/// DeepSeek streaming provider
#[derive(Clone)]
pub struct DeepSeekProvider {
    api_key: String,
    base_url: String,
    mode: ReasoningMode,
    http_client: reqwest::Client,
}

impl DeepSeekProvider {
    /// Start building a provider instance.
    pub fn builder() -> DeepSeekBuilder {
        DeepSeekBuilder::new()
    }

    fn build_body(&self, request: &StreamRequest) -> serde_json::Value {
        let mut messages: Vec<serde_json::Value> = Vec::with_capacity(request.messages.len() + 1);
        if let Some(system) = &request.system {
            messages.push(serde_json::json!({"role": "system", "content": system}));
        }
        for msg in &request.messages {
            messages.push(serde_json::json!({"role": msg.role, "content": msg.content}));
        }

        let mut body = serde_json::json!({
            "model": request.model,
            "messages": messages,
            "stream": true,
        });
        if let Some(t) = request.params.temperature {
            body["temperature"] = serde_json::json!(t);
        }
        if let Some(tp) = request.params.top_p {
            body["top_p"] = serde_json::json!(tp);
        }
        if let Some(pp) = request.params.presence_penalty {
            body["presence_penalty"] = serde_json::json!(pp);
        }
        if let Some(fp) = request.params.frequency_penalty {
            body["frequency_penalty"] = serde_json::json!(fp);
        }
        body
    }

    fn build_headers(&self) -> Result<reqwest::header::HeaderMap, PipelineError> {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::CONTENT_TYPE,
            reqwest::header::HeaderValue::from_static("application/json"),
        );
        headers.insert(
            reqwest::header::AUTHORIZATION,
            reqwest::header::HeaderValue::from_str(&format!("Bearer {}", self.api_key))
                .map_err(|e| PipelineError::ConfigurationError(format!("Invalid API key: {e}")))?,
        );
        Ok(headers)
    }
}

#[async_trait]
impl ProviderStream for DeepSeekProvider {
    fn provider_id(&self) -> &'static str {
        "deepseek"
    }

    async fn stream(&self, request: StreamRequest) -> Result<DeltaStream, PipelineError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = self.build_body(&request);
        let headers = self.build_headers()?;

        tracing::debug!(model = %request.model, "opening DeepSeek stream");

        let request_builder = self.http_client.post(&url).headers(headers).json(&body);
        let converter = DeepSeekEventConverter::new(self.mode);
        StreamFactory::create_delta_stream(request_builder, converter).await
    }
}

/// Builder for [`DeepSeekProvider`]
#[derive(Debug, Clone, Default)]
pub struct DeepSeekBuilder {
    api_key: String,
    base_url: Option<String>,
    mode: ReasoningMode,
    http_client: Option<reqwest::Client>,
}

impl DeepSeekBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the API key (required)
    pub fn api_key<S: Into<String>>(mut self, api_key: S) -> Self {
        self.api_key = api_key.into();
        self
    }

    /// Set a custom base URL (optional)
    pub fn base_url<S: Into<String>>(mut self, base_url: S) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Select how reasoning content is classified
    pub fn reasoning_mode(mut self, mode: ReasoningMode) -> Self {
        self.mode = mode;
        self
    }

    /// Supply a pre-configured HTTP client (optional)
    pub fn http_client(mut self, client: reqwest::Client) -> Self {
        self.http_client = Some(client);
        self
    }

    /// Build the provider, validating required fields.
    pub fn build(self) -> Result<DeepSeekProvider, PipelineError> {
        if self.api_key.is_empty() {
            return Err(PipelineError::ConfigurationError(
                "API key is required".to_string(),
            ));
        }
        let http_client = match self.http_client {
            Some(client) => client,
            None => default_http_client()?,
        };
        Ok(DeepSeekProvider {
            api_key: self.api_key,
            base_url: self
                .base_url
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            mode: self.mode,
            http_client,
        })
    }
}

/// Shared default client: generous total timeout for slow reasoning models,
/// tight connect timeout so dead endpoints fail fast.
pub(crate) fn default_http_client() -> Result<reqwest::Client, PipelineError> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(600))
        .connect_timeout(Duration::from_secs(10))
        .read_timeout(Duration::from_secs(500))
        .build()
        .map_err(|e| PipelineError::ConfigurationError(format!("failed to build HTTP client: {e}")))
}

/// OpenAI-compatible stream event structures

#[derive(Debug, Deserialize)]
struct DeepSeekStreamEvent {
    #[serde(default)]
    choices: Vec<DeepSeekChoice>,
}

#[derive(Debug, Deserialize)]
struct DeepSeekChoice {
    #[serde(default)]
    delta: Option<DeepSeekDelta>,
}

#[derive(Debug, Deserialize)]
struct DeepSeekDelta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    reasoning_content: Option<String>,
}

#[derive(Debug, Default)]
struct TagState {
    in_think: bool,
}

/// Event converter applying the configured reasoning classification
#[derive(Clone)]
pub struct DeepSeekEventConverter {
    mode: ReasoningMode,
    tag_state: Arc<Mutex<TagState>>,
}

impl DeepSeekEventConverter {
    pub fn new(mode: ReasoningMode) -> Self {
        Self {
            mode,
            tag_state: Arc::new(Mutex::new(TagState::default())),
        }
    }

    async fn convert(&self, event: DeepSeekStreamEvent) -> Vec<ContentDelta> {
        let Some(delta) = event.choices.into_iter().next().and_then(|c| c.delta) else {
            return vec![];
        };

        let mut out = Vec::with_capacity(2);
        if let Some(reasoning) = delta.reasoning_content {
            if !reasoning.is_empty() {
                out.push(ContentDelta::reasoning(reasoning));
            }
        }
        if let Some(content) = delta.content {
            if !content.is_empty() {
                match self.mode {
                    ReasoningMode::Native => out.push(ContentDelta::answer(content)),
                    ReasoningMode::ThinkTags => {
                        if let Some(classified) = self.classify_tagged(content).await {
                            out.push(classified);
                        }
                    }
                }
            }
        }
        out
    }

    async fn classify_tagged(&self, content: String) -> Option<ContentDelta> {
        let mut state = self.tag_state.lock().await;
        match content.trim() {
            "<think>" => {
                state.in_think = true;
                None
            }
            "</think>" => {
                state.in_think = false;
                None
            }
            _ if state.in_think => Some(ContentDelta::reasoning(content)),
            _ => Some(ContentDelta::answer(content)),
        }
    }
}

impl SseDeltaConverter for DeepSeekEventConverter {
    fn convert_event(
        &self,
        event: Event,
    ) -> Pin<Box<dyn Future<Output = Vec<Result<ContentDelta, PipelineError>>> + Send + Sync + '_>>
    {
        Box::pin(async move {
            match serde_json::from_str::<DeepSeekStreamEvent>(&event.data) {
                Ok(parsed) => self.convert(parsed).await.into_iter().map(Ok).collect(),
                Err(e) => vec![Err(PipelineError::ParseError(format!(
                    "Failed to parse DeepSeek event: {e}"
                )))],
            }
        })
    }
}
