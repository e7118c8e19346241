//! Anthropic provider adapter
//!
//! Wraps the Anthropic Messages API, typically as the answer provider. The
//! extracted system instruction travels in the request's `system` field
//! rather than as a conversation turn. `content_block_delta` text becomes
//! answer deltas; extended-thinking deltas become reasoning deltas.
//!
//! Parameter mapping: the API requires `max_tokens` (defaulted here),
//! accepts `temperature` only in [0.0, 1.0] (clamped), and has no
//! presence/frequency penalty knobs (dropped).

use async_trait::async_trait;
use eventsource_stream::Event;
use serde::Deserialize;
use std::future::Future;
use std::pin::Pin;

use crate::error::PipelineError;
use crate::stream::{ContentDelta, DeltaStream};
use crate::types::MessageRole;
use crate::utils::streaming::{SseDeltaConverter, StreamFactory};

use super::{ProviderStream, StreamRequest};

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const API_VERSION: &str = "2023-06-01";
const DEFAULT_MAX_TOKENS: u32 = 8192;

/// Anthropic streaming provider
#[derive(Clone)]
pub struct AnthropicProvider {
    api_key: String,
    base_url: String,
    max_tokens: u32,
    http_client: reqwest::Client,
}

impl AnthropicProvider {
    /// Start building a provider instance.
    pub fn builder() -> AnthropicBuilder {
        AnthropicBuilder::new()
    }

    fn build_body(&self, request: &StreamRequest) -> serde_json::Value {
        let messages: Vec<serde_json::Value> = request
            .messages
            .iter()
            .filter(|m| m.role != MessageRole::System)
            .map(|m| serde_json::json!({"role": m.role, "content": m.content}))
            .collect();

        let mut body = serde_json::json!({
            "model": request.model,
            "messages": messages,
            "max_tokens": self.max_tokens,
            "stream": true,
        });
        if let Some(system) = &request.system {
            body["system"] = serde_json::json!(system);
        }
        if let Some(t) = request.params.temperature {
            body["temperature"] = serde_json::json!(t.clamp(0.0, 1.0));
        }
        if let Some(tp) = request.params.top_p {
            body["top_p"] = serde_json::json!(tp);
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
            "x-api-key",
            reqwest::header::HeaderValue::from_str(&self.api_key)
                .map_err(|e| PipelineError::ConfigurationError(format!("Invalid API key: {e}")))?,
        );
        headers.insert(
            "anthropic-version",
            reqwest::header::HeaderValue::from_static(API_VERSION),
        );
        Ok(headers)
    }
}

#[async_trait]
impl ProviderStream for AnthropicProvider {
    fn provider_id(&self) -> &'static str {
        "anthropic"
    }

    async fn stream(&self, request: StreamRequest) -> Result<DeltaStream, PipelineError> {
        let url = format!("{}/v1/messages", self.base_url);
        let body = self.build_body(&request);
        let headers = self.build_headers()?;

        tracing::debug!(model = %request.model, "opening Anthropic stream");

        let request_builder = self.http_client.post(&url).headers(headers).json(&body);
        StreamFactory::create_delta_stream(request_builder, AnthropicEventConverter).await
    }
}

/// Builder for [`AnthropicProvider`]
#[derive(Debug, Clone, Default)]
pub struct AnthropicBuilder {
    api_key: String,
    base_url: Option<String>,
    max_tokens: Option<u32>,
    http_client: Option<reqwest::Client>,
}

impl AnthropicBuilder {
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

    /// Override the required `max_tokens` request field
    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Supply a pre-configured HTTP client (optional)
    pub fn http_client(mut self, client: reqwest::Client) -> Self {
        self.http_client = Some(client);
        self
    }

    /// Build the provider, validating required fields.
    pub fn build(self) -> Result<AnthropicProvider, PipelineError> {
        if self.api_key.is_empty() {
            return Err(PipelineError::ConfigurationError(
                "API key is required".to_string(),
            ));
        }
        let http_client = match self.http_client {
            Some(client) => client,
            None => super::deepseek::default_http_client()?,
        };
        Ok(AnthropicProvider {
            api_key: self.api_key,
            base_url: self
                .base_url
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            max_tokens: self.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            http_client,
        })
    }
}

/// Anthropic SSE event structures (only the fields this adapter consumes)

#[derive(Debug, Deserialize)]
struct AnthropicStreamEvent {
    r#type: String,
    #[serde(default)]
    delta: Option<AnthropicDelta>,
    #[serde(default)]
    error: Option<AnthropicErrorBody>,
}

#[derive(Debug, Deserialize)]
struct AnthropicDelta {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    thinking: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AnthropicErrorBody {
    #[serde(default)]
    message: String,
}

/// Event converter for Anthropic's typed SSE events
#[derive(Clone)]
pub struct AnthropicEventConverter;

impl AnthropicEventConverter {
    fn convert(&self, event: AnthropicStreamEvent) -> Vec<Result<ContentDelta, PipelineError>> {
        match event.r#type.as_str() {
            "content_block_delta" => {
                let mut out = Vec::with_capacity(2);
                if let Some(delta) = event.delta {
                    if let Some(thinking) = delta.thinking {
                        if !thinking.is_empty() {
                            out.push(Ok(ContentDelta::reasoning(thinking)));
                        }
                    }
                    if let Some(text) = delta.text {
                        if !text.is_empty() {
                            out.push(Ok(ContentDelta::answer(text)));
                        }
                    }
                }
                out
            }
            "error" => {
                let message = event.error.map(|e| e.message).unwrap_or_default();
                vec![Err(PipelineError::StreamError(format!(
                    "Anthropic stream error: {message}"
                )))]
            }
            // message_start / content_block_start / ping / message_delta /
            // message_stop carry no delta text
            _ => vec![],
        }
    }
}

impl SseDeltaConverter for AnthropicEventConverter {
    fn convert_event(
        &self,
        event: Event,
    ) -> Pin<Box<dyn Future<Output = Vec<Result<ContentDelta, PipelineError>>> + Send + Sync + '_>>
    {
        Box::pin(async move {
            match serde_json::from_str::<AnthropicStreamEvent>(&event.data) {
                Ok(parsed) => self.convert(parsed),
                Err(e) => vec![Err(PipelineError::ParseError(format!(
                    "Failed to parse Anthropic event: {e}"
                )))],
            }
        })
    }
}
