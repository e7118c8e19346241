//! Generic OpenAI-compatible provider adapter
//!
//! Works against any endpoint speaking the OpenAI chat completions protocol
//! (OpenRouter, SiliconFlow, vLLM, ...), typically as the answer provider.
//! The extracted system instruction is prepended as a `system` role message,
//! which is how OpenAI-style APIs take instructions. `delta.content` becomes
//! answer deltas; a `delta.reasoning_content` field, when the deployment
//! emits one, becomes reasoning deltas.

use async_trait::async_trait;
use eventsource_stream::Event;
use serde::Deserialize;
use std::future::Future;
use std::pin::Pin;

use crate::error::PipelineError;
use crate::stream::{ContentDelta, DeltaStream};
use crate::utils::streaming::{SseDeltaConverter, StreamFactory};

use super::{ProviderStream, StreamRequest};

/// OpenAI-compatible streaming provider
#[derive(Clone)]
pub struct OpenAiCompatibleProvider {
    api_key: String,
    base_url: String,
    http_client: reqwest::Client,
}

impl OpenAiCompatibleProvider {
    /// Start building a provider instance.
    pub fn builder() -> OpenAiCompatibleBuilder {
        OpenAiCompatibleBuilder::new()
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
impl ProviderStream for OpenAiCompatibleProvider {
    fn provider_id(&self) -> &'static str {
        "openai-compatible"
    }

    async fn stream(&self, request: StreamRequest) -> Result<DeltaStream, PipelineError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = self.build_body(&request);
        let headers = self.build_headers()?;

        tracing::debug!(model = %request.model, "opening OpenAI-compatible stream");

        let request_builder = self.http_client.post(&url).headers(headers).json(&body);
        StreamFactory::create_delta_stream(request_builder, OpenAiCompatibleEventConverter).await
    }
}

/// Builder for [`OpenAiCompatibleProvider`]
#[derive(Debug, Clone, Default)]
pub struct OpenAiCompatibleBuilder {
    api_key: String,
    base_url: Option<String>,
    http_client: Option<reqwest::Client>,
}

impl OpenAiCompatibleBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the API key (required)
    pub fn api_key<S: Into<String>>(mut self, api_key: S) -> Self {
        self.api_key = api_key.into();
        self
    }

    /// Set the endpoint base URL (required; there is no sensible default
    /// for a generic compatible provider)
    pub fn base_url<S: Into<String>>(mut self, base_url: S) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Supply a pre-configured HTTP client (optional)
    pub fn http_client(mut self, client: reqwest::Client) -> Self {
        self.http_client = Some(client);
        self
    }

    /// Build the provider, validating required fields.
    pub fn build(self) -> Result<OpenAiCompatibleProvider, PipelineError> {
        if self.api_key.is_empty() {
            return Err(PipelineError::ConfigurationError(
                "API key is required".to_string(),
            ));
        }
        let Some(base_url) = self.base_url else {
            return Err(PipelineError::ConfigurationError(
                "base URL is required".to_string(),
            ));
        };
        let http_client = match self.http_client {
            Some(client) => client,
            None => super::deepseek::default_http_client()?,
        };
        Ok(OpenAiCompatibleProvider {
            api_key: self.api_key,
            base_url,
            http_client,
        })
    }
}

#[derive(Debug, Deserialize)]
struct CompatStreamEvent {
    #[serde(default)]
    choices: Vec<CompatChoice>,
}

#[derive(Debug, Deserialize)]
struct CompatChoice {
    #[serde(default)]
    delta: Option<CompatDelta>,
}

#[derive(Debug, Deserialize)]
struct CompatDelta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    reasoning_content: Option<String>,
}

/// Event converter for OpenAI-compatible chunks
#[derive(Clone)]
pub struct OpenAiCompatibleEventConverter;

impl SseDeltaConverter for OpenAiCompatibleEventConverter {
    fn convert_event(
        &self,
        event: Event,
    ) -> Pin<Box<dyn Future<Output = Vec<Result<ContentDelta, PipelineError>>> + Send + Sync + '_>>
    {
        Box::pin(async move {
            let parsed: CompatStreamEvent = match serde_json::from_str(&event.data) {
                Ok(parsed) => parsed,
                Err(e) => {
                    return vec![Err(PipelineError::ParseError(format!(
                        "Failed to parse OpenAI-compatible event: {e}"
                    )))];
                }
            };

            let Some(delta) = parsed.choices.into_iter().next().and_then(|c| c.delta) else {
                return vec![];
            };

            let mut out = Vec::with_capacity(2);
            if let Some(reasoning) = delta.reasoning_content {
                if !reasoning.is_empty() {
                    out.push(Ok(ContentDelta::reasoning(reasoning)));
                }
            }
            if let Some(content) = delta.content {
                if !content.is_empty() {
                    out.push(Ok(ContentDelta::answer(content)));
                }
            }
            out
        })
    }
}
