//! Two-stage composition pipeline
//!
//! [`Composer`] is the generic engine: one reasoning provider, one answer
//! provider, and an augmentation template wiring the first stage's output
//! into the second stage's prompt. It produces either a streamed
//! [`CompositionStream`] or a buffered [`ChatCompletion`].

use std::sync::Arc;

use crate::error::PipelineError;
use crate::providers::ProviderStream;
use crate::types::{
    ChatMessage, GenerationParams, HeuristicTokenEstimator, SessionContext, TokenEstimator,
};
use crate::wire::ChatCompletion;

pub mod handoff;
pub mod monitor;
pub mod orchestrator;

mod aggregate;
mod stages;

pub use monitor::{AlwaysConnected, ConnectionWatcher};
pub use orchestrator::{CompositionEvent, CompositionStream};

use orchestrator::PipelineRun;

/// Renders the augmented prompt handed to the answer provider.
///
/// Receives the last user turn's original content and the handed-off
/// reasoning text; returns the rewritten turn content.
#[derive(Clone)]
pub struct PromptTemplate {
    render: Arc<dyn Fn(&str, &str) -> String + Send + Sync>,
}

impl PromptTemplate {
    pub fn new<F>(render: F) -> Self
    where
        F: Fn(&str, &str) -> String + Send + Sync + 'static,
    {
        Self {
            render: Arc::new(render),
        }
    }

    pub fn render(&self, original: &str, reasoning: &str) -> String {
        (self.render)(original, reasoning)
    }
}

impl Default for PromptTemplate {
    fn default() -> Self {
        Self::new(|original, reasoning| {
            format!(
                "Here's my original input:\n{original}\n\n\
                 Here's my another model's reasoning process:\n{reasoning}\n\n\
                 Based on this reasoning, provide your response directly to me:"
            )
        })
    }
}

impl std::fmt::Debug for PromptTemplate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PromptTemplate").finish_non_exhaustive()
    }
}

/// The two-stage composition engine.
///
/// Construct once per provider pair and reuse across requests; every call
/// gets its own session, queue, handoff, and cancellation scope.
pub struct Composer {
    reasoning_provider: Arc<dyn ProviderStream>,
    reasoning_model: String,
    answer_provider: Arc<dyn ProviderStream>,
    answer_model: String,
    template: PromptTemplate,
    estimator: Arc<dyn TokenEstimator>,
}

impl Composer {
    /// Start building a composer.
    pub fn builder() -> ComposerBuilder {
        ComposerBuilder::default()
    }

    /// Run the pipeline for a consumer that cannot disconnect.
    pub async fn stream_completion(
        &self,
        messages: Vec<ChatMessage>,
        params: GenerationParams,
    ) -> Result<CompositionStream, PipelineError> {
        self.stream_completion_watched(messages, params, Arc::new(AlwaysConnected))
            .await
    }

    /// Run the pipeline, monitoring the consumer's liveness through
    /// `watcher`.
    ///
    /// Provider failures degrade the stream rather than failing this call;
    /// only a malformed request (empty message list) errors up front.
    pub async fn stream_completion_watched(
        &self,
        messages: Vec<ChatMessage>,
        params: GenerationParams,
        watcher: Arc<dyn ConnectionWatcher>,
    ) -> Result<CompositionStream, PipelineError> {
        if messages.is_empty() {
            return Err(PipelineError::InvalidRequest(
                "message list is empty".to_string(),
            ));
        }

        let session = SessionContext::generate();
        tracing::info!(
            session = %session.id,
            reasoning_model = %self.reasoning_model,
            answer_model = %self.answer_model,
            "starting composition run"
        );

        Ok(orchestrator::spawn_and_stream(PipelineRun {
            session,
            messages,
            params,
            reasoning_provider: self.reasoning_provider.clone(),
            reasoning_model: self.reasoning_model.clone(),
            answer_provider: self.answer_provider.clone(),
            answer_model: self.answer_model.clone(),
            template: self.template.clone(),
            watcher,
        }))
    }

    /// Run the pipeline to completion and return one buffered response.
    pub async fn complete(
        &self,
        messages: Vec<ChatMessage>,
        params: GenerationParams,
    ) -> Result<ChatCompletion, PipelineError> {
        if messages.is_empty() {
            return Err(PipelineError::InvalidRequest(
                "message list is empty".to_string(),
            ));
        }

        let session = SessionContext::generate();
        let events = orchestrator::spawn_and_stream(PipelineRun {
            session: session.clone(),
            messages: messages.clone(),
            params,
            reasoning_provider: self.reasoning_provider.clone(),
            reasoning_model: self.reasoning_model.clone(),
            answer_provider: self.answer_provider.clone(),
            answer_model: self.answer_model.clone(),
            template: self.template.clone(),
            watcher: Arc::new(AlwaysConnected),
        });

        Ok(aggregate::aggregate_completion(
            events,
            session,
            self.answer_model.clone(),
            messages,
            self.template.clone(),
            self.estimator.clone(),
        )
        .await)
    }
}

/// Builder for [`Composer`]
#[derive(Default)]
pub struct ComposerBuilder {
    reasoning_provider: Option<Arc<dyn ProviderStream>>,
    reasoning_model: Option<String>,
    answer_provider: Option<Arc<dyn ProviderStream>>,
    answer_model: Option<String>,
    template: Option<PromptTemplate>,
    estimator: Option<Arc<dyn TokenEstimator>>,
}

impl ComposerBuilder {
    /// Set the stage-one provider and model (required)
    pub fn reasoning(
        mut self,
        provider: Arc<dyn ProviderStream>,
        model: impl Into<String>,
    ) -> Self {
        self.reasoning_provider = Some(provider);
        self.reasoning_model = Some(model.into());
        self
    }

    /// Set the stage-two provider and model (required)
    pub fn answer(mut self, provider: Arc<dyn ProviderStream>, model: impl Into<String>) -> Self {
        self.answer_provider = Some(provider);
        self.answer_model = Some(model.into());
        self
    }

    /// Override the augmentation template
    pub fn template(mut self, template: PromptTemplate) -> Self {
        self.template = Some(template);
        self
    }

    /// Override the token estimator used for buffered-response usage
    pub fn token_estimator(mut self, estimator: Arc<dyn TokenEstimator>) -> Self {
        self.estimator = Some(estimator);
        self
    }

    /// Build the composer, validating required fields.
    pub fn build(self) -> Result<Composer, PipelineError> {
        let (Some(reasoning_provider), Some(reasoning_model)) =
            (self.reasoning_provider, self.reasoning_model)
        else {
            return Err(PipelineError::ConfigurationError(
                "reasoning provider and model are required".to_string(),
            ));
        };
        let (Some(answer_provider), Some(answer_model)) =
            (self.answer_provider, self.answer_model)
        else {
            return Err(PipelineError::ConfigurationError(
                "answer provider and model are required".to_string(),
            ));
        };
        Ok(Composer {
            reasoning_provider,
            reasoning_model,
            answer_provider,
            answer_model,
            template: self.template.unwrap_or_default(),
            estimator: self
                .estimator
                .unwrap_or_else(|| Arc::new(HeuristicTokenEstimator)),
        })
    }
}
