//! Non-stream aggregation
//!
//! Drives the orchestrator's typed event stream internally and folds it
//! into one buffered `chat.completion` object: answer deltas become the
//! message content, reasoning deltas are retained in `reasoning_content`,
//! and usage comes from the configured token estimator over the same inputs
//! the augmented request was built from.

use std::sync::Arc;

use futures::StreamExt;

use crate::types::{ChatMessage, SessionContext, TokenEstimator, Usage};
use crate::wire::ChatCompletion;

use super::orchestrator::{CompositionEvent, CompositionStream};
use super::stages::{build_answer_request, FALLBACK_REASONING};
use super::PromptTemplate;

pub(crate) async fn aggregate_completion(
    mut events: CompositionStream,
    session: SessionContext,
    answer_model: String,
    original_messages: Vec<ChatMessage>,
    template: PromptTemplate,
    estimator: Arc<dyn TokenEstimator>,
) -> ChatCompletion {
    let mut reasoning = String::new();
    let mut answer = String::new();

    while let Some(event) = events.next().await {
        match event {
            CompositionEvent::Chunk(chunk) => {
                if let Some(delta) = chunk.reasoning_delta() {
                    reasoning.push_str(delta);
                } else if let Some(delta) = chunk.answer_delta() {
                    answer.push_str(delta);
                }
            }
            CompositionEvent::Done => break,
        }
    }

    let usage = estimate_usage(
        &original_messages,
        &reasoning,
        &answer,
        &template,
        estimator.as_ref(),
    );

    ChatCompletion::new(&session, &answer_model, answer, reasoning, usage)
}

/// Prompt-side accounting uses the augmented turn contents joined with
/// newlines, reproducing what was actually sent to the answer provider.
fn estimate_usage(
    original_messages: &[ChatMessage],
    reasoning: &str,
    answer: &str,
    template: &PromptTemplate,
    estimator: &dyn TokenEstimator,
) -> Usage {
    let effective_reasoning = if reasoning.is_empty() {
        FALLBACK_REASONING
    } else {
        reasoning
    };
    let prompt_text = match build_answer_request(original_messages, effective_reasoning, template) {
        Ok((turns, system)) => {
            let mut parts: Vec<String> = Vec::with_capacity(turns.len() + 1);
            if let Some(system) = system {
                parts.push(system);
            }
            parts.extend(turns.into_iter().map(|t| t.content));
            parts.join("\n")
        }
        // Construction failed (the run produced no answer); account for the
        // raw inputs instead.
        Err(_) => original_messages
            .iter()
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join("\n"),
    };

    Usage::new(estimator.estimate(&prompt_text), estimator.estimate(answer))
}
