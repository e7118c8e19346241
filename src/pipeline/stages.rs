//! Pipeline stages
//!
//! The two producer halves of a run. The reasoning stage republishes
//! reasoning deltas and hands the accumulated text off exactly once; the
//! answer stage waits for the handoff, rewrites the request around it, and
//! republishes answer deltas. Both degrade on transport errors instead of
//! failing the run, and both skip their completion sentinel when the run is
//! already cancelled.

use std::sync::Arc;

use futures::StreamExt;
use tokio::sync::mpsc;

use crate::error::PipelineError;
use crate::providers::{ProviderStream, StreamRequest};
use crate::stream::ContentDelta;
use crate::types::{ChatMessage, GenerationParams, MessageRole, SessionContext};
use crate::utils::cancel::CancelToken;
use crate::wire::StreamChunk;

use super::handoff::{HandoffReceiver, HandoffSender};
use super::PromptTemplate;

/// Substituted when the reasoning stage handed off nothing usable
pub(crate) const FALLBACK_REASONING: &str = "Failed to retrieve reasoning content";

/// Queue item: a wire-framed chunk or a stage completion sentinel
#[derive(Debug)]
pub(crate) enum OutputEvent {
    Frame(StreamChunk),
    StageDone,
}

/// Shared per-stage wiring
#[derive(Clone)]
pub(crate) struct StageContext {
    pub session: SessionContext,
    pub out: mpsc::Sender<OutputEvent>,
    pub cancel: CancelToken,
}

impl StageContext {
    /// Forward a frame. A closed queue outside cancellation means broken
    /// coordination, which is fatal to the stage.
    async fn publish(&self, chunk: StreamChunk) -> Result<(), PipelineError> {
        self.out
            .send(OutputEvent::Frame(chunk))
            .await
            .map_err(|_| PipelineError::ChannelError("output queue closed".to_string()))
    }

    async fn publish_sentinel(&self) {
        if !self.cancel.is_cancelled() {
            let _ = self.out.send(OutputEvent::StageDone).await;
        }
    }
}

/// Drive the reasoning provider, republish its reasoning deltas, and hand
/// off the accumulated text.
pub(crate) async fn run_reasoning_stage(
    provider: Arc<dyn ProviderStream>,
    messages: Vec<ChatMessage>,
    model: String,
    ctx: StageContext,
    handoff: HandoffSender,
) {
    tracing::info!(provider = provider.provider_id(), model = %model, "reasoning stage starting");

    let mut accumulated = String::new();
    let mut failed = false;

    // The reasoning request passes the turns through untouched; sampling
    // overrides belong to the answer provider.
    let request = StreamRequest::new(messages, model.clone());
    match provider.stream(request).await {
        Ok(mut deltas) => {
            while let Some(item) = deltas.next().await {
                if ctx.cancel.is_cancelled() {
                    tracing::info!("cancellation detected, stopping reasoning stage");
                    break;
                }
                match item {
                    Ok(ContentDelta::Reasoning { delta }) => {
                        accumulated.push_str(&delta);
                        let chunk = StreamChunk::reasoning(&ctx.session, &model, delta);
                        if let Err(e) = ctx.publish(chunk).await {
                            if !ctx.cancel.is_cancelled() {
                                tracing::error!(error = %e, "reasoning stage lost the output queue");
                            }
                            return;
                        }
                    }
                    Ok(ContentDelta::Answer { .. }) => {
                        // First answer delta marks the end of reasoning.
                        tracing::info!(
                            reasoning_len = accumulated.len(),
                            "reasoning complete"
                        );
                        break;
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "reasoning stream failed");
                        failed = true;
                        break;
                    }
                }
            }
        }
        Err(e) => {
            tracing::warn!(error = %e, "failed to open reasoning stream");
            failed = true;
        }
    }

    // Exactly one handoff write per run; a failed stream degrades to the
    // empty sentinel value so the answer stage can proceed.
    if failed {
        handoff.send(String::new());
    } else {
        handoff.send(accumulated);
    }

    ctx.publish_sentinel().await;
}

/// Drive the answer provider once the handoff resolves.
pub(crate) async fn run_answer_stage(
    provider: Arc<dyn ProviderStream>,
    messages: Vec<ChatMessage>,
    model: String,
    params: GenerationParams,
    template: PromptTemplate,
    ctx: StageContext,
    handoff: HandoffReceiver,
) {
    answer_stage_body(provider, messages, model, params, template, &ctx, handoff).await;
    ctx.publish_sentinel().await;
}

async fn answer_stage_body(
    provider: Arc<dyn ProviderStream>,
    messages: Vec<ChatMessage>,
    model: String,
    params: GenerationParams,
    template: PromptTemplate,
    ctx: &StageContext,
    handoff: HandoffReceiver,
) {
    tracing::info!("waiting for reasoning handoff");
    let mut reasoning = handoff.recv().await;

    if ctx.cancel.is_cancelled() {
        tracing::info!("cancellation detected, skipping answer stage");
        return;
    }

    if reasoning.is_empty() {
        tracing::warn!("empty reasoning handoff, continuing with fallback text");
        reasoning = FALLBACK_REASONING.to_string();
    } else {
        tracing::debug!(reasoning_len = reasoning.len(), "received reasoning handoff");
    }

    let (turns, system) = match build_answer_request(&messages, &reasoning, &template) {
        Ok(built) => built,
        Err(e) => {
            // Construction errors are fatal to this stage only; the run
            // still terminates cleanly with no answer content.
            tracing::error!(error = %e, "cannot build answer request");
            return;
        }
    };

    tracing::info!(provider = provider.provider_id(), model = %model, "answer stage starting");

    let request = StreamRequest::new(turns, model.clone())
        .with_params(params)
        .with_system(system);
    let mut deltas = match provider.stream(request).await {
        Ok(deltas) => deltas,
        Err(e) => {
            tracing::warn!(error = %e, "failed to open answer stream");
            return;
        }
    };

    while let Some(item) = deltas.next().await {
        if ctx.cancel.is_cancelled() {
            tracing::info!("cancellation detected, stopping answer stage");
            break;
        }
        match item {
            Ok(ContentDelta::Answer { delta }) => {
                let chunk = StreamChunk::answer(&ctx.session, &model, delta);
                if let Err(e) = ctx.publish(chunk).await {
                    if !ctx.cancel.is_cancelled() {
                        tracing::error!(error = %e, "answer stage lost the output queue");
                    }
                    return;
                }
            }
            // The answer provider's own thinking is not part of the
            // composed response.
            Ok(ContentDelta::Reasoning { .. }) => {}
            Err(e) => {
                tracing::warn!(error = %e, "answer stream failed");
                break;
            }
        }
    }
}

/// Build the augmented answer request from the original turn list.
///
/// System turns are extracted and merged into one instruction string; the
/// remaining list must be non-empty and end with a user turn, whose content
/// is rewritten through the augmentation template.
pub(crate) fn build_answer_request(
    messages: &[ChatMessage],
    reasoning: &str,
    template: &PromptTemplate,
) -> Result<(Vec<ChatMessage>, Option<String>), PipelineError> {
    let mut system_content = String::new();
    let mut turns: Vec<ChatMessage> = Vec::with_capacity(messages.len());
    for message in messages {
        if message.role == MessageRole::System {
            system_content.push_str(&message.content);
            system_content.push('\n');
        } else {
            turns.push(message.clone());
        }
    }

    match turns.last_mut() {
        Some(last) if last.role == MessageRole::User => {
            last.content = template.render(&last.content, reasoning);
        }
        Some(_) => {
            return Err(PipelineError::InvalidRequest(
                "last message must be user-authored".to_string(),
            ));
        }
        None => {
            return Err(PipelineError::InvalidRequest(
                "message list contains no conversation turns".to_string(),
            ));
        }
    }

    let system_content = system_content.trim();
    let system = if system_content.is_empty() {
        None
    } else {
        Some(system_content.to_string())
    };

    Ok((turns, system))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_and_merges_system_turns() {
        let messages = vec![
            ChatMessage::system("S1"),
            ChatMessage::user("hello"),
            ChatMessage::system("S2"),
            ChatMessage::user("U"),
        ];
        let (turns, system) =
            build_answer_request(&messages, "R", &PromptTemplate::default()).unwrap();
        assert_eq!(system.as_deref(), Some("S1\nS2"));
        assert_eq!(turns.len(), 2);
        assert!(turns.iter().all(|t| t.role != MessageRole::System));
    }

    #[test]
    fn single_system_message_becomes_instruction() {
        let messages = vec![ChatMessage::system("S"), ChatMessage::user("U")];
        let (turns, system) =
            build_answer_request(&messages, "R", &PromptTemplate::default()).unwrap();
        assert_eq!(system.as_deref(), Some("S"));
        assert_eq!(turns.len(), 1);
    }

    #[test]
    fn rejects_empty_turn_list() {
        let messages = vec![ChatMessage::system("only instructions")];
        let err = build_answer_request(&messages, "R", &PromptTemplate::default()).unwrap_err();
        assert!(matches!(err, PipelineError::InvalidRequest(_)));
    }

    #[test]
    fn rejects_non_user_final_turn() {
        let messages = vec![ChatMessage::user("U"), ChatMessage::assistant("A")];
        let err = build_answer_request(&messages, "R", &PromptTemplate::default()).unwrap_err();
        assert!(matches!(err, PipelineError::InvalidRequest(_)));
    }

    #[test]
    fn last_user_turn_embeds_original_and_reasoning() {
        let messages = vec![ChatMessage::user("What is 2+2?")];
        let (turns, _) =
            build_answer_request(&messages, "r1r2", &PromptTemplate::default()).unwrap();
        let content = &turns[0].content;
        assert!(content.contains("What is 2+2?"));
        assert!(content.contains("r1r2"));
    }
}
