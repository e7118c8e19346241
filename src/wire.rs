//! OpenAI-compatible wire format
//!
//! Streaming responses are `chat.completion.chunk` objects framed as
//! server-sent events (`data: <json>\n\n`), terminated by `data: [DONE]\n\n`.
//! Buffered responses are a single `chat.completion` object.

use serde::{Deserialize, Serialize};

use crate::types::{SessionContext, Usage};

/// Terminal SSE frame sent after a completed (uncancelled) stream
pub const DONE_FRAME: &str = "data: [DONE]\n\n";

/// One streamed chunk in OpenAI `chat.completion.chunk` format
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamChunk {
    pub id: String,
    pub object: String,
    pub created: u64,
    pub model: String,
    pub choices: Vec<ChunkChoice>,
}

/// Chunk choice
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkChoice {
    pub index: u32,
    pub delta: ChunkDelta,
}

/// Chunk delta payload
///
/// Reasoning chunks carry the delta under `reasoning_content` with an empty
/// `content` field; answer chunks carry it under `content`. Absent fields are
/// omitted from the serialized frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkDelta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reasoning_content: Option<String>,
}

impl StreamChunk {
    /// Build a chunk carrying a reasoning delta.
    pub fn reasoning(session: &SessionContext, model: &str, delta: String) -> Self {
        Self {
            id: session.id.clone(),
            object: "chat.completion.chunk".to_string(),
            created: session.created,
            model: model.to_string(),
            choices: vec![ChunkChoice {
                index: 0,
                delta: ChunkDelta {
                    role: Some("assistant".to_string()),
                    content: Some(String::new()),
                    reasoning_content: Some(delta),
                },
            }],
        }
    }

    /// Build a chunk carrying an answer delta.
    pub fn answer(session: &SessionContext, model: &str, delta: String) -> Self {
        Self {
            id: session.id.clone(),
            object: "chat.completion.chunk".to_string(),
            created: session.created,
            model: model.to_string(),
            choices: vec![ChunkChoice {
                index: 0,
                delta: ChunkDelta {
                    role: Some("assistant".to_string()),
                    content: Some(delta),
                    reasoning_content: None,
                },
            }],
        }
    }

    /// Answer delta text, if this chunk carries one.
    pub fn answer_delta(&self) -> Option<&str> {
        let delta = &self.choices.first()?.delta;
        match delta.content.as_deref() {
            Some(text) if delta.reasoning_content.is_none() => Some(text),
            _ => None,
        }
    }

    /// Reasoning delta text, if this chunk carries one.
    pub fn reasoning_delta(&self) -> Option<&str> {
        self.choices.first()?.delta.reasoning_content.as_deref()
    }

    /// Render this chunk as one SSE frame.
    pub fn to_sse_frame(&self) -> String {
        // Serialization of these plain structs cannot fail
        let json = serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string());
        format!("data: {json}\n\n")
    }
}

/// Buffered (non-streaming) response in OpenAI `chat.completion` format
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatCompletion {
    pub id: String,
    pub object: String,
    pub created: u64,
    pub model: String,
    pub choices: Vec<CompletionChoice>,
    pub usage: Usage,
}

/// Completion choice
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionChoice {
    pub index: u32,
    pub message: CompletionMessage,
    pub finish_reason: String,
}

/// Assistant message in a buffered response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionMessage {
    pub role: String,
    pub content: String,
    pub reasoning_content: String,
}

impl ChatCompletion {
    /// Assemble the buffered response from aggregated stage output.
    pub fn new(
        session: &SessionContext,
        model: &str,
        answer: String,
        reasoning: String,
        usage: Usage,
    ) -> Self {
        Self {
            id: session.id.clone(),
            object: "chat.completion".to_string(),
            created: session.created,
            model: model.to_string(),
            choices: vec![CompletionChoice {
                index: 0,
                message: CompletionMessage {
                    role: "assistant".to_string(),
                    content: answer,
                    reasoning_content: reasoning,
                },
                finish_reason: "stop".to_string(),
            }],
            usage,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> SessionContext {
        SessionContext {
            id: "chatcmpl-abc123".to_string(),
            created: 1_700_000_000,
        }
    }

    #[test]
    fn reasoning_chunk_shape() {
        let chunk = StreamChunk::reasoning(&session(), "deepseek-reasoner", "thinking".into());
        let json = serde_json::to_value(&chunk).unwrap();
        assert_eq!(json["object"], "chat.completion.chunk");
        assert_eq!(json["choices"][0]["index"], 0);
        assert_eq!(json["choices"][0]["delta"]["role"], "assistant");
        assert_eq!(json["choices"][0]["delta"]["content"], "");
        assert_eq!(json["choices"][0]["delta"]["reasoning_content"], "thinking");
    }

    #[test]
    fn answer_chunk_omits_reasoning_field() {
        let chunk = StreamChunk::answer(&session(), "claude-sonnet", "Hello".into());
        let json = serde_json::to_string(&chunk).unwrap();
        assert!(!json.contains("reasoning_content"));
        assert!(json.contains(r#""content":"Hello""#));
    }

    #[test]
    fn delta_accessors() {
        let session = session();
        let answer = StreamChunk::answer(&session, "m", "a".into());
        assert_eq!(answer.answer_delta(), Some("a"));
        assert_eq!(answer.reasoning_delta(), None);

        let reasoning = StreamChunk::reasoning(&session, "m", "r".into());
        assert_eq!(reasoning.answer_delta(), None);
        assert_eq!(reasoning.reasoning_delta(), Some("r"));
    }

    #[test]
    fn sse_frame_format() {
        let chunk = StreamChunk::answer(&session(), "m", "hi".into());
        let frame = chunk.to_sse_frame();
        assert!(frame.starts_with("data: {"));
        assert!(frame.ends_with("\n\n"));
    }

    #[test]
    fn completion_shape() {
        let completion = ChatCompletion::new(
            &session(),
            "claude-sonnet",
            "answer".into(),
            "reasoning".into(),
            Usage::new(12, 3),
        );
        let json = serde_json::to_value(&completion).unwrap();
        assert_eq!(json["object"], "chat.completion");
        assert_eq!(json["choices"][0]["finish_reason"], "stop");
        assert_eq!(json["choices"][0]["message"]["reasoning_content"], "reasoning");
        assert_eq!(json["usage"]["total_tokens"], 15);
    }
}
