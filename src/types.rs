//! Core data types shared across the pipeline

use serde::{Deserialize, Serialize};

/// Message role
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

/// A single conversation turn.
///
/// The pipeline forwards plain text; multimodal content is out of scope.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: MessageRole,
    pub content: String,
}

impl ChatMessage {
    /// Creates a system message
    pub fn system<S: Into<String>>(content: S) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }

    /// Creates a user message
    pub fn user<S: Into<String>>(content: S) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }

    /// Creates an assistant message
    pub fn assistant<S: Into<String>>(content: S) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
        }
    }
}

/// Sampling parameters passed through to both providers.
///
/// The pipeline does not interpret these; adapters may clamp or drop fields
/// their upstream rejects (see each adapter's docs).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GenerationParams {
    pub temperature: Option<f32>,
    pub top_p: Option<f32>,
    pub presence_penalty: Option<f32>,
    pub frequency_penalty: Option<f32>,
}

/// Per-request identity, created once at request start.
///
/// The id is derived from the epoch-millisecond clock in the
/// `chatcmpl-{hex}` format the OpenAI wire protocol uses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionContext {
    /// Unique completion id, e.g. `chatcmpl-18c3a9f2b40`
    pub id: String,
    /// Unix timestamp (seconds) recorded at request start
    pub created: u64,
}

impl SessionContext {
    /// Generate a fresh session for one orchestration run.
    pub fn generate() -> Self {
        let now = chrono::Utc::now();
        let millis = now.timestamp_millis().max(0) as u128;
        Self {
            id: format!("chatcmpl-{millis:x}"),
            created: now.timestamp().max(0) as u64,
        }
    }
}

/// Token usage reported on buffered responses
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

impl Usage {
    pub fn new(prompt_tokens: u32, completion_tokens: u32) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        }
    }
}

/// Token accounting boundary.
///
/// Exact tokenization is host concern; the pipeline only needs *some*
/// number for the buffered response's usage block. Implement this to plug in
/// a real tokenizer.
pub trait TokenEstimator: Send + Sync {
    fn estimate(&self, text: &str) -> u32;
}

/// Default estimator: whitespace-separated words plus a character-based
/// correction for CJK-style scripts that do not use spaces.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicTokenEstimator;

impl TokenEstimator for HeuristicTokenEstimator {
    fn estimate(&self, text: &str) -> u32 {
        let words = text.split_whitespace().count();
        let non_ascii = text.chars().filter(|c| !c.is_ascii()).count();
        (words + non_ascii / 2) as u32
    }
}
