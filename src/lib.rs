//! # tandem
//!
//! Compose two streaming LLM providers into one OpenAI-compatible response:
//! an upstream reasoning model's intermediate thought content is streamed to
//! the consumer as `reasoning_content` and simultaneously accumulated, then
//! injected into the prompt of a downstream answer model whose output
//! becomes the visible completion.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use futures::StreamExt;
//! use tandem::pipeline::Composer;
//! use tandem::providers::{AnthropicProvider, DeepSeekProvider};
//! use tandem::types::{ChatMessage, GenerationParams};
//!
//! # async fn example() -> Result<(), tandem::error::PipelineError> {
//! let composer = Composer::builder()
//!     .reasoning(
//!         Arc::new(DeepSeekProvider::builder().api_key("sk-ds").build()?),
//!         "deepseek-reasoner",
//!     )
//!     .answer(
//!         Arc::new(AnthropicProvider::builder().api_key("sk-ant").build()?),
//!         "claude-sonnet-4-20250514",
//!     )
//!     .build()?;
//!
//! let messages = vec![ChatMessage::user("What is the capital of France?")];
//! let mut frames = tandem::server_adapters::sse_frames(
//!     composer
//!         .stream_completion(messages, GenerationParams::default())
//!         .await?,
//! );
//! while let Some(frame) = frames.next().await {
//!     print!("{frame}");
//! }
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]

pub mod error;
pub mod pipeline;
pub mod providers;
pub mod server_adapters;
pub mod stream;
pub mod types;
pub mod utils;
pub mod wire;

pub use error::PipelineError;
pub use pipeline::{Composer, CompositionEvent, CompositionStream, PromptTemplate};
pub use types::{ChatMessage, GenerationParams, MessageRole};
