//! Error types for the composition pipeline

use thiserror::Error;

/// Pipeline error type
///
/// Transport-class errors (`HttpError`, `TimeoutError`, `ApiError`,
/// `StreamError`) are recovered inside the pipeline stages and degrade the
/// response instead of failing it. `InvalidRequest` is fatal to the answer
/// stage only; `ChannelError` indicates broken queue coordination and is
/// fatal to the whole run.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// HTTP request could not be sent or the connection failed
    #[error("HTTP error: {0}")]
    HttpError(String),

    /// The provider did not respond within the configured timeout
    #[error("Request timed out: {0}")]
    TimeoutError(String),

    /// The provider returned a non-success status
    #[error("API error {code}: {message}")]
    ApiError {
        code: u16,
        message: String,
        details: Option<serde_json::Value>,
    },

    /// A provider event could not be parsed
    #[error("Parse error: {0}")]
    ParseError(String),

    /// The SSE stream broke mid-flight
    #[error("Stream error: {0}")]
    StreamError(String),

    /// Invalid adapter or pipeline configuration
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    /// The request cannot be turned into an upstream call
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Internal queue/channel coordination failure
    #[error("Channel error: {0}")]
    ChannelError(String),
}

impl PipelineError {
    /// Whether this error originated in provider transport.
    ///
    /// The stages treat transport errors as recoverable: the reasoning stage
    /// hands off an empty string, the answer stage stops early.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::HttpError(_) | Self::TimeoutError(_) | Self::ApiError { .. } | Self::StreamError(_)
        )
    }
}
