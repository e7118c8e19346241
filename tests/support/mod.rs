//! Test fakes: scripted providers driving the pipeline without a network

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use tandem::error::PipelineError;
use tandem::providers::{ProviderStream, StreamRequest};
use tandem::stream::{ContentDelta, DeltaStream};

/// One scripted stream item
#[derive(Debug, Clone)]
pub enum FakeItem {
    Reasoning(&'static str),
    Answer(&'static str),
    Error(&'static str),
}

/// Provider that replays a fixed script, optionally pacing the deltas and
/// recording every request it receives.
pub struct ScriptedProvider {
    id: &'static str,
    script: Vec<FakeItem>,
    delay: Option<Duration>,
    fail_on_open: bool,
    pub requests: Arc<Mutex<Vec<StreamRequest>>>,
}

impl ScriptedProvider {
    pub fn new(id: &'static str, script: Vec<FakeItem>) -> Self {
        Self {
            id,
            script,
            delay: None,
            fail_on_open: false,
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Sleep this long before each delta.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Fail the stream call itself with a transport error.
    pub fn failing(id: &'static str) -> Self {
        let mut provider = Self::new(id, vec![]);
        provider.fail_on_open = true;
        provider
    }
}

#[async_trait]
impl ProviderStream for ScriptedProvider {
    fn provider_id(&self) -> &'static str {
        self.id
    }

    async fn stream(&self, request: StreamRequest) -> Result<DeltaStream, PipelineError> {
        self.requests.lock().unwrap().push(request);
        if self.fail_on_open {
            return Err(PipelineError::HttpError("connection refused".to_string()));
        }

        let script = self.script.clone();
        let delay = self.delay;
        let stream = async_stream::stream! {
            for item in script {
                if let Some(delay) = delay {
                    tokio::time::sleep(delay).await;
                }
                match item {
                    FakeItem::Reasoning(text) => yield Ok(ContentDelta::reasoning(text)),
                    FakeItem::Answer(text) => yield Ok(ContentDelta::answer(text)),
                    FakeItem::Error(msg) => {
                        yield Err(PipelineError::StreamError(msg.to_string()))
                    }
                }
            }
        };
        Ok(Box::pin(stream))
    }
}

/// Answer provider that echoes the last turn it was given as one answer
/// delta, for asserting on the augmented prompt.
pub struct EchoProvider {
    pub requests: Arc<Mutex<Vec<StreamRequest>>>,
}

impl EchoProvider {
    pub fn new() -> Self {
        Self {
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

#[async_trait]
impl ProviderStream for EchoProvider {
    fn provider_id(&self) -> &'static str {
        "echo"
    }

    async fn stream(&self, request: StreamRequest) -> Result<DeltaStream, PipelineError> {
        let echoed = request
            .messages
            .last()
            .map(|m| m.content.clone())
            .unwrap_or_default();
        self.requests.lock().unwrap().push(request);
        let stream = async_stream::stream! {
            yield Ok(ContentDelta::answer(echoed));
        };
        Ok(Box::pin(stream))
    }
}
