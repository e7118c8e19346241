//! Stream orchestrator
//!
//! Starts the three concurrent units of a run (reasoning stage, answer
//! stage, disconnect monitor), merges their queue output into one ordered
//! event stream, and guarantees teardown on normal completion, cancellation,
//! or the consumer dropping the stream mid-run.
//!
//! The run is a small state machine: RUNNING while fewer than two stage
//! sentinels have arrived and the cancel token is unset; DONE (terminal
//! marker emitted) on the second sentinel; CANCELLED (no marker) the moment
//! the token trips. Frames are forwarded in arrival order; per-stage order
//! is preserved, cross-stage interleaving is whatever the queue saw.

use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use futures::Stream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;

use crate::providers::ProviderStream;
use crate::types::{ChatMessage, GenerationParams, SessionContext};
use crate::utils::cancel::CancelToken;
use crate::wire::StreamChunk;

use super::handoff::handoff;
use super::monitor::{watch_connection, ConnectionWatcher};
use super::stages::{run_answer_stage, run_reasoning_stage, OutputEvent, StageContext};
use super::PromptTemplate;

/// Bounded wait on the output queue so the cancel token is re-checked even
/// when no provider data arrives
const QUEUE_POLL_TIMEOUT: Duration = Duration::from_millis(500);

/// Output queue depth; stages block (backpressure) when the consumer is slow
const QUEUE_CAPACITY: usize = 64;

/// One merged orchestrator event
#[derive(Debug)]
pub enum CompositionEvent {
    /// A wire-framed chunk from either stage
    Chunk(StreamChunk),
    /// Terminal marker: both stages finished and the run was not cancelled
    Done,
}

/// The merged, ordered output of one run.
///
/// Ends after [`CompositionEvent::Done`] on normal completion; ends without
/// it when the run was cancelled. Dropping the stream mid-run cancels and
/// aborts all in-flight work.
pub type CompositionStream = Pin<Box<dyn Stream<Item = CompositionEvent> + Send>>;

/// Everything one orchestration run needs
pub(crate) struct PipelineRun {
    pub session: SessionContext,
    pub messages: Vec<ChatMessage>,
    pub params: GenerationParams,
    pub reasoning_provider: Arc<dyn ProviderStream>,
    pub reasoning_model: String,
    pub answer_provider: Arc<dyn ProviderStream>,
    pub answer_model: String,
    pub template: PromptTemplate,
    pub watcher: Arc<dyn ConnectionWatcher>,
}

/// Aborts the concurrent units when the consumer abandons the stream.
///
/// Normal paths call [`TaskGuard::shutdown`], which additionally awaits the
/// acknowledged termination of every unit; the `Drop` half only fires when
/// the generator itself is dropped mid-run.
struct TaskGuard {
    handles: Vec<JoinHandle<()>>,
    cancel: CancelToken,
    finished: bool,
}

impl TaskGuard {
    fn new(handles: Vec<JoinHandle<()>>, cancel: CancelToken) -> Self {
        Self {
            handles,
            cancel,
            finished: false,
        }
    }

    /// Cancel and await every unit, swallowing cancellation-induced errors.
    async fn shutdown(mut self) {
        self.finished = true;
        self.cancel.cancel();
        for handle in self.handles.drain(..) {
            handle.abort();
            let _ = handle.await;
        }
        tracing::debug!("all pipeline tasks cleaned up");
    }
}

impl Drop for TaskGuard {
    fn drop(&mut self) {
        if !self.finished {
            tracing::info!("consumer dropped the stream, aborting pipeline tasks");
            self.cancel.cancel();
            for handle in &self.handles {
                handle.abort();
            }
        }
    }
}

/// Spawn the three units and return the merged event stream.
pub(crate) fn spawn_and_stream(run: PipelineRun) -> CompositionStream {
    Box::pin(async_stream::stream! {
        let cancel = CancelToken::new();
        let (out_tx, mut out_rx) = mpsc::channel::<OutputEvent>(QUEUE_CAPACITY);
        let (handoff_tx, handoff_rx) = handoff();

        let ctx = StageContext {
            session: run.session,
            out: out_tx,
            cancel: cancel.clone(),
        };

        let monitor_handle = tokio::spawn(watch_connection(run.watcher, cancel.clone()));
        let reasoning_handle = tokio::spawn(run_reasoning_stage(
            run.reasoning_provider,
            run.messages.clone(),
            run.reasoning_model,
            ctx.clone(),
            handoff_tx,
        ));
        let answer_handle = tokio::spawn(run_answer_stage(
            run.answer_provider,
            run.messages,
            run.answer_model,
            run.params,
            run.template,
            ctx.clone(),
            handoff_rx,
        ));
        // The stages own the remaining senders; dropping ours lets recv()
        // observe queue closure once both stages are gone.
        drop(ctx);

        let guard = TaskGuard::new(
            vec![monitor_handle, reasoning_handle, answer_handle],
            cancel.clone(),
        );

        let mut finished_stages = 0usize;
        let mut cancelled = false;

        while finished_stages < 2 {
            if cancel.is_cancelled() {
                cancelled = true;
                break;
            }
            match timeout(QUEUE_POLL_TIMEOUT, out_rx.recv()).await {
                Ok(Some(OutputEvent::Frame(chunk))) => {
                    if cancel.is_cancelled() {
                        cancelled = true;
                        break;
                    }
                    yield CompositionEvent::Chunk(chunk);
                }
                Ok(Some(OutputEvent::StageDone)) => {
                    finished_stages += 1;
                }
                Ok(None) => {
                    // Cancelled stages skip their sentinels, so closure here
                    // is expected mid-cancellation; otherwise the queue
                    // coordination itself is broken.
                    if cancel.is_cancelled() {
                        cancelled = true;
                    } else {
                        tracing::error!(
                            finished_stages,
                            "output queue closed before both stages finished"
                        );
                    }
                    break;
                }
                Err(_) => {
                    // poll timeout: loop around and re-check the token
                    continue;
                }
            }
        }

        if cancel.is_cancelled() {
            cancelled = true;
        }

        // The terminal marker only belongs to a run where both stages
        // acknowledged completion; a broken queue emits nothing further.
        if !cancelled && finished_stages >= 2 {
            yield CompositionEvent::Done;
        }

        // Discard anything still queued, then tear the units down.
        out_rx.close();
        while out_rx.try_recv().is_ok() {}
        guard.shutdown().await;
    })
}
