//! End-to-end orchestration tests with scripted providers

mod support;

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;

use support::{EchoProvider, FakeItem, ScriptedProvider};
use tandem::error::PipelineError;
use tandem::pipeline::{Composer, CompositionEvent, ConnectionWatcher};
use tandem::types::{ChatMessage, GenerationParams};
use tandem::wire::DONE_FRAME;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tandem=debug".into()),
        )
        .try_init();
}

fn composer_with(
    reasoning: Arc<ScriptedProvider>,
    answer: Arc<EchoProvider>,
) -> Composer {
    init_tracing();
    Composer::builder()
        .reasoning(reasoning, "fake-reasoner")
        .answer(answer, "fake-answerer")
        .build()
        .unwrap()
}

async fn collect_frames(composer: &Composer, messages: Vec<ChatMessage>) -> Vec<String> {
    let events = composer
        .stream_completion(messages, GenerationParams::default())
        .await
        .unwrap();
    tandem::server_adapters::sse_frames(events).collect().await
}

#[tokio::test]
async fn round_trip_embeds_joined_reasoning() {
    let reasoning = Arc::new(ScriptedProvider::new(
        "fake-deepseek",
        vec![
            FakeItem::Reasoning("r1"),
            FakeItem::Reasoning("r2"),
            FakeItem::Answer("ignored"),
        ],
    ));
    let answer = Arc::new(EchoProvider::new());
    let composer = composer_with(reasoning, answer.clone());

    let frames = collect_frames(&composer, vec![ChatMessage::user("question")]).await;

    // two reasoning frames, one answer frame, one terminal marker
    assert_eq!(frames.last().unwrap(), DONE_FRAME);
    let reasoning_frames: Vec<&String> = frames
        .iter()
        .filter(|f| f.contains("reasoning_content"))
        .collect();
    assert_eq!(reasoning_frames.len(), 2);
    assert!(reasoning_frames[0].contains("r1"));
    assert!(reasoning_frames[1].contains("r2"));

    // the echoed answer is the augmented prompt: original input plus the
    // joined reasoning, per the template
    let answer_frame = frames
        .iter()
        .find(|f| f.contains(r#"\nr1r2\n"#))
        .expect("answer frame carries the joined reasoning");
    assert!(answer_frame.contains("Here's my original input:"));
    assert!(answer_frame.contains("question"));
}

#[tokio::test]
async fn system_turns_become_the_instruction_parameter() {
    let reasoning = Arc::new(ScriptedProvider::new(
        "fake-deepseek",
        vec![FakeItem::Reasoning("r"), FakeItem::Answer("x")],
    ));
    let answer = Arc::new(EchoProvider::new());
    let composer = composer_with(reasoning, answer.clone());

    let frames = collect_frames(
        &composer,
        vec![ChatMessage::system("S"), ChatMessage::user("U")],
    )
    .await;
    assert_eq!(frames.last().unwrap(), DONE_FRAME);

    let requests = answer.requests.lock().unwrap();
    assert_eq!(requests.len(), 1);
    let request = &requests[0];
    assert_eq!(request.system.as_deref(), Some("S"));
    assert_eq!(request.messages.len(), 1);
    assert!(request.messages[0].content.contains("U"));
}

#[tokio::test]
async fn answer_request_waits_for_complete_handoff() {
    // Slow reasoning: if the answer stage raced the handoff it could not
    // see all three fragments.
    let reasoning = Arc::new(
        ScriptedProvider::new(
            "fake-deepseek",
            vec![
                FakeItem::Reasoning("r1"),
                FakeItem::Reasoning("r2"),
                FakeItem::Reasoning("r3"),
                FakeItem::Answer("x"),
            ],
        )
        .with_delay(Duration::from_millis(30)),
    );
    let answer = Arc::new(EchoProvider::new());
    let composer = composer_with(reasoning, answer.clone());

    let frames = collect_frames(&composer, vec![ChatMessage::user("q")]).await;
    assert_eq!(frames.last().unwrap(), DONE_FRAME);

    let requests = answer.requests.lock().unwrap();
    assert!(requests[0].messages[0].content.contains("r1r2r3"));
}

#[tokio::test]
async fn malformed_final_turn_terminates_without_answer() {
    let reasoning = Arc::new(ScriptedProvider::new(
        "fake-deepseek",
        vec![FakeItem::Reasoning("r"), FakeItem::Answer("x")],
    ));
    let answer = Arc::new(EchoProvider::new());
    let composer = composer_with(reasoning, answer.clone());

    let frames = collect_frames(
        &composer,
        vec![ChatMessage::user("U"), ChatMessage::assistant("A")],
    )
    .await;

    // stream still terminates (no deadlock), with reasoning but no answer
    assert_eq!(frames.last().unwrap(), DONE_FRAME);
    assert!(frames.iter().any(|f| f.contains("reasoning_content")));
    assert!(answer.requests.lock().unwrap().is_empty());
}

#[tokio::test]
async fn empty_message_list_fails_before_any_stage() {
    let reasoning = Arc::new(ScriptedProvider::new("fake-deepseek", vec![]));
    let answer = Arc::new(EchoProvider::new());
    let composer = composer_with(reasoning.clone(), answer.clone());

    let result = composer
        .stream_completion(vec![], GenerationParams::default())
        .await;
    assert!(matches!(result, Err(PipelineError::InvalidRequest(_))));
    assert!(reasoning.requests.lock().unwrap().is_empty());
    assert!(answer.requests.lock().unwrap().is_empty());
}

#[tokio::test]
async fn reasoning_failure_degrades_to_fallback_text() {
    let reasoning = Arc::new(ScriptedProvider::failing("fake-deepseek"));
    let answer = Arc::new(EchoProvider::new());
    let composer = composer_with(reasoning, answer.clone());

    let frames = collect_frames(&composer, vec![ChatMessage::user("q")]).await;

    // best-effort stream: the run completes and the answer stage ran with
    // the fallback reasoning text
    assert_eq!(frames.last().unwrap(), DONE_FRAME);
    let requests = answer.requests.lock().unwrap();
    assert_eq!(requests.len(), 1);
    assert!(
        requests[0].messages[0]
            .content
            .contains("Failed to retrieve reasoning content")
    );
}

#[tokio::test]
async fn mid_stream_transport_error_is_not_fatal() {
    let reasoning = Arc::new(ScriptedProvider::new(
        "fake-deepseek",
        vec![FakeItem::Reasoning("r1"), FakeItem::Error("connection reset")],
    ));
    let answer = Arc::new(EchoProvider::new());
    let composer = composer_with(reasoning, answer.clone());

    let frames = collect_frames(&composer, vec![ChatMessage::user("q")]).await;

    assert_eq!(frames.last().unwrap(), DONE_FRAME);
    // a failed reasoning stream hands off the empty sentinel, which the
    // answer stage replaces with the fallback text
    let requests = answer.requests.lock().unwrap();
    assert!(
        requests[0].messages[0]
            .content
            .contains("Failed to retrieve reasoning content")
    );
}

#[tokio::test]
async fn non_stream_aggregation_folds_answer_deltas() {
    let reasoning = Arc::new(ScriptedProvider::new(
        "fake-deepseek",
        vec![FakeItem::Reasoning("think"), FakeItem::Answer("x")],
    ));
    let answer = Arc::new(ScriptedProvider::new(
        "fake-answerer",
        vec![FakeItem::Answer("Hel"), FakeItem::Answer("lo")],
    ));
    let composer = Composer::builder()
        .reasoning(reasoning, "fake-reasoner")
        .answer(answer, "fake-answerer")
        .build()
        .unwrap();

    let completion = composer
        .complete(vec![ChatMessage::user("hi")], GenerationParams::default())
        .await
        .unwrap();

    let choice = &completion.choices[0];
    assert_eq!(choice.message.content, "Hello");
    assert_eq!(choice.message.reasoning_content, "think");
    assert_eq!(choice.finish_reason, "stop");
    assert_eq!(completion.model, "fake-answerer");
    assert_eq!(
        completion.usage.total_tokens,
        completion.usage.prompt_tokens + completion.usage.completion_tokens
    );
}

struct FlagWatcher(Arc<AtomicBool>);

#[async_trait]
impl ConnectionWatcher for FlagWatcher {
    async fn is_disconnected(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[tokio::test]
async fn disconnect_cancels_without_terminal_marker() {
    // Keep the reasoning stage busy long enough for the monitor to trip.
    let script: Vec<FakeItem> = std::iter::repeat(FakeItem::Reasoning("r"))
        .take(50)
        .collect();
    let reasoning =
        Arc::new(ScriptedProvider::new("fake-deepseek", script).with_delay(Duration::from_millis(25)));
    let answer = Arc::new(EchoProvider::new());
    let composer = composer_with(reasoning, answer);

    let gone = Arc::new(AtomicBool::new(false));
    let mut events = composer
        .stream_completion_watched(
            vec![ChatMessage::user("q")],
            GenerationParams::default(),
            Arc::new(FlagWatcher(gone.clone())),
        )
        .await
        .unwrap();

    let mut saw_done = false;
    let mut frames = 0usize;
    while let Some(event) = events.next().await {
        match event {
            CompositionEvent::Chunk(_) => {
                frames += 1;
                if frames == 2 {
                    // the consumer goes away mid-stream
                    gone.store(true, Ordering::SeqCst);
                }
            }
            CompositionEvent::Done => saw_done = true,
        }
    }

    assert!(frames >= 2);
    assert!(!saw_done, "cancelled run must not emit the terminal marker");
}

#[tokio::test]
async fn dropping_the_stream_aborts_the_run() {
    let script: Vec<FakeItem> = std::iter::repeat(FakeItem::Reasoning("r"))
        .take(50)
        .collect();
    let reasoning =
        Arc::new(ScriptedProvider::new("fake-deepseek", script).with_delay(Duration::from_millis(20)));
    let answer = Arc::new(EchoProvider::new());
    let composer = composer_with(reasoning, answer.clone());

    let mut events = composer
        .stream_completion(vec![ChatMessage::user("q")], GenerationParams::default())
        .await
        .unwrap();

    // take one event, then walk away mid-run
    let first = events.next().await;
    assert!(first.is_some());
    drop(events);

    // the spawned units were aborted; give the runtime a beat and make sure
    // the answer provider never ran to completion against a dead consumer
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(answer.requests.lock().unwrap().is_empty());
}
