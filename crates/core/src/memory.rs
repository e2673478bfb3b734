// In-memory implementations for tests and offline runs
//
// - InMemoryTraceRecorder: span logs in a concurrent map keyed by case id
// - ScriptedLlmClient: deterministic LLM stand-in driven by a script

use async_trait::async_trait;
use futures::stream::{self, BoxStream};
use futures::StreamExt;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::llm::{Completion, LlmClient, LlmError};
use crate::message::ConversationMessage;
use crate::tool_types::ToolDefinition;
use crate::trace::{Span, SpanFilter, TraceError, TraceRecorder};

// ============================================================================
// InMemoryTraceRecorder
// ============================================================================

/// In-memory trace recorder
///
/// Each case has its own append-only log. Appends for different cases never
/// interleave within a log.
#[derive(Debug, Default, Clone)]
pub struct InMemoryTraceRecorder {
    logs: Arc<RwLock<HashMap<Uuid, Vec<Span>>>>,
}

impl InMemoryTraceRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ids of every case with at least one span
    pub async fn case_ids(&self) -> Vec<Uuid> {
        self.logs.read().await.keys().copied().collect()
    }

    pub async fn span_count(&self, case_id: Uuid) -> usize {
        self.logs
            .read()
            .await
            .get(&case_id)
            .map(|spans| spans.len())
            .unwrap_or(0)
    }

    pub async fn clear(&self) {
        self.logs.write().await.clear();
    }
}

#[async_trait]
impl TraceRecorder for InMemoryTraceRecorder {
    async fn record(&self, mut span: Span) -> Result<u64, TraceError> {
        let mut logs = self.logs.write().await;
        let log = logs.entry(span.case_id).or_default();
        let sequence = log.len() as u64;
        span.sequence = sequence;
        log.push(span);
        Ok(sequence)
    }

    fn stream_spans(&self, case_id: Uuid, filter: SpanFilter) -> BoxStream<'static, Span> {
        let logs = Arc::clone(&self.logs);
        stream::once(async move {
            logs.read()
                .await
                .get(&case_id)
                .map(|spans| {
                    spans
                        .iter()
                        .filter(|s| filter.matches(s))
                        .cloned()
                        .collect::<Vec<_>>()
                })
                .unwrap_or_default()
        })
        .flat_map(stream::iter)
        .boxed()
    }

    async fn discard(&self, case_id: Uuid) -> Result<(), TraceError> {
        self.logs.write().await.remove(&case_id);
        Ok(())
    }
}

// ============================================================================
// ScriptedLlmClient
// ============================================================================

/// Closure producing a completion from the history and offered tools
pub type Responder = Arc<
    dyn Fn(&[ConversationMessage], Option<&[ToolDefinition]>) -> Result<Completion, LlmError>
        + Send
        + Sync,
>;

#[derive(Clone)]
enum ScriptStep {
    Fixed(Result<Completion, LlmError>),
    Dynamic(Responder),
}

/// One call as seen by the scripted client
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub messages: Vec<ConversationMessage>,
    /// Names of the tools offered, `None` when tools were disabled
    pub tools: Option<Vec<String>>,
}

#[derive(Debug, Default)]
struct ScriptState {
    call_index: usize,
    calls: Vec<RecordedCall>,
}

/// Deterministic LLM client for tests
///
/// Steps are consumed in order. Once the script runs out, the `tail` step (set
/// by `repeating` or `from_fn`) answers every further call; without a tail the
/// client returns a protocol error.
///
/// ```ignore
/// let client = ScriptedLlmClient::new()
///     .then(Completion::tool_calls(vec![ToolCall::new("c1", "lookup_order", json!({"order_id": "ORD-1001"}))]))
///     .then(Completion::text("Your order was delivered."));
/// ```
#[derive(Clone, Default)]
pub struct ScriptedLlmClient {
    steps: Vec<ScriptStep>,
    tail: Option<ScriptStep>,
    delay: Option<Duration>,
    state: Arc<RwLock<ScriptState>>,
}

impl ScriptedLlmClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script from a list of completions
    pub fn from_completions(completions: impl IntoIterator<Item = Completion>) -> Self {
        completions
            .into_iter()
            .fold(Self::new(), |client, c| client.then(c))
    }

    /// Answer every call with the closure
    pub fn from_fn<F>(f: F) -> Self
    where
        F: Fn(&[ConversationMessage], Option<&[ToolDefinition]>) -> Result<Completion, LlmError>
            + Send
            + Sync
            + 'static,
    {
        Self {
            tail: Some(ScriptStep::Dynamic(Arc::new(f))),
            ..Self::default()
        }
    }

    /// Answer every call with the same completion.
    ///
    /// Tool call ids get the call index appended so they stay unique across
    /// rounds.
    pub fn repeating(completion: Completion) -> Self {
        Self {
            tail: Some(ScriptStep::Fixed(Ok(completion))),
            ..Self::default()
        }
    }

    pub fn then(mut self, completion: Completion) -> Self {
        self.steps.push(ScriptStep::Fixed(Ok(completion)));
        self
    }

    pub fn then_error(mut self, error: LlmError) -> Self {
        self.steps.push(ScriptStep::Fixed(Err(error)));
        self
    }

    pub fn then_with<F>(mut self, f: F) -> Self
    where
        F: Fn(&[ConversationMessage], Option<&[ToolDefinition]>) -> Result<Completion, LlmError>
            + Send
            + Sync
            + 'static,
    {
        self.steps.push(ScriptStep::Dynamic(Arc::new(f)));
        self
    }

    /// Sleep before answering each call
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub async fn call_count(&self) -> usize {
        self.state.read().await.call_index
    }

    pub async fn calls(&self) -> Vec<RecordedCall> {
        self.state.read().await.calls.clone()
    }
}

#[async_trait]
impl LlmClient for ScriptedLlmClient {
    async fn complete(
        &self,
        messages: &[ConversationMessage],
        tools: Option<&[ToolDefinition]>,
    ) -> Result<Completion, LlmError> {
        let index = {
            let mut state = self.state.write().await;
            let index = state.call_index;
            state.call_index += 1;
            state.calls.push(RecordedCall {
                messages: messages.to_vec(),
                tools: tools.map(|defs| defs.iter().map(|d| d.name.clone()).collect()),
            });
            index
        };

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let (step, from_tail) = match self.steps.get(index) {
            Some(step) => (step, false),
            None => match &self.tail {
                Some(step) => (step, true),
                None => {
                    return Err(LlmError::protocol(format!(
                        "script exhausted after {} calls",
                        self.steps.len()
                    )))
                }
            },
        };

        match step {
            ScriptStep::Dynamic(f) => f(messages, tools),
            ScriptStep::Fixed(result) => {
                let mut result = result.clone();
                if from_tail {
                    if let Ok(completion) = &mut result {
                        for call in &mut completion.tool_calls {
                            call.id = format!("{}_{}", call.id, index);
                        }
                    }
                }
                result
            }
        }
    }
}

impl std::fmt::Debug for ScriptedLlmClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptedLlmClient")
            .field("steps", &self.steps.len())
            .field("has_tail", &self.tail.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tool_types::ToolCall;
    use crate::trace::SpanKind;
    use chrono::Utc;
    use serde_json::json;

    fn span(case_id: Uuid, name: &str, kind: SpanKind) -> Span {
        let now = Utc::now();
        Span {
            case_id,
            sequence: 99,
            name: name.to_string(),
            kind,
            input: json!({}),
            output: json!(""),
            error: None,
            started_at: now,
            ended_at: now,
        }
    }

    #[tokio::test]
    async fn test_recorder_assigns_sequence_per_case() {
        let recorder = InMemoryTraceRecorder::new();
        let a = Uuid::now_v7();
        let b = Uuid::now_v7();

        assert_eq!(recorder.record(span(a, "chat_completion", SpanKind::ModelCall)).await, Ok(0));
        assert_eq!(recorder.record(span(b, "search_faq", SpanKind::ToolCall)).await, Ok(0));
        assert_eq!(recorder.record(span(a, "lookup_order", SpanKind::ToolCall)).await, Ok(1));

        let spans = recorder.get_spans(a, SpanFilter::all()).await;
        assert_eq!(spans.len(), 2);
        assert_eq!(spans[1].sequence, 1);
        assert!(spans.iter().all(|s| s.case_id == a));

        let tools = recorder.get_spans(a, SpanFilter::tools()).await;
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0].name, "lookup_order");
    }

    #[tokio::test]
    async fn test_unknown_case_is_empty() {
        let recorder = InMemoryTraceRecorder::new();
        assert!(recorder
            .get_spans(Uuid::now_v7(), SpanFilter::all())
            .await
            .is_empty());
    }

    #[tokio::test]
    async fn test_discard_drops_only_that_case() {
        let recorder = InMemoryTraceRecorder::new();
        let a = Uuid::now_v7();
        let b = Uuid::now_v7();
        recorder.record(span(a, "search_faq", SpanKind::ToolCall)).await.unwrap();
        recorder.record(span(b, "lookup_order", SpanKind::ToolCall)).await.unwrap();

        recorder.discard(a).await.unwrap();
        assert_eq!(recorder.span_count(a).await, 0);
        assert_eq!(recorder.span_count(b).await, 1);
        assert_eq!(recorder.case_ids().await, vec![b]);
    }

    #[tokio::test]
    async fn test_stream_is_restartable_snapshot() {
        let recorder = InMemoryTraceRecorder::new();
        let case = Uuid::now_v7();
        recorder.record(span(case, "search_faq", SpanKind::ToolCall)).await.unwrap();

        let first: Vec<Span> = recorder.stream_spans(case, SpanFilter::all()).collect().await;
        recorder.record(span(case, "lookup_order", SpanKind::ToolCall)).await.unwrap();
        let second: Vec<Span> = recorder.stream_spans(case, SpanFilter::all()).collect().await;

        assert_eq!(first.len(), 1);
        assert_eq!(second.len(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_appends_stay_isolated() {
        let recorder = InMemoryTraceRecorder::new();
        let cases: Vec<Uuid> = (0..8).map(|_| Uuid::now_v7()).collect();

        let handles: Vec<_> = cases
            .iter()
            .map(|&case| {
                let recorder = recorder.clone();
                tokio::spawn(async move {
                    for _ in 0..25 {
                        recorder
                            .record(span(case, "lookup_order", SpanKind::ToolCall))
                            .await
                            .unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap();
        }

        for case in cases {
            let spans = recorder.get_spans(case, SpanFilter::all()).await;
            assert_eq!(spans.len(), 25);
            let sequences: Vec<u64> = spans.iter().map(|s| s.sequence).collect();
            assert_eq!(sequences, (0..25).collect::<Vec<u64>>());
        }
    }

    #[tokio::test]
    async fn test_scripted_client_runs_in_order() {
        let client = ScriptedLlmClient::new()
            .then(Completion::text("first"))
            .then_error(LlmError::Timeout);

        let messages = vec![ConversationMessage::user("hi")];
        assert_eq!(
            client.complete(&messages, None).await.unwrap().text.as_deref(),
            Some("first")
        );
        assert_eq!(client.complete(&messages, None).await, Err(LlmError::Timeout));
        assert!(matches!(
            client.complete(&messages, None).await,
            Err(LlmError::Protocol(_))
        ));
        assert_eq!(client.call_count().await, 3);
        assert_eq!(client.calls().await[0].tools, None);
    }

    #[tokio::test]
    async fn test_repeating_client_makes_ids_unique() {
        let client = ScriptedLlmClient::repeating(Completion::tool_calls(vec![ToolCall::new(
            "call",
            "search_faq",
            json!({"query": "refund"}),
        )]));

        let messages = vec![ConversationMessage::user("hi")];
        let a = client.complete(&messages, None).await.unwrap();
        let b = client.complete(&messages, None).await.unwrap();
        assert_eq!(a.tool_calls[0].id, "call_0");
        assert_eq!(b.tool_calls[0].id, "call_1");
    }

    #[tokio::test]
    async fn test_from_fn_sees_history() {
        let client = ScriptedLlmClient::from_fn(|messages, _tools| {
            Ok(Completion::text(format!("{} messages", messages.len())))
        });
        let messages = vec![
            ConversationMessage::system("sys"),
            ConversationMessage::user("hi"),
        ];
        let completion = client.complete(&messages, None).await.unwrap();
        assert_eq!(completion.text.as_deref(), Some("2 messages"));
    }
}
