// Per-case execution traces
//
// Every model call and every tool dispatch made while running a case is
// recorded as a Span in an append-only log keyed by case id. The loop writes
// through a TraceContext; scorers read a CaseTrace snapshot once the loop has
// finished. There is no process-global "current trace".

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

/// Kind of recorded operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpanKind {
    ModelCall,
    ToolCall,
}

impl std::fmt::Display for SpanKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SpanKind::ModelCall => write!(f, "model_call"),
            SpanKind::ToolCall => write!(f, "tool_call"),
        }
    }
}

/// One recorded operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Span {
    /// Case this span belongs to
    pub case_id: Uuid,
    /// Position in the case log, assigned by the recorder on append
    pub sequence: u64,
    /// Tool name for tool spans, operation name for model spans
    pub name: String,
    pub kind: SpanKind,
    pub input: Value,
    pub output: Value,
    /// Error text for failed operations
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
}

impl Span {
    /// Output as text: strings verbatim, anything else as compact JSON
    pub fn output_text(&self) -> String {
        match &self.output {
            Value::String(s) => s.clone(),
            Value::Null => String::new(),
            other => other.to_string(),
        }
    }
}

/// Span selection by kind and name. Empty filter matches everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SpanFilter {
    pub kind: Option<SpanKind>,
    pub name: Option<String>,
}

impl SpanFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn kind(kind: SpanKind) -> Self {
        Self {
            kind: Some(kind),
            name: None,
        }
    }

    /// Tool spans only
    pub fn tools() -> Self {
        Self::kind(SpanKind::ToolCall)
    }

    /// Restrict to spans with the given name
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn matches(&self, span: &Span) -> bool {
        self.kind.map_or(true, |k| k == span.kind)
            && self.name.as_deref().map_or(true, |n| n == span.name)
    }
}

/// Errors from a trace recorder backend
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TraceError {
    #[error("trace recorder unavailable: {0}")]
    Unavailable(String),
}

/// Append-only span log, partitioned by case id
///
/// Implementations must keep cases isolated and accept concurrent appends
/// for different cases.
#[async_trait]
pub trait TraceRecorder: Send + Sync {
    /// Append a span to its case log.
    ///
    /// The recorder assigns `sequence`, overwriting whatever the caller set,
    /// and returns it.
    async fn record(&self, span: Span) -> Result<u64, TraceError>;

    /// Lazily stream the spans of a case matching `filter`, in sequence order.
    ///
    /// The stream reads a snapshot taken when it is first polled; spans
    /// appended afterwards are not observed. Call again to restart. Unknown
    /// cases yield an empty stream.
    fn stream_spans(&self, case_id: Uuid, filter: SpanFilter) -> BoxStream<'static, Span>;

    /// Collect `stream_spans` into a vector
    async fn get_spans(&self, case_id: Uuid, filter: SpanFilter) -> Vec<Span> {
        self.stream_spans(case_id, filter).collect().await
    }

    /// Drop a finished case's log. Backends that persist spans keep them.
    async fn discard(&self, _case_id: Uuid) -> Result<(), TraceError> {
        Ok(())
    }
}

// ============================================================================
// TraceContext - write side, owned by one case run
// ============================================================================

/// Span that has started but not yet been recorded
#[derive(Debug, Clone)]
pub struct PendingSpan {
    kind: SpanKind,
    name: String,
    input: Value,
    started_at: DateTime<Utc>,
}

/// Handle the loop uses to record spans for a single case
#[derive(Clone)]
pub struct TraceContext {
    case_id: Uuid,
    recorder: Arc<dyn TraceRecorder>,
}

impl TraceContext {
    pub fn new(case_id: Uuid, recorder: Arc<dyn TraceRecorder>) -> Self {
        Self { case_id, recorder }
    }

    pub fn case_id(&self) -> Uuid {
        self.case_id
    }

    /// Mark the start of an operation
    pub fn start(&self, kind: SpanKind, name: impl Into<String>, input: Value) -> PendingSpan {
        PendingSpan {
            kind,
            name: name.into(),
            input,
            started_at: Utc::now(),
        }
    }

    /// Record a started operation with its output
    pub async fn finish(
        &self,
        pending: PendingSpan,
        output: Value,
        error: Option<String>,
    ) -> Result<u64, TraceError> {
        let span = Span {
            case_id: self.case_id,
            sequence: 0,
            name: pending.name,
            kind: pending.kind,
            input: pending.input,
            output,
            error,
            started_at: pending.started_at,
            ended_at: Utc::now(),
        };
        self.recorder.record(span).await
    }

    /// Snapshot everything recorded so far for this case
    pub async fn snapshot(&self) -> CaseTrace {
        CaseTrace::load(self.recorder.as_ref(), self.case_id).await
    }
}

impl std::fmt::Debug for TraceContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TraceContext")
            .field("case_id", &self.case_id)
            .finish()
    }
}

// ============================================================================
// CaseTrace - read side, handed to scorers
// ============================================================================

/// Immutable snapshot of one case's spans
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CaseTrace {
    pub case_id: Uuid,
    spans: Vec<Span>,
}

impl CaseTrace {
    /// Load every span of a case from a recorder
    pub async fn load(recorder: &dyn TraceRecorder, case_id: Uuid) -> Self {
        let spans = recorder.get_spans(case_id, SpanFilter::all()).await;
        Self { case_id, spans }
    }

    /// Build a trace from spans already in hand
    pub fn from_spans(case_id: Uuid, mut spans: Vec<Span>) -> Self {
        spans.sort_by_key(|s| s.sequence);
        Self { case_id, spans }
    }

    pub fn all(&self) -> &[Span] {
        &self.spans
    }

    pub fn is_empty(&self) -> bool {
        self.spans.is_empty()
    }

    /// Spans matching a filter, in sequence order
    pub fn spans<'a>(&'a self, filter: &'a SpanFilter) -> impl Iterator<Item = &'a Span> + 'a {
        self.spans.iter().filter(move |s| filter.matches(s))
    }

    pub fn tool_spans(&self) -> impl Iterator<Item = &Span> {
        self.spans.iter().filter(|s| s.kind == SpanKind::ToolCall)
    }

    /// Tool names in invocation order, repeats included
    pub fn tool_sequence(&self) -> Vec<&str> {
        self.tool_spans().map(|s| s.name.as_str()).collect()
    }

    /// Distinct tool names in order of first invocation
    pub fn tool_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for name in self.tool_sequence() {
            if !names.contains(&name) {
                names.push(name);
            }
        }
        names
    }

    pub fn model_call_count(&self) -> usize {
        self.spans
            .iter()
            .filter(|s| s.kind == SpanKind::ModelCall)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn span(sequence: u64, kind: SpanKind, name: &str) -> Span {
        let now = Utc::now();
        Span {
            case_id: Uuid::nil(),
            sequence,
            name: name.to_string(),
            kind,
            input: json!({}),
            output: json!("ok"),
            error: None,
            started_at: now,
            ended_at: now,
        }
    }

    #[test]
    fn test_filter_matching() {
        let tool = span(0, SpanKind::ToolCall, "lookup_order");
        let model = span(1, SpanKind::ModelCall, "chat_completion");

        assert!(SpanFilter::all().matches(&tool));
        assert!(SpanFilter::tools().matches(&tool));
        assert!(!SpanFilter::tools().matches(&model));
        assert!(SpanFilter::tools().with_name("lookup_order").matches(&tool));
        assert!(!SpanFilter::tools().with_name("search_faq").matches(&tool));
    }

    #[test]
    fn test_tool_names_are_distinct_and_ordered() {
        let trace = CaseTrace::from_spans(
            Uuid::nil(),
            vec![
                span(3, SpanKind::ToolCall, "lookup_order"),
                span(0, SpanKind::ModelCall, "chat_completion"),
                span(1, SpanKind::ToolCall, "search_faq"),
                span(2, SpanKind::ToolCall, "lookup_order"),
            ],
        );

        assert_eq!(
            trace.tool_sequence(),
            vec!["search_faq", "lookup_order", "lookup_order"]
        );
        assert_eq!(trace.tool_names(), vec!["search_faq", "lookup_order"]);
        assert_eq!(trace.model_call_count(), 1);
    }

    #[test]
    fn test_output_text() {
        let mut s = span(0, SpanKind::ToolCall, "lookup_order");
        assert_eq!(s.output_text(), "ok");
        s.output = json!({"status": "delivered"});
        assert_eq!(s.output_text(), r#"{"status":"delivered"}"#);
    }
}
