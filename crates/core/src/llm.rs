// LLM client abstraction
//
// The conversation loop only sees this trait. Concrete clients (OpenAI
// protocol, scripted mock, retry and budget wrappers) live in their own
// modules and compose by wrapping one another.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::message::ConversationMessage;
use crate::tool_types::{ToolCall, ToolDefinition};

/// Errors returned by an LLM client
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LlmError {
    /// Provider rejected the request for rate limiting
    #[error("rate limited{}", retry_after.map(|d| format!(" (retry after {}ms)", d.as_millis())).unwrap_or_default())]
    RateLimited { retry_after: Option<Duration> },

    /// Request timed out
    #[error("request timed out")]
    Timeout,

    /// Malformed response, unexpected status, or transport failure
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The shared model-call budget is spent
    #[error("model call budget of {0} exhausted")]
    BudgetExhausted(usize),
}

impl LlmError {
    /// Create a protocol error
    pub fn protocol(msg: impl Into<String>) -> Self {
        LlmError::Protocol(msg.into())
    }

    /// Transient failures worth retrying
    pub fn is_retryable(&self) -> bool {
        matches!(self, LlmError::RateLimited { .. } | LlmError::Timeout)
    }

    /// Server-provided minimum wait, if any
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            LlmError::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }
}

/// How the model ended its turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionSignal {
    /// Plain answer, no tools requested
    Final,
    /// One or more tool calls requested
    ToolRequest,
}

/// Metadata reported with a completion
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_tokens: Option<u32>,
}

/// A single model response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Completion {
    pub signal: CompletionSignal,
    pub text: Option<String>,
    #[serde(default)]
    pub tool_calls: Vec<ToolCall>,
    #[serde(default)]
    pub metadata: CompletionMetadata,
}

impl Completion {
    /// A final text answer
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            signal: CompletionSignal::Final,
            text: Some(text.into()),
            tool_calls: Vec::new(),
            metadata: CompletionMetadata::default(),
        }
    }

    /// A tool request
    pub fn tool_calls(tool_calls: Vec<ToolCall>) -> Self {
        Self {
            signal: CompletionSignal::ToolRequest,
            text: None,
            tool_calls,
            metadata: CompletionMetadata::default(),
        }
    }

    /// Attach metadata
    pub fn with_metadata(mut self, metadata: CompletionMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Whether the loop should execute tools for this completion
    pub fn requests_tools(&self) -> bool {
        self.signal == CompletionSignal::ToolRequest && !self.tool_calls.is_empty()
    }
}

/// Language-model client used by the conversation loop
///
/// `tools = None` disables tool use for the call.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(
        &self,
        messages: &[ConversationMessage],
        tools: Option<&[ToolDefinition]>,
    ) -> Result<Completion, LlmError>;
}

/// Shared, type-erased client
pub type BoxedLlmClient = Arc<dyn LlmClient>;

#[async_trait]
impl<T: LlmClient + ?Sized> LlmClient for Arc<T> {
    async fn complete(
        &self,
        messages: &[ConversationMessage],
        tools: Option<&[ToolDefinition]>,
    ) -> Result<Completion, LlmError> {
        (**self).complete(messages, tools).await
    }
}
