// Tool-calling conversation loop
//
// This crate provides a bounded tool-calling loop (LLM call -> tool execution
// -> repeat) that records every model call and tool dispatch to a per-case
// trace, so the run can be scored from what the agent actually did.
//
// Key design decisions:
// - Uses traits (LlmClient, TraceRecorder, Tool) for pluggable backends
// - Tools form a closed set keyed by ToolId; the registry validates arguments
// - The loop is an explicit state machine with a terminal state
// - Trace state is passed explicitly (TraceContext), never global
// - Error handling distinguishes between user-visible and internal tool errors

pub mod error;
pub mod llm;
pub mod message;
pub mod tool_types;
pub mod tools;
pub mod trace;

pub mod config;
pub mod r#loop;

// Acme support domain
pub mod store;
pub mod support_tools;

// LLM clients and wrappers
pub mod budget;
pub mod openai;
pub mod retry;

// In-memory implementations for tests and offline runs
pub mod memory;

pub mod telemetry;

// Re-exports for convenience
pub use budget::{BudgetedClient, ModelCallBudget};
pub use config::{AgentConfig, SUPPORT_SYSTEM_PROMPT};
pub use error::{AgentLoopError, RegistryError, Result, ToolDispatchError};
pub use llm::{BoxedLlmClient, Completion, CompletionMetadata, CompletionSignal, LlmClient, LlmError};
pub use memory::{InMemoryTraceRecorder, ScriptedLlmClient};
pub use message::{ConversationMessage, MessageRole};
pub use openai::OpenAiClient;
pub use r#loop::{ConversationLoop, LoopOutcome, LoopState, Termination, MODEL_CALL_SPAN};
pub use retry::{RetryPolicy, RetryingClient};
pub use store::{FaqEntry, OrderRecord, OrderStatus, SupportStore};
pub use support_tools::{support_registry, LookupOrderTool, ProcessRefundTool, SearchFaqTool};
pub use telemetry::init_tracing;
pub use tool_types::{ParamType, ParameterSchema, ToolCall, ToolDefinition, ToolId};
pub use tools::{Tool, ToolExecutionResult, ToolOutput, ToolRegistry};
pub use trace::{CaseTrace, Span, SpanFilter, SpanKind, TraceContext, TraceError, TraceRecorder};
