// Error types for the conversation loop

use thiserror::Error;

use crate::llm::LlmError;
use crate::tool_types::ToolId;
use crate::trace::TraceError;

/// Result type alias for conversation loop operations
pub type Result<T> = std::result::Result<T, AgentLoopError>;

/// Errors that abort a conversation loop run
///
/// Tool-level failures are not listed here: they are narrated to the model as
/// tool results and never surface to the caller.
#[derive(Debug, Error)]
pub enum AgentLoopError {
    /// LLM client error (fatal for the case once retries are exhausted)
    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    /// Trace recorder error
    #[error("Trace recorder error: {0}")]
    Trace(#[from] TraceError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl AgentLoopError {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        AgentLoopError::Configuration(msg.into())
    }

    /// Whether the error came from the LLM client
    pub fn is_llm(&self) -> bool {
        matches!(self, AgentLoopError::Llm(_))
    }
}

/// Errors raised while dispatching a tool call
///
/// Both variants are recoverable: the loop turns them into tool-result text
/// so the model can self-correct or relay the failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ToolDispatchError {
    /// The requested tool is outside the closed tool set or not registered
    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    /// Arguments were not a JSON object, or a required field is missing or mistyped
    #[error("Invalid arguments for {tool}: {reason}")]
    InvalidArguments { tool: String, reason: String },
}

impl ToolDispatchError {
    /// Create an invalid arguments error
    pub fn invalid_arguments(tool: impl Into<String>, reason: impl Into<String>) -> Self {
        ToolDispatchError::InvalidArguments {
            tool: tool.into(),
            reason: reason.into(),
        }
    }
}

/// Errors raised while building a tool registry
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// A tool with the same identity is already registered
    #[error("Tool already registered: {0}")]
    AlreadyRegistered(ToolId),
}
