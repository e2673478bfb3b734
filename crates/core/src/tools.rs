// Tool Abstraction for the Conversation Loop
//
// Tools implement the `Tool` trait and are registered in a `ToolRegistry`
// keyed by their closed `ToolId`. The registry owns the dispatch contract:
// name resolution, argument parsing, schema validation, invocation, and one
// tool span per dispatch.
//
// Design decisions:
// - Registration is fallible; the same ToolId cannot be registered twice
// - Dispatch errors (unknown tool, bad arguments) are narrated to the model
//   as tool results, never surfaced as loop errors
// - Internal errors are logged but not exposed to the LLM

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, error};

use crate::error::{RegistryError, Result, ToolDispatchError};
use crate::tool_types::{ParameterSchema, ToolCall, ToolDefinition, ToolId};
use crate::trace::{SpanKind, TraceContext};

/// Text shown to the model in place of an internal error
pub const INTERNAL_ERROR_MESSAGE: &str = "An internal error occurred while executing the tool";

// ============================================================================
// Tool Execution Result - Error Handling Contract
// ============================================================================

/// Result of a tool execution.
///
/// - `Success`: result text is returned to the LLM
/// - `ToolError`: expected failure the LLM should relay (e.g. "not eligible for a refund")
/// - `InternalError`: system failure; logged, replaced with a generic message
#[derive(Debug)]
pub enum ToolExecutionResult {
    Success(String),
    ToolError(String),
    InternalError(ToolInternalError),
}

impl ToolExecutionResult {
    pub fn success(text: impl Into<String>) -> Self {
        ToolExecutionResult::Success(text.into())
    }

    /// Serialize a JSON value as the result text
    pub fn json(value: &Value) -> Self {
        ToolExecutionResult::Success(value.to_string())
    }

    pub fn tool_error(message: impl Into<String>) -> Self {
        ToolExecutionResult::ToolError(message.into())
    }

    pub fn internal_error(error: impl std::error::Error + Send + Sync + 'static) -> Self {
        ToolExecutionResult::InternalError(ToolInternalError::new(error))
    }

    pub fn internal_error_msg(message: impl Into<String>) -> Self {
        ToolExecutionResult::InternalError(ToolInternalError::from_message(message))
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ToolExecutionResult::Success(_))
    }

    /// Convert to the text the model sees
    fn into_output(self, tool_name: &str, tool_call_id: &str) -> ToolOutput {
        match self {
            ToolExecutionResult::Success(content) => ToolOutput {
                content,
                is_error: false,
            },
            ToolExecutionResult::ToolError(content) => ToolOutput {
                content,
                is_error: true,
            },
            ToolExecutionResult::InternalError(err) => {
                error!(
                    tool_name = %tool_name,
                    tool_call_id = %tool_call_id,
                    error = %err.message,
                    "Tool internal error (details hidden from LLM)"
                );
                ToolOutput {
                    content: INTERNAL_ERROR_MESSAGE.to_string(),
                    is_error: true,
                }
            }
        }
    }
}

/// Internal error details (logged but not exposed to LLM)
#[derive(Debug)]
pub struct ToolInternalError {
    pub message: String,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl ToolInternalError {
    pub fn new(error: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self {
            message: error.to_string(),
            source: Some(Box::new(error)),
        }
    }

    pub fn from_message(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }
}

impl std::fmt::Display for ToolInternalError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ToolInternalError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

/// Text returned to the model for one tool call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolOutput {
    pub content: String,
    pub is_error: bool,
}

// ============================================================================
// Tool Trait - Core Tool Abstraction
// ============================================================================

/// A callable tool.
///
/// `execute` receives arguments that already passed `schema()` validation,
/// so required fields are present with the declared types.
#[async_trait]
pub trait Tool: Send + Sync {
    fn id(&self) -> ToolId;

    /// Description offered to the model
    fn description(&self) -> &str;

    fn schema(&self) -> ParameterSchema;

    async fn execute(&self, arguments: &Map<String, Value>) -> ToolExecutionResult;

    fn to_definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.id().as_str().to_string(),
            description: self.description().to_string(),
            parameters: self.schema().to_json_schema(),
        }
    }
}

// ============================================================================
// ToolRegistry
// ============================================================================

/// Closed set of registered tools, iterated in `ToolId` order
#[derive(Default, Clone)]
pub struct ToolRegistry {
    tools: BTreeMap<ToolId, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn builder() -> ToolRegistryBuilder {
        ToolRegistryBuilder::new()
    }

    /// Register a tool. Fails if its id is already taken.
    pub fn register(&mut self, tool: impl Tool + 'static) -> std::result::Result<(), RegistryError> {
        self.register_arc(Arc::new(tool))
    }

    pub fn register_arc(&mut self, tool: Arc<dyn Tool>) -> std::result::Result<(), RegistryError> {
        let id = tool.id();
        if self.tools.contains_key(&id) {
            return Err(RegistryError::AlreadyRegistered(id));
        }
        self.tools.insert(id, tool);
        Ok(())
    }

    pub fn get(&self, id: ToolId) -> Option<&Arc<dyn Tool>> {
        self.tools.get(&id)
    }

    pub fn has(&self, id: ToolId) -> bool {
        self.tools.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn tool_ids(&self) -> Vec<ToolId> {
        self.tools.keys().copied().collect()
    }

    /// Definitions offered to the model, in `ToolId` order
    pub fn tool_definitions(&self) -> Vec<ToolDefinition> {
        self.tools.values().map(|t| t.to_definition()).collect()
    }

    /// Resolve, validate, and execute a call without recording anything
    pub async fn invoke(&self, call: &ToolCall) -> std::result::Result<ToolOutput, ToolDispatchError> {
        let id: ToolId = call.name.parse()?;
        let tool = self
            .tools
            .get(&id)
            .ok_or_else(|| ToolDispatchError::ToolNotFound(call.name.clone()))?;

        let arguments = parse_arguments(&call.name, &call.arguments)?;
        tool.schema()
            .validate(&arguments)
            .map_err(|reason| ToolDispatchError::invalid_arguments(&call.name, reason))?;

        Ok(tool
            .execute(&arguments)
            .await
            .into_output(&call.name, &call.id))
    }

    /// Dispatch a model-requested call and record exactly one tool span.
    ///
    /// Dispatch errors come back as an error `ToolOutput` carrying the error
    /// text; only a trace recorder failure is returned as `Err`.
    pub async fn dispatch(&self, call: &ToolCall, trace: &TraceContext) -> Result<ToolOutput> {
        let input = serde_json::from_str::<Value>(&call.arguments)
            .unwrap_or_else(|_| Value::String(call.arguments.clone()));
        let pending = trace.start(SpanKind::ToolCall, call.name.as_str(), input);

        let output = match self.invoke(call).await {
            Ok(output) => output,
            Err(err) => {
                debug!(tool_name = %call.name, error = %err, "Tool dispatch rejected");
                ToolOutput {
                    content: err.to_string(),
                    is_error: true,
                }
            }
        };

        debug!(
            case_id = %trace.case_id(),
            tool_name = %call.name,
            is_error = output.is_error,
            "Tool dispatched"
        );

        let error = output.is_error.then(|| output.content.clone());
        trace
            .finish(pending, Value::String(output.content.clone()), error)
            .await?;

        Ok(output)
    }
}

fn parse_arguments(
    tool: &str,
    raw: &str,
) -> std::result::Result<Map<String, Value>, ToolDispatchError> {
    if raw.trim().is_empty() {
        return Ok(Map::new());
    }
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(ToolDispatchError::invalid_arguments(
            tool,
            format!("arguments must be a JSON object, got {}", json_type(&other)),
        )),
        Err(e) => Err(ToolDispatchError::invalid_arguments(
            tool,
            format!("arguments are not valid JSON: {}", e),
        )),
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.tool_ids())
            .finish()
    }
}

// ============================================================================
// ToolRegistryBuilder - Fluent API for Building Registry
// ============================================================================

/// Builder for a ToolRegistry.
///
/// The first registration error is kept and returned from `build()`.
///
/// ```ignore
/// let registry = ToolRegistry::builder()
///     .tool(LookupOrderTool::new(store.clone()))
///     .tool(SearchFaqTool::new(store))
///     .build()?;
/// ```
#[derive(Default)]
pub struct ToolRegistryBuilder {
    registry: ToolRegistry,
    error: Option<RegistryError>,
}

impl ToolRegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tool(self, tool: impl Tool + 'static) -> Self {
        self.tool_arc(Arc::new(tool))
    }

    pub fn tool_arc(mut self, tool: Arc<dyn Tool>) -> Self {
        if self.error.is_none() {
            if let Err(e) = self.registry.register_arc(tool) {
                self.error = Some(e);
            }
        }
        self
    }

    pub fn build(self) -> std::result::Result<ToolRegistry, RegistryError> {
        match self.error {
            Some(e) => Err(e),
            None => Ok(self.registry),
        }
    }
}
