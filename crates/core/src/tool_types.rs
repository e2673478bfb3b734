// Tool identities, parameter schemas, and tool call payloads
//
// Design Decision: Tools are identified by a closed enum rather than free-form
// strings. A name coming back from the model is parsed into a ToolId at the
// dispatch boundary; anything outside the set is ToolNotFound.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::fmt;
use std::str::FromStr;

use crate::error::ToolDispatchError;

/// Identity of a tool in the closed support tool set
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum ToolId {
    /// Look up an order by id
    LookupOrder,
    /// Refund a delivered order
    ProcessRefund,
    /// Search the FAQ knowledge base
    SearchFaq,
}

impl ToolId {
    /// Every known tool identity, in registry order
    pub const ALL: [ToolId; 3] = [ToolId::LookupOrder, ToolId::ProcessRefund, ToolId::SearchFaq];

    /// Wire name used by the model and recorded on spans
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolId::LookupOrder => "lookup_order",
            ToolId::ProcessRefund => "process_refund",
            ToolId::SearchFaq => "search_faq",
        }
    }

    /// Pure lookups read the static data set and have no side effects
    pub fn is_pure_lookup(&self) -> bool {
        matches!(self, ToolId::LookupOrder | ToolId::SearchFaq)
    }
}

impl fmt::Display for ToolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ToolId {
    type Err = ToolDispatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "lookup_order" => Ok(ToolId::LookupOrder),
            "process_refund" => Ok(ToolId::ProcessRefund),
            "search_faq" => Ok(ToolId::SearchFaq),
            other => Err(ToolDispatchError::ToolNotFound(other.to_string())),
        }
    }
}

/// JSON type of a tool parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamType {
    String,
    Integer,
    Number,
    Boolean,
}

impl ParamType {
    /// JSON schema type keyword
    pub fn as_str(&self) -> &'static str {
        match self {
            ParamType::String => "string",
            ParamType::Integer => "integer",
            ParamType::Number => "number",
            ParamType::Boolean => "boolean",
        }
    }

    fn accepts(&self, value: &Value) -> bool {
        match self {
            ParamType::String => value.is_string(),
            ParamType::Integer => value.is_i64() || value.is_u64(),
            ParamType::Number => value.is_number(),
            ParamType::Boolean => value.is_boolean(),
        }
    }
}

/// A single named parameter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParamSpec {
    pub name: String,
    pub param_type: ParamType,
    pub required: bool,
    pub description: String,
}

/// Parameter schema of a tool
///
/// Used both to validate arguments before dispatch and to render the JSON
/// schema offered to the model.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterSchema {
    pub params: Vec<ParamSpec>,
}

impl ParameterSchema {
    /// Create an empty schema
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a required parameter
    pub fn required(
        mut self,
        name: impl Into<String>,
        param_type: ParamType,
        description: impl Into<String>,
    ) -> Self {
        self.params.push(ParamSpec {
            name: name.into(),
            param_type,
            required: true,
            description: description.into(),
        });
        self
    }

    /// Add an optional parameter
    pub fn optional(
        mut self,
        name: impl Into<String>,
        param_type: ParamType,
        description: impl Into<String>,
    ) -> Self {
        self.params.push(ParamSpec {
            name: name.into(),
            param_type,
            required: false,
            description: description.into(),
        });
        self
    }

    /// Validate an argument object against the schema.
    ///
    /// Missing required fields and present-but-mistyped fields are rejected.
    /// An explicit `null` counts as missing. Extra fields are ignored.
    pub fn validate(&self, arguments: &Map<String, Value>) -> Result<(), String> {
        for param in &self.params {
            match arguments.get(&param.name) {
                None | Some(Value::Null) => {
                    if param.required {
                        return Err(format!("missing required field '{}'", param.name));
                    }
                }
                Some(value) if !param.param_type.accepts(value) => {
                    return Err(format!(
                        "field '{}' must be of type {}",
                        param.name,
                        param.param_type.as_str()
                    ));
                }
                Some(_) => {}
            }
        }
        Ok(())
    }

    /// Render as a JSON schema object
    pub fn to_json_schema(&self) -> Value {
        let properties: Map<String, Value> = self
            .params
            .iter()
            .map(|p| {
                (
                    p.name.clone(),
                    json!({
                        "type": p.param_type.as_str(),
                        "description": p.description,
                    }),
                )
            })
            .collect();
        let required: Vec<&str> = self
            .params
            .iter()
            .filter(|p| p.required)
            .map(|p| p.name.as_str())
            .collect();

        json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }
}

/// Tool definition offered to the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Tool name (used by the model to request the tool)
    pub name: String,
    /// Tool description for the model
    pub description: String,
    /// JSON schema for tool parameters
    pub parameters: Value,
}

/// Tool call requested by the model
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Unique ID for this tool call
    pub id: String,
    /// Requested tool name, as sent by the model
    pub name: String,
    /// Arguments as a raw JSON string, exactly as sent by the model
    pub arguments: String,
}

impl ToolCall {
    /// Create a tool call from a JSON argument value
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments: arguments.to_string(),
        }
    }

    /// Create a tool call from a raw argument string
    pub fn raw(id: impl Into<String>, name: impl Into<String>, arguments: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments: arguments.into(),
        }
    }
}
