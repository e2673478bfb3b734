// Message types
//
// ConversationMessage is a single entry in the history the loop sends to the
// model. Assistant messages may carry tool call requests; tool messages bind
// back to the call they answer through `tool_call_id`.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::tool_types::ToolCall;

/// Message role in the conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    /// System message (instructions)
    System,
    /// User message
    User,
    /// Assistant response, possibly requesting tools
    Assistant,
    /// Tool execution result
    Tool,
}

impl std::fmt::Display for MessageRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MessageRole::System => write!(f, "system"),
            MessageRole::User => write!(f, "user"),
            MessageRole::Assistant => write!(f, "assistant"),
            MessageRole::Tool => write!(f, "tool"),
        }
    }
}

/// A message in the conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationMessage {
    /// Message role
    pub role: MessageRole,

    /// Text content (absent for assistant messages that only request tools)
    pub content: Option<String>,

    /// Tool calls requested by the assistant
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,

    /// Tool call this message answers (tool messages only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl ConversationMessage {
    fn text(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: None,
        }
    }

    /// Create a system message
    pub fn system(content: impl Into<String>) -> Self {
        Self::text(MessageRole::System, content)
    }

    /// Create a user message
    pub fn user(content: impl Into<String>) -> Self {
        Self::text(MessageRole::User, content)
    }

    /// Create an assistant message
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::text(MessageRole::Assistant, content)
    }

    /// Create an assistant message with tool calls
    pub fn assistant_with_tools(content: Option<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content,
            tool_calls: Some(tool_calls),
            tool_call_id: None,
        }
    }

    /// Create a tool result message
    pub fn tool_result(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Tool,
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: Some(tool_call_id.into()),
        }
    }

    /// Text content, if any
    pub fn content_text(&self) -> Option<&str> {
        self.content.as_deref()
    }

    /// Check if this message has tool calls
    pub fn has_tool_calls(&self) -> bool {
        self.tool_calls.as_ref().is_some_and(|tc| !tc.is_empty())
    }
}

/// Tool call ids that are still unanswered at the end of `history`.
///
/// Returns an error naming the offending id if a tool message answers an
/// unknown call or answers the same call twice.
pub fn pending_tool_calls(history: &[ConversationMessage]) -> Result<Vec<String>, String> {
    let mut pending: Vec<String> = Vec::new();
    let mut answered: HashSet<String> = HashSet::new();

    for message in history {
        match message.role {
            MessageRole::Assistant => {
                for call in message.tool_calls.iter().flatten() {
                    pending.push(call.id.clone());
                }
            }
            MessageRole::Tool => {
                let id = message
                    .tool_call_id
                    .as_deref()
                    .ok_or_else(|| "tool message without tool_call_id".to_string())?;
                if answered.contains(id) {
                    return Err(format!("tool call '{}' answered twice", id));
                }
                let position = pending
                    .iter()
                    .position(|p| p == id)
                    .ok_or_else(|| format!("tool message answers unknown call '{}'", id))?;
                pending.remove(position);
                answered.insert(id.to_string());
            }
            MessageRole::System | MessageRole::User => {}
        }
    }

    Ok(pending)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn call(id: &str) -> ToolCall {
        ToolCall::new(id, "lookup_order", json!({"order_id": "ORD-1001"}))
    }

    #[test]
    fn test_user_message() {
        let msg = ConversationMessage::user("Hello");
        assert_eq!(msg.role, MessageRole::User);
        assert_eq!(msg.content_text(), Some("Hello"));
        assert!(!msg.has_tool_calls());
    }

    #[test]
    fn test_tool_result_message() {
        let msg = ConversationMessage::tool_result("call_123", "Order ORD-9999 not found.");
        assert_eq!(msg.role, MessageRole::Tool);
        assert_eq!(msg.tool_call_id, Some("call_123".to_string()));
    }

    #[test]
    fn test_assistant_tool_message_serialization() {
        let msg = ConversationMessage::assistant_with_tools(None, vec![call("call_1")]);
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["role"], "assistant");
        assert!(value["content"].is_null());
        assert_eq!(value["tool_calls"][0]["name"], "lookup_order");
        assert!(value.get("tool_call_id").is_none());
    }

    #[test]
    fn test_pending_tool_calls() {
        let history = vec![
            ConversationMessage::system("sys"),
            ConversationMessage::user("hi"),
            ConversationMessage::assistant_with_tools(None, vec![call("a"), call("b")]),
            ConversationMessage::tool_result("a", "ok"),
        ];
        assert_eq!(pending_tool_calls(&history).unwrap(), vec!["b".to_string()]);
    }

    #[test]
    fn test_pending_tool_calls_rejects_double_answer() {
        let history = vec![
            ConversationMessage::assistant_with_tools(None, vec![call("a")]),
            ConversationMessage::tool_result("a", "ok"),
            ConversationMessage::tool_result("a", "again"),
        ];
        assert!(pending_tool_calls(&history).unwrap_err().contains("twice"));
    }

    #[test]
    fn test_pending_tool_calls_rejects_unknown_answer() {
        let history = vec![ConversationMessage::tool_result("ghost", "ok")];
        assert!(pending_tool_calls(&history).unwrap_err().contains("unknown"));
    }
}
