// OpenAI Protocol LLM Client
//
// Non-streaming client for the OpenAI chat completions protocol. Works with
// any OpenAI-compatible endpoint via `with_base_url` or OPENAI_BASE_URL.
//
// Error mapping:
// - 429 -> RateLimited (retry-after seconds honoured)
// - 408, 504, client-side timeout -> Timeout
// - anything else (status, transport, body) -> Protocol

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

use crate::error::{AgentLoopError, Result};
use crate::llm::{Completion, CompletionMetadata, CompletionSignal, LlmClient, LlmError};
use crate::message::{ConversationMessage, MessageRole};
use crate::tool_types::{ToolCall, ToolDefinition};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Default chat model
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// OpenAI chat completions client
///
/// ```ignore
/// let client = OpenAiClient::from_env()?;
/// // or
/// let client = OpenAiClient::new("your-api-key").with_model("gpt-4o");
/// // or with custom endpoint
/// let client = OpenAiClient::new("key").with_base_url("http://localhost:8080/v1");
/// ```
#[derive(Clone)]
pub struct OpenAiClient {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    temperature: Option<f32>,
}

impl OpenAiClient {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            temperature: None,
        }
    }

    /// Create a client from OPENAI_API_KEY, OPENAI_MODEL and OPENAI_BASE_URL
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| AgentLoopError::config("OPENAI_API_KEY environment variable not set"))?;
        let mut client = Self::new(api_key);
        if let Ok(model) = std::env::var("OPENAI_MODEL") {
            client = client.with_model(model);
        }
        if let Ok(base_url) = std::env::var("OPENAI_BASE_URL") {
            client = client.with_base_url(base_url);
        }
        Ok(client)
    }

    /// Base URL up to and including the API version, e.g. `https://api.openai.com/v1`
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Per-request timeout; elapsed requests map to `LlmError::Timeout`
    pub fn with_timeout(mut self, timeout: Duration) -> Result<Self> {
        self.client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AgentLoopError::config(format!("Failed to build HTTP client: {}", e)))?;
        Ok(self)
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn api_url(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    fn convert_message(msg: &ConversationMessage) -> OpenAiMessage {
        let role = match msg.role {
            MessageRole::System => "system",
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
            MessageRole::Tool => "tool",
        };

        OpenAiMessage {
            role: role.to_string(),
            content: msg.content.clone(),
            tool_calls: msg.tool_calls.as_ref().map(|calls| {
                calls
                    .iter()
                    .map(|tc| OpenAiToolCall {
                        id: tc.id.clone(),
                        r#type: "function".to_string(),
                        function: OpenAiFunctionCall {
                            name: tc.name.clone(),
                            arguments: tc.arguments.clone(),
                        },
                    })
                    .collect()
            }),
            tool_call_id: msg.tool_call_id.clone(),
        }
    }

    fn convert_tools(tools: &[ToolDefinition]) -> Vec<OpenAiTool> {
        tools
            .iter()
            .map(|tool| OpenAiTool {
                r#type: "function".to_string(),
                function: OpenAiFunction {
                    name: tool.name.clone(),
                    description: tool.description.clone(),
                    parameters: tool.parameters.clone(),
                },
            })
            .collect()
    }

    async fn error_from_response(response: Response) -> LlmError {
        let status = response.status();
        match status {
            StatusCode::TOO_MANY_REQUESTS => LlmError::RateLimited {
                retry_after: parse_retry_after(&response),
            },
            StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => LlmError::Timeout,
            _ => {
                let body = response.text().await.unwrap_or_default();
                LlmError::protocol(format!("OpenAI API error ({}): {}", status, body))
            }
        }
    }
}

fn parse_retry_after(response: &Response) -> Option<Duration> {
    let value = response.headers().get("retry-after")?.to_str().ok()?;
    let secs: f64 = value.trim().parse().ok()?;
    (secs.is_finite() && secs >= 0.0).then(|| Duration::from_secs_f64(secs))
}

fn transport_error(e: reqwest::Error) -> LlmError {
    if e.is_timeout() {
        LlmError::Timeout
    } else {
        LlmError::protocol(format!("Failed to send request: {}", e))
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    async fn complete(
        &self,
        messages: &[ConversationMessage],
        tools: Option<&[ToolDefinition]>,
    ) -> std::result::Result<Completion, LlmError> {
        let request = OpenAiRequest {
            model: self.model.clone(),
            messages: messages.iter().map(Self::convert_message).collect(),
            temperature: self.temperature,
            tools: tools
                .filter(|t| !t.is_empty())
                .map(Self::convert_tools),
        };

        let response = self
            .client
            .post(self.api_url())
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await
            .map_err(transport_error)?;

        if !response.status().is_success() {
            return Err(Self::error_from_response(response).await);
        }

        let body: OpenAiResponse = response.json().await.map_err(|e| {
            if e.is_timeout() {
                LlmError::Timeout
            } else {
                LlmError::protocol(format!("Failed to parse response: {}", e))
            }
        })?;

        let choice = body
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| LlmError::protocol("response contained no choices"))?;

        let tool_calls: Vec<ToolCall> = choice
            .message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(|tc| ToolCall::raw(tc.id, tc.function.name, tc.function.arguments))
            .collect();

        let signal = if choice.finish_reason.as_deref() == Some("tool_calls") || !tool_calls.is_empty()
        {
            CompletionSignal::ToolRequest
        } else {
            CompletionSignal::Final
        };

        debug!(
            model = %self.model,
            finish_reason = ?choice.finish_reason,
            tool_calls = tool_calls.len(),
            "OpenAI completion received"
        );

        Ok(Completion {
            signal,
            text: choice.message.content,
            tool_calls,
            metadata: CompletionMetadata {
                model: body.model,
                finish_reason: choice.finish_reason,
                total_tokens: body.usage.map(|u| u.total_tokens),
            },
        })
    }
}

impl std::fmt::Debug for OpenAiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiClient")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("api_key", &"[REDACTED]")
            .finish()
    }
}

// ============================================================================
// OpenAI API Types
// ============================================================================

#[derive(Debug, Serialize)]
struct OpenAiRequest {
    model: String,
    messages: Vec<OpenAiMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<OpenAiTool>>,
}

#[derive(Debug, Serialize, Deserialize)]
struct OpenAiMessage {
    role: String,
    content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<OpenAiToolCall>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct OpenAiToolCall {
    id: String,
    r#type: String,
    function: OpenAiFunctionCall,
}

#[derive(Debug, Serialize, Deserialize)]
struct OpenAiFunctionCall {
    name: String,
    arguments: String,
}

#[derive(Debug, Serialize)]
struct OpenAiTool {
    r#type: String,
    function: OpenAiFunction,
}

#[derive(Debug, Serialize)]
struct OpenAiFunction {
    name: String,
    description: String,
    parameters: Value,
}

#[derive(Debug, Deserialize)]
struct OpenAiResponse {
    #[serde(default)]
    model: Option<String>,
    choices: Vec<OpenAiChoice>,
    #[serde(default)]
    usage: Option<OpenAiUsage>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoice {
    message: OpenAiMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAiUsage {
    total_tokens: u32,
}
