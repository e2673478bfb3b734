// Conversation Loop - bounded tool-calling state machine
//
// One run answers one user input:
//
//   AwaitingModel{1} -> ToolsExecuting{1} -> AwaitingModel{2} -> ...
//   ... -> ToolsExecuting{max_rounds} -> RoundExhausted -> Finished
//
// A final answer in AwaitingModel jumps straight to Finished. RoundExhausted
// makes exactly one more model call with tools withdrawn and returns its text
// whatever it says, so a run never makes more than max_rounds + 1 model calls.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info};

use crate::config::AgentConfig;
use crate::error::Result;
use crate::llm::{BoxedLlmClient, Completion, LlmError};
use crate::message::ConversationMessage;
use crate::tool_types::{ToolCall, ToolDefinition};
use crate::tools::ToolRegistry;
use crate::trace::{SpanKind, TraceContext};

/// Span name of every model call
pub const MODEL_CALL_SPAN: &str = "chat_completion";

/// Loop states
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopState {
    /// Waiting on a model call with tools offered (rounds are 1-based)
    AwaitingModel { round: usize },
    /// Executing the tool calls of a round, in model order
    ToolsExecuting { round: usize, calls: Vec<ToolCall> },
    /// Round budget spent; one tool-less model call remains
    RoundExhausted,
    /// Terminal
    Finished {
        answer: String,
        termination: Termination,
    },
}

impl LoopState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, LoopState::Finished { .. })
    }
}

/// Why the loop stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Termination {
    /// The model answered without requesting tools
    ModelFinal,
    /// Tools were withdrawn after the last round
    RoundExhausted,
}

/// Result of one loop run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoopOutcome {
    pub answer: String,
    pub termination: Termination,
    pub model_calls: usize,
    /// Rounds in which tools were executed
    pub rounds: usize,
    pub messages: Vec<ConversationMessage>,
}

/// Drives one LLM client and one tool registry through the loop
#[derive(Clone)]
pub struct ConversationLoop {
    client: BoxedLlmClient,
    registry: Arc<ToolRegistry>,
    config: AgentConfig,
}

impl ConversationLoop {
    pub fn new(client: BoxedLlmClient, registry: Arc<ToolRegistry>, config: AgentConfig) -> Self {
        Self {
            client,
            registry,
            config,
        }
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Run the loop for one user input, recording spans through `trace`.
    ///
    /// Tool dispatch failures are handed back to the model. LLM client and
    /// trace recorder failures abort the run.
    pub async fn run(&self, input: &str, trace: &TraceContext) -> Result<LoopOutcome> {
        let tools = self.registry.tool_definitions();
        let mut messages = vec![
            ConversationMessage::system(self.config.system_prompt.as_str()),
            ConversationMessage::user(input),
        ];
        let mut model_calls = 0;
        let mut rounds = 0;

        let mut state = if self.config.max_rounds == 0 {
            LoopState::RoundExhausted
        } else {
            LoopState::AwaitingModel { round: 1 }
        };

        loop {
            state = match state {
                LoopState::AwaitingModel { round } => {
                    let completion = self.call_model(&messages, Some(tools.as_slice()), trace).await?;
                    model_calls += 1;

                    if completion.requests_tools() {
                        if let Some(id) = duplicate_call_id(&completion.tool_calls) {
                            return Err(LlmError::protocol(format!(
                                "tool call id '{}' repeated in one turn",
                                id
                            ))
                            .into());
                        }
                        messages.push(ConversationMessage::assistant_with_tools(
                            completion.text,
                            completion.tool_calls.clone(),
                        ));
                        LoopState::ToolsExecuting {
                            round,
                            calls: completion.tool_calls,
                        }
                    } else {
                        let answer = completion.text.unwrap_or_default();
                        messages.push(ConversationMessage::assistant(answer.as_str()));
                        LoopState::Finished {
                            answer,
                            termination: Termination::ModelFinal,
                        }
                    }
                }

                LoopState::ToolsExecuting { round, calls } => {
                    for call in &calls {
                        let output = self.registry.dispatch(call, trace).await?;
                        messages.push(ConversationMessage::tool_result(
                            call.id.as_str(),
                            output.content,
                        ));
                    }
                    rounds = round;

                    if round >= self.config.max_rounds {
                        debug!(case_id = %trace.case_id(), round, "Tool rounds exhausted");
                        LoopState::RoundExhausted
                    } else {
                        LoopState::AwaitingModel { round: round + 1 }
                    }
                }

                LoopState::RoundExhausted => {
                    let completion = self.call_model(&messages, None, trace).await?;
                    model_calls += 1;

                    let answer = completion.text.unwrap_or_default();
                    messages.push(ConversationMessage::assistant(answer.as_str()));
                    LoopState::Finished {
                        answer,
                        termination: Termination::RoundExhausted,
                    }
                }

                LoopState::Finished {
                    answer,
                    termination,
                } => {
                    info!(
                        case_id = %trace.case_id(),
                        model_calls,
                        rounds,
                        termination = ?termination,
                        "Conversation loop finished"
                    );
                    return Ok(LoopOutcome {
                        answer,
                        termination,
                        model_calls,
                        rounds,
                        messages,
                    });
                }
            };
        }
    }

    /// One model call wrapped in a model_call span
    async fn call_model(
        &self,
        messages: &[ConversationMessage],
        tools: Option<&[ToolDefinition]>,
        trace: &TraceContext,
    ) -> Result<Completion> {
        let offered: Option<Vec<&str>> = tools.map(|t| t.iter().map(|d| d.name.as_str()).collect());
        let pending = trace.start(
            SpanKind::ModelCall,
            MODEL_CALL_SPAN,
            json!({
                "messages": messages,
                "tools": offered,
            }),
        );

        debug!(
            case_id = %trace.case_id(),
            messages = messages.len(),
            tools_offered = tools.is_some(),
            "Calling model"
        );

        match self.client.complete(messages, tools).await {
            Ok(completion) => {
                let output = serde_json::to_value(&completion).unwrap_or(Value::Null);
                trace.finish(pending, output, None).await?;
                Ok(completion)
            }
            Err(err) => {
                trace
                    .finish(pending, Value::Null, Some(err.to_string()))
                    .await?;
                Err(err.into())
            }
        }
    }
}

/// First id used by more than one call in a turn
fn duplicate_call_id(calls: &[ToolCall]) -> Option<&str> {
    let mut seen = HashSet::new();
    calls
        .iter()
        .map(|c| c.id.as_str())
        .find(|id| !seen.insert(*id))
}

impl std::fmt::Debug for ConversationLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConversationLoop")
            .field("registry", &self.registry)
            .field("config", &self.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{InMemoryTraceRecorder, ScriptedLlmClient};
    use crate::message::pending_tool_calls;
    use crate::store::SupportStore;
    use crate::support_tools::support_registry;
    use crate::trace::{SpanFilter, TraceRecorder};
    use uuid::Uuid;

    fn setup(
        client: ScriptedLlmClient,
        max_rounds: usize,
    ) -> (ConversationLoop, Arc<InMemoryTraceRecorder>, TraceContext) {
        let registry = support_registry(Arc::new(SupportStore::acme())).unwrap();
        let agent = ConversationLoop::new(
            Arc::new(client),
            Arc::new(registry),
            AgentConfig::default().with_max_rounds(max_rounds),
        );
        let recorder = Arc::new(InMemoryTraceRecorder::new());
        let trace = TraceContext::new(Uuid::now_v7(), recorder.clone());
        (agent, recorder, trace)
    }

    fn faq_call(id: &str) -> Completion {
        Completion::tool_calls(vec![ToolCall::new(
            id,
            "search_faq",
            json!({"query": "password"}),
        )])
    }

    #[tokio::test]
    async fn test_direct_final_answer() {
        let client = ScriptedLlmClient::new().then(Completion::text("Hello!"));
        let (agent, recorder, trace) = setup(client.clone(), 3);

        let outcome = agent.run("hi", &trace).await.unwrap();
        assert_eq!(outcome.answer, "Hello!");
        assert_eq!(outcome.termination, Termination::ModelFinal);
        assert_eq!(outcome.model_calls, 1);
        assert_eq!(outcome.rounds, 0);
        assert_eq!(outcome.messages.len(), 3);

        let spans = recorder.get_spans(trace.case_id(), SpanFilter::all()).await;
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].name, MODEL_CALL_SPAN);
        assert_eq!(
            spans[0].input["tools"],
            json!(["lookup_order", "process_refund", "search_faq"])
        );
    }

    #[tokio::test]
    async fn test_round_exhaustion_withdraws_tools() {
        let client = ScriptedLlmClient::new()
            .then(faq_call("a"))
            .then(faq_call("b"))
            .then(Completion::text("Here is what I found."));
        let (agent, _recorder, trace) = setup(client.clone(), 2);

        let outcome = agent.run("password?", &trace).await.unwrap();
        assert_eq!(outcome.termination, Termination::RoundExhausted);
        assert_eq!(outcome.model_calls, 3);
        assert_eq!(outcome.rounds, 2);
        assert_eq!(outcome.answer, "Here is what I found.");

        let calls = client.calls().await;
        assert!(calls[0].tools.is_some());
        assert!(calls[1].tools.is_some());
        assert_eq!(calls[2].tools, None);
    }

    #[tokio::test]
    async fn test_zero_rounds_starts_exhausted() {
        let client = ScriptedLlmClient::new().then(Completion::text("No tools today."));
        let (agent, recorder, trace) = setup(client.clone(), 0);

        let outcome = agent.run("ORD-1001?", &trace).await.unwrap();
        assert_eq!(outcome.termination, Termination::RoundExhausted);
        assert_eq!(outcome.model_calls, 1);
        assert_eq!(client.calls().await[0].tools, None);
        assert!(recorder
            .get_spans(trace.case_id(), SpanFilter::tools())
            .await
            .is_empty());
    }

    #[tokio::test]
    async fn test_empty_tool_request_is_final() {
        let mut completion = Completion::tool_calls(vec![]);
        completion.text = Some("Nothing to call.".to_string());
        let client = ScriptedLlmClient::new().then(completion);
        let (agent, _recorder, trace) = setup(client, 3);

        let outcome = agent.run("hi", &trace).await.unwrap();
        assert_eq!(outcome.termination, Termination::ModelFinal);
        assert_eq!(outcome.answer, "Nothing to call.");
    }

    #[tokio::test]
    async fn test_llm_error_aborts_and_is_recorded() {
        let client = ScriptedLlmClient::new()
            .then(faq_call("a"))
            .then_error(LlmError::Timeout);
        let (agent, recorder, trace) = setup(client, 3);

        let err = agent.run("hi", &trace).await.unwrap_err();
        assert!(err.is_llm());

        let spans = recorder
            .get_spans(trace.case_id(), SpanFilter::kind(SpanKind::ModelCall))
            .await;
        assert_eq!(spans.len(), 2);
        assert_eq!(spans[1].error.as_deref(), Some("request timed out"));
    }

    #[tokio::test]
    async fn test_repeated_call_id_is_rejected_before_dispatch() {
        let client = ScriptedLlmClient::new().then(Completion::tool_calls(vec![
            ToolCall::new("x", "lookup_order", json!({"order_id": "ORD-1001"})),
            ToolCall::new("x", "search_faq", json!({"query": "password"})),
        ]));
        let (agent, recorder, trace) = setup(client.clone(), 3);

        let err = agent.run("ORD-1001 and passwords", &trace).await.unwrap_err();
        assert!(err.is_llm());
        assert!(err.to_string().contains("'x'"));
        assert_eq!(client.call_count().await, 1);
        assert!(recorder
            .get_spans(trace.case_id(), SpanFilter::tools())
            .await
            .is_empty());
    }

    #[tokio::test]
    async fn test_distinct_call_ids_are_each_answered() {
        let client = ScriptedLlmClient::new()
            .then(Completion::tool_calls(vec![
                ToolCall::new("a", "lookup_order", json!({"order_id": "ORD-1001"})),
                ToolCall::new("b", "search_faq", json!({"query": "password"})),
            ]))
            .then(Completion::text("Done."));
        let (agent, _recorder, trace) = setup(client, 3);

        let outcome = agent.run("ORD-1001 and passwords", &trace).await.unwrap();
        assert_eq!(pending_tool_calls(&outcome.messages), Ok(vec![]));
    }

    #[test]
    fn test_terminal_state() {
        assert!(LoopState::Finished {
            answer: String::new(),
            termination: Termination::ModelFinal
        }
        .is_terminal());
        assert!(!LoopState::RoundExhausted.is_terminal());
    }
}
