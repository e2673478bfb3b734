//! LLM-as-judge scorers.
//!
//! A judge renders a prompt template from the case, asks the judge model to
//! call `select_choice` with one of a fixed set of choices, and maps that
//! choice to a score. The prompt wording is free to change; the contract is
//! the template variables, the legal choices, and the choice-to-score table.

use crate::scorer::{ScoreResult, Scorer, ScorerError, ScorerInput};
use async_trait::async_trait;
use minijinja::{context, Environment};
use serde::Deserialize;
use serde_json::json;
use tracecheck_core::{BoxedLlmClient, CaseTrace, ConversationMessage, ToolDefinition, ToolId};

/// Tool the judge model must call with its verdict
pub const SELECT_CHOICE_TOOL: &str = "select_choice";

const JUDGE_SYSTEM_PROMPT: &str = "You are an impartial evaluator grading the responses of a \
customer support agent. Read the data carefully and record your verdict by calling the \
select_choice tool.";

/// When a judge applies to a case
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applicability {
    Always,
    /// Not applicable when the case has no expected answer
    RequiresExpected,
    /// Not applicable unless a tool other than a single pure lookup ran
    RequiresToolEvidence,
}

impl Applicability {
    fn applies(&self, input: &ScorerInput) -> bool {
        match self {
            Applicability::Always => true,
            Applicability::RequiresExpected => !input.expected.trim().is_empty(),
            Applicability::RequiresToolEvidence => has_tool_evidence(&input.trace),
        }
    }
}

/// True when the trace shows known tools beyond a single pure lookup
fn has_tool_evidence(trace: &CaseTrace) -> bool {
    let tools: Vec<ToolId> = trace
        .tool_names()
        .into_iter()
        .filter_map(|name| name.parse().ok())
        .collect();
    match tools.as_slice() {
        [] => false,
        [only] => !only.is_pure_lookup(),
        _ => true,
    }
}

/// Definition of a judge: template, legal choices, and their scores
#[derive(Debug, Clone)]
pub struct JudgeSpec {
    pub name: String,
    /// minijinja template over `input`, `output`, `expected`, `tool_context`
    pub template: String,
    /// Legal choices in presentation order, each with its score
    pub choices: Vec<(String, f64)>,
    /// Ask the judge to explain itself before choosing
    pub use_cot: bool,
    pub applicability: Applicability,
}

impl JudgeSpec {
    pub fn new(name: impl Into<String>, template: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            template: template.into(),
            choices: Vec::new(),
            use_cot: true,
            applicability: Applicability::Always,
        }
    }

    pub fn choice(mut self, label: impl Into<String>, score: f64) -> Self {
        self.choices.push((label.into(), score));
        self
    }

    pub fn with_cot(mut self, use_cot: bool) -> Self {
        self.use_cot = use_cot;
        self
    }

    pub fn with_applicability(mut self, applicability: Applicability) -> Self {
        self.applicability = applicability;
        self
    }

    pub fn score_for(&self, choice: &str) -> Option<f64> {
        self.choices
            .iter()
            .find(|(label, _)| label == choice)
            .map(|(_, score)| *score)
    }

    fn labels(&self) -> Vec<&str> {
        self.choices.iter().map(|(label, _)| label.as_str()).collect()
    }

    fn select_choice_tool(&self) -> ToolDefinition {
        let mut properties = serde_json::Map::new();
        let mut required = Vec::new();
        if self.use_cot {
            properties.insert(
                "reasons".to_string(),
                json!({
                    "type": "string",
                    "description": "Step-by-step reasoning that leads to the choice"
                }),
            );
            required.push("reasons");
        }
        properties.insert(
            "choice".to_string(),
            json!({
                "type": "string",
                "enum": self.labels(),
                "description": "The selected choice"
            }),
        );
        required.push("choice");

        ToolDefinition {
            name: SELECT_CHOICE_TOOL.to_string(),
            description: "Record the evaluation verdict".to_string(),
            parameters: json!({
                "type": "object",
                "properties": properties,
                "required": required,
            }),
        }
    }
}

#[derive(Debug, Deserialize)]
struct Verdict {
    choice: String,
    #[serde(default)]
    reasons: Option<String>,
}

/// Scorer backed by a judge model
pub struct JudgeScorer {
    spec: JudgeSpec,
    client: BoxedLlmClient,
}

impl JudgeScorer {
    pub fn new(spec: JudgeSpec, client: BoxedLlmClient) -> Self {
        Self { spec, client }
    }

    pub fn spec(&self) -> &JudgeSpec {
        &self.spec
    }

    /// Render the prompt for a case
    pub fn render(&self, input: &ScorerInput) -> Result<String, ScorerError> {
        let env = Environment::new();
        env.render_str(
            &self.spec.template,
            context! {
                input => input.input,
                output => input.output,
                expected => input.expected,
                tool_context => tool_context(&input.trace),
            },
        )
        .map_err(|e| ScorerError::Template(e.to_string()))
    }

    fn parse_verdict(&self, arguments: &str) -> Result<Verdict, ScorerError> {
        serde_json::from_str(arguments).map_err(|e| ScorerError::MalformedVerdict {
            scorer: self.spec.name.clone(),
            reason: format!("invalid select_choice arguments: {}", e),
        })
    }
}

#[async_trait]
impl Scorer for JudgeScorer {
    fn name(&self) -> &str {
        &self.spec.name
    }

    async fn score(&self, input: &ScorerInput) -> Result<ScoreResult, ScorerError> {
        if !self.spec.applicability.applies(input) {
            return Ok(ScoreResult::not_applicable(&self.spec.name));
        }

        let prompt = self.render(input)?;
        let instruction = format!(
            "{}\n\nAnswer by calling {} with exactly one of: {}.",
            prompt,
            SELECT_CHOICE_TOOL,
            self.spec.labels().join(", ")
        );
        let messages = vec![
            ConversationMessage::system(JUDGE_SYSTEM_PROMPT),
            ConversationMessage::user(instruction),
        ];
        let tools = vec![self.spec.select_choice_tool()];

        let completion = self.client.complete(&messages, Some(tools.as_slice())).await?;
        let call = completion
            .tool_calls
            .iter()
            .find(|c| c.name == SELECT_CHOICE_TOOL)
            .ok_or_else(|| ScorerError::MalformedVerdict {
                scorer: self.spec.name.clone(),
                reason: "judge did not call select_choice".to_string(),
            })?;

        let verdict = self.parse_verdict(&call.arguments)?;
        let choice = verdict.choice.trim();
        let score = self
            .spec
            .score_for(choice)
            .ok_or_else(|| ScorerError::InvalidChoice {
                scorer: self.spec.name.clone(),
                choice: choice.to_string(),
            })?;

        tracing::debug!(scorer = %self.spec.name, choice, score, "Judge verdict");

        Ok(ScoreResult::applicable(&self.spec.name, score).with_metadata(json!({
            "choice": choice,
            "rationale": verdict.reasons,
        })))
    }
}

/// Tool outputs of a case, one `name: output` line per tool span
pub fn tool_context(trace: &CaseTrace) -> String {
    trace
        .tool_spans()
        .map(|span| format!("{}: {}", span.name, span.output_text()))
        .collect::<Vec<_>>()
        .join("\n")
}

// ============================================================================
// Presets
// ============================================================================

pub const FACTUALITY: &str = "factuality";
pub const POLICY_COMPLIANCE: &str = "policy_compliance";
pub const ANSWER_QUALITY: &str = "answer_quality";
pub const BRAND_VOICE: &str = "brand_voice";
pub const FAITHFULNESS: &str = "faithfulness";

const FACTUALITY_TEMPLATE: &str = r#"You are comparing a submitted answer to an expert answer on a given question.
[BEGIN DATA]
************
[Question]: {{ input }}
************
[Expert]: {{ expected }}
************
[Submission]: {{ output }}
************
[END DATA]

Compare the factual content of the submitted answer with the expert answer. Ignore differences in style, grammar, or punctuation.
Select one option:
(A) The submitted answer is a subset of the expert answer and is fully consistent with it.
(B) The submitted answer is a superset of the expert answer and is fully consistent with it.
(C) The submitted answer contains all the same details as the expert answer.
(D) There is a disagreement between the submitted answer and the expert answer.
(E) The answers differ, but these differences don't matter from the perspective of factuality."#;

const POLICY_COMPLIANCE_TEMPLATE: &str = r#"You are auditing a customer support agent's response for policy compliance.

The customer asked: {{ input }}
The agent responded: {{ output }}
The correct answer is: {{ expected }}

Evaluate whether the agent's response:
1. Accurately reflects the information returned by internal tools and does not fabricate data
2. Correctly communicates refund eligibility (only delivered orders are refundable)
3. Does not promise actions that were not actually completed

Is the agent's response policy-compliant?"#;

const ANSWER_QUALITY_TEMPLATE: &str = r#"You are assessing a submitted answer on a given task based on a criterion.
[BEGIN DATA]
***
[Task]: {{ input }}
***
[Submission]: {{ output }}
***
[Criterion]: Is the response helpful, accurate, and does it address the customer's specific question without providing incorrect information?
***
[END DATA]

Does the submission meet the criterion? Answer Y or N."#;

const BRAND_VOICE_TEMPLATE: &str = r#"You are reviewing a reply from Acme Corp customer support.

The customer asked: {{ input }}
The agent responded: {{ output }}

Acme's support voice is friendly, concise, and professional. Replies address the customer directly, avoid internal jargon, and never blame the customer.

Does the response match Acme's support voice?"#;

const FAITHFULNESS_TEMPLATE: &str = r#"You are checking whether a support agent's response is grounded in what its tools returned.

The customer asked: {{ input }}

Tool outputs:
{{ tool_context }}

The agent responded: {{ output }}

Does every factual claim in the response follow from the tool outputs above, without contradicting them or adding unsupported details?"#;

/// Expert-answer comparison (A 0.4, B 0.6, C 1, D 0, E 1)
pub fn factuality(client: BoxedLlmClient) -> JudgeScorer {
    let spec = JudgeSpec::new(FACTUALITY, FACTUALITY_TEMPLATE)
        .choice("A", 0.4)
        .choice("B", 0.6)
        .choice("C", 1.0)
        .choice("D", 0.0)
        .choice("E", 1.0)
        .with_applicability(Applicability::RequiresExpected);
    JudgeScorer::new(spec, client)
}

pub fn policy_compliance(client: BoxedLlmClient) -> JudgeScorer {
    JudgeScorer::new(yes_no(POLICY_COMPLIANCE, POLICY_COMPLIANCE_TEMPLATE), client)
}

/// Closed-QA style helpfulness check (Y 1, N 0)
pub fn answer_quality(client: BoxedLlmClient) -> JudgeScorer {
    let spec = JudgeSpec::new(ANSWER_QUALITY, ANSWER_QUALITY_TEMPLATE)
        .choice("Y", 1.0)
        .choice("N", 0.0);
    JudgeScorer::new(spec, client)
}

pub fn brand_voice(client: BoxedLlmClient) -> JudgeScorer {
    JudgeScorer::new(yes_no(BRAND_VOICE, BRAND_VOICE_TEMPLATE), client)
}

pub fn faithfulness(client: BoxedLlmClient) -> JudgeScorer {
    let spec = yes_no(FAITHFULNESS, FAITHFULNESS_TEMPLATE)
        .with_applicability(Applicability::RequiresToolEvidence);
    JudgeScorer::new(spec, client)
}

fn yes_no(name: &str, template: &str) -> JudgeSpec {
    JudgeSpec::new(name, template)
        .choice("Yes", 1.0)
        .choice("No", 0.0)
}

/// Every preset judge, sharing one client
pub fn all_judges(client: BoxedLlmClient) -> Vec<JudgeScorer> {
    vec![
        factuality(client.clone()),
        policy_compliance(client.clone()),
        answer_quality(client.clone()),
        brand_voice(client.clone()),
        faithfulness(client),
    ]
}

impl std::fmt::Debug for JudgeScorer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JudgeScorer")
            .field("name", &self.spec.name)
            .field("choices", &self.spec.choices)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::case::CaseMetadata;
    use chrono::Utc;
    use serde_json::Value;
    use std::sync::Arc;
    use tracecheck_core::{ScriptedLlmClient, Span, SpanKind};
    use uuid::Uuid;

    fn trace_with(tools: &[(&str, &str)]) -> CaseTrace {
        let case_id = Uuid::now_v7();
        let spans = tools
            .iter()
            .enumerate()
            .map(|(i, (name, output))| Span {
                case_id,
                sequence: i as u64,
                name: name.to_string(),
                kind: SpanKind::ToolCall,
                input: Value::Null,
                output: Value::String(output.to_string()),
                error: None,
                started_at: Utc::now(),
                ended_at: Utc::now(),
            })
            .collect();
        CaseTrace::from_spans(case_id, spans)
    }

    fn input(expected: &str, trace: CaseTrace) -> ScorerInput {
        ScorerInput {
            input: "Refund ORD-1001 please".to_string(),
            output: "Your refund of $299.99 has been processed.".to_string(),
            expected: expected.to_string(),
            metadata: CaseMetadata::new(),
            trace,
        }
    }

    #[test]
    fn test_render_fills_variables() {
        let judge = faithfulness(Arc::new(ScriptedLlmClient::new()));
        let trace = trace_with(&[
            ("lookup_order", "{\"status\":\"delivered\"}"),
            ("process_refund", "Refund processed"),
        ]);
        let prompt = judge.render(&input("", trace)).unwrap();

        assert!(prompt.contains("Refund ORD-1001 please"));
        assert!(prompt.contains("Your refund of $299.99 has been processed."));
        assert!(prompt.contains("lookup_order: {\"status\":\"delivered\"}\nprocess_refund: Refund processed"));
    }

    #[test]
    fn test_select_choice_schema() {
        let spec = factuality(Arc::new(ScriptedLlmClient::new())).spec().clone();
        let tool = spec.select_choice_tool();
        assert_eq!(tool.name, SELECT_CHOICE_TOOL);
        assert_eq!(
            tool.parameters["properties"]["choice"]["enum"],
            json!(["A", "B", "C", "D", "E"])
        );
        assert_eq!(tool.parameters["required"], json!(["reasons", "choice"]));

        let bare = spec.with_cot(false).select_choice_tool();
        assert_eq!(bare.parameters["required"], json!(["choice"]));
    }

    #[test]
    fn test_tool_evidence_rule() {
        assert!(!has_tool_evidence(&trace_with(&[])));
        assert!(!has_tool_evidence(&trace_with(&[("lookup_order", ""), ("lookup_order", "")])));
        assert!(!has_tool_evidence(&trace_with(&[("cancel_everything", "")])));
        assert!(has_tool_evidence(&trace_with(&[("process_refund", "")])));
        assert!(has_tool_evidence(&trace_with(&[("lookup_order", ""), ("search_faq", "")])));
    }

    #[test]
    fn test_preset_tables() {
        let client: BoxedLlmClient = Arc::new(ScriptedLlmClient::new());
        let judges = all_judges(client);
        let names: Vec<&str> = judges.iter().map(|j| j.spec().name.as_str()).collect();
        assert_eq!(
            names,
            vec![FACTUALITY, POLICY_COMPLIANCE, ANSWER_QUALITY, BRAND_VOICE, FAITHFULNESS]
        );

        let factuality = judges[0].spec();
        assert_eq!(factuality.score_for("A"), Some(0.4));
        assert_eq!(factuality.score_for("B"), Some(0.6));
        assert_eq!(factuality.score_for("D"), Some(0.0));
        assert_eq!(factuality.score_for("F"), None);

        assert_eq!(judges[2].spec().score_for("Y"), Some(1.0));
        assert_eq!(judges[3].spec().score_for("No"), Some(0.0));
    }
}
