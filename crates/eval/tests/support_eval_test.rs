// End-to-end eval runs over the Acme support cases
//
// The model here is a small rule-based stand-in: it picks a tool from the
// user's message, then answers from the tool result. It is stateless, so one
// client can serve concurrent cases.

use serde_json::{json, Value};
use std::sync::Arc;
use tracecheck_core::{
    support_registry, AgentConfig, Completion, ConversationLoop, ConversationMessage,
    MessageRole, ScriptedLlmClient, SpanFilter, SupportStore, Termination, ToolCall, TraceRecorder,
};
use tracecheck_eval::scorers::ORDER_NOT_FOUND_CATEGORY;
use tracecheck_eval::{
    code_scorers, workshop_dataset, CaseReport, CaseStatus, EvalCase, EvalRunner, PathMatch,
    RunnerConfig, ScoreValue, Scorers, VecDataset,
};

fn order_id(text: &str) -> Option<String> {
    let start = text.find("ORD-")?;
    text.get(start..start + 8).map(str::to_string)
}

fn plan(user: &str) -> ToolCall {
    match order_id(user) {
        Some(id) if user.to_lowercase().contains("refund") => ToolCall::new(
            "call_1",
            "process_refund",
            json!({"order_id": id, "reason": user}),
        ),
        Some(id) => ToolCall::new("call_1", "lookup_order", json!({"order_id": id})),
        None => ToolCall::new("call_1", "search_faq", json!({"query": user})),
    }
}

fn compose(output: &str) -> String {
    match serde_json::from_str::<Value>(output) {
        Ok(order) if order.get("order_id").is_some() => {
            let items: Vec<&str> = order["items"]
                .as_array()
                .map(|items| items.iter().filter_map(Value::as_str).collect())
                .unwrap_or_default();
            format!(
                "Order {} has been {}. Items: {}. Total: ${:.2}.",
                order["order_id"].as_str().unwrap_or_default(),
                order["status"].as_str().unwrap_or_default(),
                items.join(", "),
                order["total"].as_f64().unwrap_or_default()
            )
        }
        Ok(faq) if faq.get("answer").is_some() => {
            faq["answer"].as_str().unwrap_or_default().to_string()
        }
        _ => output.trim_start_matches("Error: ").to_string(),
    }
}

fn support_model() -> ScriptedLlmClient {
    ScriptedLlmClient::from_fn(|messages: &[ConversationMessage], tools| {
        let user = messages
            .iter()
            .find(|m| m.role == MessageRole::User)
            .and_then(|m| m.content_text())
            .unwrap_or_default();
        let tool_result = messages
            .last()
            .filter(|m| m.role == MessageRole::Tool)
            .and_then(|m| m.content_text());

        match (tool_result, tools) {
            (Some(output), _) => Ok(Completion::text(compose(output))),
            (None, Some(_)) => Ok(Completion::tool_calls(vec![plan(user)])),
            (None, None) => Ok(Completion::text("Please contact support@acme.com.")),
        }
    })
}

fn agent(client: ScriptedLlmClient, max_rounds: usize) -> ConversationLoop {
    let registry = support_registry(Arc::new(SupportStore::acme())).unwrap();
    ConversationLoop::new(
        Arc::new(client),
        Arc::new(registry),
        AgentConfig::default().with_max_rounds(max_rounds),
    )
}

fn runner(client: ScriptedLlmClient, scorers: Scorers) -> EvalRunner {
    EvalRunner::new(
        agent(client, 3),
        scorers,
        RunnerConfig::new()
            .with_concurrency(4)
            .with_retained_traces(true),
    )
}

fn score(report: &CaseReport, scorer: &str) -> ScoreValue {
    report.scores[scorer].result().unwrap().value
}

#[tokio::test]
async fn test_workshop_run_scores_every_case() {
    let runner = runner(support_model(), code_scorers(PathMatch::Set));
    let summary = runner.run(&workshop_dataset(), None).await.unwrap();

    assert_eq!(summary.total_cases, 12);
    assert_eq!(summary.completed, 12);
    assert_eq!(summary.errored, 0);

    let indices: Vec<usize> = summary.cases.iter().map(|c| c.index).collect();
    assert_eq!(indices, (0..12).collect::<Vec<_>>());

    let tool_used = summary.scorer("correct_tool_used").unwrap();
    assert_eq!(tool_used.applicable, 12);
    assert_eq!(tool_used.mean, Some(1.0));

    // The built-in cases name a tool but no path
    let path = summary.scorer("expected_tool_path").unwrap();
    assert_eq!(path.applicable, 0);
    assert_eq!(path.not_applicable, 12);
    assert_eq!(path.mean, None);

    let hallucination = summary.scorer("no_hallucination_on_missing_order").unwrap();
    assert_eq!(hallucination.applicable, 2);
    assert_eq!(hallucination.not_applicable, 10);
    assert_eq!(hallucination.mean, Some(1.0));

    let keywords = summary.scorer("keyword_match").unwrap();
    assert_eq!(keywords.applicable, 12);
    assert!(keywords.mean.unwrap() > 0.0);
}

#[tokio::test]
async fn test_delivered_order_lookup() {
    let runner = runner(support_model(), code_scorers(PathMatch::Set));
    let cases = vec![EvalCase::new(
        "What's the status of order ORD-1001?",
        "Order ORD-1001 has been delivered. It contains Pro Plan (Annual) and the total was $299.99.",
    )
    .with_category("order_lookup")
    .with_expected_tool("lookup_order")];

    let summary = runner.run_cases("scenario-a", cases, |_| {}).await;
    let report = &summary.cases[0];

    let spans = runner
        .recorder()
        .get_spans(report.case_id, SpanFilter::tools())
        .await;
    assert_eq!(spans.len(), 1);
    assert_eq!(spans[0].name, "lookup_order");

    let answer = report.output.as_deref().unwrap();
    assert!(answer.contains("ORD-1001"));
    assert!(answer.contains("delivered"));
    assert!(answer.contains("$299.99"));
    assert_eq!(score(report, "correct_tool_used"), ScoreValue::Applicable(1.0));
}

#[tokio::test]
async fn test_missing_order_is_not_invented() {
    let runner = runner(support_model(), code_scorers(PathMatch::Set));
    let cases = vec![EvalCase::new("What's the status of order ORD-9999?", "Not found.")
        .with_category(ORDER_NOT_FOUND_CATEGORY)
        .with_expected_tool("lookup_order")];

    let summary = runner.run_cases("scenario-b", cases, |_| {}).await;
    let report = &summary.cases[0];

    let spans = runner
        .recorder()
        .get_spans(report.case_id, SpanFilter::tools().with_name("lookup_order"))
        .await;
    assert_eq!(spans.len(), 1);
    assert!(spans[0].output_text().contains("not found"));

    let answer = report.output.as_deref().unwrap().to_lowercase();
    for word in ["delivered", "shipped", "processing", "pro plan", "team plan"] {
        assert!(!answer.contains(word), "answer mentions {}", word);
    }

    let entry = report.scores["no_hallucination_on_missing_order"].result().unwrap();
    assert_eq!(entry.value, ScoreValue::Applicable(1.0));
    assert_eq!(entry.metadata["tool_confirmed_not_found"], json!(true));
}

#[tokio::test]
async fn test_refund_for_shipped_order_is_refused() {
    let runner = runner(support_model(), code_scorers(PathMatch::Set));
    let cases = vec![EvalCase::new("I want a refund for order ORD-1002", "")
        .with_category("refund_ineligible")
        .with_expected_tool("process_refund")];

    let summary = runner.run_cases("scenario-c", cases, |_| {}).await;
    let report = &summary.cases[0];

    let spans = runner
        .recorder()
        .get_spans(report.case_id, SpanFilter::tools().with_name("process_refund"))
        .await;
    assert_eq!(spans.len(), 1);
    assert!(spans[0].output_text().contains("not eligible for a refund"));

    let answer = report.output.as_deref().unwrap();
    assert!(answer.contains("not eligible"));
    assert!(!answer.contains("has been processed"));
    assert!(!answer.contains("$49.99"));
    assert_eq!(score(report, "correct_tool_used"), ScoreValue::Applicable(1.0));

    // Empty expected answer scores zero
    assert_eq!(score(report, "keyword_match"), ScoreValue::Applicable(0.0));
}

#[tokio::test]
async fn test_always_tool_model_gets_forced_answer() {
    let client = ScriptedLlmClient::from_fn(|_messages, tools| match tools {
        Some(_) => Ok(Completion::tool_calls(vec![ToolCall::new(
            "call",
            "search_faq",
            json!({"query": "free trial"}),
        )])),
        None => Ok(Completion::text("All plans include a 14-day free trial.")),
    });
    let probe = client.clone();
    let case = EvalCase::new("Do you offer a free trial?", "Yes! All plans include a 14-day free trial.")
        .with_expected_tool("search_faq")
        .with_expected_tool_path(["search_faq"]);
    let dataset = VecDataset::new("scenario-d", vec![case]);

    let set_runner = runner(client, code_scorers(PathMatch::Set));
    let summary = set_runner.run(&dataset, None).await.unwrap();
    let report = &summary.cases[0];

    assert_eq!(
        report.status,
        CaseStatus::Completed {
            termination: Termination::RoundExhausted,
            model_calls: 4,
            rounds: 3,
        }
    );
    assert_eq!(report.output.as_deref(), Some("All plans include a 14-day free trial."));
    assert_eq!(probe.call_count().await, 4);
    assert_eq!(score(report, "expected_tool_path"), ScoreValue::Applicable(1.0));

    // Three repeated lookups do not match a one-step path in sequence mode
    let sequence_runner = EvalRunner::new(
        agent(probe.clone(), 3),
        code_scorers(PathMatch::Sequence),
        RunnerConfig::default(),
    );
    let summary = sequence_runner.run(&dataset, None).await.unwrap();
    assert_eq!(
        score(&summary.cases[0], "expected_tool_path"),
        ScoreValue::Applicable(0.0)
    );
}
