// OpenAI client tests against a mock HTTP server

use serde_json::json;
use std::time::Duration;
use tracecheck_core::{
    CompletionSignal, ConversationMessage, LlmClient, LlmError, OpenAiClient, ToolDefinition,
};
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client(server: &MockServer) -> OpenAiClient {
    OpenAiClient::new("test-key").with_base_url(format!("{}/v1", server.uri()))
}

fn messages() -> Vec<ConversationMessage> {
    vec![
        ConversationMessage::system("You are a support agent."),
        ConversationMessage::user("Where is ORD-1001?"),
    ]
}

fn lookup_definition() -> ToolDefinition {
    ToolDefinition {
        name: "lookup_order".to_string(),
        description: "Look up an order".to_string(),
        parameters: json!({
            "type": "object",
            "properties": {"order_id": {"type": "string"}},
            "required": ["order_id"]
        }),
    }
}

#[tokio::test]
async fn test_text_completion() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header("authorization", "Bearer test-key"))
        .and(body_partial_json(json!({"model": "gpt-4o-mini"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "model": "gpt-4o-mini-2024-07-18",
            "choices": [{
                "index": 0,
                "message": {"role": "assistant", "content": "It was delivered."},
                "finish_reason": "stop"
            }],
            "usage": {"prompt_tokens": 20, "completion_tokens": 5, "total_tokens": 25}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let completion = client(&server).complete(&messages(), None).await.unwrap();

    assert_eq!(completion.signal, CompletionSignal::Final);
    assert_eq!(completion.text.as_deref(), Some("It was delivered."));
    assert!(completion.tool_calls.is_empty());
    assert_eq!(completion.metadata.total_tokens, Some(25));
    assert_eq!(completion.metadata.finish_reason.as_deref(), Some("stop"));
}

#[tokio::test]
async fn test_tool_call_completion() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(body_partial_json(json!({
            "tools": [{"type": "function", "function": {"name": "lookup_order"}}]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{
                "index": 0,
                "message": {
                    "role": "assistant",
                    "content": null,
                    "tool_calls": [{
                        "id": "call_abc",
                        "type": "function",
                        "function": {"name": "lookup_order", "arguments": "{\"order_id\":\"ORD-1001\"}"}
                    }]
                },
                "finish_reason": "tool_calls"
            }]
        })))
        .mount(&server)
        .await;

    let tools = vec![lookup_definition()];
    let completion = client(&server)
        .complete(&messages(), Some(tools.as_slice()))
        .await
        .unwrap();

    assert_eq!(completion.signal, CompletionSignal::ToolRequest);
    assert!(completion.text.is_none());
    assert_eq!(completion.tool_calls.len(), 1);
    assert_eq!(completion.tool_calls[0].id, "call_abc");
    assert_eq!(completion.tool_calls[0].arguments, r#"{"order_id":"ORD-1001"}"#);
}

#[tokio::test]
async fn test_rate_limit_maps_retry_after() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(429)
                .insert_header("retry-after", "2")
                .set_body_string("slow down"),
        )
        .mount(&server)
        .await;

    let err = client(&server).complete(&messages(), None).await.unwrap_err();
    assert_eq!(
        err,
        LlmError::RateLimited {
            retry_after: Some(Duration::from_secs(2))
        }
    );
}

#[tokio::test]
async fn test_gateway_timeout_maps_to_timeout() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(504))
        .mount(&server)
        .await;

    let err = client(&server).complete(&messages(), None).await.unwrap_err();
    assert_eq!(err, LlmError::Timeout);
}

#[tokio::test]
async fn test_client_timeout_maps_to_timeout() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_delay(Duration::from_millis(500))
                .set_body_json(json!({"choices": []})),
        )
        .mount(&server)
        .await;

    let err = client(&server)
        .with_timeout(Duration::from_millis(50))
        .unwrap()
        .complete(&messages(), None)
        .await
        .unwrap_err();
    assert_eq!(err, LlmError::Timeout);
}

#[tokio::test]
async fn test_server_error_is_protocol_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&server)
        .await;

    match client(&server).complete(&messages(), None).await {
        Err(LlmError::Protocol(msg)) => assert!(msg.contains("500")),
        other => panic!("expected protocol error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_empty_choices_is_protocol_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"choices": []})))
        .mount(&server)
        .await;

    assert!(matches!(
        client(&server).complete(&messages(), None).await,
        Err(LlmError::Protocol(_))
    ));
}
