use httpmock::prelude::*;
use serde_json::json;
use std::time::Duration;
use threadline_ai::{
    ChatRequest, LlmClient, Message, OpenAiClient, OpenAiConfig, ThreadlineAiError,
};

fn test_config(base_url: &str) -> OpenAiConfig {
    OpenAiConfig {
        api_base: format!("{base_url}/v1"),
        api_key: "test-openai-key".to_string(),
        organization: None,
        request_timeout_ms: 5_000,
        max_retries: 2,
        retry_budget_ms: 0,
        retry_jitter: false,
    }
}

fn hello_request() -> ChatRequest {
    ChatRequest {
        model: "gpt-4-turbo-2024-04-09".to_string(),
        messages: vec![
            Message::system("あなたは優秀な回答アシスタントです。"),
            Message::user("hello"),
        ],
        max_tokens: None,
        temperature: Some(0.0),
    }
}

#[tokio::test]
async fn integration_openai_client_sends_expected_http_request() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(POST)
            .path("/v1/chat/completions")
            .header("authorization", "Bearer test-openai-key")
            .header_exists("x-threadline-request-id")
            .header("x-threadline-retry-attempt", "0")
            .json_body_includes(
                json!({
                    "model": "gpt-4-turbo-2024-04-09",
                    "messages": [{"role": "system"}, {"role": "user", "content": "hello"}],
                    "temperature": 0.0
                })
                .to_string(),
            );
        then.status(200).json_body(json!({
            "choices": [{"message": {"content": "openai ok"}, "finish_reason": "stop"}],
            "usage": {"prompt_tokens": 5, "completion_tokens": 3, "total_tokens": 8}
        }));
    });

    let client = OpenAiClient::new(test_config(&server.base_url())).expect("client");
    let response = client.complete(hello_request()).await.expect("completion");

    mock.assert();
    assert_eq!(response.message.text_content(), "openai ok");
    assert_eq!(response.usage.total_tokens, 8);
}

#[tokio::test]
async fn integration_openai_client_surfaces_http_status_error() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(POST).path("/v1/chat/completions");
        then.status(401).body("unauthorized");
    });

    let client = OpenAiClient::new(test_config(&server.base_url())).expect("client");
    let error = client
        .complete(hello_request())
        .await
        .expect_err("401 should fail");

    match error {
        ThreadlineAiError::HttpStatus { status, body } => {
            assert_eq!(status, 401);
            assert!(body.contains("unauthorized"));
        }
        other => panic!("expected HttpStatus, got {other:?}"),
    }
    mock.assert_calls(1);
}

#[tokio::test]
async fn integration_openai_client_retries_on_rate_limit_then_succeeds() {
    let server = MockServer::start();
    let first = server.mock(|when, then| {
        when.method(POST)
            .path("/v1/chat/completions")
            .header("x-threadline-retry-attempt", "0");
        then.status(429).body("rate limited");
    });
    let second = server.mock(|when, then| {
        when.method(POST)
            .path("/v1/chat/completions")
            .header("x-threadline-retry-attempt", "1");
        then.status(200).json_body(json!({
            "choices": [{"message": {"content": "ok after retry"}, "finish_reason": "stop"}]
        }));
    });

    let client = OpenAiClient::new(test_config(&server.base_url())).expect("client");
    let response = client.complete(hello_request()).await.expect("retry succeeds");

    assert_eq!(response.message.text_content(), "ok after retry");
    first.assert_calls(1);
    second.assert_calls(1);
}

#[tokio::test]
async fn integration_openai_client_retry_budget_blocks_retries() {
    let server = MockServer::start();
    let first = server.mock(|when, then| {
        when.method(POST)
            .path("/v1/chat/completions")
            .header("x-threadline-retry-attempt", "0");
        then.status(503).body("overloaded");
    });

    let mut config = test_config(&server.base_url());
    config.retry_budget_ms = 10;
    let client = OpenAiClient::new(config).expect("client");
    let error = client
        .complete(hello_request())
        .await
        .expect_err("budget blocks retry");

    assert!(matches!(
        error,
        ThreadlineAiError::HttpStatus { status: 503, .. }
    ));
    first.assert_calls(1);
}

#[tokio::test]
async fn regression_openai_client_times_out_slow_server() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(POST).path("/v1/chat/completions");
        then.status(200)
            .delay(Duration::from_millis(200))
            .json_body(json!({"choices": [{"message": {"content": "late"}}]}));
    });

    let mut config = test_config(&server.base_url());
    config.request_timeout_ms = 40;
    config.max_retries = 0;
    let client = OpenAiClient::new(config).expect("client");
    let error = client
        .complete(hello_request())
        .await
        .expect_err("request should time out");

    match error {
        ThreadlineAiError::Http(inner) => assert!(inner.is_timeout()),
        other => panic!("expected timeout, got {other:?}"),
    }
}

#[test]
fn unit_openai_client_requires_api_key() {
    let mut config = test_config("http://127.0.0.1:9");
    config.api_key = "  ".to_string();
    assert!(matches!(
        OpenAiClient::new(config),
        Err(ThreadlineAiError::MissingApiKey)
    ));
}
