use std::sync::Arc;

use async_trait::async_trait;
use httpmock::prelude::*;
use serde_json::json;
use threadline_ai::{OpenAiClient, OpenAiConfig};
use threadline_conversation::{
    CommandDispatcher, CompletionClient, CompletionSettings, ConversationError,
    ConversationHistory, DispatcherConfig, PromptBuilder, Reply, Trigger, TriggerResponder,
};
use threadline_slack::{SlackApiClient, ThreadExpander, TranscriptPrinter};
use tokio::sync::Mutex as AsyncMutex;

fn slack_client(base_url: &str) -> SlackApiClient {
    SlackApiClient::new(
        base_url.to_string(),
        String::new(),
        "xoxb-test".to_string(),
        3_000,
        1,
        1,
    )
    .expect("slack client")
}

#[tokio::test]
async fn integration_transcript_expands_threads_and_survives_a_failing_thread() {
    let server = MockServer::start();
    let history = server.mock(|when, then| {
        when.method(POST)
            .path("/conversations.history")
            .body_includes("oldest=100.0")
            .body_includes("inclusive=true")
            .body_includes("limit=50");
        then.status(200).json_body(json!({
            "ok": true,
            "messages": [
                {"user": "U1", "text": "kickoff", "ts": "100.0"},
                {"user": "U2", "text": "thread a", "ts": "101.0", "thread_ts": "101.0"},
                {"user": "U3", "text": "thread b", "ts": "102.0", "thread_ts": "102.0"},
                {"user": "U1", "text": "files", "ts": "103.0", "files": [
                    {"name": "plan.pdf", "url_private": "https://files.slack.test/plan.pdf"},
                    {"name": "chart.png", "url_private": "https://files.slack.test/chart.png"}
                ]}
            ]
        }));
    });
    let thread_a = server.mock(|when, then| {
        when.method(POST)
            .path("/conversations.replies")
            .body_includes("ts=101.0");
        then.status(200).json_body(json!({
            "ok": true,
            "messages": [
                {"user": "U2", "text": "thread a", "ts": "101.0", "thread_ts": "101.0"},
                {"user": "U4", "text": "answer a", "ts": "101.5", "thread_ts": "101.0"}
            ]
        }));
    });
    let thread_b = server.mock(|when, then| {
        when.method(POST)
            .path("/conversations.replies")
            .body_includes("ts=102.0");
        then.status(500).body("boom");
    });

    let expander = ThreadExpander::new(slack_client(&server.base_url())).with_page_limit(50);
    let records = expander.expand_all("C1", "100.0").await;

    history.assert_calls(1);
    thread_a.assert_calls(1);
    thread_b.assert_calls(1);
    let texts = records
        .iter()
        .map(|record| record.text.as_str())
        .collect::<Vec<_>>();
    assert_eq!(texts, vec!["kickoff", "thread a", "answer a", "files"]);

    let mut printer = TranscriptPrinter::new(Vec::new());
    for record in &records {
        printer.print(record).expect("print");
    }
    let output = String::from_utf8(printer.into_inner()).expect("utf8");
    let lines = output.lines().collect::<Vec<_>>();
    assert_eq!(lines.len(), 5);
    assert_eq!(lines[0], "user: U1, text: kickoff");
    assert_eq!(
        lines[4],
        "user: U1, text: files, filename: chart.png, filelink: https://files.slack.test/chart.png"
    );
}

#[tokio::test]
async fn integration_transcript_of_unreachable_channel_is_empty() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(POST).path("/conversations.history");
        then.status(200)
            .json_body(json!({"ok": false, "error": "channel_not_found"}));
    });

    let expander = ThreadExpander::new(slack_client(&server.base_url()));
    assert!(expander.expand_all("C404", "1.0").await.is_empty());
}

#[derive(Default)]
struct CollectingResponder {
    replies: AsyncMutex<Vec<Reply>>,
}

#[async_trait]
impl TriggerResponder for CollectingResponder {
    async fn acknowledge(&self) -> Result<(), ConversationError> {
        Ok(())
    }

    async fn deliver(&self, reply: &Reply) -> Result<(), ConversationError> {
        self.replies.lock().await.push(reply.clone());
        Ok(())
    }
}

#[tokio::test]
async fn integration_ask_through_openai_provider_carries_history_forward() {
    let server = MockServer::start();
    let mut first = server.mock(|when, then| {
        when.method(POST)
            .path("/chat/completions")
            .body_includes("文脈：hi")
            .json_body_includes(
                json!({
                    "model": "gpt-4-turbo-2024-04-09",
                    "messages": [{"role": "system", "content": "あなたは優秀な回答アシスタントです。"}],
                    "temperature": 0.0
                })
                .to_string(),
            );
        then.status(200).json_body(json!({
            "choices": [{"message": {"content": "hello!"}, "finish_reason": "stop"}]
        }));
    });

    let provider = OpenAiClient::new(OpenAiConfig {
        api_base: server.base_url(),
        api_key: "sk-test".to_string(),
        organization: None,
        request_timeout_ms: 3_000,
        max_retries: 0,
        retry_budget_ms: 0,
        retry_jitter: false,
    })
    .expect("provider");
    let dispatcher = CommandDispatcher::new(
        PromptBuilder::default(),
        CompletionClient::new(Arc::new(provider), CompletionSettings::default()),
        ConversationHistory::new().into_shared(),
        DispatcherConfig::default(),
    );
    let responder = CollectingResponder::default();

    let report = dispatcher
        .dispatch(
            Trigger::Ask {
                channel: "C1".to_string(),
                user_name: "alice".to_string(),
                text: "hi".to_string(),
            },
            &responder,
        )
        .await;
    assert!(report.error.is_none());
    first.assert_calls(1);
    first.delete();

    let second = server.mock(|when, then| {
        when.method(POST)
            .path("/chat/completions")
            .body_includes("aliceさん: hi\\nBot: hello!\\nbye");
        then.status(200).json_body(json!({
            "choices": [{"message": {"content": "goodbye!"}, "finish_reason": "stop"}]
        }));
    });
    dispatcher
        .dispatch(
            Trigger::Ask {
                channel: "C1".to_string(),
                user_name: "alice".to_string(),
                text: "bye".to_string(),
            },
            &responder,
        )
        .await;
    second.assert_calls(1);

    let replies = responder.replies.lock().await;
    assert_eq!(replies[0].text, "aliceさん: hi\nBot: hello!");
    assert_eq!(replies[1].text, "aliceさん: bye\nBot: goodbye!");
}
