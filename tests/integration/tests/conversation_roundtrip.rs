use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use async_trait::async_trait;
use threadline_ai::{ChatRequest, ChatResponse, ChatUsage, LlmClient, Message, ThreadlineAiError};
use threadline_conversation::{
    CommandDispatcher, CompletionClient, CompletionSettings, ConversationError,
    ConversationHistory, DispatcherConfig, PromptBuilder, PromptTemplate, Reply,
    ReplyDestination, Trigger, TriggerResponder,
};
use tokio::sync::Mutex as AsyncMutex;

struct ScriptedClient {
    responses: AsyncMutex<VecDeque<Result<String, ThreadlineAiError>>>,
    requests: AsyncMutex<Vec<ChatRequest>>,
}

impl ScriptedClient {
    fn new(responses: Vec<Result<String, ThreadlineAiError>>) -> Arc<Self> {
        Arc::new(Self {
            responses: AsyncMutex::new(VecDeque::from(responses)),
            requests: AsyncMutex::new(Vec::new()),
        })
    }

    async fn user_prompts(&self) -> Vec<String> {
        self.requests
            .lock()
            .await
            .iter()
            .map(|request| request.messages[1].text_content().to_string())
            .collect()
    }
}

#[async_trait]
impl LlmClient for ScriptedClient {
    async fn complete(&self, request: ChatRequest) -> Result<ChatResponse, ThreadlineAiError> {
        self.requests.lock().await.push(request);
        let next = self.responses.lock().await.pop_front().unwrap_or_else(|| {
            Err(ThreadlineAiError::InvalidResponse(
                "scripted response queue exhausted".into(),
            ))
        });
        next.map(|text| ChatResponse {
            message: Message::assistant_text(text),
            finish_reason: Some("stop".to_string()),
            usage: ChatUsage::default(),
        })
    }
}

/// Answers with a counter and yields mid-call so concurrent commands overlap.
struct CountingClient {
    calls: AtomicUsize,
    prompts: AsyncMutex<Vec<String>>,
}

#[async_trait]
impl LlmClient for CountingClient {
    async fn complete(&self, request: ChatRequest) -> Result<ChatResponse, ThreadlineAiError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts
            .lock()
            .await
            .push(request.messages[1].text_content().to_string());
        tokio::time::sleep(Duration::from_millis(5)).await;
        Ok(ChatResponse {
            message: Message::assistant_text(format!("reply-{call}")),
            finish_reason: Some("stop".to_string()),
            usage: ChatUsage::default(),
        })
    }
}

#[derive(Default)]
struct CollectingResponder {
    events: AsyncMutex<Vec<String>>,
    replies: AsyncMutex<Vec<Reply>>,
}

#[async_trait]
impl TriggerResponder for CollectingResponder {
    async fn acknowledge(&self) -> Result<(), ConversationError> {
        self.events.lock().await.push("ack".to_string());
        Ok(())
    }

    async fn deliver(&self, reply: &Reply) -> Result<(), ConversationError> {
        self.events.lock().await.push("deliver".to_string());
        self.replies.lock().await.push(reply.clone());
        Ok(())
    }
}

fn dispatcher(client: Arc<dyn LlmClient>, history: ConversationHistory) -> CommandDispatcher {
    CommandDispatcher::new(
        PromptBuilder::new(
            PromptTemplate::parse("context: {context}").expect("template"),
            "system",
        ),
        CompletionClient::new(client, CompletionSettings::default()),
        history.into_shared(),
        DispatcherConfig::default(),
    )
}

fn ask(user_name: &str, text: &str) -> Trigger {
    Trigger::Ask {
        channel: "C1".to_string(),
        user_name: user_name.to_string(),
        text: text.to_string(),
    }
}

#[tokio::test]
async fn integration_ask_reset_ask_cycle_tracks_history() {
    let client = ScriptedClient::new(vec![
        Ok("hello!".to_string()),
        Ok("see you".to_string()),
        Ok("fresh".to_string()),
    ]);
    let dispatcher = dispatcher(client.clone(), ConversationHistory::new());
    let responder = CollectingResponder::default();

    dispatcher.dispatch(ask("alice", "hi"), &responder).await;
    dispatcher.dispatch(ask("bob", "bye"), &responder).await;
    dispatcher
        .dispatch(
            Trigger::Reset {
                channel: "C1".to_string(),
            },
            &responder,
        )
        .await;
    dispatcher.dispatch(ask("alice", "again"), &responder).await;

    let prompts = client.user_prompts().await;
    assert_eq!(prompts[0], "context: hi");
    assert_eq!(prompts[1], "context: aliceさん: hi\nBot: hello!\nbye");
    assert_eq!(prompts[2], "context: again");

    let replies = responder.replies.lock().await;
    assert_eq!(replies[0].text, "aliceさん: hi\nBot: hello!");
    assert_eq!(
        replies[0].destination,
        ReplyDestination::Channel {
            channel: "C1".to_string()
        }
    );
    assert_eq!(replies[2].text, "履歴をリセットしました。");
    assert_eq!(
        dispatcher.history().lock().await.snapshot(),
        "aliceさん: again\nBot: fresh\n"
    );
    assert_eq!(
        *responder.events.lock().await,
        vec!["ack", "deliver", "ack", "deliver", "ack", "deliver", "ack", "deliver"]
    );
}

#[tokio::test]
async fn integration_concurrent_asks_serialize_without_losing_turns() {
    let client = Arc::new(CountingClient {
        calls: AtomicUsize::new(0),
        prompts: AsyncMutex::new(Vec::new()),
    });
    let dispatcher = Arc::new(dispatcher(client.clone(), ConversationHistory::new()));

    let mut handles = Vec::new();
    for index in 0..8 {
        let dispatcher = Arc::clone(&dispatcher);
        handles.push(tokio::spawn(async move {
            let responder = CollectingResponder::default();
            dispatcher
                .dispatch(ask(&format!("user{index}"), &format!("q{index}")), &responder)
                .await
        }));
    }
    for handle in handles {
        let report = handle.await.expect("task");
        assert!(report.acknowledged);
        assert!(report.delivered);
        assert!(report.error.is_none());
    }

    let history = dispatcher.history().lock().await;
    assert_eq!(history.len(), 8);
    let prompts = client.prompts.lock().await;
    for (position, prompt) in prompts.iter().enumerate() {
        assert_eq!(prompt.matches("Bot: reply-").count(), position);
    }
    let turns = history.turns().collect::<Vec<_>>();
    for (position, turn) in turns.iter().enumerate() {
        assert!(turn.ends_with(&format!("Bot: reply-{position}\n")));
    }
}

#[tokio::test]
async fn integration_capped_history_keeps_latest_turns_in_prompt() {
    let client = ScriptedClient::new(vec![
        Ok("one".to_string()),
        Ok("two".to_string()),
        Ok("three".to_string()),
    ]);
    let dispatcher = dispatcher(client.clone(), ConversationHistory::with_max_turns(1));
    let responder = CollectingResponder::default();

    for text in ["a", "b", "c"] {
        dispatcher.dispatch(ask("alice", text), &responder).await;
    }

    let prompts = client.user_prompts().await;
    assert_eq!(prompts[2], "context: aliceさん: b\nBot: two\nc");
    assert_eq!(dispatcher.history().lock().await.len(), 1);
}

#[tokio::test]
async fn regression_provider_failure_still_acknowledges_and_replies() {
    let client = ScriptedClient::new(vec![Err(ThreadlineAiError::HttpStatus {
        status: 503,
        body: "overloaded".to_string(),
    })]);
    let dispatcher = dispatcher(client, ConversationHistory::new());
    let responder = CollectingResponder::default();

    let report = dispatcher.dispatch(ask("alice", "hi"), &responder).await;

    assert!(report.acknowledged);
    assert!(report.delivered);
    assert!(matches!(
        report.error,
        Some(ConversationError::CompletionFailed { .. })
    ));
    assert_eq!(
        responder.replies.lock().await[0].text,
        DispatcherConfig::default().failure_reply
    );
    assert!(dispatcher.history().lock().await.is_empty());
}
