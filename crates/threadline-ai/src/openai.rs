use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::time::sleep;

use crate::{
    retry::{
        is_retryable_http_error, new_request_id, next_backoff_ms, parse_retry_after_ms,
        should_retry_status, RetryPolicy,
    },
    ChatRequest, ChatResponse, ChatUsage, LlmClient, Message, MessageRole, ThreadlineAiError,
};

#[derive(Debug, Clone)]
/// Connection settings for an OpenAI-compatible chat-completions endpoint.
pub struct OpenAiConfig {
    pub api_base: String,
    pub api_key: String,
    pub organization: Option<String>,
    pub request_timeout_ms: u64,
    pub max_retries: usize,
    pub retry_budget_ms: u64,
    pub retry_jitter: bool,
}

impl OpenAiConfig {
    /// Longest a single `complete` call can take when every attempt times out: one request
    /// timeout per attempt plus the full backoff schedule (clamped to the retry budget).
    /// Server-sent `Retry-After` hints above the backoff are not included.
    pub fn max_call_duration(&self) -> std::time::Duration {
        let attempts = u64::try_from(self.max_retries.saturating_add(1)).unwrap_or(u64::MAX);
        let mut backoff_ms = (0..self.max_retries)
            .map(next_backoff_ms)
            .fold(0_u64, u64::saturating_add);
        if self.retry_budget_ms > 0 {
            backoff_ms = backoff_ms.min(self.retry_budget_ms);
        }
        std::time::Duration::from_millis(
            self.request_timeout_ms
                .max(1)
                .saturating_mul(attempts)
                .saturating_add(backoff_ms),
        )
    }
}

#[derive(Debug, Clone)]
/// [`LlmClient`] backed by the `/chat/completions` API.
pub struct OpenAiClient {
    client: reqwest::Client,
    config: OpenAiConfig,
}

impl OpenAiClient {
    pub fn new(config: OpenAiConfig) -> Result<Self, ThreadlineAiError> {
        if config.api_key.trim().is_empty() {
            return Err(ThreadlineAiError::MissingApiKey);
        }

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let bearer = format!("Bearer {}", config.api_key.trim());
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&bearer).map_err(|e| {
                ThreadlineAiError::InvalidResponse(format!("invalid API key header: {e}"))
            })?,
        );
        if let Some(org) = &config.organization {
            headers.insert(
                "OpenAI-Organization",
                HeaderValue::from_str(org).map_err(|e| {
                    ThreadlineAiError::InvalidResponse(format!("invalid organization header: {e}"))
                })?,
            );
        }

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(std::time::Duration::from_millis(
                config.request_timeout_ms.max(1),
            ))
            .build()?;

        Ok(Self { client, config })
    }

    fn chat_completions_url(&self) -> String {
        let base = self.config.api_base.trim_end_matches('/');
        if base.ends_with("/chat/completions") {
            return base.to_string();
        }
        format!("{base}/chat/completions")
    }

    fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.config.max_retries,
            budget_ms: self.config.retry_budget_ms,
            jitter: self.config.retry_jitter,
        }
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    async fn complete(&self, request: ChatRequest) -> Result<ChatResponse, ThreadlineAiError> {
        let body = build_chat_request_body(&request);
        let url = self.chat_completions_url();
        let policy = self.retry_policy();
        let started = std::time::Instant::now();
        let mut attempt = 0_usize;

        loop {
            let response = self
                .client
                .post(&url)
                .header("x-threadline-request-id", new_request_id())
                .header("x-threadline-retry-attempt", attempt.to_string())
                .json(&body)
                .send()
                .await;

            match response {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        let raw = response.text().await?;
                        return parse_chat_response(&raw);
                    }

                    let retry_after_ms = parse_retry_after_ms(response.headers());
                    let raw = response.text().await?;
                    if should_retry_status(status.as_u16()) {
                        if let Some(delay) =
                            policy.next_delay(attempt, started.elapsed(), retry_after_ms)
                        {
                            tracing::debug!(
                                status = status.as_u16(),
                                attempt,
                                delay_ms = delay.as_millis() as u64,
                                "retrying chat completion"
                            );
                            sleep(delay).await;
                            attempt += 1;
                            continue;
                        }
                    }

                    return Err(ThreadlineAiError::HttpStatus {
                        status: status.as_u16(),
                        body: raw,
                    });
                }
                Err(error) => {
                    if is_retryable_http_error(&error) {
                        if let Some(delay) = policy.next_delay(attempt, started.elapsed(), None) {
                            tracing::debug!(attempt, %error, "retrying chat completion transport");
                            sleep(delay).await;
                            attempt += 1;
                            continue;
                        }
                    }
                    return Err(ThreadlineAiError::Http(error));
                }
            }
        }
    }
}

fn build_chat_request_body(request: &ChatRequest) -> Value {
    let messages = request
        .messages
        .iter()
        .map(|message| {
            json!({
                "role": message.role.as_str(),
                "content": message.content,
            })
        })
        .collect::<Vec<_>>();
    let mut body = json!({
        "model": request.model,
        "messages": messages,
    });
    if let Some(temperature) = request.temperature {
        body["temperature"] = json!(temperature);
    }
    if let Some(max_tokens) = request.max_tokens {
        body["max_tokens"] = json!(max_tokens);
    }
    body
}

fn parse_chat_response(raw: &str) -> Result<ChatResponse, ThreadlineAiError> {
    let parsed: OpenAiChatResponse = serde_json::from_str(raw)?;
    let choice = parsed.choices.into_iter().next().ok_or_else(|| {
        ThreadlineAiError::InvalidResponse("response contained no choices".to_string())
    })?;

    let usage = parsed
        .usage
        .map(|usage| ChatUsage {
            input_tokens: usage.prompt_tokens,
            output_tokens: usage.completion_tokens,
            total_tokens: usage.total_tokens,
        })
        .unwrap_or_default();

    Ok(ChatResponse {
        message: Message {
            role: MessageRole::Assistant,
            content: flatten_openai_content(choice.message.content.as_ref()),
        },
        finish_reason: choice.finish_reason,
        usage,
    })
}

fn flatten_openai_content(content: Option<&Value>) -> String {
    match content {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(text)) => text.clone(),
        Some(Value::Array(parts)) => parts
            .iter()
            .filter_map(|part| match part {
                Value::String(text) => Some(text.as_str()),
                Value::Object(map) => map.get("text").and_then(Value::as_str),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n"),
        Some(other) => other.to_string(),
    }
}

#[derive(Debug, Deserialize)]
struct OpenAiChatResponse {
    choices: Vec<OpenAiChoice>,
    usage: Option<OpenAiUsage>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoice {
    message: OpenAiChoiceMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoiceMessage {
    content: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct OpenAiUsage {
    prompt_tokens: u64,
    completion_tokens: u64,
    total_tokens: u64,
}
