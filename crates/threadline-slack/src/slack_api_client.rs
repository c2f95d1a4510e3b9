//! Slack Web API client for history reads, posting, reactions, and Socket Mode bootstrap.

use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::slack_helpers::{
    is_retryable_slack_status, is_retryable_transport_error, parse_retry_after, retry_delay,
    truncate_for_error,
};

#[derive(Debug, Clone, Deserialize)]
struct SlackAuthTestResponse {
    ok: bool,
    user_id: Option<String>,
    error: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct SlackOpenSocketResponse {
    ok: bool,
    url: Option<String>,
    error: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct SlackMessagesResponse {
    ok: bool,
    #[serde(default)]
    messages: Vec<Value>,
    error: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct SlackChatMessageResponse {
    ok: bool,
    ts: Option<String>,
    channel: Option<String>,
    error: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct SlackOkResponse {
    ok: bool,
    error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Delivery receipt for `chat.postMessage`.
pub struct SlackPostedMessage {
    pub channel: String,
    pub ts: String,
}

fn slack_failure(operation: &str, error: Option<String>) -> anyhow::Error {
    anyhow!(
        "slack {operation} failed: {}",
        error.unwrap_or_else(|| "unknown error".to_string())
    )
}

#[derive(Clone)]
pub struct SlackApiClient {
    http: reqwest::Client,
    api_base: String,
    app_token: String,
    bot_token: String,
    retry_max_attempts: usize,
    retry_base_delay_ms: u64,
}

impl SlackApiClient {
    pub fn new(
        api_base: String,
        app_token: String,
        bot_token: String,
        request_timeout_ms: u64,
        retry_max_attempts: usize,
        retry_base_delay_ms: u64,
    ) -> Result<Self> {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::USER_AGENT,
            reqwest::header::HeaderValue::from_static("threadline-slack"),
        );
        headers.insert(
            reqwest::header::ACCEPT,
            reqwest::header::HeaderValue::from_static("application/json"),
        );
        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_millis(request_timeout_ms.max(1)))
            .build()
            .context("failed to create slack api client")?;

        Ok(Self {
            http,
            api_base: api_base.trim_end_matches('/').to_string(),
            app_token: app_token.trim().to_string(),
            bot_token: bot_token.trim().to_string(),
            retry_max_attempts: retry_max_attempts.max(1),
            retry_base_delay_ms: retry_base_delay_ms.max(1),
        })
    }

    fn endpoint(&self, method: &str) -> String {
        format!("{}/{method}", self.api_base)
    }

    pub async fn resolve_bot_user_id(&self) -> Result<String> {
        let response: SlackAuthTestResponse = self
            .request_json("auth.test", || {
                self.http
                    .post(self.endpoint("auth.test"))
                    .bearer_auth(&self.bot_token)
            })
            .await?;
        if !response.ok {
            return Err(slack_failure("auth.test", response.error));
        }
        response
            .user_id
            .filter(|value| !value.trim().is_empty())
            .ok_or_else(|| anyhow!("slack auth.test did not return user_id"))
    }

    pub async fn open_socket_connection(&self) -> Result<String> {
        if self.app_token.is_empty() {
            bail!("slack socket mode requires an app-level token");
        }
        let response: SlackOpenSocketResponse = self
            .request_json("apps.connections.open", || {
                self.http
                    .post(self.endpoint("apps.connections.open"))
                    .bearer_auth(&self.app_token)
            })
            .await?;
        if !response.ok {
            return Err(slack_failure("apps.connections.open", response.error));
        }
        response
            .url
            .filter(|value| !value.trim().is_empty())
            .ok_or_else(|| anyhow!("slack apps.connections.open did not return url"))
    }

    /// Fetches one `conversations.history` page starting at `oldest` (inclusive).
    pub async fn conversations_history(
        &self,
        channel: &str,
        oldest: &str,
        limit: usize,
    ) -> Result<Vec<Value>> {
        let limit = limit.to_string();
        let form = [
            ("channel", channel),
            ("oldest", oldest),
            ("inclusive", "true"),
            ("limit", limit.as_str()),
        ];
        let response: SlackMessagesResponse = self
            .request_json("conversations.history", || {
                self.http
                    .post(self.endpoint("conversations.history"))
                    .bearer_auth(&self.bot_token)
                    .form(&form)
            })
            .await?;
        if !response.ok {
            return Err(slack_failure("conversations.history", response.error));
        }
        Ok(response.messages)
    }

    /// Fetches the replies of the thread rooted at `thread_ts`, parent message first.
    pub async fn conversations_replies(
        &self,
        channel: &str,
        thread_ts: &str,
    ) -> Result<Vec<Value>> {
        let form = [("channel", channel), ("ts", thread_ts)];
        let response: SlackMessagesResponse = self
            .request_json("conversations.replies", || {
                self.http
                    .post(self.endpoint("conversations.replies"))
                    .bearer_auth(&self.bot_token)
                    .form(&form)
            })
            .await?;
        if !response.ok {
            return Err(slack_failure("conversations.replies", response.error));
        }
        Ok(response.messages)
    }

    pub async fn post_message(
        &self,
        channel: &str,
        text: &str,
        thread_ts: Option<&str>,
    ) -> Result<SlackPostedMessage> {
        let mut payload = json!({
            "channel": channel,
            "text": text,
        });
        if let Some(thread_ts) = thread_ts {
            payload["thread_ts"] = Value::String(thread_ts.to_string());
        }

        let response: SlackChatMessageResponse = self
            .request_json("chat.postMessage", || {
                self.http
                    .post(self.endpoint("chat.postMessage"))
                    .bearer_auth(&self.bot_token)
                    .json(&payload)
            })
            .await?;
        if !response.ok {
            return Err(slack_failure("chat.postMessage", response.error));
        }

        Ok(SlackPostedMessage {
            channel: response.channel.unwrap_or_else(|| channel.to_string()),
            ts: response
                .ts
                .ok_or_else(|| anyhow!("slack chat.postMessage response missing ts"))?,
        })
    }

    /// Adds `emoji` to a message; an existing identical reaction counts as success.
    pub async fn add_reaction(&self, channel: &str, timestamp: &str, emoji: &str) -> Result<()> {
        let payload = json!({
            "channel": channel,
            "timestamp": timestamp,
            "name": emoji.trim_matches(':'),
        });
        let response: SlackOkResponse = self
            .request_json("reactions.add", || {
                self.http
                    .post(self.endpoint("reactions.add"))
                    .bearer_auth(&self.bot_token)
                    .json(&payload)
            })
            .await?;
        if !response.ok && response.error.as_deref() != Some("already_reacted") {
            return Err(slack_failure("reactions.add", response.error));
        }
        Ok(())
    }

    /// Answers a slash command through its `response_url`, visible only to the invoker.
    pub async fn respond_to_command(&self, response_url: &str, text: &str) -> Result<()> {
        let payload = json!({
            "response_type": "ephemeral",
            "text": text,
        });
        let mut attempt = 0_usize;
        loop {
            attempt += 1;
            let response = self.http.post(response_url).json(&payload).send().await;
            match response {
                Ok(response) if response.status().is_success() => return Ok(()),
                Ok(response) => {
                    let status = response.status().as_u16();
                    if attempt < self.retry_max_attempts && is_retryable_slack_status(status) {
                        let retry_after = parse_retry_after(response.headers());
                        tokio::time::sleep(retry_delay(
                            self.retry_base_delay_ms,
                            attempt,
                            retry_after,
                        ))
                        .await;
                        continue;
                    }
                    let body = response.text().await.unwrap_or_default();
                    bail!(
                        "slack response_url failed with status {status}: {}",
                        truncate_for_error(&body, 800)
                    );
                }
                Err(error) => {
                    if attempt < self.retry_max_attempts && is_retryable_transport_error(&error) {
                        tokio::time::sleep(retry_delay(self.retry_base_delay_ms, attempt, None))
                            .await;
                        continue;
                    }
                    return Err(error).context("slack response_url request failed");
                }
            }
        }
    }

    async fn request_json<T, F>(&self, operation: &str, mut builder: F) -> Result<T>
    where
        T: DeserializeOwned,
        F: FnMut() -> reqwest::RequestBuilder,
    {
        let mut attempt = 0_usize;
        loop {
            attempt += 1;
            let response = builder()
                .header(
                    "x-threadline-retry-attempt",
                    attempt.saturating_sub(1).to_string(),
                )
                .send()
                .await;
            match response {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return response
                            .json::<T>()
                            .await
                            .with_context(|| format!("failed to decode slack {operation}"));
                    }

                    let retry_after = parse_retry_after(response.headers());
                    let body = response.text().await.unwrap_or_default();
                    if attempt < self.retry_max_attempts
                        && is_retryable_slack_status(status.as_u16())
                    {
                        tracing::debug!(
                            operation,
                            status = status.as_u16(),
                            attempt,
                            "retrying slack call"
                        );
                        tokio::time::sleep(retry_delay(
                            self.retry_base_delay_ms,
                            attempt,
                            retry_after,
                        ))
                        .await;
                        continue;
                    }

                    bail!(
                        "slack api {operation} failed with status {}: {}",
                        status.as_u16(),
                        truncate_for_error(&body, 800)
                    );
                }
                Err(error) => {
                    if attempt < self.retry_max_attempts && is_retryable_transport_error(&error) {
                        tokio::time::sleep(retry_delay(self.retry_base_delay_ms, attempt, None))
                            .await;
                        continue;
                    }
                    return Err(error)
                        .with_context(|| format!("slack api {operation} request failed"));
                }
            }
        }
    }
}
