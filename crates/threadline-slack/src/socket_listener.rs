//! Slack Socket Mode listener that turns envelopes into dispatcher triggers.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::{json, Value};
use threadline_conversation::{
    CommandDispatcher, CommandRoutes, ConversationError, Reply, ReplyDestination, Trigger,
    TriggerResponder,
};
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message as WsMessage};

use crate::slack_api_client::SlackApiClient;
use crate::slack_helpers::strip_bot_mention;


#[derive(Debug, Clone)]
pub struct SlackListenerConfig {
    /// Bot user id used to drop the bot's own events and strip its mention token.
    /// Resolved through `auth.test` when absent.
    pub bot_user_id: Option<String>,
    pub reconnect_delay: Duration,
}

impl Default for SlackListenerConfig {
    fn default() -> Self {
        Self {
            bot_user_id: None,
            reconnect_delay: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
struct SlackSocketEnvelope {
    #[serde(default)]
    envelope_id: String,
    #[serde(rename = "type")]
    envelope_type: String,
    #[serde(default)]
    payload: Value,
    #[serde(default)]
    reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SlackEventCallback {
    #[serde(rename = "type")]
    callback_type: String,
    event: SlackEventPayload,
}

#[derive(Debug, Deserialize)]
struct SlackEventPayload {
    #[serde(rename = "type")]
    event_type: String,
    #[serde(default)]
    subtype: Option<String>,
    #[serde(default)]
    user: Option<String>,
    #[serde(default)]
    bot_id: Option<String>,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    channel: Option<String>,
    #[serde(default)]
    ts: Option<String>,
    #[serde(default)]
    thread_ts: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SlackSlashCommandPayload {
    command: String,
    #[serde(default)]
    text: String,
    #[serde(default)]
    user_name: String,
    channel_id: String,
    #[serde(default)]
    response_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum EnvelopeRoute {
    Hello,
    Disconnect(Option<String>),
    Mention(Trigger),
    Command {
        trigger: Trigger,
        response_url: Option<String>,
    },
    Ignore,
}

/// Runs the Socket Mode loop until Ctrl-C, reconnecting after every session ends.
pub async fn run_slack_listener(
    client: SlackApiClient,
    dispatcher: Arc<CommandDispatcher>,
    config: SlackListenerConfig,
) -> Result<()> {
    let bot_user_id = match config.bot_user_id.clone() {
        Some(bot_user_id) => bot_user_id,
        None => client
            .resolve_bot_user_id()
            .await
            .context("failed to resolve slack bot user id")?,
    };
    tracing::info!(bot_user_id = %bot_user_id, "slack listener starting");

    let listener = SlackListener {
        client,
        dispatcher,
        bot_user_id,
    };
    loop {
        match listener.client.open_socket_connection().await {
            Ok(socket_url) => {
                tracing::info!("slack socket connected");
                match listener.run_socket_session(&socket_url).await {
                    Ok(SessionEnd::Shutdown) => {
                        tracing::info!("slack listener shutdown requested");
                        return Ok(());
                    }
                    Ok(SessionEnd::Reconnect) => {}
                    Err(error) => {
                        tracing::warn!(error = %format!("{error:#}"), "slack socket session error");
                    }
                }
            }
            Err(error) => {
                tracing::warn!(
                    error = %format!("{error:#}"),
                    "failed to open slack socket connection"
                );
            }
        }

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("slack listener shutdown requested");
                return Ok(());
            }
            _ = tokio::time::sleep(config.reconnect_delay) => {}
        }
    }
}

enum SessionEnd {
    Shutdown,
    Reconnect,
}

struct SlackListener {
    client: SlackApiClient,
    dispatcher: Arc<CommandDispatcher>,
    bot_user_id: String,
}

impl SlackListener {
    async fn run_socket_session(&self, socket_url: &str) -> Result<SessionEnd> {
        let (stream, _response) = connect_async(socket_url)
            .await
            .context("failed to connect slack socket mode websocket")?;
        let (mut sink, mut source) = stream.split();

        // Acks are written by handler tasks too, so one writer task owns the sink.
        let (outbound, mut outbound_rx) = mpsc::unbounded_channel::<WsMessage>();
        let writer = tokio::spawn(async move {
            while let Some(message) = outbound_rx.recv().await {
                if let Err(error) = sink.send(message).await {
                    tracing::warn!(%error, "failed to write slack socket message");
                    break;
                }
            }
        });

        let result = loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => break Ok(SessionEnd::Shutdown),
                maybe_message = source.next() => {
                    let Some(message_result) = maybe_message else {
                        break Ok(SessionEnd::Reconnect);
                    };
                    let message = match message_result {
                        Ok(message) => message,
                        Err(error) => {
                            break Err(anyhow::Error::new(error)
                                .context("failed reading slack websocket message"));
                        }
                    };
                    if answer_ping(&outbound, &message) {
                        continue;
                    }
                    if matches!(message, WsMessage::Close(_)) {
                        break Ok(SessionEnd::Reconnect);
                    }
                    let envelope = match parse_socket_envelope(message) {
                        Ok(Some(envelope)) => envelope,
                        Ok(None) => continue,
                        Err(error) => {
                            tracing::warn!(error = %format!("{error:#}"), "ignoring slack frame");
                            continue;
                        }
                    };
                    if self.handle_envelope(envelope, &outbound) {
                        break Ok(SessionEnd::Reconnect);
                    }
                }
            }
        };

        writer.abort();
        result
    }

    /// Returns `true` when Slack asked the client to disconnect.
    fn handle_envelope(
        &self,
        envelope: SlackSocketEnvelope,
        outbound: &mpsc::UnboundedSender<WsMessage>,
    ) -> bool {
        let routes = &self.dispatcher.config().routes;
        let route = match route_envelope(&envelope, &self.bot_user_id, routes) {
            Ok(route) => route,
            Err(error) => {
                tracing::warn!(
                    envelope_type = %envelope.envelope_type,
                    error = %format!("{error:#}"),
                    "skipping malformed slack envelope"
                );
                ack_envelope(outbound, &envelope.envelope_id);
                return false;
            }
        };

        match route {
            EnvelopeRoute::Hello => {
                tracing::info!("slack socket hello received");
                false
            }
            EnvelopeRoute::Disconnect(reason) => {
                tracing::info!(
                    reason = reason.as_deref().unwrap_or("unspecified"),
                    "slack requested disconnect"
                );
                true
            }
            EnvelopeRoute::Ignore => {
                ack_envelope(outbound, &envelope.envelope_id);
                false
            }
            EnvelopeRoute::Mention(trigger) => {
                ack_envelope(outbound, &envelope.envelope_id);
                self.spawn_dispatch(trigger, envelope.envelope_id, None, outbound.clone());
                false
            }
            EnvelopeRoute::Command {
                trigger,
                response_url,
            } => {
                self.spawn_dispatch(trigger, envelope.envelope_id, response_url, outbound.clone());
                false
            }
        }
    }

    fn spawn_dispatch(
        &self,
        trigger: Trigger,
        envelope_id: String,
        response_url: Option<String>,
        outbound: mpsc::UnboundedSender<WsMessage>,
    ) {
        let dispatcher = Arc::clone(&self.dispatcher);
        let responder = SlackTriggerResponder {
            client: self.client.clone(),
            outbound,
            envelope_id,
            response_url,
        };
        tokio::spawn(async move {
            let report = dispatcher.dispatch(trigger, &responder).await;
            tracing::debug!(
                trigger = report.kind.as_str(),
                acknowledged = report.acknowledged,
                delivered = report.delivered,
                "trigger dispatched"
            );
        });
    }
}

fn ack_message(envelope_id: &str) -> WsMessage {
    WsMessage::Text(json!({ "envelope_id": envelope_id }).to_string().into())
}

fn ack_envelope(outbound: &mpsc::UnboundedSender<WsMessage>, envelope_id: &str) {
    if envelope_id.is_empty() {
        return;
    }
    if outbound.send(ack_message(envelope_id)).is_err() {
        tracing::warn!(envelope_id, "slack socket writer closed before ack");
    }
}

/// Queues a pong for `message` when it is a ping. Returns whether the message was a ping.
fn answer_ping(outbound: &mpsc::UnboundedSender<WsMessage>, message: &WsMessage) -> bool {
    let WsMessage::Ping(payload) = message else {
        return false;
    };
    if outbound.send(WsMessage::Pong(payload.clone())).is_err() {
        tracing::warn!("slack socket writer closed before pong");
    }
    true
}

fn parse_socket_envelope(message: WsMessage) -> Result<Option<SlackSocketEnvelope>> {
    match message {
        WsMessage::Text(text) => {
            let envelope = serde_json::from_str::<SlackSocketEnvelope>(&text)
                .context("failed to parse slack socket envelope")?;
            Ok(Some(envelope))
        }
        WsMessage::Binary(bytes) => {
            let text =
                String::from_utf8(bytes.to_vec()).context("invalid utf-8 slack socket payload")?;
            let envelope = serde_json::from_str::<SlackSocketEnvelope>(&text)
                .context("failed to parse slack socket envelope")?;
            Ok(Some(envelope))
        }
        WsMessage::Ping(_) | WsMessage::Pong(_) => Ok(None),
        WsMessage::Close(_) => Ok(None),
        WsMessage::Frame(_) => Ok(None),
    }
}

fn route_envelope(
    envelope: &SlackSocketEnvelope,
    bot_user_id: &str,
    routes: &CommandRoutes,
) -> Result<EnvelopeRoute> {
    match envelope.envelope_type.as_str() {
        "hello" => Ok(EnvelopeRoute::Hello),
        "disconnect" => Ok(EnvelopeRoute::Disconnect(envelope.reason.clone())),
        "events_api" => route_event(&envelope.payload, bot_user_id),
        "slash_commands" => {
            let payload =
                serde_json::from_value::<SlackSlashCommandPayload>(envelope.payload.clone())
                    .context("failed to decode slack slash command payload")?;
            let trigger = Trigger::from_slash_command(
                routes,
                &payload.command,
                &payload.text,
                &payload.user_name,
                &payload.channel_id,
            );
            Ok(EnvelopeRoute::Command {
                trigger,
                response_url: payload
                    .response_url
                    .filter(|value| !value.trim().is_empty()),
            })
        }
        _ => Ok(EnvelopeRoute::Ignore),
    }
}

fn route_event(payload: &Value, bot_user_id: &str) -> Result<EnvelopeRoute> {
    let callback = serde_json::from_value::<SlackEventCallback>(payload.clone())
        .context("failed to decode slack event callback payload")?;
    if callback.callback_type != "event_callback" {
        return Ok(EnvelopeRoute::Ignore);
    }

    let event = callback.event;
    if event.event_type != "app_mention"
        || event.subtype.as_deref() == Some("bot_message")
        || event.bot_id.is_some()
    {
        return Ok(EnvelopeRoute::Ignore);
    }
    match event.user.as_deref() {
        Some(user) if !user.trim().is_empty() && user != bot_user_id => {}
        _ => return Ok(EnvelopeRoute::Ignore),
    }

    let channel = match event.channel {
        Some(channel) if !channel.trim().is_empty() => channel,
        _ => return Ok(EnvelopeRoute::Ignore),
    };
    let ts = match event.ts {
        Some(ts) if !ts.trim().is_empty() => ts,
        _ => return Ok(EnvelopeRoute::Ignore),
    };
    let text = strip_bot_mention(event.text.as_deref().unwrap_or_default(), bot_user_id);
    if text.is_empty() {
        return Ok(EnvelopeRoute::Ignore);
    }

    let thread_ts = event
        .thread_ts
        .filter(|value| !value.trim().is_empty())
        .unwrap_or(ts);
    Ok(EnvelopeRoute::Mention(Trigger::Mention {
        channel,
        ts: thread_ts,
        text,
    }))
}

/// Delivers dispatcher output back to Slack for one envelope.
struct SlackTriggerResponder {
    client: SlackApiClient,
    outbound: mpsc::UnboundedSender<WsMessage>,
    envelope_id: String,
    response_url: Option<String>,
}

#[async_trait]
impl TriggerResponder for SlackTriggerResponder {
    async fn acknowledge(&self) -> Result<(), ConversationError> {
        if self.envelope_id.is_empty() {
            return Ok(());
        }
        self.outbound
            .send(ack_message(&self.envelope_id))
            .map_err(|_| ConversationError::platform("socket ack", "socket writer closed"))
    }

    async fn deliver(&self, reply: &Reply) -> Result<(), ConversationError> {
        match &reply.destination {
            ReplyDestination::Thread { channel, thread_ts } => self
                .client
                .post_message(channel, &reply.text, Some(thread_ts))
                .await
                .map(|_| ())
                .map_err(|error| {
                    ConversationError::platform("chat.postMessage", format!("{error:#}"))
                }),
            ReplyDestination::Channel { channel } => self
                .client
                .post_message(channel, &reply.text, None)
                .await
                .map(|_| ())
                .map_err(|error| {
                    ConversationError::platform("chat.postMessage", format!("{error:#}"))
                }),
            ReplyDestination::Requester { channel } => match &self.response_url {
                Some(response_url) => self
                    .client
                    .respond_to_command(response_url, &reply.text)
                    .await
                    .map_err(|error| {
                        ConversationError::platform("response_url", format!("{error:#}"))
                    }),
                None => self
                    .client
                    .post_message(channel, &reply.text, None)
                    .await
                    .map(|_| ())
                    .map_err(|error| {
                        ConversationError::platform("chat.postMessage", format!("{error:#}"))
                    }),
            },
        }
    }
}
