//! Routes triggers to their handlers and owns the reply/acknowledgement protocol.

use async_trait::async_trait;

use crate::{
    CommandRoutes, CompletionClient, ConversationError, PromptBuilder, Reply, ReplyDestination,
    SharedHistory, Trigger, TriggerKind,
};

/// Platform side of one trigger: confirms receipt and delivers the reply.
#[async_trait]
pub trait TriggerResponder: Send + Sync {
    async fn acknowledge(&self) -> Result<(), ConversationError>;
    async fn deliver(&self, reply: &Reply) -> Result<(), ConversationError>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct DispatcherConfig {
    pub routes: CommandRoutes,
    pub temperature: f32,
    /// Appended to the invoking user's name when rendering a turn.
    pub user_label_suffix: String,
    pub bot_label: String,
    pub reset_reply: String,
    pub failure_reply: String,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            routes: CommandRoutes::default(),
            temperature: 0.0,
            user_label_suffix: "さん".to_string(),
            bot_label: "Bot".to_string(),
            reset_reply: "履歴をリセットしました。".to_string(),
            failure_reply: "応答の生成に失敗しました。時間をおいて再度お試しください。".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Outcome of one [`CommandDispatcher::dispatch`] call.
pub struct DispatchReport {
    pub kind: TriggerKind,
    pub acknowledged: bool,
    pub delivered: bool,
    pub error: Option<ConversationError>,
}

pub struct CommandDispatcher {
    prompt: PromptBuilder,
    completion: CompletionClient,
    history: SharedHistory,
    config: DispatcherConfig,
}

impl CommandDispatcher {
    pub fn new(
        prompt: PromptBuilder,
        completion: CompletionClient,
        history: SharedHistory,
        config: DispatcherConfig,
    ) -> Self {
        Self {
            prompt,
            completion,
            history,
            config,
        }
    }

    pub fn history(&self) -> &SharedHistory {
        &self.history
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    /// Acknowledges command triggers, runs the handler, and delivers its reply.
    ///
    /// The acknowledgement is sent before any handler work, so a failing completion or delivery
    /// can never leave a command unacknowledged. A failed handler is answered with the generic
    /// failure reply instead of being dropped.
    pub async fn dispatch(
        &self,
        trigger: Trigger,
        responder: &dyn TriggerResponder,
    ) -> DispatchReport {
        let kind = trigger.kind();
        let mut report = DispatchReport {
            kind,
            acknowledged: false,
            delivered: false,
            error: None,
        };

        if trigger.requires_acknowledgement() {
            match responder.acknowledge().await {
                Ok(()) => report.acknowledged = true,
                Err(error) => {
                    tracing::warn!(
                        trigger = kind.as_str(),
                        %error,
                        "trigger acknowledgement failed"
                    );
                    report.error = Some(error);
                }
            }
        }

        let reply = match self.handle(&trigger).await {
            Ok(reply) => reply,
            Err(error) => {
                tracing::warn!(
                    trigger = kind.as_str(),
                    channel = trigger.channel(),
                    %error,
                    "trigger handler failed"
                );
                report.error = Some(error);
                Reply {
                    text: self.config.failure_reply.clone(),
                    destination: reply_destination(&trigger),
                }
            }
        };

        match responder.deliver(&reply).await {
            Ok(()) => report.delivered = true,
            Err(error) => {
                tracing::warn!(trigger = kind.as_str(), %error, "reply delivery failed");
                report.error.get_or_insert(error);
            }
        }
        report
    }

    /// Produces the reply for one trigger without touching the platform.
    pub async fn handle(&self, trigger: &Trigger) -> Result<Reply, ConversationError> {
        let destination = reply_destination(trigger);
        match trigger {
            Trigger::Mention { text, .. } => {
                tracing::info!(channel = trigger.channel(), %text, "mention received");
                let prompt = self.prompt.build("", text);
                let output = self.complete(&prompt).await?;
                Ok(Reply {
                    text: output,
                    destination,
                })
            }
            Trigger::Ask {
                user_name, text, ..
            } => {
                tracing::info!(
                    channel = trigger.channel(),
                    user = %user_name,
                    %text,
                    "command received"
                );
                let turn = self.handle_ask(user_name, text).await?;
                Ok(Reply {
                    text: turn,
                    destination,
                })
            }
            Trigger::Reset { .. } => {
                self.history.lock().await.reset();
                tracing::info!(channel = trigger.channel(), "conversation history reset");
                Ok(Reply {
                    text: self.config.reset_reply.clone(),
                    destination,
                })
            }
            Trigger::Echo { text, .. } => Ok(Reply {
                text: text.clone(),
                destination,
            }),
            Trigger::Unknown { command, .. } => Ok(Reply {
                text: format!(
                    "Unknown command `{command}`. {}",
                    self.config.routes.usage()
                ),
                destination,
            }),
        }
    }

    // The history lock is held across the completion call so concurrent commands observe and
    // append turns strictly one after another.
    async fn handle_ask(&self, user_name: &str, text: &str) -> Result<String, ConversationError> {
        let mut history = self.history.lock().await;
        let prompt = self.prompt.build(&history.snapshot(), text);
        let output = self.complete(&prompt).await?;
        let turn = self.render_turn(user_name, text, &output);
        history.append(format!("{turn}\n"));
        Ok(turn)
    }

    async fn complete(&self, prompt: &str) -> Result<String, ConversationError> {
        self.completion
            .complete(self.prompt.system_text(), prompt, self.config.temperature)
            .await
    }

    /// Renders `"<user><suffix>: <input>\n<bot>: <output>"`.
    pub fn render_turn(&self, user_name: &str, input: &str, output: &str) -> String {
        format!(
            "{user_name}{}: {input}\n{}: {output}",
            self.config.user_label_suffix, self.config.bot_label
        )
    }
}

fn reply_destination(trigger: &Trigger) -> ReplyDestination {
    match trigger {
        Trigger::Mention { channel, ts, .. } => ReplyDestination::Thread {
            channel: channel.clone(),
            thread_ts: ts.clone(),
        },
        Trigger::Ask { channel, .. } => ReplyDestination::Channel {
            channel: channel.clone(),
        },
        Trigger::Reset { channel }
        | Trigger::Echo { channel, .. }
        | Trigger::Unknown { channel, .. } => ReplyDestination::Requester {
            channel: channel.clone(),
        },
    }
}
