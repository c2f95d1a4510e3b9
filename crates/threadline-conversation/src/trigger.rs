//! Inbound trigger shapes and the reply payloads produced for them.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TriggerKind {
    Mention,
    Ask,
    Reset,
    Echo,
    Unknown,
}

impl TriggerKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Mention => "mention",
            Self::Ask => "ask",
            Self::Reset => "reset",
            Self::Echo => "echo",
            Self::Unknown => "unknown",
        }
    }
}

/// An inbound event that starts one handler invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Trigger {
    /// The bot was mentioned in a channel message.
    Mention {
        channel: String,
        ts: String,
        text: String,
    },
    /// Stateful completion command; reads and extends the shared history.
    Ask {
        channel: String,
        user_name: String,
        text: String,
    },
    Reset {
        channel: String,
    },
    Echo {
        channel: String,
        text: String,
    },
    /// A slash command that matches none of the configured routes.
    Unknown {
        channel: String,
        command: String,
    },
}

impl Trigger {
    /// Maps a slash command invocation onto a trigger using the configured command names.
    pub fn from_slash_command(
        routes: &CommandRoutes,
        command: &str,
        text: &str,
        user_name: &str,
        channel: &str,
    ) -> Self {
        let command = command.trim();
        let channel = channel.to_string();
        if command == routes.ask {
            Self::Ask {
                channel,
                user_name: user_name.to_string(),
                text: text.to_string(),
            }
        } else if command == routes.reset {
            Self::Reset { channel }
        } else if command == routes.echo {
            Self::Echo {
                channel,
                text: text.to_string(),
            }
        } else {
            Self::Unknown {
                channel,
                command: command.to_string(),
            }
        }
    }

    pub fn kind(&self) -> TriggerKind {
        match self {
            Self::Mention { .. } => TriggerKind::Mention,
            Self::Ask { .. } => TriggerKind::Ask,
            Self::Reset { .. } => TriggerKind::Reset,
            Self::Echo { .. } => TriggerKind::Echo,
            Self::Unknown { .. } => TriggerKind::Unknown,
        }
    }

    pub fn channel(&self) -> &str {
        match self {
            Self::Mention { channel, .. }
            | Self::Ask { channel, .. }
            | Self::Reset { channel }
            | Self::Echo { channel, .. }
            | Self::Unknown { channel, .. } => channel,
        }
    }

    /// Command triggers must be confirmed to the platform whether or not a reply is produced.
    pub fn requires_acknowledgement(&self) -> bool {
        !matches!(self, Self::Mention { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Slash command names routed to each handler.
pub struct CommandRoutes {
    pub ask: String,
    pub reset: String,
    pub echo: String,
}

impl Default for CommandRoutes {
    fn default() -> Self {
        Self {
            ask: "/gpt4".to_string(),
            reset: "/reset".to_string(),
            echo: "/echo".to_string(),
        }
    }
}

impl CommandRoutes {
    pub fn usage(&self) -> String {
        format!(
            "Supported commands: `{} <text>`, `{}`, `{} <text>`",
            self.ask, self.reset, self.echo
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplyDestination {
    /// Threaded reply anchored at the triggering message.
    Thread { channel: String, thread_ts: String },
    /// Visible top-level message in the channel.
    Channel { channel: String },
    /// Response addressed to the command invoker only.
    Requester { channel: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub text: String,
    pub destination: ReplyDestination,
}
