//! Normalized view of one Slack message payload.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use threadline_conversation::ConversationError;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
/// Message fields as returned by `conversations.history` / `conversations.replies`.
pub struct RawSlackMessage {
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub bot_id: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub ts: Option<String>,
    #[serde(default)]
    pub thread_ts: Option<String>,
    #[serde(default)]
    pub files: Vec<RawSlackFile>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawSlackFile {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub url_private: Option<String>,
    #[serde(default)]
    pub timestamp: Option<u64>,
}

impl RawSlackMessage {
    pub fn from_value(value: Value) -> Result<Self, ConversationError> {
        serde_json::from_value(value)
            .map_err(|error| ConversationError::malformed(format!("undecodable message: {error}")))
    }

    /// Thread timestamp this message declares, if any.
    pub fn thread_root(&self) -> Option<&str> {
        self.thread_ts
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Attachment {
    pub name: String,
    pub url: String,
    pub uploaded_at: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MessageRecord {
    pub author: String,
    pub text: String,
    pub attachments: Vec<Attachment>,
    pub thread_root: Option<String>,
    pub ts: Option<String>,
}

impl MessageRecord {
    pub fn from_raw(raw: RawSlackMessage) -> Result<Self, ConversationError> {
        let thread_root = raw.thread_root().map(str::to_string);
        let author = [raw.user, raw.bot_id]
            .into_iter()
            .flatten()
            .find(|value| !value.trim().is_empty())
            .ok_or_else(|| ConversationError::malformed("message has no user"))?;

        let attachments = raw
            .files
            .into_iter()
            .map(|file| {
                let name = file
                    .name
                    .ok_or_else(|| ConversationError::malformed("file has no name"))?;
                let url = file.url_private.ok_or_else(|| {
                    ConversationError::malformed(format!("file {name} has no url"))
                })?;
                Ok(Attachment {
                    name,
                    url,
                    uploaded_at: file.timestamp,
                })
            })
            .collect::<Result<Vec<_>, ConversationError>>()?;

        Ok(Self {
            author,
            text: raw.text.unwrap_or_default(),
            attachments,
            thread_root,
            ts: raw.ts,
        })
    }

    pub fn from_value(value: Value) -> Result<Self, ConversationError> {
        Self::from_raw(RawSlackMessage::from_value(value)?)
    }

    pub fn is_threaded(&self) -> bool {
        self.thread_root.is_some()
    }
}

impl TryFrom<RawSlackMessage> for MessageRecord {
    type Error = ConversationError;

    fn try_from(raw: RawSlackMessage) -> Result<Self, Self::Error> {
        Self::from_raw(raw)
    }
}
