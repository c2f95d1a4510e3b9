//! Slack side of threadline: Web API client, thread expansion, transcript rendering, and the
//! Socket Mode listener that feeds triggers into the conversation dispatcher.

mod message_record;
mod slack_api_client;
mod slack_helpers;
mod socket_listener;
mod thread_expander;
mod transcript;

pub use message_record::{Attachment, MessageRecord, RawSlackFile, RawSlackMessage};
pub use slack_api_client::{SlackApiClient, SlackPostedMessage};
pub use socket_listener::{run_slack_listener, SlackListenerConfig};
pub use thread_expander::{ChannelHistorySource, ThreadExpander, DEFAULT_HISTORY_PAGE_LIMIT};
pub use transcript::{render_record, TranscriptPrinter};
