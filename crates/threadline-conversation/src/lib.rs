//! Conversation engine: rolling history, prompt construction, completion calls, and trigger
//! dispatch for the threadline Slack assistant.

mod completion;
mod dispatcher;
mod error;
mod history;
mod prompt;
mod trigger;

pub use completion::{CompletionClient, CompletionSettings, DEFAULT_MODEL};
pub use dispatcher::{CommandDispatcher, DispatchReport, DispatcherConfig, TriggerResponder};
pub use error::ConversationError;
pub use history::{ConversationHistory, SharedHistory};
pub use prompt::{PromptBuilder, PromptTemplate, DEFAULT_PROMPT_TEMPLATE, DEFAULT_SYSTEM_TEXT};
pub use trigger::{CommandRoutes, Reply, ReplyDestination, Trigger, TriggerKind};
