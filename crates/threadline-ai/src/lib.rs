//! Chat-completion client surface used by the threadline conversation engine.
mod openai;
mod retry;
mod types;

pub use openai::{OpenAiClient, OpenAiConfig};
pub use types::{
    ChatRequest, ChatResponse, ChatUsage, LlmClient, Message, MessageRole, ThreadlineAiError,
};
