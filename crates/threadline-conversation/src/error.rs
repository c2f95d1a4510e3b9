use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
/// Failure kinds surfaced by the conversation engine and its platform collaborators.
pub enum ConversationError {
    #[error("platform call {operation} failed: {reason}")]
    PlatformCallFailed { operation: String, reason: String },
    #[error("completion failed: {reason}")]
    CompletionFailed { reason: String },
    #[error("malformed message: {reason}")]
    MalformedMessage { reason: String },
    #[error("invalid prompt template: {reason}")]
    InvalidTemplate { reason: String },
}

impl ConversationError {
    pub fn platform(operation: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::PlatformCallFailed {
            operation: operation.into(),
            reason: reason.to_string(),
        }
    }

    pub fn completion(reason: impl std::fmt::Display) -> Self {
        Self::CompletionFailed {
            reason: reason.to_string(),
        }
    }

    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedMessage {
            reason: reason.into(),
        }
    }
}
