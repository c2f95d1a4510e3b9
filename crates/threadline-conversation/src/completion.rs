use std::{sync::Arc, time::Duration};

use threadline_ai::{ChatRequest, LlmClient, Message};

use crate::ConversationError;

pub const DEFAULT_MODEL: &str = "gpt-4-turbo-2024-04-09";

#[derive(Debug, Clone, PartialEq)]
/// Model selection and per-call bounds for [`CompletionClient`].
pub struct CompletionSettings {
    pub model: String,
    pub max_tokens: Option<u32>,
    pub timeout: Duration,
}

impl Default for CompletionSettings {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            max_tokens: None,
            timeout: Duration::from_secs(120),
        }
    }
}

#[derive(Clone)]
/// Single-shot system + user completion with every failure folded into `CompletionFailed`.
pub struct CompletionClient {
    client: Arc<dyn LlmClient>,
    settings: CompletionSettings,
}

impl CompletionClient {
    pub fn new(client: Arc<dyn LlmClient>, settings: CompletionSettings) -> Self {
        Self { client, settings }
    }

    pub fn settings(&self) -> &CompletionSettings {
        &self.settings
    }

    pub async fn complete(
        &self,
        system_text: &str,
        user_prompt: &str,
        temperature: f32,
    ) -> Result<String, ConversationError> {
        let request = ChatRequest {
            model: self.settings.model.clone(),
            messages: vec![Message::system(system_text), Message::user(user_prompt)],
            max_tokens: self.settings.max_tokens,
            temperature: Some(temperature),
        };

        let response = tokio::time::timeout(self.settings.timeout, self.client.complete(request))
            .await
            .map_err(|_| {
                ConversationError::completion(format!(
                    "timed out after {}ms",
                    self.settings.timeout.as_millis()
                ))
            })?
            .map_err(ConversationError::completion)?;

        let text = response.message.text_content();
        if text.trim().is_empty() {
            return Err(ConversationError::completion("provider returned no text"));
        }
        tracing::info!(
            model = %self.settings.model,
            total_tokens = response.usage.total_tokens,
            reply = %text,
            "completion received"
        );
        Ok(text.to_string())
    }
}
