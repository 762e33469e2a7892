use serde::{Deserialize, Serialize};

use crate::types::ChatMessage;

/// A message in the wire shape expected by `/chat/completions`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatCompletionMessage {
    /// One of `system`, `user`, or `assistant`.
    pub role: String,

    /// The message text.
    pub content: String,
}

impl From<&ChatMessage> for ChatCompletionMessage {
    fn from(message: &ChatMessage) -> Self {
        Self {
            role: message.role.as_openai_str().to_string(),
            content: message.content.clone(),
        }
    }
}

/// Parameters for a chat completion request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatCompletionRequest {
    /// The model to sample from.
    pub model: String,

    /// The prompt, in order.
    pub messages: Vec<ChatCompletionMessage>,

    /// Sampling temperature; 0 is deterministic.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    /// Whether the response is delivered as server-sent events.
    pub stream: bool,
}

impl ChatCompletionRequest {
    /// Create a streaming request for the given model and prompt.
    pub fn new_streaming(model: impl Into<String>, messages: &[ChatMessage]) -> Self {
        Self {
            model: model.into(),
            messages: messages.iter().map(ChatCompletionMessage::from).collect(),
            temperature: None,
            stream: true,
        }
    }

    /// Set the sampling temperature.
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }
}
