//! Chat models that stream their response through a [`CallbackHandler`].

use std::time::Instant;

use futures::StreamExt;
use tracing::{debug, warn};

use crate::callbacks::{CallbackEvent, CallbackHandler};
use crate::client::OpenAi;
use crate::error::{Error, Result};
use crate::observability::{STREAM_DURATION, STREAM_ERRORS, STREAM_TOKENS, STREAM_TTFB};
use crate::types::{ChatCompletionRequest, ChatMessage};

/// Default model for [`ChatOpenAi`].
pub const DEFAULT_MODEL: &str = "gpt-3.5-turbo";

/// A chat model that takes a prompt and returns the full response text.
///
/// Implementations report `LlmStart`, each `LlmNewToken` in arrival order, and then exactly
/// one of `LlmEnd` or `LlmError`.
#[async_trait::async_trait]
pub trait ChatModel: Send + Sync {
    async fn generate(
        &self,
        prompt: &[ChatMessage],
        handler: &mut dyn CallbackHandler,
    ) -> Result<String>;
}

/// A streaming OpenAI chat model.
#[derive(Debug, Clone)]
pub struct ChatOpenAi {
    client: OpenAi,
    model: String,
    temperature: f32,
}

impl ChatOpenAi {
    /// Creates a model with temperature 0.
    pub fn new(client: OpenAi, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
            temperature: 0.0,
        }
    }

    /// Sets the sampling temperature.
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn temperature(&self) -> f32 {
        self.temperature
    }

    async fn stream_response(
        &self,
        prompt: &[ChatMessage],
        handler: &mut dyn CallbackHandler,
    ) -> Result<String> {
        let request = ChatCompletionRequest::new_streaming(self.model.clone(), prompt)
            .with_temperature(self.temperature);

        let started = Instant::now();
        let mut stream = self.client.stream(request).await?;
        let mut output = String::new();
        let mut first_token = true;

        while let Some(chunk) = stream.next().await {
            if handler.should_interrupt() {
                return Err(Error::abort("response stream interrupted"));
            }
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(err) => {
                    STREAM_ERRORS.click();
                    return Err(err);
                }
            };
            if let Some(token) = chunk.token() {
                if first_token {
                    STREAM_TTFB.add(started.elapsed().as_secs_f64());
                    first_token = false;
                }
                STREAM_TOKENS.click();
                handler.handle(CallbackEvent::LlmNewToken(token));
                output.push_str(token);
            }
        }
        STREAM_DURATION.add(started.elapsed().as_secs_f64());
        debug!(chars = output.len(), "response stream complete");
        Ok(output)
    }
}

#[async_trait::async_trait]
impl ChatModel for ChatOpenAi {
    async fn generate(
        &self,
        prompt: &[ChatMessage],
        handler: &mut dyn CallbackHandler,
    ) -> Result<String> {
        handler.handle(CallbackEvent::LlmStart { prompt });
        match self.stream_response(prompt, handler).await {
            Ok(output) => {
                handler.handle(CallbackEvent::LlmEnd { output: &output });
                Ok(output)
            }
            Err(err) => {
                if !err.is_abort() {
                    warn!(error = %err, "model call failed");
                }
                handler.handle(CallbackEvent::LlmError(&err));
                Err(err)
            }
        }
    }
}
