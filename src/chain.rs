//! One conversation turn: memory, prompt, and model composed together.

use std::time::Instant;

use tracing::debug;

use crate::callbacks::{CallbackEvent, CallbackHandler};
use crate::error::Result;
use crate::llm::ChatModel;
use crate::memory::Memory;
use crate::observability::{CHAIN_TURN_DURATION, CHAIN_TURN_ERRORS, CHAIN_TURNS};
use crate::prompt::ChatPromptTemplate;

/// Runs turns of a conversation whose history lives in `M` and whose replies come from `L`.
pub struct ConversationChain<M: Memory, L: ChatModel> {
    memory: M,
    llm: L,
    prompt: ChatPromptTemplate,
}

impl<M: Memory, L: ChatModel> ConversationChain<M, L> {
    pub fn new(memory: M, llm: L, prompt: ChatPromptTemplate) -> Self {
        Self {
            memory,
            llm,
            prompt,
        }
    }

    pub fn memory(&self) -> &M {
        &self.memory
    }

    /// Run one turn and return the model's full response.
    ///
    /// History is read once and the model is called once. The turn is saved to memory only
    /// after the model succeeds. Failures are reported as `ChainError` and returned as-is.
    pub async fn run(&mut self, input: &str, handler: &mut dyn CallbackHandler) -> Result<String> {
        CHAIN_TURNS.click();
        let started = Instant::now();
        handler.handle(CallbackEvent::ChainStart { input });
        let result = self.turn(input, handler).await;
        CHAIN_TURN_DURATION.add(started.elapsed().as_secs_f64());
        match &result {
            Ok(output) => handler.handle(CallbackEvent::ChainEnd { output }),
            Err(err) => {
                CHAIN_TURN_ERRORS.click();
                handler.handle(CallbackEvent::ChainError(err));
            }
        }
        result
    }

    async fn turn(&mut self, input: &str, handler: &mut dyn CallbackHandler) -> Result<String> {
        let history = self.memory.load_history().await?;
        let messages = self
            .prompt
            .format_messages(self.memory.context(), &history, input);
        debug!(history = history.len(), "prompt assembled");
        let output = self.llm.generate(&messages, handler).await?;
        self.memory.save_context(input, &output).await?;
        Ok(output)
    }
}
