//! Prompt assembly for a conversation turn.
//!
//! A prompt is always three parts in the same order: the system instructions (with the
//! memory context substituted in), the prior turns, and the current human input.

use crate::types::ChatMessage;

/// The placeholder in a system template that receives the memory context.
pub const CONTEXT_PLACEHOLDER: &str = "{context}";

/// System instructions used by [`ChatPromptTemplate::conversation`].
pub const CONVERSATION_SYSTEM_TEMPLATE: &str = "The following is a friendly conversation between a human and an AI. The AI is talkative and provides lots of specific details from its context. If the AI does not know the answer to a question, it truthfully says it does not know. {context}";

/// Prefix placed in front of a non-empty memory context.
const CONTEXT_PREFIX: &str = "\nHere's previous context: ";

/// A system template, a history placeholder, and a human message slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatPromptTemplate {
    system_template: String,
}

impl ChatPromptTemplate {
    /// Creates a template from custom system instructions.
    ///
    /// The first `{context}` in `system_template` is replaced with the memory context; a
    /// template without one gets no context.
    pub fn new(system_template: impl Into<String>) -> Self {
        Self {
            system_template: system_template.into(),
        }
    }

    /// The friendly-conversation template.
    pub fn conversation() -> Self {
        Self::new(CONVERSATION_SYSTEM_TEMPLATE)
    }

    /// The system instructions before substitution.
    pub fn system_template(&self) -> &str {
        &self.system_template
    }

    /// Render the system message for the given memory context.
    pub fn format_system(&self, context: Option<&str>) -> String {
        let insert = match context {
            Some(context) if !context.is_empty() => format!("{CONTEXT_PREFIX}{context}"),
            _ => String::new(),
        };
        self.system_template.replacen(CONTEXT_PLACEHOLDER, &insert, 1)
    }

    /// Assemble the full prompt.
    ///
    /// None of the inputs are validated or escaped, and text substituted into the template
    /// is never expanded again.
    pub fn format_messages(
        &self,
        context: Option<&str>,
        history: &[ChatMessage],
        input: &str,
    ) -> Vec<ChatMessage> {
        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(ChatMessage::system(self.format_system(context)));
        messages.extend(history.iter().cloned());
        messages.push(ChatMessage::human(input));
        messages
    }
}

impl Default for ChatPromptTemplate {
    fn default() -> Self {
        Self::conversation()
    }
}
