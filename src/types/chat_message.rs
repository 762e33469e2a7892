use serde::{Deserialize, Serialize};

/// Who authored a message in a conversation.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    /// Instructions that frame the conversation.
    System,

    /// The person at the keyboard.
    Human,

    /// The language model.
    Ai,
}

impl Role {
    /// The role name used by OpenAI-compatible chat endpoints.
    pub fn as_openai_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::Human => "user",
            Role::Ai => "assistant",
        }
    }

    /// The role name Motorhead stores alongside each message.
    pub fn as_motorhead_str(&self) -> &'static str {
        match self {
            Role::System => "System",
            Role::Human => "Human",
            Role::Ai => "AI",
        }
    }

    /// Interpret a Motorhead role string.
    ///
    /// Motorhead only distinguishes AI messages; anything else is read back as human.
    pub fn from_motorhead_str(role: &str) -> Self {
        if role == "AI" { Role::Ai } else { Role::Human }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_motorhead_str())
    }
}

/// A single message of a prompt or of the stored conversation history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// The author of the message.
    pub role: Role,

    /// The message text.
    pub content: String,
}

impl ChatMessage {
    /// Create a new `ChatMessage`.
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    /// Create a system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    /// Create a human message.
    pub fn human(content: impl Into<String>) -> Self {
        Self::new(Role::Human, content)
    }

    /// Create an AI message.
    pub fn ai(content: impl Into<String>) -> Self {
        Self::new(Role::Ai, content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn openai_role_names() {
        assert_eq!(Role::System.as_openai_str(), "system");
        assert_eq!(Role::Human.as_openai_str(), "user");
        assert_eq!(Role::Ai.as_openai_str(), "assistant");
    }

    #[test]
    fn motorhead_roles_default_to_human() {
        assert_eq!(Role::from_motorhead_str("AI"), Role::Ai);
        assert_eq!(Role::from_motorhead_str("Human"), Role::Human);
        assert_eq!(Role::from_motorhead_str("ai"), Role::Human);
        assert_eq!(Role::from_motorhead_str(""), Role::Human);
    }

    #[test]
    fn constructors() {
        assert_eq!(ChatMessage::ai("hi").role, Role::Ai);
        assert_eq!(ChatMessage::human("hi").content, "hi");
    }
}
