use serde::{Deserialize, Serialize};

use crate::types::{ChatMessage, Role};

/// A message as Motorhead stores it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryMessage {
    /// `"Human"` or `"AI"`.
    pub role: String,

    /// The message text.
    pub content: String,
}

impl From<&ChatMessage> for MemoryMessage {
    fn from(message: &ChatMessage) -> Self {
        Self {
            role: message.role.as_motorhead_str().to_string(),
            content: message.content.clone(),
        }
    }
}

impl From<MemoryMessage> for ChatMessage {
    fn from(message: MemoryMessage) -> Self {
        ChatMessage::new(Role::from_motorhead_str(&message.role), message.content)
    }
}

/// Body of `GET /sessions/{id}/memory`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryResponse {
    /// Stored messages, newest first.
    #[serde(default)]
    pub messages: Vec<MemoryMessage>,

    /// Running summary of messages that fell out of the window.
    #[serde(default)]
    pub context: Option<String>,

    /// Token count of the stored window, when the server reports it.
    #[serde(default)]
    pub tokens: Option<i64>,
}

impl MemoryResponse {
    /// The summary, or `None` when Motorhead has nothing (or the literal `NONE`).
    pub fn effective_context(&self) -> Option<&str> {
        self.context
            .as_deref()
            .filter(|context| !context.is_empty() && *context != "NONE")
    }
}

/// Body of `POST /sessions/{id}/memory`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryMessages {
    /// Messages to append, oldest first.
    pub messages: Vec<MemoryMessage>,
}

/// Acknowledgement returned by mutating Motorhead endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AckResponse {
    /// `"Ok"` on success.
    pub status: String,
}

/// Body of `POST /sessions/{id}/retrieval`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetrievalRequest {
    /// Text to search the session's long-term memory for.
    pub text: String,
}

/// One long-term memory hit.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RetrievalResult {
    /// `"Human"` or `"AI"`.
    #[serde(default)]
    pub role: String,

    /// The remembered message text.
    #[serde(default)]
    pub content: String,

    /// Vector distance from the query; smaller is closer.
    #[serde(default)]
    pub dist: f64,
}

/// Hosted Motorhead wraps every body in `{"data": ...}`; a self-hosted server does not.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum Envelope<T> {
    Wrapped { data: T },
    Bare(T),
}

impl<T> Envelope<T> {
    pub fn into_inner(self) -> T {
        match self {
            Envelope::Wrapped { data } => data,
            Envelope::Bare(body) => body,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn none_context_is_absent() {
        let response: MemoryResponse =
            serde_json::from_str(r#"{"messages":[],"context":"NONE","tokens":0}"#).unwrap();
        assert_eq!(response.effective_context(), None);

        let response: MemoryResponse = serde_json::from_str(r#"{"messages":[]}"#).unwrap();
        assert_eq!(response.effective_context(), None);

        let response: MemoryResponse =
            serde_json::from_str(r#"{"context":"We discussed guitars."}"#).unwrap();
        assert_eq!(response.effective_context(), Some("We discussed guitars."));
    }

    #[test]
    fn memory_message_roles() {
        let stored = MemoryMessage::from(&ChatMessage::ai("riff"));
        assert_eq!(stored.role, "AI");
        let back = ChatMessage::from(MemoryMessage {
            role: "Human".to_string(),
            content: "solo".to_string(),
        });
        assert_eq!(back, ChatMessage::human("solo"));
    }

    #[test]
    fn envelope_accepts_hosted_and_bare_bodies() {
        let hosted: Envelope<MemoryResponse> = serde_json::from_str(
            r#"{"data":{"messages":[{"role":"AI","content":"hi"}],"context":"NONE"}}"#,
        )
        .unwrap();
        assert_eq!(hosted.into_inner().messages.len(), 1);

        let bare: Envelope<AckResponse> = serde_json::from_str(r#"{"status":"Ok"}"#).unwrap();
        assert_eq!(bare.into_inner().status, "Ok");

        let hits: Envelope<Vec<RetrievalResult>> = serde_json::from_str(
            r#"{"data":[{"role":"Human","content":"Ace of Spades","dist":0.12}]}"#,
        )
        .unwrap();
        let hits = hits.into_inner();
        assert_eq!(hits[0].content, "Ace of Spades");
        assert_eq!(hits[0].dist, 0.12);
    }
}
