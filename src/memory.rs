//! Conversation memory backed by a Motorhead server.
//!
//! Motorhead keeps a window of recent messages per session and folds older ones into a running
//! summary, the *context*. [`MotorheadMemory::init`] loads both once; every finished turn is
//! then appended on the server and mirrored locally, so the history a turn reads never needs
//! another round trip.

use std::fmt;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::{Client as ReqwestClient, Response};
use serde::de::DeserializeOwned;
use tracing::{debug, info};
use url::Url;

use crate::error::{Error, Result};
use crate::observability::{MEMORY_REQUEST_ERRORS, MEMORY_REQUESTS};
use crate::types::{
    AckResponse, ChatMessage, Envelope, MemoryMessage, MemoryMessages, MemoryResponse,
    RetrievalRequest, RetrievalResult,
};

pub const DEFAULT_MOTORHEAD_URL: &str = "http://localhost:8080";
/// The managed Motorhead service, used when Metal credentials are configured.
pub const HOSTED_MOTORHEAD_URL: &str = "https://api.getmetal.io/v1/motorhead";
const API_KEY_HEADER: &str = "x-metal-api-key";
const CLIENT_ID_HEADER: &str = "x-metal-client-id";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const SERVICE: &str = "Motorhead";

/// The memory a conversation chain reads from and writes to.
#[async_trait::async_trait]
pub trait Memory: Send + Sync {
    /// The prior-conversation summary, if any.
    fn context(&self) -> Option<&str>;

    /// The prior turns, oldest first.
    async fn load_history(&self) -> Result<Vec<ChatMessage>>;

    /// Record one finished turn.
    async fn save_context(&mut self, input: &str, output: &str) -> Result<()>;
}

/// Connection settings for [`MotorheadMemory`].
#[derive(Clone, Default)]
pub struct MotorheadOptions {
    /// Sent as `x-metal-api-key` on every request.
    pub api_key: Option<String>,
    /// Sent as `x-metal-client-id` on every request.
    pub client_id: Option<String>,
    pub timeout: Option<Duration>,
}

impl fmt::Debug for MotorheadOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MotorheadOptions")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("client_id", &self.client_id)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// A Motorhead session.
#[derive(Debug, Clone)]
pub struct MotorheadMemory {
    client: ReqwestClient,
    base_url: Url,
    session_id: String,
    timeout: Duration,
    context: Option<String>,
    history: Vec<ChatMessage>,
    tokens: Option<i64>,
}

impl MotorheadMemory {
    /// Creates a client for `session_id` on the server at `url`. No request is made.
    pub fn new(url: &str, session_id: impl Into<String>) -> Result<Self> {
        Self::with_options(url, session_id, MotorheadOptions::default())
    }

    /// Creates a client with credentials and a custom request timeout.
    pub fn with_options(
        url: &str,
        session_id: impl Into<String>,
        options: MotorheadOptions,
    ) -> Result<Self> {
        let session_id = session_id.into();
        if session_id.is_empty() {
            return Err(Error::configuration("Motorhead session id must not be empty"));
        }
        let mut base_url = Url::parse(url)?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        let timeout = options.timeout.unwrap_or(DEFAULT_TIMEOUT);
        let client = ReqwestClient::builder()
            .timeout(timeout)
            .default_headers(credential_headers(&options)?)
            .build()
            .map_err(|e| {
                Error::http_client(
                    format!("Failed to build HTTP client: {e}"),
                    Some(Box::new(e)),
                )
            })?;
        Ok(Self {
            client,
            base_url,
            session_id,
            timeout,
            context: None,
            history: Vec::new(),
            tokens: None,
        })
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// The messages loaded by `init` plus every turn saved since, oldest first.
    pub fn history(&self) -> &[ChatMessage] {
        &self.history
    }

    /// Token count of the server-side window, as last reported by `init`.
    pub fn tokens(&self) -> Option<i64> {
        self.tokens
    }

    /// The `/sessions/{id}/memory` endpoint for this session.
    pub fn memory_url(&self) -> Result<Url> {
        self.session_url("memory")
    }

    fn session_url(&self, endpoint: &str) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| Error::url("Motorhead URL cannot be a base", None))?
            .pop_if_empty()
            .extend(["sessions", self.session_id.as_str(), endpoint]);
        Ok(url)
    }

    /// Load the stored messages and context from the server, replacing local state.
    pub async fn init(&mut self) -> Result<()> {
        let url = self.memory_url()?;
        debug!(url = %url, "loading memory");
        let response = self.send(self.client.get(url)).await?;
        let memory: MemoryResponse = parse_body(response, "memory").await?;
        self.apply(memory);
        info!(
            session = %self.session_id,
            messages = self.history.len(),
            has_context = self.context.is_some(),
            "memory loaded"
        );
        Ok(())
    }

    /// Delete the session's messages and context on the server and locally.
    pub async fn clear(&mut self) -> Result<()> {
        let url = self.memory_url()?;
        let response = self.send(self.client.delete(url)).await?;
        Self::check_ack(response).await?;
        self.history.clear();
        self.context = None;
        self.tokens = None;
        Ok(())
    }

    /// Search the session's long-term memory for messages close to `text`.
    ///
    /// Empty text returns no results without a request.
    pub async fn retrieval(&self, text: &str) -> Result<Vec<RetrievalResult>> {
        if text.is_empty() {
            return Ok(Vec::new());
        }
        let url = self.session_url("retrieval")?;
        let body = RetrievalRequest {
            text: text.to_string(),
        };
        let response = self.send(self.client.post(url).json(&body)).await?;
        let results: Vec<RetrievalResult> = parse_body(response, "retrieval results").await?;
        debug!(results = results.len(), "retrieval complete");
        Ok(results)
    }

    fn apply(&mut self, memory: MemoryResponse) {
        self.context = memory.effective_context().map(str::to_string);
        self.tokens = memory.tokens;
        // Motorhead pushes to the head of its list; replay oldest first.
        self.history = memory
            .messages
            .into_iter()
            .rev()
            .map(ChatMessage::from)
            .collect();
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<Response> {
        MEMORY_REQUESTS.click();
        let response = request.send().await.map_err(|e| {
            MEMORY_REQUEST_ERRORS.click();
            Error::from_send(SERVICE, e, Some(self.timeout.as_secs_f64()))
        })?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        MEMORY_REQUEST_ERRORS.click();
        let body = response.text().await.unwrap_or_default();
        let message = if body.is_empty() {
            format!("{SERVICE} returned {status}")
        } else {
            body
        };
        Err(Error::from_status(status.as_u16(), None, message, None, None))
    }

    async fn check_ack(response: Response) -> Result<()> {
        let ack: AckResponse = parse_body(response, "acknowledgement").await?;
        if ack.status == "Ok" {
            Ok(())
        } else {
            Err(Error::api(200, None, format!("{SERVICE} status {}", ack.status)))
        }
    }
}

fn credential_headers(options: &MotorheadOptions) -> Result<HeaderMap> {
    let mut headers = HeaderMap::new();
    for (name, value, sensitive) in [
        (API_KEY_HEADER, &options.api_key, true),
        (CLIENT_ID_HEADER, &options.client_id, false),
    ] {
        if let Some(value) = value {
            let mut value = HeaderValue::from_str(value).map_err(|_| {
                Error::configuration(format!("{name} contains invalid header characters"))
            })?;
            value.set_sensitive(sensitive);
            headers.insert(name, value);
        }
    }
    Ok(headers)
}

async fn parse_body<T: DeserializeOwned>(response: Response, what: &str) -> Result<T> {
    let body: Envelope<T> = response.json().await.map_err(|e| {
        Error::serialization(
            format!("Failed to parse Motorhead {what}: {e}"),
            Some(Box::new(e)),
        )
    })?;
    Ok(body.into_inner())
}

#[async_trait::async_trait]
impl Memory for MotorheadMemory {
    fn context(&self) -> Option<&str> {
        self.context.as_deref()
    }

    async fn load_history(&self) -> Result<Vec<ChatMessage>> {
        Ok(self.history.clone())
    }

    async fn save_context(&mut self, input: &str, output: &str) -> Result<()> {
        let human = ChatMessage::human(input);
        let ai = ChatMessage::ai(output);
        let body = MemoryMessages {
            messages: vec![MemoryMessage::from(&human), MemoryMessage::from(&ai)],
        };
        let url = self.memory_url()?;
        let response = self.send(self.client.post(url).json(&body)).await?;
        Self::check_ack(response).await?;
        self.history.push(human);
        self.history.push(ai);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Role;

    #[test]
    fn memory_url_escapes_session() {
        let memory = MotorheadMemory::new("http://localhost:8080", "ozzy 6666").unwrap();
        assert_eq!(
            memory.memory_url().unwrap().as_str(),
            "http://localhost:8080/sessions/ozzy%206666/memory"
        );

        let memory = MotorheadMemory::new("http://example.com/motorhead", "s").unwrap();
        assert_eq!(
            memory.memory_url().unwrap().as_str(),
            "http://example.com/motorhead/sessions/s/memory"
        );
    }

    #[test]
    fn rejects_bad_configuration() {
        assert!(MotorheadMemory::new("not a url", "s").is_err());
        assert!(
            MotorheadMemory::new(DEFAULT_MOTORHEAD_URL, "")
                .unwrap_err()
                .is_configuration()
        );
    }

    #[test]
    fn apply_reverses_into_chronological_order() {
        let mut memory = MotorheadMemory::new(DEFAULT_MOTORHEAD_URL, "s").unwrap();
        let response: MemoryResponse = serde_json::from_str(
            r#"{"messages":[{"role":"AI","content":"second"},{"role":"Human","content":"first"}],"context":"NONE","tokens":12}"#,
        )
        .unwrap();
        memory.apply(response);
        assert_eq!(
            memory.history(),
            &[ChatMessage::human("first"), ChatMessage::ai("second")]
        );
        assert_eq!(memory.context(), None);
        assert_eq!(memory.tokens(), Some(12));
        assert_eq!(memory.history()[1].role, Role::Ai);
    }

    #[tokio::test]
    async fn unreachable_server_fails_init() {
        // Nothing listens on port 1.
        let mut memory = MotorheadMemory::new("http://127.0.0.1:1", "s").unwrap();
        let err = memory.init().await.unwrap_err();
        assert!(err.is_connection() || err.is_timeout(), "{err}");
        assert!(memory.history().is_empty());
    }

    #[test]
    fn credentials_become_headers() {
        let headers = credential_headers(&MotorheadOptions {
            api_key: Some("metal-key".to_string()),
            client_id: Some("metal-client".to_string()),
            timeout: None,
        })
        .unwrap();
        assert_eq!(headers[API_KEY_HEADER], "metal-key");
        assert!(headers[API_KEY_HEADER].is_sensitive());
        assert_eq!(headers[CLIENT_ID_HEADER], "metal-client");

        assert!(credential_headers(&MotorheadOptions::default()).unwrap().is_empty());
        let err = credential_headers(&MotorheadOptions {
            api_key: Some("bad\nkey".to_string()),
            ..MotorheadOptions::default()
        })
        .unwrap_err();
        assert!(err.is_configuration());
        let debug = format!("{:?}", MotorheadOptions {
            api_key: Some("metal-key".to_string()),
            ..MotorheadOptions::default()
        });
        assert!(!debug.contains("metal-key"));
    }

    #[tokio::test]
    async fn empty_retrieval_makes_no_request() {
        let memory = MotorheadMemory::new("http://127.0.0.1:1", "s").unwrap();
        assert!(memory.retrieval("").await.unwrap().is_empty());
        assert_eq!(
            memory.session_url("retrieval").unwrap().as_str(),
            "http://127.0.0.1:1/sessions/s/retrieval"
        );
    }
}
