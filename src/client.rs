use std::env;
use std::pin::Pin;
use std::time::{Duration, Instant};

use futures::stream::{self, Stream, StreamExt};
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::{Client as ReqwestClient, Response, header};
use serde::Deserialize;
use tracing::debug;

use crate::error::{Error, Result};
use crate::observability::{MODEL_REQUEST_DURATION, MODEL_REQUEST_ERRORS, MODEL_REQUESTS};
use crate::sse::process_sse;
use crate::types::{ChatCompletionChunk, ChatCompletionRequest};

pub const DEFAULT_API_URL: &str = "https://api.openai.com/v1/";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const SERVICE: &str = "model backend";

/// A boxed stream of completion chunks.
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<ChatCompletionChunk>> + Send>>;

/// Client for an OpenAI-compatible chat completions API.
#[derive(Debug, Clone)]
pub struct OpenAi {
    api_key: String,
    client: ReqwestClient,
    base_url: String,
    timeout: Duration,
}

impl OpenAi {
    /// Create a new client.
    ///
    /// The API key can be provided directly or read from the OPENAI_API_KEY
    /// environment variable.
    pub fn new(api_key: Option<String>) -> Result<Self> {
        Self::with_options(api_key, None, None)
    }

    /// Create a new client with custom settings.
    pub fn with_options(
        api_key: Option<String>,
        base_url: Option<String>,
        timeout: Option<Duration>,
    ) -> Result<Self> {
        let api_key = match api_key {
            Some(key) => key,
            None => env::var("OPENAI_API_KEY").map_err(|_| {
                Error::authentication(
                    "API key not provided and OPENAI_API_KEY environment variable not set",
                )
            })?,
        };

        // `timeout` bounds the wait for headers and each gap between chunks, not the whole
        // response, so long answers can keep streaming.
        let timeout = timeout.unwrap_or(DEFAULT_TIMEOUT);
        let client = ReqwestClient::builder()
            .connect_timeout(CONNECT_TIMEOUT.min(timeout))
            .build()
            .map_err(|e| {
                Error::http_client(
                    format!("Failed to build HTTP client: {e}"),
                    Some(Box::new(e)),
                )
            })?;

        Ok(Self {
            api_key,
            client,
            base_url: normalize_base_url(base_url.unwrap_or_else(|| DEFAULT_API_URL.to_string())),
            timeout,
        })
    }

    /// The base URL requests are sent to, always ending in `/`.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn default_headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        headers.insert(
            header::ACCEPT,
            HeaderValue::from_static("text/event-stream"),
        );
        let bearer = HeaderValue::from_str(&format!("Bearer {}", self.api_key))
            .map_err(|_| Error::authentication("API key contains invalid header characters"))?;
        headers.insert(header::AUTHORIZATION, bearer);
        Ok(headers)
    }

    /// Process API response errors and convert to our Error type
    async fn process_error_response(response: Response) -> Error {
        let status_code = response.status().as_u16();

        let retry_after = response
            .headers()
            .get("retry-after")
            .and_then(|val| val.to_str().ok())
            .and_then(|val| val.parse::<u64>().ok());

        #[derive(Deserialize)]
        struct ErrorResponse {
            error: Option<ErrorDetail>,
        }

        #[derive(Deserialize)]
        struct ErrorDetail {
            #[serde(rename = "type")]
            error_type: Option<String>,
            message: Option<String>,
            param: Option<String>,
        }

        let error_body = match response.text().await {
            Ok(body) => body,
            Err(e) => {
                return Error::http_client(
                    format!("Failed to read error response: {e}"),
                    Some(Box::new(e)),
                );
            }
        };

        let detail = serde_json::from_str::<ErrorResponse>(&error_body)
            .ok()
            .and_then(|e| e.error);
        let (error_type, message, param) = match detail {
            Some(detail) => (
                detail.error_type,
                detail.message.unwrap_or_else(|| error_body.clone()),
                detail.param,
            ),
            None => (None, error_body, None),
        };

        Error::from_status(status_code, error_type, message, param, retry_after)
    }

    /// Send a chat completion request and get a streaming response.
    ///
    /// `stream` is forced on regardless of what the request says.
    pub async fn stream(&self, mut request: ChatCompletionRequest) -> Result<ChunkStream> {
        request.stream = true;
        let url = format!("{}chat/completions", self.base_url);
        debug!(
            url = %url,
            model = %request.model,
            messages = request.messages.len(),
            "sending chat completion request"
        );

        MODEL_REQUESTS.click();
        let started = Instant::now();
        let send = self
            .client
            .post(&url)
            .headers(self.default_headers()?)
            .json(&request)
            .send();
        let response = match tokio::time::timeout(self.timeout, send).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                MODEL_REQUEST_ERRORS.click();
                return Err(Error::from_send(SERVICE, e, Some(self.timeout.as_secs_f64())));
            }
            Err(_) => {
                MODEL_REQUEST_ERRORS.click();
                return Err(Error::timeout(
                    format!("{SERVICE} sent no response headers in time"),
                    Some(self.timeout.as_secs_f64()),
                ));
            }
        };
        MODEL_REQUEST_DURATION.add(started.elapsed().as_secs_f64());

        if !response.status().is_success() {
            MODEL_REQUEST_ERRORS.click();
            return Err(Self::process_error_response(response).await);
        }

        let chunks = Box::pin(process_sse(response.bytes_stream()));
        Ok(Box::pin(idle_timeout(chunks, self.timeout)))
    }
}

/// End `chunks` with a timeout error once it goes `idle` without producing anything.
fn idle_timeout<S>(chunks: S, idle: Duration) -> impl Stream<Item = Result<ChatCompletionChunk>>
where
    S: Stream<Item = Result<ChatCompletionChunk>> + Unpin,
{
    stream::unfold(Some(chunks), move |state| async move {
        let mut chunks = state?;
        match tokio::time::timeout(idle, chunks.next()).await {
            Ok(Some(chunk)) => Some((chunk, Some(chunks))),
            Ok(None) => None,
            Err(_) => Some((
                Err(Error::timeout(
                    format!("{SERVICE} stream stalled"),
                    Some(idle.as_secs_f64()),
                )),
                None,
            )),
        }
    })
}

fn normalize_base_url(mut base_url: String) -> String {
    if !base_url.ends_with('/') {
        base_url.push('/');
    }
    base_url
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        let client = OpenAi::new(Some("test-key".to_string())).unwrap();
        assert_eq!(client.api_key, "test-key");
        assert_eq!(client.base_url, DEFAULT_API_URL);
        assert_eq!(client.timeout, DEFAULT_TIMEOUT);

        let client = OpenAi::with_options(
            Some("test-key".to_string()),
            Some("http://localhost:1234/v1".to_string()),
            Some(Duration::from_secs(30)),
        )
        .unwrap();
        assert_eq!(client.base_url(), "http://localhost:1234/v1/");
        assert_eq!(client.timeout, Duration::from_secs(30));
    }

    #[test]
    fn bad_key_is_rejected_before_sending() {
        let client = OpenAi::new(Some("bad\nkey".to_string())).unwrap();
        let err = client.default_headers().unwrap_err();
        assert!(err.is_authentication());
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_stream_times_out() {
        let first: Result<ChatCompletionChunk> = Ok(ChatCompletionChunk::default());
        let chunks = stream::iter(vec![first]).chain(stream::pending());
        let items: Vec<_> = idle_timeout(chunks, Duration::from_secs(5)).collect().await;
        assert_eq!(items.len(), 2);
        assert!(items[0].is_ok());
        let err = items[1].as_ref().unwrap_err();
        assert!(err.is_timeout());
    }

    #[tokio::test(start_paused = true)]
    async fn slow_but_steady_stream_is_not_cut_off() {
        let idle = Duration::from_secs(5);
        let chunks = Box::pin(stream::unfold(0, |n| async move {
            if n == 4 {
                return None;
            }
            // Each gap is under the idle limit; together they are well past it.
            tokio::time::sleep(Duration::from_secs(4)).await;
            Some((Ok::<_, Error>(ChatCompletionChunk::default()), n + 1))
        }));
        let items: Vec<_> = idle_timeout(chunks, idle).collect().await;
        assert_eq!(items.len(), 4);
        assert!(items.iter().all(Result::is_ok));
    }
}
