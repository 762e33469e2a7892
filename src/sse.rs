//! Server-Sent Events (SSE) processing for streaming chat completions.
//!
//! OpenAI-compatible backends send one `data:` line per event, each carrying a
//! `chat.completion.chunk` JSON object, and finish with `data: [DONE]`.

use bytes::Bytes;
use futures::stream::{self, Stream, StreamExt};

use crate::types::ChatCompletionChunk;
use crate::{Error, Result};

const DONE_MARKER: &str = "[DONE]";

/// The outcome of parsing one SSE event.
#[derive(Debug)]
enum SseEvent {
    Chunk(Result<ChatCompletionChunk>),
    Skip,
    Done,
}

/// Process a stream of bytes into a stream of completion chunks.
///
/// Bytes are buffered until a blank line completes an event, so events and multi-byte
/// characters may be split across network reads. The stream ends at `[DONE]` or when the
/// underlying byte stream ends.
///
/// ```
/// # tokio_test::block_on(async {
/// use bytes::Bytes;
/// use futures::{StreamExt, stream};
/// use motorhead_chat::sse::process_sse;
///
/// let body = "data: {\"choices\":[{\"index\":0,\"delta\":{\"content\":\"Hi\"}}]}\n\ndata: [DONE]\n\n";
/// let bytes = stream::iter(vec![Ok::<_, std::io::Error>(Bytes::from(body))]);
/// let chunks: Vec<_> = process_sse(bytes).collect().await;
/// assert_eq!(chunks.len(), 1);
/// assert_eq!(chunks[0].as_ref().unwrap().token(), Some("Hi"));
/// # });
/// ```
pub fn process_sse<S, E>(byte_stream: S) -> impl Stream<Item = Result<ChatCompletionChunk>>
where
    S: Stream<Item = std::result::Result<Bytes, E>> + Unpin,
    E: std::error::Error + Send + Sync + 'static,
{
    let stream = byte_stream.map(|result| {
        result
            .map_err(|e| Error::streaming(format!("Error in HTTP stream: {e}"), Some(Box::new(e))))
    });

    let buffer: Vec<u8> = Vec::new();

    stream::unfold(
        (stream, buffer, false),
        move |(mut stream, mut buffer, done)| async move {
            if done {
                return None;
            }
            loop {
                if let Some((event, remaining)) = extract_event(&buffer) {
                    buffer = remaining;
                    match event {
                        SseEvent::Chunk(chunk) => return Some((chunk, (stream, buffer, false))),
                        SseEvent::Skip => continue,
                        SseEvent::Done => return None,
                    }
                }

                match stream.next().await {
                    Some(Ok(bytes)) => buffer.extend_from_slice(&bytes),
                    Some(Err(e)) => {
                        return Some((Err(e), (stream, buffer, true)));
                    }
                    None => {
                        // A trailing event without the final blank line.
                        if !buffer.iter().all(u8::is_ascii_whitespace) {
                            buffer.extend_from_slice(b"\n\n");
                            if let Some((SseEvent::Chunk(chunk), _)) = extract_event(&buffer) {
                                return Some((chunk, (stream, Vec::new(), true)));
                            }
                        }
                        return None;
                    }
                }
            }
        },
    )
}

/// Extract one complete SSE event from the front of the buffer.
fn extract_event(buffer: &[u8]) -> Option<(SseEvent, Vec<u8>)> {
    let (end, delimiter_len) = find_delimiter(buffer)?;
    let rest = buffer[end + delimiter_len..].to_vec();

    let event_text = match std::str::from_utf8(&buffer[..end]) {
        Ok(text) => text,
        Err(e) => {
            return Some((
                SseEvent::Chunk(Err(Error::encoding(
                    format!("Invalid UTF-8 in stream: {e}"),
                    Some(Box::new(e)),
                ))),
                rest,
            ));
        }
    };

    // Multiple data lines of one event are joined with newlines.
    let data: Vec<&str> = event_text
        .lines()
        .filter_map(|line| line.strip_prefix("data:"))
        .map(|data| data.strip_prefix(' ').unwrap_or(data))
        .collect();
    if data.is_empty() {
        // Comments, keep-alives, and `event:`-only blocks.
        return Some((SseEvent::Skip, rest));
    }
    let data = data.join("\n");
    let data = data.trim();

    if data == DONE_MARKER {
        return Some((SseEvent::Done, rest));
    }
    if data.is_empty() {
        return Some((SseEvent::Skip, rest));
    }

    let chunk = serde_json::from_str::<ChatCompletionChunk>(data).map_err(|e| {
        Error::serialization(
            format!("Failed to parse chunk JSON: {e}"),
            Some(Box::new(e)),
        )
    });
    Some((SseEvent::Chunk(chunk), rest))
}

/// Locate the first blank line, accepting both `\n\n` and `\r\n\r\n`.
fn find_delimiter(buffer: &[u8]) -> Option<(usize, usize)> {
    let lf = buffer.windows(2).position(|w| w == b"\n\n").map(|i| (i, 2));
    let crlf = buffer
        .windows(4)
        .position(|w| w == b"\r\n\r\n")
        .map(|i| (i, 4));
    match (lf, crlf) {
        (Some(a), Some(b)) => Some(if a.0 <= b.0 { a } else { b }),
        (a, b) => a.or(b),
    }
}
