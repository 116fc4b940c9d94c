//! Streaming event types and the block reader for the generation stream.
//!
//! The generation backend answers with blocks separated by a blank line.
//! Data blocks look like `data: {"token": "..."}` and the stream ends with
//! `data: [DONE]` or `data: {"event": "[DONE]"}`. Network chunks do not line up with blocks, so the reader
//! keeps a pending buffer across reads and only parses complete blocks.

use crate::error::ErrorClassification;
use crate::types::StreamPayload;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use tokio_stream::Stream;

/// Prefix that marks a data block
pub const DATA_PREFIX: &str = "data: ";

/// Payload that terminates the stream
pub const DONE_SENTINEL: &str = "[DONE]";

const BLOCK_SEPARATOR: &[u8] = b"\n\n";

/// Events produced by [`StreamEventReader`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StreamEvent {
    /// A text fragment of the response
    Token { content: String },
    /// The stream failed; no further events follow
    Error {
        message: String,
        hint: ErrorClassification,
    },
    /// The terminator was received; no further events follow
    Done,
}

impl StreamEvent {
    /// Create a token event
    pub fn token(content: impl Into<String>) -> Self {
        StreamEvent::Token {
            content: content.into(),
        }
    }

    /// Check if this is a terminal event (Done or Error)
    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamEvent::Done | StreamEvent::Error { .. })
    }
}

/// A stream of generation events
pub type StreamEventStream = Pin<Box<dyn Stream<Item = StreamEvent> + Send>>;

/// Owned byte buffer that hands out complete blocks.
///
/// Splitting happens on bytes so a multi-byte character cut in half by the
/// network is only decoded once both halves have arrived.
#[derive(Debug, Default)]
pub struct BlockBuffer {
    pending: Vec<u8>,
}

impl BlockBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a raw chunk
    pub fn extend(&mut self, chunk: &[u8]) {
        self.pending.extend_from_slice(chunk);
    }

    /// Remove and return the next complete block, without its separator
    pub fn next_block(&mut self) -> Option<String> {
        let end = self
            .pending
            .windows(BLOCK_SEPARATOR.len())
            .position(|window| window == BLOCK_SEPARATOR)?;
        let block: Vec<u8> = self.pending.drain(..end + BLOCK_SEPARATOR.len()).collect();
        Some(String::from_utf8_lossy(&block[..end]).into_owned())
    }

    /// Bytes of a trailing partial block
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

/// Parse one complete block.
///
/// Returns `None` for blocks that carry no data (keep-alives, comments).
pub fn parse_block(block: &str) -> Option<StreamEvent> {
    let data = block.strip_prefix(DATA_PREFIX)?;

    if data.trim() == DONE_SENTINEL {
        return Some(StreamEvent::Done);
    }

    match serde_json::from_str::<StreamPayload>(data) {
        Ok(StreamPayload {
            event: Some(event),
            ..
        }) if event.trim() == DONE_SENTINEL => Some(StreamEvent::Done),
        Ok(StreamPayload {
            error: Some(message),
            ..
        }) => Some(StreamEvent::Error {
            message,
            hint: ErrorClassification::MalformedArtifact,
        }),
        Ok(payload) => Some(StreamEvent::Token {
            content: payload.token.unwrap_or_default(),
        }),
        Err(e) => {
            tracing::debug!("Undecodable stream payload {:?}: {}", data, e);
            Some(StreamEvent::Error {
                message: format!("Invalid response format from server: {}", e),
                hint: ErrorClassification::MalformedArtifact,
            })
        }
    }
}

/// Turns a stream of raw chunks into [`StreamEvent`]s.
///
/// Reading is strictly forward: each chunk is pulled once, and nothing is
/// read after a terminal event. Exhausting the underlying stream without a
/// terminator simply ends the sequence; callers treat that as incomplete.
pub struct StreamEventReader<S> {
    chunks: S,
    buffer: BlockBuffer,
    finished: bool,
}

impl<S, B, E> StreamEventReader<S>
where
    S: Stream<Item = Result<B, E>> + Unpin,
    B: AsRef<[u8]>,
    E: std::fmt::Display,
{
    /// Create a reader over a chunk stream
    pub fn new(chunks: S) -> Self {
        Self {
            chunks,
            buffer: BlockBuffer::new(),
            finished: false,
        }
    }

    /// Whether the reader has produced its last event
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Read the next event, pulling more chunks as needed
    pub async fn next_event(&mut self) -> Option<StreamEvent> {
        if self.finished {
            return None;
        }

        loop {
            while let Some(block) = self.buffer.next_block() {
                if let Some(event) = parse_block(&block) {
                    if event.is_terminal() {
                        self.finished = true;
                    }
                    return Some(event);
                }
            }

            match self.chunks.next().await {
                Some(Ok(chunk)) => self.buffer.extend(chunk.as_ref()),
                Some(Err(e)) => {
                    self.finished = true;
                    return Some(StreamEvent::Error {
                        message: format!("Stream read failed: {}", e),
                        hint: ErrorClassification::Unknown,
                    });
                }
                None => {
                    self.finished = true;
                    if !self.buffer.is_empty() {
                        tracing::warn!(
                            "Stream ended with {} bytes of partial block",
                            self.buffer.pending_len()
                        );
                    }
                    return None;
                }
            }
        }
    }

    /// Convert into a boxed event stream
    pub fn into_stream(mut self) -> StreamEventStream
    where
        S: Send + 'static,
        B: Send + 'static,
        E: Send + 'static,
    {
        Box::pin(async_stream::stream! {
            while let Some(event) = self.next_event().await {
                yield event;
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::convert::Infallible;

    type ChunkIter = futures::stream::Iter<std::vec::IntoIter<Result<Vec<u8>, Infallible>>>;

    fn reader_over(chunks: Vec<&str>) -> StreamEventReader<ChunkIter> {
        let chunks: Vec<Result<Vec<u8>, Infallible>> =
            chunks.into_iter().map(|c| Ok(c.as_bytes().to_vec())).collect();
        StreamEventReader::new(futures::stream::iter(chunks))
    }

    async fn collect(mut reader: StreamEventReader<ChunkIter>) -> Vec<StreamEvent> {
        let mut events = vec![];
        while let Some(event) = reader.next_event().await {
            events.push(event);
        }
        events
    }

    fn sample_body() -> String {
        [
            r#"data: {"token": "Sure, ```html\n"}"#,
            r#"data: {"token": "<html><body>OK</body></html>"}"#,
            r#"data: {"token": "```"}"#,
            "data: [DONE]",
        ]
        .iter()
        .map(|block| format!("{}\n\n", block))
        .collect()
    }

    #[test]
    fn test_block_buffer_retains_partial_tail() {
        let mut buffer = BlockBuffer::new();
        buffer.extend(b"data: a\n\ndata: b");
        assert_eq!(buffer.next_block().as_deref(), Some("data: a"));
        assert_eq!(buffer.next_block(), None);
        assert_eq!(buffer.pending_len(), "data: b".len());

        buffer.extend(b"\n\n");
        assert_eq!(buffer.next_block().as_deref(), Some("data: b"));
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_block_buffer_joins_split_utf8() {
        let text = "data: {\"token\": \"é\"}\n\n".as_bytes();
        let split = text.iter().position(|b| *b == 0xC3).unwrap() + 1;
        let mut buffer = BlockBuffer::new();
        buffer.extend(&text[..split]);
        assert_eq!(buffer.next_block(), None);
        buffer.extend(&text[split..]);
        assert_eq!(
            parse_block(&buffer.next_block().unwrap()),
            Some(StreamEvent::token("é"))
        );
    }

    #[test]
    fn test_parse_block_variants() {
        assert_eq!(
            parse_block(r#"data: {"token": "hi"}"#),
            Some(StreamEvent::token("hi"))
        );
        assert_eq!(parse_block("data: [DONE]"), Some(StreamEvent::Done));
        assert_eq!(parse_block(": keep-alive"), None);
        assert_eq!(parse_block("event: ping"), None);
        assert_eq!(parse_block(r#"data: {}"#), Some(StreamEvent::token("")));
    }

    #[test]
    fn test_parse_block_event_terminator() {
        assert_eq!(
            parse_block(r#"data: {"event": "[DONE]"}"#),
            Some(StreamEvent::Done)
        );
        assert_eq!(
            parse_block(r#"data: {"event":"[DONE]"}"#),
            Some(StreamEvent::Done)
        );
        // Other lifecycle markers carry no text
        assert_eq!(
            parse_block(r#"data: {"event": "start"}"#),
            Some(StreamEvent::token(""))
        );
    }

    #[tokio::test]
    async fn test_event_terminator_ends_stream() {
        let events = collect(reader_over(vec![
            "data: {\"token\": \"```html\\n\"}\n\n",
            "data: {\"token\": \"<html><body>OK</body></html>\"}\n\ndata: {\"token\": \"```\"}\n\n",
            "data: {\"event\":\"[DONE]\"}\n\n",
            "data: {\"token\": \"late\"}\n\n",
        ]))
        .await;
        assert_eq!(events.len(), 4);
        assert_eq!(events[3], StreamEvent::Done);
    }

    #[test]
    fn test_parse_block_server_error() {
        assert_eq!(
            parse_block(r#"data: {"error": "upstream failed"}"#),
            Some(StreamEvent::Error {
                message: "upstream failed".into(),
                hint: ErrorClassification::MalformedArtifact,
            })
        );
    }

    #[test]
    fn test_parse_block_invalid_json() {
        match parse_block("data: {not json") {
            Some(StreamEvent::Error { hint, message }) => {
                assert_eq!(hint, ErrorClassification::MalformedArtifact);
                assert!(message.contains("Invalid response format"), "got: {}", message);
            }
            other => panic!("expected error event, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_split_invariance() {
        let body = sample_body();
        let expected = collect(reader_over(vec![body.as_str()])).await;
        assert_eq!(expected.len(), 4);
        assert_eq!(expected[3], StreamEvent::Done);

        for size in 1..body.len() {
            let chunks: Vec<&str> = body
                .as_bytes()
                .chunks(size)
                .map(|c| std::str::from_utf8(c).unwrap())
                .collect();
            let events = collect(reader_over(chunks)).await;
            assert_eq!(events, expected, "chunk size {}", size);
        }
    }

    #[tokio::test]
    async fn test_keep_alive_blocks_are_skipped() {
        let events = collect(reader_over(vec![
            ": ping\n\n",
            "data: {\"token\": \"a\"}\n\n: ping\n\n",
            "data: [DONE]\n\n",
        ]))
        .await;
        assert_eq!(events, vec![StreamEvent::token("a"), StreamEvent::Done]);
    }

    #[tokio::test]
    async fn test_nothing_read_after_done() {
        let events = collect(reader_over(vec![
            "data: [DONE]\n\ndata: {\"token\": \"late\"}\n\n",
        ]))
        .await;
        assert_eq!(events, vec![StreamEvent::Done]);
    }

    #[tokio::test]
    async fn test_sequence_ends_after_error() {
        let events = collect(reader_over(vec![
            "data: {\"token\": \"a\"}\n\ndata: oops\n\ndata: {\"token\": \"b\"}\n\n",
        ]))
        .await;
        assert_eq!(events.len(), 2);
        assert!(matches!(events[1], StreamEvent::Error { .. }));
    }

    #[tokio::test]
    async fn test_exhaustion_without_terminator() {
        let mut reader = reader_over(vec!["data: {\"token\": \"a\"}\n\ndata: {\"tok"]);
        assert_eq!(reader.next_event().await, Some(StreamEvent::token("a")));
        assert_eq!(reader.next_event().await, None);
        assert!(reader.is_finished());
    }

    #[tokio::test]
    async fn test_read_failure_yields_unknown_error() {
        let chunks: Vec<Result<Vec<u8>, String>> = vec![
            Ok(b"data: {\"token\": \"a\"}\n\n".to_vec()),
            Err("connection reset".to_string()),
            Ok(b"data: [DONE]\n\n".to_vec()),
        ];
        let mut reader = StreamEventReader::new(futures::stream::iter(chunks));
        assert_eq!(reader.next_event().await, Some(StreamEvent::token("a")));
        assert_eq!(
            reader.next_event().await,
            Some(StreamEvent::Error {
                message: "Stream read failed: connection reset".into(),
                hint: ErrorClassification::Unknown,
            })
        );
        assert_eq!(reader.next_event().await, None);
    }

    #[tokio::test]
    async fn test_into_stream_yields_all_events() {
        let body = sample_body();
        let events: Vec<StreamEvent> = reader_over(vec![body.as_str()])
            .into_stream()
            .collect()
            .await;
        assert_eq!(events.len(), 4);
        assert!(events[3].is_terminal());
    }
}
