// ABOUTME: Shared SSE line-buffering parser for LLM streaming responses
// ABOUTME: Handles partial lines across TCP boundaries and multiple events per chunk
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Forma Coach

//! # SSE Stream Parser
//!
//! Line-buffering parser for Server-Sent Events shared by both provider
//! adapters. TCP does not align network chunks with SSE event boundaries, so
//! the parser buffers incomplete lines and emits events only when a full
//! `data:` line has arrived; a single chunk may also carry several events,
//! all of which are emitted.

use std::collections::VecDeque;
use std::mem;
use std::pin::Pin;

use bytes::Bytes;
use futures_util::stream::unfold;
use futures_util::{future, Stream, StreamExt};

use super::{ChatStream, StreamChunk};
use crate::errors::AppError;

/// A parsed SSE event from the stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseEvent {
    /// A `data:` payload with the JSON string (prefix stripped)
    Data(String),
    /// The `[DONE]` termination signal (OpenAI convention)
    Done,
}

/// Line-buffering SSE parser.
///
/// Complete lines (terminated by `\n`) are extracted and parsed; a trailing
/// partial line stays buffered for the next `feed` call.
#[derive(Debug, Default)]
pub struct SseLineBuffer {
    buffer: String,
}

impl SseLineBuffer {
    /// Create a new empty line buffer
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed raw bytes from a network chunk, returning any complete events
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<SseEvent> {
        self.buffer.push_str(&String::from_utf8_lossy(bytes));

        let mut events = Vec::new();
        while let Some(newline_pos) = self.buffer.find('\n') {
            let line = self.buffer[..newline_pos].trim_end_matches('\r').to_owned();
            self.buffer = self.buffer[newline_pos + 1..].to_owned();

            if let Some(event) = Self::parse_line(&line) {
                events.push(event);
            }
        }
        events
    }

    /// Flush any remaining buffered content as a final event.
    ///
    /// Called when the byte stream ends with a partial line (no trailing
    /// newline) still in the buffer.
    pub fn flush(&mut self) -> Vec<SseEvent> {
        let remaining = mem::take(&mut self.buffer);
        Self::parse_line(&remaining).into_iter().collect()
    }

    /// Parse a single SSE line into an event, skipping separators and
    /// non-data fields (`event:`, `id:`, `retry:`, comments)
    fn parse_line(line: &str) -> Option<SseEvent> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return None;
        }
        if trimmed == "data: [DONE]" {
            return Some(SseEvent::Done);
        }
        let data = trimmed.strip_prefix("data: ")?;
        if data.trim().is_empty() {
            None
        } else {
            Some(SseEvent::Data(data.to_owned()))
        }
    }
}

/// Internal state for the SSE stream unfold
struct SseStreamState {
    parser: SseLineBuffer,
    pending: VecDeque<Result<StreamChunk, AppError>>,
    stream_ended: bool,
}

impl SseStreamState {
    /// Convert parsed events into pending chunks via the provider's parser
    fn enqueue<F>(&mut self, events: Vec<SseEvent>, parse_data: &F)
    where
        F: Fn(&str) -> Option<Result<StreamChunk, AppError>>,
    {
        for event in events {
            match event {
                SseEvent::Data(json_str) => {
                    if let Some(result) = parse_data(&json_str) {
                        self.pending.push_back(result);
                    }
                }
                SseEvent::Done => {
                    self.pending.push_back(Ok(StreamChunk {
                        delta: String::new(),
                        is_final: true,
                        finish_reason: Some("stop".to_owned()),
                    }));
                }
            }
        }
    }
}

/// Create a properly-buffered SSE chunk stream from a raw byte stream.
///
/// The `parse_data` closure converts provider-specific JSON payloads into
/// [`StreamChunk`] values; returning `None` skips events that carry no output
/// (metadata-only chunks). Empty deltas are filtered unless final.
pub fn create_sse_stream<S, F>(
    byte_stream: S,
    parse_data: F,
    provider_name: &'static str,
) -> ChatStream
where
    S: Stream<Item = Result<Bytes, reqwest::Error>> + Send + 'static,
    F: Fn(&str) -> Option<Result<StreamChunk, AppError>> + Send + 'static,
{
    let state = SseStreamState {
        parser: SseLineBuffer::new(),
        pending: VecDeque::new(),
        stream_ended: false,
    };

    let stream = unfold(
        (
            Box::pin(byte_stream)
                as Pin<Box<dyn Stream<Item = Result<Bytes, reqwest::Error>> + Send>>,
            state,
            parse_data,
        ),
        move |(mut byte_stream, mut state, parse_data)| async move {
            loop {
                // Drain pending events first (multiple SSE events per chunk)
                if let Some(item) = state.pending.pop_front() {
                    return Some((item, (byte_stream, state, parse_data)));
                }

                if state.stream_ended {
                    return None;
                }

                match byte_stream.next().await {
                    Some(Ok(bytes)) => {
                        let events = state.parser.feed(&bytes);
                        state.enqueue(events, &parse_data);
                    }
                    Some(Err(e)) => {
                        state.stream_ended = true;
                        return Some((
                            Err(AppError::provider_error(
                                provider_name,
                                format!("Stream read error: {e}"),
                            )),
                            (byte_stream, state, parse_data),
                        ));
                    }
                    None => {
                        state.stream_ended = true;
                        let events = state.parser.flush();
                        state.enqueue(events, &parse_data);
                        if let Some(item) = state.pending.pop_front() {
                            return Some((item, (byte_stream, state, parse_data)));
                        }
                        return None;
                    }
                }
            }
        },
    );

    let filtered = stream.filter(|result| {
        future::ready(
            result
                .as_ref()
                .map_or(true, |chunk| !chunk.delta.is_empty() || chunk.is_final),
        )
    });

    Box::pin(filtered)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_events_split_across_chunks() {
        let mut buffer = SseLineBuffer::new();
        let first = buffer.feed(b"data: {\"del");
        assert!(first.is_empty());
        let second = buffer.feed(b"ta\":\"hi\"}\n");
        assert_eq!(
            second,
            vec![SseEvent::Data("{\"delta\":\"hi\"}".to_owned())]
        );
    }

    #[test]
    fn test_multiple_events_per_chunk() {
        let mut buffer = SseLineBuffer::new();
        let events = buffer.feed(b"data: {\"a\":1}\n\ndata: {\"b\":2}\n\ndata: [DONE]\n");
        assert_eq!(
            events,
            vec![
                SseEvent::Data("{\"a\":1}".to_owned()),
                SseEvent::Data("{\"b\":2}".to_owned()),
                SseEvent::Done,
            ]
        );
    }

    #[test]
    fn test_flush_partial_line() {
        let mut buffer = SseLineBuffer::new();
        assert!(buffer.feed(b"data: {\"tail\":true}").is_empty());
        assert_eq!(
            buffer.flush(),
            vec![SseEvent::Data("{\"tail\":true}".to_owned())]
        );
    }

    #[test]
    fn test_non_data_fields_ignored() {
        let mut buffer = SseLineBuffer::new();
        let events = buffer.feed(b"event: ping\nid: 7\nretry: 100\n: comment\n");
        assert!(events.is_empty());
    }
}
