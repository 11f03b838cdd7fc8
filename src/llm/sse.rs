// ABOUTME: Shared SSE line-buffering reader for LLM streaming responses
// ABOUTME: Handles partial lines across TCP boundaries and multiple events per chunk
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Practica

//! # SSE Stream Reader
//!
//! All three vendor streaming APIs speak Server-Sent Events over HTTP. Two
//! framing hazards are handled once here instead of per adapter:
//!
//! 1. **Multiple events per TCP chunk** — network buffers batch several SSE
//!    events into one `bytes_stream()` item; every event must be surfaced,
//!    not just the first.
//! 2. **Partial payloads across TCP boundaries** — a JSON payload split over
//!    two chunks must be buffered until the terminating newline arrives.
//!
//! The reader yields raw [`SseEvent`]s; each adapter owns the JSON parsing
//! and terminal-chunk logic for its own wire format.

use std::collections::VecDeque;
use std::mem;

use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use std::pin::Pin;

/// A parsed SSE event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseEvent {
    /// A `data:` payload with the prefix stripped
    Data(String),
    /// The `data: [DONE]` termination sentinel (OpenAI convention)
    Done,
}

/// Line-buffering parser over raw SSE bytes
///
/// Feed TCP chunks in; complete events come out. A trailing partial line
/// stays buffered for the next [`feed`](Self::feed). Non-`data:` SSE fields
/// (`event:`, `id:`, `retry:`, comments) are skipped — the vendors carry the
/// event discriminator inside the JSON payload as well.
#[derive(Debug, Default)]
pub struct SseLineBuffer {
    buffer: String,
}

impl SseLineBuffer {
    /// Create an empty buffer
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed raw bytes, returning any complete events
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<SseEvent> {
        self.buffer.push_str(&String::from_utf8_lossy(bytes));

        let mut events = Vec::new();
        while let Some(newline_pos) = self.buffer.find('\n') {
            let line = self.buffer[..newline_pos].trim_end_matches('\r').to_owned();
            self.buffer.drain(..=newline_pos);
            if let Some(event) = Self::parse_line(&line) {
                events.push(event);
            }
        }
        events
    }

    /// Flush a trailing partial line when the byte stream ends
    pub fn flush(&mut self) -> Option<SseEvent> {
        let remaining = mem::take(&mut self.buffer);
        Self::parse_line(&remaining)
    }

    fn parse_line(line: &str) -> Option<SseEvent> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return None;
        }
        if trimmed == "data: [DONE]" {
            return Some(SseEvent::Done);
        }
        let data = trimmed.strip_prefix("data:")?.trim_start();
        if data.is_empty() {
            None
        } else {
            Some(SseEvent::Data(data.to_owned()))
        }
    }
}

/// Async reader turning a reqwest byte stream into a sequence of SSE events
///
/// `next_event` returns `None` when the connection closes, after flushing
/// any buffered partial line. Transport read errors surface as `Some(Err)`.
pub struct SseEventReader {
    bytes: Pin<Box<dyn Stream<Item = Result<Bytes, reqwest::Error>> + Send>>,
    parser: SseLineBuffer,
    pending: VecDeque<SseEvent>,
    ended: bool,
}

impl SseEventReader {
    /// Wrap a response byte stream
    pub fn new<S>(byte_stream: S) -> Self
    where
        S: Stream<Item = Result<Bytes, reqwest::Error>> + Send + 'static,
    {
        Self {
            bytes: Box::pin(byte_stream),
            parser: SseLineBuffer::new(),
            pending: VecDeque::new(),
            ended: false,
        }
    }

    /// Read the next SSE event, buffering across TCP chunk boundaries
    pub async fn next_event(&mut self) -> Option<Result<SseEvent, reqwest::Error>> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                return Some(Ok(event));
            }
            if self.ended {
                return None;
            }
            match self.bytes.next().await {
                Some(Ok(chunk)) => {
                    self.pending.extend(self.parser.feed(&chunk));
                }
                Some(Err(e)) => {
                    self.ended = true;
                    return Some(Err(e));
                }
                None => {
                    self.ended = true;
                    self.pending.extend(self.parser.flush());
                }
            }
        }
    }
}
