// ABOUTME: LLM provider abstraction layer with a uniform streaming chunk protocol
// ABOUTME: Defines the provider contract, chunk sum type, abort signal, and failure classification
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Practica

//! # LLM Provider Service Provider Interface
//!
//! Every vendor adapter normalizes its streaming API into the same contract:
//! given [`StreamParams`], produce a lazy, finite, non-restartable sequence
//! of [`StreamChunk`] — zero or more `Delta` chunks in generation order,
//! then exactly one terminal `Done` or `Error`. Nothing follows the terminal
//! chunk.
//!
//! Streaming failures are DATA, not exceptions: once a stream exists, every
//! transport problem (including cancellation) arrives as a terminal `Error`
//! chunk, so the consumer always sees a well-formed terminal event.
//!
//! ## Example
//!
//! ```rust,no_run
//! use practica_server::llm::{CompletionProvider, LlmMessage, StreamParams};
//! use tokio_stream::StreamExt;
//!
//! async fn example(provider: &dyn CompletionProvider) {
//!     let params = StreamParams::new(
//!         "claude-sonnet-4-20250514",
//!         "You are a supportive coach.",
//!         vec![LlmMessage::user("I froze up in my last interview.")],
//!     );
//!     let mut stream = provider.stream_completion(params).await;
//!     while let Some(_chunk) = stream.next().await {
//!         // ... forward deltas, stop on the terminal chunk
//!     }
//! }
//! ```

mod anthropic;
mod google;
mod openai;
pub mod registry;
mod sse;

pub use anthropic::AnthropicProvider;
pub use google::GoogleProvider;
pub use openai::OpenAiProvider;
pub use registry::{parse_model, ParsedModel, ProviderRegistry};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio_stream::Stream;

use crate::errors::AppResult;

// ============================================================================
// Capability Flags
// ============================================================================

bitflags::bitflags! {
    /// Provider capability flags
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
    pub struct ProviderCapabilities: u8 {
        /// Provider supports streaming responses
        const STREAMING = 0b0000_0001;
        /// Provider exposes a true token-counting endpoint
        const TOKEN_COUNTING = 0b0000_0010;
        /// Provider supports a server-side web search tool
        const WEB_SEARCH = 0b0000_0100;
        /// Provider supports system prompts
        const SYSTEM_PROMPTS = 0b0000_1000;
    }
}

impl ProviderCapabilities {
    /// Baseline capabilities every adapter here provides
    #[must_use]
    pub const fn streaming_only() -> Self {
        Self::STREAMING.union(Self::SYSTEM_PROMPTS)
    }
}

// ============================================================================
// Message Types
// ============================================================================

/// Role of a conversation message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// Participant input
    User,
    /// Model response
    Assistant,
}

impl MessageRole {
    /// String form used in vendor payloads
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

/// A single conversation message, constructed per request and never mutated
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmMessage {
    pub role: MessageRole,
    pub content: String,
}

impl LlmMessage {
    /// Create a message with an explicit role
    #[must_use]
    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    /// Create a user message
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(MessageRole::User, content)
    }

    /// Create an assistant message
    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(MessageRole::Assistant, content)
    }
}

// ============================================================================
// Cancellation
// ============================================================================

/// Cloneable cancellation handle for in-flight streams
///
/// Adapters check the signal at every stream loop iteration and in their
/// error paths. Once it fires, the adapter stops consuming upstream and
/// emits exactly one terminal `ABORTED` error chunk — uniformly across
/// providers, so consumers can test cancellation without caring which
/// vendor served the stream.
#[derive(Debug, Clone, Default)]
pub struct AbortSignal {
    flag: Arc<AtomicBool>,
}

impl AbortSignal {
    /// Create a fresh, unfired signal
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fire the signal; idempotent
    pub fn abort(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    /// Whether the signal has fired
    #[must_use]
    pub fn is_aborted(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}

// ============================================================================
// Request / Chunk Types
// ============================================================================

/// Input to exactly one adapter call; not persisted
#[derive(Debug, Clone)]
pub struct StreamParams {
    /// Vendor-specific model identifier (already stripped of any
    /// `provider:` prefix by the registry)
    pub model: String,
    /// System prompt injected ahead of the conversation
    pub system_prompt: String,
    /// Ordered conversation history
    pub messages: Vec<LlmMessage>,
    /// Maximum tokens to generate, if capped
    pub max_tokens: Option<u32>,
    /// Cancellation signal, if the caller wants mid-stream aborts
    pub abort: Option<AbortSignal>,
    /// Enable the provider's server-side web search tool where supported
    pub web_search: bool,
}

impl StreamParams {
    /// Create params with the required fields
    #[must_use]
    pub fn new(
        model: impl Into<String>,
        system_prompt: impl Into<String>,
        messages: Vec<LlmMessage>,
    ) -> Self {
        Self {
            model: model.into(),
            system_prompt: system_prompt.into(),
            messages,
            max_tokens: None,
            abort: None,
            web_search: false,
        }
    }

    /// Cap the generated tokens
    #[must_use]
    pub const fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Attach a cancellation signal
    #[must_use]
    pub fn with_abort(mut self, abort: AbortSignal) -> Self {
        self.abort = Some(abort);
        self
    }

    /// Whether the attached signal (if any) has fired
    #[must_use]
    pub fn is_aborted(&self) -> bool {
        self.abort.as_ref().is_some_and(AbortSignal::is_aborted)
    }
}

/// Token usage reported by a completed stream
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

impl TokenUsage {
    /// Total tokens charged against the session quota
    #[must_use]
    pub const fn total(self) -> u32 {
        self.input_tokens.saturating_add(self.output_tokens)
    }
}

/// One unit of a provider's incremental response
///
/// A stream is zero or more `Delta` chunks followed by exactly one terminal
/// `Done` or `Error`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamChunk {
    /// Incremental text
    Delta { content: String },
    /// Successful completion with usage accounting
    Done { usage: TokenUsage },
    /// Terminal failure, classified for retry handling
    Error {
        code: String,
        message: String,
        retryable: bool,
    },
}

impl StreamChunk {
    /// The uniform cancellation terminal
    #[must_use]
    pub fn aborted() -> Self {
        Self::Error {
            code: ERROR_CODE_ABORTED.to_owned(),
            message: "Stream aborted by caller".to_owned(),
            retryable: false,
        }
    }

    /// Whether this chunk terminates the stream
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Done { .. } | Self::Error { .. })
    }
}

/// Error code emitted when a cancellation signal fires mid-stream
pub const ERROR_CODE_ABORTED: &str = "ABORTED";

/// Stream type produced by every adapter
pub type CompletionStream = Pin<Box<dyn Stream<Item = StreamChunk> + Send>>;

// ============================================================================
// Failure Classification
// ============================================================================

/// Classify an HTTP status from a vendor into an error code and retryability
///
/// Retryable statuses are rate limiting and transient server failure: 429,
/// 500, 502, 503, and Anthropic's 529 "overloaded". Everything else is
/// permanent.
#[must_use]
pub fn classify_status(status: u16) -> (&'static str, bool) {
    match status {
        429 => ("RATE_LIMITED", true),
        529 => ("OVERLOADED", true),
        500 | 502 | 503 => ("UPSTREAM_UNAVAILABLE", true),
        401 | 403 => ("AUTH_FAILED", false),
        400 | 404 | 422 => ("BAD_REQUEST", false),
        _ => ("UPSTREAM_ERROR", false),
    }
}

/// Build a terminal error chunk from a vendor HTTP status and body
#[must_use]
pub fn error_chunk_for_status(provider: &str, status: u16, body: &str) -> StreamChunk {
    let (code, retryable) = classify_status(status);
    let detail: String = body.chars().take(200).collect();
    StreamChunk::Error {
        code: code.to_owned(),
        message: format!("{provider} returned {status}: {detail}"),
        retryable,
    }
}

/// Build a terminal error chunk from a reqwest transport error
///
/// Connection and timeout failures are transient; everything else is not.
#[must_use]
pub fn error_chunk_for_request_error(provider: &str, error: &reqwest::Error) -> StreamChunk {
    let retryable = error.is_connect() || error.is_timeout();
    StreamChunk::Error {
        code: "NETWORK".to_owned(),
        message: format!("{provider} request failed: {error}"),
        retryable,
    }
}

// ============================================================================
// Token Estimation
// ============================================================================

/// Characters-per-token heuristic used by providers without a counting
/// endpoint. Intentionally approximate; never billing-accurate.
const CHARS_PER_TOKEN: usize = 4;

/// Estimate tokens for a piece of text: `ceil(len / 4)`
#[must_use]
pub fn approximate_token_count(text: &str) -> u32 {
    u32::try_from(text.chars().count().div_ceil(CHARS_PER_TOKEN)).unwrap_or(u32::MAX)
}

/// Estimate tokens for a whole prompt (system + messages)
#[must_use]
pub fn approximate_prompt_tokens(system_prompt: &str, messages: &[LlmMessage]) -> u32 {
    let mut total = approximate_token_count(system_prompt);
    for message in messages {
        total = total.saturating_add(approximate_token_count(&message.content));
    }
    total
}

// ============================================================================
// Provider Trait
// ============================================================================

/// Contract every vendor adapter implements
///
/// `stream_completion` is infallible at the call boundary: setup failures
/// (bad request, unreachable host) become the stream's terminal `Error`
/// chunk. `count_tokens` is a plain fallible call — it happens before any
/// stream exists, so its errors propagate normally.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Unique provider identifier (`"anthropic"`, `"openai"`, `"google"`)
    fn name(&self) -> &'static str;

    /// Provider capabilities
    fn capabilities(&self) -> ProviderCapabilities;

    /// Produce the chunk sequence for one completion request
    async fn stream_completion(&self, params: StreamParams) -> CompletionStream;

    /// Best-effort token count for a prompt
    ///
    /// Only Anthropic calls a true counting endpoint; the others use the
    /// `ceil(len / 4)` heuristic.
    ///
    /// # Errors
    ///
    /// Returns an error if a counting endpoint call fails.
    async fn count_tokens(
        &self,
        model: &str,
        system_prompt: &str,
        messages: &[LlmMessage],
    ) -> AppResult<u32>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_status_retryable() {
        for status in [429, 500, 502, 503, 529] {
            let (_, retryable) = classify_status(status);
            assert!(retryable, "status {status} should be retryable");
        }
    }

    #[test]
    fn test_classify_status_permanent() {
        for status in [400, 401, 403, 404, 422] {
            let (_, retryable) = classify_status(status);
            assert!(!retryable, "status {status} should not be retryable");
        }
    }

    #[test]
    fn test_approximate_token_count_rounds_up() {
        assert_eq!(approximate_token_count(""), 0);
        assert_eq!(approximate_token_count("abc"), 1);
        assert_eq!(approximate_token_count("abcd"), 1);
        assert_eq!(approximate_token_count("abcde"), 2);
        assert_eq!(approximate_token_count(&"x".repeat(100)), 25);
    }

    #[test]
    fn test_abort_signal_observed_by_clones() {
        let signal = AbortSignal::new();
        let clone = signal.clone();
        assert!(!clone.is_aborted());
        signal.abort();
        assert!(clone.is_aborted());
    }

    #[test]
    fn test_chunk_serialization_is_tagged() {
        let chunk = StreamChunk::Delta {
            content: "hi".to_owned(),
        };
        let json = serde_json::to_value(&chunk).unwrap();
        assert_eq!(json["type"], "delta");

        let done = StreamChunk::Done {
            usage: TokenUsage {
                input_tokens: 10,
                output_tokens: 5,
            },
        };
        let json = serde_json::to_value(&done).unwrap();
        assert_eq!(json["type"], "done");
        assert_eq!(json["usage"]["output_tokens"], 5);
    }

    #[test]
    fn test_aborted_chunk_shape() {
        let chunk = StreamChunk::aborted();
        assert!(chunk.is_terminal());
        assert!(matches!(
            chunk,
            StreamChunk::Error { code, retryable, .. }
                if code == ERROR_CODE_ABORTED && !retryable
        ));
    }
}
