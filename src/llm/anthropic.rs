// ABOUTME: Anthropic Messages API streaming adapter
// ABOUTME: Normalizes Anthropic SSE events into the uniform chunk protocol
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Practica

//! # Anthropic Provider
//!
//! Wraps the Anthropic Messages API (`POST /v1/messages` with `stream: true`)
//! into the uniform chunk sequence. Usage accounting accumulates across
//! `message_start` (input tokens) and `message_delta` (output tokens) events
//! and is reported on the terminal `Done` chunk at `message_stop`.
//!
//! This is the one provider with a true token-counting endpoint
//! (`POST /v1/messages/count_tokens`).

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use super::sse::{SseEvent, SseEventReader};
use super::{
    error_chunk_for_request_error, error_chunk_for_status, CompletionProvider, CompletionStream,
    LlmMessage, ProviderCapabilities, StreamChunk, StreamParams, TokenUsage,
};
use crate::errors::{AppError, AppResult};

/// Base URL for the Anthropic API
const API_BASE_URL: &str = "https://api.anthropic.com";

/// Pinned API version header value
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Anthropic requires `max_tokens`; this is the cap applied when the caller
/// does not set one
const DEFAULT_MAX_TOKENS: u32 = 1024;

/// Server-side web search tool identifier
const WEB_SEARCH_TOOL_TYPE: &str = "web_search_20250305";

// ============================================================================
// API Request/Response Types
// ============================================================================

#[derive(Debug, Serialize)]
struct MessagesRequest {
    model: String,
    max_tokens: u32,
    system: String,
    messages: Vec<WireMessage>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<WireTool>>,
}

#[derive(Debug, Serialize)]
struct WireMessage {
    role: &'static str,
    content: String,
}

impl From<&LlmMessage> for WireMessage {
    fn from(msg: &LlmMessage) -> Self {
        Self {
            role: msg.role.as_str(),
            content: msg.content.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
struct WireTool {
    #[serde(rename = "type")]
    tool_type: &'static str,
    name: &'static str,
}

#[derive(Debug, Serialize)]
struct CountTokensRequest {
    model: String,
    system: String,
    messages: Vec<WireMessage>,
}

#[derive(Debug, Deserialize)]
struct CountTokensResponse {
    input_tokens: u32,
}

/// Streaming events, discriminated by the `type` field of each data payload
#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum StreamEvent {
    #[serde(rename = "message_start")]
    MessageStart { message: MessageStart },
    #[serde(rename = "content_block_delta")]
    ContentBlockDelta { delta: ContentDelta },
    #[serde(rename = "message_delta")]
    MessageDelta {
        #[serde(default)]
        usage: Option<UsageDelta>,
    },
    #[serde(rename = "message_stop")]
    MessageStop,
    #[serde(rename = "error")]
    Error { error: ErrorDetail },
    /// `ping`, `content_block_start`, `content_block_stop` — no output
    #[serde(other)]
    Ignored,
}

#[derive(Debug, Deserialize)]
struct MessageStart {
    #[serde(default)]
    usage: Option<StartUsage>,
}

#[derive(Debug, Deserialize)]
struct StartUsage {
    #[serde(default)]
    input_tokens: u32,
    #[serde(default)]
    output_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ContentDelta {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UsageDelta {
    #[serde(default)]
    output_tokens: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    #[serde(rename = "type")]
    kind: String,
    message: String,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

// ============================================================================
// Provider Implementation
// ============================================================================

/// Anthropic Messages API provider
pub struct AnthropicProvider {
    client: Client,
    api_key: String,
    base_url: String,
}

impl AnthropicProvider {
    /// Create a provider with an injected HTTP client
    ///
    /// Timeouts belong to the client configuration, not this layer.
    #[must_use]
    pub fn new(client: Client, api_key: String) -> Self {
        Self {
            client,
            api_key,
            base_url: API_BASE_URL.to_owned(),
        }
    }

    /// Override the base URL (tests point this at a local fixture server)
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn build_request(params: &StreamParams) -> MessagesRequest {
        MessagesRequest {
            model: params.model.clone(),
            max_tokens: params.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            system: params.system_prompt.clone(),
            messages: params.messages.iter().map(WireMessage::from).collect(),
            stream: true,
            tools: params.web_search.then(|| {
                vec![WireTool {
                    tool_type: WEB_SEARCH_TOOL_TYPE,
                    name: "web_search",
                }]
            }),
        }
    }

    /// Map an in-stream `error` event to a terminal chunk
    ///
    /// Anthropic reports overload as the dedicated `overloaded_error` type
    /// (HTTP 529 on non-streaming calls); it is transient, as are rate
    /// limits and internal API errors.
    fn error_event_chunk(error: &ErrorDetail) -> StreamChunk {
        let (code, retryable) = match error.kind.as_str() {
            "overloaded_error" => ("OVERLOADED", true),
            "rate_limit_error" => ("RATE_LIMITED", true),
            "api_error" => ("UPSTREAM_UNAVAILABLE", true),
            "authentication_error" | "permission_error" => ("AUTH_FAILED", false),
            _ => ("BAD_REQUEST", false),
        };
        StreamChunk::Error {
            code: code.to_owned(),
            message: format!("Anthropic: {}", error.message),
            retryable,
        }
    }

    fn http_error_chunk(status: u16, body: &str) -> StreamChunk {
        // Prefer the structured error message when the body parses
        serde_json::from_str::<ErrorResponse>(body).map_or_else(
            |_| error_chunk_for_status("Anthropic", status, body),
            |parsed| error_chunk_for_status("Anthropic", status, &parsed.error.message),
        )
    }
}

#[async_trait]
impl CompletionProvider for AnthropicProvider {
    fn name(&self) -> &'static str {
        "anthropic"
    }

    fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities::streaming_only()
            | ProviderCapabilities::TOKEN_COUNTING
            | ProviderCapabilities::WEB_SEARCH
    }

    #[instrument(skip(self, params), fields(model = %params.model))]
    async fn stream_completion(&self, params: StreamParams) -> CompletionStream {
        debug!("Starting Anthropic streaming completion");

        let request = Self::build_request(&params);
        let url = format!("{}/v1/messages", self.base_url);
        let client = self.client.clone();
        let api_key = self.api_key.clone();

        Box::pin(async_stream::stream! {
            if params.is_aborted() {
                yield StreamChunk::aborted();
                return;
            }

            let response = match client
                .post(&url)
                .header("x-api-key", &api_key)
                .header("anthropic-version", ANTHROPIC_VERSION)
                .json(&request)
                .send()
                .await
            {
                Ok(response) => response,
                Err(e) => {
                    let chunk = if params.is_aborted() {
                        StreamChunk::aborted()
                    } else {
                        error_chunk_for_request_error("Anthropic", &e)
                    };
                    yield chunk;
                    return;
                }
            };

            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                yield Self::http_error_chunk(status.as_u16(), &body);
                return;
            }

            let mut reader = SseEventReader::new(response.bytes_stream());
            let mut usage = TokenUsage::default();

            loop {
                if params.is_aborted() {
                    yield StreamChunk::aborted();
                    return;
                }

                match reader.next_event().await {
                    Some(Ok(SseEvent::Data(payload))) => {
                        let event = match serde_json::from_str::<StreamEvent>(&payload) {
                            Ok(event) => event,
                            Err(e) => {
                                warn!("Skipping unparseable Anthropic event: {e}");
                                continue;
                            }
                        };
                        match event {
                            StreamEvent::MessageStart { message } => {
                                if let Some(start) = message.usage {
                                    usage.input_tokens = start.input_tokens;
                                    usage.output_tokens = start.output_tokens;
                                }
                            }
                            StreamEvent::ContentBlockDelta { delta } => {
                                if delta.kind == "text_delta" {
                                    if let Some(text) = delta.text {
                                        if !text.is_empty() {
                                            yield StreamChunk::Delta { content: text };
                                        }
                                    }
                                }
                            }
                            StreamEvent::MessageDelta { usage: delta_usage } => {
                                if let Some(output) =
                                    delta_usage.and_then(|u| u.output_tokens)
                                {
                                    usage.output_tokens = output;
                                }
                            }
                            StreamEvent::MessageStop => {
                                yield StreamChunk::Done { usage };
                                return;
                            }
                            StreamEvent::Error { error } => {
                                yield Self::error_event_chunk(&error);
                                return;
                            }
                            StreamEvent::Ignored => {}
                        }
                    }
                    // Anthropic does not send [DONE]; treat it as end-of-stream
                    Some(Ok(SseEvent::Done)) | None => {
                        yield StreamChunk::Done { usage };
                        return;
                    }
                    Some(Err(e)) => {
                        let chunk = if params.is_aborted() {
                            StreamChunk::aborted()
                        } else {
                            error_chunk_for_request_error("Anthropic", &e)
                        };
                        yield chunk;
                        return;
                    }
                }
            }
        })
    }

    #[instrument(skip(self, system_prompt, messages))]
    async fn count_tokens(
        &self,
        model: &str,
        system_prompt: &str,
        messages: &[LlmMessage],
    ) -> AppResult<u32> {
        let request = CountTokensRequest {
            model: model.to_owned(),
            system: system_prompt.to_owned(),
            messages: messages.iter().map(WireMessage::from).collect(),
        };

        let response = self
            .client
            .post(format!("{}/v1/messages/count_tokens", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&request)
            .send()
            .await
            .map_err(|e| AppError::external_service("Anthropic", format!("count_tokens: {e}")))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| AppError::external_service("Anthropic", format!("count_tokens: {e}")))?;

        if !status.is_success() {
            return Err(AppError::external_service(
                "Anthropic",
                format!("count_tokens returned {status}: {body}"),
            ));
        }

        let parsed: CountTokensResponse = serde_json::from_str(&body).map_err(|e| {
            AppError::external_service("Anthropic", format!("count_tokens parse: {e}"))
        })?;

        Ok(parsed.input_tokens)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stream_event_parsing() {
        let delta: StreamEvent = serde_json::from_str(
            r#"{"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"Hi"}}"#,
        )
        .unwrap();
        assert!(matches!(
            delta,
            StreamEvent::ContentBlockDelta { delta } if delta.text.as_deref() == Some("Hi")
        ));

        let stop: StreamEvent = serde_json::from_str(r#"{"type":"message_stop"}"#).unwrap();
        assert!(matches!(stop, StreamEvent::MessageStop));

        let ping: StreamEvent = serde_json::from_str(r#"{"type":"ping"}"#).unwrap();
        assert!(matches!(ping, StreamEvent::Ignored));
    }

    #[test]
    fn test_overloaded_error_is_retryable() {
        let chunk = AnthropicProvider::error_event_chunk(&ErrorDetail {
            kind: "overloaded_error".to_owned(),
            message: "Overloaded".to_owned(),
        });
        assert!(matches!(
            chunk,
            StreamChunk::Error { code, retryable, .. } if code == "OVERLOADED" && retryable
        ));
    }

    #[test]
    fn test_invalid_request_error_is_permanent() {
        let chunk = AnthropicProvider::error_event_chunk(&ErrorDetail {
            kind: "invalid_request_error".to_owned(),
            message: "bad field".to_owned(),
        });
        assert!(matches!(
            chunk,
            StreamChunk::Error { retryable, .. } if !retryable
        ));
    }

    #[test]
    fn test_web_search_tool_attached() {
        let params = StreamParams {
            web_search: true,
            ..StreamParams::new("claude-sonnet-4-20250514", "sys", vec![])
        };
        let request = AnthropicProvider::build_request(&params);
        assert!(request.tools.is_some());

        let plain = AnthropicProvider::build_request(&StreamParams::new("m", "s", vec![]));
        assert!(plain.tools.is_none());
    }
}
