// ABOUTME: OpenAI Chat Completions streaming adapter
// ABOUTME: Normalizes OpenAI SSE chunks and the [DONE] sentinel into the uniform protocol
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Practica

//! # OpenAI Provider
//!
//! Wraps the Chat Completions streaming API. The request sets
//! `stream_options.include_usage` so the final data event before `[DONE]`
//! carries usage; the terminal `Done` chunk is emitted at the sentinel.
//!
//! Token counting here is the `ceil(len / 4)` heuristic — OpenAI has no
//! counting endpoint this adapter calls.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use super::sse::{SseEvent, SseEventReader};
use super::{
    approximate_prompt_tokens, error_chunk_for_request_error, error_chunk_for_status,
    CompletionProvider, CompletionStream, LlmMessage, ProviderCapabilities, StreamChunk,
    StreamParams, TokenUsage,
};
use crate::errors::AppResult;

/// Base URL for the OpenAI API
const API_BASE_URL: &str = "https://api.openai.com";

// ============================================================================
// API Request/Response Types
// ============================================================================

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    stream: bool,
    stream_options: StreamOptions,
}

#[derive(Debug, Serialize)]
struct StreamOptions {
    include_usage: bool,
}

#[derive(Debug, Serialize)]
struct WireMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChunkPayload {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
    #[serde(default)]
    usage: Option<WireUsage>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    delta: ChunkDelta,
}

#[derive(Debug, Deserialize)]
struct ChunkDelta {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: String,
}

// ============================================================================
// Provider Implementation
// ============================================================================

/// OpenAI Chat Completions provider
pub struct OpenAiProvider {
    client: Client,
    api_key: String,
    base_url: String,
}

impl OpenAiProvider {
    /// Create a provider with an injected HTTP client
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

    fn build_request(params: &StreamParams) -> ChatRequest {
        let mut messages = Vec::with_capacity(params.messages.len() + 1);
        if !params.system_prompt.is_empty() {
            messages.push(WireMessage {
                role: "system",
                content: params.system_prompt.clone(),
            });
        }
        for message in &params.messages {
            messages.push(WireMessage {
                role: message.role.as_str(),
                content: message.content.clone(),
            });
        }
        ChatRequest {
            model: params.model.clone(),
            messages,
            max_tokens: params.max_tokens,
            stream: true,
            stream_options: StreamOptions {
                include_usage: true,
            },
        }
    }

    fn http_error_chunk(status: u16, body: &str) -> StreamChunk {
        serde_json::from_str::<ErrorResponse>(body).map_or_else(
            |_| error_chunk_for_status("OpenAI", status, body),
            |parsed| error_chunk_for_status("OpenAI", status, &parsed.error.message),
        )
    }
}

#[async_trait]
impl CompletionProvider for OpenAiProvider {
    fn name(&self) -> &'static str {
        "openai"
    }

    fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities::streaming_only()
    }

    #[instrument(skip(self, params), fields(model = %params.model))]
    async fn stream_completion(&self, params: StreamParams) -> CompletionStream {
        debug!("Starting OpenAI streaming completion");

        let request = Self::build_request(&params);
        let url = format!("{}/v1/chat/completions", self.base_url);
        let client = self.client.clone();
        let api_key = self.api_key.clone();

        Box::pin(async_stream::stream! {
            if params.is_aborted() {
                yield StreamChunk::aborted();
                return;
            }

            let response = match client
                .post(&url)
                .bearer_auth(&api_key)
                .json(&request)
                .send()
                .await
            {
                Ok(response) => response,
                Err(e) => {
                    let chunk = if params.is_aborted() {
                        StreamChunk::aborted()
                    } else {
                        error_chunk_for_request_error("OpenAI", &e)
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
                        let chunk = match serde_json::from_str::<ChunkPayload>(&payload) {
                            Ok(chunk) => chunk,
                            Err(e) => {
                                warn!("Skipping unparseable OpenAI chunk: {e}");
                                continue;
                            }
                        };
                        // The include_usage chunk has empty choices
                        if let Some(wire) = chunk.usage {
                            usage = TokenUsage {
                                input_tokens: wire.prompt_tokens,
                                output_tokens: wire.completion_tokens,
                            };
                        }
                        if let Some(choice) = chunk.choices.into_iter().next() {
                            if let Some(content) = choice.delta.content {
                                if !content.is_empty() {
                                    yield StreamChunk::Delta { content };
                                }
                            }
                        }
                    }
                    // [DONE] sentinel, or connection close without one
                    Some(Ok(SseEvent::Done)) | None => {
                        yield StreamChunk::Done { usage };
                        return;
                    }
                    Some(Err(e)) => {
                        let chunk = if params.is_aborted() {
                            StreamChunk::aborted()
                        } else {
                            error_chunk_for_request_error("OpenAI", &e)
                        };
                        yield chunk;
                        return;
                    }
                }
            }
        })
    }

    async fn count_tokens(
        &self,
        _model: &str,
        system_prompt: &str,
        messages: &[LlmMessage],
    ) -> AppResult<u32> {
        Ok(approximate_prompt_tokens(system_prompt, messages))
    }
}
