// ABOUTME: Google GenAI streaming adapter (streamGenerateContent over SSE)
// ABOUTME: Normalizes candidate parts and usageMetadata into the uniform protocol
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Practica

//! # Google Provider
//!
//! Wraps the Google GenAI REST surface
//! (`POST /v1beta/models/{model}:streamGenerateContent?alt=sse`). The source
//! system carried two Google adapters mid-SDK-migration; this implementation
//! targets only the current GenAI API (see DESIGN.md).
//!
//! Google sends no `[DONE]` sentinel — the terminal `Done` chunk is emitted
//! when the connection closes, carrying the last `usageMetadata` seen.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use super::sse::{SseEvent, SseEventReader};
use super::{
    approximate_prompt_tokens, error_chunk_for_request_error, error_chunk_for_status,
    CompletionProvider, CompletionStream, LlmMessage, MessageRole, ProviderCapabilities,
    StreamChunk, StreamParams, TokenUsage,
};
use crate::errors::AppResult;

/// Base URL for the Google GenAI API
const API_BASE_URL: &str = "https://generativelanguage.googleapis.com";

// ============================================================================
// API Request/Response Types
// ============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    system_instruction: ContentPart,
    contents: Vec<WireContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<WireTool>>,
}

#[derive(Debug, Serialize)]
struct ContentPart {
    parts: Vec<TextPart>,
}

#[derive(Debug, Serialize, Deserialize)]
struct TextPart {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Serialize)]
struct WireContent {
    role: &'static str,
    parts: Vec<TextPart>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    max_output_tokens: u32,
}

#[derive(Debug, Serialize)]
struct WireTool {
    google_search: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChunkPayload {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    usage_metadata: Option<UsageMetadata>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<TextPart>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: u32,
    #[serde(default)]
    candidates_token_count: u32,
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

/// Google GenAI provider
pub struct GoogleProvider {
    client: Client,
    api_key: String,
    base_url: String,
}

impl GoogleProvider {
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

    fn build_request(params: &StreamParams) -> GenerateRequest {
        GenerateRequest {
            system_instruction: ContentPart {
                parts: vec![TextPart {
                    text: params.system_prompt.clone(),
                }],
            },
            contents: params
                .messages
                .iter()
                .map(|message| WireContent {
                    // Google calls the assistant role "model"
                    role: match message.role {
                        MessageRole::User => "user",
                        MessageRole::Assistant => "model",
                    },
                    parts: vec![TextPart {
                        text: message.content.clone(),
                    }],
                })
                .collect(),
            generation_config: params.max_tokens.map(|max_output_tokens| GenerationConfig {
                max_output_tokens,
            }),
            tools: params.web_search.then(|| {
                vec![WireTool {
                    google_search: serde_json::Map::new(),
                }]
            }),
        }
    }

    fn http_error_chunk(status: u16, body: &str) -> StreamChunk {
        serde_json::from_str::<ErrorResponse>(body).map_or_else(
            |_| error_chunk_for_status("Google", status, body),
            |parsed| error_chunk_for_status("Google", status, &parsed.error.message),
        )
    }
}

#[async_trait]
impl CompletionProvider for GoogleProvider {
    fn name(&self) -> &'static str {
        "google"
    }

    fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities::streaming_only() | ProviderCapabilities::WEB_SEARCH
    }

    #[instrument(skip(self, params), fields(model = %params.model))]
    async fn stream_completion(&self, params: StreamParams) -> CompletionStream {
        debug!("Starting Google streaming completion");

        let request = Self::build_request(&params);
        let url = format!(
            "{}/v1beta/models/{}:streamGenerateContent?alt=sse",
            self.base_url, params.model
        );
        let client = self.client.clone();
        let api_key = self.api_key.clone();

        Box::pin(async_stream::stream! {
            if params.is_aborted() {
                yield StreamChunk::aborted();
                return;
            }

            let response = match client
                .post(&url)
                .header("x-goog-api-key", &api_key)
                .json(&request)
                .send()
                .await
            {
                Ok(response) => response,
                Err(e) => {
                    let chunk = if params.is_aborted() {
                        StreamChunk::aborted()
                    } else {
                        error_chunk_for_request_error("Google", &e)
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
                                warn!("Skipping unparseable Google chunk: {e}");
                                continue;
                            }
                        };
                        if let Some(metadata) = chunk.usage_metadata {
                            usage = TokenUsage {
                                input_tokens: metadata.prompt_token_count,
                                output_tokens: metadata.candidates_token_count,
                            };
                        }
                        for candidate in chunk.candidates {
                            let Some(content) = candidate.content else {
                                continue;
                            };
                            for part in content.parts {
                                if !part.text.is_empty() {
                                    yield StreamChunk::Delta { content: part.text };
                                }
                            }
                        }
                    }
                    // No [DONE] convention; connection close is completion
                    Some(Ok(SseEvent::Done)) | None => {
                        yield StreamChunk::Done { usage };
                        return;
                    }
                    Some(Err(e)) => {
                        let chunk = if params.is_aborted() {
                            StreamChunk::aborted()
                        } else {
                            error_chunk_for_request_error("Google", &e)
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
