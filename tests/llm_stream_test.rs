// ABOUTME: Integration tests for the provider adapters' streaming contract
// ABOUTME: Abort semantics, terminal-chunk discipline, and token estimation
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Practica
#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![allow(missing_docs)]

//! The contract under test: every adapter produces zero or more deltas and
//! exactly one terminal chunk, a fired abort signal yields the uniform
//! `ABORTED` terminal, and nothing ever follows a terminal chunk.

use practica_server::llm::{
    AbortSignal, AnthropicProvider, CompletionProvider, GoogleProvider, LlmMessage,
    OpenAiProvider, StreamChunk, StreamParams, ERROR_CODE_ABORTED,
};
use reqwest::Client;
use tokio_stream::StreamExt;

/// A base URL nothing listens on: connection attempts fail immediately
const DEAD_BASE_URL: &str = "http://127.0.0.1:9";

fn all_providers() -> Vec<Box<dyn CompletionProvider>> {
    let client = Client::new();
    vec![
        Box::new(
            AnthropicProvider::new(client.clone(), "test-key".to_owned())
                .with_base_url(DEAD_BASE_URL),
        ),
        Box::new(
            OpenAiProvider::new(client.clone(), "test-key".to_owned())
                .with_base_url(DEAD_BASE_URL),
        ),
        Box::new(GoogleProvider::new(client, "test-key".to_owned()).with_base_url(DEAD_BASE_URL)),
    ]
}

fn params_with_abort(abort: &AbortSignal) -> StreamParams {
    StreamParams::new("test-model", "system", vec![LlmMessage::user("hello")])
        .with_abort(abort.clone())
}

async fn collect(mut stream: practica_server::llm::CompletionStream) -> Vec<StreamChunk> {
    let mut chunks = Vec::new();
    while let Some(chunk) = stream.next().await {
        chunks.push(chunk);
    }
    chunks
}

#[tokio::test]
async fn test_aborted_signal_yields_single_aborted_terminal_for_all_providers() {
    for provider in all_providers() {
        let abort = AbortSignal::new();
        abort.abort();

        let stream = provider
            .stream_completion(params_with_abort(&abort))
            .await;
        let chunks = collect(stream).await;

        assert_eq!(
            chunks.len(),
            1,
            "{}: nothing may follow the terminal chunk",
            provider.name()
        );
        match &chunks[0] {
            StreamChunk::Error {
                code, retryable, ..
            } => {
                assert_eq!(code, ERROR_CODE_ABORTED, "{}", provider.name());
                assert!(!retryable, "{}: ABORTED is never retryable", provider.name());
            }
            other => panic!("{}: expected error terminal, got {other:?}", provider.name()),
        }
    }
}

#[tokio::test]
async fn test_connection_failure_is_a_terminal_error_chunk_not_an_exception() {
    for provider in all_providers() {
        let params = StreamParams::new("test-model", "system", vec![LlmMessage::user("hello")]);
        let stream = provider.stream_completion(params).await;
        let chunks = collect(stream).await;

        assert_eq!(chunks.len(), 1, "{}", provider.name());
        match &chunks[0] {
            StreamChunk::Error { code, .. } => {
                assert_eq!(code, "NETWORK", "{}", provider.name());
            }
            other => panic!("{}: expected error terminal, got {other:?}", provider.name()),
        }
    }
}

#[tokio::test]
async fn test_openai_and_google_token_estimates_are_ceil_len_over_4() {
    let client = Client::new();
    let openai = OpenAiProvider::new(client.clone(), "k".to_owned());
    let google = GoogleProvider::new(client, "k".to_owned());

    // 10 chars -> ceil(10/4) = 3
    let text = "aaaaaaaaaa";
    for (name, count) in [
        ("openai", openai.count_tokens("m", "", &[LlmMessage::user(text)]).await.unwrap()),
        ("google", google.count_tokens("m", "", &[LlmMessage::user(text)]).await.unwrap()),
    ] {
        assert_eq!(count, 3, "{name}");
    }

    // System prompt and each message round up independently:
    // ceil(5/4) + ceil(2/4) = 2 + 1
    let count = openai
        .count_tokens("m", "12345", &[LlmMessage::user("ab")])
        .await
        .unwrap();
    assert_eq!(count, 3);
}

#[tokio::test]
async fn test_abort_signal_fires_after_construction() {
    // The signal is observed per iteration, so firing it before the stream
    // is first polled still produces the ABORTED terminal.
    let abort = AbortSignal::new();
    let provider =
        AnthropicProvider::new(Client::new(), "test-key".to_owned()).with_base_url(DEAD_BASE_URL);

    let stream = provider
        .stream_completion(params_with_abort(&abort))
        .await;
    abort.abort();
    let chunks = collect(stream).await;

    assert_eq!(chunks.len(), 1);
    assert!(matches!(
        &chunks[0],
        StreamChunk::Error { code, .. } if code == ERROR_CODE_ABORTED
    ));
}
