// ABOUTME: SSE streaming endpoint for session messages
// ABOUTME: Enforces the invitation quota before dispatching to the provider registry
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Practica

//! Session message streaming.
//!
//! One POST carries the participant's message; the response is an SSE stream
//! relaying the uniform chunk protocol (`delta` / `done` / `error`). Errors
//! before the stream starts (ownership, quota, unknown provider) are normal
//! HTTP errors; once streaming begins, failures arrive as terminal `error`
//! events in the stream — never as a broken HTTP response.

use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::routing::post;
use axum::{Json, Router};
use futures_util::stream::Stream;
use serde::Deserialize;
use tokio_stream::StreamExt;
use tracing::warn;
use uuid::Uuid;

use super::telemetry::track_event;
use crate::errors::AppError;
use crate::llm::{LlmMessage, MessageRole, StreamChunk, StreamParams};
use crate::middleware::AuthTier;
use crate::models::SessionStatus;
use crate::quota::Quota;
use crate::server::ServerResources;
use crate::telemetry::EVENT_MESSAGE_SENT;

/// Request to send a message into a session
#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    pub content: String,
    /// Let the provider use its server-side web search tool, where supported
    #[serde(default)]
    pub web_search: bool,
}

/// Create the streaming route group
pub fn routes(resources: Arc<ServerResources>) -> Router {
    Router::new()
        .route("/api/sessions/:session_id/messages", post(send_message))
        .with_state(resources)
}

/// Send a message and stream the assistant's reply
async fn send_message(
    State(resources): State<Arc<ServerResources>>,
    headers: HeaderMap,
    Path(session_id): Path<Uuid>,
    Json(request): Json<SendMessageRequest>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    let context = resources
        .authorizer
        .authorize(&headers, AuthTier::Protected)
        .await?;
    let user = context.require_user()?;

    if request.content.trim().is_empty() {
        return Err(AppError::invalid_input("Message content cannot be empty"));
    }

    let session = resources
        .database
        .sessions()
        .get_session(session_id)
        .await?
        .ok_or_else(|| AppError::not_found("Session"))?;

    if session.user_id != user.id {
        return Err(AppError::forbidden("Not your session"));
    }
    if session.status != SessionStatus::Active {
        return Err(AppError::invalid_input(format!(
            "Session is {}, not ACTIVE",
            session.status.as_str()
        )));
    }

    let scenario = resources
        .database
        .catalog()
        .get_scenario(session.scenario_id)
        .await?
        .ok_or_else(|| AppError::internal("Session references a missing scenario"))?;

    // Quota check runs before the user message persists and before any
    // provider call: an exhausted budget is a typed error, not a stream.
    let invitation = resources
        .database
        .sessions()
        .get_invitation(session.invitation_id)
        .await?
        .ok_or_else(|| AppError::internal("Session references a missing invitation"))?;
    let quota = Quota::parse_str(&invitation.quota)?;
    let used = resources.database.messages().total_usage(session.id).await?;
    let remaining = i64::from(quota.tokens) - used;
    if remaining <= 0 {
        return Err(AppError::quota_exceeded(format!(
            "Token budget of {} exhausted for this session",
            quota.tokens
        )));
    }

    let user_id = user.id;
    resources
        .database
        .messages()
        .add_message(session.id, "user", request.content.trim(), None)
        .await?;

    // Full history including the message just saved
    let history = resources
        .database
        .messages()
        .list_for_session(session.id)
        .await?;
    let llm_messages: Vec<LlmMessage> = history
        .iter()
        .filter_map(|m| match m.role.as_str() {
            "user" => Some(LlmMessage::new(MessageRole::User, &m.content)),
            "assistant" => Some(LlmMessage::new(MessageRole::Assistant, &m.content)),
            _ => None,
        })
        .collect();

    let mut params = StreamParams::new("", &scenario.system_prompt, llm_messages)
        .with_max_tokens(u32::try_from(remaining).unwrap_or(u32::MAX));
    params.web_search = request.web_search;

    // Unknown/unconfigured providers surface here as typed errors, not as
    // silent empty streams.
    let mut llm_stream = resources
        .registry
        .stream_completion(&scenario.model, params)
        .await?;

    let resources_for_stream = resources.clone();
    let sse_stream = async_stream::stream! {
        let mut full_content = String::new();

        while let Some(chunk) = llm_stream.next().await {
            let payload = serde_json::to_string(&chunk)
                .unwrap_or_else(|_| r#"{"type":"error","code":"INTERNAL","message":"serialization failed","retryable":false}"#.to_owned());
            yield Ok(Event::default().data(payload));

            match chunk {
                StreamChunk::Delta { content } => full_content.push_str(&content),
                StreamChunk::Done { usage } => {
                    if let Err(e) = resources_for_stream
                        .database
                        .messages()
                        .add_message(session_id, "assistant", &full_content, Some(usage))
                        .await
                    {
                        warn!("Failed to persist assistant message: {e}");
                    }
                    track_event(
                        &resources_for_stream,
                        EVENT_MESSAGE_SENT,
                        serde_json::json!({
                            "scenarioSlug": scenario.slug,
                            "outputTokens": usage.output_tokens,
                        }),
                        Some(user_id),
                        Some(session_id),
                    )
                    .await;
                    return;
                }
                StreamChunk::Error { .. } => {
                    // Keep whatever text arrived before the failure so the
                    // transcript reflects what the participant saw
                    if !full_content.is_empty() {
                        if let Err(e) = resources_for_stream
                            .database
                            .messages()
                            .add_message(session_id, "assistant", &full_content, None)
                            .await
                        {
                            warn!("Failed to persist partial assistant message: {e}");
                        }
                    }
                    return;
                }
            }
        }
    };

    Ok(Sse::new(sse_stream).keep_alive(KeepAlive::default()))
}
