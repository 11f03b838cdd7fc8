// ABOUTME: Invitation and session route handlers
// ABOUTME: Invitation issue/claim, staff quick start, session listing, observation notes
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Practica

//! Session lifecycle routes.
//!
//! `start_new` is the staff shortcut that bypasses the invitation-claim
//! flow: scenario and preset are validated (NOT_FOUND) before anything is
//! written, then the self-claimed invitation and its ACTIVE session commit
//! in one transaction.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::telemetry::track_event;
use crate::auth::SESSION_COOKIE;
use crate::crypto::tokens::{generate_invitation_token, hash_token};
use crate::errors::AppError;
use crate::middleware::AuthTier;
use crate::models::{Invitation, SessionStatus, SessionSummary, User};
use crate::quota::Quota;
use crate::telemetry::{EVENT_CONVERSATION_COMPLETED, EVENT_CONVERSATION_STARTED};
use crate::server::ServerResources;

/// Default invitation lifetime when the creator does not pick one
const DEFAULT_INVITATION_DAYS: i64 = 14;

/// Self-claimed quick-start invitations get a 1-year expiry
const QUICK_START_DAYS: i64 = 365;

// ============================================================================
// Request/Response Types
// ============================================================================

/// Request to issue an invitation
#[derive(Debug, Deserialize)]
pub struct CreateInvitationRequest {
    pub scenario_id: Uuid,
    pub quota_preset_id: Uuid,
    /// Days until expiry (defaults to 14)
    #[serde(default)]
    pub expires_in_days: Option<i64>,
}

/// Response for invitation creation — the raw token appears here exactly
/// once and is never retrievable again
#[derive(Debug, Serialize, Deserialize)]
pub struct InvitationResponse {
    pub invitation_id: Uuid,
    pub token: String,
    pub scenario_id: Uuid,
    pub quota: Quota,
    pub expires_at: DateTime<Utc>,
}

/// Request to claim an invitation
#[derive(Debug, Deserialize)]
pub struct ClaimRequest {
    pub token: String,
}

/// Request for the staff quick start
#[derive(Debug, Deserialize)]
pub struct StartNewRequest {
    pub scenario_id: Uuid,
    pub quota_preset_id: Uuid,
}

/// Session detail returned after claim/start and on lookup
#[derive(Debug, Serialize, Deserialize)]
pub struct SessionResponse {
    pub id: Uuid,
    pub scenario_id: Uuid,
    pub scenario_slug: String,
    pub scenario_title: String,
    pub status: SessionStatus,
    pub quota: Quota,
    pub started_at: DateTime<Utc>,
}

/// Listing response for `list_mine`
#[derive(Debug, Serialize, Deserialize)]
pub struct SessionListResponse {
    pub sessions: Vec<SessionSummaryResponse>,
}

/// One row of `list_mine`
#[derive(Debug, Serialize, Deserialize)]
pub struct SessionSummaryResponse {
    pub id: Uuid,
    pub scenario_slug: String,
    pub scenario_title: String,
    pub status: SessionStatus,
    pub message_count: i64,
    pub started_at: DateTime<Utc>,
}

impl From<SessionSummary> for SessionSummaryResponse {
    fn from(summary: SessionSummary) -> Self {
        Self {
            id: summary.id,
            scenario_slug: summary.scenario_slug,
            scenario_title: summary.scenario_title,
            status: summary.status,
            message_count: summary.message_count,
            started_at: summary.started_at,
        }
    }
}

/// Request to change a session's status
#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: SessionStatus,
}

/// Request to attach an observation note
#[derive(Debug, Deserialize)]
pub struct CreateNoteRequest {
    pub body: String,
}

// ============================================================================
// Routes
// ============================================================================

/// Create the session route group
pub fn routes(resources: Arc<ServerResources>) -> Router {
    Router::new()
        .route("/api/invitations", post(create_invitation))
        .route("/api/invitations/claim", post(claim_invitation))
        .route("/api/sessions/start", post(start_new))
        .route("/api/sessions", get(list_mine))
        .route("/api/sessions/:session_id", get(get_session))
        .route("/api/sessions/:session_id/status", put(update_status))
        .route(
            "/api/sessions/:session_id/notes",
            post(create_note).get(list_notes),
        )
        .with_state(resources)
}

/// Issue an invitation (staff)
async fn create_invitation(
    State(resources): State<Arc<ServerResources>>,
    headers: HeaderMap,
    Json(request): Json<CreateInvitationRequest>,
) -> Result<Response, AppError> {
    let context = resources
        .authorizer
        .authorize(&headers, AuthTier::Staff)
        .await?;
    let staff = context.require_user()?;

    let scenario = resources
        .database
        .catalog()
        .get_scenario(request.scenario_id)
        .await?
        .ok_or_else(|| AppError::not_found("Scenario"))?;

    let preset = resources
        .database
        .catalog()
        .get_quota_preset(request.quota_preset_id)
        .await?
        .ok_or_else(|| AppError::not_found("Quota preset"))?;

    // Validate the descriptor before snapshotting it onto the invitation
    let quota = Quota::parse_str(&preset.quota)?;

    let token = generate_invitation_token();
    let now = Utc::now();
    let expires_at =
        now + Duration::days(request.expires_in_days.unwrap_or(DEFAULT_INVITATION_DAYS));

    let invitation = Invitation {
        id: Uuid::new_v4(),
        token_hash: hash_token(&token),
        scenario_id: scenario.id,
        quota: quota.to_descriptor().to_string(),
        expires_at,
        created_by: staff.id,
        linked_user_id: None,
        claimed_at: None,
        created_at: now,
    };
    resources
        .database
        .sessions()
        .create_invitation(&invitation)
        .await?;

    let body = InvitationResponse {
        invitation_id: invitation.id,
        token,
        scenario_id: scenario.id,
        quota,
        expires_at,
    };
    Ok((StatusCode::CREATED, Json(body)).into_response())
}

/// Claim an invitation (public)
///
/// A caller without identity gets an anonymous account minted as part of
/// the claim, with its session cookie on the response.
async fn claim_invitation(
    State(resources): State<Arc<ServerResources>>,
    headers: HeaderMap,
    Json(request): Json<ClaimRequest>,
) -> Result<Response, AppError> {
    let context = resources
        .authorizer
        .authorize(&headers, AuthTier::Public)
        .await?;

    let (user, minted_cookie) = match context.user {
        Some(user) => (user, None),
        None => {
            let user = User::anonymous();
            resources.database.users().create(&user).await?;
            let token = resources.auth_manager.generate_token(&user)?;
            let max_age = resources.config.session_expiry_hours * 3600;
            let cookie = format!(
                "{SESSION_COOKIE}={token}; Path=/; HttpOnly; SameSite=Lax; Max-Age={max_age}"
            );
            (user, Some(cookie))
        }
    };

    let token_hash = hash_token(request.token.trim());
    let (invitation, session) = resources
        .database
        .sessions()
        .claim_invitation(&token_hash, user.id)
        .await?;

    let scenario = resources
        .database
        .catalog()
        .get_scenario(session.scenario_id)
        .await?
        .ok_or_else(|| AppError::internal("Claimed session references a missing scenario"))?;

    track_event(
        &resources,
        EVENT_CONVERSATION_STARTED,
        serde_json::json!({ "scenarioSlug": scenario.slug, "via": "claim" }),
        Some(user.id),
        Some(session.id),
    )
    .await;

    let body = SessionResponse {
        id: session.id,
        scenario_id: scenario.id,
        scenario_slug: scenario.slug,
        scenario_title: scenario.title,
        status: session.status,
        quota: Quota::parse_str(&invitation.quota)?,
        started_at: session.started_at,
    };

    let mut response = (StatusCode::CREATED, Json(body)).into_response();
    if let Some(cookie) = minted_cookie {
        if let Ok(value) = cookie.parse() {
            response
                .headers_mut()
                .insert(http::header::SET_COOKIE, value);
        }
    }
    Ok(response)
}

/// Staff quick start: self-claimed invitation plus ACTIVE session
///
/// Both lookups fail with NOT_FOUND before any write happens, so a bad
/// scenario id leaves no orphaned invitation behind.
async fn start_new(
    State(resources): State<Arc<ServerResources>>,
    headers: HeaderMap,
    Json(request): Json<StartNewRequest>,
) -> Result<Response, AppError> {
    let context = resources
        .authorizer
        .authorize(&headers, AuthTier::Staff)
        .await?;
    let staff = context.require_user()?;

    let scenario = resources
        .database
        .catalog()
        .get_scenario(request.scenario_id)
        .await?
        .ok_or_else(|| AppError::not_found("Scenario"))?;

    let preset = resources
        .database
        .catalog()
        .get_quota_preset(request.quota_preset_id)
        .await?
        .ok_or_else(|| AppError::not_found("Quota preset"))?;

    let quota = Quota::parse_str(&preset.quota)?;

    // The invitation is claimed at birth; its token is never shown, but the
    // hash column is unique so a real one is minted and discarded.
    let token_hash = hash_token(&generate_invitation_token());
    let expires_at = Utc::now() + Duration::days(QUICK_START_DAYS);

    let (_invitation, session) = resources
        .database
        .sessions()
        .start_self_claimed(
            scenario.id,
            &quota.to_descriptor().to_string(),
            &token_hash,
            staff.id,
            expires_at,
        )
        .await?;

    track_event(
        &resources,
        EVENT_CONVERSATION_STARTED,
        serde_json::json!({ "scenarioSlug": scenario.slug, "via": "quick_start" }),
        Some(staff.id),
        Some(session.id),
    )
    .await;

    let body = SessionResponse {
        id: session.id,
        scenario_id: scenario.id,
        scenario_slug: scenario.slug,
        scenario_title: scenario.title,
        status: session.status,
        quota,
        started_at: session.started_at,
    };
    Ok((StatusCode::CREATED, Json(body)).into_response())
}

/// List the caller's sessions, most recent first
///
/// Public tier: unauthenticated callers get the empty list, never an error.
async fn list_mine(
    State(resources): State<Arc<ServerResources>>,
    headers: HeaderMap,
) -> Result<Json<SessionListResponse>, AppError> {
    let context = resources
        .authorizer
        .authorize(&headers, AuthTier::Public)
        .await?;

    let Some(user_id) = context.user_id() else {
        return Ok(Json(SessionListResponse {
            sessions: Vec::new(),
        }));
    };

    let sessions = resources
        .database
        .sessions()
        .list_for_user(user_id)
        .await?
        .into_iter()
        .map(SessionSummaryResponse::from)
        .collect();

    Ok(Json(SessionListResponse { sessions }))
}

/// Fetch one session with its messages (owner or staff)
async fn get_session(
    State(resources): State<Arc<ServerResources>>,
    headers: HeaderMap,
    Path(session_id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, AppError> {
    let context = resources
        .authorizer
        .authorize(&headers, AuthTier::Protected)
        .await?;
    let user = context.require_user()?;

    let session = resources
        .database
        .sessions()
        .get_session(session_id)
        .await?
        .ok_or_else(|| AppError::not_found("Session"))?;

    if session.user_id != user.id && !user.is_staff() {
        return Err(AppError::forbidden("Not your session"));
    }

    let scenario = resources
        .database
        .catalog()
        .get_scenario(session.scenario_id)
        .await?
        .ok_or_else(|| AppError::internal("Session references a missing scenario"))?;

    let messages = resources
        .database
        .messages()
        .list_for_session(session.id)
        .await?;

    Ok(Json(serde_json::json!({
        "session": {
            "id": session.id,
            "scenario_slug": scenario.slug,
            "scenario_title": scenario.title,
            "status": session.status,
            "started_at": session.started_at,
        },
        "messages": messages,
    })))
}

/// Mark a session completed or abandoned (owner only)
async fn update_status(
    State(resources): State<Arc<ServerResources>>,
    headers: HeaderMap,
    Path(session_id): Path<Uuid>,
    Json(request): Json<UpdateStatusRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    let context = resources
        .authorizer
        .authorize(&headers, AuthTier::Protected)
        .await?;
    let user = context.require_user()?;

    let session = resources
        .database
        .sessions()
        .get_session(session_id)
        .await?
        .ok_or_else(|| AppError::not_found("Session"))?;

    if session.user_id != user.id {
        return Err(AppError::forbidden("Not your session"));
    }
    if request.status == SessionStatus::Active {
        return Err(AppError::invalid_input(
            "A session cannot transition back to ACTIVE",
        ));
    }

    resources
        .database
        .sessions()
        .set_status(session.id, request.status)
        .await?;

    if request.status == SessionStatus::Completed {
        let duration_ms = (Utc::now() - session.started_at).num_milliseconds();
        let scenario = resources
            .database
            .catalog()
            .get_scenario(session.scenario_id)
            .await?;
        track_event(
            &resources,
            EVENT_CONVERSATION_COMPLETED,
            serde_json::json!({
                "scenarioSlug": scenario.map(|s| s.slug),
                "durationMs": duration_ms,
            }),
            Some(user.id),
            Some(session.id),
        )
        .await;
    }

    Ok(Json(serde_json::json!({ "success": true })))
}

/// Attach an observation note (staff)
async fn create_note(
    State(resources): State<Arc<ServerResources>>,
    headers: HeaderMap,
    Path(session_id): Path<Uuid>,
    Json(request): Json<CreateNoteRequest>,
) -> Result<Response, AppError> {
    let context = resources
        .authorizer
        .authorize(&headers, AuthTier::Staff)
        .await?;
    let staff = context.require_user()?;

    if request.body.trim().is_empty() {
        return Err(AppError::invalid_input("Note body cannot be empty"));
    }

    resources
        .database
        .sessions()
        .get_session(session_id)
        .await?
        .ok_or_else(|| AppError::not_found("Session"))?;

    let note = resources
        .database
        .observations()
        .create(session_id, staff.id, request.body.trim())
        .await?;

    Ok((StatusCode::CREATED, Json(note)).into_response())
}

/// List a session's observation notes (staff)
async fn list_notes(
    State(resources): State<Arc<ServerResources>>,
    headers: HeaderMap,
    Path(session_id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, AppError> {
    resources
        .authorizer
        .authorize(&headers, AuthTier::Staff)
        .await?;

    resources
        .database
        .sessions()
        .get_session(session_id)
        .await?
        .ok_or_else(|| AppError::not_found("Session"))?;

    let notes = resources
        .database
        .observations()
        .list_for_session(session_id)
        .await?;

    Ok(Json(serde_json::json!({ "notes": notes })))
}
