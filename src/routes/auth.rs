// ABOUTME: Authentication routes: Google sign-in completion, anonymous accounts, me, logout
// ABOUTME: Issues the httpOnly session cookie and reports anonymous-account merges
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Practica

//! Authentication routes.
//!
//! The browser-side OAuth dance and Google ID-token verification are the
//! frontend collaborator's job; `complete_google` receives the verified
//! profile and runs the merge-on-login reconciliation. When Google OAuth is
//! not configured the endpoint reports a configuration error instead of the
//! server refusing to boot.

use std::sync::Arc;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::{handle_google_auth, GoogleUserInfo, SESSION_COOKIE};
use crate::errors::AppError;
use crate::middleware::AuthTier;
use crate::models::User;
use crate::server::ServerResources;

/// Request to complete a Google sign-in
#[derive(Debug, Deserialize)]
pub struct GoogleAuthRequest {
    #[serde(flatten)]
    pub profile: GoogleUserInfo,
}

/// Response for sign-in and anonymous account creation
#[derive(Debug, Serialize, Deserialize)]
pub struct AuthResponse {
    pub user: UserResponse,
    /// Anonymous user id merged into this account, when that happened
    #[serde(skip_serializing_if = "Option::is_none")]
    pub merged_from: Option<Uuid>,
}

/// User shape returned by the API
#[derive(Debug, Serialize, Deserialize)]
pub struct UserResponse {
    pub id: Uuid,
    pub email: Option<String>,
    pub display_name: Option<String>,
    pub role: String,
    pub is_anonymous: bool,
}

impl From<&User> for UserResponse {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            email: user.email.clone(),
            display_name: user.display_name.clone(),
            role: user.role.to_string(),
            is_anonymous: user.is_anonymous,
        }
    }
}

/// Create the auth route group
pub fn routes(resources: Arc<ServerResources>) -> Router {
    Router::new()
        .route("/api/auth/google", post(complete_google))
        .route("/api/auth/anonymous", post(create_anonymous))
        .route("/api/auth/me", get(me))
        .route("/api/auth/logout", post(logout))
        .with_state(resources)
}

/// Build the session Set-Cookie header value
fn session_cookie(token: &str, max_age_secs: i64) -> String {
    format!("{SESSION_COOKIE}={token}; Path=/; HttpOnly; SameSite=Lax; Max-Age={max_age_secs}")
}

/// Complete a Google sign-in with a verified profile
///
/// Public tier: an anonymous identity on the request becomes the merge
/// candidate.
async fn complete_google(
    State(resources): State<Arc<ServerResources>>,
    headers: HeaderMap,
    Json(request): Json<GoogleAuthRequest>,
) -> Result<Response, AppError> {
    if resources.config.google_oauth.is_none() {
        return Err(AppError::config(
            "Google sign-in is disabled: OAuth credentials are not configured",
        ));
    }

    let context = resources
        .authorizer
        .authorize(&headers, AuthTier::Public)
        .await?;
    let anonymous_user_id = context
        .user
        .as_ref()
        .filter(|u| u.is_anonymous)
        .map(|u| u.id);

    let outcome =
        handle_google_auth(&request.profile, anonymous_user_id, &resources.database).await?;

    let token = resources.auth_manager.generate_token(&outcome.user)?;
    let max_age = resources.config.session_expiry_hours * 3600;

    let body = AuthResponse {
        user: UserResponse::from(&outcome.user),
        merged_from: outcome.merged_from,
    };

    Ok((
        StatusCode::OK,
        [(http::header::SET_COOKIE, session_cookie(&token, max_age))],
        Json(body),
    )
        .into_response())
}

/// Create an anonymous account and issue its session cookie
///
/// An existing identity on the request is returned unchanged instead of
/// minting a second account.
async fn create_anonymous(
    State(resources): State<Arc<ServerResources>>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let context = resources
        .authorizer
        .authorize(&headers, AuthTier::Public)
        .await?;

    let user = if let Some(user) = context.user {
        user
    } else {
        let user = User::anonymous();
        resources.database.users().create(&user).await?;
        user
    };

    let token = resources.auth_manager.generate_token(&user)?;
    let max_age = resources.config.session_expiry_hours * 3600;

    let body = AuthResponse {
        user: UserResponse::from(&user),
        merged_from: None,
    };

    Ok((
        StatusCode::OK,
        [(http::header::SET_COOKIE, session_cookie(&token, max_age))],
        Json(body),
    )
        .into_response())
}

/// Report the current identity, if any
async fn me(
    State(resources): State<Arc<ServerResources>>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, AppError> {
    let context = resources
        .authorizer
        .authorize(&headers, AuthTier::Public)
        .await?;

    Ok(Json(serde_json::json!({
        "user": context.user.as_ref().map(UserResponse::from)
    })))
}

/// Clear the session cookie
async fn logout() -> Response {
    (
        StatusCode::OK,
        [(http::header::SET_COOKIE, session_cookie("", 0))],
        Json(serde_json::json!({ "success": true })),
    )
        .into_response()
}
