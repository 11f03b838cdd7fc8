// ABOUTME: Ordered authorization tier pipeline (public < protected < staff < admin)
// ABOUTME: Extracts identity from cookie or bearer header and enforces the route's tier
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Practica

//! # Authorization Tiers
//!
//! Every route is assigned exactly one [`AuthTier`], enforced before any
//! side effect. The pipeline runs the same ordered stages for every request:
//!
//! 1. extract a bearer token from the `Authorization` header or the session
//!    cookie (header wins);
//! 2. validate the token signature and expiry;
//! 3. load the user row the token names;
//! 4. check the user's role against the route's tier.
//!
//! `Public` routes run stages 1–3 opportunistically: a missing or invalid
//! token yields an anonymous [`AuthContext`] instead of an error, so
//! endpoints like `list_mine` and `track` can personalize when identity is
//! present and still serve everyone else.

use axum::http::HeaderMap;
use tracing::debug;
use uuid::Uuid;

use crate::auth::{AuthManager, SESSION_COOKIE};
use crate::database::Database;
use crate::errors::{AppError, AppResult};
use crate::models::{User, UserRole};

/// Authorization tiers, in increasing order of privilege
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum AuthTier {
    /// No identity required; one is attached when presented
    Public,
    /// Any authenticated user, anonymous accounts included
    Protected,
    /// Staff or admin role
    Staff,
    /// Admin role only
    Admin,
}

impl AuthTier {
    /// Whether a role satisfies this tier
    #[must_use]
    pub fn allows(self, role: UserRole) -> bool {
        match self {
            Self::Public | Self::Protected => true,
            Self::Staff => role >= UserRole::Staff,
            Self::Admin => role >= UserRole::Admin,
        }
    }
}

/// Identity attached to a request after the pipeline runs
#[derive(Debug, Clone)]
pub struct AuthContext {
    /// The authenticated user, `None` only on `Public` routes
    pub user: Option<User>,
}

impl AuthContext {
    /// The anonymous context `Public` routes fall back to
    #[must_use]
    pub const fn anonymous() -> Self {
        Self { user: None }
    }

    /// The authenticated user's id, if any
    #[must_use]
    pub fn user_id(&self) -> Option<Uuid> {
        self.user.as_ref().map(|u| u.id)
    }

    /// The authenticated user, or an auth error
    ///
    /// # Errors
    ///
    /// Returns `UNAUTHORIZED` when no identity is attached.
    pub fn require_user(&self) -> AppResult<&User> {
        self.user.as_ref().ok_or_else(AppError::auth_required)
    }
}

/// Runs the authorization pipeline for route handlers
#[derive(Clone)]
pub struct RequestAuthorizer {
    auth_manager: AuthManager,
    database: Database,
}

impl RequestAuthorizer {
    /// Create an authorizer
    #[must_use]
    pub const fn new(auth_manager: AuthManager, database: Database) -> Self {
        Self {
            auth_manager,
            database,
        }
    }

    /// Run the full pipeline for a route at the given tier
    ///
    /// # Errors
    ///
    /// Returns `UNAUTHORIZED` when `Protected`+ routes see no valid
    /// identity, and `FORBIDDEN` when the role is insufficient for the
    /// tier. `Public` routes never error here.
    pub async fn authorize(&self, headers: &HeaderMap, tier: AuthTier) -> AppResult<AuthContext> {
        match self.authenticate(headers).await {
            Ok(user) => {
                if tier.allows(user.role) {
                    Ok(AuthContext { user: Some(user) })
                } else {
                    Err(AppError::forbidden(format!(
                        "This operation requires {} access",
                        match tier {
                            AuthTier::Admin => "admin",
                            _ => "staff",
                        }
                    )))
                }
            }
            Err(e) if tier == AuthTier::Public => {
                debug!("Public route continuing without identity: {e}");
                Ok(AuthContext::anonymous())
            }
            Err(e) => Err(e),
        }
    }

    /// Stages 1–3: extract, validate, load
    async fn authenticate(&self, headers: &HeaderMap) -> AppResult<User> {
        let token = extract_bearer(headers).ok_or_else(AppError::auth_required)?;
        let user_id = self.auth_manager.user_id_from_token(&token)?;
        self.database
            .users()
            .get(user_id)
            .await?
            .ok_or_else(|| AppError::auth_invalid("Session user no longer exists"))
    }
}

/// Stage 1: pull a bearer token from the headers
///
/// The `Authorization` header takes precedence over the session cookie so
/// API clients can override a stale browser session.
fn extract_bearer(headers: &HeaderMap) -> Option<String> {
    if let Some(token) = headers
        .get(http::header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
    {
        return Some(token.to_owned());
    }
    cookie_value(headers, SESSION_COOKIE)
}

/// Read one cookie out of the `Cookie` header
fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    let cookies = headers.get(http::header::COOKIE)?.to_str().ok()?;
    cookies.split(';').find_map(|pair| {
        let (key, value) = pair.trim().split_once('=')?;
        (key == name).then(|| value.to_owned())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_ordering() {
        assert!(AuthTier::Public < AuthTier::Protected);
        assert!(AuthTier::Protected < AuthTier::Staff);
        assert!(AuthTier::Staff < AuthTier::Admin);
    }

    #[test]
    fn test_tier_allows() {
        assert!(AuthTier::Public.allows(UserRole::Member));
        assert!(AuthTier::Protected.allows(UserRole::Member));
        assert!(!AuthTier::Staff.allows(UserRole::Member));
        assert!(AuthTier::Staff.allows(UserRole::Staff));
        assert!(AuthTier::Staff.allows(UserRole::Admin));
        assert!(!AuthTier::Admin.allows(UserRole::Staff));
        assert!(AuthTier::Admin.allows(UserRole::Admin));
    }

    #[test]
    fn test_extract_bearer_prefers_header() {
        let mut headers = HeaderMap::new();
        headers.insert(http::header::AUTHORIZATION, "Bearer abc".parse().unwrap());
        headers.insert(
            http::header::COOKIE,
            format!("{SESSION_COOKIE}=xyz").parse().unwrap(),
        );
        assert_eq!(extract_bearer(&headers).as_deref(), Some("abc"));
    }

    #[test]
    fn test_extract_bearer_from_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert(
            http::header::COOKIE,
            format!("other=1; {SESSION_COOKIE}=xyz; theme=dark")
                .parse()
                .unwrap(),
        );
        assert_eq!(extract_bearer(&headers).as_deref(), Some("xyz"));
    }

    #[test]
    fn test_extract_bearer_absent() {
        assert!(extract_bearer(&HeaderMap::new()).is_none());
    }

    #[test]
    fn test_require_user_on_anonymous_context() {
        assert!(AuthContext::anonymous().require_user().is_err());
    }
}
