// ABOUTME: JWT session management and Google profile reconciliation
// ABOUTME: Issues/validates session tokens and merges anonymous accounts on first login
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Practica

//! # Authentication and Session Management
//!
//! Session tokens are HS256 JWTs signed with the boot-time secret and carried
//! in an httpOnly cookie or an `Authorization: Bearer` header. The signing
//! secret is the one configuration value that is fatal at boot — everything
//! else in the config degrades its own subsystem instead.
//!
//! [`handle_google_auth`] implements the merge-on-login contract: given a
//! verified Google profile and an optional pre-existing anonymous user id,
//! produce or update a user record and report whether an anonymous account
//! was folded into the authenticated one.

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::database::Database;
use crate::errors::{AppError, AppResult};
use crate::models::{User, UserRole};

/// Name of the session cookie
pub const SESSION_COOKIE: &str = "practica_session";

/// JWT claims for a user session
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// User id
    pub sub: String,
    /// Role at issue time (re-checked against the database on staff paths)
    pub role: UserRole,
    /// Issued-at timestamp
    pub iat: i64,
    /// Expiration timestamp
    pub exp: i64,
}

/// Issues and validates session JWTs
#[derive(Clone)]
pub struct AuthManager {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    token_expiry_hours: i64,
}

impl AuthManager {
    /// Create a manager from the signing secret
    #[must_use]
    pub fn new(secret: &[u8], token_expiry_hours: i64) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            token_expiry_hours,
        }
    }

    /// Generate a session token for a user
    ///
    /// # Errors
    ///
    /// Returns an error if JWT encoding fails.
    pub fn generate_token(&self, user: &User) -> AppResult<String> {
        let now = Utc::now();
        let claims = Claims {
            sub: user.id.to_string(),
            role: user.role,
            iat: now.timestamp(),
            exp: (now + Duration::hours(self.token_expiry_hours)).timestamp(),
        };
        encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(|e| AppError::internal(format!("Failed to sign session token: {e}")))
    }

    /// Validate a session token and return its claims
    ///
    /// # Errors
    ///
    /// Returns an auth error for an expired, malformed, or forged token.
    pub fn validate_token(&self, token: &str) -> AppResult<Claims> {
        decode::<Claims>(token, &self.decoding_key, &Validation::default())
            .map(|data| data.claims)
            .map_err(|e| AppError::auth_invalid(format!("Session token rejected: {e}")))
    }

    /// Validate a token and parse the subject as a user id
    ///
    /// # Errors
    ///
    /// Returns an auth error if validation fails or the subject is not a
    /// UUID.
    pub fn user_id_from_token(&self, token: &str) -> AppResult<Uuid> {
        let claims = self.validate_token(token)?;
        Uuid::parse_str(&claims.sub)
            .map_err(|_| AppError::auth_invalid("Session token carries an invalid user id"))
    }
}

// ============================================================================
// Google Reconciliation
// ============================================================================

/// Verified profile information from Google
///
/// Verifying the Google ID token is the OAuth collaborator's job; by the
/// time this struct exists the profile is trusted.
#[derive(Debug, Clone, Deserialize)]
pub struct GoogleUserInfo {
    /// Google's stable subject identifier
    pub google_id: String,
    pub email: String,
    pub display_name: Option<String>,
}

/// Outcome of [`handle_google_auth`]
#[derive(Debug)]
pub struct GoogleAuthOutcome {
    pub user: User,
    /// Set when an anonymous account was merged into the authenticated one
    pub merged_from: Option<Uuid>,
}

/// Produce or update a user from a Google profile, reconciling anonymous
/// session continuity
///
/// Resolution order:
/// 1. a user already carrying this Google id — signed in before;
/// 2. a user with the same email — link the Google id to it;
/// 3. a live anonymous user from the current browser session — promote that
///    row in place so its sessions and invitations follow the account, and
///    report `merged_from`;
/// 4. otherwise create a fresh user.
///
/// # Errors
///
/// Returns an error if any database operation fails.
pub async fn handle_google_auth(
    user_info: &GoogleUserInfo,
    anonymous_user_id: Option<Uuid>,
    db: &Database,
) -> AppResult<GoogleAuthOutcome> {
    let users = db.users();

    if let Some(user) = users.get_by_google_id(&user_info.google_id).await? {
        return Ok(GoogleAuthOutcome {
            user,
            merged_from: None,
        });
    }

    if let Some(user) = users.get_by_email(&user_info.email).await? {
        users.link_google_id(user.id, &user_info.google_id).await?;
        let user = User {
            google_id: Some(user_info.google_id.clone()),
            ..user
        };
        return Ok(GoogleAuthOutcome {
            user,
            merged_from: None,
        });
    }

    if let Some(anon_id) = anonymous_user_id {
        // Only a genuinely anonymous row may be promoted; a stale or bogus
        // id falls through to account creation.
        let candidate = users.get(anon_id).await?;
        if candidate.is_some_and(|u| u.is_anonymous) {
            let user = users
                .promote_anonymous(
                    anon_id,
                    &user_info.email,
                    &user_info.google_id,
                    user_info.display_name.as_deref(),
                )
                .await?;
            info!("Merged anonymous user {anon_id} into Google account");
            return Ok(GoogleAuthOutcome {
                user,
                merged_from: Some(anon_id),
            });
        }
    }

    let user = User::new(
        user_info.email.clone(),
        Some(user_info.google_id.clone()),
        user_info.display_name.clone(),
    );
    users.create(&user).await?;
    Ok(GoogleAuthOutcome {
        user,
        merged_from: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> AuthManager {
        AuthManager::new(b"test-secret-key", 24)
    }

    #[test]
    fn test_token_round_trip() {
        let user = User::new("a@example.com".to_owned(), None, None);
        let token = manager().generate_token(&user).unwrap();
        let claims = manager().validate_token(&token).unwrap();
        assert_eq!(claims.sub, user.id.to_string());
        assert_eq!(claims.role, UserRole::Member);
    }

    #[test]
    fn test_forged_token_rejected() {
        let user = User::new("a@example.com".to_owned(), None, None);
        let token = AuthManager::new(b"other-secret", 24)
            .generate_token(&user)
            .unwrap();
        assert!(manager().validate_token(&token).is_err());
    }

    #[test]
    fn test_garbage_token_rejected() {
        assert!(manager().validate_token("not.a.jwt").is_err());
    }
}
