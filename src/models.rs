// ABOUTME: Core data models for the Practica coaching API
// ABOUTME: Defines User, Scenario, Invitation, ConversationSession and related types
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Practica

//! # Data Models
//!
//! Core records shared between the database layer, the route handlers, and
//! the tests. The database is the single source of truth; every struct here
//! is a server-owned row with no client-side authoritative copy.
//!
//! ## Core Models
//!
//! - `User`: an account, possibly anonymous, with an authorization role
//! - `Scenario`: a coaching scenario (slug, system prompt, model)
//! - `QuotaPreset`: a named quota descriptor scenarios are issued under
//! - `Invitation`: a token-bearing access grant, claimed at most once
//! - `ConversationSession`: one coaching conversation bound to an invitation
//! - `ObservationNote`: a researcher note attached to a session
//! - `TelemetryEvent`: an append-only analytics event

use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::AppError;

// ============================================================================
// Users & Roles
// ============================================================================

/// Authorization role attached to a user
///
/// Roles are ordered: `Member < Staff < Admin`. The middleware tier checks
/// compare against this ordering (see `crate::middleware::auth`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    /// Regular participant
    Member,
    /// Researcher/staff: may issue invitations and read telemetry
    Staff,
    /// Administrator: may manage roles
    Admin,
}

impl UserRole {
    /// String form stored in the database
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Member => "member",
            Self::Staff => "staff",
            Self::Admin => "admin",
        }
    }
}

impl FromStr for UserRole {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "member" => Ok(Self::Member),
            "staff" => Ok(Self::Staff),
            "admin" => Ok(Self::Admin),
            other => Err(AppError::invalid_input(format!("Unknown role: {other}"))),
        }
    }
}

impl Display for UserRole {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.as_str())
    }
}

/// A user account
///
/// Anonymous visitors are real rows with `is_anonymous = true` and no email;
/// signing in with Google later promotes the row in place so invitation and
/// session foreign keys survive the merge (see `crate::auth`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub email: Option<String>,
    pub google_id: Option<String>,
    pub display_name: Option<String>,
    pub role: UserRole,
    pub is_anonymous: bool,
    pub created_at: DateTime<Utc>,
}

impl User {
    /// Create a new registered user
    #[must_use]
    pub fn new(email: String, google_id: Option<String>, display_name: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            email: Some(email),
            google_id,
            display_name,
            role: UserRole::Member,
            is_anonymous: false,
            created_at: Utc::now(),
        }
    }

    /// Create an anonymous user row (no email, no Google identity)
    #[must_use]
    pub fn anonymous() -> Self {
        Self {
            id: Uuid::new_v4(),
            email: None,
            google_id: None,
            display_name: None,
            role: UserRole::Member,
            is_anonymous: true,
            created_at: Utc::now(),
        }
    }

    /// Whether this user may act at staff level
    #[must_use]
    pub fn is_staff(&self) -> bool {
        self.role >= UserRole::Staff
    }
}

// ============================================================================
// Catalog: scenarios and quota presets
// ============================================================================

/// A coaching scenario participants converse within
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    pub id: Uuid,
    /// URL-safe identifier used by telemetry grouping
    pub slug: String,
    pub title: String,
    /// System prompt injected at the head of every conversation
    pub system_prompt: String,
    /// Model string (`"provider:model"` or bare model name)
    pub model: String,
}

/// A named, reusable quota descriptor
///
/// The descriptor is stored as raw JSON and validated by
/// [`crate::quota::Quota::parse_str`] whenever it is snapshotted onto an
/// invitation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuotaPreset {
    pub id: Uuid,
    pub name: String,
    /// Serialized quota descriptor, e.g. `{"tokens":1000,"label":"standard"}`
    pub quota: String,
}

// ============================================================================
// Invitations & sessions
// ============================================================================

/// A token-bearing access grant tying a scenario and quota to a user
///
/// Created once, claimed at most once; `unclaimed -> claimed` is the only
/// mutation this record sees. The raw token is never stored — only its
/// SHA-256 hash.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Invitation {
    pub id: Uuid,
    /// Hex SHA-256 of the raw token
    pub token_hash: String,
    pub scenario_id: Uuid,
    /// Quota descriptor snapshot taken from the preset at creation time
    pub quota: String,
    pub expires_at: DateTime<Utc>,
    pub created_by: Uuid,
    /// User the claim bound this invitation to, if claimed
    pub linked_user_id: Option<Uuid>,
    pub claimed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Invitation {
    /// Whether this invitation has already been claimed
    #[must_use]
    pub const fn is_claimed(&self) -> bool {
        self.claimed_at.is_some()
    }

    /// Whether this invitation expired before `now`
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// Lifecycle status of a conversation session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SessionStatus {
    Active,
    Completed,
    Abandoned,
}

impl SessionStatus {
    /// String form stored in the database
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Active => "ACTIVE",
            Self::Completed => "COMPLETED",
            Self::Abandoned => "ABANDONED",
        }
    }
}

impl FromStr for SessionStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ACTIVE" => Ok(Self::Active),
            "COMPLETED" => Ok(Self::Completed),
            "ABANDONED" => Ok(Self::Abandoned),
            other => Err(AppError::invalid_input(format!(
                "Unknown session status: {other}"
            ))),
        }
    }
}

/// One coaching conversation, created when an invitation is claimed or used
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationSession {
    pub id: Uuid,
    pub scenario_id: Uuid,
    pub user_id: Uuid,
    pub invitation_id: Uuid,
    pub status: SessionStatus,
    pub started_at: DateTime<Utc>,
}

/// Listing summary for a user's sessions
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSummary {
    pub id: Uuid,
    pub scenario_slug: String,
    pub scenario_title: String,
    pub status: SessionStatus,
    pub message_count: i64,
    pub started_at: DateTime<Utc>,
}

/// One message inside a session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionMessage {
    pub id: Uuid,
    pub session_id: Uuid,
    /// `"user"` or `"assistant"`
    pub role: String,
    pub content: String,
    pub input_tokens: Option<i64>,
    pub output_tokens: Option<i64>,
    pub created_at: DateTime<Utc>,
}

// ============================================================================
// Observation notes & telemetry
// ============================================================================

/// A researcher observation attached to a session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservationNote {
    pub id: Uuid,
    pub session_id: Uuid,
    pub author_id: Uuid,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

/// An append-only analytics event
///
/// `properties` is a free-form JSON bag; aggregate queries that need values
/// out of it scan rows application-side rather than assuming structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryEvent {
    pub id: i64,
    pub name: String,
    pub properties: serde_json::Value,
    pub user_id: Option<Uuid>,
    pub session_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}
