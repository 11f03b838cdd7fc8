// ABOUTME: Invitation and conversation-session persistence
// ABOUTME: Claim and quick-start run as single transactions so no orphaned rows survive a failure
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Practica

use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use super::{parse_timestamp, parse_uuid};
use crate::errors::{AppError, AppResult};
use crate::models::{ConversationSession, Invitation, SessionStatus, SessionSummary};

/// Invitation and session database operations
pub struct SessionManager {
    pool: SqlitePool,
}

impl SessionManager {
    /// Create a new session manager
    #[must_use]
    pub const fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    // ========================================================================
    // Invitations
    // ========================================================================

    /// Insert an unclaimed invitation
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails.
    pub async fn create_invitation(&self, invitation: &Invitation) -> AppResult<()> {
        bind_invitation(
            sqlx::query(
                r"
                INSERT INTO invitations
                    (id, token_hash, scenario_id, quota, expires_at, created_by,
                     linked_user_id, claimed_at, created_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                ",
            ),
            invitation,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::database(format!("Failed to create invitation: {e}")))?;
        Ok(())
    }

    /// Fetch an invitation by its stored token hash
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn get_invitation_by_token_hash(
        &self,
        token_hash: &str,
    ) -> AppResult<Option<Invitation>> {
        let row = sqlx::query("SELECT * FROM invitations WHERE token_hash = $1")
            .bind(token_hash)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::database(format!("Failed to fetch invitation: {e}")))?;
        row.as_ref().map(invitation_from_row).transpose()
    }

    /// Fetch an invitation by id
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn get_invitation(&self, invitation_id: Uuid) -> AppResult<Option<Invitation>> {
        let row = sqlx::query("SELECT * FROM invitations WHERE id = $1")
            .bind(invitation_id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::database(format!("Failed to fetch invitation: {e}")))?;
        row.as_ref().map(invitation_from_row).transpose()
    }

    /// Claim an invitation and create its ACTIVE session atomically
    ///
    /// The claim is guarded by `claimed_at IS NULL` inside the transaction,
    /// so two racing claims cannot both succeed; the loser sees a conflict.
    ///
    /// # Errors
    ///
    /// Returns `NOT_FOUND` for an unknown token, a conflict for an
    /// already-claimed invitation, and a validation error for an expired one.
    pub async fn claim_invitation(
        &self,
        token_hash: &str,
        user_id: Uuid,
    ) -> AppResult<(Invitation, ConversationSession)> {
        let now = Utc::now();

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| AppError::database(format!("Failed to begin claim: {e}")))?;

        let row = sqlx::query("SELECT * FROM invitations WHERE token_hash = $1")
            .bind(token_hash)
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| AppError::database(format!("Failed to fetch invitation: {e}")))?;

        let invitation = row
            .as_ref()
            .map(invitation_from_row)
            .transpose()?
            .ok_or_else(|| AppError::not_found("Invitation"))?;

        if invitation.is_claimed() {
            return Err(AppError::conflict("Invitation has already been claimed"));
        }
        if invitation.is_expired(now) {
            return Err(AppError::invalid_input("Invitation has expired"));
        }

        let claimed = sqlx::query(
            r"
            UPDATE invitations
            SET claimed_at = $1, linked_user_id = $2
            WHERE id = $3 AND claimed_at IS NULL
            ",
        )
        .bind(now.to_rfc3339())
        .bind(user_id.to_string())
        .bind(invitation.id.to_string())
        .execute(&mut *tx)
        .await
        .map_err(|e| AppError::database(format!("Failed to claim invitation: {e}")))?;

        if claimed.rows_affected() == 0 {
            return Err(AppError::conflict("Invitation has already been claimed"));
        }

        let session = ConversationSession {
            id: Uuid::new_v4(),
            scenario_id: invitation.scenario_id,
            user_id,
            invitation_id: invitation.id,
            status: SessionStatus::Active,
            started_at: now,
        };
        insert_session(&mut tx, &session).await?;

        tx.commit()
            .await
            .map_err(|e| AppError::database(format!("Failed to commit claim: {e}")))?;

        let invitation = Invitation {
            linked_user_id: Some(user_id),
            claimed_at: Some(now),
            ..invitation
        };
        Ok((invitation, session))
    }

    /// Create a self-claimed invitation plus its ACTIVE session in one
    /// transaction (the staff quick-start path)
    ///
    /// Both writes commit together: a failed session insert rolls the
    /// invitation back rather than leaving an orphan.
    ///
    /// # Errors
    ///
    /// Returns an error if either insert or the commit fails.
    pub async fn start_self_claimed(
        &self,
        scenario_id: Uuid,
        quota: &str,
        token_hash: &str,
        user_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> AppResult<(Invitation, ConversationSession)> {
        let now = Utc::now();
        let invitation = Invitation {
            id: Uuid::new_v4(),
            token_hash: token_hash.to_owned(),
            scenario_id,
            quota: quota.to_owned(),
            expires_at,
            created_by: user_id,
            linked_user_id: Some(user_id),
            claimed_at: Some(now),
            created_at: now,
        };
        let session = ConversationSession {
            id: Uuid::new_v4(),
            scenario_id,
            user_id,
            invitation_id: invitation.id,
            status: SessionStatus::Active,
            started_at: now,
        };

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| AppError::database(format!("Failed to begin quick start: {e}")))?;

        bind_invitation(
            sqlx::query(
                r"
                INSERT INTO invitations
                    (id, token_hash, scenario_id, quota, expires_at, created_by,
                     linked_user_id, claimed_at, created_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                ",
            ),
            &invitation,
        )
        .execute(&mut *tx)
        .await
        .map_err(|e| AppError::database(format!("Failed to create invitation: {e}")))?;

        insert_session(&mut tx, &session).await?;

        tx.commit()
            .await
            .map_err(|e| AppError::database(format!("Failed to commit quick start: {e}")))?;

        Ok((invitation, session))
    }

    // ========================================================================
    // Sessions
    // ========================================================================

    /// Fetch a session by id
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn get_session(&self, session_id: Uuid) -> AppResult<Option<ConversationSession>> {
        let row = sqlx::query("SELECT * FROM conversation_sessions WHERE id = $1")
            .bind(session_id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::database(format!("Failed to fetch session: {e}")))?;
        row.as_ref().map(session_from_row).transpose()
    }

    /// List a user's sessions, most recent first, summarized with scenario
    /// identity and message count
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn list_for_user(&self, user_id: Uuid) -> AppResult<Vec<SessionSummary>> {
        let rows = sqlx::query(
            r"
            SELECT s.id, s.status, s.started_at, sc.slug AS scenario_slug,
                   sc.title AS scenario_title, COUNT(m.id) AS message_count
            FROM conversation_sessions s
            JOIN scenarios sc ON sc.id = s.scenario_id
            LEFT JOIN session_messages m ON m.session_id = s.id
            WHERE s.user_id = $1
            GROUP BY s.id
            ORDER BY s.started_at DESC
            ",
        )
        .bind(user_id.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::database(format!("Failed to list sessions: {e}")))?;

        rows.iter()
            .map(|row| {
                let id: String = row.get("id");
                let status: String = row.get("status");
                let started_at: String = row.get("started_at");
                Ok(SessionSummary {
                    id: parse_uuid(&id)?,
                    scenario_slug: row.get("scenario_slug"),
                    scenario_title: row.get("scenario_title"),
                    status: status.parse()?,
                    message_count: row.get("message_count"),
                    started_at: parse_timestamp(&started_at)?,
                })
            })
            .collect()
    }

    /// Update a session's status
    ///
    /// # Errors
    ///
    /// Returns `NOT_FOUND` if the session does not exist.
    pub async fn set_status(&self, session_id: Uuid, status: SessionStatus) -> AppResult<()> {
        let result = sqlx::query("UPDATE conversation_sessions SET status = $1 WHERE id = $2")
            .bind(status.as_str())
            .bind(session_id.to_string())
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::database(format!("Failed to update session status: {e}")))?;

        if result.rows_affected() == 0 {
            return Err(AppError::not_found("Session"));
        }
        Ok(())
    }

    /// Count invitation rows (used by tests asserting write atomicity)
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn count_invitations(&self) -> AppResult<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM invitations")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| AppError::database(format!("Failed to count invitations: {e}")))?;
        Ok(row.get("n"))
    }
}

fn bind_invitation<'q>(
    query: sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>>,
    invitation: &Invitation,
) -> sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>> {
    query
        .bind(invitation.id.to_string())
        .bind(invitation.token_hash.clone())
        .bind(invitation.scenario_id.to_string())
        .bind(invitation.quota.clone())
        .bind(invitation.expires_at.to_rfc3339())
        .bind(invitation.created_by.to_string())
        .bind(invitation.linked_user_id.map(|id| id.to_string()))
        .bind(invitation.claimed_at.map(|t| t.to_rfc3339()))
        .bind(invitation.created_at.to_rfc3339())
}

async fn insert_session(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    session: &ConversationSession,
) -> AppResult<()> {
    sqlx::query(
        r"
        INSERT INTO conversation_sessions
            (id, scenario_id, user_id, invitation_id, status, started_at)
        VALUES ($1, $2, $3, $4, $5, $6)
        ",
    )
    .bind(session.id.to_string())
    .bind(session.scenario_id.to_string())
    .bind(session.user_id.to_string())
    .bind(session.invitation_id.to_string())
    .bind(session.status.as_str())
    .bind(session.started_at.to_rfc3339())
    .execute(&mut **tx)
    .await
    .map_err(|e| AppError::database(format!("Failed to create session: {e}")))?;
    Ok(())
}

fn invitation_from_row(row: &sqlx::sqlite::SqliteRow) -> AppResult<Invitation> {
    let id: String = row.get("id");
    let scenario_id: String = row.get("scenario_id");
    let created_by: String = row.get("created_by");
    let expires_at: String = row.get("expires_at");
    let created_at: String = row.get("created_at");
    let linked_user_id: Option<String> = row.get("linked_user_id");
    let claimed_at: Option<String> = row.get("claimed_at");

    Ok(Invitation {
        id: parse_uuid(&id)?,
        token_hash: row.get("token_hash"),
        scenario_id: parse_uuid(&scenario_id)?,
        quota: row.get("quota"),
        expires_at: parse_timestamp(&expires_at)?,
        created_by: parse_uuid(&created_by)?,
        linked_user_id: linked_user_id.as_deref().map(parse_uuid).transpose()?,
        claimed_at: claimed_at.as_deref().map(parse_timestamp).transpose()?,
        created_at: parse_timestamp(&created_at)?,
    })
}

fn session_from_row(row: &sqlx::sqlite::SqliteRow) -> AppResult<ConversationSession> {
    let id: String = row.get("id");
    let scenario_id: String = row.get("scenario_id");
    let user_id: String = row.get("user_id");
    let invitation_id: String = row.get("invitation_id");
    let status: String = row.get("status");
    let started_at: String = row.get("started_at");

    Ok(ConversationSession {
        id: parse_uuid(&id)?,
        scenario_id: parse_uuid(&scenario_id)?,
        user_id: parse_uuid(&user_id)?,
        invitation_id: parse_uuid(&invitation_id)?,
        status: status.parse()?,
        started_at: parse_timestamp(&started_at)?,
    })
}
