// ABOUTME: Session message history and accumulated token usage
// ABOUTME: Usage totals drive quota enforcement before each provider call
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Practica

use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use super::{now_rfc3339, parse_timestamp, parse_uuid};
use crate::errors::{AppError, AppResult};
use crate::llm::TokenUsage;
use crate::models::SessionMessage;

/// Session message database operations
pub struct MessageManager {
    pool: SqlitePool,
}

impl MessageManager {
    /// Create a new message manager
    #[must_use]
    pub const fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Append a message to a session
    ///
    /// Usage is recorded on assistant messages only; user messages carry
    /// `None` and do not count against the quota until the exchange they
    /// start completes.
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails.
    pub async fn add_message(
        &self,
        session_id: Uuid,
        role: &str,
        content: &str,
        usage: Option<TokenUsage>,
    ) -> AppResult<SessionMessage> {
        let id = Uuid::new_v4();
        let now = now_rfc3339();
        let input_tokens = usage.map(|u| i64::from(u.input_tokens));
        let output_tokens = usage.map(|u| i64::from(u.output_tokens));

        sqlx::query(
            r"
            INSERT INTO session_messages
                (id, session_id, role, content, input_tokens, output_tokens, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ",
        )
        .bind(id.to_string())
        .bind(session_id.to_string())
        .bind(role)
        .bind(content)
        .bind(input_tokens)
        .bind(output_tokens)
        .bind(&now)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::database(format!("Failed to add message: {e}")))?;

        Ok(SessionMessage {
            id,
            session_id,
            role: role.to_owned(),
            content: content.to_owned(),
            input_tokens,
            output_tokens,
            created_at: parse_timestamp(&now)?,
        })
    }

    /// Fetch a session's messages in insertion order
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn list_for_session(&self, session_id: Uuid) -> AppResult<Vec<SessionMessage>> {
        let rows = sqlx::query(
            "SELECT * FROM session_messages WHERE session_id = $1 ORDER BY created_at, id",
        )
        .bind(session_id.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::database(format!("Failed to list messages: {e}")))?;

        rows.iter()
            .map(|row| {
                let id: String = row.get("id");
                let session: String = row.get("session_id");
                let created_at: String = row.get("created_at");
                Ok(SessionMessage {
                    id: parse_uuid(&id)?,
                    session_id: parse_uuid(&session)?,
                    role: row.get("role"),
                    content: row.get("content"),
                    input_tokens: row.get("input_tokens"),
                    output_tokens: row.get("output_tokens"),
                    created_at: parse_timestamp(&created_at)?,
                })
            })
            .collect()
    }

    /// Total tokens (input + output) recorded against a session
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn total_usage(&self, session_id: Uuid) -> AppResult<i64> {
        let row = sqlx::query(
            r"
            SELECT COALESCE(SUM(COALESCE(input_tokens, 0) + COALESCE(output_tokens, 0)), 0) AS total
            FROM session_messages
            WHERE session_id = $1
            ",
        )
        .bind(session_id.to_string())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::database(format!("Failed to sum usage: {e}")))?;
        Ok(row.get("total"))
    }
}
