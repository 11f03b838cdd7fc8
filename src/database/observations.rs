// ABOUTME: Researcher observation note persistence
// ABOUTME: Staff-authored notes attached to conversation sessions
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Practica

use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use super::{now_rfc3339, parse_timestamp, parse_uuid};
use crate::errors::{AppError, AppResult};
use crate::models::ObservationNote;

/// Observation note database operations
pub struct ObservationManager {
    pool: SqlitePool,
}

impl ObservationManager {
    /// Create a new observation manager
    #[must_use]
    pub const fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Attach a note to a session
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails.
    pub async fn create(
        &self,
        session_id: Uuid,
        author_id: Uuid,
        body: &str,
    ) -> AppResult<ObservationNote> {
        let id = Uuid::new_v4();
        let now = now_rfc3339();

        sqlx::query(
            r"
            INSERT INTO observation_notes (id, session_id, author_id, body, created_at)
            VALUES ($1, $2, $3, $4, $5)
            ",
        )
        .bind(id.to_string())
        .bind(session_id.to_string())
        .bind(author_id.to_string())
        .bind(body)
        .bind(&now)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::database(format!("Failed to create observation note: {e}")))?;

        Ok(ObservationNote {
            id,
            session_id,
            author_id,
            body: body.to_owned(),
            created_at: parse_timestamp(&now)?,
        })
    }

    /// List a session's notes, oldest first
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn list_for_session(&self, session_id: Uuid) -> AppResult<Vec<ObservationNote>> {
        let rows = sqlx::query(
            "SELECT * FROM observation_notes WHERE session_id = $1 ORDER BY created_at, id",
        )
        .bind(session_id.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::database(format!("Failed to list observation notes: {e}")))?;

        rows.iter()
            .map(|row| {
                let id: String = row.get("id");
                let session: String = row.get("session_id");
                let author: String = row.get("author_id");
                let created_at: String = row.get("created_at");
                Ok(ObservationNote {
                    id: parse_uuid(&id)?,
                    session_id: parse_uuid(&session)?,
                    author_id: parse_uuid(&author)?,
                    body: row.get("body"),
                    created_at: parse_timestamp(&created_at)?,
                })
            })
            .collect()
    }
}
