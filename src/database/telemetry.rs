// ABOUTME: Append-only telemetry event persistence
// ABOUTME: Raw inserts, range scans for aggregation, and paginated listing
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Practica

use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use super::{now_rfc3339, parse_timestamp, parse_uuid};
use crate::errors::{AppError, AppResult};
use crate::models::TelemetryEvent;

/// Telemetry event database operations
///
/// Events are append-only: nothing here mutates or deletes.
pub struct TelemetryManager {
    pool: SqlitePool,
}

impl TelemetryManager {
    /// Create a new telemetry manager
    #[must_use]
    pub const fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert one event
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails. Callers on the `track` path
    /// swallow and log this — telemetry never fails a request.
    pub async fn insert(
        &self,
        name: &str,
        properties: &serde_json::Value,
        user_id: Option<Uuid>,
        session_id: Option<Uuid>,
    ) -> AppResult<()> {
        sqlx::query(
            r"
            INSERT INTO telemetry_events (name, properties, user_id, session_id, created_at)
            VALUES ($1, $2, $3, $4, $5)
            ",
        )
        .bind(name)
        .bind(properties.to_string())
        .bind(user_id.map(|id| id.to_string()))
        .bind(session_id.map(|id| id.to_string()))
        .bind(now_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::database(format!("Failed to insert telemetry event: {e}")))?;
        Ok(())
    }

    /// Fetch all events in a time range, oldest first
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn events_in_range(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> AppResult<Vec<TelemetryEvent>> {
        let rows = sqlx::query(
            r"
            SELECT * FROM telemetry_events
            WHERE created_at >= $1 AND created_at < $2
            ORDER BY created_at, id
            ",
        )
        .bind(from.to_rfc3339())
        .bind(to.to_rfc3339())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::database(format!("Failed to fetch telemetry events: {e}")))?;

        rows.iter().map(event_from_row).collect()
    }

    /// Count events in a range, optionally filtered by name
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn count_in_range(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        name: Option<&str>,
    ) -> AppResult<i64> {
        let row = if let Some(name) = name {
            sqlx::query(
                r"
                SELECT COUNT(*) AS n FROM telemetry_events
                WHERE created_at >= $1 AND created_at < $2 AND name = $3
                ",
            )
            .bind(from.to_rfc3339())
            .bind(to.to_rfc3339())
            .bind(name)
            .fetch_one(&self.pool)
            .await
        } else {
            sqlx::query(
                r"
                SELECT COUNT(*) AS n FROM telemetry_events
                WHERE created_at >= $1 AND created_at < $2
                ",
            )
            .bind(from.to_rfc3339())
            .bind(to.to_rfc3339())
            .fetch_one(&self.pool)
            .await
        }
        .map_err(|e| AppError::database(format!("Failed to count telemetry events: {e}")))?;
        Ok(row.get("n"))
    }

    /// Count distinct users appearing in a range
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn distinct_users_in_range(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> AppResult<i64> {
        let row = sqlx::query(
            r"
            SELECT COUNT(DISTINCT user_id) AS n FROM telemetry_events
            WHERE created_at >= $1 AND created_at < $2 AND user_id IS NOT NULL
            ",
        )
        .bind(from.to_rfc3339())
        .bind(to.to_rfc3339())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::database(format!("Failed to count distinct users: {e}")))?;
        Ok(row.get("n"))
    }

    /// Newest-first page of raw events plus the total count
    ///
    /// # Errors
    ///
    /// Returns an error if either query fails.
    pub async fn list_paginated(
        &self,
        page: i64,
        per_page: i64,
    ) -> AppResult<(Vec<TelemetryEvent>, i64)> {
        let offset = page.saturating_sub(1).max(0) * per_page;

        let rows = sqlx::query(
            "SELECT * FROM telemetry_events ORDER BY created_at DESC, id DESC LIMIT $1 OFFSET $2",
        )
        .bind(per_page)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::database(format!("Failed to list telemetry events: {e}")))?;

        let total_row = sqlx::query("SELECT COUNT(*) AS n FROM telemetry_events")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| AppError::database(format!("Failed to count telemetry events: {e}")))?;

        let events = rows
            .iter()
            .map(event_from_row)
            .collect::<AppResult<Vec<_>>>()?;
        Ok((events, total_row.get("n")))
    }
}

fn event_from_row(row: &sqlx::sqlite::SqliteRow) -> AppResult<TelemetryEvent> {
    let properties_raw: String = row.get("properties");
    let user_id: Option<String> = row.get("user_id");
    let session_id: Option<String> = row.get("session_id");
    let created_at: String = row.get("created_at");

    Ok(TelemetryEvent {
        id: row.get("id"),
        name: row.get("name"),
        // The bag is unstructured; a corrupt row degrades to an empty object
        properties: serde_json::from_str(&properties_raw)
            .unwrap_or_else(|_| serde_json::Value::Object(serde_json::Map::new())),
        user_id: user_id.as_deref().map(parse_uuid).transpose()?,
        session_id: session_id.as_deref().map(parse_uuid).transpose()?,
        created_at: parse_timestamp(&created_at)?,
    })
}
