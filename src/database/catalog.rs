// ABOUTME: Scenario and quota-preset persistence
// ABOUTME: Read-mostly catalog records referenced by invitations and sessions
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Practica

use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use super::parse_uuid;
use crate::errors::{AppError, AppResult};
use crate::models::{QuotaPreset, Scenario};

/// Catalog database operations
pub struct CatalogManager {
    pool: SqlitePool,
}

impl CatalogManager {
    /// Create a new catalog manager
    #[must_use]
    pub const fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert a scenario
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails.
    pub async fn create_scenario(&self, scenario: &Scenario) -> AppResult<()> {
        sqlx::query(
            r"
            INSERT INTO scenarios (id, slug, title, system_prompt, model)
            VALUES ($1, $2, $3, $4, $5)
            ",
        )
        .bind(scenario.id.to_string())
        .bind(&scenario.slug)
        .bind(&scenario.title)
        .bind(&scenario.system_prompt)
        .bind(&scenario.model)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::database(format!("Failed to create scenario: {e}")))?;
        Ok(())
    }

    /// Fetch a scenario by id
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn get_scenario(&self, scenario_id: Uuid) -> AppResult<Option<Scenario>> {
        let row = sqlx::query("SELECT * FROM scenarios WHERE id = $1")
            .bind(scenario_id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::database(format!("Failed to fetch scenario: {e}")))?;
        row.as_ref().map(scenario_from_row).transpose()
    }

    /// List all scenarios
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn list_scenarios(&self) -> AppResult<Vec<Scenario>> {
        let rows = sqlx::query("SELECT * FROM scenarios ORDER BY slug")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| AppError::database(format!("Failed to list scenarios: {e}")))?;
        rows.iter().map(scenario_from_row).collect()
    }

    /// Insert a quota preset
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails.
    pub async fn create_quota_preset(&self, preset: &QuotaPreset) -> AppResult<()> {
        sqlx::query("INSERT INTO quota_presets (id, name, quota) VALUES ($1, $2, $3)")
            .bind(preset.id.to_string())
            .bind(&preset.name)
            .bind(&preset.quota)
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::database(format!("Failed to create quota preset: {e}")))?;
        Ok(())
    }

    /// Fetch a quota preset by id
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn get_quota_preset(&self, preset_id: Uuid) -> AppResult<Option<QuotaPreset>> {
        let row = sqlx::query("SELECT * FROM quota_presets WHERE id = $1")
            .bind(preset_id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::database(format!("Failed to fetch quota preset: {e}")))?;

        row.map(|r| {
            let id: String = r.get("id");
            Ok(QuotaPreset {
                id: parse_uuid(&id)?,
                name: r.get("name"),
                quota: r.get("quota"),
            })
        })
        .transpose()
    }
}

fn scenario_from_row(row: &sqlx::sqlite::SqliteRow) -> AppResult<Scenario> {
    let id: String = row.get("id");
    Ok(Scenario {
        id: parse_uuid(&id)?,
        slug: row.get("slug"),
        title: row.get("title"),
        system_prompt: row.get("system_prompt"),
        model: row.get("model"),
    })
}
