// ABOUTME: User persistence including anonymous accounts and Google identity lookups
// ABOUTME: Supports the merge-on-login promotion of anonymous rows
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Practica

use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use super::{parse_timestamp, parse_uuid};
use crate::errors::{AppError, AppResult};
use crate::models::{User, UserRole};

/// User database operations
pub struct UserManager {
    pool: SqlitePool,
}

impl UserManager {
    /// Create a new user manager
    #[must_use]
    pub const fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert a user row
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails (duplicate email/google id
    /// surfaces as a conflict).
    pub async fn create(&self, user: &User) -> AppResult<()> {
        sqlx::query(
            r"
            INSERT INTO users (id, email, google_id, display_name, role, is_anonymous, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ",
        )
        .bind(user.id.to_string())
        .bind(&user.email)
        .bind(&user.google_id)
        .bind(&user.display_name)
        .bind(user.role.as_str())
        .bind(i32::from(user.is_anonymous))
        .bind(user.created_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db) if db.is_unique_violation() => {
                AppError::conflict("A user with this identity already exists")
            }
            other => AppError::database(format!("Failed to create user: {other}")),
        })?;
        Ok(())
    }

    /// Fetch a user by id
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn get(&self, user_id: Uuid) -> AppResult<Option<User>> {
        self.fetch_one("SELECT * FROM users WHERE id = $1", &user_id.to_string())
            .await
    }

    /// Fetch a user by Google identity
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn get_by_google_id(&self, google_id: &str) -> AppResult<Option<User>> {
        self.fetch_one("SELECT * FROM users WHERE google_id = $1", google_id)
            .await
    }

    /// Fetch a user by email
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn get_by_email(&self, email: &str) -> AppResult<Option<User>> {
        self.fetch_one("SELECT * FROM users WHERE email = $1", email)
            .await
    }

    /// Attach a Google identity to an existing user (email match on login)
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails.
    pub async fn link_google_id(&self, user_id: Uuid, google_id: &str) -> AppResult<()> {
        sqlx::query("UPDATE users SET google_id = $1 WHERE id = $2")
            .bind(google_id)
            .bind(user_id.to_string())
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::database(format!("Failed to link google id: {e}")))?;
        Ok(())
    }

    /// Promote an anonymous row into a registered account in place
    ///
    /// Keeps the row's id so invitation and session foreign keys survive.
    ///
    /// # Errors
    ///
    /// Returns `NOT_FOUND` if the row does not exist or is not anonymous.
    pub async fn promote_anonymous(
        &self,
        user_id: Uuid,
        email: &str,
        google_id: &str,
        display_name: Option<&str>,
    ) -> AppResult<User> {
        let result = sqlx::query(
            r"
            UPDATE users
            SET email = $1, google_id = $2, display_name = $3, is_anonymous = 0
            WHERE id = $4 AND is_anonymous = 1
            ",
        )
        .bind(email)
        .bind(google_id)
        .bind(display_name)
        .bind(user_id.to_string())
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::database(format!("Failed to promote anonymous user: {e}")))?;

        if result.rows_affected() == 0 {
            return Err(AppError::not_found("Anonymous user"));
        }

        self.get(user_id)
            .await?
            .ok_or_else(|| AppError::internal("Promoted user row vanished"))
    }

    /// Change a user's role
    ///
    /// # Errors
    ///
    /// Returns `NOT_FOUND` if the user does not exist.
    pub async fn update_role(&self, user_id: Uuid, role: UserRole) -> AppResult<()> {
        let result = sqlx::query("UPDATE users SET role = $1 WHERE id = $2")
            .bind(role.as_str())
            .bind(user_id.to_string())
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::database(format!("Failed to update role: {e}")))?;

        if result.rows_affected() == 0 {
            return Err(AppError::not_found("User"));
        }
        Ok(())
    }

    /// List all users, newest first
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn list(&self) -> AppResult<Vec<User>> {
        let rows = sqlx::query("SELECT * FROM users ORDER BY created_at DESC")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| AppError::database(format!("Failed to list users: {e}")))?;
        rows.iter().map(user_from_row).collect()
    }

    async fn fetch_one(&self, query: &str, bind: &str) -> AppResult<Option<User>> {
        let row = sqlx::query(query)
            .bind(bind)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::database(format!("Failed to fetch user: {e}")))?;
        row.as_ref().map(user_from_row).transpose()
    }
}

fn user_from_row(row: &sqlx::sqlite::SqliteRow) -> AppResult<User> {
    let id: String = row.get("id");
    let role: String = row.get("role");
    let created_at: String = row.get("created_at");
    let is_anonymous: i32 = row.get("is_anonymous");

    Ok(User {
        id: parse_uuid(&id)?,
        email: row.get("email"),
        google_id: row.get("google_id"),
        display_name: row.get("display_name"),
        role: role.parse()?,
        is_anonymous: is_anonymous != 0,
        created_at: parse_timestamp(&created_at)?,
    })
}
