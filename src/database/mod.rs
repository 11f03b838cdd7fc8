// ABOUTME: Database management for the Practica API server
// ABOUTME: Owns the SQLite pool, runs migrations, and hands out per-aggregate managers
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Practica

//! # Database Management
//!
//! SQLite via sqlx. The database is the single source of truth for every
//! entity; application code holds no authoritative in-memory copies. Tables
//! are created idempotently at startup.
//!
//! Each aggregate gets its own manager struct over the shared pool
//! (`UserManager`, `CatalogManager`, `SessionManager`, ...) so handlers can
//! take exactly the operations they need.

mod catalog;
mod messages;
mod observations;
mod sessions;
mod telemetry;
mod users;

pub use catalog::CatalogManager;
pub use messages::MessageManager;
pub use observations::ObservationManager;
pub use sessions::SessionManager;
pub use telemetry::TelemetryManager;
pub use users::UserManager;

use chrono::{DateTime, Utc};
use sqlx::{Pool, Sqlite, SqlitePool};
use uuid::Uuid;

use crate::errors::{AppError, AppResult};

/// Database handle owning the connection pool
#[derive(Clone)]
pub struct Database {
    pool: Pool<Sqlite>,
}

impl Database {
    /// Connect and run migrations
    ///
    /// # Errors
    ///
    /// Returns an error if the connection or any migration statement fails.
    pub async fn new(database_url: &str) -> AppResult<Self> {
        // Ensure SQLite creates the database file if it doesn't exist
        let connection_options = if database_url.starts_with("sqlite:")
            && !database_url.contains(":memory:")
        {
            format!("{database_url}?mode=rwc")
        } else {
            database_url.to_owned()
        };

        let pool = SqlitePool::connect(&connection_options)
            .await
            .map_err(|e| AppError::database(format!("Failed to connect: {e}")))?;

        let db = Self { pool };
        db.migrate().await?;
        Ok(db)
    }

    /// Get a reference to the pool for advanced operations
    #[must_use]
    pub const fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    /// User operations
    #[must_use]
    pub fn users(&self) -> UserManager {
        UserManager::new(self.pool.clone())
    }

    /// Scenario and quota-preset operations
    #[must_use]
    pub fn catalog(&self) -> CatalogManager {
        CatalogManager::new(self.pool.clone())
    }

    /// Invitation and session operations
    #[must_use]
    pub fn sessions(&self) -> SessionManager {
        SessionManager::new(self.pool.clone())
    }

    /// Session message operations
    #[must_use]
    pub fn messages(&self) -> MessageManager {
        MessageManager::new(self.pool.clone())
    }

    /// Telemetry event operations
    #[must_use]
    pub fn telemetry(&self) -> TelemetryManager {
        TelemetryManager::new(self.pool.clone())
    }

    /// Observation note operations
    #[must_use]
    pub fn observations(&self) -> ObservationManager {
        ObservationManager::new(self.pool.clone())
    }

    /// Create all tables idempotently
    async fn migrate(&self) -> AppResult<()> {
        let statements = [
            r"
            CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                email TEXT UNIQUE,
                google_id TEXT UNIQUE,
                display_name TEXT,
                role TEXT NOT NULL DEFAULT 'member',
                is_anonymous INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL
            )
            ",
            r"
            CREATE TABLE IF NOT EXISTS scenarios (
                id TEXT PRIMARY KEY,
                slug TEXT NOT NULL UNIQUE,
                title TEXT NOT NULL,
                system_prompt TEXT NOT NULL,
                model TEXT NOT NULL
            )
            ",
            r"
            CREATE TABLE IF NOT EXISTS quota_presets (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL UNIQUE,
                quota TEXT NOT NULL
            )
            ",
            r"
            CREATE TABLE IF NOT EXISTS invitations (
                id TEXT PRIMARY KEY,
                token_hash TEXT NOT NULL UNIQUE,
                scenario_id TEXT NOT NULL REFERENCES scenarios(id),
                quota TEXT NOT NULL,
                expires_at TEXT NOT NULL,
                created_by TEXT NOT NULL REFERENCES users(id),
                linked_user_id TEXT REFERENCES users(id),
                claimed_at TEXT,
                created_at TEXT NOT NULL
            )
            ",
            r"
            CREATE TABLE IF NOT EXISTS conversation_sessions (
                id TEXT PRIMARY KEY,
                scenario_id TEXT NOT NULL REFERENCES scenarios(id),
                user_id TEXT NOT NULL REFERENCES users(id),
                invitation_id TEXT NOT NULL REFERENCES invitations(id),
                status TEXT NOT NULL DEFAULT 'ACTIVE',
                started_at TEXT NOT NULL
            )
            ",
            r"
            CREATE TABLE IF NOT EXISTS session_messages (
                id TEXT PRIMARY KEY,
                session_id TEXT NOT NULL REFERENCES conversation_sessions(id) ON DELETE CASCADE,
                role TEXT NOT NULL,
                content TEXT NOT NULL,
                input_tokens INTEGER,
                output_tokens INTEGER,
                created_at TEXT NOT NULL
            )
            ",
            r"
            CREATE TABLE IF NOT EXISTS telemetry_events (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                properties TEXT NOT NULL DEFAULT '{}',
                user_id TEXT,
                session_id TEXT,
                created_at TEXT NOT NULL
            )
            ",
            r"
            CREATE TABLE IF NOT EXISTS observation_notes (
                id TEXT PRIMARY KEY,
                session_id TEXT NOT NULL REFERENCES conversation_sessions(id) ON DELETE CASCADE,
                author_id TEXT NOT NULL REFERENCES users(id),
                body TEXT NOT NULL,
                created_at TEXT NOT NULL
            )
            ",
            "CREATE INDEX IF NOT EXISTS idx_sessions_user ON conversation_sessions(user_id)",
            "CREATE INDEX IF NOT EXISTS idx_messages_session ON session_messages(session_id)",
            "CREATE INDEX IF NOT EXISTS idx_telemetry_created ON telemetry_events(created_at)",
        ];

        for statement in statements {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(|e| AppError::database(format!("Migration failed: {e}")))?;
        }

        Ok(())
    }
}

// ============================================================================
// Row Conversion Helpers
// ============================================================================

/// Parse a stored UUID column
pub(crate) fn parse_uuid(value: &str) -> AppResult<Uuid> {
    Uuid::parse_str(value)
        .map_err(|e| AppError::database(format!("Corrupt UUID in database: {e}")))
}

/// Parse a stored RFC 3339 timestamp column
pub(crate) fn parse_timestamp(value: &str) -> AppResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| AppError::database(format!("Corrupt timestamp in database: {e}")))
}

/// Current time in the stored format
pub(crate) fn now_rfc3339() -> String {
    Utc::now().to_rfc3339()
}
