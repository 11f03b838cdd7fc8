// ABOUTME: Environment configuration management for deployment-specific settings
// ABOUTME: Handles environment variables, fail-lazy secrets, and runtime configuration parsing
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Practica

//! Environment-based configuration management.
//!
//! Configuration is read exactly once at startup into a typed [`ServerConfig`].
//! The failure posture is deliberately uneven:
//!
//! - the session signing secret is REQUIRED — the server refuses to boot
//!   without it;
//! - missing Google OAuth credentials warn and disable that subsystem;
//! - missing LLM provider keys are tolerated at boot and surface as a
//!   configuration error on first actual use (see `crate::llm::registry`).

use crate::errors::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use tracing::warn;

/// Environment variable holding the session signing secret
pub const SESSION_SECRET_ENV: &str = "PRACTICA_SESSION_SECRET";
/// Environment variable for the Anthropic API key
pub const ANTHROPIC_API_KEY_ENV: &str = "ANTHROPIC_API_KEY";
/// Environment variable for the OpenAI API key
pub const OPENAI_API_KEY_ENV: &str = "OPENAI_API_KEY";
/// Environment variable for the Google GenAI API key
pub const GOOGLE_API_KEY_ENV: &str = "GOOGLE_API_KEY";

/// Default model dispatched when a scenario does not name one
const DEFAULT_MODEL: &str = "anthropic:claude-sonnet-4-20250514";

/// Type-safe database location
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DatabaseUrl {
    /// SQLite database file
    SQLite { path: PathBuf },
    /// In-memory SQLite (tests)
    Memory,
}

impl DatabaseUrl {
    /// Parse from a connection string, treating bare paths as SQLite files
    #[must_use]
    pub fn parse_url(s: &str) -> Self {
        let path_str = s.strip_prefix("sqlite:").unwrap_or(s);
        if path_str == ":memory:" {
            Self::Memory
        } else {
            Self::SQLite {
                path: PathBuf::from(path_str),
            }
        }
    }

    /// Convert to a sqlx connection string
    #[must_use]
    pub fn to_connection_string(&self) -> String {
        match self {
            Self::SQLite { path } => format!("sqlite:{}", path.display()),
            Self::Memory => "sqlite::memory:".to_owned(),
        }
    }

    /// Check if this is an in-memory database
    #[must_use]
    pub const fn is_memory(&self) -> bool {
        matches!(self, Self::Memory)
    }
}

impl Default for DatabaseUrl {
    fn default() -> Self {
        Self::SQLite {
            path: PathBuf::from("./data/practica.db"),
        }
    }
}

/// Google OAuth client credentials
///
/// Present only when both halves are configured; the auth routes treat an
/// absent config as "OAuth disabled" rather than an error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GoogleOAuthConfig {
    pub client_id: String,
    pub client_secret: String,
}

/// Per-provider LLM API keys, all optional at boot
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LlmConfig {
    pub anthropic_api_key: Option<String>,
    pub openai_api_key: Option<String>,
    pub google_api_key: Option<String>,
    /// Model string dispatched when a scenario does not name one
    pub default_model: String,
}

impl LlmConfig {
    fn from_env() -> Self {
        Self {
            anthropic_api_key: read_optional(ANTHROPIC_API_KEY_ENV),
            openai_api_key: read_optional(OPENAI_API_KEY_ENV),
            google_api_key: read_optional(GOOGLE_API_KEY_ENV),
            default_model: env::var("PRACTICA_DEFAULT_MODEL")
                .unwrap_or_else(|_| DEFAULT_MODEL.to_owned()),
        }
    }
}

/// Complete server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// HTTP bind port
    pub http_port: u16,
    /// Database location
    pub database_url: DatabaseUrl,
    /// Session JWT signing secret (required at boot)
    pub session_secret: Vec<u8>,
    /// Session token lifetime in hours
    pub session_expiry_hours: i64,
    /// Google OAuth client config, `None` when disabled
    pub google_oauth: Option<GoogleOAuthConfig>,
    /// LLM provider keys and defaults
    pub llm: LlmConfig,
}

impl ServerConfig {
    /// Load configuration from the environment
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the session signing secret is absent
    /// or empty. All other keys degrade their own subsystem instead.
    pub fn from_env() -> AppResult<Self> {
        let session_secret = env::var(SESSION_SECRET_ENV)
            .ok()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| {
                AppError::config(format!(
                    "Missing {SESSION_SECRET_ENV} environment variable; refusing to sign sessions with an empty secret"
                ))
            })?
            .into_bytes();

        let google_oauth = match (
            read_optional("GOOGLE_OAUTH_CLIENT_ID"),
            read_optional("GOOGLE_OAUTH_CLIENT_SECRET"),
        ) {
            (Some(client_id), Some(client_secret)) => Some(GoogleOAuthConfig {
                client_id,
                client_secret,
            }),
            _ => {
                warn!("Google OAuth credentials not configured; sign-in is disabled");
                None
            }
        };

        let http_port = env::var("PRACTICA_HTTP_PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(8080);

        let database_url = env::var("DATABASE_URL")
            .map_or_else(|_| DatabaseUrl::default(), |s| DatabaseUrl::parse_url(&s));

        Ok(Self {
            http_port,
            database_url,
            session_secret,
            session_expiry_hours: 24 * 7,
            google_oauth,
            llm: LlmConfig::from_env(),
        })
    }

    /// Construct a config suitable for tests (no environment access)
    #[must_use]
    pub fn for_tests(session_secret: &[u8]) -> Self {
        Self {
            http_port: 0,
            database_url: DatabaseUrl::Memory,
            session_secret: session_secret.to_vec(),
            session_expiry_hours: 24,
            google_oauth: None,
            llm: LlmConfig {
                default_model: DEFAULT_MODEL.to_owned(),
                ..LlmConfig::default()
            },
        }
    }

    /// One-line startup summary, secrets elided
    #[must_use]
    pub fn summary(&self) -> String {
        format!(
            "port={} db={} oauth={} llm_keys=[anthropic:{} openai:{} google:{}]",
            self.http_port,
            self.database_url.to_connection_string(),
            if self.google_oauth.is_some() {
                "enabled"
            } else {
                "disabled"
            },
            self.llm.anthropic_api_key.is_some(),
            self.llm.openai_api_key.is_some(),
            self.llm.google_api_key.is_some(),
        )
    }
}

fn read_optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_database_url_parsing() {
        assert!(DatabaseUrl::parse_url("sqlite::memory:").is_memory());
        let file = DatabaseUrl::parse_url("sqlite:./data/app.db");
        assert_eq!(file.to_connection_string(), "sqlite:./data/app.db");
        // Bare paths fall back to SQLite files
        let bare = DatabaseUrl::parse_url("./practica.db");
        assert_eq!(bare.to_connection_string(), "sqlite:./practica.db");
    }

    #[test]
    fn test_test_config_has_no_oauth() {
        let config = ServerConfig::for_tests(b"secret");
        assert!(config.google_oauth.is_none());
        assert!(config.database_url.is_memory());
    }
}
