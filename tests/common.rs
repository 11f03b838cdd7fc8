// ABOUTME: Shared test utilities and setup functions for integration tests
// ABOUTME: Provides database, resource, user, and catalog seeding helpers
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Practica
#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

//! Shared test utilities for `practica_server` integration tests.

use std::sync::{Arc, Once};

use anyhow::Result;
use async_trait::async_trait;
use practica_server::{
    config::ServerConfig,
    database::Database,
    errors::AppResult,
    llm::{
        approximate_prompt_tokens, CompletionProvider, CompletionStream, LlmMessage,
        ProviderCapabilities, ProviderRegistry, StreamChunk, StreamParams, TokenUsage,
    },
    models::{QuotaPreset, Scenario, User, UserRole},
    server::ServerResources,
};
use uuid::Uuid;

static INIT_LOGGER: Once = Once::new();

/// Initialize quiet logging for tests (once per test process)
pub fn init_test_logging() {
    INIT_LOGGER.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::WARN)
            .with_test_writer()
            .try_init();
    });
}

/// Standard in-memory test database
pub async fn create_test_database() -> Result<Database> {
    init_test_logging();
    Ok(Database::new("sqlite::memory:").await?)
}

/// Server resources over an in-memory database with no real providers
pub async fn create_test_resources() -> Result<Arc<ServerResources>> {
    create_test_resources_with_registry(ProviderRegistry::new()).await
}

/// Server resources with an explicit (usually fake) provider registry
pub async fn create_test_resources_with_registry(
    registry: ProviderRegistry,
) -> Result<Arc<ServerResources>> {
    let database = create_test_database().await?;
    let config = ServerConfig::for_tests(b"test-session-secret");
    Ok(Arc::new(ServerResources::with_registry(
        database, config, registry,
    )))
}

/// Create and store a user with the given role
pub async fn create_test_user(database: &Database, role: UserRole) -> Result<User> {
    let mut user = User::new(
        format!("{}@example.com", Uuid::new_v4()),
        None,
        Some("Test User".to_owned()),
    );
    user.role = role;
    database.users().create(&user).await?;
    Ok(user)
}

/// Create and store an anonymous user
pub async fn create_anonymous_user(database: &Database) -> Result<User> {
    let user = User::anonymous();
    database.users().create(&user).await?;
    Ok(user)
}

/// Bearer header value for a user
pub fn bearer_for(resources: &ServerResources, user: &User) -> String {
    let token = resources.auth_manager.generate_token(user).unwrap();
    format!("Bearer {token}")
}

/// Seed a scenario dispatching to the given model string
pub async fn seed_scenario(database: &Database, slug: &str, model: &str) -> Result<Scenario> {
    let scenario = Scenario {
        id: Uuid::new_v4(),
        slug: slug.to_owned(),
        title: format!("{slug} scenario"),
        system_prompt: "You are a supportive conversation coach.".to_owned(),
        model: model.to_owned(),
    };
    database.catalog().create_scenario(&scenario).await?;
    Ok(scenario)
}

/// Seed a quota preset with the given token budget
pub async fn seed_preset(database: &Database, tokens: u32) -> Result<QuotaPreset> {
    let preset = QuotaPreset {
        id: Uuid::new_v4(),
        name: format!("preset-{}", Uuid::new_v4()),
        quota: format!(r#"{{"tokens":{tokens},"label":"standard"}}"#),
    };
    database.catalog().create_quota_preset(&preset).await?;
    Ok(preset)
}

// ============================================================================
// Fake Provider
// ============================================================================

/// Scripted provider registered under the name `"fake"`
///
/// Replays a fixed chunk sequence, letting route tests exercise the full
/// streaming path without any network.
pub struct FakeProvider {
    chunks: Vec<StreamChunk>,
}

impl FakeProvider {
    /// Provider replaying the given chunks
    pub fn new(chunks: Vec<StreamChunk>) -> Self {
        Self { chunks }
    }

    /// Provider replaying a short successful completion
    pub fn completing(text: &str, usage: TokenUsage) -> Self {
        Self::new(vec![
            StreamChunk::Delta {
                content: text.to_owned(),
            },
            StreamChunk::Done { usage },
        ])
    }
}

#[async_trait]
impl CompletionProvider for FakeProvider {
    fn name(&self) -> &'static str {
        "fake"
    }

    fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities::streaming_only()
    }

    async fn stream_completion(&self, _params: StreamParams) -> CompletionStream {
        Box::pin(tokio_stream::iter(self.chunks.clone()))
    }

    async fn count_tokens(
        &self,
        _model: &str,
        system_prompt: &str,
        messages: &[LlmMessage],
    ) -> AppResult<u32> {
        Ok(approximate_prompt_tokens(system_prompt, messages))
    }
}

/// Registry holding one scripted fake provider
pub fn registry_with_fake(provider: FakeProvider) -> ProviderRegistry {
    let mut registry = ProviderRegistry::new();
    registry.register(Arc::new(provider));
    registry
}
