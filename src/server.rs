// ABOUTME: Server resources and HTTP serving entry point
// ABOUTME: Owns the database, auth manager, provider registry, and router composition
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Practica

//! # Server Wiring
//!
//! [`ServerResources`] is the explicitly constructed dependency bundle shared
//! by every route handler: database handle, auth manager, authorization
//! pipeline, and the LLM provider registry. Everything is built once at
//! startup and injected — no module-level lazily-initialized state.

use std::sync::Arc;

use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::auth::AuthManager;
use crate::config::ServerConfig;
use crate::database::Database;
use crate::errors::AppResult;
use crate::llm::ProviderRegistry;
use crate::middleware::RequestAuthorizer;
use crate::routes;

/// Shared state injected into every route handler
pub struct ServerResources {
    pub database: Database,
    pub auth_manager: AuthManager,
    pub authorizer: RequestAuthorizer,
    pub registry: ProviderRegistry,
    pub config: ServerConfig,
}

impl ServerResources {
    /// Build resources from configuration, constructing the provider
    /// registry from the configured API keys
    #[must_use]
    pub fn new(database: Database, config: ServerConfig) -> Self {
        let client = reqwest::Client::new();
        let registry = ProviderRegistry::from_config(&config.llm, &client);
        Self::with_registry(database, config, registry)
    }

    /// Build resources with an explicit registry (tests substitute fakes)
    #[must_use]
    pub fn with_registry(
        database: Database,
        config: ServerConfig,
        registry: ProviderRegistry,
    ) -> Self {
        let auth_manager = AuthManager::new(&config.session_secret, config.session_expiry_hours);
        let authorizer = RequestAuthorizer::new(auth_manager.clone(), database.clone());
        Self {
            database,
            auth_manager,
            authorizer,
            registry,
            config,
        }
    }
}

/// Compose the full application router
#[must_use]
pub fn app_router(resources: Arc<ServerResources>) -> Router {
    routes::router(resources)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Serve until ctrl-c
///
/// # Errors
///
/// Returns an error if binding or serving fails.
pub async fn serve(resources: Arc<ServerResources>) -> AppResult<()> {
    let port = resources.config.http_port;
    let router = app_router(resources);

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port))
        .await
        .map_err(|e| crate::errors::AppError::internal(format!("Failed to bind port {port}: {e}")))?;

    info!("Practica API listening on port {port}");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| crate::errors::AppError::internal(format!("Server error: {e}")))
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("Shutdown signal received");
    }
}
