// ABOUTME: Tracing subscriber initialization for the server binary
// ABOUTME: Env-filtered fmt logging, RUST_LOG aware
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Practica

//! Logging setup.

use tracing_subscriber::{fmt, EnvFilter};

/// Initialize the global subscriber from `RUST_LOG`, defaulting to `info`
///
/// # Errors
///
/// Returns an error if a global subscriber is already installed.
pub fn init_from_env() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,practica_server=debug"));

    fmt()
        .with_env_filter(filter)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {e}"))
}
