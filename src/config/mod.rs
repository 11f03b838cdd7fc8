// ABOUTME: Configuration module for the Practica API server
// ABOUTME: Re-exports the environment-driven server configuration
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Practica

//! Server configuration, read once from the environment at startup.

pub mod environment;

pub use environment::{DatabaseUrl, GoogleOAuthConfig, LlmConfig, ServerConfig};
