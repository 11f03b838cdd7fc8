// ABOUTME: Library root for the Practica conversational-coaching API server
// ABOUTME: Invitation-gated sessions, streaming LLM providers, telemetry, and auth tiers
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Practica

//! # Practica API Server
//!
//! Backend for an invitation-gated conversational-coaching application:
//!
//! - **`llm`** — the streaming provider abstraction: three vendor adapters
//!   (Anthropic, OpenAI, Google) normalized into one chunk protocol, plus
//!   the `"provider:model"` registry;
//! - **`routes`** — the HTTP surface: auth, invitations and sessions, SSE
//!   message streaming, telemetry;
//! - **`middleware`** — the `public < protected < staff < admin`
//!   authorization pipeline;
//! - **`database`** — SQLite persistence, one manager per aggregate;
//! - **`telemetry`** — dashboard aggregation over the append-only event log.

pub mod auth;
pub mod config;
pub mod crypto;
pub mod database;
pub mod errors;
pub mod llm;
pub mod logging;
pub mod middleware;
pub mod models;
pub mod quota;
pub mod routes;
pub mod server;
pub mod telemetry;
