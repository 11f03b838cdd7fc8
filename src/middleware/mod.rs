// ABOUTME: Request middleware for the Practica API server
// ABOUTME: Authorization tiers and request identity extraction
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Practica

//! Request middleware.

pub mod auth;

pub use auth::{AuthContext, AuthTier, RequestAuthorizer};
