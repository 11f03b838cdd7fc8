// ABOUTME: Cryptographic helpers for the Practica API server
// ABOUTME: Token generation, hashing, and constant-time comparison
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Practica

//! Cryptographic primitives used by the invitation system.

pub mod tokens;
