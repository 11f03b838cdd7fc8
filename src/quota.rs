// ABOUTME: Typed quota parsed from the persisted quota descriptor
// ABOUTME: Rejects malformed descriptors instead of defaulting to zero or unlimited
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Practica

//! # Quota
//!
//! A [`Quota`] is the token budget attached to an invitation. Presets store
//! it as a JSON descriptor (`{"tokens": 1000, "label": "standard"}`) and
//! invitations carry a snapshot of that descriptor, so a later preset edit
//! never changes an already-issued invitation.
//!
//! Parsing is strict: a descriptor with a missing, negative, fractional, or
//! non-numeric `tokens` field is an error. Silently treating malformed data
//! as "zero tokens" would brick issued invitations; treating it as unlimited
//! would uncap them.

use crate::errors::{AppError, AppResult};
use serde::{Deserialize, Serialize};

/// A token budget with a display label
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quota {
    /// Total tokens (input + output) this budget allows
    pub tokens: u32,
    /// Human-readable label shown to staff
    pub label: String,
}

impl Quota {
    /// Parse a persisted quota descriptor
    ///
    /// # Errors
    ///
    /// Returns a validation error if the descriptor is not an object, the
    /// `tokens` field is absent or not a non-negative integer, or the `label`
    /// field is absent.
    pub fn parse(descriptor: &serde_json::Value) -> AppResult<Self> {
        let obj = descriptor
            .as_object()
            .ok_or_else(|| AppError::invalid_input("Quota descriptor must be an object"))?;

        let tokens_value = obj
            .get("tokens")
            .ok_or_else(|| AppError::invalid_input("Quota descriptor missing 'tokens' field"))?;

        let tokens = tokens_value
            .as_u64()
            .and_then(|t| u32::try_from(t).ok())
            .ok_or_else(|| {
                AppError::invalid_input(format!(
                    "Quota 'tokens' must be a non-negative integer, got {tokens_value}"
                ))
            })?;

        let label = obj
            .get("label")
            .and_then(serde_json::Value::as_str)
            .ok_or_else(|| AppError::invalid_input("Quota descriptor missing 'label' field"))?
            .to_owned();

        Ok(Self { tokens, label })
    }

    /// Parse a descriptor stored as a raw JSON string
    ///
    /// # Errors
    ///
    /// Returns a validation error for unparseable JSON or a malformed
    /// descriptor.
    pub fn parse_str(raw: &str) -> AppResult<Self> {
        let value: serde_json::Value = serde_json::from_str(raw)
            .map_err(|e| AppError::invalid_input(format!("Quota descriptor is not JSON: {e}")))?;
        Self::parse(&value)
    }

    /// Serialize back to the descriptor form for persistence
    #[must_use]
    pub fn to_descriptor(&self) -> serde_json::Value {
        serde_json::json!({ "tokens": self.tokens, "label": self.label })
    }
}
