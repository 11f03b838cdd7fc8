// ABOUTME: Invitation token generation, storage hashing, and comparison
// ABOUTME: Tokens are random alphanumeric strings stored only as SHA-256 hashes
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Practica

//! # Invitation Tokens
//!
//! An invitation token is the bearer credential that grants one claim of one
//! conversation session. Tokens are generated from the OS entropy source,
//! carry a recognizable `inv_` prefix, and are persisted only as SHA-256
//! hashes — the raw token is shown to the creator exactly once.
//!
//! Comparisons against presented secrets go through [`constant_time_eq`] so
//! the match duration does not leak how much of a guess was correct.

use rand::distributions::Alphanumeric;
use rand::rngs::OsRng;
use rand::Rng;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// Prefix identifying invitation tokens
pub const INVITATION_TOKEN_PREFIX: &str = "inv_";

/// Number of random characters following the prefix
const TOKEN_RANDOM_LEN: usize = 32;

/// Generate a new invitation token: `inv_` followed by 32 random
/// alphanumeric characters drawn from the OS entropy source.
#[must_use]
pub fn generate_invitation_token() -> String {
    let random: String = OsRng
        .sample_iter(&Alphanumeric)
        .take(TOKEN_RANDOM_LEN)
        .map(char::from)
        .collect();
    format!("{INVITATION_TOKEN_PREFIX}{random}")
}

/// Hash a token for storage (hex-encoded SHA-256)
#[must_use]
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

/// Constant-time equality over byte strings
///
/// Unequal lengths compare unequal without inspecting content; equal lengths
/// are compared without early exit.
#[must_use]
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.ct_eq(b).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_shape() {
        let token = generate_invitation_token();
        assert!(token.starts_with(INVITATION_TOKEN_PREFIX));
        assert_eq!(token.len(), INVITATION_TOKEN_PREFIX.len() + 32);
        assert!(token[INVITATION_TOKEN_PREFIX.len()..]
            .chars()
            .all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn test_tokens_are_unique() {
        let a = generate_invitation_token();
        let b = generate_invitation_token();
        assert_ne!(a, b);
    }

    #[test]
    fn test_hash_is_stable_and_hex() {
        let token = "inv_abc123";
        let h1 = hash_token(token);
        let h2 = hash_token(token);
        assert_eq!(h1, h2);
        assert_eq!(h1.len(), 64);
        assert!(h1.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(h1, hash_token("inv_abc124"));
    }

    #[test]
    fn test_constant_time_eq() {
        assert!(constant_time_eq(b"same", b"same"));
        assert!(!constant_time_eq(b"same", b"diff"));
        assert!(!constant_time_eq(b"short", b"longer input"));
        assert!(constant_time_eq(b"", b""));
    }
}
