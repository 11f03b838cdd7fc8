// ABOUTME: Provider registry parsing "provider:model" strings and dispatching to adapters
// ABOUTME: Explicitly constructed at startup from config; supports test substitution
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Practica

//! # Provider Registry
//!
//! Maps model strings of the form `"provider:model"` (or a bare model name,
//! which implies `anthropic`) onto the matching adapter. The registry is an
//! explicitly constructed, dependency-injected object owned by the server —
//! there is no hidden process-global provider state, and tests swap in fake
//! providers through [`ProviderRegistry::register`].
//!
//! Missing API keys are tolerated at construction: the provider is simply
//! not registered, and the configuration error surfaces on first use.

use std::collections::HashMap;
use std::sync::Arc;

use reqwest::Client;
use tracing::info;

use super::{
    AnthropicProvider, CompletionProvider, CompletionStream, GoogleProvider, LlmMessage,
    OpenAiProvider, StreamParams,
};
use crate::config::environment::{
    ANTHROPIC_API_KEY_ENV, GOOGLE_API_KEY_ENV, OPENAI_API_KEY_ENV,
};
use crate::config::LlmConfig;
use crate::errors::{AppError, AppResult};

/// Provider implied when a model string carries no `provider:` prefix
pub const DEFAULT_PROVIDER: &str = "anthropic";

/// Providers this registry knows how to build, with the environment variable
/// that would configure each
const KNOWN_PROVIDERS: &[(&str, &str)] = &[
    ("anthropic", ANTHROPIC_API_KEY_ENV),
    ("openai", OPENAI_API_KEY_ENV),
    ("google", GOOGLE_API_KEY_ENV),
];

/// A model string split into provider and model halves
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedModel {
    pub provider: String,
    pub model: String,
}

/// Split a model string on the FIRST colon
///
/// No colon means the whole string is the model name and the provider is
/// `anthropic` — a deliberate ergonomic shortcut, not an error.
#[must_use]
pub fn parse_model(input: &str) -> ParsedModel {
    input.split_once(':').map_or_else(
        || ParsedModel {
            provider: DEFAULT_PROVIDER.to_owned(),
            model: input.to_owned(),
        },
        |(provider, model)| ParsedModel {
            provider: provider.to_owned(),
            model: model.to_owned(),
        },
    )
}

/// Registry of completion providers, keyed by provider name
pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn CompletionProvider>>,
}

impl ProviderRegistry {
    /// Create an empty registry (tests build on this)
    #[must_use]
    pub fn new() -> Self {
        Self {
            providers: HashMap::new(),
        }
    }

    /// Build the registry from configuration with a shared HTTP client
    ///
    /// Each configured key yields one explicitly constructed adapter; absent
    /// keys leave that provider unregistered so the error surfaces on first
    /// use rather than at boot.
    #[must_use]
    pub fn from_config(config: &LlmConfig, client: &Client) -> Self {
        let mut registry = Self::new();

        if let Some(key) = &config.anthropic_api_key {
            registry.register(Arc::new(AnthropicProvider::new(client.clone(), key.clone())));
        }
        if let Some(key) = &config.openai_api_key {
            registry.register(Arc::new(OpenAiProvider::new(client.clone(), key.clone())));
        }
        if let Some(key) = &config.google_api_key {
            registry.register(Arc::new(GoogleProvider::new(client.clone(), key.clone())));
        }

        info!(
            "Provider registry initialized with: [{}]",
            registry
                .providers
                .keys()
                .map(String::as_str)
                .collect::<Vec<_>>()
                .join(", ")
        );

        registry
    }

    /// Register a provider under its own name
    pub fn register(&mut self, provider: Arc<dyn CompletionProvider>) {
        self.providers.insert(provider.name().to_owned(), provider);
    }

    /// Look up a provider by name
    ///
    /// # Errors
    ///
    /// Returns a validation error for a name this registry has never heard
    /// of, and a configuration error for a known provider whose API key was
    /// not configured (the fail-lazy path).
    pub fn get(&self, name: &str) -> AppResult<Arc<dyn CompletionProvider>> {
        if let Some(provider) = self.providers.get(name) {
            return Ok(Arc::clone(provider));
        }
        match KNOWN_PROVIDERS.iter().find(|(known, _)| *known == name) {
            Some((known, env_var)) => Err(AppError::config(format!(
                "Provider '{known}' is not configured; set {env_var}"
            ))),
            None => Err(AppError::invalid_input(format!("Unknown provider: {name}"))),
        }
    }

    /// Parse a model string and stream a completion through the matching
    /// provider
    ///
    /// The parsed bare model name replaces `params.model` before dispatch.
    ///
    /// # Errors
    ///
    /// Returns an error for an unknown or unconfigured provider. Transport
    /// failures after this point arrive as terminal stream chunks.
    pub async fn stream_completion(
        &self,
        model_str: &str,
        mut params: StreamParams,
    ) -> AppResult<CompletionStream> {
        let parsed = parse_model(model_str);
        let provider = self.get(&parsed.provider)?;
        params.model = parsed.model;
        Ok(provider.stream_completion(params).await)
    }

    /// Parse a model string and count tokens through the matching provider
    ///
    /// # Errors
    ///
    /// Returns an error for an unknown or unconfigured provider, or if the
    /// provider's counting endpoint fails.
    pub async fn count_tokens(
        &self,
        model_str: &str,
        system_prompt: &str,
        messages: &[LlmMessage],
    ) -> AppResult<u32> {
        let parsed = parse_model(model_str);
        let provider = self.get(&parsed.provider)?;
        provider
            .count_tokens(&parsed.model, system_prompt, messages)
            .await
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorCode;

    #[test]
    fn test_parse_model_bare_name_defaults_to_anthropic() {
        let parsed = parse_model("gpt-4o");
        assert_eq!(parsed.provider, "anthropic");
        assert_eq!(parsed.model, "gpt-4o");
    }

    #[test]
    fn test_parse_model_with_provider_prefix() {
        let parsed = parse_model("openai:gpt-4o");
        assert_eq!(parsed.provider, "openai");
        assert_eq!(parsed.model, "gpt-4o");
    }

    #[test]
    fn test_parse_model_splits_on_first_colon_only() {
        let parsed = parse_model("google:gemini-2.0:flash");
        assert_eq!(parsed.provider, "google");
        assert_eq!(parsed.model, "gemini-2.0:flash");
    }

    #[test]
    fn test_unknown_provider_is_invalid_input() {
        let registry = ProviderRegistry::new();
        let err = registry.get("mistral").err().unwrap();
        assert_eq!(err.code, ErrorCode::BadRequest);
    }

    #[test]
    fn test_known_unconfigured_provider_is_config_error() {
        let registry = ProviderRegistry::new();
        let err = registry.get("anthropic").err().unwrap();
        assert_eq!(err.code, ErrorCode::ConfigError);
        assert!(err.message.contains("ANTHROPIC_API_KEY"));
    }

    #[test]
    fn test_from_config_registers_only_configured_keys() {
        let config = LlmConfig {
            openai_api_key: Some("sk-test".to_owned()),
            ..LlmConfig::default()
        };
        let registry = ProviderRegistry::from_config(&config, &Client::new());
        assert!(registry.get("openai").is_ok());
        assert!(registry.get("anthropic").is_err());
    }
}
