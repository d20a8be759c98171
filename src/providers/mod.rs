//! Providers module - backend adapters behind one chat contract
//!
//! This module defines the [`ChatProvider`] trait and the request options
//! shared by every backend. Each variant of the closed [`ProviderKind`] set
//! has one adapter:
//!
//! - [`CompletionProvider`]: chat-completions API, SSE `data:` deltas
//! - [`MessageProvider`]: messages API, typed stream events
//! - [`LocalProvider`]: local model server, NDJSON streaming
//! - [`MockProvider`]: deterministic test double
//!
//! # Example
//!
//! ```rust,ignore
//! use dst_ai_gateway::config::AiConfig;
//! use dst_ai_gateway::providers::{create_provider, ChatOptions};
//! use dst_ai_gateway::session::ChatMessage;
//!
//! async fn example(config: AiConfig) {
//!     let provider = create_provider(&config, None).unwrap();
//!     let options = ChatOptions::new().with_max_tokens(500).resolve(&config);
//!     let text = provider
//!         .chat(&[ChatMessage::user("Hello!")], "Be brief.", &options)
//!         .await
//!         .unwrap();
//!     println!("{}", text);
//! }
//! ```

pub mod claude;
pub mod mock;
pub mod ollama;
pub mod openai;
pub mod retry;
mod transport;

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::Serialize;
use std::sync::Arc;

use crate::config::{AiConfig, ProviderKind};
use crate::error::{AiError, Result};
use crate::session::ChatMessage;

pub use claude::MessageProvider;
pub use mock::MockProvider;
pub use ollama::LocalProvider;
pub use openai::CompletionProvider;
pub use retry::RetryPolicy;

/// A finite, non-restartable sequence of response fragments.
///
/// Dropping the stream abandons the underlying request.
pub type FragmentStream = BoxStream<'static, Result<String>>;

// ============================================================================
// Options
// ============================================================================

/// Per-call overrides of the configured model parameters.
///
/// Use the builder pattern to construct options.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChatOptions {
    /// Model identifier override
    pub model: Option<String>,
    /// Sampling temperature override
    pub temperature: Option<f32>,
    /// Completion length override
    pub max_tokens: Option<u32>,
}

impl ChatOptions {
    /// Create options that use every configured default.
    ///
    /// # Example
    /// ```
    /// use dst_ai_gateway::providers::ChatOptions;
    ///
    /// let options = ChatOptions::new().with_temperature(0.2).with_max_tokens(300);
    /// assert_eq!(options.max_tokens, Some(300));
    /// assert!(options.model.is_none());
    /// ```
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the model.
    pub fn with_model(mut self, model: &str) -> Self {
        self.model = Some(model.to_string());
        self
    }

    /// Override the sampling temperature.
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Override the completion length limit.
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Fill unset fields from the configuration.
    pub fn resolve(&self, config: &AiConfig) -> ResolvedOptions {
        ResolvedOptions {
            model: self.model.clone().unwrap_or_else(|| config.model.clone()),
            temperature: self.temperature.unwrap_or(config.temperature),
            max_tokens: self.max_tokens.unwrap_or(config.max_tokens),
        }
    }
}

/// The effective model parameters of one call.
///
/// These are what adapters send and what the response cache keys on.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedOptions {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

// ============================================================================
// Provider Trait
// ============================================================================

/// Uniform capability set of every backend adapter.
#[async_trait]
pub trait ChatProvider: Send + Sync {
    /// Stable provider name, part of the response cache key.
    fn name(&self) -> &str;

    /// Request one whole response.
    ///
    /// # Arguments
    /// * `messages` - Conversation, oldest first
    /// * `system_prompt` - Instructions; empty means none
    /// * `options` - Effective model parameters
    async fn chat(
        &self,
        messages: &[ChatMessage],
        system_prompt: &str,
        options: &ResolvedOptions,
    ) -> Result<String>;

    /// Request a response as incremental fragments.
    ///
    /// Nothing is sent until the stream is first polled. Adapters without a
    /// streaming endpoint keep this default, whose first item is
    /// [`AiError::StreamingUnsupported`].
    fn stream_chat(
        &self,
        _messages: &[ChatMessage],
        _system_prompt: &str,
        _options: &ResolvedOptions,
    ) -> FragmentStream {
        let err = AiError::StreamingUnsupported(self.name().to_string());
        Box::pin(futures::stream::once(async move { Err(err) }))
    }

    /// Release the HTTP client if this adapter created it. Idempotent.
    fn close(&self) {}
}

/// Fail with [`AiError::Auth`] before any network call when a required
/// credential is missing.
pub(crate) fn require_credential(provider: &str, credential: &str) -> Result<()> {
    if credential.trim().is_empty() {
        return Err(AiError::Auth(format!("{}: missing api key", provider)));
    }
    Ok(())
}

/// Map a non-success HTTP status and its body to a classified error.
///
/// This centralizes the mapping so every adapter produces consistent errors.
pub fn parse_provider_error(status: u16, body: &str) -> AiError {
    let message = format!("HTTP {}: {}", status, body.trim());
    match status {
        401 | 403 => AiError::Auth(message),
        429 => AiError::RateLimit(message),
        408 | 504 => AiError::Timeout(message),
        500..=599 => AiError::Transient(message),
        _ => AiError::Provider {
            status,
            message: body.trim().to_string(),
        },
    }
}

/// Build the adapter for the configured provider.
///
/// A supplied `client` is borrowed and never closed by the adapter;
/// otherwise the adapter builds and owns its own client.
pub fn create_provider(
    config: &AiConfig,
    client: Option<reqwest::Client>,
) -> Result<Arc<dyn ChatProvider>> {
    let provider: Arc<dyn ChatProvider> = match config.provider {
        ProviderKind::Completion => Arc::new(CompletionProvider::from_config(config, client)?),
        ProviderKind::Message => Arc::new(MessageProvider::from_config(config, client)?),
        ProviderKind::Local => Arc::new(LocalProvider::from_config(config, client)?),
        ProviderKind::Mock => Arc::new(MockProvider::new(mock::DEFAULT_RESPONSE)),
    };
    tracing::info!(
        component = "provider",
        provider = provider.name(),
        "Provider initialized"
    );
    Ok(provider)
}
