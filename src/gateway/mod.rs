//! AI gateway - the one call contract every consumer uses.
//!
//! Wires together cache lookup, provider dispatch, retry policy and streaming
//! degradation:
//!
//! - `chat`: cache hit, else provider through the retry executor, then cache
//! - `stream_chat`: cache hit as a single fragment, else provider fragments
//!   forwarded as they arrive; falls back to `chat` when the provider cannot
//!   stream; caches only a stream that ran to completion
//!
//! The cache is passed in explicitly so several gateways (or other
//! consumers) can share one instance.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use dst_ai_gateway::{AiConfig, AiGateway, ChatMessage, ChatOptions, ProviderKind, ResponseCache};
//!
//! # tokio_test::block_on(async {
//! let config = AiConfig {
//!     enabled: true,
//!     provider: ProviderKind::Mock,
//!     ..AiConfig::default()
//! };
//! let cache = Arc::new(ResponseCache::from_config(&config));
//! let gateway = AiGateway::from_config(config, cache).unwrap();
//! let answer = gateway
//!     .chat(&[ChatMessage::user("Why did the Caves shard crash?")], "", &ChatOptions::new())
//!     .await
//!     .unwrap();
//! assert_eq!(answer, "mock");
//! # });
//! ```

use futures::StreamExt;
use std::sync::Arc;

use crate::cache::{cache_key, ResponseCache};
use crate::config::AiConfig;
use crate::error::{AiError, ErrorKind, Result};
use crate::log_component;
use crate::providers::retry::{run_with_retry, RetryPolicy};
use crate::providers::{create_provider, ChatOptions, ChatProvider, FragmentStream, ResolvedOptions};
use crate::session::{ChatMessage, SessionStore};

/// Cheap-to-clone handle; clones share the provider and the cache.
#[derive(Clone)]
pub struct AiGateway {
    config: Arc<AiConfig>,
    provider: Arc<dyn ChatProvider>,
    cache: Arc<ResponseCache>,
    retry: RetryPolicy,
}

impl std::fmt::Debug for AiGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AiGateway")
            .field("provider", &self.provider.name())
            .field("enabled", &self.config.enabled)
            .field("retry", &self.retry)
            .finish()
    }
}

impl AiGateway {
    /// Validate `config` and build the configured provider with its own HTTP
    /// client.
    pub fn from_config(config: AiConfig, cache: Arc<ResponseCache>) -> Result<Self> {
        Self::with_client(config, cache, None)
    }

    /// Like [`from_config`](Self::from_config), but the provider borrows
    /// `client` when one is given. A borrowed client is never closed by the
    /// gateway.
    pub fn with_client(
        config: AiConfig,
        cache: Arc<ResponseCache>,
        client: Option<reqwest::Client>,
    ) -> Result<Self> {
        config.validate()?;
        let provider = create_provider(&config, client)?;
        Ok(Self::with_provider(config, provider, cache))
    }

    /// Use an already-built provider. `config` is not re-validated.
    pub fn with_provider(
        config: AiConfig,
        provider: Arc<dyn ChatProvider>,
        cache: Arc<ResponseCache>,
    ) -> Self {
        let retry = config.retry_policy();
        Self {
            config: Arc::new(config),
            provider,
            cache,
            retry,
        }
    }

    pub fn config(&self) -> &AiConfig {
        &self.config
    }

    pub fn cache(&self) -> &Arc<ResponseCache> {
        &self.cache
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    fn check(&self, messages: &[ChatMessage]) -> Result<()> {
        if !self.config.enabled {
            return Err(AiError::Disabled);
        }
        if messages.is_empty() {
            return Err(AiError::EmptyInput);
        }
        Ok(())
    }

    /// Request one whole response.
    ///
    /// Retries transient, timeout and rate-limit failures per the configured
    /// policy; every other error surfaces on first occurrence.
    pub async fn chat(
        &self,
        messages: &[ChatMessage],
        system_prompt: &str,
        options: &ChatOptions,
    ) -> Result<String> {
        self.check(messages)?;
        let resolved = options.resolve(&self.config);
        let key = cache_key(self.provider.name(), system_prompt, messages, &resolved);
        if let Some(hit) = self.cache.get(&key) {
            return Ok(hit);
        }
        self.fetch(messages, system_prompt, &resolved, key).await
    }

    /// Provider call through the retry executor, then cache population.
    async fn fetch(
        &self,
        messages: &[ChatMessage],
        system_prompt: &str,
        resolved: &ResolvedOptions,
        key: String,
    ) -> Result<String> {
        let provider: &dyn ChatProvider = self.provider.as_ref();
        log_component!(
            debug,
            "gateway",
            "Dispatching chat request",
            provider = provider.name(),
            messages = messages.len()
        );
        let text = run_with_retry(
            move || provider.chat(messages, system_prompt, resolved),
            &self.retry,
            ErrorKind::RETRYABLE,
        )
        .await?;
        self.cache.put(key, text.clone());
        Ok(text)
    }

    /// Request a response as incremental fragments.
    ///
    /// Disabled-gateway and empty-input errors are returned before any stream
    /// exists. Streaming is never retried. The concatenated fragments are
    /// cached only when the stream is polled to its end; dropping it early
    /// leaves the cache untouched.
    pub fn stream_chat(
        &self,
        messages: Vec<ChatMessage>,
        system_prompt: &str,
        options: &ChatOptions,
    ) -> Result<FragmentStream> {
        self.check(&messages)?;
        let resolved = options.resolve(&self.config);
        let key = cache_key(self.provider.name(), system_prompt, &messages, &resolved);
        let system_prompt = system_prompt.to_string();
        let gateway = self.clone();

        Ok(Box::pin(async_stream::stream! {
            if let Some(hit) = gateway.cache.get(&key) {
                yield Ok(hit);
                return;
            }

            let mut upstream = gateway
                .provider
                .stream_chat(&messages, &system_prompt, &resolved);
            let mut buffer = String::new();
            let mut produced = false;

            while let Some(item) = upstream.next().await {
                match item {
                    Ok(fragment) => {
                        buffer.push_str(&fragment);
                        produced = true;
                        yield Ok(fragment);
                    }
                    Err(err) if err.kind() == ErrorKind::StreamingUnsupported && !produced => {
                        log_component!(
                            debug,
                            "gateway",
                            "Provider cannot stream, falling back to chat",
                            provider = gateway.provider.name()
                        );
                        let whole = gateway.fetch(&messages, &system_prompt, &resolved, key).await;
                        yield whole;
                        return;
                    }
                    Err(err) => {
                        yield Err(err);
                        return;
                    }
                }
            }

            if produced {
                gateway.cache.put(key, buffer);
            }
        }))
    }

    /// Ask `question` in the context of a stored conversation.
    ///
    /// Returns the trimmed answer. The turn is recorded only when that answer
    /// is non-empty; nothing is recorded on failure.
    pub async fn chat_with_session(
        &self,
        sessions: &SessionStore,
        session_id: &str,
        question: &str,
        system_prompt: &str,
        options: &ChatOptions,
    ) -> Result<String> {
        let mut messages = sessions.history(session_id);
        messages.push(ChatMessage::user(question));

        let answer = self.chat(&messages, system_prompt, options).await?;
        let answer = answer.trim().to_string();
        if !answer.is_empty() {
            sessions.append_turn(session_id, question, &answer);
        }
        Ok(answer)
    }

    /// Streaming counterpart of [`chat_with_session`](Self::chat_with_session).
    ///
    /// Fragments are forwarded unchanged. The turn is recorded once the
    /// stream is polled to its end and the joined answer is non-empty after
    /// trimming. An error, an empty answer or an abandoned stream records
    /// nothing.
    pub fn stream_chat_with_session(
        &self,
        sessions: Arc<SessionStore>,
        session_id: &str,
        question: &str,
        system_prompt: &str,
        options: &ChatOptions,
    ) -> Result<FragmentStream> {
        let mut messages = sessions.history(session_id);
        messages.push(ChatMessage::user(question));
        let mut upstream = self.stream_chat(messages, system_prompt, options)?;
        let session_id = session_id.to_string();
        let question = question.to_string();

        Ok(Box::pin(async_stream::stream! {
            let mut answer = String::new();
            while let Some(item) = upstream.next().await {
                match item {
                    Ok(fragment) => {
                        answer.push_str(&fragment);
                        yield Ok(fragment);
                    }
                    Err(err) => {
                        yield Err(err);
                        return;
                    }
                }
            }

            let trimmed = answer.trim();
            if !trimmed.is_empty() {
                sessions.append_turn(&session_id, &question, trimmed);
            }
        }))
    }

    /// Release the provider's HTTP client if it owns one. Idempotent.
    pub fn close(&self) {
        self.provider.close();
        log_component!(info, "gateway", "Gateway closed", provider = self.provider.name());
    }
}
