//! DST AI Gateway - one call contract over several LLM backends
//!
//! Retries, response caching, streaming with graceful degradation and
//! bounded per-conversation memory for the DST server management bot.

pub mod cache;
pub mod config;
pub mod error;
pub mod gateway;
pub mod prompt;
pub mod providers;
pub mod session;
pub mod utils;

pub use cache::{cache_key, ResponseCache};
pub use config::{AiConfig, LogFormat, LoggingConfig, ProviderKind};
pub use error::{AiError, ErrorKind, Result};
pub use gateway::AiGateway;
pub use prompt::TemplateManager;
pub use providers::{
    create_provider, ChatOptions, ChatProvider, FragmentStream, ResolvedOptions, RetryPolicy,
};
pub use session::{ChatMessage, ChatSession, Role, SessionStore};
