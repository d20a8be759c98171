//! Configuration types for the AI gateway
//!
//! Every field has a default so a partial (or missing) config file is valid.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use crate::providers::retry::RetryPolicy;

/// Main configuration struct for the AI gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AiConfig {
    /// Master switch; a disabled gateway rejects every call
    pub enabled: bool,
    /// Which backend adapter to construct
    pub provider: ProviderKind,
    /// API key for the remote backend
    #[serde(alias = "api_key")]
    pub credential: String,
    /// Full endpoint URL; empty uses the provider default
    #[serde(alias = "api_url")]
    pub base_url: String,
    /// Default model identifier
    pub model: String,
    /// Default sampling temperature, 0.0..=2.0
    pub temperature: f32,
    /// Default completion length limit
    pub max_tokens: u32,
    /// Per-request timeout
    #[serde(alias = "timeout")]
    pub timeout_seconds: u64,
    /// Response cache TTL; 0 disables the cache
    #[serde(alias = "cache_ttl")]
    pub cache_ttl_seconds: u64,
    /// Response cache size bound; 0 means unbounded
    pub cache_max_entries: usize,
    /// Total attempts per whole-response call (not extra retries)
    pub retries: u32,
    /// Base backoff delay before the second attempt
    #[serde(alias = "retry_backoff")]
    pub retry_backoff_seconds: f64,
    /// Backoff cap
    #[serde(alias = "retry_max_backoff")]
    pub retry_max_backoff_seconds: f64,
    /// Rounds of history kept per session; 0 keeps everything
    pub session_max_rounds: usize,
    /// Session idle expiry; 0 never expires
    #[serde(alias = "session_ttl")]
    pub session_ttl_seconds: u64,
    /// Name of the active prompt template
    pub prompt_active: String,
    /// Inline template, registered as "custom"
    pub prompt_template: String,
    /// Named prompt templates
    pub prompt_templates: HashMap<String, String>,
    /// Logging output
    pub logging: LoggingConfig,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            provider: ProviderKind::Completion,
            credential: String::new(),
            base_url: String::new(),
            model: "gpt-4o-mini".to_string(),
            temperature: 0.7,
            max_tokens: 2000,
            timeout_seconds: 30,
            cache_ttl_seconds: 86_400,
            cache_max_entries: 512,
            retries: 3,
            retry_backoff_seconds: 0.5,
            retry_max_backoff_seconds: 4.0,
            session_max_rounds: 6,
            session_ttl_seconds: 3600,
            prompt_active: "default".to_string(),
            prompt_template: String::new(),
            prompt_templates: HashMap::new(),
            logging: LoggingConfig::default(),
        }
    }
}

impl AiConfig {
    /// Retry policy derived from the `retries` / `retry_*` fields.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::from_secs(
            self.retries,
            self.retry_backoff_seconds,
            self.retry_max_backoff_seconds,
        )
    }

    /// Per-request timeout.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    /// Custom endpoint, if one is configured.
    pub fn endpoint(&self) -> Option<&str> {
        let url = self.base_url.trim();
        if url.is_empty() {
            None
        } else {
            Some(url)
        }
    }
}

/// The closed set of backend adapters.
///
/// Selected once when the gateway is built; never switched at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// Chat-completions style API with SSE `data:` deltas
    Completion,
    /// Messages API with a top-level system field and typed stream events
    Message,
    /// Local model server with NDJSON streaming
    Local,
    /// Deterministic test double
    Mock,
}

impl ProviderKind {
    /// Parse a provider name, accepting vendor aliases case-insensitively.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "completion" | "openai" => Some(ProviderKind::Completion),
            "message" | "claude" | "anthropic" => Some(ProviderKind::Message),
            "local" | "ollama" => Some(ProviderKind::Local),
            "mock" => Some(ProviderKind::Mock),
            _ => None,
        }
    }
}

impl<'de> Deserialize<'de> for ProviderKind {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        ProviderKind::parse(&raw).ok_or_else(|| {
            serde::de::Error::custom(format!(
                "unknown provider '{}', expected completion, message, local or mock",
                raw
            ))
        })
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderKind::Completion => write!(f, "completion"),
            ProviderKind::Message => write!(f, "message"),
            ProviderKind::Local => write!(f, "local"),
            ProviderKind::Mock => write!(f, "mock"),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable multi-line output
    Pretty,
    /// Compact single-line output with a `component` field
    #[default]
    Component,
    /// JSON lines for log aggregators
    Json,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Output format
    pub format: LogFormat,
    /// Default filter when `RUST_LOG` is unset
    pub level: String,
    /// Append to this file instead of stderr
    pub file: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::Component,
            level: "info".to_string(),
            file: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AiConfig::default();
        assert!(!config.enabled);
        assert_eq!(config.provider, ProviderKind::Completion);
        assert_eq!(config.model, "gpt-4o-mini");
        assert_eq!(config.max_tokens, 2000);
        assert_eq!(config.cache_ttl_seconds, 86_400);
        assert_eq!(config.cache_max_entries, 512);
        assert_eq!(config.retries, 3);
        assert_eq!(config.session_max_rounds, 6);
        assert!(config.endpoint().is_none());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: AiConfig =
            serde_json::from_str(r#"{"enabled": true, "provider": "message"}"#).unwrap();
        assert!(config.enabled);
        assert_eq!(config.provider, ProviderKind::Message);
        assert_eq!(config.timeout_seconds, 30);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_legacy_field_aliases() {
        let config: AiConfig = serde_json::from_str(
            r#"{"provider": "ollama", "api_key": "k", "api_url": "http://box:11434/api/chat",
                "timeout": 5, "cache_ttl": 10, "retry_backoff": 1.5}"#,
        )
        .unwrap();
        assert_eq!(config.provider, ProviderKind::Local);
        assert_eq!(config.credential, "k");
        assert_eq!(config.endpoint(), Some("http://box:11434/api/chat"));
        assert_eq!(config.timeout(), Duration::from_secs(5));
        assert_eq!(config.cache_ttl_seconds, 10);
        assert_eq!(config.retry_backoff_seconds, 1.5);
    }

    #[test]
    fn test_provider_kind_parse() {
        assert_eq!(ProviderKind::parse("OpenAI"), Some(ProviderKind::Completion));
        assert_eq!(ProviderKind::parse(" claude "), Some(ProviderKind::Message));
        assert_eq!(ProviderKind::parse("anthropic"), Some(ProviderKind::Message));
        assert_eq!(ProviderKind::parse("local"), Some(ProviderKind::Local));
        assert_eq!(ProviderKind::parse("mock"), Some(ProviderKind::Mock));
        assert_eq!(ProviderKind::parse("gemini"), None);
    }

    #[test]
    fn test_provider_kind_deserialize_case_insensitive() {
        let config: AiConfig = serde_json::from_str(r#"{"provider": "Claude"}"#).unwrap();
        assert_eq!(config.provider, ProviderKind::Message);
        assert!(serde_json::from_str::<AiConfig>(r#"{"provider": "gemini"}"#).is_err());
    }

    #[test]
    fn test_log_format_deserialize() {
        let cfg: LoggingConfig =
            serde_json::from_str(r#"{"format":"json","level":"debug"}"#).unwrap();
        assert_eq!(cfg.format, LogFormat::Json);
        assert_eq!(cfg.level, "debug");
        assert!(cfg.file.is_none());
    }
}
