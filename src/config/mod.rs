//! Configuration management for the AI gateway
//!
//! Configuration is loaded from `~/.dst-ai/config.json` (or an explicit path)
//! with `DST_AI_*` environment variable overrides, then validated once. Call
//! sites never re-check ranges.

mod types;
pub mod validate;

pub use types::*;

use crate::error::{AiError, Result};
use crate::utils::sanitize::mask_secret;
use std::path::{Path, PathBuf};
use tracing::warn;
use validate::DiagnosticLevel;

impl AiConfig {
    /// Returns the configuration directory path (~/.dst-ai)
    pub fn dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".dst-ai")
    }

    /// Returns the path to the config file (~/.dst-ai/config.json)
    pub fn path() -> PathBuf {
        Self::dir().join("config.json")
    }

    /// Load configuration from the default path.
    pub fn load() -> Result<Self> {
        Self::load_from_path(&Self::path())
    }

    /// Load configuration from a specific path.
    ///
    /// A missing file yields the defaults. Unknown fields are logged as
    /// warnings; environment overrides are applied before validation.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path).map_err(|e| {
                AiError::Config(format!("cannot read {}: {}", path.display(), e))
            })?;
            Self::from_json_str(&content)?
        } else {
            AiConfig::default()
        };

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Parse a JSON document, warning about unknown fields. Does not validate.
    pub fn from_json_str(content: &str) -> Result<Self> {
        let raw: serde_json::Value = serde_json::from_str(content)
            .map_err(|e| AiError::Config(format!("invalid JSON: {}", e)))?;

        for diag in validate::check_fields(&raw) {
            if diag.level == DiagnosticLevel::Warn {
                warn!(path = %diag.path, "{}", diag.message);
            }
        }

        serde_json::from_value(raw).map_err(|e| AiError::Config(e.to_string()))
    }

    /// Apply environment variable overrides.
    ///
    /// Variables follow the pattern `DST_AI_<FIELD>`. Values that fail to
    /// parse are ignored.
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("DST_AI_ENABLED") {
            if let Ok(v) = val.parse() {
                self.enabled = v;
            }
        }
        if let Ok(val) = std::env::var("DST_AI_PROVIDER") {
            match ProviderKind::parse(&val) {
                Some(kind) => self.provider = kind,
                None => warn!(value = %val, "Ignoring unknown DST_AI_PROVIDER"),
            }
        }
        if let Ok(val) = std::env::var("DST_AI_CREDENTIAL") {
            self.credential = val;
        }
        if let Ok(val) = std::env::var("DST_AI_BASE_URL") {
            self.base_url = val;
        }
        if let Ok(val) = std::env::var("DST_AI_MODEL") {
            self.model = val;
        }
        if let Ok(val) = std::env::var("DST_AI_TEMPERATURE") {
            if let Ok(v) = val.parse() {
                self.temperature = v;
            }
        }
        if let Ok(val) = std::env::var("DST_AI_MAX_TOKENS") {
            if let Ok(v) = val.parse() {
                self.max_tokens = v;
            }
        }
        if let Ok(val) = std::env::var("DST_AI_TIMEOUT_SECONDS") {
            if let Ok(v) = val.parse() {
                self.timeout_seconds = v;
            }
        }
        if let Ok(val) = std::env::var("DST_AI_RETRIES") {
            if let Ok(v) = val.parse() {
                self.retries = v;
            }
        }
        if let Ok(val) = std::env::var("DST_AI_LOG_LEVEL") {
            self.logging.level = val;
        }
    }

    /// Reject every out-of-range value, reporting all violations at once.
    pub fn validate(&self) -> Result<()> {
        let errors = validate::check_values(self);
        if errors.is_empty() {
            Ok(())
        } else {
            Err(AiError::Config(errors.join("; ")))
        }
    }

    /// Copy with the credential masked, safe to print or log.
    pub fn masked(&self) -> Self {
        Self {
            credential: mask_secret(&self.credential),
            ..self.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::io::Write;

    #[test]
    fn test_config_dir() {
        let dir = AiConfig::dir();
        assert!(dir.ends_with(".dst-ai"));
        assert!(AiConfig::path().ends_with(".dst-ai/config.json"));
    }

    #[test]
    fn test_load_nonexistent() {
        let path = PathBuf::from("/nonexistent/path/config.json");
        let config = AiConfig::load_from_path(&path).unwrap();
        assert_eq!(config.cache_max_entries, 512);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"enabled": true, "model": "llama3", "temperature": 0.2,
                "unknown_field": 1, "logging": {{"format": "json"}}}}"#
        )
        .unwrap();

        let config = AiConfig::load_from_path(file.path()).unwrap();
        assert!(config.enabled);
        assert_eq!(config.temperature, 0.2);
        assert_eq!(config.logging.format, LogFormat::Json);
    }

    #[test]
    fn test_load_rejects_out_of_range() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"temperature": 3.0, "max_tokens": 0}}"#).unwrap();

        let err = AiConfig::load_from_path(file.path()).unwrap_err();
        match err {
            AiError::Config(msg) => {
                assert!(msg.contains("temperature"));
                assert!(msg.contains("max_tokens"));
            }
            other => panic!("expected Config error, got {:?}", other),
        }
    }

    #[test]
    fn test_negative_value_is_config_error() {
        let err = AiConfig::from_json_str(r#"{"cache_ttl_seconds": -5}"#).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Config);
    }

    #[test]
    fn test_invalid_json_is_config_error() {
        let err = AiConfig::from_json_str("{not json").unwrap_err();
        assert!(matches!(err, AiError::Config(_)));
    }

    #[test]
    fn test_env_override() {
        env::set_var("DST_AI_TIMEOUT_SECONDS", "7");
        env::set_var("DST_AI_RETRIES", "not-a-number");

        let mut config = AiConfig::default();
        config.apply_env_overrides();

        assert_eq!(config.timeout_seconds, 7);
        assert_eq!(config.retries, 3);

        env::remove_var("DST_AI_TIMEOUT_SECONDS");
        env::remove_var("DST_AI_RETRIES");
    }

    #[test]
    fn test_masked_hides_credential() {
        let config = AiConfig {
            credential: "sk-1234567890abcdef".to_string(),
            ..AiConfig::default()
        };
        let masked = config.masked();
        assert_eq!(masked.credential, "sk-***ef");
        assert_eq!(masked.model, config.model);
    }
}
