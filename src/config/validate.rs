//! Configuration validation: range checks and unknown field detection.

use serde_json::Value;
use std::collections::HashSet;

use super::types::{AiConfig, ProviderKind};

/// Known top-level config field names, legacy aliases included.
const KNOWN_TOP_LEVEL: &[&str] = &[
    "enabled",
    "provider",
    "credential",
    "api_key",
    "base_url",
    "api_url",
    "model",
    "temperature",
    "max_tokens",
    "timeout_seconds",
    "timeout",
    "cache_ttl_seconds",
    "cache_ttl",
    "cache_max_entries",
    "retries",
    "retry_backoff_seconds",
    "retry_backoff",
    "retry_max_backoff_seconds",
    "retry_max_backoff",
    "session_max_rounds",
    "session_ttl_seconds",
    "session_ttl",
    "prompt_active",
    "prompt_template",
    "prompt_templates",
    "logging",
];

const KNOWN_LOGGING: &[&str] = &["format", "level", "file"];

/// A validation diagnostic.
#[derive(Debug)]
pub struct Diagnostic {
    pub level: DiagnosticLevel,
    pub path: String,
    pub message: String,
}

#[derive(Debug, PartialEq)]
pub enum DiagnosticLevel {
    Ok,
    Warn,
    Error,
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let prefix = match self.level {
            DiagnosticLevel::Ok => "[OK]",
            DiagnosticLevel::Warn => "[WARN]",
            DiagnosticLevel::Error => "[ERROR]",
        };
        if self.path.is_empty() {
            write!(f, "{} {}", prefix, self.message)
        } else {
            write!(f, "{} {}: {}", prefix, self.path, self.message)
        }
    }
}

/// Levenshtein distance over chars, for "did you mean?" suggestions.
pub fn levenshtein(a: &str, b: &str) -> usize {
    let b_chars: Vec<char> = b.chars().collect();
    let mut prev: Vec<usize> = (0..=b_chars.len()).collect();
    let mut curr = vec![0usize; b_chars.len() + 1];

    for (i, ca) in a.chars().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b_chars.iter().enumerate() {
            let cost = usize::from(ca != *cb);
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b_chars.len()]
}

/// Suggest the closest known field name (if distance <= 3).
pub fn suggest_field(unknown: &str, known: &[&str]) -> Option<String> {
    known
        .iter()
        .map(|k| (k, levenshtein(unknown, k)))
        .filter(|(_, d)| *d <= 3)
        .min_by_key(|(_, d)| *d)
        .map(|(k, _)| format!("did you mean '{}'?", k))
}

fn unknown_keys(
    obj: &serde_json::Map<String, Value>,
    known: &[&str],
    prefix: &str,
    out: &mut Vec<Diagnostic>,
) {
    let known_set: HashSet<&str> = known.iter().copied().collect();
    for key in obj.keys() {
        if known_set.contains(key.as_str()) {
            continue;
        }
        let message = match suggest_field(key, known) {
            Some(hint) => format!("Unknown field '{}'; {}", key, hint),
            None => format!("Unknown field '{}'", key),
        };
        out.push(Diagnostic {
            level: DiagnosticLevel::Warn,
            path: format!("{}{}", prefix, key),
            message,
        });
    }
}

/// Check a raw JSON config value for unknown field names.
///
/// Unknown fields are warnings only; serde ignores them when loading.
pub fn check_fields(raw: &Value) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();

    let obj = match raw.as_object() {
        Some(o) => o,
        None => {
            diagnostics.push(Diagnostic {
                level: DiagnosticLevel::Error,
                path: String::new(),
                message: "Config must be a JSON object".to_string(),
            });
            return diagnostics;
        }
    };

    unknown_keys(obj, KNOWN_TOP_LEVEL, "", &mut diagnostics);
    if let Some(logging) = obj.get("logging").and_then(|v| v.as_object()) {
        unknown_keys(logging, KNOWN_LOGGING, "logging.", &mut diagnostics);
    }

    if let Some(provider) = obj.get("provider").and_then(|v| v.as_str()) {
        if ProviderKind::parse(provider).is_none() {
            diagnostics.push(Diagnostic {
                level: DiagnosticLevel::Error,
                path: "provider".to_string(),
                message: format!(
                    "Unknown provider '{}'; expected completion, message, local or mock",
                    provider
                ),
            });
        }
    }

    if diagnostics.is_empty() {
        diagnostics.push(Diagnostic {
            level: DiagnosticLevel::Ok,
            path: String::new(),
            message: "All fields recognized".to_string(),
        });
    }
    diagnostics
}

/// Range-check every field. Returns one message per violation.
pub fn check_values(config: &AiConfig) -> Vec<String> {
    let mut errors = Vec::new();

    if !(0.0..=2.0).contains(&config.temperature) {
        errors.push(format!(
            "temperature must be between 0 and 2, got {}",
            config.temperature
        ));
    }
    if config.max_tokens == 0 {
        errors.push("max_tokens must be greater than 0".to_string());
    }
    if config.timeout_seconds == 0 {
        errors.push("timeout_seconds must be greater than 0".to_string());
    }
    if config.retries == 0 {
        errors.push("retries must be greater than 0".to_string());
    }
    if !(config.retry_backoff_seconds >= 0.0 && config.retry_backoff_seconds.is_finite()) {
        errors.push(format!(
            "retry_backoff_seconds must be >= 0, got {}",
            config.retry_backoff_seconds
        ));
    }
    if !(config.retry_max_backoff_seconds >= 0.0 && config.retry_max_backoff_seconds.is_finite())
    {
        errors.push(format!(
            "retry_max_backoff_seconds must be >= 0, got {}",
            config.retry_max_backoff_seconds
        ));
    }
    if let Some(endpoint) = config.endpoint() {
        match url::Url::parse(endpoint) {
            Ok(parsed) if parsed.host_str().is_some_and(|h| !h.is_empty()) => {}
            _ => errors.push(format!(
                "base_url must be an absolute URL with scheme and host, got '{}'",
                endpoint
            )),
        }
    }
    errors
}
