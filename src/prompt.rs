//! Prompt templates
//!
//! A `TemplateManager` holds named templates with `{name}` placeholders and
//! picks one to render. Unknown placeholders are left in the output as they
//! were written, and `{{` / `}}` produce literal braces.

use std::collections::HashMap;

use crate::config::AiConfig;
use crate::session::{ChatMessage, Role};

/// Neutral template used when nothing else is configured.
pub const DEFAULT_TEMPLATE: &str = "Answer the user's question using the material below.\n\n\
Question: {question}\n\
{context}\n\
{sources}\n\
{history}\n";

/// Name under which `prompt_template` from the config is registered.
pub const CUSTOM_TEMPLATE: &str = "custom";

const DEFAULT_NAME: &str = "default";

/// Named prompt templates with one active selection.
#[derive(Debug, Clone)]
pub struct TemplateManager {
    templates: HashMap<String, String>,
    active: String,
    fallback: String,
}

impl Default for TemplateManager {
    fn default() -> Self {
        Self {
            templates: HashMap::new(),
            active: DEFAULT_NAME.to_string(),
            fallback: DEFAULT_TEMPLATE.to_string(),
        }
    }
}

impl TemplateManager {
    pub fn new(templates: HashMap<String, String>, active: &str) -> Self {
        Self {
            templates,
            active: active.to_string(),
            ..Self::default()
        }
    }

    /// Build from `prompt_templates`, `prompt_template` and `prompt_active`.
    ///
    /// A non-empty `prompt_template` is registered as `"custom"` and becomes
    /// active unless `prompt_active` names something other than `"default"`.
    pub fn from_config(config: &AiConfig) -> Self {
        let mut templates = config.prompt_templates.clone();
        let custom = config.prompt_template.trim();
        if !custom.is_empty() {
            templates.insert(CUSTOM_TEMPLATE.to_string(), config.prompt_template.clone());
        }

        let requested = config.prompt_active.trim();
        let active = if templates.contains_key(CUSTOM_TEMPLATE)
            && (requested.is_empty() || requested == DEFAULT_NAME)
        {
            CUSTOM_TEMPLATE
        } else if requested.is_empty() {
            DEFAULT_NAME
        } else {
            requested
        };
        Self::new(templates, active)
    }

    pub fn with_fallback(mut self, fallback: &str) -> Self {
        self.fallback = fallback.to_string();
        self
    }

    pub fn active(&self) -> &str {
        &self.active
    }

    pub fn set_active(&mut self, name: &str) {
        self.active = name.to_string();
    }

    pub fn insert(&mut self, name: &str, template: &str) {
        self.templates.insert(name.to_string(), template.to_string());
    }

    /// The active template, else a non-empty `"default"`, else the fallback.
    pub fn template(&self) -> &str {
        if let Some(t) = self.templates.get(&self.active) {
            return t;
        }
        match self.templates.get(DEFAULT_NAME) {
            Some(t) if !t.is_empty() => t,
            _ => &self.fallback,
        }
    }

    /// Render the selected template with `vars`.
    pub fn render(&self, vars: &HashMap<&str, String>) -> String {
        substitute(self.template(), vars)
    }
}

fn substitute(template: &str, vars: &HashMap<&str, String>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(pos) = rest.find(['{', '}']) {
        out.push_str(&rest[..pos]);
        let tail = &rest[pos..];

        if tail.starts_with("{{") || tail.starts_with("}}") {
            out.push_str(&tail[..1]);
            rest = &tail[2..];
            continue;
        }
        if tail.starts_with('}') {
            out.push('}');
            rest = &tail[1..];
            continue;
        }

        match tail[1..].find('}') {
            Some(end) => {
                let name = &tail[1..1 + end];
                match vars.get(name) {
                    Some(value) if is_placeholder(name) => out.push_str(value),
                    _ => out.push_str(&tail[..end + 2]),
                }
                rest = &tail[end + 2..];
            }
            None => {
                out.push_str(tail);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

fn is_placeholder(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_alphanumeric() || c == '_')
}

/// Render conversation history for inclusion in a prompt.
///
/// Returns an empty string when there is no history.
pub fn format_history(history: &[ChatMessage]) -> String {
    if history.is_empty() {
        return String::new();
    }
    let lines: Vec<String> = history
        .iter()
        .map(|m| {
            let label = if m.role == Role::User { "User" } else { "Assistant" };
            format!("{}: {}", label, m.content)
        })
        .collect();
    format!("Conversation history:\n{}\n", lines.join("\n"))
}

/// Render `(name, content)` reference material for inclusion in a prompt.
pub fn format_sources(sources: &[(&str, &str)]) -> String {
    if sources.is_empty() {
        return String::new();
    }
    let items: Vec<String> = sources
        .iter()
        .map(|(name, content)| format!("Source: {}\n{}", name, content))
        .collect();
    format!("Reference material:\n{}\n", items.join("\n\n"))
}
