//! Config check command handler.

use anyhow::{Context, Result};
use std::path::Path;

use dst_ai_gateway::config::validate::{check_fields, DiagnosticLevel};
use dst_ai_gateway::AiConfig;

/// Report field diagnostics for the file at `path`, then the outcome of the
/// full load (file, environment overrides and validation).
pub(crate) fn cmd_check_config(path: &Path, loaded: dst_ai_gateway::Result<AiConfig>) -> Result<()> {
    println!("Config file: {}", path.display());

    if path.exists() {
        let content = std::fs::read_to_string(path).context("Failed to read config file")?;
        match serde_json::from_str::<serde_json::Value>(&content) {
            Ok(raw) => {
                let diagnostics = check_fields(&raw);
                for diag in &diagnostics {
                    println!("{}", diag);
                }
                let warnings = diagnostics
                    .iter()
                    .filter(|d| d.level == DiagnosticLevel::Warn)
                    .count();
                if warnings > 0 {
                    println!("Found {} warning(s)", warnings);
                }
            }
            Err(e) => println!("[ERROR] Invalid JSON: {}", e),
        }
    } else {
        println!("[OK] No config file found (using defaults)");
    }

    match loaded {
        Ok(config) => {
            println!("\nEffective configuration:");
            println!("{}", serde_json::to_string_pretty(&config.masked())?);
            println!("\nConfiguration looks good!");
            Ok(())
        }
        Err(e) => {
            println!("[ERROR] {}", e);
            Err(anyhow::Error::new(e).context("configuration is invalid"))
        }
    }
}
