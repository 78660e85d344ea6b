// src/config/env.rs
// Environment-based configuration - single source of truth for all env vars

use tracing::{debug, info, warn};

/// Raw environment overrides, unparsed values already filtered out
#[derive(Debug, Clone, Default)]
pub struct EnvConfig {
    /// OPENAI_API_KEY, or MARGIN_API_KEY when the former is unset
    pub api_key: Option<String>,
    /// MARGIN_API_BASE
    pub api_base: Option<String>,
    /// MARGIN_MODEL
    pub model: Option<String>,
    /// MARGIN_SOLVER_MODEL
    pub solver_model: Option<String>,
    /// MARGIN_QUIET_PERIOD_MS
    pub quiet_period_ms: Option<u64>,
    /// MARGIN_CORRECTION_PROMPT
    pub correction_prompt: Option<String>,
    /// MARGIN_CURRENCY_API
    pub currency_api: Option<String>,
    /// MARGIN_SOLVER
    pub solver: Option<String>,
    /// MARGIN_MIN_CORRECTION_CHARS
    pub min_correction_chars: Option<usize>,
    /// MARGIN_DISABLE_LLM
    pub disable_llm: bool,
    /// Variables that were set but could not be parsed
    pub ignored: Vec<String>,
}

impl EnvConfig {
    /// Load all environment configuration (call once at startup)
    pub fn load() -> Self {
        info!("Loading environment configuration");
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from any variable source; empty values count as unset
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let mut ignored = Vec::new();

        let mut parse_num = |name: &str| -> Option<u64> {
            let raw = read(name)?;
            match raw.trim().parse() {
                Ok(v) => Some(v),
                Err(_) => {
                    warn!(var = name, value = %raw, "Ignoring non-numeric value");
                    ignored.push(name.to_string());
                    None
                }
            }
        };
        let quiet_period_ms = parse_num("MARGIN_QUIET_PERIOD_MS");
        let min_correction_chars = parse_num("MARGIN_MIN_CORRECTION_CHARS").map(|v| v as usize);

        let disable_llm = match read("MARGIN_DISABLE_LLM") {
            Some(raw) => parse_bool(&raw).unwrap_or_else(|| {
                ignored.push("MARGIN_DISABLE_LLM".to_string());
                false
            }),
            None => false,
        };

        let api_key = if disable_llm {
            info!("MARGIN_DISABLE_LLM is set, LLM features disabled");
            None
        } else {
            read("OPENAI_API_KEY").or_else(|| read("MARGIN_API_KEY"))
        };
        if api_key.is_some() {
            debug!("API key loaded");
        }

        Self {
            api_key,
            api_base: read("MARGIN_API_BASE"),
            model: read("MARGIN_MODEL"),
            solver_model: read("MARGIN_SOLVER_MODEL"),
            quiet_period_ms,
            correction_prompt: read("MARGIN_CORRECTION_PROMPT"),
            currency_api: read("MARGIN_CURRENCY_API"),
            solver: read("MARGIN_SOLVER"),
            min_correction_chars,
            disable_llm,
            ignored,
        }
    }
}

/// Configuration validation result
#[derive(Debug)]
pub struct ConfigValidation {
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
}

impl Default for ConfigValidation {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigValidation {
    pub fn new() -> Self {
        Self {
            warnings: Vec::new(),
            errors: Vec::new(),
        }
    }

    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn add_warning(&mut self, msg: impl Into<String>) {
        self.warnings.push(msg.into());
    }

    pub fn add_error(&mut self, msg: impl Into<String>) {
        self.errors.push(msg.into());
    }

    /// Format as a human-readable report
    pub fn report(&self) -> String {
        let mut lines = Vec::new();

        if !self.errors.is_empty() {
            lines.push("Errors:".to_string());
            for err in &self.errors {
                lines.push(format!("  - {}", err));
            }
        }

        if !self.warnings.is_empty() {
            lines.push("Warnings:".to_string());
            for warn in &self.warnings {
                lines.push(format!("  - {}", warn));
            }
        }

        if lines.is_empty() {
            "Configuration OK".to_string()
        } else {
            lines.join("\n")
        }
    }
}

pub(crate) fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> EnvConfig {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        EnvConfig::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn test_empty_environment() {
        let config = env(&[]);
        assert!(config.api_key.is_none());
        assert!(config.quiet_period_ms.is_none());
        assert!(!config.disable_llm);
        assert!(config.ignored.is_empty());
    }

    #[test]
    fn test_api_key_precedence() {
        let config = env(&[("OPENAI_API_KEY", "sk-a"), ("MARGIN_API_KEY", "sk-b")]);
        assert_eq!(config.api_key.as_deref(), Some("sk-a"));

        let config = env(&[("OPENAI_API_KEY", "  "), ("MARGIN_API_KEY", "sk-b")]);
        assert_eq!(config.api_key.as_deref(), Some("sk-b"));
    }

    #[test]
    fn test_disable_llm_drops_key() {
        let config = env(&[("OPENAI_API_KEY", "sk-a"), ("MARGIN_DISABLE_LLM", "yes")]);
        assert!(config.disable_llm);
        assert!(config.api_key.is_none());
    }

    #[test]
    fn test_numeric_values() {
        let config = env(&[
            ("MARGIN_QUIET_PERIOD_MS", "250"),
            ("MARGIN_MIN_CORRECTION_CHARS", "oops"),
        ]);
        assert_eq!(config.quiet_period_ms, Some(250));
        assert!(config.min_correction_chars.is_none());
        assert_eq!(config.ignored, vec!["MARGIN_MIN_CORRECTION_CHARS".to_string()]);
    }

    #[test]
    fn test_parse_bool() {
        assert_eq!(parse_bool("TRUE"), Some(true));
        assert_eq!(parse_bool(" off "), Some(false));
        assert_eq!(parse_bool("maybe"), None);
    }

    #[test]
    fn test_validation_report() {
        let mut validation = ConfigValidation::new();
        assert_eq!(validation.report(), "Configuration OK");
        validation.add_warning("w");
        assert!(validation.is_valid());
        validation.add_error("e");
        assert!(!validation.is_valid());
        assert_eq!(validation.report(), "Errors:\n  - e\nWarnings:\n  - w");
    }
}
