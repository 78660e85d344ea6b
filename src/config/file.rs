// src/config/file.rs
// File-based configuration from ~/.margin/config.toml

use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Top-level config structure
#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
pub struct MarginConfig {
    #[serde(default)]
    pub correction: CorrectionFileConfig,
    #[serde(default)]
    pub solver: SolverFileConfig,
    #[serde(default)]
    pub currency: CurrencyFileConfig,
}

/// `[correction]`
#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
pub struct CorrectionFileConfig {
    /// Natural-language correction instruction
    pub prompt: Option<String>,
    pub quiet_period_ms: Option<u64>,
    pub model: Option<String>,
    /// Minimum trimmed document length worth correcting
    pub min_chars: Option<usize>,
}

/// `[solver]`
#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
pub struct SolverFileConfig {
    /// "local" or "ai"
    pub strategy: Option<String>,
    pub model: Option<String>,
}

/// `[currency]`
#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
pub struct CurrencyFileConfig {
    pub api_base: Option<String>,
}

impl MarginConfig {
    /// Load config from ~/.margin/config.toml
    pub fn load() -> Self {
        Self::load_from(&Self::config_path())
    }

    /// Load from an explicit path; missing or malformed files give defaults
    pub fn load_from(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => match toml::from_str(&contents) {
                Ok(config) => {
                    debug!(path = %path.display(), "Loaded config from file");
                    config
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Failed to parse config file");
                    Self::default()
                }
            },
            Err(_) => {
                debug!(path = %path.display(), "Config file not found, using defaults");
                Self::default()
            }
        }
    }

    /// Get the config file path
    pub fn config_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".margin")
            .join("config.toml")
    }
}
