// src/config/mod.rs
// Resolved settings: environment over file over defaults

pub mod env;
pub mod file;

pub use env::{ConfigValidation, EnvConfig};
pub use file::MarginConfig;

use std::fmt;
use std::time::Duration;
use tracing::warn;
use url::Url;

use crate::correction::DEFAULT_CORRECTION_PROMPT;
use crate::currency::DEFAULT_EXCHANGE_RATE_API;
use crate::llm::{DEFAULT_API_BASE, DEFAULT_MODEL};

pub const DEFAULT_QUIET_PERIOD_MS: u64 = 1000;
pub const DEFAULT_MIN_CORRECTION_CHARS: usize = 10;

/// Which solve strategy answers inline expressions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SolverKind {
    #[default]
    Local,
    Ai,
}

impl SolverKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "local" => Some(Self::Local),
            "ai" => Some(Self::Ai),
            _ => None,
        }
    }
}

impl fmt::Display for SolverKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local => write!(f, "local"),
            Self::Ai => write!(f, "ai"),
        }
    }
}

/// Everything the analyzer needs, fully resolved
#[derive(Debug, Clone)]
pub struct Settings {
    pub api_key: Option<String>,
    pub api_base: String,
    pub model: String,
    pub solver_model: String,
    pub quiet_period: Duration,
    pub correction_prompt: String,
    pub currency_api: String,
    pub solver: SolverKind,
    pub min_correction_chars: usize,
    pub llm_disabled: bool,
    /// Problems found while resolving, reported by `validate`
    notes: Vec<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self::resolve(&EnvConfig::default(), &MarginConfig::default())
    }
}

impl Settings {
    /// Environment and `~/.margin/config.toml`
    pub fn load() -> Self {
        Self::resolve(&EnvConfig::load(), &MarginConfig::load())
    }

    /// Overlay environment values on file values on defaults
    pub fn resolve(env: &EnvConfig, file: &MarginConfig) -> Self {
        let mut notes: Vec<String> = env
            .ignored
            .iter()
            .map(|name| format!("{} could not be parsed and was ignored", name))
            .collect();

        let solver_raw = env.solver.as_deref().or(file.solver.strategy.as_deref());
        let mut solver = match solver_raw {
            Some(raw) => SolverKind::parse(raw).unwrap_or_else(|| {
                warn!(value = raw, "Unknown solver strategy, using local");
                notes.push(format!("Unknown solver strategy '{}'. Valid options: local, ai", raw));
                SolverKind::Local
            }),
            None => SolverKind::Local,
        };
        if env.disable_llm {
            solver = SolverKind::Local;
        }

        let pick = |env_value: &Option<String>, file_value: &Option<String>, default: &str| {
            env_value
                .clone()
                .or_else(|| file_value.clone())
                .unwrap_or_else(|| default.to_string())
        };

        Self {
            api_key: env.api_key.clone(),
            api_base: pick(&env.api_base, &None, DEFAULT_API_BASE),
            model: pick(&env.model, &file.correction.model, DEFAULT_MODEL),
            solver_model: pick(&env.solver_model, &file.solver.model, DEFAULT_MODEL),
            quiet_period: Duration::from_millis(
                env.quiet_period_ms
                    .or(file.correction.quiet_period_ms)
                    .unwrap_or(DEFAULT_QUIET_PERIOD_MS),
            ),
            correction_prompt: pick(
                &env.correction_prompt,
                &file.correction.prompt,
                DEFAULT_CORRECTION_PROMPT,
            ),
            currency_api: pick(
                &env.currency_api,
                &file.currency.api_base,
                DEFAULT_EXCHANGE_RATE_API,
            ),
            solver,
            min_correction_chars: env
                .min_correction_chars
                .or(file.correction.min_chars)
                .unwrap_or(DEFAULT_MIN_CORRECTION_CHARS),
            llm_disabled: env.disable_llm,
            notes,
        }
    }

    pub fn has_llm(&self) -> bool {
        self.api_key.is_some()
    }

    /// Validate the configuration
    pub fn validate(&self) -> ConfigValidation {
        let mut validation = ConfigValidation::new();

        for note in &self.notes {
            validation.add_warning(note.clone());
        }

        if !self.has_llm() {
            if self.llm_disabled {
                validation.add_warning("LLM disabled by MARGIN_DISABLE_LLM. Corrections are off.");
            } else {
                validation.add_warning(
                    "No API key configured. Set OPENAI_API_KEY to enable corrections.",
                );
            }
            if self.solver == SolverKind::Ai {
                validation.add_error("Solver strategy 'ai' needs an API key.");
            }
        }

        for (name, value) in [
            ("MARGIN_API_BASE", &self.api_base),
            ("MARGIN_CURRENCY_API", &self.currency_api),
        ] {
            if let Err(e) = Url::parse(value) {
                validation.add_error(format!("{} '{}' is not a valid URL: {}", name, value, e));
            }
        }

        if self.quiet_period < Duration::from_millis(100) {
            validation.add_warning(format!(
                "Quiet period of {}ms will send a correction on nearly every keystroke",
                self.quiet_period.as_millis()
            ));
        }

        if self.correction_prompt.trim().is_empty() {
            validation.add_error("Correction prompt is empty.");
        }

        validation
    }
}
