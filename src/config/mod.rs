//! Configuration (layered: defaults > TOML file > env).

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use bon::Builder;
use serde::{Deserialize, Serialize};

use crate::error::{Result, TurnError};

/// Global default config (lazy-initialized from env).
static DEFAULT_CONFIG: OnceLock<TurnConfig> = OnceLock::new();

pub const DEFAULT_REPLY_RESERVE_TOKENS: usize = 3;
pub const DEFAULT_CALIBRATION_MIN_RATIO: f64 = 1.0 / 3.0;
pub const DEFAULT_CALIBRATION_MAX_RATIO: f64 = 2.5;
pub const DEFAULT_THINK_OPEN_TAG: &str = "<think>";
pub const DEFAULT_THINK_CLOSE_TAG: &str = "</think>";
pub const DEFAULT_STEP_KEY_SEPARATOR: &str = "__";

const ENV_RESERVE_TOKENS: &str = "ROCI_TURN_RESERVE_TOKENS";
const ENV_MIN_RATIO: &str = "ROCI_TURN_CALIBRATION_MIN_RATIO";
const ENV_MAX_RATIO: &str = "ROCI_TURN_CALIBRATION_MAX_RATIO";
const ENV_OPEN_TAG: &str = "ROCI_TURN_THINK_OPEN_TAG";
const ENV_CLOSE_TAG: &str = "ROCI_TURN_THINK_CLOSE_TAG";

/// Tunables for stream reconciliation and context pruning.
///
/// The calibration band is empirically tuned; keep it configurable rather
/// than hard-coding it at call sites.
#[derive(Debug, Clone, PartialEq, Builder, Serialize, Deserialize)]
#[serde(default)]
pub struct TurnConfig {
    /// Tokens reserved for the reply preamble.
    #[builder(default = DEFAULT_REPLY_RESERVE_TOKENS)]
    pub reply_reserve_tokens: usize,
    /// Lower bound for an accepted usage/estimate ratio.
    #[builder(default = DEFAULT_CALIBRATION_MIN_RATIO)]
    pub calibration_min_ratio: f64,
    /// Upper bound for an accepted usage/estimate ratio.
    #[builder(default = DEFAULT_CALIBRATION_MAX_RATIO)]
    pub calibration_max_ratio: f64,
    #[builder(default = DEFAULT_THINK_OPEN_TAG.to_string(), into)]
    pub think_open_tag: String,
    #[builder(default = DEFAULT_THINK_CLOSE_TAG.to_string(), into)]
    pub think_close_tag: String,
    #[builder(default = DEFAULT_STEP_KEY_SEPARATOR.to_string(), into)]
    pub step_key_separator: String,
}

impl Default for TurnConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl TurnConfig {
    /// Parse a TOML document; missing keys keep their defaults.
    pub fn from_toml_str(source: &str) -> Result<Self> {
        let config: Self = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a TOML config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let source = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&source)
    }

    /// Platform config location: `<config dir>/roci/turn.toml`.
    pub fn default_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "roci")
            .map(|dirs| dirs.config_dir().join("turn.toml"))
    }

    /// Defaults, overlaid with the default config file when present, then env.
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv(); // load .env if present, ignore error

        let base = Self::default_path()
            .filter(|path| path.is_file())
            .and_then(|path| match Self::load(&path) {
                Ok(config) => Some(config),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "ignoring invalid turn config file");
                    None
                }
            })
            .unwrap_or_default();

        match base.clone().with_env_overrides() {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!(error = %e, "ignoring invalid turn config environment");
                base
            }
        }
    }

    /// Get (or create) the global default config.
    pub fn global() -> &'static TurnConfig {
        DEFAULT_CONFIG.get_or_init(Self::from_env)
    }

    /// Apply `ROCI_TURN_*` environment overrides.
    pub fn with_env_overrides(mut self) -> Result<Self> {
        if let Some(value) = env_value(ENV_RESERVE_TOKENS) {
            self.reply_reserve_tokens = parse_env(ENV_RESERVE_TOKENS, &value)?;
        }
        if let Some(value) = env_value(ENV_MIN_RATIO) {
            self.calibration_min_ratio = parse_env(ENV_MIN_RATIO, &value)?;
        }
        if let Some(value) = env_value(ENV_MAX_RATIO) {
            self.calibration_max_ratio = parse_env(ENV_MAX_RATIO, &value)?;
        }
        if let Some(value) = env_value(ENV_OPEN_TAG) {
            self.think_open_tag = value;
        }
        if let Some(value) = env_value(ENV_CLOSE_TAG) {
            self.think_close_tag = value;
        }
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<()> {
        if self.think_open_tag.is_empty() || self.think_close_tag.is_empty() {
            return Err(TurnError::Configuration(
                "thinking tags must not be empty".to_string(),
            ));
        }
        if self.think_open_tag == self.think_close_tag {
            return Err(TurnError::Configuration(
                "opening and closing thinking tags must differ".to_string(),
            ));
        }
        if self.step_key_separator.is_empty() {
            return Err(TurnError::Configuration(
                "step key separator must not be empty".to_string(),
            ));
        }
        if !(self.calibration_min_ratio > 0.0
            && self.calibration_min_ratio <= self.calibration_max_ratio)
        {
            return Err(TurnError::Configuration(format!(
                "invalid calibration band [{}, {}]",
                self.calibration_min_ratio, self.calibration_max_ratio
            )));
        }
        Ok(())
    }

    /// Whether a usage/estimate ratio falls inside the accepted band.
    pub fn accepts_ratio(&self, ratio: f64) -> bool {
        ratio.is_finite() && ratio >= self.calibration_min_ratio && ratio <= self.calibration_max_ratio
    }
}

fn env_value(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| TurnError::Configuration(format!("{key} has invalid value '{value}'")))
}
