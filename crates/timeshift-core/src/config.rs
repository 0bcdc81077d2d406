//! Configuration module for Timeshift Core.
//!
//! Settings come from defaults, then an optional TOML file named by
//! `TIMESHIFT_CONFIG`, then `TIMESHIFT_*` environment overrides. Credentials
//! are not part of this: the model reads its own key on first use.

use crate::retry::RetryPolicy;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use timeshift_models::gemini::DEFAULT_MODEL_ID;
use timeshift_models::{ModelConfig, ModelType};

/// Environment variable naming the config file.
pub const CONFIG_PATH_ENV: &str = "TIMESHIFT_CONFIG";

/// Errors that can occur while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("Failed to read config file {}: {source}", path.display())]
    Io {
        /// Path that was being read.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The config file is not valid TOML for this schema.
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// A setting has an unusable value.
    #[error("Invalid value for {key}: {reason}")]
    InvalidValue {
        /// Setting name.
        key: String,
        /// Why it was rejected.
        reason: String,
    },
}

/// Model configuration section.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct ModelSection {
    /// The type of model (gemini, scripted).
    #[serde(default = "default_model_type")]
    pub model_type: String,
    /// The model ID.
    #[serde(default = "default_model_id")]
    pub model_id: String,
    /// Optional endpoint override.
    #[serde(default)]
    pub base_url: Option<String>,
    /// Optional API key override (if not provided, will be loaded from environment on first use).
    #[serde(default)]
    pub api_key: Option<String>,
}

fn default_model_type() -> String {
    "gemini".to_string()
}

fn default_model_id() -> String {
    DEFAULT_MODEL_ID.to_string()
}

impl Default for ModelSection {
    fn default() -> Self {
        Self {
            model_type: default_model_type(),
            model_id: default_model_id(),
            base_url: None,
            api_key: None,
        }
    }
}

/// Retry configuration section.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
pub struct RetrySection {
    /// Total calls per cycle (default: 3).
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Delay before the second attempt in milliseconds (default: 1000).
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_delay_ms() -> u64 {
    1000
}

impl Default for RetrySection {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay_ms: default_initial_delay_ms(),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Pretty,
    /// One JSON object per event.
    Json,
}

impl FromStr for LogFormat {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pretty" | "text" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            _ => Err(()),
        }
    }
}

/// Logging configuration section.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct LoggingSection {
    /// Output format.
    #[serde(default)]
    pub format: LogFormat,
    /// Filter directives used when `RUST_LOG` is unset.
    #[serde(default)]
    pub filter: Option<String>,
}

/// Root configuration for Timeshift.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct Config {
    /// Model configuration.
    #[serde(default)]
    pub model: ModelSection,
    /// Retry configuration.
    #[serde(default)]
    pub retry: RetrySection,
    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingSection,
}

impl Config {
    /// Create a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse configuration from TOML text.
    ///
    /// # Errors
    /// Returns `ConfigError::Parse` for malformed TOML.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Read configuration from a TOML file.
    ///
    /// # Errors
    /// Returns `ConfigError::Io` if the file cannot be read, or
    /// `ConfigError::Parse` if it is not valid.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Load configuration from the process environment.
    ///
    /// # Errors
    /// Returns an error if the config file cannot be loaded or a setting is invalid.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_with(|key| std::env::var(key).ok())
    }

    /// Load configuration using `lookup` in place of the process environment.
    ///
    /// # Errors
    /// Returns an error if the config file cannot be loaded or a setting is invalid.
    pub fn load_with<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = match lookup(CONFIG_PATH_ENV).filter(|p| !p.trim().is_empty()) {
            Some(path) => Self::from_file(Path::new(&path))?,
            None => Self::default(),
        };
        config.apply_overrides(&lookup)?;
        config.validate()?;
        Ok(config)
    }

    fn apply_overrides<F>(&mut self, lookup: &F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup("TIMESHIFT_MODEL_TYPE") {
            self.model.model_type = value;
        }
        if let Some(value) = lookup("TIMESHIFT_MODEL_ID") {
            self.model.model_id = value;
        }
        if let Some(value) = lookup("TIMESHIFT_BASE_URL") {
            self.model.base_url = Some(value);
        }
        if let Some(value) = lookup("TIMESHIFT_MAX_ATTEMPTS") {
            self.retry.max_attempts = parse_number("TIMESHIFT_MAX_ATTEMPTS", &value)?;
        }
        if let Some(value) = lookup("TIMESHIFT_INITIAL_DELAY_MS") {
            self.retry.initial_delay_ms = parse_number("TIMESHIFT_INITIAL_DELAY_MS", &value)?;
        }
        if let Some(value) = lookup("TIMESHIFT_LOG_FORMAT") {
            self.logging.format = LogFormat::from_str(&value).map_err(|()| {
                ConfigError::InvalidValue {
                    key: "TIMESHIFT_LOG_FORMAT".to_string(),
                    reason: format!("unknown log format '{}'", value),
                }
            })?;
        }
        Ok(())
    }

    /// Validate the configuration.
    ///
    /// # Errors
    /// Returns `ConfigError::InvalidValue` if any setting is out of range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::InvalidValue {
                key: "retry.max_attempts".to_string(),
                reason: "must be greater than 0".to_string(),
            });
        }
        if self.retry.initial_delay_ms == 0 {
            return Err(ConfigError::InvalidValue {
                key: "retry.initial_delay_ms".to_string(),
                reason: "must be greater than 0".to_string(),
            });
        }
        self.model_type()?;
        Ok(())
    }

    /// The parsed model type.
    ///
    /// # Errors
    /// Returns `ConfigError::InvalidValue` for an unknown model type.
    pub fn model_type(&self) -> Result<ModelType, ConfigError> {
        ModelType::from_str(&self.model.model_type).map_err(|()| ConfigError::InvalidValue {
            key: "model.model_type".to_string(),
            reason: format!("unknown model type '{}'", self.model.model_type),
        })
    }

    /// The model factory configuration described by this config.
    ///
    /// # Errors
    /// Returns `ConfigError::InvalidValue` for an unknown model type.
    pub fn model_config(&self) -> Result<ModelConfig, ConfigError> {
        let mut config = ModelConfig::new(self.model_type()?, self.model.model_id.clone());
        if let Some(api_key) = &self.model.api_key {
            config = config.with_api_key(api_key.clone());
        }
        if let Some(base_url) = &self.model.base_url {
            config = config.with_base_url(base_url.clone());
        }
        Ok(config)
    }

    /// The retry policy described by this config.
    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.retry.max_attempts,
            Duration::from_millis(self.retry.initial_delay_ms),
        )
    }
}

fn parse_number<T: FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        reason: format!("'{}' is not a valid number", value),
    })
}
