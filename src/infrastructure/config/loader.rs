use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use std::path::Path;
use thiserror::Error;

use crate::domain::models::config::Config;

/// Prefix for environment overrides, e.g. `RESEARCH_SWARM_SANDBOX__MODE`.
pub const ENV_PREFIX: &str = "RESEARCH_SWARM_";

/// Configuration error types
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    #[error("Invalid log format: {0}. Must be one of: json, pretty")]
    InvalidLogFormat(String),

    #[error("Invalid log rotation: {0}. Must be one of: daily, hourly, never")]
    InvalidRotation(String),

    #[error("Invalid {resource} concurrency limit: {value}. Must be at least 1")]
    InvalidConcurrencyLimit { resource: &'static str, value: usize },

    #[error("Invalid max_attempts: {0}. Cannot be 0")]
    InvalidMaxAttempts(u32),

    #[error("Invalid timeout for {0}: must be positive")]
    InvalidTimeout(&'static str),

    #[error("Invalid cpu_limit: {0}. Must be positive")]
    InvalidCpuLimit(f64),

    #[error("{0} cannot be empty")]
    EmptyField(&'static str),
}

/// Configuration loader with hierarchical merging
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration with hierarchical merging
    ///
    /// Precedence (lowest to highest):
    /// 1. Programmatic defaults (Serialized)
    /// 2. .research-swarm/config.yaml (project config)
    /// 3. .research-swarm/local.yaml (project local overrides, optional)
    /// 4. Environment variables (RESEARCH_SWARM_* prefix, `__` separates sections)
    pub fn load() -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(".research-swarm/config.yaml"))
            .merge(Yaml::file(".research-swarm/local.yaml"))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .context("Failed to extract configuration from figment")?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Load defaults, then a specific file, then environment overrides
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Config> {
        let config: Config = Self::file_figment(path.as_ref())
            .extract()
            .with_context(|| format!("Failed to load config from {}", path.as_ref().display()))?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Load from `path` when given, otherwise from the project directory
    pub fn load_or_default(path: Option<&Path>) -> Result<Config> {
        match path {
            Some(path) => Self::load_from_file(path),
            None => Self::load(),
        }
    }

    fn file_figment(path: &Path) -> Figment {
        Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Validate configuration after loading
    pub fn validate(config: &Config) -> Result<(), ConfigError> {
        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&config.logging.level.to_lowercase().as_str()) {
            return Err(ConfigError::InvalidLogLevel(config.logging.level.clone()));
        }

        let valid_log_formats = ["json", "pretty"];
        if !valid_log_formats.contains(&config.logging.format.as_str()) {
            return Err(ConfigError::InvalidLogFormat(config.logging.format.clone()));
        }

        let valid_rotations = ["daily", "hourly", "never"];
        if !valid_rotations.contains(&config.logging.rotation.as_str()) {
            return Err(ConfigError::InvalidRotation(config.logging.rotation.clone()));
        }

        if config.concurrency.retrieval_limit == 0 {
            return Err(ConfigError::InvalidConcurrencyLimit {
                resource: "retrieval",
                value: config.concurrency.retrieval_limit,
            });
        }
        if config.concurrency.generation_limit == 0 {
            return Err(ConfigError::InvalidConcurrencyLimit {
                resource: "generation",
                value: config.concurrency.generation_limit,
            });
        }

        if config.verification.max_attempts == 0 {
            return Err(ConfigError::InvalidMaxAttempts(config.verification.max_attempts));
        }
        if config.verification.timeout_secs == 0 {
            return Err(ConfigError::InvalidTimeout("verification"));
        }

        if config.sandbox.timeout_secs == 0 {
            return Err(ConfigError::InvalidTimeout("sandbox"));
        }
        if config.sandbox.probe_timeout_secs == 0 {
            return Err(ConfigError::InvalidTimeout("sandbox probe"));
        }
        if config.sandbox.cpu_limit <= 0.0 {
            return Err(ConfigError::InvalidCpuLimit(config.sandbox.cpu_limit));
        }
        if config.sandbox.interpreter.trim().is_empty() {
            return Err(ConfigError::EmptyField("sandbox.interpreter"));
        }
        if config.sandbox.runtime.trim().is_empty() {
            return Err(ConfigError::EmptyField("sandbox.runtime"));
        }
        if config.sandbox.image.trim().is_empty() {
            return Err(ConfigError::EmptyField("sandbox.image"));
        }

        if config.generation.base_url.trim().is_empty() {
            return Err(ConfigError::EmptyField("generation.base_url"));
        }
        if config.generation.timeout_secs == 0 {
            return Err(ConfigError::InvalidTimeout("generation"));
        }
        if config.retrieval.base_url.trim().is_empty() {
            return Err(ConfigError::EmptyField("retrieval.base_url"));
        }
        if config.retrieval.timeout_secs == 0 {
            return Err(ConfigError::InvalidTimeout("retrieval"));
        }

        Ok(())
    }
}
