//! Retry policy configuration.
//!
//! The host application tunes the named executors through a TOML file with
//! optional environment overrides (prefix `LENDGUARD`, `__` as separator,
//! e.g. `LENDGUARD__STORE__MAX_RETRIES=5`). Absent keys fall back to the
//! built-in presets, so an empty file is valid.
//!
//! ```toml
//! [store]
//! max_retries = 5
//! circuit_breaker_threshold = 3
//!
//! [network]
//! base_delay_ms = 500
//! ```

use std::path::Path;
use std::time::Duration;

use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;

use crate::retry::RetryOptions;

/// Errors raised while loading or validating settings.
#[derive(Error, Debug)]
pub enum SettingsError {
    /// The underlying source could not be read or parsed.
    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    /// A value was parsed but is out of range.
    #[error("invalid setting: {0}")]
    Invalid(String),
}

/// Overrides for one executor's [`RetryOptions`]. Every field is optional.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct BackendSettings {
    /// Maximum attempts for one logical call.
    pub max_retries: Option<u32>,
    /// Base delay in milliseconds.
    pub base_delay_ms: Option<u64>,
    /// Delay cap in milliseconds.
    pub max_delay_ms: Option<u64>,
    /// Exponential growth factor.
    pub backoff_multiplier: Option<u32>,
    /// Whether to add jitter to delays.
    pub jitter_enabled: Option<bool>,
    /// Qualifying failures before the breaker opens.
    pub circuit_breaker_threshold: Option<u32>,
    /// Open-breaker rejection window in milliseconds.
    pub circuit_breaker_timeout_ms: Option<u64>,
}

impl BackendSettings {
    /// Applies these overrides on top of a preset.
    pub fn apply(&self, base: RetryOptions) -> RetryOptions {
        let mut options = base;
        if let Some(max_retries) = self.max_retries {
            options.max_retries = max_retries;
        }
        if let Some(ms) = self.base_delay_ms {
            options.base_delay = Duration::from_millis(ms);
        }
        if let Some(ms) = self.max_delay_ms {
            options.max_delay = Duration::from_millis(ms);
        }
        if let Some(multiplier) = self.backoff_multiplier {
            options.backoff_multiplier = multiplier;
        }
        if let Some(enabled) = self.jitter_enabled {
            options.jitter_enabled = enabled;
        }
        if let Some(threshold) = self.circuit_breaker_threshold {
            options.breaker_threshold = threshold;
        }
        if let Some(ms) = self.circuit_breaker_timeout_ms {
            options.breaker_timeout = Duration::from_millis(ms);
        }
        options
    }

    fn validate(&self, section: &str) -> Result<(), SettingsError> {
        if self.max_retries == Some(0) {
            return Err(SettingsError::Invalid(format!(
                "{}.max_retries must be at least 1",
                section
            )));
        }
        if self.backoff_multiplier == Some(0) {
            return Err(SettingsError::Invalid(format!(
                "{}.backoff_multiplier must be at least 1",
                section
            )));
        }
        if self.circuit_breaker_threshold == Some(0) {
            return Err(SettingsError::Invalid(format!(
                "{}.circuit_breaker_threshold must be at least 1",
                section
            )));
        }
        Ok(())
    }
}

/// Per-backend retry policy for the application's executors.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct ResilienceSettings {
    /// Remote document store executor.
    pub store: BackendSettings,
    /// Raw network executor.
    pub network: BackendSettings,
    /// Borrower-profile executor.
    pub profile: BackendSettings,
}

impl ResilienceSettings {
    /// Loads settings from an optional TOML file plus environment overrides.
    ///
    /// # Errors
    /// Returns an error when the file exists but cannot be parsed, or when a
    /// parsed value is out of range.
    pub fn load(path: Option<&Path>) -> Result<Self, SettingsError> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path));
        }
        let config = builder
            .add_source(
                Environment::with_prefix("LENDGUARD")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let settings: Self = config.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<(), SettingsError> {
        self.store.validate("store")?;
        self.network.validate("network")?;
        self.profile.validate("profile")?;
        Ok(())
    }

    /// Options for the store executor.
    pub fn store_options(&self) -> RetryOptions {
        self.store.apply(RetryOptions::store())
    }

    /// Options for the network executor.
    pub fn network_options(&self) -> RetryOptions {
        self.network.apply(RetryOptions::network())
    }

    /// Options for the profile executor.
    pub fn profile_options(&self) -> RetryOptions {
        self.profile.apply(RetryOptions::profile())
    }
}
