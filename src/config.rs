//! Configuration System using Figment
//!
//! This module provides strongly-typed configuration loading for the simulated
//! instruments. Configuration is layered:
//! 1. Built-in defaults (`SimConfig::default()`)
//! 2. `config/sim.toml` (or an explicit path)
//! 3. Environment variables prefixed with `RUST_DAQ_`, nested keys separated by `__`
//!
//! # Example
//! ```no_run
//! use rust_daq_teaching::config::SimConfig;
//!
//! let config = SimConfig::load()?;
//! println!("Application: {}", config.application.name);
//! # Ok::<(), rust_daq_teaching::error::DaqError>(())
//! ```
//!
//! # Environment Variables
//!
//! - `RUST_DAQ_APPLICATION__LOG_LEVEL=debug` → sets `application.log_level`
//! - `RUST_DAQ_APPLICATION__LOG_FORMAT=json` → sets `application.log_format`

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{AppResult, DaqError};
use crate::hardware::registry::DriverType;

/// Default configuration file, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "config/sim.toml";

/// Prefix for environment overrides.
pub const ENV_PREFIX: &str = "RUST_DAQ_";

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SimConfig {
    /// Application settings
    #[serde(default)]
    pub application: ApplicationConfig,
    /// Instrument definitions
    #[serde(default)]
    pub instruments: Vec<InstrumentDefinition>,
}

/// Application-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicationConfig {
    /// Application name
    pub name: String,
    /// Logging level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Log output format (pretty, compact, json)
    #[serde(default = "default_log_format")]
    pub log_format: String,
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            name: "Teaching instruments".to_string(),
            log_level: "info".to_string(),
            log_format: default_log_format(),
        }
    }
}

/// Instrument definition in configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstrumentDefinition {
    /// Unique instrument identifier
    pub id: String,
    /// Instrument type ("spectrometer", "beam_steering", "multimeter")
    pub r#type: String,
    /// Human-readable name, defaults to the id
    #[serde(default)]
    pub name: Option<String>,
    /// Whether this instrument is enabled
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Instrument-specific configuration, deserialized by the driver
    #[serde(default = "empty_table")]
    pub config: toml::Value,
}

impl InstrumentDefinition {
    /// Definition with an empty driver table.
    pub fn new(id: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            r#type: kind.into(),
            name: None,
            enabled: true,
            config: empty_table(),
        }
    }

    /// Display name, falling back to the id.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }
}

fn default_log_format() -> String {
    "pretty".to_string()
}

fn default_enabled() -> bool {
    true
}

fn empty_table() -> toml::Value {
    toml::Value::Table(toml::map::Map::new())
}

const VALID_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];
const VALID_FORMATS: [&str; 3] = ["pretty", "compact", "json"];

impl SimConfig {
    /// Load configuration from `config/sim.toml` and environment variables
    pub fn load() -> AppResult<Self> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// Load configuration from a specific file path
    ///
    /// A missing file is not an error; defaults and environment still apply.
    pub fn load_from<P: AsRef<Path>>(path: P) -> AppResult<Self> {
        let config: SimConfig = Self::figment(path.as_ref()).extract()?;
        config.validate()?;
        Ok(config)
    }

    /// The layered figment behind [`SimConfig::load_from`].
    pub fn figment(path: &Path) -> Figment {
        Figment::from(Serialized::defaults(SimConfig::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Parse configuration from a TOML string (no environment layer).
    pub fn from_toml_str(toml: &str) -> AppResult<Self> {
        let config: SimConfig = Figment::from(Serialized::defaults(SimConfig::default()))
            .merge(Toml::string(toml))
            .extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> AppResult<()> {
        if !VALID_LEVELS.contains(&self.application.log_level.as_str()) {
            return Err(DaqError::Configuration(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.application.log_level,
                VALID_LEVELS.join(", ")
            )));
        }

        if !VALID_FORMATS.contains(&self.application.log_format.as_str()) {
            return Err(DaqError::Configuration(format!(
                "Invalid log_format '{}'. Must be one of: {}",
                self.application.log_format,
                VALID_FORMATS.join(", ")
            )));
        }

        let mut ids = std::collections::HashSet::new();
        for instrument in &self.instruments {
            if !ids.insert(&instrument.id) {
                return Err(DaqError::Configuration(format!(
                    "Duplicate instrument ID: {}",
                    instrument.id
                )));
            }
            DriverType::from_definition(instrument)?;
        }

        Ok(())
    }

    /// Get all enabled instruments
    pub fn enabled_instruments(&self) -> Vec<&InstrumentDefinition> {
        self.instruments
            .iter()
            .filter(|inst| inst.enabled)
            .collect()
    }
}
