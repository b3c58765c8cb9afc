//! Broker configuration.
//!
//! A deployment declares its brokers once, by alias:
//!
//! ```yaml
//! brokers:
//!   - alias: events
//!     type: publisher
//!     driver: redis
//!     dsn: redis://localhost:6379/0?maxActive=8
//!   - alias: audit
//!     enable: false
//!     type: consumer
//!     driver: kafka
//!     dsn: kafka://k1:9092,k2:9092?broker_version=2.1.0
//! ```

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Environment variable naming an extra config file.
pub const CONFIG_ENV_VAR: &str = "RELAYQ_CONFIG";

/// Prefix for environment overrides, e.g. `RELAYQ__BROKERS`.
pub const CONFIG_ENV_PREFIX: &str = "RELAYQ";

const DEFAULT_CONFIG_FILE: &str = "config.yaml";

/// Which side of a transport a broker entry opens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BrokerType {
    Publisher,
    Consumer,
}

/// One configured broker.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct BrokerConfig {
    #[serde(default = "default_enable")]
    pub enable: bool,
    /// Name the broker is looked up by.
    pub alias: String,
    #[serde(rename = "type")]
    pub kind: BrokerType,
    /// Registered driver name.
    pub driver: String,
    pub dsn: String,
}

fn default_enable() -> bool {
    true
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub brokers: Vec<BrokerConfig>,
}

impl Config {
    /// Load configuration from file and environment.
    ///
    /// Configuration sources (in order of priority, later overrides earlier):
    /// 1. `config.yaml` in current directory (if exists)
    /// 2. File specified by `path` argument (if provided)
    /// 3. File specified by `RELAYQ_CONFIG` (if set)
    /// 4. Environment variables prefixed `RELAYQ__`
    pub fn load(path: Option<&str>) -> Result<Self> {
        use ::config::{Config as ConfigLib, Environment, File, FileFormat};

        let mut builder = ConfigLib::builder()
            .add_source(File::new(DEFAULT_CONFIG_FILE, FileFormat::Yaml).required(false));

        if let Some(config_path) = path {
            builder = builder.add_source(File::new(config_path, FileFormat::Yaml).required(true));
        }

        if let Ok(config_path) = std::env::var(CONFIG_ENV_VAR) {
            builder = builder.add_source(File::new(&config_path, FileFormat::Yaml).required(true));
        }

        let config = builder
            .add_source(
                Environment::with_prefix(CONFIG_ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        Ok(config.try_deserialize()?)
    }

    /// Parse a YAML document.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        use ::config::{Config as ConfigLib, File, FileFormat};

        let config = ConfigLib::builder()
            .add_source(File::from_str(yaml, FileFormat::Yaml))
            .build()?;
        Ok(config.try_deserialize()?)
    }

    /// Brokers with `enable` set.
    pub fn enabled_brokers(&self) -> impl Iterator<Item = &BrokerConfig> {
        self.brokers.iter().filter(|broker| broker.enable)
    }
}
