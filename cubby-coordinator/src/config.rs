//! TOML configuration for the routing coordinator.
//!
//! ```toml
//! [locator]
//! strategy = "maglev"
//! virtual_host_count = 100
//!
//! [keys]
//! translator = "large-key-hashing"
//!
//! [log]
//! level = "info"
//!
//! [[hosts]]
//! name = "cache-a"
//! address = "10.0.0.1:11211"
//! ```

use std::collections::HashSet;
use std::path::Path;

use cubby_core::{KeyTranslatorKind, LocatorConfig, RoutingError};
use serde::Deserialize;

use crate::error::ConfigError;

/// Top-level configuration, parsed from TOML.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    /// Cache hosts registered at startup.
    pub hosts: Vec<HostEntry>,
    /// Routing algorithm and table sizing.
    pub locator: LocatorConfig,
    /// Key normalization.
    pub keys: KeySection,
    /// Logging configuration.
    pub log: LogSection,
}

/// One `[[hosts]]` entry.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct HostEntry {
    /// Unique, stable host name used for routing.
    pub name: String,
    /// `host:port` the transport connects to.
    pub address: String,
}

/// `[keys]` section.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct KeySection {
    /// Translator applied to every key before routing.
    pub translator: KeyTranslatorKind,
}

/// `[log]` section.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LogSection {
    /// Default level filter; `RUST_LOG` takes precedence when set.
    pub level: String,
}

impl Default for LogSection {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl CoordinatorConfig {
    /// Load and validate configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    /// Parse and validate configuration from a TOML string.
    pub fn from_toml(s: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Check host entries and locator settings.
    pub fn validate(&self) -> Result<(), RoutingError> {
        self.locator.validate()?;

        let mut names = HashSet::new();
        for host in &self.hosts {
            if host.name.is_empty() {
                return Err(RoutingError::InvalidConfiguration(
                    "host name must not be empty".into(),
                ));
            }
            if !names.insert(host.name.as_str()) {
                return Err(RoutingError::InvalidConfiguration(format!(
                    "host {} is listed more than once",
                    host.name
                )));
            }
            validate_address(&host.address)?;
        }
        Ok(())
    }
}

/// Check that `address` has the `host:port` form.
pub fn validate_address(address: &str) -> Result<(), RoutingError> {
    let invalid = || RoutingError::InvalidConfiguration(format!("address {address:?} is not host:port"));

    let (host, port) = address.rsplit_once(':').ok_or_else(invalid)?;
    if host.is_empty() || port.parse::<u16>().map_or(true, |port| port == 0) {
        return Err(invalid());
    }
    Ok(())
}
