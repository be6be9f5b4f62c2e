//! Serializable locator settings.

use std::fmt;

use serde::Deserialize;

use crate::error::RoutingError;
use crate::locator::maglev::{DEFAULT_MAX_TABLE_SIZE, DEFAULT_VIRTUAL_HOST_COUNT};

/// Which routing algorithm to use.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LocatorStrategy {
    /// `hash mod active_count` over the sorted active hosts.
    Naive,
    /// Maglev consistent hashing.
    #[default]
    Maglev,
}

impl fmt::Display for LocatorStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Naive => f.write_str("naive"),
            Self::Maglev => f.write_str("maglev"),
        }
    }
}

/// `[locator]` section.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LocatorConfig {
    /// Routing algorithm.
    pub strategy: LocatorStrategy,
    /// Lookup table slots reserved per registered host (Maglev only).
    ///
    /// Pick it large enough that the registry rarely grows: a new table
    /// size regenerates every permutation.
    pub virtual_host_count: usize,
    /// Largest lookup table the Maglev locator may build.
    pub max_table_size: usize,
}

impl Default for LocatorConfig {
    fn default() -> Self {
        Self {
            strategy: LocatorStrategy::Maglev,
            virtual_host_count: DEFAULT_VIRTUAL_HOST_COUNT,
            max_table_size: DEFAULT_MAX_TABLE_SIZE,
        }
    }
}

impl LocatorConfig {
    /// Reject settings no locator can be built from.
    pub fn validate(&self) -> Result<(), RoutingError> {
        if self.virtual_host_count == 0 {
            return Err(RoutingError::InvalidConfiguration(
                "virtual_host_count must be at least 1".into(),
            ));
        }
        if self.max_table_size < self.virtual_host_count {
            return Err(RoutingError::InvalidConfiguration(format!(
                "max_table_size {} is smaller than virtual_host_count {}",
                self.max_table_size, self.virtual_host_count
            )));
        }
        Ok(())
    }
}

/// How keys are normalized before routing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum KeyTranslatorKind {
    /// Validate keys and pass them through unchanged.
    #[default]
    Default,
    /// Replace oversized keys with their SHA-256 digest, then validate.
    LargeKeyHashing,
}
