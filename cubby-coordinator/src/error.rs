//! Error types for the coordinator crate.

use std::path::PathBuf;

use cubby_core::RoutingError;

/// Errors produced while loading coordinator configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read {}: {source}", path.display())]
    Io {
        /// File that was being read.
        path: PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: std::io::Error,
    },

    /// The configuration is not valid TOML for this schema.
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// The configuration parsed but describes an unusable setup.
    #[error(transparent)]
    Invalid(#[from] RoutingError),
}
