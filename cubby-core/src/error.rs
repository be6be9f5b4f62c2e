//! Error types for host routing.

/// Errors produced while building routing state or resolving keys.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RoutingError {
    /// The current routing snapshot has no active hosts.
    #[error("no available host")]
    NoAvailableHost,

    /// A rebuild violated an internal invariant. The previously published
    /// snapshot remains in effect.
    #[error("routing build failed: {0}")]
    BuildFailure(String),

    /// Locator or pool configuration was rejected at construction time.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// The key cannot be sent to a cache host.
    #[error("invalid key {key:?}: {reason}")]
    InvalidKey {
        /// The offending key.
        key: String,
        /// Why the key was rejected.
        reason: &'static str,
    },

    /// A host with the same name is already registered.
    #[error("duplicate host: {0}")]
    DuplicateHost(String),

    /// No host with this name is registered.
    #[error("unknown host: {0}")]
    UnknownHost(String),

    /// The routing snapshot points at a host that has since left the pool.
    #[error("host {0} is no longer registered")]
    StaleHost(String),
}
