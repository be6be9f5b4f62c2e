//! Key locators: deciding which cache host owns a key.
//!
//! A locator keeps an immutable [`RoutingSnapshot`] built from the active
//! hosts of a [`HostPool`]. Whoever tracks membership calls
//! [`KeyLocator::update_routing`] after every change; request paths call
//! [`KeyLocator::find`], which only reads the latest published snapshot.

pub mod hash;
pub mod maglev;
pub mod naive;
pub mod prime;
pub mod snapshot;

use std::sync::Arc;

use crate::config::{LocatorConfig, LocatorStrategy};
use crate::domain::host::SharedHost;
use crate::domain::pool::HostPool;
use crate::error::RoutingError;

pub use maglev::MaglevKeyLocator;
pub use naive::NaiveKeyLocator;
pub use snapshot::{RoutingSnapshot, RoutingTable, SlotStats};

/// Maps cache keys to the host responsible for them.
pub trait KeyLocator: Send + Sync {
    /// Build routing state from scratch, discarding anything cached.
    ///
    /// Succeeds with an empty snapshot when the pool has no active hosts.
    fn install_routing(&self, pool: &HostPool) -> Result<(), RoutingError>;

    /// Rebuild routing state after a membership or liveness change.
    ///
    /// On error the previously published snapshot stays in effect.
    fn update_routing(&self, pool: &HostPool) -> Result<(), RoutingError>;

    /// Return the host owning `key` under the current snapshot.
    fn find(&self, pool: &HostPool, key: &str) -> Result<SharedHost, RoutingError>;

    /// The currently published snapshot.
    fn snapshot(&self) -> Arc<RoutingSnapshot>;
}

/// Resolve a key hash against a snapshot, checking the owner is still the
/// host registered in `pool` under its name.
pub(crate) fn resolve(
    table: &RoutingTable,
    pool: &HostPool,
    hash: u64,
) -> Result<SharedHost, RoutingError> {
    table.with(|snapshot| {
        let host = snapshot.route(hash).ok_or(RoutingError::NoAvailableHost)?;
        // A host re-registered under the same name is a different instance.
        if pool
            .get(host.name())
            .is_some_and(|current| Arc::ptr_eq(&current, host))
        {
            Ok(host.clone())
        } else {
            Err(RoutingError::StaleHost(host.name().to_string()))
        }
    })
}

/// The locator chosen by configuration.
#[derive(Debug)]
pub enum Locator {
    /// Sorted-list modulo routing.
    Naive(NaiveKeyLocator),
    /// Maglev consistent hashing.
    Maglev(MaglevKeyLocator),
}

impl Locator {
    /// Construct the locator described by `config`.
    pub fn from_config(config: &LocatorConfig) -> Result<Self, RoutingError> {
        config.validate()?;
        Ok(match config.strategy {
            LocatorStrategy::Naive => Self::Naive(NaiveKeyLocator::new()),
            LocatorStrategy::Maglev => Self::Maglev(MaglevKeyLocator::with_max_table_size(
                config.virtual_host_count,
                config.max_table_size,
            )?),
        })
    }

    /// Short name of the strategy, for logs.
    pub fn strategy(&self) -> LocatorStrategy {
        match self {
            Self::Naive(_) => LocatorStrategy::Naive,
            Self::Maglev(_) => LocatorStrategy::Maglev,
        }
    }
}

impl KeyLocator for Locator {
    fn install_routing(&self, pool: &HostPool) -> Result<(), RoutingError> {
        match self {
            Self::Naive(locator) => locator.install_routing(pool),
            Self::Maglev(locator) => locator.install_routing(pool),
        }
    }

    fn update_routing(&self, pool: &HostPool) -> Result<(), RoutingError> {
        match self {
            Self::Naive(locator) => locator.update_routing(pool),
            Self::Maglev(locator) => locator.update_routing(pool),
        }
    }

    fn find(&self, pool: &HostPool, key: &str) -> Result<SharedHost, RoutingError> {
        match self {
            Self::Naive(locator) => locator.find(pool, key),
            Self::Maglev(locator) => locator.find(pool, key),
        }
    }

    fn snapshot(&self) -> Arc<RoutingSnapshot> {
        match self {
            Self::Naive(locator) => locator.snapshot(),
            Self::Maglev(locator) => locator.snapshot(),
        }
    }
}
