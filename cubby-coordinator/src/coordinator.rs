//! Owns a host pool together with its locator and key translator.

use cubby_core::{
    CacheHost, HostPool, KeyLocator, KeyTranslator, Locator, LocatorStrategy, RoutingError,
    RoutingSnapshot, SharedHost, Translator,
};
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::config::{validate_address, CoordinatorConfig};

/// Keeps routing state in step with host membership.
///
/// Request paths call [`RoutingCoordinator::route`]; whoever tracks host
/// health calls the membership methods, each of which rebuilds routing when
/// something actually changed.
#[derive(Debug)]
pub struct RoutingCoordinator {
    pool: HostPool,
    locator: Locator,
    translator: Translator,
}

impl RoutingCoordinator {
    /// Build the pool from `config` and install the initial routing.
    pub fn new(config: &CoordinatorConfig) -> Result<Self, RoutingError> {
        config.validate()?;

        let pool = HostPool::from_hosts(
            config
                .hosts
                .iter()
                .map(|host| CacheHost::new(host.name.clone(), host.address.clone())),
        )?;
        let locator = Locator::from_config(&config.locator)?;
        locator.install_routing(&pool)?;

        info!(
            strategy = %locator.strategy(),
            hosts = pool.len(),
            "routing coordinator started"
        );

        Ok(Self {
            pool,
            locator,
            translator: Translator::from(config.keys.translator),
        })
    }

    /// The host that owns `key`.
    pub fn route(&self, key: &str) -> Result<SharedHost, RoutingError> {
        let key = self.translator.translate(key)?;
        self.locator.find(&self.pool, &key)
    }

    /// Mark a host unreachable and move its keys elsewhere.
    ///
    /// If routing cannot be rebuilt the flag is restored, so the pool keeps
    /// matching the published routing and a retry rebuilds again.
    pub fn host_down(&self, name: &str) -> Result<(), RoutingError> {
        self.set_active(name, false)
    }

    /// Mark a host reachable again and give it back its share of keys.
    pub fn host_up(&self, name: &str) -> Result<(), RoutingError> {
        self.set_active(name, true)
    }

    fn set_active(&self, name: &str, active: bool) -> Result<(), RoutingError> {
        if self.pool.set_active(name, active)? == active {
            return Ok(());
        }
        info!(name, active, "host activity changed");
        if let Err(e) = self.refresh() {
            self.pool.set_active(name, !active)?;
            return Err(e);
        }
        Ok(())
    }

    /// Register a new host. It starts out active.
    ///
    /// The host is unregistered again if routing cannot be rebuilt with it.
    pub fn add_host(&self, name: &str, address: &str) -> Result<SharedHost, RoutingError> {
        validate_address(address)?;
        let host = self.pool.add(CacheHost::new(name, address))?;
        if let Err(e) = self.refresh() {
            warn!(name, "routing rejected new host, unregistering it");
            self.pool.remove(name);
            return Err(e);
        }
        info!(name, address, "host added");
        Ok(host)
    }

    /// Unregister a host entirely.
    pub fn remove_host(&self, name: &str) -> Result<SharedHost, RoutingError> {
        let host = self
            .pool
            .remove(name)
            .ok_or_else(|| RoutingError::UnknownHost(name.to_string()))?;
        info!(name, "host removed");
        self.refresh()?;
        Ok(host)
    }

    /// Rebuild routing from the current pool contents.
    pub fn refresh(&self) -> Result<(), RoutingError> {
        self.locator.update_routing(&self.pool).map_err(|e| {
            error!(error = %e, "routing rebuild failed, keeping previous routing");
            e
        })
    }

    /// The registered hosts.
    pub fn pool(&self) -> &HostPool {
        &self.pool
    }

    /// The routing algorithm in use.
    pub fn strategy(&self) -> LocatorStrategy {
        self.locator.strategy()
    }

    /// The currently published routing snapshot.
    pub fn snapshot(&self) -> Arc<RoutingSnapshot> {
        self.locator.snapshot()
    }
}
