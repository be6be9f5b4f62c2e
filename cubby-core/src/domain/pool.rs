//! The registry of cache hosts a locator routes over.

use dashmap::DashMap;
use tracing::debug;

use crate::domain::host::{CacheHost, SharedHost};
use crate::error::RoutingError;

/// A concurrent, name-keyed collection of cache hosts.
///
/// The pool is mutated in place by whoever tracks membership; locators only
/// ever read it. Every view handed to a locator is sorted by name so tables
/// are reproducible regardless of insertion order.
#[derive(Debug, Default)]
pub struct HostPool {
    hosts: DashMap<String, SharedHost>,
}

impl HostPool {
    /// Create an empty pool.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a pool from an initial set of hosts, rejecting duplicate names.
    pub fn from_hosts(hosts: impl IntoIterator<Item = CacheHost>) -> Result<Self, RoutingError> {
        let pool = Self::new();
        for host in hosts {
            pool.add(host)?;
        }
        Ok(pool)
    }

    /// Register a new host.
    pub fn add(&self, host: CacheHost) -> Result<SharedHost, RoutingError> {
        use dashmap::mapref::entry::Entry;

        match self.hosts.entry(host.name().to_string()) {
            Entry::Occupied(entry) => Err(RoutingError::DuplicateHost(entry.key().clone())),
            Entry::Vacant(entry) => {
                debug!(name = host.name(), address = host.address(), "registered host");
                Ok(entry.insert(SharedHost::new(host)).value().clone())
            }
        }
    }

    /// Remove a host from the registry entirely.
    pub fn remove(&self, name: &str) -> Option<SharedHost> {
        let removed = self.hosts.remove(name).map(|(_, host)| host);
        if removed.is_some() {
            debug!(name, "unregistered host");
        }
        removed
    }

    /// Look up a host by name.
    pub fn get(&self, name: &str) -> Option<SharedHost> {
        self.hosts.get(name).map(|entry| entry.value().clone())
    }

    /// Whether a host with this name is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.hosts.contains_key(name)
    }

    /// Flip the liveness of a host, returning its previous state.
    pub fn set_active(&self, name: &str, active: bool) -> Result<bool, RoutingError> {
        self.get(name)
            .map(|host| host.set_active(active))
            .ok_or_else(|| RoutingError::UnknownHost(name.to_string()))
    }

    /// Number of registered hosts, active or not.
    pub fn len(&self) -> usize {
        self.hosts.len()
    }

    /// Whether the pool has no hosts at all.
    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }

    /// Every registered host, sorted by name.
    pub fn hosts(&self) -> Vec<SharedHost> {
        let mut hosts: Vec<SharedHost> = self.hosts.iter().map(|entry| entry.value().clone()).collect();
        hosts.sort_by(|a, b| a.name().cmp(b.name()));
        hosts
    }

    /// The currently active hosts, sorted by name.
    pub fn active_hosts(&self) -> Vec<SharedHost> {
        self.hosts().into_iter().filter(|host| host.is_active()).collect()
    }
}
