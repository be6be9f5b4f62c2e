//! Modulo routing over the sorted active host list.
//!
//! Simple and predictable, but any change to the number of active hosts
//! remaps most keys. Useful for small pools that rarely change, and as a
//! baseline for the Maglev locator.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::domain::host::SharedHost;
use crate::domain::pool::HostPool;
use crate::error::RoutingError;
use crate::locator::hash::stable_hash;
use crate::locator::snapshot::{RoutingSnapshot, RoutingTable};
use crate::locator::{resolve, KeyLocator};

/// Routes `hash(key) mod active_count` into the active hosts sorted by name.
#[derive(Debug, Default)]
pub struct NaiveKeyLocator {
    table: RoutingTable,
    /// Serializes rebuilds; readers never touch it.
    writer: Mutex<()>,
}

impl NaiveKeyLocator {
    /// Create a locator with an empty routing snapshot.
    pub fn new() -> Self {
        Self::default()
    }

    fn rebuild(&self, pool: &HostPool, force: bool) {
        let _writer = self.writer.lock();
        let active = pool.active_hosts();

        if !force && self.table.with(|current| current.represents(&active)) {
            debug!(active = active.len(), "active hosts unchanged, keeping naive routing");
            return;
        }

        if active.is_empty() {
            warn!("no active hosts, naive routing will reject every key");
        } else {
            info!(active = active.len(), "published naive routing");
        }
        self.table.publish(RoutingSnapshot::direct(active));
    }
}

impl KeyLocator for NaiveKeyLocator {
    fn install_routing(&self, pool: &HostPool) -> Result<(), RoutingError> {
        self.rebuild(pool, true);
        Ok(())
    }

    fn update_routing(&self, pool: &HostPool) -> Result<(), RoutingError> {
        self.rebuild(pool, false);
        Ok(())
    }

    fn find(&self, pool: &HostPool, key: &str) -> Result<SharedHost, RoutingError> {
        resolve(&self.table, pool, stable_hash(key))
    }

    fn snapshot(&self) -> Arc<RoutingSnapshot> {
        self.table.snapshot()
    }
}
