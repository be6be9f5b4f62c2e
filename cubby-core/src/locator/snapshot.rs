//! Immutable routing snapshots and the lock-free table that publishes them.

use std::collections::BTreeMap;
use std::sync::Arc;

use arc_swap::ArcSwap;

use crate::domain::host::SharedHost;

/// A fully built, read-only view of the routing state.
///
/// `hosts` is the active host list sorted by name. `slots` maps each lookup
/// table slot to an index into `hosts`; it is empty for locators that index
/// `hosts` directly.
#[derive(Debug, Default)]
pub struct RoutingSnapshot {
    hosts: Vec<SharedHost>,
    slots: Vec<u32>,
}

impl RoutingSnapshot {
    /// A snapshot with no active hosts. Every lookup against it fails.
    pub fn empty() -> Self {
        Self::default()
    }

    /// A snapshot that routes by indexing the sorted host list directly.
    pub fn direct(hosts: Vec<SharedHost>) -> Self {
        Self {
            hosts,
            slots: Vec::new(),
        }
    }

    /// A snapshot backed by a lookup table of host indices.
    ///
    /// The caller guarantees every entry of `slots` is a valid index into
    /// `hosts`.
    pub fn with_table(hosts: Vec<SharedHost>, slots: Vec<u32>) -> Self {
        Self { hosts, slots }
    }

    /// Whether this snapshot has no active hosts.
    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }

    /// The active hosts, sorted by name.
    pub fn hosts(&self) -> &[SharedHost] {
        &self.hosts
    }

    /// Number of positions a key hash is reduced modulo.
    pub fn slot_count(&self) -> usize {
        if self.slots.is_empty() {
            self.hosts.len()
        } else {
            self.slots.len()
        }
    }

    /// Resolve a key hash to its owning host.
    pub fn route(&self, hash: u64) -> Option<&SharedHost> {
        let count = self.slot_count();
        if count == 0 {
            return None;
        }
        // usize -> u64 never truncates on supported targets, and the
        // remainder is always below `count`.
        let slot = (hash % count as u64) as usize;
        if self.slots.is_empty() {
            self.hosts.get(slot)
        } else {
            self.hosts.get(self.slots[slot] as usize)
        }
    }

    /// The owner name of every slot, in slot order.
    pub fn slot_owners(&self) -> Vec<&str> {
        (0..self.slot_count() as u64)
            .filter_map(|slot| self.route(slot).map(|host| host.name()))
            .collect()
    }

    /// Whether this snapshot was built from exactly these host instances,
    /// in this order.
    pub fn represents(&self, hosts: &[SharedHost]) -> bool {
        self.hosts.len() == hosts.len()
            && self
                .hosts
                .iter()
                .zip(hosts)
                .all(|(ours, theirs)| Arc::ptr_eq(ours, theirs))
    }

    /// How the slots are spread over the active hosts.
    pub fn slot_stats(&self) -> SlotStats {
        let mut per_host: BTreeMap<String, usize> = self
            .hosts
            .iter()
            .map(|host| (host.name().to_string(), 0))
            .collect();
        for owner in self.slot_owners() {
            if let Some(count) = per_host.get_mut(owner) {
                *count += 1;
            }
        }

        SlotStats {
            min: per_host.values().copied().min().unwrap_or(0),
            max: per_host.values().copied().max().unwrap_or(0),
            per_host,
        }
    }
}

/// Slot distribution of a snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotStats {
    /// Slots owned per host name.
    pub per_host: BTreeMap<String, usize>,
    /// Fewest slots owned by any active host.
    pub min: usize,
    /// Most slots owned by any active host.
    pub max: usize,
}

/// A lock-free holder for the current routing snapshot.
///
/// Uses `ArcSwap` so rebuilt snapshots are published with a single atomic
/// pointer swap. Readers never take a lock and never see a half-built table.
#[derive(Debug)]
pub struct RoutingTable {
    current: ArcSwap<RoutingSnapshot>,
}

impl RoutingTable {
    /// Create a table holding an empty snapshot.
    pub fn new() -> Self {
        Self {
            current: ArcSwap::from_pointee(RoutingSnapshot::empty()),
        }
    }

    /// Atomically replace the published snapshot.
    pub fn publish(&self, snapshot: RoutingSnapshot) {
        self.current.store(Arc::new(snapshot));
    }

    /// Retrieve the currently published snapshot.
    pub fn snapshot(&self) -> Arc<RoutingSnapshot> {
        self.current.load_full()
    }

    /// Run `f` against the current snapshot without bumping its refcount.
    pub fn with<R>(&self, f: impl FnOnce(&RoutingSnapshot) -> R) -> R {
        let guard = self.current.load();
        f(&guard)
    }
}

impl Default for RoutingTable {
    fn default() -> Self {
        Self::new()
    }
}
