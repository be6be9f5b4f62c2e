//! Maglev consistent hashing.
//!
//! Every registered host gets a pseudo-random permutation of the lookup table
//! slots, derived from its name. Active hosts then take turns claiming their
//! next unclaimed preferred slot until the table is full. Because the
//! permutations only depend on host names and the table size, deactivating a
//! host mostly hands its own slots to the others and leaves theirs alone,
//! while every host still ends up with an almost equal share of the table.
//!
//! The table size is the smallest prime at or above
//! `registry_len * virtual_host_count`, computed over *all* registered hosts
//! so that activity flips reuse the cached permutations.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::domain::host::SharedHost;
use crate::domain::pool::HostPool;
use crate::error::RoutingError;
use crate::locator::hash::{permutation_offset, permutation_skip, slot_hash};
use crate::locator::prime::next_prime;
use crate::locator::snapshot::{RoutingSnapshot, RoutingTable};
use crate::locator::{resolve, KeyLocator};

/// Default number of table slots reserved per registered host.
pub const DEFAULT_VIRTUAL_HOST_COUNT: usize = 100;

/// Default upper bound on the lookup table size.
pub const DEFAULT_MAX_TABLE_SIZE: usize = 1 << 24;

const UNCLAIMED: u32 = u32::MAX;

/// Per-host permutations for one table size.
#[derive(Debug, Default)]
struct PermutationCache {
    table_size: usize,
    permutations: HashMap<String, Arc<[u32]>>,
}

impl PermutationCache {
    /// Make sure every host in `registry` has a permutation for `table_size`.
    ///
    /// A new table size invalidates everything. Names that left the registry
    /// are dropped.
    fn refresh(&mut self, registry: &[SharedHost], table_size: usize) {
        if self.table_size != table_size {
            debug!(
                old = self.table_size,
                new = table_size,
                "table size changed, regenerating all permutations"
            );
            self.permutations.clear();
            self.table_size = table_size;
        }

        self.permutations
            .retain(|name, _| registry.iter().any(|host| host.name() == name));

        for host in registry {
            if !self.permutations.contains_key(host.name()) {
                debug!(name = host.name(), table_size, "generated permutation");
                self.permutations
                    .insert(host.name().to_string(), permutation(host.name(), table_size));
            }
        }
    }
}

/// The slot preference order of `name` in a table of `table_size` slots.
///
/// `table_size` must be a prime no larger than `u32::MAX`.
fn permutation(name: &str, table_size: usize) -> Arc<[u32]> {
    let size = table_size as u64;
    let offset = permutation_offset(name, size);
    let skip = permutation_skip(name, size);

    let mut slot = offset;
    let mut sequence = Vec::with_capacity(table_size);
    for _ in 0..table_size {
        sequence.push(slot as u32);
        slot = (slot + skip) % size;
    }
    sequence.into()
}

/// Fill a table of `table_size` slots from the permutations of the active
/// hosts, taking turns in the given order.
///
/// Returns the owning host index for every slot.
fn populate(permutations: &[&[u32]], table_size: usize) -> Result<Vec<u32>, RoutingError> {
    let mut slots = vec![UNCLAIMED; table_size];
    let mut next = vec![0usize; permutations.len()];
    let mut claimed = 0usize;

    'fill: while claimed < table_size {
        for (host, permutation) in permutations.iter().enumerate() {
            let cursor = &mut next[host];
            let slot = loop {
                let candidate = *permutation.get(*cursor).ok_or_else(|| {
                    RoutingError::BuildFailure(format!(
                        "permutation of host {host} exhausted with {claimed}/{table_size} slots claimed"
                    ))
                })? as usize;
                *cursor += 1;
                if slots[candidate] == UNCLAIMED {
                    break candidate;
                }
            };

            slots[slot] = host as u32;
            claimed += 1;
            if claimed == table_size {
                break 'fill;
            }
        }
    }

    Ok(slots)
}

/// Maglev-style consistent hashing locator.
#[derive(Debug)]
pub struct MaglevKeyLocator {
    virtual_host_count: usize,
    max_table_size: usize,
    table: RoutingTable,
    /// Held for the whole build-and-publish sequence, so rebuilds are
    /// serialized. Readers never touch it.
    permutations: Mutex<PermutationCache>,
}

impl MaglevKeyLocator {
    /// Create a locator reserving `virtual_host_count` slots per host.
    pub fn new(virtual_host_count: usize) -> Result<Self, RoutingError> {
        Self::with_max_table_size(virtual_host_count, DEFAULT_MAX_TABLE_SIZE)
    }

    /// Create a locator that refuses to build tables larger than
    /// `max_table_size` slots.
    pub fn with_max_table_size(
        virtual_host_count: usize,
        max_table_size: usize,
    ) -> Result<Self, RoutingError> {
        if virtual_host_count == 0 {
            return Err(RoutingError::InvalidConfiguration(
                "virtual host count must be at least 1".into(),
            ));
        }
        if max_table_size < virtual_host_count || max_table_size > UNCLAIMED as usize {
            return Err(RoutingError::InvalidConfiguration(format!(
                "max table size {max_table_size} must lie between the virtual host count {virtual_host_count} and {UNCLAIMED}"
            )));
        }

        Ok(Self {
            virtual_host_count,
            max_table_size,
            table: RoutingTable::new(),
            permutations: Mutex::new(PermutationCache::default()),
        })
    }

    /// Slots reserved per registered host.
    pub fn virtual_host_count(&self) -> usize {
        self.virtual_host_count
    }

    /// Table size for a registry of `host_count` hosts.
    pub fn table_size_for(&self, host_count: usize) -> Result<usize, RoutingError> {
        let too_large = || {
            RoutingError::BuildFailure(format!(
                "{host_count} hosts x {} virtual hosts exceeds the maximum table size {}",
                self.virtual_host_count, self.max_table_size
            ))
        };
        let target = host_count
            .max(1)
            .checked_mul(self.virtual_host_count)
            .filter(|target| *target <= self.max_table_size)
            .ok_or_else(too_large)?;

        // The prime may land past the limit even when the target does not.
        let size = next_prime(target);
        if size > self.max_table_size {
            return Err(too_large());
        }
        Ok(size)
    }

    fn rebuild(&self, pool: &HostPool, force: bool) -> Result<(), RoutingError> {
        let mut cache = self.permutations.lock();
        if force {
            *cache = PermutationCache::default();
        }

        // Read every flag exactly once so the registry and the active list
        // agree with each other.
        let registry = pool.hosts();
        let active: Vec<SharedHost> = registry.iter().filter(|h| h.is_active()).cloned().collect();
        let table_size = self.table_size_for(registry.len())?;

        if !force
            && cache.table_size == table_size
            && self.table.with(|current| current.represents(&active))
        {
            debug!(active = active.len(), table_size, "active hosts unchanged, keeping maglev routing");
            return Ok(());
        }

        cache.refresh(&registry, table_size);

        if active.is_empty() {
            warn!(registered = registry.len(), "no active hosts, maglev routing will reject every key");
            self.table.publish(RoutingSnapshot::empty());
            return Ok(());
        }

        let permutations = active
            .iter()
            .map(|host| {
                cache
                    .permutations
                    .get(host.name())
                    .map(|permutation| &permutation[..])
                    .ok_or_else(|| {
                        RoutingError::BuildFailure(format!("no permutation for host {}", host.name()))
                    })
            })
            .collect::<Result<Vec<&[u32]>, _>>()?;
        let slots = populate(&permutations, table_size)?;

        let snapshot = RoutingSnapshot::with_table(active, slots);
        let stats = snapshot.slot_stats();
        info!(
            active = snapshot.hosts().len(),
            registered = registry.len(),
            table_size,
            min_slots = stats.min,
            max_slots = stats.max,
            "published maglev routing"
        );
        self.table.publish(snapshot);
        Ok(())
    }
}

impl Default for MaglevKeyLocator {
    fn default() -> Self {
        Self {
            virtual_host_count: DEFAULT_VIRTUAL_HOST_COUNT,
            max_table_size: DEFAULT_MAX_TABLE_SIZE,
            table: RoutingTable::new(),
            permutations: Mutex::new(PermutationCache::default()),
        }
    }
}

impl KeyLocator for MaglevKeyLocator {
    fn install_routing(&self, pool: &HostPool) -> Result<(), RoutingError> {
        self.rebuild(pool, true)
    }

    fn update_routing(&self, pool: &HostPool) -> Result<(), RoutingError> {
        self.rebuild(pool, false)
    }

    fn find(&self, pool: &HostPool, key: &str) -> Result<SharedHost, RoutingError> {
        resolve(&self.table, pool, slot_hash(key))
    }

    fn snapshot(&self) -> Arc<RoutingSnapshot> {
        self.table.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::host::CacheHost;
    use crate::locator::naive::NaiveKeyLocator;
    use proptest::prelude::*;
    use std::collections::{BTreeMap, HashSet};

    fn pool(names: &[&str]) -> HostPool {
        HostPool::from_hosts(
            names
                .iter()
                .enumerate()
                .map(|(i, name)| CacheHost::new(*name, format!("10.0.0.{}:11211", i + 1))),
        )
        .unwrap()
    }

    fn five_hosts() -> HostPool {
        pool(&["cache-a", "cache-b", "cache-c", "cache-d", "cache-e"])
    }

    fn keys(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("user:{i}")).collect()
    }

    fn owners<L: KeyLocator + ?Sized>(locator: &L, pool: &HostPool, keys: &[String]) -> Vec<String> {
        keys.iter()
            .map(|k| locator.find(pool, k).unwrap().name().to_string())
            .collect()
    }

    fn cached_permutation(locator: &MaglevKeyLocator, name: &str) -> Arc<[u32]> {
        locator.permutations.lock().permutations[name].clone()
    }

    proptest! {
        #[test]
        fn test_permutation_visits_every_slot_once(name in "[a-z0-9:.-]{1,24}", n in 1usize..2_000) {
            let size = next_prime(n);
            let sequence = permutation(&name, size);
            prop_assert_eq!(sequence.len(), size);

            let mut seen = vec![false; size];
            for slot in sequence.iter() {
                prop_assert!(!seen[*slot as usize]);
                seen[*slot as usize] = true;
            }
        }
    }

    #[test]
    fn test_permutation_is_deterministic() {
        assert_eq!(permutation("cache-a", 503), permutation("cache-a", 503));
        assert_ne!(permutation("cache-a", 503), permutation("cache-b", 503));
    }

    #[test]
    fn test_rejects_zero_virtual_hosts() {
        assert!(matches!(
            MaglevKeyLocator::new(0),
            Err(RoutingError::InvalidConfiguration(_))
        ));
        assert!(matches!(
            MaglevKeyLocator::with_max_table_size(100, 50),
            Err(RoutingError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_table_size_tracks_registry_not_activity() {
        let pool = five_hosts();
        let locator = MaglevKeyLocator::default();
        locator.install_routing(&pool).unwrap();
        assert_eq!(locator.snapshot().slot_count(), 503);

        pool.set_active("cache-b", false).unwrap();
        pool.set_active("cache-d", false).unwrap();
        locator.update_routing(&pool).unwrap();
        assert_eq!(locator.snapshot().slot_count(), 503);
        assert_eq!(locator.snapshot().hosts().len(), 3);
    }

    #[test]
    fn test_slots_split_evenly() {
        let pool = five_hosts();
        let locator = MaglevKeyLocator::default();
        locator.install_routing(&pool).unwrap();

        let stats = locator.snapshot().slot_stats();
        assert_eq!(stats.per_host.len(), 5);
        assert_eq!(stats.per_host.values().sum::<usize>(), 503);
        assert_eq!((stats.min, stats.max), (100, 101));

        pool.set_active("cache-a", false).unwrap();
        locator.update_routing(&pool).unwrap();
        let stats = locator.snapshot().slot_stats();
        assert_eq!(stats.per_host.len(), 4);
        assert_eq!((stats.min, stats.max), (125, 126));
    }

    #[test]
    fn test_load_balance_over_many_keys() {
        let pool = five_hosts();
        let locator = MaglevKeyLocator::new(100).unwrap();
        locator.install_routing(&pool).unwrap();

        let total = 1_000_000;
        let mut counts: BTreeMap<String, usize> = BTreeMap::new();
        for i in 0..total {
            let host = locator.find(&pool, &format!("key-{i}")).unwrap();
            *counts.entry(host.name().to_string()).or_default() += 1;
        }

        assert_eq!(counts.len(), 5);
        for (name, count) in counts {
            let share = count as f64 / total as f64;
            assert!(
                (0.19..=0.21).contains(&share),
                "{name} received {share:.3} of keys"
            );
        }
    }

    #[test]
    fn test_single_host_owns_everything() {
        let pool = pool(&["only"]);
        let locator = MaglevKeyLocator::default();
        locator.install_routing(&pool).unwrap();

        let snapshot = locator.snapshot();
        assert_eq!(snapshot.slot_count(), 101);
        assert!(snapshot.slot_owners().iter().all(|owner| *owner == "only"));
        for key in keys(1000) {
            assert_eq!(locator.find(&pool, &key).unwrap().name(), "only");
        }
    }

    #[test]
    fn test_no_active_hosts() {
        let pool = five_hosts();
        for host in pool.hosts() {
            host.set_active(false);
        }
        let locator = MaglevKeyLocator::default();
        locator.install_routing(&pool).unwrap();
        assert_eq!(locator.find(&pool, "k"), Err(RoutingError::NoAvailableHost));

        pool.set_active("cache-c", true).unwrap();
        locator.update_routing(&pool).unwrap();
        assert_eq!(locator.find(&pool, "k").unwrap().name(), "cache-c");
    }

    #[test]
    fn test_empty_registry() {
        let pool = HostPool::new();
        let locator = MaglevKeyLocator::default();
        locator.install_routing(&pool).unwrap();
        assert_eq!(locator.find(&pool, ""), Err(RoutingError::NoAvailableHost));
    }

    #[test]
    fn test_only_active_hosts_receive_keys() {
        let pool = five_hosts();
        pool.set_active("cache-b", false).unwrap();
        let locator = MaglevKeyLocator::default();
        locator.install_routing(&pool).unwrap();

        let active: HashSet<_> = ["cache-a", "cache-c", "cache-d", "cache-e"].into();
        for key in keys(10_000) {
            let host = locator.find(&pool, &key).unwrap();
            assert!(active.contains(host.name()), "{key} routed to {}", host.name());
        }
    }

    #[test]
    fn test_routing_identical_across_instances() {
        let keys = keys(5_000);
        let first = MaglevKeyLocator::default();
        let pool_a = five_hosts();
        first.install_routing(&pool_a).unwrap();

        // Same hosts, registered in a different order.
        let second = MaglevKeyLocator::default();
        let pool_b = pool(&["cache-e", "cache-c", "cache-a", "cache-d", "cache-b"]);
        second.install_routing(&pool_b).unwrap();

        assert_eq!(owners(&first, &pool_a, &keys), owners(&second, &pool_b, &keys));
    }

    #[test]
    fn test_install_twice_is_idempotent() {
        let pool = five_hosts();
        let locator = MaglevKeyLocator::default();
        let keys = keys(5_000);

        locator.install_routing(&pool).unwrap();
        let first_snapshot = locator.snapshot();
        let first = owners(&locator, &pool, &keys);

        locator.install_routing(&pool).unwrap();
        assert!(!Arc::ptr_eq(&first_snapshot, &locator.snapshot()));
        assert_eq!(first, owners(&locator, &pool, &keys));
        assert_eq!(first_snapshot.slot_owners(), locator.snapshot().slot_owners());
    }

    #[test]
    fn test_deactivation_only_moves_a_few_foreign_keys() {
        let pool = five_hosts();
        let locator = MaglevKeyLocator::default();
        locator.install_routing(&pool).unwrap();

        let keys = keys(10_000);
        let slots_before = locator.snapshot();
        let before = owners(&locator, &pool, &keys);

        pool.set_active("cache-c", false).unwrap();
        locator.update_routing(&pool).unwrap();
        let after = owners(&locator, &pool, &keys);

        let mut foreign_moves = 0;
        for (old, new) in before.iter().zip(&after) {
            if old == "cache-c" {
                assert_ne!(new, "cache-c");
            } else if old != new {
                foreign_moves += 1;
            }
        }
        assert!(before.iter().any(|owner| owner == "cache-c"));
        assert!(
            foreign_moves < keys.len() / 20,
            "{foreign_moves} keys left hosts that stayed active"
        );

        // The same bound holds slot by slot.
        let slots_after = locator.snapshot();
        let churn = slots_before
            .slot_owners()
            .iter()
            .zip(slots_after.slot_owners())
            .filter(|(old, new)| **old != "cache-c" && **old != *new)
            .count();
        assert!(churn < 503 / 20, "{churn} slots changed owner needlessly");
    }

    #[test]
    fn test_churn_far_below_naive_routing() {
        let pool = five_hosts();
        let maglev = MaglevKeyLocator::default();
        let naive = NaiveKeyLocator::new();
        maglev.install_routing(&pool).unwrap();
        naive.install_routing(&pool).unwrap();

        let keys = keys(10_000);
        let maglev_before = owners(&maglev, &pool, &keys);
        let naive_before = owners(&naive, &pool, &keys);

        pool.set_active("cache-c", false).unwrap();
        maglev.update_routing(&pool).unwrap();
        naive.update_routing(&pool).unwrap();

        let moved = |before: &[String], locator: &dyn KeyLocator| {
            before
                .iter()
                .zip(owners(locator, &pool, &keys))
                .filter(|(old, new)| **old != *new)
                .count()
        };
        let maglev_moved = moved(&maglev_before, &maglev);
        let naive_moved = moved(&naive_before, &naive);

        // Maglev moves the removed host's fifth plus a little churn.
        assert!(maglev_moved < keys.len() / 4, "maglev moved {maglev_moved}");
        assert!(naive_moved > keys.len() / 2, "naive moved {naive_moved}");
    }

    #[test]
    fn test_permutations_reused_across_activity_flips() {
        let pool = five_hosts();
        let locator = MaglevKeyLocator::default();
        locator.install_routing(&pool).unwrap();
        let before = cached_permutation(&locator, "cache-a");

        pool.set_active("cache-b", false).unwrap();
        locator.update_routing(&pool).unwrap();
        pool.set_active("cache-b", true).unwrap();
        locator.update_routing(&pool).unwrap();
        assert!(Arc::ptr_eq(&before, &cached_permutation(&locator, "cache-a")));

        // A sixth host changes the table size and forces regeneration.
        pool.add(CacheHost::new("cache-f", "10.0.0.6:11211")).unwrap();
        locator.update_routing(&pool).unwrap();
        let after = cached_permutation(&locator, "cache-a");
        assert!(!Arc::ptr_eq(&before, &after));
        assert_eq!(after.len(), 601);
        assert_eq!(locator.snapshot().slot_count(), 601);
    }

    #[test]
    fn test_removed_hosts_pruned_from_cache() {
        let pool = five_hosts();
        let locator = MaglevKeyLocator::default();
        locator.install_routing(&pool).unwrap();

        pool.remove("cache-e").unwrap();
        locator.update_routing(&pool).unwrap();

        let cache = locator.permutations.lock();
        assert_eq!(cache.table_size, 401);
        assert!(!cache.permutations.contains_key("cache-e"));
        assert_eq!(cache.permutations.len(), 4);
    }

    #[test]
    fn test_unchanged_update_keeps_snapshot() {
        let pool = five_hosts();
        let locator = MaglevKeyLocator::default();
        locator.install_routing(&pool).unwrap();
        let before = locator.snapshot();

        locator.update_routing(&pool).unwrap();
        assert!(Arc::ptr_eq(&before, &locator.snapshot()));
    }

    #[test]
    fn test_failed_rebuild_keeps_previous_snapshot() {
        let pool = five_hosts();
        let locator = MaglevKeyLocator::with_max_table_size(100, 1_000).unwrap();
        locator.install_routing(&pool).unwrap();
        let keys = keys(1_000);
        let before = owners(&locator, &pool, &keys);

        for i in 0..6 {
            pool.add(CacheHost::new(format!("extra-{i}"), "10.0.1.1:11211"))
                .unwrap();
        }
        let err = locator.update_routing(&pool).unwrap_err();
        assert!(matches!(err, RoutingError::BuildFailure(_)), "{err}");

        assert_eq!(locator.snapshot().slot_count(), 503);
        assert_eq!(before, owners(&locator, &pool, &keys));
    }

    #[test]
    fn test_table_size_limit_applies_to_the_prime() {
        let locator = MaglevKeyLocator::with_max_table_size(100, 1_000).unwrap();
        assert_eq!(locator.table_size_for(9).unwrap(), 907);
        assert!(matches!(
            locator.table_size_for(10),
            Err(RoutingError::BuildFailure(_))
        ));

        let names: Vec<String> = (0..10).map(|i| format!("cache-{i}")).collect();
        let names: Vec<&str> = names.iter().map(String::as_str).collect();
        let pool = pool(&names);
        let err = locator.install_routing(&pool).unwrap_err();
        assert!(matches!(err, RoutingError::BuildFailure(_)), "{err}");
        assert!(locator.snapshot().is_empty());
    }

    #[test]
    fn test_populate_hands_out_every_slot() {
        let a = permutation("a", 7);
        let b = permutation("b", 7);
        let slots = populate(&[&a[..], &b[..]], 7).unwrap();

        assert!(slots.iter().all(|owner| *owner < 2));
        assert_eq!(slots.iter().filter(|owner| **owner == 0).count(), 4);
        assert_eq!(slots[a[0] as usize], 0);
    }

    #[test]
    fn test_populate_reports_exhausted_permutation() {
        let short: &[u32] = &[0, 1];
        let err = populate(&[short], 3).unwrap_err();
        assert!(matches!(err, RoutingError::BuildFailure(_)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_readers_never_see_partial_tables() {
        let pool = Arc::new(five_hosts());
        let locator = Arc::new(MaglevKeyLocator::default());
        locator.install_routing(&pool).unwrap();

        let mut readers = Vec::new();
        for reader in 0..4 {
            let pool = pool.clone();
            let locator = locator.clone();
            readers.push(tokio::task::spawn_blocking(move || {
                for i in 0..20_000 {
                    let host = locator
                        .find(&pool, &format!("reader-{reader}:{i}"))
                        .expect("cache-a is never deactivated");
                    assert!(pool.contains(host.name()));
                    if i % 500 == 0 {
                        let snapshot = locator.snapshot();
                        assert_eq!(snapshot.slot_owners().len(), snapshot.slot_count());
                    }
                }
            }));
        }

        let writer = {
            let pool = pool.clone();
            let locator = locator.clone();
            tokio::task::spawn_blocking(move || {
                for round in 0..200 {
                    let name = ["cache-b", "cache-c", "cache-d", "cache-e"][round % 4];
                    pool.set_active(name, round % 8 >= 4).unwrap();
                    locator.update_routing(&pool).unwrap();
                }
            })
        };

        writer.await.unwrap();
        for reader in readers {
            reader.await.unwrap();
        }
    }
}
