//! Cache host models.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Represents a single cache server the client may route keys to.
///
/// The name is the stable identity used for routing; the address is only
/// carried for the transport layer. Equality and hashing consider the name
/// alone.
#[derive(Debug)]
pub struct CacheHost {
    name: String,
    address: String,
    /// Whether the host is currently considered reachable
    active: AtomicBool,
}

impl CacheHost {
    /// Create a new host. Hosts start out active.
    pub fn new(name: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            address: address.into(),
            active: AtomicBool::new(true),
        }
    }

    /// The unique, stable name of the host
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The `host:port` address of the host
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Check if the host is marked active
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Update the liveness of the host, returning the previous value.
    pub fn set_active(&self, active: bool) -> bool {
        self.active.swap(active, Ordering::AcqRel)
    }
}

impl PartialEq for CacheHost {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for CacheHost {}

impl Hash for CacheHost {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}

impl fmt::Display for CacheHost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.address)
    }
}

/// A thread-safe reference to a CacheHost.
pub type SharedHost = Arc<CacheHost>;
