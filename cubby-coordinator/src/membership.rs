//! Applies membership changes reported by the health-check side.

use std::fmt;
use std::sync::Arc;

use cubby_core::RoutingError;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::coordinator::RoutingCoordinator;

/// A change in the set of cache hosts or their liveness.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MembershipEvent {
    /// The host stopped answering.
    HostDown(String),
    /// The host is reachable again.
    HostUp(String),
    /// A new host joined the pool.
    HostAdded {
        /// Unique host name.
        name: String,
        /// `host:port` address.
        address: String,
    },
    /// The host left the pool for good.
    HostRemoved(String),
}

impl fmt::Display for MembershipEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::HostDown(name) => write!(f, "host down: {name}"),
            Self::HostUp(name) => write!(f, "host up: {name}"),
            Self::HostAdded { name, address } => write!(f, "host added: {name} ({address})"),
            Self::HostRemoved(name) => write!(f, "host removed: {name}"),
        }
    }
}

impl RoutingCoordinator {
    /// Apply a single membership event.
    pub fn apply(&self, event: &MembershipEvent) -> Result<(), RoutingError> {
        match event {
            MembershipEvent::HostDown(name) => self.host_down(name),
            MembershipEvent::HostUp(name) => self.host_up(name),
            MembershipEvent::HostAdded { name, address } => self.add_host(name, address).map(drop),
            MembershipEvent::HostRemoved(name) => self.remove_host(name).map(drop),
        }
    }
}

/// Spawns a background Tokio task that applies membership events in the
/// order they arrive.
///
/// The task is the single writer for the coordinator's routing state. A
/// failed event is logged and skipped; the task ends when every sender is
/// dropped.
pub fn spawn_membership_listener(
    coordinator: Arc<RoutingCoordinator>,
    mut events: mpsc::Receiver<MembershipEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            debug!(%event, "applying membership event");
            if let Err(e) = coordinator.apply(&event) {
                warn!(%event, error = %e, "membership event not applied");
            }
        }
        debug!("membership channel closed, listener stopping");
    })
}
