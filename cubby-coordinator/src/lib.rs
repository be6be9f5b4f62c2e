//! Cubby Routing Coordinator
//!
//! Wires a host pool, a key locator and a key translator together from TOML
//! configuration, and keeps routing current as hosts go down, come back,
//! join or leave.

pub mod config;
pub mod coordinator;
pub mod error;
pub mod membership;
pub mod telemetry;

pub use config::{CoordinatorConfig, HostEntry};
pub use coordinator::RoutingCoordinator;
pub use error::ConfigError;
pub use membership::{spawn_membership_listener, MembershipEvent};
