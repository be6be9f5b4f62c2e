//! Cubby Core functionality.
//!
//! This crate contains the host registry, key translation, and the key
//! locators that decide which cache host owns a key. Two locators are
//! provided: a naive modulo router and a Maglev consistent-hashing router.
//! Both publish immutable routing snapshots that readers access without
//! locking.

pub mod config;
pub mod domain;
pub mod error;
pub mod key;
pub mod locator;

pub use config::{KeyTranslatorKind, LocatorConfig, LocatorStrategy};
pub use domain::host::{CacheHost, SharedHost};
pub use domain::pool::HostPool;
pub use error::RoutingError;
pub use key::{DefaultKeyTranslator, KeyTranslator, LargeKeyHashingTranslator, Translator};
pub use locator::{
    KeyLocator, Locator, MaglevKeyLocator, NaiveKeyLocator, RoutingSnapshot, SlotStats,
};
