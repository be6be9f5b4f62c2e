//! Tracing subscriber setup.

use tracing_subscriber::EnvFilter;

/// Install a console `tracing` subscriber.
///
/// `RUST_LOG` overrides `level` when set. Does nothing if a global
/// subscriber is already installed, so it is safe to call from tests.
pub fn init(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    if tracing_subscriber::fmt().with_env_filter(filter).try_init().is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
}
