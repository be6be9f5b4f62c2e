//! Cache host and host pool models.

pub mod host;
pub mod pool;
