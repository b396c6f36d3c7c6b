//! Dirgate Core Library
//!
//! Configuration and error types shared by the Dirgate crates.

pub mod config;
pub mod error;

pub use config::DirgateConfig;
pub use error::{Error, Result};

/// Dirgate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default HTTP port
pub const DEFAULT_PORT: u16 = 3000;

/// Default directory connect timeout (milliseconds)
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 10_000;

/// RDN value of the container that holds provisioned users
pub const USERS_OU: &str = "users";
