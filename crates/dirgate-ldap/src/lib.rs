//! Directory access for Dirgate
//!
//! Provides:
//! - Per-request LDAP sessions behind the `DirectoryConnector` /
//!   `DirectorySession` traits
//! - The users container check-then-create
//! - User entry construction, DN and filter escaping
//! - An in-memory directory implementing the same traits (`memory` feature)

pub mod connection;
pub mod error;
#[cfg(any(test, feature = "memory"))]
pub mod memory;
pub mod ou;
pub mod types;

pub use connection::{release, DirectoryConnector, DirectorySession, LdapConnector};
pub use error::{result_code_name, DirectoryError, EnsureOuError};
#[cfg(any(test, feature = "memory"))]
pub use memory::MemoryDirectory;
pub use ou::{ensure_users_ou, EnsureOutcome};
pub use types::{user_dn, user_search_filter, UserEntry, USER_SEARCH_ATTRIBUTES};

pub use ldap3::{Scope, SearchEntry};
