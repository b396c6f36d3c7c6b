//! Bridge endpoints
//!
//! Each handler opens its own directory session, runs its directory
//! operations in an inner function, then releases the session before mapping
//! the outcome to a response. The inner function may return early on any
//! error; release still happens exactly once.

mod health;
mod login;
mod users;

pub use health::*;
pub use login::*;
pub use users::*;

use serde::Serialize;

/// `{message}` success body
#[derive(Debug, Clone, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}
