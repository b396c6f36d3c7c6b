//! Directory error types
//!
//! Separates failures that never produced an LDAP result (connect, I/O,
//! protocol) from operations the server answered with a non-zero result code.

use ldap3::{LdapError, LdapResult};
use thiserror::Error;

/// LDAP result codes the bridge reacts to (RFC 4511, section 4.1.9)
pub mod rc {
    pub const SUCCESS: u32 = 0;
    pub const NO_SUCH_OBJECT: u32 = 32;
    pub const INVALID_DN_SYNTAX: u32 = 34;
    pub const INVALID_CREDENTIALS: u32 = 49;
    pub const INSUFFICIENT_ACCESS_RIGHTS: u32 = 50;
    pub const UNWILLING_TO_PERFORM: u32 = 53;
    pub const OBJECT_CLASS_VIOLATION: u32 = 65;
    pub const ENTRY_ALREADY_EXISTS: u32 = 68;
}

/// Human-readable name of an LDAP result code
pub fn result_code_name(code: u32) -> &'static str {
    match code {
        0 => "Success",
        1 => "Operations Error",
        2 => "Protocol Error",
        3 => "Time Limit Exceeded",
        4 => "Size Limit Exceeded",
        7 => "Auth Method Not Supported",
        8 => "Stronger Auth Required",
        11 => "Admin Limit Exceeded",
        16 => "No Such Attribute",
        17 => "Undefined Attribute Type",
        19 => "Constraint Violation",
        20 => "Attribute Or Value Exists",
        21 => "Invalid Attribute Syntax",
        32 => "No Such Object",
        34 => "Invalid DN Syntax",
        48 => "Inappropriate Authentication",
        49 => "Invalid Credentials",
        50 => "Insufficient Access Rights",
        51 => "Busy",
        52 => "Unavailable",
        53 => "Unwilling To Perform",
        64 => "Naming Violation",
        65 => "Object Class Violation",
        68 => "Entry Already Exists",
        80 => "Other",
        _ => "Unknown Error",
    }
}

#[derive(Error, Debug, Clone)]
pub enum DirectoryError {
    /// Could not reach the directory server
    #[error("{0}")]
    Connection(String),

    /// The operation failed before the server returned a result
    #[error("{0}")]
    Transport(String),

    /// The server answered with a non-zero result code
    #[error("{message}")]
    Rejected {
        rc: u32,
        message: String,
        diagnostic: String,
        matched: String,
    },
}

impl DirectoryError {
    pub fn rejected(rc: u32, diagnostic: impl Into<String>, matched: impl Into<String>) -> Self {
        let diagnostic = diagnostic.into();
        let name = result_code_name(rc);
        let message = if diagnostic.is_empty() {
            name.to_string()
        } else {
            format!("{}: {}", name, diagnostic)
        };

        DirectoryError::Rejected {
            rc,
            message,
            diagnostic,
            matched: matched.into(),
        }
    }

    /// Numeric result code, if the server produced one
    pub fn code(&self) -> Option<u32> {
        match self {
            DirectoryError::Rejected { rc, .. } => Some(*rc),
            _ => None,
        }
    }

    /// Diagnostic text sent by the server, falling back to the result code
    /// name when the server sent none
    pub fn ldap_message(&self) -> Option<String> {
        match self {
            DirectoryError::Rejected { rc, diagnostic, .. } => Some(if diagnostic.is_empty() {
                result_code_name(*rc).to_string()
            } else {
                diagnostic.clone()
            }),
            _ => None,
        }
    }

    pub fn is_no_such_object(&self) -> bool {
        self.code() == Some(rc::NO_SUCH_OBJECT)
    }

    pub fn is_already_exists(&self) -> bool {
        self.code() == Some(rc::ENTRY_ALREADY_EXISTS)
    }

    pub fn is_invalid_credentials(&self) -> bool {
        self.code() == Some(rc::INVALID_CREDENTIALS)
    }
}

impl From<LdapResult> for DirectoryError {
    fn from(result: LdapResult) -> Self {
        DirectoryError::rejected(result.rc, result.text, result.matched)
    }
}

impl From<LdapError> for DirectoryError {
    fn from(err: LdapError) -> Self {
        match err {
            LdapError::LdapResult { result, .. } => result.into(),
            other => DirectoryError::Transport(other.to_string()),
        }
    }
}

/// Failure of the users-container check
#[derive(Error, Debug, Clone)]
pub enum EnsureOuError {
    #[error("LDAP search failed: {0}")]
    Search(#[source] DirectoryError),

    #[error("Failed to create OU: {0}")]
    Create(#[source] DirectoryError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejected_message() {
        let err = DirectoryError::rejected(rc::ENTRY_ALREADY_EXISTS, "", "");
        assert_eq!(err.to_string(), "Entry Already Exists");
        assert_eq!(err.code(), Some(68));
        assert_eq!(err.ldap_message().as_deref(), Some("Entry Already Exists"));
        assert!(err.is_already_exists());

        let err = DirectoryError::rejected(rc::NO_SUCH_OBJECT, "parent does not exist", "dc=example,dc=com");
        assert_eq!(err.to_string(), "No Such Object: parent does not exist");
        assert_eq!(err.ldap_message().as_deref(), Some("parent does not exist"));
        assert!(err.is_no_such_object());
    }

    #[test]
    fn test_transport_has_no_code() {
        let err = DirectoryError::Transport("connection reset".to_string());
        assert_eq!(err.code(), None);
        assert_eq!(err.ldap_message(), None);
        assert_eq!(err.to_string(), "connection reset");
    }

    #[test]
    fn test_ldap_result_conversion() {
        let result = LdapResult {
            rc: 49,
            matched: String::new(),
            text: "invalid credentials".to_string(),
            refs: vec![],
            ctrls: vec![],
        };
        let err: DirectoryError = LdapError::LdapResult { result }.into();
        assert!(err.is_invalid_credentials());
    }

    #[test]
    fn test_ensure_error_messages() {
        let err = EnsureOuError::Create(DirectoryError::rejected(rc::INSUFFICIENT_ACCESS_RIGHTS, "", ""));
        assert_eq!(err.to_string(), "Failed to create OU: Insufficient Access Rights");
    }
}
