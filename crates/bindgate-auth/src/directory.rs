//! Directory collaborator
//!
//! The authenticator only needs four operations from a directory server:
//! connect, bind, search and close. Each connection is owned by exactly one
//! authentication call.

use async_trait::async_trait;
use std::collections::HashMap;
use thiserror::Error;

/// LDAP result code for a rejected bind
pub const RC_INVALID_CREDENTIALS: u32 = 49;

/// LDAP result code for a search base that does not exist
pub const RC_NO_SUCH_OBJECT: u32 = 32;

/// LDAP result code for an operation the session may not perform
pub const RC_INSUFFICIENT_ACCESS: u32 = 50;

/// Directory entry as returned by a search
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryEntry {
    /// Distinguished name
    pub dn: String,

    /// Raw attributes
    pub attributes: HashMap<String, Vec<String>>,
}

impl DirectoryEntry {
    pub fn new(dn: impl Into<String>) -> Self {
        Self {
            dn: dn.into(),
            attributes: HashMap::new(),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DirectoryError {
    #[error("Failed to connect to directory: {0}")]
    Connect(String),

    #[error("Directory rejected the operation with code {rc}: {message}")]
    Rejected { rc: u32, message: String },

    #[error("Directory protocol error: {0}")]
    Protocol(String),
}

impl DirectoryError {
    /// The server answered and refused; the transport itself is fine
    pub fn is_rejection(&self) -> bool {
        matches!(self, DirectoryError::Rejected { .. })
    }

    pub fn invalid_credentials() -> Self {
        DirectoryError::Rejected {
            rc: RC_INVALID_CREDENTIALS,
            message: "Invalid credentials".to_string(),
        }
    }
}

/// Connection factory for a directory server
#[async_trait]
pub trait Directory: Send + Sync {
    /// Open a new connection
    async fn connect(&self) -> Result<Box<dyn DirectorySession>, DirectoryError>;
}

/// One open directory connection
#[async_trait]
pub trait DirectorySession: Send {
    /// Simple bind; a rejected bind is reported as [`DirectoryError::Rejected`]
    async fn bind(&mut self, dn: &str, password: &str) -> Result<(), DirectoryError>;

    /// Subtree search below `base_dn`
    async fn search(
        &mut self,
        base_dn: &str,
        filter: &str,
    ) -> Result<Vec<DirectoryEntry>, DirectoryError>;

    /// Release the connection. Must be safe to call more than once.
    async fn close(&mut self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejection_classification() {
        assert!(DirectoryError::invalid_credentials().is_rejection());
        assert!(!DirectoryError::Connect("refused".into()).is_rejection());
        assert!(!DirectoryError::Protocol("eof".into()).is_rejection());
    }
}
