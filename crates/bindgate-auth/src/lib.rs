//! Authentication for Bindgate
//!
//! Resolves HTTP Basic credentials against an LDAP directory using the
//! search-and-bind pattern.

pub mod authenticator;
pub mod credential;
pub mod directory;
pub mod ldap;
pub mod memory;
pub mod result;

pub use authenticator::SearchAndBindAuthenticator;
pub use credential::{basic_authorization_header, Credential, CredentialError};
pub use directory::{Directory, DirectoryEntry, DirectoryError, DirectorySession};
pub use ldap::{build_search_filter, LdapDirectory};
pub use memory::MemoryDirectory;
pub use result::{AuthResult, TransportFailure, TransportFailureKind};
