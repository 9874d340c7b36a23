//! Bindgate Core Library
//!
//! Configuration, error types and shared constants for the Bindgate
//! LDAP authentication gateway.

pub mod config;
pub mod error;

pub use config::{GateConfig, SearchConfig};
pub use error::{Error, Result};

/// Bindgate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default HTTP authentication realm
pub const DEFAULT_REALM: &str = "bindgate";

/// Default LDAP search filter; `{0}` is replaced with the escaped username
pub const DEFAULT_SEARCH_FILTER: &str = "(uid={0})";

/// Placeholder tokens accepted in a search filter template
pub const FILTER_PLACEHOLDERS: [&str; 2] = ["{0}", "{username}"];
