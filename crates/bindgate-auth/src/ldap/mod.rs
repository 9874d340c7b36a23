//! LDAP directory backend
//!
//! Supports:
//! - LDAP (plaintext)
//! - LDAPS (SSL)
//! - STARTTLS upgrade of plaintext connections

mod client;
mod filter;

pub use client::LdapDirectory;
pub use filter::build_search_filter;
