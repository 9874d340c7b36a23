//! LDAP Client implementation
//!
//! Handles LDAP connections, binds and user searches.
//! Supports LDAP, LDAPS (SSL), and STARTTLS connections.

use crate::directory::{
    Directory, DirectoryEntry, DirectoryError, DirectorySession, RC_NO_SUCH_OBJECT,
};
use async_trait::async_trait;
use bindgate_core::SearchConfig;
use ldap3::{Ldap, LdapConnAsync, LdapConnSettings, LdapError, Scope, SearchEntry};
use std::sync::Arc;
use tracing::debug;

/// Only the DN of a match is used; "1.1" asks the server for no attributes
const SEARCH_ATTRIBUTES: [&str; 1] = ["1.1"];

/// Directory backed by a real LDAP server
pub struct LdapDirectory {
    config: Arc<SearchConfig>,
}

impl LdapDirectory {
    pub fn new(config: Arc<SearchConfig>) -> Self {
        Self { config }
    }

    fn settings(&self) -> LdapConnSettings {
        LdapConnSettings::new()
            .set_conn_timeout(self.config.timeout())
            .set_starttls(self.config.needs_starttls())
            .set_no_tls_verify(self.config.skip_tls_verify)
    }
}

#[async_trait]
impl Directory for LdapDirectory {
    /// Create LDAP connection with proper TLS settings
    async fn connect(&self) -> Result<Box<dyn DirectorySession>, DirectoryError> {
        debug!(
            url = %self.config.url,
            starttls = self.config.needs_starttls(),
            "Connecting to LDAP server"
        );

        let (conn, ldap) = LdapConnAsync::with_settings(self.settings(), &self.config.url)
            .await
            .map_err(|e| DirectoryError::Connect(e.to_string()))?;

        ldap3::drive!(conn);

        Ok(Box::new(LdapSession { ldap, open: true }))
    }
}

/// One connection to the LDAP server
///
/// Dropping the last `Ldap` handle also ends the connection driver, so a
/// session abandoned by a timeout still releases its socket.
struct LdapSession {
    ldap: Ldap,
    open: bool,
}

#[async_trait]
impl DirectorySession for LdapSession {
    async fn bind(&mut self, dn: &str, password: &str) -> Result<(), DirectoryError> {
        let result = self
            .ldap
            .simple_bind(dn, password)
            .await
            .map_err(|e| DirectoryError::Protocol(format!("Bind failed: {}", e)))?;

        if result.rc != 0 {
            return Err(DirectoryError::Rejected {
                rc: result.rc,
                message: result.text,
            });
        }

        Ok(())
    }

    async fn search(
        &mut self,
        base_dn: &str,
        filter: &str,
    ) -> Result<Vec<DirectoryEntry>, DirectoryError> {
        debug!("Searching for user with filter: {}", filter);

        let search = self
            .ldap
            .search(base_dn, Scope::Subtree, filter, SEARCH_ATTRIBUTES.to_vec())
            .await
            .map_err(|e| DirectoryError::Protocol(format!("User search failed: {}", e)))?;

        let rs = match search.success() {
            Ok((rs, _res)) => rs,
            // A missing search base simply contains no users
            Err(LdapError::LdapResult { result }) if result.rc == RC_NO_SUCH_OBJECT => {
                return Ok(Vec::new())
            }
            Err(LdapError::LdapResult { result }) => {
                return Err(DirectoryError::Rejected {
                    rc: result.rc,
                    message: result.text,
                })
            }
            Err(e) => {
                return Err(DirectoryError::Protocol(format!("User search error: {}", e)))
            }
        };

        let entries = rs
            .into_iter()
            .map(SearchEntry::construct)
            .map(|entry| DirectoryEntry {
                dn: entry.dn,
                attributes: entry.attrs.into_iter().collect(),
            })
            .collect::<Vec<_>>();

        debug!("Search returned {} entries", entries.len());
        Ok(entries)
    }

    async fn close(&mut self) {
        if self.open {
            self.open = false;
            let _ = self.ldap.unbind().await;
        }
    }
}
