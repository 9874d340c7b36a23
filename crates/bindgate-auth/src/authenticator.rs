//! Search-and-bind authentication
//!
//! 1. Connect (plaintext, LDAPS or STARTTLS)
//! 2. Bind as the service account, or stay anonymous
//! 3. Search for exactly one entry matching the username
//! 4. Bind as that entry with the supplied password
//!
//! Every call opens and closes its own connection; nothing is shared
//! between calls except the read-only configuration.

use crate::credential::Credential;
use crate::directory::{Directory, DirectorySession};
use crate::ldap::{build_search_filter, LdapDirectory};
use crate::result::{AuthResult, TransportFailureKind};
use bindgate_core::SearchConfig;
use secrecy::ExposeSecret;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

pub struct SearchAndBindAuthenticator {
    config: Arc<SearchConfig>,
    directory: Arc<dyn Directory>,
}

impl SearchAndBindAuthenticator {
    pub fn new(config: Arc<SearchConfig>, directory: Arc<dyn Directory>) -> Self {
        Self { config, directory }
    }

    /// Authenticator talking to the LDAP server named in the configuration
    pub fn ldap(config: SearchConfig) -> Self {
        let config = Arc::new(config);
        let directory = Arc::new(LdapDirectory::new(config.clone()));
        Self::new(config, directory)
    }

    /// Authenticate a username and password against the directory
    pub async fn authenticate(&self, credential: &Credential) -> AuthResult {
        let result = match tokio::time::timeout(
            self.config.timeout(),
            self.search_and_bind(credential),
        )
        .await
        {
            Ok(result) => result,
            // The abandoned future drops its session, which closes the socket
            Err(_) => AuthResult::transport(
                TransportFailureKind::Timeout,
                format!(
                    "Directory did not answer within {}s",
                    self.config.timeout_seconds
                ),
            ),
        };

        match &result {
            AuthResult::Authenticated(dn) => info!(dn = %dn, "LDAP authentication succeeded"),
            AuthResult::NotFound => {
                debug!(username = %credential.username(), "LDAP user not found")
            }
            AuthResult::BindFailed => {
                debug!(username = %credential.username(), "LDAP bind rejected")
            }
            AuthResult::TransportError(failure) => error!(
                kind = failure.kind.as_str(),
                url = %self.config.url,
                "LDAP directory unavailable: {}",
                failure.message
            ),
        }

        result
    }

    async fn search_and_bind(&self, credential: &Credential) -> AuthResult {
        let mut session = match self.directory.connect().await {
            Ok(session) => session,
            Err(e) => return AuthResult::transport(TransportFailureKind::Connect, e.to_string()),
        };

        let result = self.verify(session.as_mut(), credential).await;
        session.close().await;
        result
    }

    async fn verify(
        &self,
        session: &mut dyn DirectorySession,
        credential: &Credential,
    ) -> AuthResult {
        // Step 1: Bind with service account, otherwise search anonymously
        if let Some((bind_dn, bind_password)) = self.config.service_credentials() {
            if let Err(e) = session.bind(bind_dn, bind_password).await {
                return AuthResult::transport(
                    TransportFailureKind::ServiceBind,
                    format!("Service bind as {} failed: {}", bind_dn, e),
                );
            }
        }

        // The directory is reachable, so an empty username is simply unknown
        if credential.username().is_empty() {
            return AuthResult::NotFound;
        }

        // Step 2: Search for user
        let filter = build_search_filter(&self.config.search_filter, credential.username());
        let entries = match session.search(&self.config.base_dn, &filter).await {
            Ok(entries) => entries,
            Err(e) => return AuthResult::transport(TransportFailureKind::Search, e.to_string()),
        };

        let entry = match entries.as_slice() {
            [entry] => entry,
            [] => return AuthResult::NotFound,
            _ => {
                warn!(
                    matches = entries.len(),
                    filter = %filter,
                    "Ambiguous LDAP search result, refusing to pick an entry"
                );
                return AuthResult::NotFound;
            }
        };

        debug!("Found user DN: {}", entry.dn);

        // An empty password would be an unauthenticated bind
        let password = credential.password().expose_secret();
        if password.is_empty() {
            return AuthResult::BindFailed;
        }

        // Step 3: Verify user password by binding as the user
        match session.bind(&entry.dn, password).await {
            Ok(()) => AuthResult::Authenticated(entry.dn.clone()),
            Err(e) if e.is_rejection() => AuthResult::BindFailed,
            Err(e) => AuthResult::transport(TransportFailureKind::UserBind, e.to_string()),
        }
    }
}
