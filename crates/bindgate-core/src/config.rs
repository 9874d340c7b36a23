//! Configuration for Bindgate

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::time::Duration;
use tracing::warn;

use crate::{DEFAULT_REALM, DEFAULT_SEARCH_FILTER, FILTER_PLACEHOLDERS};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GateConfig {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub gate: GateSection,

    #[serde(default)]
    pub ldap: SearchConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl GateConfig {
    pub fn from_file(path: &str) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| crate::Error::ConfigLoad(format!("Failed to read {}: {}", path, e)))?;

        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> crate::Result<Self> {
        toml::from_str(content)
            .map_err(|e| crate::Error::ConfigLoad(format!("Failed to parse config: {}", e)))
    }

    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(addr) = std::env::var("BINDGATE_BIND_ADDRESS") {
            config.server.bind_address = addr;
        }
        if let Ok(port) = std::env::var("BINDGATE_PORT") {
            match port.parse() {
                Ok(p) => config.server.port = p,
                Err(_) => warn!("Ignoring invalid BINDGATE_PORT: {}", port),
            }
        }
        if let Ok(realm) = std::env::var("BINDGATE_REALM") {
            config.gate.realm = realm;
        }
        if let Ok(level) = std::env::var("BINDGATE_LOG_LEVEL") {
            config.logging.level = level;
        }
        if let Ok(format) = std::env::var("BINDGATE_LOG_FORMAT") {
            config.logging.format = format;
        }

        // Directory settings
        if let Ok(url) = std::env::var("BINDGATE_LDAP_URL") {
            config.ldap.url = url;
        }
        if let Ok(base) = std::env::var("BINDGATE_LDAP_BASE_DN") {
            config.ldap.base_dn = base;
        }
        if let Ok(filter) = std::env::var("BINDGATE_LDAP_SEARCH_FILTER") {
            config.ldap.search_filter = filter;
        }
        if let Ok(dn) = std::env::var("BINDGATE_LDAP_BIND_DN") {
            config.ldap.service_bind_dn = Some(dn);
        }
        if let Ok(password) = std::env::var("BINDGATE_LDAP_BIND_PASSWORD") {
            config.ldap.service_bind_password = Some(SecretString::from(password));
        }
        if std::env::var("BINDGATE_LDAP_USE_TLS").map(|v| v == "true").unwrap_or(false) {
            config.ldap.use_tls = true;
        }
        if std::env::var("BINDGATE_LDAP_SKIP_TLS_VERIFY").map(|v| v == "true").unwrap_or(false) {
            config.ldap.skip_tls_verify = true;
        }
        if let Ok(timeout) = std::env::var("BINDGATE_LDAP_TIMEOUT") {
            match timeout.parse() {
                Ok(t) => config.ldap.timeout_seconds = t,
                Err(_) => warn!("Ignoring invalid BINDGATE_LDAP_TIMEOUT: {}", timeout),
            }
        }

        config
    }

    pub fn validate(&self) -> crate::Result<()> {
        let realm = &self.gate.realm;
        if realm.is_empty()
            || realm.contains('"')
            || !realm.chars().all(|c| c.is_ascii_graphic() || c == ' ')
        {
            return Err(crate::Error::InvalidConfig(
                "realm must be non-empty printable ASCII without quotes".into(),
            ));
        }
        self.ldap.validate()
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: 9393,
        }
    }
}

impl ServerConfig {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.bind_address, self.port)
    }
}

/// Settings of the HTTP request gate
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GateSection {
    /// Realm advertised in `WWW-Authenticate` challenges
    pub realm: String,
    /// Registered application names listed by `GET /apps`
    pub apps: Vec<String>,
}

impl Default for GateSection {
    fn default() -> Self {
        Self {
            realm: DEFAULT_REALM.to_string(),
            apps: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    /// `pretty` or `json`
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

/// LDAP search-and-bind configuration
///
/// Loaded once at startup and shared read-only between requests.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SearchConfig {
    /// LDAP server URL (ldap:// or ldaps://)
    /// Example: "ldap://ldap.example.com:389" or "ldaps://ldap.example.com:636"
    #[serde(default = "default_ldap_url")]
    pub url: String,

    /// Base DN for user searches
    /// Example: "ou=people,dc=example,dc=org"
    #[serde(default)]
    pub base_dn: String,

    /// User search filter
    /// Use {0} (or {username}) as placeholder
    /// Example: "(uid={0})" or "(sAMAccountName={0})"
    #[serde(default = "default_search_filter")]
    pub search_filter: String,

    /// Service account DN; searches are anonymous when unset
    #[serde(default)]
    pub service_bind_dn: Option<String>,

    /// Service account password
    #[serde(default)]
    pub service_bind_password: Option<SecretString>,

    /// Secure the transport. ldaps:// URLs are always TLS; ldap:// URLs
    /// are upgraded with STARTTLS when this is set.
    #[serde(default)]
    pub use_tls: bool,

    /// Skip TLS certificate verification (not recommended for production)
    #[serde(default)]
    pub skip_tls_verify: bool,

    /// Upper bound for all directory round trips of one authentication
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
}

fn default_ldap_url() -> String {
    "ldap://localhost:389".to_string()
}

fn default_search_filter() -> String {
    DEFAULT_SEARCH_FILTER.to_string()
}

fn default_timeout() -> u64 {
    10
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            url: default_ldap_url(),
            base_dn: String::new(),
            search_filter: default_search_filter(),
            service_bind_dn: None,
            service_bind_password: None,
            use_tls: false,
            skip_tls_verify: false,
            timeout_seconds: default_timeout(),
        }
    }
}

impl SearchConfig {
    /// Whether the URL itself selects an SSL connection
    pub fn is_ldaps(&self) -> bool {
        self.url.starts_with("ldaps://")
    }

    /// Whether a plaintext URL has to be upgraded with STARTTLS
    pub fn needs_starttls(&self) -> bool {
        self.use_tls && !self.is_ldaps()
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    /// Service credentials, if a service account is configured
    pub fn service_credentials(&self) -> Option<(&str, &str)> {
        self.service_bind_dn.as_deref().map(|dn| {
            let password = self
                .service_bind_password
                .as_ref()
                .map(|p| p.expose_secret())
                .unwrap_or("");
            (dn, password)
        })
    }

    pub fn validate(&self) -> crate::Result<()> {
        if !self.url.starts_with("ldap://") && !self.is_ldaps() {
            return Err(crate::Error::InvalidConfig(
                "LDAP url must start with ldap:// or ldaps://".into(),
            ));
        }

        if self.base_dn.trim().is_empty() {
            return Err(crate::Error::InvalidConfig("LDAP base_dn is required".into()));
        }

        if !FILTER_PLACEHOLDERS
            .iter()
            .any(|p| self.search_filter.contains(p))
        {
            return Err(crate::Error::InvalidConfig(
                "LDAP search_filter must contain a {0} placeholder".into(),
            ));
        }

        if self.service_bind_dn.is_some() && self.service_bind_password.is_none() {
            return Err(crate::Error::InvalidConfig(
                "LDAP service_bind_dn requires service_bind_password".into(),
            ));
        }

        if self.timeout_seconds == 0 {
            return Err(crate::Error::InvalidConfig(
                "LDAP timeout_seconds must be greater than zero".into(),
            ));
        }

        Ok(())
    }
}
