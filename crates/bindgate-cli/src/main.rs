//! Bindgate - LDAP search-and-bind request gate
//!
//! Protects HTTP endpoints with Basic credentials verified against an LDAP
//! directory.

use anyhow::Context;
use bindgate_auth::{AuthResult, Credential, Directory, LdapDirectory, MemoryDirectory};
use bindgate_core::config::GateConfig;
use bindgate_server::GateServer;
use clap::{Parser, Subcommand};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "bindgate")]
#[command(author = "Bindgate Team")]
#[command(version = bindgate_core::VERSION)]
#[command(about = "LDAP search-and-bind request gate", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Configuration file path
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Bind address
    #[arg(long, env = "BINDGATE_BIND_ADDRESS")]
    bind: Option<String>,

    /// Port number
    #[arg(short, long, env = "BINDGATE_PORT")]
    port: Option<u16>,

    /// LDAP server URL
    #[arg(long, env = "BINDGATE_LDAP_URL", global = true)]
    ldap_url: Option<String>,

    /// Base DN for user searches
    #[arg(long, env = "BINDGATE_LDAP_BASE_DN", global = true)]
    base_dn: Option<String>,

    /// User search filter, {0} is replaced with the username
    #[arg(long, env = "BINDGATE_LDAP_SEARCH_FILTER", global = true)]
    search_filter: Option<String>,

    /// Serve users from an LDIF file instead of an LDAP server (development only)
    #[arg(long, global = true)]
    directory_ldif: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "BINDGATE_LOG_LEVEL")]
    log_level: Option<String>,

    /// Log format (pretty, json)
    #[arg(long, env = "BINDGATE_LOG_FORMAT")]
    log_format: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the gate server
    Server,

    /// Show version information
    Version,

    /// Authenticate one user against the directory and print the verdict
    Check {
        username: String,

        #[arg(long, env = "BINDGATE_CHECK_PASSWORD", hide_env_values = true)]
        password: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let config = load_config(&cli)?;
    init_logging(&config);

    match cli.command {
        Some(Commands::Version) => {
            println!("bindgate {}", bindgate_core::VERSION);
        }
        Some(Commands::Check { username, password }) => {
            let directory = directory(cli.directory_ldif.as_deref(), &config)?;
            check(config, directory, Credential::new(username, password)).await?;
        }
        Some(Commands::Server) | None => {
            let server = match cli.directory_ldif.as_deref() {
                Some(path) => {
                    let directory = directory(Some(path), &config)?;
                    GateServer::with_directory(config, directory)
                }
                None => GateServer::new(config),
            };
            info!("Starting Bindgate server...");
            server.run().await?;
        }
    }

    Ok(())
}

/// Config file or environment, then command-line overrides
fn load_config(cli: &Cli) -> anyhow::Result<GateConfig> {
    let mut config = if let Some(config_path) = &cli.config {
        GateConfig::from_file(config_path)
            .with_context(|| format!("Failed to load config from {}", config_path))?
    } else {
        GateConfig::from_env()
    };

    if let Some(bind) = &cli.bind {
        config.server.bind_address = bind.clone();
    }
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    if let Some(url) = &cli.ldap_url {
        config.ldap.url = url.clone();
    }
    if let Some(base_dn) = &cli.base_dn {
        config.ldap.base_dn = base_dn.clone();
    }
    if let Some(filter) = &cli.search_filter {
        config.ldap.search_filter = filter.clone();
    }
    if let Some(level) = &cli.log_level {
        config.logging.level = level.clone();
    }
    if let Some(format) = &cli.log_format {
        config.logging.format = format.clone();
    }

    Ok(config)
}

fn init_logging(config: &GateConfig) {
    // RUST_LOG wins over the configured level
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    let (pretty, json) = if config.logging.format.eq_ignore_ascii_case("json") {
        (None, Some(fmt::layer().json().with_target(true)))
    } else {
        (Some(fmt::layer().with_target(true)), None)
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(pretty)
        .with(json)
        .init();
}

fn directory(ldif: Option<&str>, config: &GateConfig) -> anyhow::Result<Arc<dyn Directory>> {
    match ldif {
        Some(path) => {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path))?;
            let directory = MemoryDirectory::from_ldif(&content)
                .with_context(|| format!("Failed to parse {}", path))?;
            info!("Loaded {} entries from {}", directory.len(), path);
            Ok(Arc::new(directory))
        }
        None => Ok(Arc::new(LdapDirectory::new(Arc::new(config.ldap.clone())))),
    }
}

async fn check(
    config: GateConfig,
    directory: Arc<dyn Directory>,
    credential: Credential,
) -> anyhow::Result<()> {
    config.validate()?;

    let authenticator =
        bindgate_auth::SearchAndBindAuthenticator::new(Arc::new(config.ldap), directory);

    match authenticator.authenticate(&credential).await {
        AuthResult::Authenticated(dn) => {
            println!("authenticated: {}", dn);
            Ok(())
        }
        AuthResult::TransportError(failure) => {
            anyhow::bail!("directory unavailable ({})", failure)
        }
        other => anyhow::bail!("rejected: {}", other.outcome()),
    }
}
