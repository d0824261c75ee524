//! Configuration loader for the `powertick-api` service.
//!
//! This module centralizes all runtime configuration values and their defaults,
//! loading from environment variables (with optional `.env` file support
//! provided by the caller). By consolidating configuration logic here, we
//! avoid scattering `env::var` calls throughout the codebase.
//!
//! Mode-specific requirements (a password for `local`, a token endpoint for
//! `cloud`) are checked when credentials are resolved, see `db::credentials`.
use std::env;

use anyhow::{anyhow, Result};

/// Parse an optional port from the lookup with a default value.
macro_rules! parse_port {
    ($lookup:expr, $var_name:expr, $default:expr) => {
        $lookup($var_name)
            .map(|v| v.parse::<u16>())
            .transpose()
            .map_err(|e| anyhow!("Invalid {}: {}", $var_name, e))?
            .unwrap_or($default)
    };
}

/// Read a required, non-empty string from the lookup.
macro_rules! require_env {
    ($lookup:expr, $var_name:expr) => {
        $lookup($var_name)
            .filter(|v: &String| !v.is_empty())
            .ok_or_else(|| anyhow!("{} must be set in .env or environment", $var_name))?
    };
}

pub const DEFAULT_ENVIRONMENT: &str = "local";
pub const DEFAULT_PG_PORT: u16 = 5432;
pub const DEFAULT_CONTAINER: &str = "versions";
pub const DEFAULT_LISTEN_PORT: u16 = 8080;

/// Strongly typed application configuration.
///
/// All fields are immutable after loading, ensuring a consistent configuration
/// snapshot for the lifetime of the application.
#[derive(Debug, Clone)]
pub struct Config {
    // ---
    /// Credential mode selector, `local` or `cloud`.
    pub environment: String,

    pub pg_host: String,
    pub pg_database: String,
    pub pg_port: u16,

    /// Database role. Optional here because `cloud` falls back to the
    /// managed identity name.
    pub pg_user: Option<String>,

    /// Static password, only meaningful in `local` mode.
    pub pg_password: Option<String>,

    /// Azure storage connection string for the update artifacts.
    pub storage_connection: String,

    /// Blob container holding versioned builds.
    pub storage_container: String,

    /// Managed identity endpoint exposed by App Service / Functions hosts.
    pub identity_endpoint: Option<String>,
    pub identity_header: Option<String>,

    /// HTTP listen port.
    pub listen_port: u16,
}

/// Load configuration from process environment variables with defaults.
///
/// Required:
/// - `PGHOST`, `PGDATABASE` – database location
/// - `STORAGE_CONNECTION_STR` – Azure storage connection string
///
/// Optional:
/// - `ENVIRONMENT` – `local` (default) or `cloud`
/// - `PGPORT` – database port (default: 5432)
/// - `PGUSER`, `PGPASSWORD` – static credentials
/// - `STORAGE_CONTAINER` – blob container (default: `versions`)
/// - `IDENTITY_ENDPOINT`, `IDENTITY_HEADER` – managed identity endpoint
/// - `FUNCTIONS_CUSTOMHANDLER_PORT` or `PORT` – listen port (default: 8080)
///
/// Returns an error if any required variable is missing or invalid.
pub fn load_from_env() -> Result<Config> {
    // ---
    load_from(|name| env::var(name).ok())
}

/// Load configuration through an arbitrary variable lookup.
pub fn load_from<F>(lookup: F) -> Result<Config>
where
    F: Fn(&str) -> Option<String>,
{
    // ---
    let environment = lookup("ENVIRONMENT")
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| DEFAULT_ENVIRONMENT.to_string());

    let pg_host = require_env!(lookup, "PGHOST");
    let pg_database = require_env!(lookup, "PGDATABASE");
    let pg_port = parse_port!(lookup, "PGPORT", DEFAULT_PG_PORT);
    let storage_connection = require_env!(lookup, "STORAGE_CONNECTION_STR");

    let storage_container = lookup("STORAGE_CONTAINER")
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| DEFAULT_CONTAINER.to_string());

    let listen_port = match lookup("FUNCTIONS_CUSTOMHANDLER_PORT") {
        Some(_) => parse_port!(lookup, "FUNCTIONS_CUSTOMHANDLER_PORT", DEFAULT_LISTEN_PORT),
        None => parse_port!(lookup, "PORT", DEFAULT_LISTEN_PORT),
    };

    Ok(Config {
        environment,
        pg_host,
        pg_database,
        pg_port,
        pg_user: lookup("PGUSER").filter(|v| !v.is_empty()),
        pg_password: lookup("PGPASSWORD"),
        storage_connection,
        storage_container,
        identity_endpoint: lookup("IDENTITY_ENDPOINT").filter(|v| !v.is_empty()),
        identity_header: lookup("IDENTITY_HEADER").filter(|v| !v.is_empty()),
        listen_port,
    })
}

impl Config {
    /// Log the loaded configuration for debugging purposes.
    ///
    /// Masks the database password and the storage account secrets while
    /// showing all other configuration values that were loaded.
    pub fn log_config(&self) {
        // ---
        let masked_password = self.pg_password.as_ref().map(|_| "****");

        tracing::info!("Configuration loaded:");
        tracing::info!("  ENVIRONMENT            : {}", self.environment);
        tracing::info!("  PGHOST                 : {}", self.pg_host);
        tracing::info!("  PGDATABASE             : {}", self.pg_database);
        tracing::info!("  PGPORT                 : {}", self.pg_port);
        tracing::info!("  PGUSER                 : {:?}", self.pg_user);
        tracing::info!("  PGPASSWORD             : {:?}", masked_password);
        tracing::info!(
            "  STORAGE_CONNECTION_STR : {}",
            mask_connection_string(&self.storage_connection)
        );
        tracing::info!("  STORAGE_CONTAINER      : {}", self.storage_container);
        tracing::info!("  IDENTITY_ENDPOINT      : {:?}", self.identity_endpoint);
        tracing::info!("  LISTEN_PORT            : {}", self.listen_port);
    }
}

/// Replace the values of secret-bearing keys in a `Key=Value;...` string.
fn mask_connection_string(raw: &str) -> String {
    // ---
    raw.split(';')
        .filter(|part| !part.is_empty())
        .map(|part| match part.split_once('=') {
            Some((key, _))
                if key.eq_ignore_ascii_case("AccountKey")
                    || key.eq_ignore_ascii_case("SharedAccessSignature") =>
            {
                format!("{}=****", key)
            }
            _ => part.to_string(),
        })
        .collect::<Vec<_>>()
        .join(";")
}
