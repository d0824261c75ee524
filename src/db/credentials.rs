//! Credential strategies for reaching PostgreSQL.
//!
//! The strategy is picked once from `ENVIRONMENT` at startup:
//! - `local`: static user/password from configuration
//! - `cloud`: managed identity, the password is a short-lived bearer token
//!
//! Both modes require TLS.

use std::fmt;

use sqlx::postgres::{PgConnectOptions, PgSslMode};

use super::identity::TokenSource;
use crate::{error::DbError, Config};

/// Role name used when `PGUSER` is absent in `cloud` mode.
pub const MANAGED_IDENTITY_USER: &str = "PowerTick-API-Py";

/// Where the database lives, independent of how we authenticate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DbTarget {
    pub host: String,
    pub database: String,
    pub port: u16,
}

/// How connections authenticate.
#[derive(Clone)]
pub enum Credentials {
    Password { user: String, password: String },
    ManagedIdentity { user: String, tokens: TokenSource },
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credentials::Password { user, .. } => f
                .debug_struct("Password")
                .field("user", user)
                .field("password", &"****")
                .finish(),
            Credentials::ManagedIdentity { user, tokens } => f
                .debug_struct("ManagedIdentity")
                .field("user", user)
                .field("tokens", tokens)
                .finish(),
        }
    }
}

impl Credentials {
    /// Select the strategy named by `environment`.
    ///
    /// Fails on an unknown environment without touching the network.
    pub fn from_config(cfg: &Config) -> Result<Self, DbError> {
        // ---
        match cfg.environment.as_str() {
            "local" => {
                let user = cfg
                    .pg_user
                    .clone()
                    .ok_or(DbError::MissingSetting("PGUSER", "local"))?;
                let password = cfg
                    .pg_password
                    .clone()
                    .ok_or(DbError::MissingSetting("PGPASSWORD", "local"))?;
                Ok(Credentials::Password { user, password })
            }
            "cloud" => Ok(Credentials::ManagedIdentity {
                user: cfg
                    .pg_user
                    .clone()
                    .unwrap_or_else(|| MANAGED_IDENTITY_USER.to_string()),
                tokens: TokenSource::from_config(cfg),
            }),
            other => Err(DbError::UnknownEnvironment(other.to_string())),
        }
    }

    pub fn mode(&self) -> &'static str {
        match self {
            Credentials::Password { .. } => "local",
            Credentials::ManagedIdentity { .. } => "cloud",
        }
    }

    /// Produce connection options for `target`.
    ///
    /// In managed identity mode this fetches a fresh token on every call; the
    /// token's own expiry bounds the connection's lifetime.
    pub async fn connect_options(&self, target: &DbTarget) -> Result<PgConnectOptions, DbError> {
        // ---
        let (user, password) = match self {
            Credentials::Password { user, password } => {
                tracing::debug!("Using password authentication for user {}", user);
                (user.as_str(), password.clone())
            }
            Credentials::ManagedIdentity { user, tokens } => {
                tracing::debug!("Using managed identity authentication for user {}", user);
                (user.as_str(), tokens.fetch().await?)
            }
        };

        Ok(base_options(target).username(user).password(&password))
    }
}

fn base_options(target: &DbTarget) -> PgConnectOptions {
    // ---
    PgConnectOptions::new()
        .host(&target.host)
        .database(&target.database)
        .port(target.port)
        .ssl_mode(PgSslMode::Require)
}

impl From<&Config> for DbTarget {
    fn from(cfg: &Config) -> Self {
        DbTarget {
            host: cfg.pg_host.clone(),
            database: cfg.pg_database.clone(),
            port: cfg.pg_port,
        }
    }
}
