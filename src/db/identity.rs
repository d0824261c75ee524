//! Managed identity token acquisition.
//!
//! Azure hosts expose the token endpoint in one of two ways. App Service and
//! Functions set `IDENTITY_ENDPOINT`/`IDENTITY_HEADER`; virtual machines and
//! containers fall back to the instance metadata service (IMDS).

use std::fmt;

use serde::Deserialize;

use crate::{error::DbError, Config};

/// Token audience for Azure Database for PostgreSQL.
pub const DATABASE_AUDIENCE: &str = "https://ossrdbms-aad.database.windows.net";

const IMDS_ENDPOINT: &str = "http://169.254.169.254/metadata/identity/oauth2/token";
const IMDS_API_VERSION: &str = "2018-02-01";
const APP_SERVICE_API_VERSION: &str = "2019-08-01";

#[derive(Clone, PartialEq, Eq)]
enum Endpoint {
    AppService { url: String, secret: String },
    Imds { url: String },
}

/// Fetches bearer tokens for [`DATABASE_AUDIENCE`].
///
/// Stateless: each call asks the identity endpoint again.
#[derive(Clone)]
pub struct TokenSource {
    client: reqwest::Client,
    endpoint: Endpoint,
}

// IDENTITY_HEADER is a credential; never print it.
impl fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::AppService { url, .. } => f
                .debug_struct("AppService")
                .field("url", url)
                .field("secret", &"****")
                .finish(),
            Endpoint::Imds { url } => f.debug_struct("Imds").field("url", url).finish(),
        }
    }
}

impl fmt::Debug for TokenSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenSource")
            .field("endpoint", &self.endpoint)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

impl TokenSource {
    pub fn from_config(cfg: &Config) -> Self {
        // ---
        let endpoint = match (&cfg.identity_endpoint, &cfg.identity_header) {
            (Some(url), Some(secret)) => Endpoint::AppService {
                url: url.clone(),
                secret: secret.clone(),
            },
            _ => Endpoint::Imds {
                url: IMDS_ENDPOINT.to_string(),
            },
        };

        TokenSource {
            client: reqwest::Client::new(),
            endpoint,
        }
    }

    /// Request a token for the database audience.
    pub async fn fetch(&self) -> Result<String, DbError> {
        // ---
        let request = match &self.endpoint {
            Endpoint::AppService { url, secret } => self
                .client
                .get(url)
                .query(&[
                    ("api-version", APP_SERVICE_API_VERSION),
                    ("resource", DATABASE_AUDIENCE),
                ])
                .header("X-IDENTITY-HEADER", secret),
            Endpoint::Imds { url } => self
                .client
                .get(url)
                .query(&[
                    ("api-version", IMDS_API_VERSION),
                    ("resource", DATABASE_AUDIENCE),
                ])
                .header("Metadata", "true"),
        };

        tracing::debug!("Requesting managed identity token for {}", DATABASE_AUDIENCE);

        let response = request
            .send()
            .await
            .map_err(|e| DbError::Token(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DbError::Token(format!(
                "identity endpoint returned {}: {}",
                status, body
            )));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| DbError::Token(e.to_string()))?;

        Ok(token.access_token)
    }
}
