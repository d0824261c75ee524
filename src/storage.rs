//! Blob storage for versioned client builds.
//!
//! The container is reached through `object_store`, so handlers only see an
//! `Arc<dyn ObjectStore>` and tests can swap in the in-memory store.

use std::sync::Arc;

use axum::body::Bytes;
use chrono::{DateTime, Utc};
use futures::{stream::BoxStream, TryStreamExt};
use object_store::{
    azure::{AzureConfigKey, MicrosoftAzureBuilder},
    path::Path,
    ObjectStore,
};
use serde::Serialize;

use crate::error::StorageError;

// ---

/// Listing entry reported by `GET /api/versioncheck`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BlobInfo {
    pub name: String,
    pub last_modified: DateTime<Utc>,
    pub size: u64,
}

/// An opened artifact. The size is known before the first chunk arrives.
pub struct BlobStream {
    pub size: u64,
    pub chunks: BoxStream<'static, object_store::Result<Bytes>>,
}

/// Fields of an Azure storage connection string that we act on.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionString {
    pub account_name: Option<String>,
    pub account_key: Option<String>,
    pub sas_token: Option<String>,
    pub blob_endpoint: Option<String>,
    pub use_emulator: bool,
}

impl ConnectionString {
    /// Parse `Key=Value;Key=Value`. Keys are case-insensitive, unknown keys
    /// (`DefaultEndpointsProtocol`, `EndpointSuffix`, ...) are ignored.
    pub fn parse(raw: &str) -> Result<Self, StorageError> {
        // ---
        let mut parsed = ConnectionString::default();

        for part in raw.split(';').map(str::trim).filter(|p| !p.is_empty()) {
            let (key, value) = part.split_once('=').ok_or_else(|| {
                StorageError::ConnectionString(format!("segment '{}' has no '='", truncated(part)))
            })?;
            let value = value.trim().to_string();

            match key.trim().to_ascii_lowercase().as_str() {
                "accountname" => parsed.account_name = Some(value),
                "accountkey" => parsed.account_key = Some(value),
                "sharedaccesssignature" => {
                    parsed.sas_token = Some(value.trim_start_matches('?').to_string())
                }
                "blobendpoint" => parsed.blob_endpoint = Some(value),
                "usedevelopmentstorage" => parsed.use_emulator = value.eq_ignore_ascii_case("true"),
                _ => {}
            }
        }

        if parsed.account_name.is_none() && !parsed.use_emulator {
            return Err(StorageError::ConnectionString(
                "AccountName is required".to_string(),
            ));
        }
        Ok(parsed)
    }
}

/// Avoid echoing anything that might be a secret in parse errors.
fn truncated(part: &str) -> &str {
    part.get(..part.len().min(16)).unwrap_or("")
}

/// Build the Azure-backed store for `container`.
pub fn azure_store(
    connection: &str,
    container: &str,
) -> Result<Arc<dyn ObjectStore>, StorageError> {
    // ---
    let conn = ConnectionString::parse(connection)?;

    let mut builder = MicrosoftAzureBuilder::new().with_container_name(container);

    if conn.use_emulator {
        builder = builder.with_use_emulator(true);
    }
    if let Some(account) = conn.account_name {
        builder = builder.with_account(account);
    }
    if let Some(key) = conn.account_key {
        builder = builder.with_access_key(key);
    }
    if let Some(sas) = conn.sas_token {
        builder = builder.with_config(AzureConfigKey::SasKey, sas);
    }
    if let Some(endpoint) = conn.blob_endpoint {
        if endpoint.starts_with("http://") {
            builder = builder.with_allow_http(true);
        }
        builder = builder.with_endpoint(endpoint);
    }

    let store = builder.build()?;
    tracing::info!("Artifact store ready for container '{}'", container);
    Ok(Arc::new(store))
}

/// Every object in the store, sorted by name.
pub async fn list_blobs(store: &dyn ObjectStore) -> Result<Vec<BlobInfo>, object_store::Error> {
    // ---
    let mut blobs: Vec<BlobInfo> = store
        .list(None)
        .map_ok(|meta| BlobInfo {
            name: meta.location.to_string(),
            last_modified: meta.last_modified,
            size: meta.size as u64,
        })
        .try_collect()
        .await?;

    blobs.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(blobs)
}

/// Open `name` for streaming. A missing object fails here, before any byte
/// is read.
pub async fn open_blob(
    store: &dyn ObjectStore,
    name: &str,
) -> Result<BlobStream, object_store::Error> {
    // ---
    let result = store.get(&Path::from(name)).await?;
    Ok(BlobStream {
        size: result.meta.size as u64,
        chunks: result.into_stream(),
    })
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use object_store::{memory::InMemory, PutPayload};

    #[test]
    fn test_parse_account_key_string() {
        // ---
        let conn = ConnectionString::parse(
            "DefaultEndpointsProtocol=https;AccountName=powertick;AccountKey=a2V5PT0=;EndpointSuffix=core.windows.net",
        )
        .unwrap();

        assert_eq!(conn.account_name.as_deref(), Some("powertick"));
        // Base64 padding survives because we split on the first '=' only.
        assert_eq!(conn.account_key.as_deref(), Some("a2V5PT0="));
        assert!(conn.sas_token.is_none());
        assert!(!conn.use_emulator);
    }

    #[test]
    fn test_parse_sas_string() {
        // ---
        let conn = ConnectionString::parse(
            "BlobEndpoint=https://powertick.blob.core.windows.net/;SharedAccessSignature=?sv=2022-11-02&sig=abc%3D;AccountName=powertick",
        )
        .unwrap();

        assert_eq!(conn.sas_token.as_deref(), Some("sv=2022-11-02&sig=abc%3D"));
        assert_eq!(
            conn.blob_endpoint.as_deref(),
            Some("https://powertick.blob.core.windows.net/")
        );
    }

    #[test]
    fn test_parse_emulator_without_account() {
        // ---
        let conn = ConnectionString::parse("UseDevelopmentStorage=true").unwrap();
        assert!(conn.use_emulator);
    }

    #[test]
    fn test_parse_requires_account() {
        // ---
        let err = ConnectionString::parse("AccountKey=abc").unwrap_err();
        assert!(err.to_string().contains("AccountName"));
    }

    #[test]
    fn test_parse_rejects_malformed_segment() {
        // ---
        assert!(ConnectionString::parse("AccountName=a;garbage").is_err());
    }

    #[tokio::test]
    async fn test_list_and_fetch_in_memory() {
        // ---
        let store = InMemory::new();
        store
            .put(&Path::from("app-1.1.0.zip"), PutPayload::from_static(b"old"))
            .await
            .unwrap();
        store
            .put(&Path::from("app-1.0.0.zip"), PutPayload::from_static(b"older!"))
            .await
            .unwrap();

        let blobs = list_blobs(&store).await.unwrap();
        let names: Vec<_> = blobs.iter().map(|b| b.name.as_str()).collect();
        assert_eq!(names, ["app-1.0.0.zip", "app-1.1.0.zip"]);
        assert_eq!(blobs[0].size, 6);

        let blob = open_blob(&store, "app-1.1.0.zip").await.unwrap();
        assert_eq!(blob.size, 3);
        let bytes: Vec<u8> = blob
            .chunks
            .map_ok(|chunk| chunk.to_vec())
            .try_concat()
            .await
            .unwrap();
        assert_eq!(bytes, b"old");
    }

    #[tokio::test]
    async fn test_open_missing_blob() {
        // ---
        let store = InMemory::new();
        assert!(matches!(
            open_blob(&store, "nope.zip").await,
            Err(object_store::Error::NotFound { .. })
        ));
    }
}
