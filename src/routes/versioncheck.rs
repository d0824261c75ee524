// src/routes/versioncheck.rs
//! Update distribution at `/api/versioncheck`.
//!
//! - `GET` lists the build artifacts in the container
//! - `POST {"file": "<name>"}` streams one artifact back
//! - anything else is a 405 naming the method

use axum::{
    body::{Body, Bytes},
    extract::State,
    http::{header, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::any,
    Json, Router,
};
use serde::Deserialize;
use tracing::info;

use super::AppState;
use crate::{error::ApiError, storage};

#[derive(Debug, Deserialize)]
struct FetchRequest {
    file: Option<String>,
}

pub fn router() -> Router<AppState> {
    // ---
    Router::new().route("/versioncheck", any(handler))
}

async fn handler(
    method: Method,
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Response, ApiError> {
    // ---
    match method {
        Method::GET => list(&state).await,
        Method::POST => fetch(&state, &body).await,
        other => Err(ApiError::MethodNotAllowed(other.to_string())),
    }
}

async fn list(state: &AppState) -> Result<Response, ApiError> {
    // ---
    info!("Listing available versions");

    let blobs = storage::list_blobs(state.artifacts.as_ref())
        .await
        .map_err(|e| ApiError::Upstream(format!("Failed to list versions: {}", e)))?;

    if blobs.is_empty() {
        return Err(ApiError::NotFound("No versions found.".to_string()));
    }

    info!("Found {} versions", blobs.len());
    Ok((StatusCode::OK, Json(blobs)).into_response())
}

async fn fetch(state: &AppState, body: &[u8]) -> Result<Response, ApiError> {
    // ---
    let name = requested_file(body)?;
    info!("Downloading version artifact {}", name);

    // Open before responding so a missing blob is still a 500.
    let blob = storage::open_blob(state.artifacts.as_ref(), &name)
        .await
        .map_err(|e| ApiError::Upstream(format!("Failed to download {}: {}", name, e)))?;

    let disposition = format!(
        "attachment; filename=\"{}\"",
        name.rsplit('/').next().unwrap_or(&name).replace('"', "")
    );

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "application/octet-stream".to_string()),
            (header::CONTENT_LENGTH, blob.size.to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        Body::from_stream(blob.chunks),
    )
        .into_response())
}

/// Pull the non-empty `file` field out of a JSON body.
fn requested_file(body: &[u8]) -> Result<String, ApiError> {
    // ---
    let request: FetchRequest = serde_json::from_slice(body).map_err(|_| {
        ApiError::Validation("Request body must be JSON with a 'file' field.".to_string())
    })?;

    request
        .file
        .map(|f| f.trim().to_string())
        .filter(|f| !f.is_empty())
        .ok_or_else(|| ApiError::Validation("Missing 'file' in request body.".to_string()))
}
