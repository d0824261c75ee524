// src/routes/greeting.rs
//! Liveness greeting at `/api/http_trigger`.
//!
//! Answers GET and POST without touching the database or blob storage. A
//! `name` may come from the query string or, failing that, from a JSON body
//! of the form `{"name": "..."}`.

use axum::{body::Bytes, extract::Query, routing::get, Router};
use serde::Deserialize;
use tracing::info;

#[derive(Debug, Deserialize)]
struct GreetingQuery {
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GreetingBody {
    name: Option<String>,
}

/// Handle `GET|POST /api/http_trigger`.
async fn greet(Query(params): Query<GreetingQuery>, body: Bytes) -> String {
    // ---
    info!("Processing greeting request");

    // A body that is not JSON is treated the same as no body.
    let name = params.name.filter(|n| !n.is_empty()).or_else(|| {
        serde_json::from_slice::<GreetingBody>(&body)
            .ok()
            .and_then(|b| b.name)
            .filter(|n| !n.is_empty())
    });

    greeting_for(name.as_deref())
}

fn greeting_for(name: Option<&str>) -> String {
    // ---
    match name {
        Some(name) => format!(
            "Hello, {}. This HTTP triggered function executed successfully.",
            name
        ),
        None => "This HTTP triggered function executed successfully. Pass a name in the query \
                 string or in the request body for a personalized response."
            .to_string(),
    }
}

/// Create a subrouter containing the `/http_trigger` route.
///
/// Generic over the application state so it merges cleanly with the gateway
/// router.
pub fn router<S>() -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    Router::new().route("/http_trigger", get(greet).post(greet))
}
