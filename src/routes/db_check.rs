// src/routes/db_check.rs
//! Database connectivity check at `/api/testDBconnection`.
//!
//! Opens a session and releases it straight away. Failures are reported in
//! the JSON body with `success: false`; the status is always 200.

use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;
use tracing::{error, info};

use super::AppState;
use crate::db::{self, Connector, DbError};

#[derive(Debug, Serialize)]
struct ConnectionReport {
    success: bool,
    message: String,
}

async fn handler(State(state): State<AppState>) -> Json<ConnectionReport> {
    // ---
    info!("Processing database connection test request");
    Json(check(state.db.as_ref()).await)
}

async fn check(connector: &dyn Connector) -> ConnectionReport {
    // ---
    let outcome = db::with_session(connector, |_session| {
        Box::pin(async { Ok::<_, DbError>(()) })
    })
    .await;

    match outcome {
        Ok(()) => ConnectionReport {
            success: true,
            message: "Connection to database successful.".to_string(),
        },
        Err(e) => {
            error!("Database connection test failed: {}", e);
            ConnectionReport {
                success: false,
                message: format!("Connection to database failed: {}", e),
            }
        }
    }
}

pub fn router() -> Router<AppState> {
    // ---
    Router::new().route("/testDBconnection", get(handler))
}
