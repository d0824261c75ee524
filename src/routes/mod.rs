//! Route gateway: merges every endpoint's subrouter under `/api` and attaches
//! the shared state.

use std::sync::Arc;

use axum::Router;
use object_store::ObjectStore;

use crate::db::Connector;

mod db_check;
mod export;
mod greeting;
mod measurements;
mod modbus;
mod versioncheck;

// ---

/// State shared by all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Opens one database session per request.
    pub db: Arc<dyn Connector>,

    /// Container holding versioned client builds.
    pub artifacts: Arc<dyn ObjectStore>,
}

pub fn router(state: AppState) -> Router {
    // ---
    let api = Router::new()
        .merge(greeting::router())
        .merge(db_check::router())
        .merge(modbus::router())
        .merge(measurements::router())
        .merge(versioncheck::router());

    Router::new().nest("/api", api).with_state(state)
}
