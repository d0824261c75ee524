//! PowerTick API: HTTP endpoints over the metering database and the update
//! artifact store.
//!
//! Module boundaries follow the binary's startup sequence: `config` is read
//! once, `db` and `storage` are built from it, and `routes` wires both into
//! the Axum router.

pub mod config;
pub mod csv_export;
pub mod db;
pub mod error;
pub mod models;
pub mod routes;
pub mod storage;

pub use config::Config;
pub use error::{ApiError, DbError, StorageError};
pub use routes::{router, AppState};
