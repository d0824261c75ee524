//! Database access for the PowerTick API.
//!
//! Every request opens its own connection through a [`Connector`] and drives
//! it through a [`Session`]. There is no pool: a session lives for the
//! duration of one request and is released before the response is rendered.
//!
//! Query results come back as a [`Table`] whose cells are already rendered to
//! text, which is all the CSV endpoints need.

use std::future::Future;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

pub use crate::error::DbError;

mod credentials;
mod identity;
mod postgres;

pub use credentials::{Credentials, DbTarget, MANAGED_IDENTITY_USER};
pub use identity::{TokenSource, DATABASE_AUDIENCE};
pub use postgres::PgConnector;

// ---

/// A positional query parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlParam {
    Text(String),
    Timestamp(DateTime<Utc>),
}

/// A SQL statement with its positional (`$n`) parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct SqlQuery {
    pub sql: String,
    pub params: Vec<SqlParam>,
}

impl SqlQuery {
    pub fn new(sql: impl Into<String>) -> Self {
        SqlQuery {
            sql: sql.into(),
            params: Vec::new(),
        }
    }

    pub fn bind_text(mut self, value: impl Into<String>) -> Self {
        self.params.push(SqlParam::Text(value.into()));
        self
    }

    pub fn bind_timestamp(mut self, value: DateTime<Utc>) -> Self {
        self.params.push(SqlParam::Timestamp(value));
        self
    }
}

/// A fully rendered result set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Table {
    /// Column names in query order.
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// First cell of the first row, if any.
    pub fn first_value(&self) -> Option<&str> {
        self.rows
            .first()
            .and_then(|row| row.first())
            .map(String::as_str)
    }
}

/// Opens database sessions.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn acquire(&self) -> Result<Box<dyn Session>, DbError>;
}

/// One open database connection.
#[async_trait]
pub trait Session: Send {
    async fn fetch_table(&mut self, query: &SqlQuery) -> Result<Table, DbError>;

    /// Close the connection. Dropping a session without calling this still
    /// closes the socket, just without the protocol-level goodbye.
    async fn release(self: Box<Self>) -> Result<(), DbError>;
}

/// Acquire a session, run `body` with it and release it on every exit path.
///
/// A failed release is logged and does not override the body's result.
pub async fn with_session<T, E, F>(connector: &dyn Connector, body: F) -> Result<T, E>
where
    E: From<DbError>,
    F: for<'s> FnOnce(&'s mut dyn Session) -> BoxFuture<'s, Result<T, E>>,
{
    // ---
    let mut session = connector.acquire().await?;
    let result = body(session.as_mut()).await;

    if let Err(e) = session.release().await {
        tracing::warn!("Failed to release database connection: {}", e);
    }
    result
}

/// Boxed future borrowed from a session, as returned by [`with_session`] bodies.
pub type BoxFuture<'a, T> = std::pin::Pin<Box<dyn Future<Output = T> + Send + 'a>>;
