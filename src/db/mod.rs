//! Datastore abstraction layer.
//!
//! Provides a trait-based interface over structurally different backends, so a
//! subprocess-driven shell client and a poll-based remote API can be used
//! interchangeably.

mod decode;
mod types;

pub use decode::{decode, decode_with_delimiter, DEFAULT_DELIMITER};
pub use types::{Cell, Connection, Row, TabularResult};

use crate::config::{Config, ConnectionConfig};
use crate::error::Result;
use crate::polling::PollingDatastore;
use crate::shell::ShellDatastore;
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

/// Supported datastore backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatastoreBackend {
    /// Hive through the `beeline` shell client.
    #[default]
    Hive,
    /// Athena through its query execution API.
    Athena,
}

impl DatastoreBackend {
    /// Returns the backend as a string for configuration and display.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hive => "hive",
            Self::Athena => "athena",
        }
    }

    /// Parses a backend from a string.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "hive" | "beeline" => Some(Self::Hive),
            "athena" => Some(Self::Athena),
            _ => None,
        }
    }
}

/// Creates the datastore adapter for a configured connection.
///
/// This is the central factory function for adapters.
pub fn open(config: &Config, connection: &ConnectionConfig) -> Result<Box<dyn Datastore>> {
    match connection.backend {
        DatastoreBackend::Hive => Ok(Box::new(ShellDatastore::new(config.shell.clone()))),
        DatastoreBackend::Athena => Ok(Box::new(PollingDatastore::new(
            connection.polling_options(&config.polling),
        ))),
    }
}

/// Trait defining the uniform datastore contract.
///
/// Implementations hold only immutable configuration; every call is an independent
/// unit of work and calls may run concurrently.
#[async_trait]
pub trait Datastore: Send + Sync {
    /// The backend family this adapter talks to.
    fn backend(&self) -> DatastoreBackend;

    /// Performs a trivial round trip to validate that the credentials reach the backend.
    async fn connect(&self, connection: &Connection) -> Result<()>;

    /// Runs a query to completion and returns its decoded result.
    async fn query(&self, sql: &str, connection: &Connection) -> Result<TabularResult> {
        self.query_cancellable(sql, connection, CancellationToken::new())
            .await
    }

    /// Runs a query that stops with `Cancelled` as soon as `cancel` fires.
    async fn query_cancellable(
        &self,
        sql: &str,
        connection: &Connection,
        cancel: CancellationToken,
    ) -> Result<TabularResult>;

    /// Lists table names, sorted ascending. Empty if the listing has no name column.
    async fn list_tables(&self, connection: &Connection) -> Result<Vec<String>>;
}

/// Returns the non-null values of `column`, sorted ascending, or an empty list when
/// the result has no column with that exact name.
pub fn sorted_column_values(result: &TabularResult, column: &str) -> Vec<String> {
    let mut values = result.column_values(column).unwrap_or_default();
    values.sort();
    values
}
