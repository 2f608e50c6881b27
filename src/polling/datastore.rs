//! Athena datastore adapter over the polling executor.

use async_trait::async_trait;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::api::{ApiFactory, SubmitRequest};
use super::executor::{PollPolicy, PollingExecutor};
use super::http::{HttpApiFactory, DEFAULT_REQUEST_TIMEOUT_SECS};
use crate::db::{sorted_column_values, Connection, Datastore, DatastoreBackend, TabularResult};
use crate::error::Result;

/// Query that lists tables in the current database.
pub const LIST_TABLES_QUERY: &str = "SHOW TABLES";

/// Column holding table names in the listing result.
pub const TABLE_NAME_COLUMN: &str = "tab_name";

/// Cheapest query that proves the credentials reach the backend.
pub const PROBE_QUERY: &str = "SELECT 1";

/// Per-connection settings for polling queries.
#[derive(Debug, Clone, PartialEq)]
pub struct PollingOptions {
    pub database: Option<String>,
    pub output_location: Option<String>,
    pub workgroup: Option<String>,
    /// Total budget the poll interval is derived from. `None` polls at the floor.
    pub query_timeout: Option<Duration>,
    pub policy: PollPolicy,
    /// Timeout for each individual API request.
    pub request_timeout: Duration,
}

impl Default for PollingOptions {
    fn default() -> Self {
        Self {
            database: None,
            output_location: None,
            workgroup: None,
            query_timeout: None,
            policy: PollPolicy::default(),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
        }
    }
}

impl PollingOptions {
    fn submit_request(&self, sql: &str) -> SubmitRequest {
        SubmitRequest {
            query: sql.to_string(),
            database: self.database.clone(),
            output_location: self.output_location.clone(),
            workgroup: self.workgroup.clone(),
        }
    }
}

/// Datastore that submits each query to a remote API and polls for completion.
///
/// A fresh API client is built per query from the connection, so concurrent queries
/// share nothing but configuration.
#[derive(Debug, Clone)]
pub struct PollingDatastore<F = HttpApiFactory> {
    options: PollingOptions,
    factory: F,
}

impl PollingDatastore<HttpApiFactory> {
    pub fn new(options: PollingOptions) -> Self {
        let factory = HttpApiFactory::new(options.request_timeout);
        Self { options, factory }
    }
}

impl<F: ApiFactory> PollingDatastore<F> {
    /// Uses a custom API factory, e.g. a scripted one in tests.
    pub fn with_factory(options: PollingOptions, factory: F) -> Self {
        Self { options, factory }
    }

    pub fn options(&self) -> &PollingOptions {
        &self.options
    }
}

#[async_trait]
impl<F: ApiFactory> Datastore for PollingDatastore<F> {
    fn backend(&self) -> DatastoreBackend {
        DatastoreBackend::Athena
    }

    async fn connect(&self, connection: &Connection) -> Result<()> {
        info!(
            "Attempting to authenticate with connection {} (secret omitted)",
            connection.display_string()
        );
        self.query(PROBE_QUERY, connection).await?;
        Ok(())
    }

    async fn query_cancellable(
        &self,
        sql: &str,
        connection: &Connection,
        cancel: CancellationToken,
    ) -> Result<TabularResult> {
        let api = self.factory.create(connection)?;
        let executor = PollingExecutor::new(api, self.options.policy);
        let result = executor
            .execute(
                &self.options.submit_request(sql),
                self.options.query_timeout,
                &cancel,
            )
            .await?;
        debug!(rows = result.row_count(), "Query completed");
        Ok(result)
    }

    async fn list_tables(&self, connection: &Connection) -> Result<Vec<String>> {
        let result = self.query(LIST_TABLES_QUERY, connection).await?;
        Ok(sorted_column_values(&result, TABLE_NAME_COLUMN))
    }
}
