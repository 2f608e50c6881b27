//! Hive datastore adapter over the `beeline` shell client.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::channel::{ShellChannel, ShellSettings};
use crate::db::{
    decode, sorted_column_values, Connection, Datastore, DatastoreBackend, TabularResult,
};
use crate::error::Result;

/// Query that lists tables in the current database.
pub const LIST_TABLES_QUERY: &str = "show tables;";

/// Column holding table names in the listing result.
pub const TABLE_NAME_COLUMN: &str = "tableName";

/// Datastore backed by one shell client process per query.
#[derive(Debug, Clone)]
pub struct ShellDatastore {
    channel: ShellChannel,
}

impl ShellDatastore {
    pub fn new(settings: ShellSettings) -> Self {
        Self {
            channel: ShellChannel::new(settings),
        }
    }

    /// Runs the query and returns the framed (banner-free) output text.
    async fn framed_output(
        &self,
        sql: &str,
        connection: &Connection,
        cancel: &CancellationToken,
    ) -> Result<String> {
        let raw = self.channel.execute(sql, connection, cancel).await?;
        let framed = self.channel.settings().framing().frame(&raw);
        debug!(
            raw_bytes = raw.len(),
            framed_bytes = framed.len(),
            "Framed shell client output"
        );
        Ok(framed)
    }
}

impl Default for ShellDatastore {
    fn default() -> Self {
        Self::new(ShellSettings::default())
    }
}

#[async_trait]
impl Datastore for ShellDatastore {
    fn backend(&self) -> DatastoreBackend {
        DatastoreBackend::Hive
    }

    async fn connect(&self, connection: &Connection) -> Result<()> {
        info!(
            "Attempting to authenticate with connection {} (secret omitted)",
            connection.display_string()
        );
        // An empty script body: connect, then quit immediately.
        self.channel
            .execute("", connection, &CancellationToken::new())
            .await?;
        Ok(())
    }

    async fn query_cancellable(
        &self,
        sql: &str,
        connection: &Connection,
        cancel: CancellationToken,
    ) -> Result<TabularResult> {
        let framed = self.framed_output(sql, connection, &cancel).await?;
        decode(&framed)
    }

    async fn list_tables(&self, connection: &Connection) -> Result<Vec<String>> {
        let result = self.query(LIST_TABLES_QUERY, connection).await?;
        Ok(sorted_column_values(&result, TABLE_NAME_COLUMN))
    }
}
