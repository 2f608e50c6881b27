//! Result and connection types shared by every backend.
//!
//! Each driver normalizes its output into a [`TabularResult`]; each adapter takes a
//! [`Connection`] describing where and as whom to run.

use crate::error::{ConnectorError, Result};
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use std::fmt;

/// A single cell. `None` is a SQL NULL.
pub type Cell = Option<String>;

/// A row of cells, one per column.
pub type Row = Vec<Cell>;

/// Normalized result of a query: ordered column names plus rectangular rows.
///
/// Serialize-only. Values are built through [`TabularResult::new`], which keeps rows rectangular.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TabularResult {
    columns: Vec<String>,
    rows: Vec<Row>,
}

impl TabularResult {
    /// Creates a result, rejecting rows whose length differs from the column count.
    pub fn new(columns: Vec<String>, rows: Vec<Row>) -> Result<Self> {
        if let Some((index, row)) = rows
            .iter()
            .enumerate()
            .find(|(_, row)| row.len() != columns.len())
        {
            return Err(ConnectorError::decode(
                format!(
                    "row {} has {} cells, expected {}",
                    index + 1,
                    row.len(),
                    columns.len()
                ),
                None,
            ));
        }
        Ok(Self { columns, rows })
    }

    /// Creates an empty result with no columns and no rows.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Column names in result order. Not necessarily unique.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Data rows in result order.
    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    /// Returns the number of data rows.
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Returns true if there are no data rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Returns the index of the first column named exactly `name`.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Returns the non-null values of the first column named exactly `name`.
    ///
    /// `None` when no such column exists.
    pub fn column_values(&self, name: &str) -> Option<Vec<String>> {
        let index = self.column_index(name)?;
        Some(
            self.rows
                .iter()
                .filter_map(|row| row[index].clone())
                .collect(),
        )
    }

    /// Serializes the result as delimited text without quoting, header first.
    ///
    /// NULL cells are written as empty fields.
    pub fn to_delimited(&self, delimiter: u8) -> Result<String> {
        let mut writer = csv::WriterBuilder::new()
            .delimiter(delimiter)
            .quote_style(csv::QuoteStyle::Never)
            .from_writer(Vec::new());

        if !self.columns.is_empty() {
            writer
                .write_record(&self.columns)
                .map_err(|e| ConnectorError::internal(format!("Failed to write header: {e}")))?;
        }
        for row in &self.rows {
            writer
                .write_record(row.iter().map(|cell| cell.as_deref().unwrap_or("")))
                .map_err(|e| ConnectorError::internal(format!("Failed to write row: {e}")))?;
        }

        let bytes = writer
            .into_inner()
            .map_err(|e| ConnectorError::internal(format!("Failed to flush rows: {e}")))?;
        String::from_utf8(bytes).map_err(|e| {
            ConnectorError::decode(
                "delimited output is not valid UTF-8",
                Some(e.utf8_error().valid_up_to() as u64),
            )
        })
    }
}

/// Credentials and endpoint for one logical session.
///
/// Immutable once built. The secret is only exposed through [`Connection::secret`]
/// and is redacted from `Debug` output.
#[derive(Debug)]
pub struct Connection {
    endpoint: String,
    principal: String,
    secret: SecretString,
    region: Option<String>,
    tls: bool,
}

impl Connection {
    /// Creates a connection with TLS enabled and no region.
    pub fn new(
        endpoint: impl Into<String>,
        principal: impl Into<String>,
        secret: impl Into<String>,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            principal: principal.into(),
            secret: SecretString::from(secret.into()),
            region: None,
            tls: true,
        }
    }

    /// Sets the region or zone.
    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    /// Enables or disables TLS.
    pub fn with_tls(mut self, tls: bool) -> Self {
        self.tls = tls;
        self
    }

    /// Endpoint URL or host. May be empty when the region determines the endpoint.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// User name or access key.
    pub fn principal(&self) -> &str {
        &self.principal
    }

    /// Password or secret key.
    pub fn secret(&self) -> &SecretString {
        &self.secret
    }

    pub fn region(&self) -> Option<&str> {
        self.region.as_deref()
    }

    pub fn tls(&self) -> bool {
        self.tls
    }

    /// Scrubs this connection's secret from backend-provided text.
    pub fn redact(&self, text: &str) -> String {
        crate::error::redact_secret(text, self.secret.expose_secret())
    }

    /// Returns a display-safe description (no secret) for diagnostics.
    pub fn display_string(&self) -> String {
        let endpoint = if self.endpoint.is_empty() {
            "<default endpoint>"
        } else {
            &self.endpoint
        };
        let mut out = format!("{} @ {}", self.principal, endpoint);
        if let Some(region) = &self.region {
            out.push_str(&format!(" ({region})"));
        }
        if !self.tls {
            out.push_str(" [no tls]");
        }
        out
    }
}

impl fmt::Display for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display_string())
    }
}
