//! Athena query execution API client.
//!
//! Speaks the Athena JSON 1.1 protocol: every operation is a `POST /` with an
//! `X-Amz-Target` header naming the operation and a PascalCase JSON body.
//! Request signing is left to whatever sits in front of the endpoint; this client
//! authenticates with HTTP basic auth.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;
use url::Url;

use super::api::{
    ApiFactory, ExecutionApi, ExecutionHandle, ExecutionState, ExecutionStatus, SubmitRequest,
};
use crate::db::{Connection, Row, TabularResult};
use crate::error::{ConnectorError, Result};

/// Default timeout for a single API request.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

const TARGET_PREFIX: &str = "AmazonAthena";
const CONTENT_TYPE: &str = "application/x-amz-json-1.1";

/// Maximum rows per results page.
const PAGE_SIZE: u32 = 1000;

/// Resolves the API endpoint for a connection.
///
/// An explicit endpoint wins; otherwise the regional endpoint is used, over
/// `http` when TLS is disabled.
pub fn resolve_endpoint(connection: &Connection) -> Result<Url> {
    let raw = if !connection.endpoint().is_empty() {
        connection.endpoint().to_string()
    } else {
        let region = connection.region().ok_or_else(|| {
            ConnectorError::config("Athena connection needs an endpoint or a region")
        })?;
        let scheme = if connection.tls() { "https" } else { "http" };
        format!("{scheme}://athena.{region}.amazonaws.com/")
    };

    Url::parse(&raw).map_err(|e| ConnectorError::config(format!("Invalid endpoint '{raw}': {e}")))
}

/// HTTP client for one query's worth of API calls.
#[derive(Debug)]
pub struct HttpExecutionApi {
    client: Client,
    endpoint: Url,
    principal: String,
    secret: SecretString,
}

impl HttpExecutionApi {
    /// Creates a client for the given connection.
    pub fn new(connection: &Connection, request_timeout: Duration) -> Result<Self> {
        let endpoint = resolve_endpoint(connection)?;
        let client = Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| ConnectorError::internal(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint,
            principal: connection.principal().to_string(),
            secret: SecretString::from(connection.secret().expose_secret().to_string()),
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Sends one operation and decodes its response body.
    ///
    /// Errors are plain messages; callers pick the error variant for the operation.
    async fn call<Req, Resp>(
        &self,
        operation: &str,
        body: &Req,
    ) -> std::result::Result<Resp, String>
    where
        Req: Serialize + Sync,
        Resp: DeserializeOwned,
    {
        debug!(operation, endpoint = %self.endpoint, "Calling execution API");

        let response = self
            .client
            .post(self.endpoint.clone())
            .header("X-Amz-Target", format!("{TARGET_PREFIX}.{operation}"))
            .header(reqwest::header::CONTENT_TYPE, CONTENT_TYPE)
            .basic_auth(&self.principal, Some(self.secret.expose_secret()))
            .json(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    format!("{operation} timed out")
                } else if e.is_connect() {
                    format!("Failed to connect to {}", self.endpoint)
                } else {
                    format!("{operation} request failed: {e}")
                }
            })?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| format!("Failed to read {operation} response: {e}"))?;
        let text = self.redact(&text);

        if !status.is_success() {
            return Err(self.describe_failure(operation, status, &text));
        }

        serde_json::from_str(&text)
            .map_err(|e| format!("Failed to parse {operation} response: {e}"))
    }

    fn describe_failure(&self, operation: &str, status: StatusCode, body: &str) -> String {
        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => format!(
                "{operation} rejected credentials for principal '{}' ({status})",
                self.principal
            ),
            _ => match serde_json::from_str::<ApiErrorBody>(body) {
                Ok(err) => format!("{operation} failed ({status}): {}", err.describe()),
                Err(_) => format!("{operation} failed ({status}): {}", body.trim()),
            },
        }
    }

    fn redact(&self, text: &str) -> String {
        crate::error::redact_secret(text, self.secret.expose_secret())
    }
}

#[async_trait]
impl ExecutionApi for HttpExecutionApi {
    async fn submit(&self, request: &SubmitRequest) -> Result<ExecutionHandle> {
        let body = StartQueryExecutionInput::from(request);
        let output: StartQueryExecutionOutput = self
            .call("StartQueryExecution", &body)
            .await
            .map_err(ConnectorError::submission)?;
        Ok(ExecutionHandle::new(output.query_execution_id))
    }

    async fn status(&self, handle: &ExecutionHandle) -> Result<ExecutionStatus> {
        let body = QueryExecutionIdInput::new(handle);
        let output: GetQueryExecutionOutput = self
            .call("GetQueryExecution", &body)
            .await
            .map_err(ConnectorError::backend_unavailable)?;

        let status = output
            .query_execution
            .and_then(|q| q.status)
            .unwrap_or_default();
        let state = ExecutionState::from_api(status.state.as_deref().unwrap_or_default());

        Ok(ExecutionStatus {
            state,
            reason: status.state_change_reason,
        })
    }

    async fn results(&self, handle: &ExecutionHandle) -> Result<TabularResult> {
        let mut assembler = ResultAssembler::default();
        let mut next_token = None;

        loop {
            let body = GetQueryResultsInput {
                query_execution_id: handle.as_str().to_string(),
                next_token: next_token.take(),
                max_results: PAGE_SIZE,
            };
            let page: GetQueryResultsOutput = self
                .call("GetQueryResults", &body)
                .await
                .map_err(ConnectorError::backend_unavailable)?;

            next_token = page.next_token.clone();
            assembler.push_page(page);

            if next_token.is_none() {
                break;
            }
        }

        assembler.finish()
    }

    async fn stop(&self, handle: &ExecutionHandle) -> Result<()> {
        let body = QueryExecutionIdInput::new(handle);
        let _: serde_json::Value = self
            .call("StopQueryExecution", &body)
            .await
            .map_err(ConnectorError::backend_unavailable)?;
        Ok(())
    }
}

/// Builds an [`HttpExecutionApi`] per query.
#[derive(Debug, Clone)]
pub struct HttpApiFactory {
    request_timeout: Duration,
}

impl HttpApiFactory {
    pub fn new(request_timeout: Duration) -> Self {
        Self { request_timeout }
    }
}

impl Default for HttpApiFactory {
    fn default() -> Self {
        Self::new(Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS))
    }
}

impl ApiFactory for HttpApiFactory {
    type Api = HttpExecutionApi;

    fn create(&self, connection: &Connection) -> Result<Self::Api> {
        HttpExecutionApi::new(connection, self.request_timeout)
    }
}

/// Accumulates result pages into one [`TabularResult`].
///
/// Column names come from the result metadata when present. The first row of the
/// first page repeats the column names for `SELECT` queries and is dropped; without
/// metadata the first row is the header.
#[derive(Debug, Default)]
pub(crate) struct ResultAssembler {
    columns: Option<Vec<String>>,
    rows: Vec<Row>,
    seen_page: bool,
}

impl ResultAssembler {
    pub(crate) fn push_page(&mut self, page: GetQueryResultsOutput) {
        let first_page = !self.seen_page;
        self.seen_page = true;

        let Some(result_set) = page.result_set else {
            return;
        };

        if first_page {
            self.columns = result_set
                .result_set_metadata
                .and_then(|m| m.column_info)
                .map(|info| info.into_iter().map(|c| c.name).collect());
        }

        let mut rows = result_set
            .rows
            .unwrap_or_default()
            .into_iter()
            .map(ResultRow::into_cells)
            .peekable();

        if first_page {
            match self.columns.as_deref() {
                Some(columns) => {
                    if rows.peek().is_some_and(|first| echoes_header(first, columns)) {
                        rows.next();
                    }
                }
                None => {
                    self.columns = rows
                        .next()
                        .map(|header| header.into_iter().map(Option::unwrap_or_default).collect());
                }
            }
        }

        self.rows.extend(rows);
    }

    pub(crate) fn finish(self) -> Result<TabularResult> {
        match self.columns {
            Some(columns) => TabularResult::new(columns, self.rows),
            None if self.rows.is_empty() => Ok(TabularResult::empty()),
            None => Err(ConnectorError::decode("result rows without column names", None)),
        }
    }
}

fn echoes_header(row: &Row, columns: &[String]) -> bool {
    row.len() == columns.len()
        && row
            .iter()
            .zip(columns)
            .all(|(cell, name)| cell.as_deref() == Some(name.as_str()))
}

// --- Wire types ---

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct StartQueryExecutionInput {
    query_string: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    query_execution_context: Option<QueryExecutionContext>,
    #[serde(skip_serializing_if = "Option::is_none")]
    result_configuration: Option<ResultConfiguration>,
    #[serde(skip_serializing_if = "Option::is_none")]
    work_group: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct QueryExecutionContext {
    database: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct ResultConfiguration {
    output_location: String,
    encryption_configuration: EncryptionConfiguration,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct EncryptionConfiguration {
    encryption_option: String,
}

impl From<&SubmitRequest> for StartQueryExecutionInput {
    fn from(request: &SubmitRequest) -> Self {
        Self {
            query_string: request.query.clone(),
            query_execution_context: request
                .database
                .clone()
                .map(|database| QueryExecutionContext { database }),
            result_configuration: request.output_location.clone().map(|output_location| {
                ResultConfiguration {
                    output_location,
                    encryption_configuration: EncryptionConfiguration {
                        encryption_option: "SSE_S3".to_string(),
                    },
                }
            }),
            work_group: request.workgroup.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct StartQueryExecutionOutput {
    query_execution_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct QueryExecutionIdInput {
    query_execution_id: String,
}

impl QueryExecutionIdInput {
    fn new(handle: &ExecutionHandle) -> Self {
        Self {
            query_execution_id: handle.as_str().to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct GetQueryExecutionOutput {
    query_execution: Option<QueryExecution>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct QueryExecution {
    status: Option<QueryExecutionStatus>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct QueryExecutionStatus {
    state: Option<String>,
    state_change_reason: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct GetQueryResultsInput {
    query_execution_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    next_token: Option<String>,
    max_results: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct GetQueryResultsOutput {
    result_set: Option<ResultSet>,
    next_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ResultSet {
    rows: Option<Vec<ResultRow>>,
    result_set_metadata: Option<ResultSetMetadata>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ResultSetMetadata {
    column_info: Option<Vec<ColumnInfo>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ColumnInfo {
    name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ResultRow {
    data: Option<Vec<Datum>>,
}

impl ResultRow {
    fn into_cells(self) -> Row {
        self.data
            .unwrap_or_default()
            .into_iter()
            .map(|d| d.var_char_value)
            .collect()
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Datum {
    var_char_value: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    #[serde(rename = "__type")]
    kind: Option<String>,
    #[serde(alias = "Message")]
    message: Option<String>,
}

impl ApiErrorBody {
    fn describe(&self) -> String {
        // `__type` may carry a namespace prefix: "com.amazonaws...#InvalidRequestException".
        let kind = self
            .kind
            .as_deref()
            .map(|k| k.rsplit('#').next().unwrap_or(k));
        match (kind, self.message.as_deref()) {
            (Some(kind), Some(message)) => format!("{kind}: {message}"),
            (Some(kind), None) => kind.to_string(),
            (None, Some(message)) => message.to_string(),
            (None, None) => "unknown error".to_string(),
        }
    }
}
