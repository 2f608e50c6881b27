//! Remote query execution API contract.
//!
//! Four single request/response operations: submit, status, results, stop.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::db::{Connection, TabularResult};
use crate::error::Result;

/// Opaque identifier of one remote query execution.
///
/// Only meaningful for the lifetime of the query that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExecutionHandle(String);

impl ExecutionHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ExecutionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Canonical execution states reported by the remote API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionState {
    Queued,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

/// What a caller needs to know about an execution state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Pending,
    Succeeded,
    Failed,
}

impl ExecutionState {
    /// Maps an API status string onto a canonical state.
    ///
    /// Unrecognized statuses are treated as `Failed`.
    pub fn from_api(status: &str) -> Self {
        match status.to_uppercase().as_str() {
            "QUEUED" => Self::Queued,
            "RUNNING" => Self::Running,
            "SUCCEEDED" => Self::Succeeded,
            "FAILED" => Self::Failed,
            "CANCELLED" | "CANCELED" => Self::Cancelled,
            _ => Self::Failed,
        }
    }

    /// Collapses the state into the caller-facing outcome.
    pub fn outcome(&self) -> Outcome {
        match self {
            Self::Queued | Self::Running => Outcome::Pending,
            Self::Succeeded => Outcome::Succeeded,
            Self::Failed | Self::Cancelled => Outcome::Failed,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "QUEUED",
            Self::Running => "RUNNING",
            Self::Succeeded => "SUCCEEDED",
            Self::Failed => "FAILED",
            Self::Cancelled => "CANCELLED",
        }
    }
}

impl fmt::Display for ExecutionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One status observation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionStatus {
    pub state: ExecutionState,
    /// Backend-provided explanation, usually only set for failures.
    pub reason: Option<String>,
}

impl ExecutionStatus {
    pub fn new(state: ExecutionState) -> Self {
        Self {
            state,
            reason: None,
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }
}

impl From<ExecutionState> for ExecutionStatus {
    fn from(state: ExecutionState) -> Self {
        Self::new(state)
    }
}

/// Everything the remote API needs to start a query.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubmitRequest {
    /// Query text, forwarded verbatim.
    pub query: String,
    /// Database the query runs against.
    pub database: Option<String>,
    /// Where the backend writes result files.
    pub output_location: Option<String>,
    /// Workgroup to run in.
    pub workgroup: Option<String>,
}

impl SubmitRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Default::default()
        }
    }
}

/// Client for the remote query execution API.
#[async_trait]
pub trait ExecutionApi: Send + Sync {
    /// Starts a query. Errors are `Submission` errors.
    async fn submit(&self, request: &SubmitRequest) -> Result<ExecutionHandle>;

    /// Reads the current state of an execution.
    async fn status(&self, handle: &ExecutionHandle) -> Result<ExecutionStatus>;

    /// Fetches the complete result set of a succeeded execution.
    ///
    /// An absent or empty payload yields an empty result.
    async fn results(&self, handle: &ExecutionHandle) -> Result<TabularResult>;

    /// Asks the backend to stop an execution.
    async fn stop(&self, handle: &ExecutionHandle) -> Result<()>;
}

/// Builds a fresh API client for each query.
pub trait ApiFactory: Send + Sync {
    type Api: ExecutionApi;

    fn create(&self, connection: &Connection) -> Result<Self::Api>;
}
