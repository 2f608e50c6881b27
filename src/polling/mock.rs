//! Scripted execution API for testing.
//!
//! Plays back a fixed sequence of statuses and counts every call, so poll-loop
//! behavior can be checked without a network.

use async_trait::async_trait;
use std::sync::{Arc, Mutex, MutexGuard};

use super::api::{
    ApiFactory, ExecutionApi, ExecutionHandle, ExecutionState, ExecutionStatus, SubmitRequest,
};
use crate::db::{Connection, TabularResult};
use crate::error::{ConnectorError, Result};

#[derive(Debug, Default)]
struct Script {
    statuses: Vec<ExecutionStatus>,
    result: TabularResult,
    submit_error: Option<String>,
    stop_error: Option<String>,
    submitted: Vec<SubmitRequest>,
    polls: usize,
    fetches: usize,
    stops: usize,
}

/// An in-memory [`ExecutionApi`] that returns scripted statuses.
///
/// Clones share the same script and counters. Once the script is exhausted the
/// last status repeats; an empty script reports `RUNNING`.
#[derive(Debug, Clone, Default)]
pub struct ScriptedExecutionApi {
    script: Arc<Mutex<Script>>,
}

impl ScriptedExecutionApi {
    /// Creates an API that reports `states` in order, one per poll.
    pub fn new(states: Vec<ExecutionState>) -> Self {
        let script = Script {
            statuses: states.into_iter().map(ExecutionStatus::new).collect(),
            ..Default::default()
        };
        Self {
            script: Arc::new(Mutex::new(script)),
        }
    }

    /// Appends a status to the script.
    pub fn then(self, status: impl Into<ExecutionStatus>) -> Self {
        self.lock().statuses.push(status.into());
        self
    }

    /// Sets the result returned by `results`.
    pub fn with_result(self, result: TabularResult) -> Self {
        self.lock().result = result;
        self
    }

    /// Makes `submit` fail with the given message.
    pub fn failing_submit(self, message: impl Into<String>) -> Self {
        self.lock().submit_error = Some(message.into());
        self
    }

    /// Makes `stop` fail with the given message.
    pub fn failing_stop(self, message: impl Into<String>) -> Self {
        self.lock().stop_error = Some(message.into());
        self
    }

    pub fn submit_count(&self) -> usize {
        self.lock().submitted.len()
    }

    /// Requests received by `submit`, in order.
    pub fn submitted(&self) -> Vec<SubmitRequest> {
        self.lock().submitted.clone()
    }

    pub fn poll_count(&self) -> usize {
        self.lock().polls
    }

    pub fn fetch_count(&self) -> usize {
        self.lock().fetches
    }

    pub fn stop_count(&self) -> usize {
        self.lock().stops
    }

    fn lock(&self) -> MutexGuard<'_, Script> {
        // A poisoned lock only means another test thread panicked mid-call.
        self.script.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl ExecutionApi for ScriptedExecutionApi {
    async fn submit(&self, request: &SubmitRequest) -> Result<ExecutionHandle> {
        let mut script = self.lock();
        script.submitted.push(request.clone());
        match &script.submit_error {
            Some(message) => Err(ConnectorError::submission(message.clone())),
            None => Ok(ExecutionHandle::new(format!(
                "scripted-{}",
                script.submitted.len()
            ))),
        }
    }

    async fn status(&self, _handle: &ExecutionHandle) -> Result<ExecutionStatus> {
        let mut script = self.lock();
        let index = script.polls;
        script.polls += 1;
        let status = script
            .statuses
            .get(index)
            .or_else(|| script.statuses.last())
            .cloned()
            .unwrap_or_else(|| ExecutionStatus::new(ExecutionState::Running));
        Ok(status)
    }

    async fn results(&self, _handle: &ExecutionHandle) -> Result<TabularResult> {
        let mut script = self.lock();
        script.fetches += 1;
        Ok(script.result.clone())
    }

    async fn stop(&self, _handle: &ExecutionHandle) -> Result<()> {
        let mut script = self.lock();
        script.stops += 1;
        match &script.stop_error {
            Some(message) => Err(ConnectorError::backend_unavailable(message.clone())),
            None => Ok(()),
        }
    }
}

/// Hands out clones of one [`ScriptedExecutionApi`] for every query.
#[derive(Debug, Clone, Default)]
pub struct ScriptedApiFactory {
    api: ScriptedExecutionApi,
}

impl ScriptedApiFactory {
    pub fn new(api: ScriptedExecutionApi) -> Self {
        Self { api }
    }
}

impl ApiFactory for ScriptedApiFactory {
    type Api = ScriptedExecutionApi;

    fn create(&self, _connection: &Connection) -> Result<Self::Api> {
        Ok(self.api.clone())
    }
}
