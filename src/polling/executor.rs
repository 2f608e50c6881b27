//! Polling query executor.
//!
//! Drives one query through submit, a bounded fixed-interval poll loop, and fetch.
//! The poll interval is derived from the caller's time budget; the number of polls
//! is bounded by the retry count regardless of budget.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::api::{ExecutionApi, ExecutionHandle, ExecutionStatus, Outcome, SubmitRequest};
use crate::db::TabularResult;
use crate::error::{ConnectorError, Result};

/// Default number of retries after the first poll.
pub const DEFAULT_RETRY_COUNT: u32 = 5;

/// Default minimum wait between polls, in milliseconds.
pub const DEFAULT_FLOOR_INTERVAL_MS: u64 = 1000;

/// Retry and interval policy for the poll loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollPolicy {
    /// Retries after the first poll; at most `retry_count + 1` polls are made.
    pub retry_count: u32,
    /// Minimum wait between polls, in milliseconds.
    pub floor_interval_ms: u64,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            retry_count: DEFAULT_RETRY_COUNT,
            floor_interval_ms: DEFAULT_FLOOR_INTERVAL_MS,
        }
    }
}

impl PollPolicy {
    pub fn new(retry_count: u32, floor: Duration) -> Self {
        Self {
            retry_count,
            floor_interval_ms: floor.as_millis() as u64,
        }
    }

    pub fn floor(&self) -> Duration {
        Duration::from_millis(self.floor_interval_ms)
    }

    /// Maximum number of status polls for one query.
    pub fn max_polls(&self) -> u32 {
        self.retry_count.saturating_add(1)
    }

    /// Wait between polls: `max(timeout / retry_count, floor)`, or `floor` when no
    /// usable budget is given.
    pub fn interval(&self, timeout: Option<Duration>) -> Duration {
        match timeout {
            Some(budget) if !budget.is_zero() && self.retry_count > 0 => {
                (budget / self.retry_count).max(self.floor())
            }
            _ => self.floor(),
        }
    }
}

/// Runs queries against an [`ExecutionApi`] with a bounded poll loop.
pub struct PollingExecutor<A> {
    api: A,
    policy: PollPolicy,
}

impl<A: ExecutionApi> PollingExecutor<A> {
    pub fn new(api: A, policy: PollPolicy) -> Self {
        Self { api, policy }
    }

    pub fn policy(&self) -> &PollPolicy {
        &self.policy
    }

    /// Submits, waits for a terminal state, and fetches the result.
    ///
    /// `timeout` is the total budget the poll interval is derived from. When the
    /// budget is exhausted or `cancel` fires, a best-effort remote stop is issued
    /// before returning `Timeout` or `Cancelled`.
    pub async fn execute(
        &self,
        request: &SubmitRequest,
        timeout: Option<Duration>,
        cancel: &CancellationToken,
    ) -> Result<TabularResult> {
        let handle = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ConnectorError::Cancelled),
            handle = self.api.submit(request) => handle?,
        };
        debug!(handle = %handle, "Query submitted");

        if let Err(e) = self.await_completion(&handle, timeout, cancel).await {
            if e.is_interrupted() {
                self.cancel(&handle).await;
            }
            return Err(e);
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(ConnectorError::Cancelled),
            result = self.api.results(&handle) => result,
        }
    }

    /// Polls until the execution succeeds, fails, or the poll budget runs out.
    async fn await_completion(
        &self,
        handle: &ExecutionHandle,
        timeout: Option<Duration>,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let interval = self.policy.interval(timeout);
        let max_polls = self.policy.max_polls();

        for attempt in 1..=max_polls {
            let status = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(ConnectorError::Cancelled),
                status = self.api.status(handle) => status?,
            };
            debug!(handle = %handle, attempt, state = %status.state, "Polled execution status");

            match status.state.outcome() {
                Outcome::Succeeded => return Ok(()),
                Outcome::Failed => return Err(execution_error(handle, &status)),
                Outcome::Pending if attempt == max_polls => break,
                Outcome::Pending => {}
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(ConnectorError::Cancelled),
                _ = tokio::time::sleep(interval) => {}
            }
        }

        Err(ConnectorError::timeout(format!(
            "query {handle} still pending after {max_polls} polls at {} ms intervals",
            interval.as_millis()
        )))
    }

    /// Best-effort remote stop. Failures are logged, never returned.
    pub async fn cancel(&self, handle: &ExecutionHandle) {
        match self.api.stop(handle).await {
            Ok(()) => debug!(handle = %handle, "Stopped execution"),
            Err(e) => warn!(handle = %handle, "Failed to stop execution: {}", e),
        }
    }
}

fn execution_error(handle: &ExecutionHandle, status: &ExecutionStatus) -> ConnectorError {
    match &status.reason {
        Some(reason) => ConnectorError::execution(format!(
            "query {handle} ended in state {}: {reason}",
            status.state
        )),
        None => ConnectorError::execution(format!(
            "query {handle} ended in state {}",
            status.state
        )),
    }
}
