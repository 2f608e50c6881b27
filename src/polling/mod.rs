//! Remote API backend: submit a query, poll its status, fetch the result.

pub mod api;
pub mod datastore;
pub mod executor;
pub mod http;
pub mod mock;

pub use api::{
    ApiFactory, ExecutionApi, ExecutionHandle, ExecutionState, ExecutionStatus, Outcome,
    SubmitRequest,
};
pub use datastore::{PollingDatastore, PollingOptions};
pub use executor::{PollPolicy, PollingExecutor};
pub use http::{HttpApiFactory, HttpExecutionApi};
pub use mock::{ScriptedApiFactory, ScriptedExecutionApi};
