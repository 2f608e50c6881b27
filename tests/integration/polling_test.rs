//! Polling backend integration tests against the scripted execution API.

use std::time::Duration;

use db_connector::db::{Connection, Datastore, DatastoreBackend, TabularResult};
use db_connector::error::ConnectorError;
use db_connector::polling::{
    ExecutionState, ExecutionStatus, PollPolicy, PollingDatastore, PollingOptions,
    ScriptedApiFactory, ScriptedExecutionApi,
};
use pretty_assertions::assert_eq;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::CapturedLogs;

const SECRET: &str = "wJalrXUtnFEMI/K7MDENG";

fn connection() -> Connection {
    Connection::new("", "AKIDEXAMPLE", SECRET).with_region("us-east-1")
}

fn datastore(api: &ScriptedExecutionApi, query_timeout: Option<Duration>) -> Box<dyn Datastore> {
    let options = PollingOptions {
        database: Some("analytics".to_string()),
        query_timeout,
        ..Default::default()
    };
    Box::new(PollingDatastore::with_factory(
        options,
        ScriptedApiFactory::new(api.clone()),
    ))
}

fn orders() -> TabularResult {
    TabularResult::new(
        vec!["id".to_string(), "total".to_string()],
        vec![
            vec![Some("1".to_string()), Some("9.50".to_string())],
            vec![Some("2".to_string()), None],
        ],
    )
    .unwrap()
}

#[tokio::test(start_paused = true)]
async fn test_query_waits_through_pending_states() {
    let api = ScriptedExecutionApi::new(vec![
        ExecutionState::Queued,
        ExecutionState::Running,
        ExecutionState::Succeeded,
    ])
    .with_result(orders());
    let store = datastore(&api, Some(Duration::from_millis(5000)));
    let started = Instant::now();

    let result = store.query("SELECT * FROM orders", &connection()).await.unwrap();

    assert_eq!(result, orders());
    assert_eq!(api.poll_count(), 3);
    assert_eq!(api.fetch_count(), 1);
    assert_eq!(started.elapsed(), Duration::from_millis(2000));
}

#[tokio::test(start_paused = true)]
async fn test_query_times_out_after_retry_budget() {
    let api = ScriptedExecutionApi::new(vec![ExecutionState::Running]);
    let store = datastore(&api, Some(Duration::from_millis(5000)));
    let started = Instant::now();

    let err = store.query("SELECT 1", &connection()).await.unwrap_err();

    assert!(matches!(err, ConnectorError::Timeout(_)), "got {err:?}");
    assert_eq!(api.poll_count(), 6);
    assert_eq!(api.stop_count(), 1);
    assert_eq!(api.fetch_count(), 0);
    assert_eq!(started.elapsed(), Duration::from_millis(5000));
}

#[tokio::test(start_paused = true)]
async fn test_small_budget_polls_at_floor() {
    let api = ScriptedExecutionApi::new(vec![ExecutionState::Running]);
    let options = PollingOptions {
        query_timeout: Some(Duration::from_millis(300)),
        policy: PollPolicy::new(2, Duration::from_millis(250)),
        ..Default::default()
    };
    let store = PollingDatastore::with_factory(options, ScriptedApiFactory::new(api.clone()));
    let started = Instant::now();

    let err = store.query("SELECT 1", &connection()).await.unwrap_err();

    assert!(matches!(err, ConnectorError::Timeout(_)));
    assert_eq!(api.poll_count(), 3);
    assert_eq!(started.elapsed(), Duration::from_millis(500));
}

#[tokio::test(start_paused = true)]
async fn test_failed_state_carries_reason() {
    let api = ScriptedExecutionApi::new(vec![ExecutionState::Running]).then(
        ExecutionStatus::new(ExecutionState::Failed).with_reason("TABLE_NOT_FOUND: orders"),
    );
    let store = datastore(&api, None);

    let err = store.query("SELECT * FROM orders", &connection()).await.unwrap_err();

    assert!(matches!(err, ConnectorError::Execution(_)));
    assert!(err.to_string().contains("TABLE_NOT_FOUND"));
    assert_eq!(api.stop_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_backend_cancelled_state_is_execution_error() {
    let api = ScriptedExecutionApi::new(vec![ExecutionState::Cancelled]);
    let store = datastore(&api, None);

    let err = store.query("SELECT 1", &connection()).await.unwrap_err();

    assert!(matches!(err, ConnectorError::Execution(_)));
    assert!(err.to_string().contains("CANCELLED"));
}

#[tokio::test(start_paused = true)]
async fn test_caller_cancel_stops_remote_query() {
    let api = ScriptedExecutionApi::new(vec![ExecutionState::Running]);
    let store = datastore(&api, Some(Duration::from_millis(60_000)));
    let cancel = CancellationToken::new();

    let canceller = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(25_000)).await;
            cancel.cancel();
        })
    };

    let err = store
        .query_cancellable("SELECT 1", &connection(), cancel)
        .await
        .unwrap_err();
    canceller.await.unwrap();

    assert!(matches!(err, ConnectorError::Cancelled));
    assert_eq!(api.poll_count(), 3);
    assert_eq!(api.stop_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_empty_result_set() {
    let api = ScriptedExecutionApi::new(vec![ExecutionState::Succeeded]);
    let store = datastore(&api, None);

    let result = store.query("SELECT 1 WHERE false", &connection()).await.unwrap();

    assert!(result.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_list_tables_through_trait_object() {
    let listing = TabularResult::new(
        vec!["tab_name".to_string()],
        vec![
            vec![Some("orders".to_string())],
            vec![Some("customers".to_string())],
        ],
    )
    .unwrap();
    let api = ScriptedExecutionApi::new(vec![ExecutionState::Succeeded]).with_result(listing);
    let store = datastore(&api, None);

    assert_eq!(store.backend(), DatastoreBackend::Athena);
    assert_eq!(
        store.list_tables(&connection()).await.unwrap(),
        vec!["customers", "orders"]
    );
}

#[tokio::test(start_paused = true)]
async fn test_connect_logs_never_contain_secret() {
    let logs = CapturedLogs::default();
    let _guard = logs.install();

    let api = ScriptedExecutionApi::new(vec![ExecutionState::Succeeded]);
    datastore(&api, None).connect(&connection()).await.unwrap();

    let failing = ScriptedExecutionApi::default().failing_submit("The security token is invalid");
    let err = datastore(&failing, None)
        .connect(&connection())
        .await
        .unwrap_err();

    assert!(matches!(err, ConnectorError::Submission(_)));
    let output = logs.contents();
    assert!(output.contains("AKIDEXAMPLE"));
    assert!(!output.contains(SECRET));
    assert!(!err.to_string().contains(SECRET));
}
