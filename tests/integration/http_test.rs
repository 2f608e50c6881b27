//! HTTP execution API tests against a local stub endpoint.
//!
//! The stub answers one request per connection, routed on `X-Amz-Target`.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use db_connector::db::{Connection, Datastore};
use db_connector::error::ConnectorError;
use db_connector::polling::{
    ExecutionApi, ExecutionHandle, ExecutionState, HttpExecutionApi, PollingDatastore,
    PollingOptions, SubmitRequest,
};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

const SECRET: &str = "wJalrXUtnFEMI/K7MDENG";

/// One request as seen by the stub.
#[derive(Debug, Clone)]
struct Recorded {
    target: String,
    authorization: String,
    body: Value,
}

type Handler = Arc<dyn Fn(&str, &Value) -> (u16, Value) + Send + Sync>;

struct Stub {
    endpoint: String,
    requests: Arc<Mutex<Vec<Recorded>>>,
}

impl Stub {
    async fn start(handler: Handler) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let endpoint = format!("http://{}/", listener.local_addr().unwrap());
        let requests = Arc::new(Mutex::new(Vec::new()));

        let recorded = requests.clone();
        tokio::spawn(async move {
            loop {
                let Ok((socket, _)) = listener.accept().await else {
                    return;
                };
                tokio::spawn(serve(socket, handler.clone(), recorded.clone()));
            }
        });

        Self { endpoint, requests }
    }

    fn connection(&self) -> Connection {
        Connection::new(self.endpoint.clone(), "AKIDEXAMPLE", SECRET)
    }

    fn targets(&self) -> Vec<String> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.target.clone())
            .collect()
    }

    fn requests(&self) -> Vec<Recorded> {
        self.requests.lock().unwrap().clone()
    }
}

async fn serve(mut socket: TcpStream, handler: Handler, recorded: Arc<Mutex<Vec<Recorded>>>) {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];

    let (head, body) = loop {
        let n = socket.read(&mut chunk).await.unwrap_or(0);
        if n == 0 {
            return;
        }
        buf.extend_from_slice(&chunk[..n]);

        let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") else {
            continue;
        };
        let head = String::from_utf8_lossy(&buf[..end]).to_string();
        let length = header(&head, "content-length")
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(0);
        if buf.len() >= end + 4 + length {
            let body = buf[end + 4..end + 4 + length].to_vec();
            break (head, body);
        }
    };

    let target = header(&head, "x-amz-target").unwrap_or_default();
    let body: Value = serde_json::from_slice(&body).unwrap_or(Value::Null);
    recorded.lock().unwrap().push(Recorded {
        target: target.clone(),
        authorization: header(&head, "authorization").unwrap_or_default(),
        body: body.clone(),
    });

    let (status, payload) = handler(&target, &body);
    let payload = payload.to_string();
    let response = format!(
        concat!(
            "HTTP/1.1 {} Stub\r\n",
            "Content-Type: application/x-amz-json-1.1\r\n",
            "Content-Length: {}\r\n",
            "Connection: close\r\n\r\n{}"
        ),
        status,
        payload.len(),
        payload
    );
    let _ = socket.write_all(response.as_bytes()).await;
    let _ = socket.shutdown().await;
}

fn header(head: &str, name: &str) -> Option<String> {
    head.lines().skip(1).find_map(|line| {
        let (key, value) = line.split_once(':')?;
        key.trim()
            .eq_ignore_ascii_case(name)
            .then(|| value.trim().to_string())
    })
}

fn happy_path() -> Handler {
    Arc::new(|target: &str, body: &Value| match target {
        "AmazonAthena.StartQueryExecution" => (200, json!({ "QueryExecutionId": "q-42" })),
        "AmazonAthena.GetQueryExecution" => (
            200,
            json!({
                "QueryExecution": {
                    "QueryExecutionId": "q-42",
                    "Status": { "State": "SUCCEEDED" }
                }
            }),
        ),
        "AmazonAthena.GetQueryResults" if body.get("NextToken").is_none() => (
            200,
            json!({
                "ResultSet": {
                    "ResultSetMetadata": { "ColumnInfo": [{ "Name": "id" }, { "Name": "city" }] },
                    "Rows": [
                        { "Data": [{ "VarCharValue": "id" }, { "VarCharValue": "city" }] },
                        { "Data": [{ "VarCharValue": "1" }, { "VarCharValue": "Lisbon" }] }
                    ]
                },
                "NextToken": "page-2"
            }),
        ),
        "AmazonAthena.GetQueryResults" => (
            200,
            json!({
                "ResultSet": {
                    "ResultSetMetadata": { "ColumnInfo": [{ "Name": "id" }, { "Name": "city" }] },
                    "Rows": [{ "Data": [{ "VarCharValue": "2" }, {}] }]
                }
            }),
        ),
        _ => (400, json!({ "__type": "UnknownOperationException" })),
    })
}

#[tokio::test]
async fn test_query_round_trip_over_http() {
    let stub = Stub::start(happy_path()).await;
    let options = PollingOptions {
        database: Some("analytics".to_string()),
        output_location: Some("s3://results/".to_string()),
        workgroup: Some("primary".to_string()),
        ..Default::default()
    };
    let store = PollingDatastore::new(options);

    let result = store
        .query("SELECT id, city FROM places", &stub.connection())
        .await
        .unwrap();

    assert_eq!(result.columns(), &["id".to_string(), "city".to_string()]);
    assert_eq!(
        result.rows(),
        &[
            vec![Some("1".to_string()), Some("Lisbon".to_string())],
            vec![Some("2".to_string()), None],
        ]
    );
    assert_eq!(
        stub.targets(),
        vec![
            "AmazonAthena.StartQueryExecution",
            "AmazonAthena.GetQueryExecution",
            "AmazonAthena.GetQueryResults",
            "AmazonAthena.GetQueryResults",
        ]
    );

    let requests = stub.requests();
    assert_eq!(
        requests[0].body,
        json!({
            "QueryString": "SELECT id, city FROM places",
            "QueryExecutionContext": { "Database": "analytics" },
            "ResultConfiguration": {
                "OutputLocation": "s3://results/",
                "EncryptionConfiguration": { "EncryptionOption": "SSE_S3" }
            },
            "WorkGroup": "primary"
        })
    );
    assert_eq!(requests[1].body, json!({ "QueryExecutionId": "q-42" }));
    assert_eq!(requests[3].body["NextToken"], json!("page-2"));
    assert!(requests
        .iter()
        .all(|r| r.authorization.starts_with("Basic ")));
}

#[tokio::test]
async fn test_status_maps_states_and_reason() {
    let stub = Stub::start(Arc::new(|_: &str, _: &Value| {
        (
            200,
            json!({
                "QueryExecution": {
                    "Status": { "State": "FAILED", "StateChangeReason": "SYNTAX_ERROR: line 1:8" }
                }
            }),
        )
    }))
    .await;
    let api = HttpExecutionApi::new(&stub.connection(), Duration::from_secs(5)).unwrap();

    let status = api.status(&ExecutionHandle::new("q-1")).await.unwrap();

    assert_eq!(status.state, ExecutionState::Failed);
    assert_eq!(status.reason.as_deref(), Some("SYNTAX_ERROR: line 1:8"));
}

#[tokio::test]
async fn test_rejected_submission_is_submission_error() {
    let stub = Stub::start(Arc::new(|_: &str, _: &Value| {
        (
            400,
            json!({
                "__type": "com.amazonaws.athena#InvalidRequestException",
                "Message": "Database analytics does not exist"
            }),
        )
    }))
    .await;
    let api = HttpExecutionApi::new(&stub.connection(), Duration::from_secs(5)).unwrap();

    let err = api.submit(&SubmitRequest::new("SELECT 1")).await.unwrap_err();

    assert!(matches!(err, ConnectorError::Submission(_)), "got {err:?}");
    assert!(err
        .to_string()
        .contains("InvalidRequestException: Database analytics does not exist"));
}

#[tokio::test]
async fn test_forbidden_names_principal_not_secret() {
    let stub = Stub::start(Arc::new(|_: &str, _: &Value| {
        (403, json!({ "Message": format!("Signature for {SECRET} does not match") }))
    }))
    .await;
    let api = HttpExecutionApi::new(&stub.connection(), Duration::from_secs(5)).unwrap();

    let err = api.status(&ExecutionHandle::new("q-1")).await.unwrap_err();

    assert!(matches!(err, ConnectorError::BackendUnavailable(_)));
    assert!(err.to_string().contains("AKIDEXAMPLE"));
    assert!(!err.to_string().contains(SECRET));
}

#[tokio::test]
async fn test_stop_accepts_empty_object() {
    let stub = Stub::start(Arc::new(|_: &str, _: &Value| (200, json!({})))).await;
    let api = HttpExecutionApi::new(&stub.connection(), Duration::from_secs(5)).unwrap();

    api.stop(&ExecutionHandle::new("q-1")).await.unwrap();

    assert_eq!(stub.targets(), vec!["AmazonAthena.StopQueryExecution"]);
}
