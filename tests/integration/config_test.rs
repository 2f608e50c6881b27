//! Configuration integration tests.
//!
//! Loads config files from disk and opens the adapter they describe.

use std::time::Duration;

use db_connector::config::Config;
use db_connector::db::{self, DatastoreBackend};
use db_connector::polling::PollPolicy;
use pretty_assertions::assert_eq;
use secrecy::ExposeSecret;

const CONFIG: &str = r#"
[shell]
program = "beeline"
args = ["--silent=true", "--outputformat=csv2", "--showHeader=true"]
timeout_ms = 300000

[polling]
retry_count = 8
floor_interval_ms = 2000

[connections.default]
backend = "hive"
url = "jdbc:hive2://hive.internal:10000/default"
user = "analyst"
password = "hunter2"

[connections.lake]
backend = "athena"
user = "AKIDEXAMPLE"
password_env = "DBC_TEST_ATHENA_SECRET"
region = "eu-west-1"
database = "analytics"
output_location = "s3://results/athena/"
query_timeout_ms = 60000
request_timeout_secs = 15
"#;

fn load() -> Config {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, CONFIG).unwrap();
    Config::load_from_file(&path).unwrap()
}

#[test]
fn test_load_and_open_hive() {
    let config = load();
    let hive = config.get_connection(None).unwrap();

    let connection = hive.to_connection().unwrap();
    let store = db::open(&config, hive).unwrap();

    assert_eq!(store.backend(), DatastoreBackend::Hive);
    assert_eq!(connection.principal(), "analyst");
    assert_eq!(connection.secret().expose_secret(), "hunter2");
    assert_eq!(config.shell.args.len(), 3);
    assert_eq!(config.shell.timeout_ms, Some(300_000));
}

#[test]
fn test_load_and_open_athena() {
    let config = load();
    let lake = config.get_connection(Some("lake")).unwrap();

    let connection = lake
        .to_connection_with(|key| (key == "DBC_TEST_ATHENA_SECRET").then(|| "wJalr".to_string()))
        .unwrap();
    let store = db::open(&config, lake).unwrap();
    let options = lake.polling_options(&config.polling);

    assert_eq!(store.backend(), DatastoreBackend::Athena);
    assert_eq!(connection.region(), Some("eu-west-1"));
    assert_eq!(connection.secret().expose_secret(), "wJalr");
    assert_eq!(options.policy, PollPolicy::new(8, Duration::from_millis(2000)));
    assert_eq!(options.query_timeout, Some(Duration::from_secs(60)));
    assert_eq!(options.request_timeout, Duration::from_secs(15));
    assert_eq!(
        options.policy.interval(options.query_timeout),
        Duration::from_millis(7500)
    );
}

#[test]
fn test_debug_output_hides_secret() {
    let config = load();
    let connection = config
        .get_connection(None)
        .unwrap()
        .to_connection()
        .unwrap();

    let debug = format!("{connection:?}");
    assert!(debug.contains("analyst"));
    assert!(!debug.contains("hunter2"));
    assert!(!connection.to_string().contains("hunter2"));
}
