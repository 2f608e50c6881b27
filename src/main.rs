//! db-connector - run queries against Hive or Athena through one interface.

mod cli;

use cli::{Cli, Command, OutputFormat};
use db_connector::config::{Config, ConnectionConfig};
use db_connector::db::{self, TabularResult, DEFAULT_DELIMITER};
use db_connector::error::{ConnectorError, Result};
use db_connector::logging;
use std::future::Future;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() {
    let cli = Cli::parse_args();

    match cli.log_path() {
        Some(path) => logging::init_file_logging(&path),
        None => logging::init_stderr_logging(),
    }

    if let Err(e) = dotenvy::dotenv() {
        if !e.not_found() {
            warn!("Failed to load .env file: {}", e);
        }
    }

    if let Err(e) = run(&cli).await {
        error!("{}: {}", e.category(), e);
        if cli.log_file.is_some() {
            eprintln!("Error: {e}");
        }
        std::process::exit(1);
    }
}

async fn run(cli: &Cli) -> Result<()> {
    let config_path = cli.config_path();
    info!("Loading config from: {}", config_path.display());
    let mut config = Config::load_from_file(&config_path)?;

    let mut connection_config = resolve_connection(cli, &config)?;
    if let Some(ms) = cli.timeout_ms {
        config.shell.timeout_ms = Some(ms);
        connection_config.query_timeout_ms = Some(ms);
    }

    let connection = connection_config.to_connection()?;
    let store = db::open(&config, &connection_config)?;
    info!(
        "Using {} backend: {}",
        store.backend().as_str(),
        connection.display_string()
    );

    let cancel = CancellationToken::new();
    spawn_interrupt_watcher(cancel.clone());

    match &cli.command {
        Command::Ping => {
            until_cancelled(&cancel, store.connect(&connection)).await?;
            println!("OK {}", connection.display_string());
        }
        Command::Query { sql } => {
            let result = store
                .query_cancellable(sql, &connection, cancel.clone())
                .await?;
            print_result(&result, cli.output_format())?;
        }
        Command::Tables => {
            let tables = until_cancelled(&cancel, store.list_tables(&connection)).await?;
            match cli.output_format() {
                OutputFormat::Csv => tables.iter().for_each(|t| println!("{t}")),
                OutputFormat::Json => println!("{}", to_json(&tables)?),
            }
        }
    }

    Ok(())
}

/// Resolves the connection to use from the config file and environment.
///
/// Precedence: the connection named with `-c`, then the `default` connection, then a
/// Hive connection built from environment variables alone.
fn resolve_connection(cli: &Cli, config: &Config) -> Result<ConnectionConfig> {
    let mut connection = match cli.connection_name() {
        Some(name) => config.get_connection(Some(name)).cloned().ok_or_else(|| {
            ConnectorError::config(format!("Connection '{name}' not found in config file"))
        })?,
        None => config.get_connection(None).cloned().unwrap_or_default(),
    };

    connection.apply_env_defaults();
    Ok(connection)
}

/// Cancels `cancel` on Ctrl-C.
fn spawn_interrupt_watcher(cancel: CancellationToken) {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                warn!("Interrupted, cancelling");
                cancel.cancel();
            }
            Err(e) => warn!("Failed to listen for Ctrl-C: {}", e),
        }
    });
}

/// Drops `work` with `Cancelled` once `cancel` fires.
async fn until_cancelled<T>(
    cancel: &CancellationToken,
    work: impl Future<Output = Result<T>>,
) -> Result<T> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(ConnectorError::Cancelled),
        result = work => result,
    }
}

fn print_result(result: &TabularResult, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Csv => print!("{}", result.to_delimited(DEFAULT_DELIMITER)?),
        OutputFormat::Json => println!("{}", to_json(result)?),
    }
    Ok(())
}

fn to_json<T: serde::Serialize + ?Sized>(value: &T) -> Result<String> {
    serde_json::to_string_pretty(value)
        .map_err(|e| ConnectorError::internal(format!("Failed to serialize output: {e}")))
}
