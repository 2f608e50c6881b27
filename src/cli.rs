//! Command-line argument parsing for db-connector.

use clap::{Parser, Subcommand};
use db_connector::config::Config;
use db_connector::logging;
use std::path::PathBuf;

/// Output format for query results.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// Comma-delimited text with a header row.
    #[default]
    Csv,
    /// Pretty-printed JSON with `columns` and `rows`.
    Json,
}

/// Runs queries against Hive or Athena through one interface.
#[derive(Parser, Debug)]
#[command(name = "db-connector")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Use named connection from config
    #[arg(short = 'c', long, value_name = "NAME")]
    pub connection: Option<String>,

    /// Config file path
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Print query results as JSON instead of CSV
    #[arg(long, global = true)]
    pub json: bool,

    /// Total time budget for the query in milliseconds
    #[arg(long, value_name = "MS", global = true)]
    pub timeout_ms: Option<u64>,

    /// Write logs to a file instead of stderr (default location if PATH is omitted)
    #[arg(long, value_name = "PATH", global = true)]
    pub log_file: Option<Option<PathBuf>>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Check that the credentials reach the backend
    Ping,
    /// Run a query and print its result
    Query {
        /// Query text, passed to the backend verbatim
        #[arg(value_name = "SQL")]
        sql: String,
    },
    /// List tables in the current database
    Tables,
}

impl Cli {
    /// Parses command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Returns the config file path to use.
    ///
    /// Uses the --config argument if provided, otherwise the default path.
    pub fn config_path(&self) -> PathBuf {
        self.config.clone().unwrap_or_else(Config::default_path)
    }

    /// Returns the named connection to use, if specified.
    pub fn connection_name(&self) -> Option<&str> {
        self.connection.as_deref()
    }

    pub fn output_format(&self) -> OutputFormat {
        if self.json {
            OutputFormat::Json
        } else {
            OutputFormat::Csv
        }
    }

    /// Returns the log file to write to, or `None` to log to stderr.
    pub fn log_path(&self) -> Option<PathBuf> {
        self.log_file
            .as_ref()
            .map(|path| path.clone().unwrap_or_else(logging::default_log_path))
    }
}
