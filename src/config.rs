//! Configuration management for db-connector.
//!
//! Handles loading configuration from TOML files and environment variables,
//! with support for named connections to either backend.

use crate::db::{Connection, DatastoreBackend};
use crate::error::{ConnectorError, Result};
use crate::polling::{PollPolicy, PollingOptions};
use crate::shell::ShellSettings;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

/// Main configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Shell client settings used by Hive connections.
    #[serde(default)]
    pub shell: ShellSettings,

    /// Poll loop policy used by Athena connections.
    #[serde(default)]
    pub polling: PollPolicy,

    /// Named connections.
    #[serde(default)]
    pub connections: HashMap<String, ConnectionConfig>,
}

/// One named connection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ConnectionConfig {
    pub backend: DatastoreBackend,

    /// JDBC URL for Hive, or an API endpoint override for Athena.
    pub url: Option<String>,

    /// Login user, or access key id for Athena.
    pub user: Option<String>,

    /// Password or secret key (not recommended to store in config).
    pub password: Option<String>,

    /// Environment variable to read the password from.
    pub password_env: Option<String>,

    /// Region used to build the default Athena endpoint.
    pub region: Option<String>,

    pub ssl: bool,

    /// Database queries run against (Athena).
    pub database: Option<String>,

    /// Where Athena writes result files, e.g. `s3://bucket/prefix/`.
    pub output_location: Option<String>,

    pub workgroup: Option<String>,

    /// Total time budget for one query.
    pub query_timeout_ms: Option<u64>,

    /// Timeout for each API request (Athena).
    pub request_timeout_secs: Option<u64>,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            backend: DatastoreBackend::default(),
            url: None,
            user: None,
            password: None,
            password_env: None,
            region: None,
            ssl: true,
            database: None,
            output_location: None,
            workgroup: None,
            query_timeout_ms: None,
            request_timeout_secs: None,
        }
    }
}

impl ConnectionConfig {
    /// Applies the backend's standard environment variables as defaults.
    pub fn apply_env_defaults(&mut self) {
        self.apply_defaults_from(|key| std::env::var(key).ok());
    }

    /// Fills unset fields from `lookup`, keyed by environment variable name.
    pub fn apply_defaults_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let (url_key, user_key, password_key) = match self.backend {
            DatastoreBackend::Hive => (Some("HIVE_URL"), "HIVE_USER", "HIVE_PASSWORD"),
            DatastoreBackend::Athena => (None, "AWS_ACCESS_KEY_ID", "AWS_SECRET_ACCESS_KEY"),
        };

        if self.url.is_none() {
            self.url = url_key.and_then(&lookup);
        }
        if self.user.is_none() {
            self.user = lookup(user_key);
        }
        if self.password.is_none() && self.password_env.is_none() {
            self.password = lookup(password_key);
        }
        if self.backend == DatastoreBackend::Athena && self.region.is_none() {
            self.region = lookup("AWS_REGION");
        }
    }

    /// Returns a display-safe string (no password) for UI purposes.
    pub fn display_string(&self) -> String {
        let user = self.user.as_deref().unwrap_or("anonymous");
        let target = self
            .url
            .as_deref()
            .or(self.region.as_deref())
            .unwrap_or("unknown");
        format!("{user} @ {target} ({})", self.backend.as_str())
    }

    /// Validates the config and builds the runtime [`Connection`].
    pub fn to_connection(&self) -> Result<Connection> {
        self.to_connection_with(|key| std::env::var(key).ok())
    }

    /// Like [`Self::to_connection`], reading `password_env` through `lookup`.
    pub fn to_connection_with(
        &self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Connection> {
        let secret = self.resolve_secret(&lookup)?;
        let user = self.user.clone().unwrap_or_default();

        match self.backend {
            DatastoreBackend::Hive => {
                let url = self.url.as_deref().filter(|u| !u.is_empty()).ok_or_else(|| {
                    ConnectorError::config("Hive connection requires a JDBC url (or HIVE_URL)")
                })?;
                Url::parse(url)
                    .map_err(|e| ConnectorError::config(format!("Invalid Hive url '{url}': {e}")))?;

                Ok(Connection::new(url, user, secret.unwrap_or_default()).with_tls(self.ssl))
            }
            DatastoreBackend::Athena => {
                let endpoint = match self.url.as_deref().filter(|u| !u.is_empty()) {
                    Some(url) => {
                        let parsed = Url::parse(url).map_err(|e| {
                            ConnectorError::config(format!("Invalid Athena endpoint '{url}': {e}"))
                        })?;
                        if !matches!(parsed.scheme(), "http" | "https") {
                            return Err(ConnectorError::config(format!(
                                "Invalid scheme '{}'. Expected 'http' or 'https'",
                                parsed.scheme()
                            )));
                        }
                        url.to_string()
                    }
                    None if self.region.is_some() => String::new(),
                    None => {
                        return Err(ConnectorError::config(concat!(
                            "Athena connection requires a region ",
                            "(or AWS_REGION) or an endpoint url"
                        )))
                    }
                };
                if user.is_empty() {
                    return Err(ConnectorError::config(
                        "Athena connection requires an access key id (user or AWS_ACCESS_KEY_ID)",
                    ));
                }
                let secret = secret.ok_or_else(|| {
                    ConnectorError::config(concat!(
                        "Athena connection requires a secret key ",
                        "(password, password_env or AWS_SECRET_ACCESS_KEY)"
                    ))
                })?;

                let mut connection = Connection::new(endpoint, user, secret).with_tls(self.ssl);
                if let Some(region) = &self.region {
                    connection = connection.with_region(region.clone());
                }
                Ok(connection)
            }
        }
    }

    fn resolve_secret(&self, lookup: &impl Fn(&str) -> Option<String>) -> Result<Option<String>> {
        if let Some(password) = &self.password {
            return Ok(Some(password.clone()));
        }
        match &self.password_env {
            Some(var) => lookup(var).map(Some).ok_or_else(|| {
                ConnectorError::config(format!("Environment variable '{var}' is not set"))
            }),
            None => Ok(None),
        }
    }

    /// Builds the polling options for this connection.
    pub fn polling_options(&self, policy: &PollPolicy) -> PollingOptions {
        let defaults = PollingOptions::default();
        PollingOptions {
            database: self.database.clone(),
            output_location: self.output_location.clone(),
            workgroup: self.workgroup.clone(),
            query_timeout: self.query_timeout_ms.map(Duration::from_millis),
            policy: *policy,
            request_timeout: self
                .request_timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.request_timeout),
        }
    }
}

impl Config {
    /// Returns the default config file path for the current platform.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("db-connector")
            .join("config.toml")
    }

    /// Loads configuration from a TOML file. A missing file yields the defaults.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| ConnectorError::config(format!("Failed to read config file: {e}")))?;

        Self::parse_toml(&content, path)
    }

    fn parse_toml(content: &str, path: &Path) -> Result<Self> {
        toml::from_str(content).map_err(|e| {
            ConnectorError::config(format!(
                "Configuration error in {}:\n  {}",
                path.display(),
                e
            ))
        })
    }

    /// Gets a named connection, or the default connection if name is None.
    pub fn get_connection(&self, name: Option<&str>) -> Option<&ConnectionConfig> {
        let key = name.unwrap_or("default");
        self.connections.get(key)
    }
}
