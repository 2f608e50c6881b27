//! db-connector - a uniform query interface over structurally different backends.
//!
//! This library exposes the core modules for the binary and integration tests.

pub mod config;
pub mod db;
pub mod error;
pub mod logging;
pub mod polling;
pub mod shell;
