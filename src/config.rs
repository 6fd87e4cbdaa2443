//! Configuration handling for the db-retry-wrapper CLI.
//!
//! This module provides configuration management via CLI arguments and environment variables.

use crate::db::DEFAULT_MAX_ATTEMPTS;
use crate::models::{Bindings, QueryParam};
use clap::Parser;
use serde_json::Value as JsonValue;

/// Configuration for the db-retry-wrapper CLI.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "db-retry-wrapper",
    about = "Run a SQL statement through a connection that reconnects and retries on connection loss",
    version,
    author
)]
pub struct Config {
    /// SQLite connection URL, e.g. "sqlite:data.db?mode=rwc" or "sqlite::memory:"
    #[arg(short = 'd', long = "database", value_name = "URL", env = "DB_RETRY_DATABASE")]
    pub database: String,

    /// Maximum attempts per statement (the statement runs at most max-attempts - 1
    /// times when the connection keeps dropping)
    #[arg(
        short = 'm',
        long,
        default_value_t = DEFAULT_MAX_ATTEMPTS,
        env = "DB_RETRY_MAX_ATTEMPTS"
    )]
    pub max_attempts: u32,

    /// Busy timeout in seconds applied to every new connection
    #[arg(long, value_name = "SECS", env = "DB_RETRY_BUSY_TIMEOUT")]
    pub busy_timeout: Option<i64>,

    /// Positional parameter as JSON (e.g. 42, "text", null). Can be repeated.
    /// Values that are not valid JSON are bound as strings.
    #[arg(short = 'p', long = "param", value_name = "JSON")]
    pub params: Vec<String>,

    /// Named parameter as name=JSON (e.g. id=42). Can be repeated.
    #[arg(short = 'b', long = "bind", value_name = "NAME=JSON")]
    pub binds: Vec<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn", env = "DB_RETRY_LOG_LEVEL")]
    pub log_level: String,

    /// Enable JSON logging format
    #[arg(long, env = "DB_RETRY_JSON_LOGS")]
    pub json_logs: bool,

    /// SQL statement to execute
    #[arg(value_name = "SQL")]
    pub sql: String,
}

impl Config {
    /// Check settings that clap cannot express.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_attempts == 0 {
            return Err("max_attempts must be greater than 0".to_string());
        }
        if !self.database.to_ascii_lowercase().starts_with("sqlite:") {
            return Err(format!(
                "Unsupported database URL '{}': only sqlite: URLs are supported",
                self.database
            ));
        }
        if let Some(secs) = self.busy_timeout {
            if secs < 0 {
                return Err("busy_timeout must not be negative".to_string());
            }
        }
        self.bindings().map(|_| ())
    }

    /// Parameters from `--param` and `--bind`, or `None` when neither was given.
    pub fn bindings(&self) -> Result<Option<Bindings>, String> {
        match (self.params.is_empty(), self.binds.is_empty()) {
            (true, true) => Ok(None),
            (false, false) => {
                Err("--param and --bind cannot be mixed in one statement".to_string())
            }
            (false, true) => Ok(Some(Bindings::positional(
                self.params.iter().map(|p| parse_value(p)),
            ))),
            (true, false) => {
                let pairs = self
                    .binds
                    .iter()
                    .map(|bind| {
                        let (name, value) = bind
                            .split_once('=')
                            .ok_or_else(|| format!("Invalid --bind '{bind}': expected NAME=JSON"))?;
                        let name = name.trim();
                        if name.is_empty() {
                            return Err(format!("Invalid --bind '{bind}': empty name"));
                        }
                        Ok((name.to_string(), parse_value(value)))
                    })
                    .collect::<Result<Vec<_>, String>>()?;
                Ok(Some(Bindings::named(pairs)))
            }
        }
    }
}

fn parse_value(raw: &str) -> QueryParam {
    serde_json::from_str::<JsonValue>(raw)
        .map(QueryParam::from_json)
        .unwrap_or_else(|_| QueryParam::String(raw.to_string()))
}
