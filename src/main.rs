//! db-retry-wrapper - Main entry point.
//!
//! Runs one SQL statement through a retrying SQLite connection and prints the
//! result as JSON on stdout. Logs go to stderr.

use clap::Parser;
use db_retry_wrapper::config::Config;
use db_retry_wrapper::db::{DatabaseConnection, RetryingConnection, SqliteConnection, Statement};
use db_retry_wrapper::error::{BoxError, ConnectionFailure, DbResult};
use db_retry_wrapper::models::Attribute;
use serde_json::json;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Initialize the tracing subscriber for logging.
fn init_tracing(config: &Config) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let subscriber = tracing_subscriber::registry().with(filter);

    if config.json_logs {
        subscriber
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        subscriber
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Parse configuration from command line and environment
    let config = Config::parse();

    // Initialize logging
    init_tracing(&config);

    if let Err(message) = config.validate() {
        eprintln!("Error: {message}");
        eprintln!();
        eprintln!("Usage: db-retry-wrapper --database <url> [--param <json>]... <sql>");
        eprintln!();
        eprintln!("Examples:");
        eprintln!("  db-retry-wrapper -d 'sqlite:data.db?mode=rwc' 'CREATE TABLE t (id INTEGER)'");
        eprintln!("  db-retry-wrapper -d sqlite:data.db -p 1 'SELECT * FROM t WHERE id = ?'");
        eprintln!("  db-retry-wrapper -d sqlite:data.db -b id=1 'SELECT * FROM t WHERE id = :id'");
        std::process::exit(2);
    }

    let bindings = config.bindings()?;

    info!(
        max_attempts = config.max_attempts,
        "Starting db-retry-wrapper v{}",
        env!("CARGO_PKG_VERSION")
    );

    let url = config.database.clone();
    let busy_timeout = config.busy_timeout;
    let mut conn = RetryingConnection::new(move || -> DbResult<SqliteConnection> {
        let mut conn = SqliteConnection::open(&url)?;
        if let Some(secs) = busy_timeout {
            conn.set_attribute(Attribute::Timeout, secs.into())?;
        }
        Ok(conn)
    })
    .with_max_attempts(config.max_attempts)
    .with_failure_notifier(|failure: &ConnectionFailure| -> Result<(), BoxError> {
        error!(
            attempts = failure.attempts(),
            statement = %failure.statement(),
            parameters = failure.parameters().map(|p| p.len()).unwrap_or(0),
            "Statement abandoned after connection loss"
        );
        Ok(())
    });

    let mut statement = conn.run_query(&config.sql, bindings, None)?;

    let output = if statement.column_count() > 0 {
        json!({ "rows": statement.fetch_all()? })
    } else {
        json!({
            "rows_affected": statement.row_count(),
            "last_insert_id": conn.last_insert_id(None)?,
        })
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
