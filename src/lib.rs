//! Database connection resilience.
//!
//! This library wraps a database connection so that statements survive a dropped
//! connection: failures classified as connection loss trigger a reconnect and a
//! bounded retry, except inside a transaction. A SQLite driver built on sqlx is
//! included.

pub mod config;
pub mod db;
pub mod error;
pub mod models;

pub use config::Config;
pub use db::{DatabaseConnection, RetryingConnection, SqliteConnection, Statement};
pub use error::{ConnectionFailure, DbError, DbResult};
