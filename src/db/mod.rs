//! Database access layer.
//!
//! This module provides:
//! - The driver-facing connection and statement traits
//! - Connection-loss classification
//! - The retrying connection wrapper
//! - The SQLite driver and its parameter/row conversions

pub mod connection;
pub mod detector;
pub mod params;
pub mod retry;
pub mod sqlite;
pub mod types;

pub use connection::{Connector, DatabaseConnection, Statement};
pub use detector::{
    ConnectionLossPolicy, DEFAULT_LOST_CONNECTION_PATTERNS, DEFAULT_LOST_CONNECTION_SQL_STATES,
    LostConnectionDetector,
};
pub use retry::{DEFAULT_MAX_ATTEMPTS, FailureNotifier, RetryingConnection};
pub use sqlite::{SqliteConnection, SqliteStatement};
