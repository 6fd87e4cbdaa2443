//! Error types for the retrying connection.
//!
//! This module defines all error types using `thiserror` for ergonomic error handling.
//! [`DbError`] is returned by every operation of the drivers and of the
//! retrying wrapper; [`ConnectionFailure`] is the terminal report produced when
//! a lost connection could not be recovered.

use crate::models::Bindings;
use thiserror::Error;

/// Boxed error returned by user-supplied hooks.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Connection failed: {message}")]
    Connection { message: String, suggestion: String },

    #[error("Database error: {message}")]
    Database {
        message: String,
        /// e.g., "42P01" for undefined table
        sql_state: Option<String>,
        suggestion: String,
    },

    #[error("Timeout: {operation} exceeded {elapsed_secs}s")]
    Timeout {
        operation: String,
        elapsed_secs: u32,
    },

    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },

    #[error("Unsupported operation: {operation}")]
    Unsupported { operation: String },

    #[error(transparent)]
    ConnectionLost(Box<ConnectionFailure>),

    #[error("Failure notification failed ({source}) while handling: {failure}")]
    NotificationFailed {
        source: BoxError,
        failure: Box<ConnectionFailure>,
    },
}

impl DbError {
    /// Create a connection error with a helpful suggestion.
    pub fn connection(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Create a database error with optional SQL state.
    pub fn database(
        message: impl Into<String>,
        sql_state: Option<String>,
        suggestion: impl Into<String>,
    ) -> Self {
        Self::Database {
            message: message.into(),
            sql_state,
            suggestion: suggestion.into(),
        }
    }

    /// Create a timeout error.
    pub fn timeout(operation: impl Into<String>, elapsed_secs: u32) -> Self {
        Self::Timeout {
            operation: operation.into(),
            elapsed_secs,
        }
    }

    /// Create an invalid input error.
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Create an unsupported operation error.
    pub fn unsupported(operation: impl Into<String>) -> Self {
        Self::Unsupported {
            operation: operation.into(),
        }
    }

    /// Get the suggestion for this error, if available.
    pub fn suggestion(&self) -> Option<&str> {
        match self {
            Self::Connection { suggestion, .. } => Some(suggestion),
            Self::Database { suggestion, .. } => Some(suggestion),
            Self::Unsupported { .. } => Some("Use run_query() instead"),
            _ => None,
        }
    }

    /// SQLSTATE (or driver code) attached to a database error.
    pub fn sql_state(&self) -> Option<&str> {
        match self {
            Self::Database { sql_state, .. } => sql_state.as_deref(),
            _ => None,
        }
    }

    /// The terminal failure report, for `ConnectionLost` and `NotificationFailed`.
    pub fn connection_failure(&self) -> Option<&ConnectionFailure> {
        match self {
            Self::ConnectionLost(failure) => Some(failure),
            Self::NotificationFailed { failure, .. } => Some(failure),
            _ => None,
        }
    }

    pub fn is_connection_lost(&self) -> bool {
        matches!(self, Self::ConnectionLost(_))
    }
}

/// Convert sqlx errors to DbError.
impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Configuration(msg) => DbError::invalid_input(format!(
                "Invalid connection configuration: {}",
                msg
            )),
            sqlx::Error::Database(db_err) => {
                let code = db_err.code().map(|c| c.to_string());
                DbError::database(
                    db_err.message(),
                    code,
                    "Check the SQL syntax and referenced objects",
                )
            }
            sqlx::Error::RowNotFound => DbError::database(
                "No rows returned",
                None,
                "Verify the query conditions match existing data",
            ),
            sqlx::Error::PoolTimedOut => DbError::timeout("connection pool acquire", 30),
            sqlx::Error::PoolClosed => {
                DbError::connection("Connection pool is closed", "Reconnect to the database")
            }
            sqlx::Error::Io(io_err) => DbError::connection(
                format!("I/O error: {}", io_err),
                "Check network connectivity and database server status",
            ),
            sqlx::Error::Tls(tls_err) => DbError::connection(
                format!("TLS error: {}", tls_err),
                "Verify TLS configuration and certificates",
            ),
            // Parameter format and count errors are raised while binding,
            // before anything is sent to the database.
            sqlx::Error::Protocol(msg) if is_binding_error(&msg) => {
                DbError::invalid_input(format!("Invalid statement parameters: {}", msg))
            }
            sqlx::Error::Protocol(msg) => DbError::connection(
                format!("Protocol error: {}", msg),
                "Check database server compatibility",
            ),
            sqlx::Error::WorkerCrashed => DbError::connection(
                "Database worker crashed",
                "Reconnect to the database",
            ),
            sqlx::Error::TypeNotFound { type_name } => {
                DbError::invalid_input(format!("Type not found: {}", type_name))
            }
            sqlx::Error::ColumnNotFound(col) => {
                DbError::invalid_input(format!("Column not found: {}", col))
            }
            sqlx::Error::ColumnIndexOutOfBounds { index, len } => DbError::internal(format!(
                "Column index {} out of bounds (len: {})",
                index, len
            )),
            sqlx::Error::ColumnDecode { index, source } => {
                DbError::internal(format!("Failed to decode column {}: {}", index, source))
            }
            sqlx::Error::Decode(source) => DbError::internal(format!("Decode error: {}", source)),
            _ => DbError::internal(format!("Unknown database error: {}", err)),
        }
    }
}

fn is_binding_error(message: &str) -> bool {
    let lower = message.to_lowercase();
    lower.contains("parameter") || lower.contains("argument")
}

/// Result type alias for database operations.
pub type DbResult<T> = Result<T, DbError>;

/// Report of a statement that could not be completed because the connection
/// was lost and could not be (or must not be) re-established.
///
/// Built once when retries are exhausted or blocked by an open transaction,
/// handed to the failure notifier by reference, then returned to the caller
/// inside [`DbError::ConnectionLost`].
#[derive(Error, Debug)]
#[error("{cause} (connection lost after {attempts} attempt(s))")]
pub struct ConnectionFailure {
    #[source]
    cause: DbError,
    attempts: u32,
    statement: String,
    parameters: Option<Bindings>,
}

impl ConnectionFailure {
    pub(crate) fn new(
        cause: DbError,
        attempts: u32,
        statement: impl Into<String>,
        parameters: Option<Bindings>,
    ) -> Self {
        Self {
            cause,
            attempts,
            statement: statement.into(),
            parameters,
        }
    }

    /// The failure seen on the last attempt.
    pub fn cause(&self) -> &DbError {
        &self.cause
    }

    /// Number of attempts recorded before giving up.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// The SQL text that was being executed.
    pub fn statement(&self) -> &str {
        &self.statement
    }

    /// The values bound to the statement, if any.
    pub fn parameters(&self) -> Option<&Bindings> {
        self.parameters.as_ref()
    }

    pub fn into_cause(self) -> DbError {
        self.cause
    }
}
