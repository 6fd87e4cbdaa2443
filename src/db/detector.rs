//! Connection-loss classification.
//!
//! Decides whether a failure means the connection itself is unusable (and the
//! statement may be retried on a fresh one) or whether it is inherent to the
//! statement or data and must be returned to the caller as-is.
//!
//! # Rules of the default policy
//!
//! A failure counts as a lost connection when any of these hold:
//! - it is a [`DbError::Connection`] or [`DbError::Timeout`]
//! - its SQLSTATE starts with one of the configured classes (`08`, `57P0x`)
//! - its lower-cased message contains a known lost-connection signature
//!
//! Terminal reports (`ConnectionLost`, `NotificationFailed`) and `Unsupported`
//! are never classified as lost, whatever their message says.

use crate::error::DbError;

/// Message fragments emitted by common drivers when the session is gone.
pub const DEFAULT_LOST_CONNECTION_PATTERNS: &[&str] = &[
    "server has gone away",
    "no connection to the server",
    "lost connection",
    "is dead or not enabled",
    "error while sending",
    "decryption failed or bad record mac",
    "server closed the connection unexpectedly",
    "ssl connection has been closed unexpectedly",
    "error writing data to the connection",
    "resource deadlock avoided",
    "transaction() on null",
    "child connection forced to terminate due to client_idle_limit",
    "query_wait_timeout",
    "reset by peer",
    "physical connection is not usable",
    "tcp provider: error code 0x68",
    "ora-03114",
    "packets out of order. expected",
    "adaptive server connection failed",
    "communication link failure",
    "connection is no longer usable",
    "login timeout expired",
    "connection refused",
    "running with the --read-only option so it cannot execute this statement",
    "the connection is broken and recovery is not possible",
    "php_network_getaddresses: getaddrinfo failed",
    "ssl syscall error: eof detected",
    "connection timed out",
    "the last transaction was aborted due to seamless scaling",
    "temporary failure in name resolution",
    "broken pipe",
    "could not connect to server",
    "ssl syscall error: no route to host",
    "the client was disconnected by the server because of inactivity",
    "could not translate host name",
    "tcp provider: error code 0x274c",
    "[2002] no such file or directory",
    "ssl: operation timed out",
    "server is in script upgrade mode",
    "ssl: handshake timed out",
    "sslv3 alert unexpected message",
    "unrecognized ssl error code",
    "connected party did not properly respond after a period of time",
    "network is unreachable",
    "connection reset",
    "connection closed",
];

/// SQLSTATE prefixes that denote a lost session.
pub const DEFAULT_LOST_CONNECTION_SQL_STATES: &[&str] = &["08", "57P01", "57P02", "57P03"];

/// Classifies failures as connection loss.
///
/// Implemented for [`ConnectionLossPolicy`] and for any `Fn(&DbError) -> bool`.
pub trait LostConnectionDetector {
    fn is_lost_connection(&self, error: &DbError) -> bool;
}

impl<F> LostConnectionDetector for F
where
    F: Fn(&DbError) -> bool,
{
    fn is_lost_connection(&self, error: &DbError) -> bool {
        self(error)
    }
}

/// Default detector: error kind, SQLSTATE class and message signatures.
#[derive(Debug, Clone)]
pub struct ConnectionLossPolicy {
    patterns: Vec<String>,
    sql_states: Vec<String>,
    connection_errors: bool,
}

impl ConnectionLossPolicy {
    /// Policy with the default signatures and SQLSTATE classes.
    pub fn new() -> Self {
        Self {
            patterns: DEFAULT_LOST_CONNECTION_PATTERNS
                .iter()
                .map(|p| p.to_string())
                .collect(),
            sql_states: DEFAULT_LOST_CONNECTION_SQL_STATES
                .iter()
                .map(|s| s.to_string())
                .collect(),
            connection_errors: true,
        }
    }

    /// Policy that matches nothing until rules are added.
    pub fn without_defaults() -> Self {
        Self {
            patterns: Vec::new(),
            sql_states: Vec::new(),
            connection_errors: false,
        }
    }

    /// Add a message fragment (matched case-insensitively).
    pub fn with_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.patterns.push(pattern.into().to_lowercase());
        self
    }

    /// Add a SQLSTATE prefix.
    pub fn with_sql_state(mut self, prefix: impl Into<String>) -> Self {
        self.sql_states.push(prefix.into());
        self
    }

    /// Whether `Connection` and `Timeout` errors are lost connections regardless
    /// of their message.
    pub fn with_connection_errors(mut self, enabled: bool) -> Self {
        self.connection_errors = enabled;
        self
    }

    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }

    fn matches_kind(&self, error: &DbError) -> bool {
        self.connection_errors
            && matches!(error, DbError::Connection { .. } | DbError::Timeout { .. })
    }

    fn matches_sql_state(&self, error: &DbError) -> bool {
        error.sql_state().is_some_and(|state| {
            self.sql_states
                .iter()
                .any(|prefix| state.starts_with(prefix.as_str()))
        })
    }

    fn matches_message(&self, error: &DbError) -> bool {
        let message = error.to_string().to_lowercase();
        self.patterns.iter().any(|p| message.contains(p.as_str()))
    }
}

impl Default for ConnectionLossPolicy {
    fn default() -> Self {
        Self::new()
    }
}

impl LostConnectionDetector for ConnectionLossPolicy {
    fn is_lost_connection(&self, error: &DbError) -> bool {
        match error {
            DbError::ConnectionLost(_)
            | DbError::NotificationFailed { .. }
            | DbError::Unsupported { .. } => false,
            _ => {
                self.matches_kind(error)
                    || self.matches_sql_state(error)
                    || self.matches_message(error)
            }
        }
    }
}
