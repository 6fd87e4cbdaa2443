//! Connection-related data models.
//!
//! This module defines connection attributes, error-reporting modes and the
//! diagnostic record returned by `error_info`.

use serde::{Deserialize, Serialize};

/// SQLSTATE reported when the last operation succeeded.
pub const SQLSTATE_SUCCESS: &str = "00000";

/// SQLSTATE for general driver errors without a more specific class.
pub const SQLSTATE_GENERAL_ERROR: &str = "HY000";

/// Connection attributes readable or settable through the connection surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Attribute {
    /// How failed statements are reported (see [`ErrorMode`]).
    ErrorMode,
    /// Driver name, e.g. "sqlite". Read-only.
    DriverName,
    /// Server/library version. Read-only.
    ServerVersion,
    /// Lock/busy timeout in seconds.
    Timeout,
    /// Whether statements auto-commit (false inside a transaction). Read-only.
    Autocommit,
}

impl Attribute {
    pub fn name(&self) -> &'static str {
        match self {
            Self::ErrorMode => "error_mode",
            Self::DriverName => "driver_name",
            Self::ServerVersion => "server_version",
            Self::Timeout => "timeout",
            Self::Autocommit => "autocommit",
        }
    }
}

impl std::fmt::Display for Attribute {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Error-reporting mode of a live connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorMode {
    /// Failed statements return `Ok(false)`; details via `error_info`.
    #[default]
    Silent,
    /// Like `Silent`, but the failure is also logged.
    Warning,
    /// Failed statements return `Err`.
    Exception,
}

impl std::fmt::Display for ErrorMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Silent => write!(f, "silent"),
            Self::Warning => write!(f, "warning"),
            Self::Exception => write!(f, "exception"),
        }
    }
}

/// Value of a connection attribute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    ErrorMode(ErrorMode),
    Bool(bool),
    Int(i64),
    Text(String),
}

impl AttributeValue {
    pub fn as_error_mode(&self) -> Option<ErrorMode> {
        match self {
            Self::ErrorMode(mode) => Some(*mode),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl From<ErrorMode> for AttributeValue {
    fn from(mode: ErrorMode) -> Self {
        Self::ErrorMode(mode)
    }
}

impl From<bool> for AttributeValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for AttributeValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

/// Type hint for `quote`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    Null,
    Bool,
    Int,
    #[default]
    Str,
    Lob,
}

/// Diagnostic record for the last operation on a connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// SQLSTATE, "00000" when the last operation succeeded
    pub sql_state: String,
    /// Driver-specific error code
    pub driver_code: Option<i64>,
    /// Driver-specific error message
    pub message: Option<String>,
}

impl ErrorInfo {
    /// Record for a connection with no outstanding error.
    pub fn success() -> Self {
        Self {
            sql_state: SQLSTATE_SUCCESS.to_string(),
            driver_code: None,
            message: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.sql_state == SQLSTATE_SUCCESS
    }
}

impl Default for ErrorInfo {
    fn default() -> Self {
        Self::success()
    }
}
