//! Data models shared by the connection wrapper and the drivers.
//!
//! This module re-exports all model types used throughout the crate.

pub mod connection;
pub mod query;

// Re-export commonly used types
pub use connection::{
    Attribute, AttributeValue, ErrorInfo, ErrorMode, ParamType, SQLSTATE_GENERAL_ERROR,
    SQLSTATE_SUCCESS,
};
pub use query::{Bindings, QueryParam, Row, StatementOptions};
