//! Driver-facing connection interface.
//!
//! [`DatabaseConnection`] is the subset of driver operations the retrying
//! wrapper needs. Drivers implement it for their live handles, and
//! [`RetryingConnection`](crate::db::RetryingConnection) implements it as well so
//! it can be substituted wherever a plain connection is expected.

use crate::error::DbResult;
use crate::models::{
    Attribute, AttributeValue, Bindings, ErrorInfo, ParamType, Row, StatementOptions,
};

/// A prepared statement bound to the connection that created it.
pub trait Statement {
    /// SQL text the statement was prepared from.
    fn sql(&self) -> &str;

    /// Execute with the given bindings.
    ///
    /// Returns `Ok(false)` on failure when the connection is not in
    /// [`ErrorMode::Exception`](crate::models::ErrorMode::Exception).
    fn execute(&mut self, bindings: Option<&Bindings>) -> DbResult<bool>;

    /// Next buffered row, or `None` when exhausted.
    fn fetch(&mut self) -> DbResult<Option<Row>>;

    /// All remaining rows.
    fn fetch_all(&mut self) -> DbResult<Vec<Row>>;

    /// Rows affected by the last execution.
    fn row_count(&self) -> u64;

    fn column_count(&self) -> usize;
}

/// A live database connection.
pub trait DatabaseConnection {
    type Statement: Statement;

    /// Prepare a statement without executing it.
    ///
    /// A statement that cannot be prepared is returned as `Err` whatever the
    /// error mode; the failure is still recorded for
    /// [`error_code`](Self::error_code) and [`error_info`](Self::error_info).
    fn prepare(&mut self, sql: &str, options: &StatementOptions) -> DbResult<Self::Statement>;

    /// Prepare and execute in one step, without bindings.
    fn query(&mut self, sql: &str) -> DbResult<Self::Statement>;

    /// Execute raw SQL and return the number of affected rows.
    fn exec(&mut self, sql: &str) -> DbResult<u64>;

    fn begin_transaction(&mut self) -> DbResult<bool>;

    fn commit(&mut self) -> DbResult<bool>;

    fn rollback(&mut self) -> DbResult<bool>;

    fn in_transaction(&self) -> bool;

    /// SQLSTATE of the last operation ("00000" on success).
    fn error_code(&mut self) -> DbResult<String>;

    fn error_info(&mut self) -> DbResult<ErrorInfo>;

    fn get_attribute(&mut self, attribute: Attribute) -> DbResult<AttributeValue>;

    fn set_attribute(&mut self, attribute: Attribute, value: AttributeValue) -> DbResult<bool>;

    /// Quote a string literal for direct inclusion in SQL.
    fn quote(&mut self, value: &str, param_type: ParamType) -> DbResult<String>;

    /// Id of the last inserted row (or sequence value for `name`).
    fn last_insert_id(&mut self, name: Option<&str>) -> DbResult<String>;
}

/// Factory producing fresh live connections.
///
/// Implemented for any `FnMut() -> DbResult<C>` closure.
pub trait Connector<C> {
    fn connect(&mut self) -> DbResult<C>;
}

impl<C, F> Connector<C> for F
where
    F: FnMut() -> DbResult<C>,
{
    fn connect(&mut self) -> DbResult<C> {
        self()
    }
}
