//! Retrying connection wrapper.
//!
//! [`RetryingConnection`] owns a live driver connection plus the connector that
//! created it. Statements run through [`RetryingConnection::run_query`] are
//! retried on a fresh connection when the failure is classified as a lost
//! connection, unless a transaction is open: replaying a statement on a new
//! session would silently drop the transaction's earlier work.
//!
//! Terminal failures are reported once to an optional [`FailureNotifier`] and
//! returned as [`DbError::ConnectionLost`].

use crate::db::connection::{Connector, DatabaseConnection, Statement};
use crate::db::detector::{ConnectionLossPolicy, LostConnectionDetector};
use crate::error::{BoxError, ConnectionFailure, DbError, DbResult};
use crate::models::{
    Attribute, AttributeValue, Bindings, ErrorInfo, ErrorMode, ParamType, StatementOptions,
};
use tracing::{debug, error, info, warn};

/// Default bound on attempts per `run_query` call.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Receives the report of every terminal connection failure.
///
/// Implemented for any `FnMut(&ConnectionFailure) -> Result<(), BoxError>`.
pub trait FailureNotifier {
    fn notify(&mut self, failure: &ConnectionFailure) -> Result<(), BoxError>;
}

impl<F> FailureNotifier for F
where
    F: FnMut(&ConnectionFailure) -> Result<(), BoxError>,
{
    fn notify(&mut self, failure: &ConnectionFailure) -> Result<(), BoxError> {
        self(failure)
    }
}

/// A connection that reconnects and retries statements after connection loss.
pub struct RetryingConnection<C: DatabaseConnection> {
    live: Option<C>,
    connector: Box<dyn Connector<C>>,
    max_attempts: u32,
    current_attempt: u32,
    transaction_active: bool,
    notifier: Option<Box<dyn FailureNotifier>>,
    detector: Box<dyn LostConnectionDetector>,
}

impl<C: DatabaseConnection> RetryingConnection<C> {
    /// Create a wrapper around `connector`. No connection is opened until the
    /// first operation needs one.
    pub fn new(connector: impl Connector<C> + 'static) -> Self {
        Self {
            live: None,
            connector: Box::new(connector),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            current_attempt: 1,
            transaction_active: false,
            notifier: None,
            detector: Box::new(ConnectionLossPolicy::default()),
        }
    }

    /// Register the hook invoked once per terminal connection failure.
    pub fn with_failure_notifier(mut self, notifier: impl FailureNotifier + 'static) -> Self {
        self.notifier = Some(Box::new(notifier));
        self
    }

    /// Replace the default [`ConnectionLossPolicy`].
    pub fn with_detector(mut self, detector: impl LostConnectionDetector + 'static) -> Self {
        self.detector = Box::new(detector);
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.set_max_attempts(max_attempts);
        self
    }

    /// Set the attempt bound. Zero is treated as one.
    pub fn set_max_attempts(&mut self, max_attempts: u32) {
        self.max_attempts = max_attempts.max(1);
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Attempt counter of the most recent `run_query` call.
    pub fn current_attempt(&self) -> u32 {
        self.current_attempt
    }

    /// Whether a live connection is currently held.
    pub fn is_connected(&self) -> bool {
        self.live.is_some()
    }

    /// Prepare and execute `sql`, reconnecting and retrying on connection loss.
    ///
    /// Failures that are not connection loss are returned unchanged. When the
    /// connection is lost inside a transaction, or the attempts are exhausted,
    /// the failure is reported to the notifier and returned as
    /// [`DbError::ConnectionLost`].
    pub fn run_query(
        &mut self,
        sql: &str,
        bindings: Option<Bindings>,
        options: Option<&StatementOptions>,
    ) -> DbResult<C::Statement> {
        self.current_attempt = 1;
        let options = options.cloned().unwrap_or_default();
        let mut force_reconnect = false;

        let cause = loop {
            debug!(
                attempt = self.current_attempt,
                max_attempts = self.max_attempts,
                sql = %sql,
                "Executing statement"
            );

            let err = match self.attempt(sql, bindings.as_ref(), &options, force_reconnect) {
                Ok(statement) => return Ok(statement),
                Err(err) => err,
            };

            if !self.detector.is_lost_connection(&err) {
                self.transaction_active = false;
                return Err(err);
            }

            warn!(
                attempt = self.current_attempt,
                in_transaction = self.transaction_active,
                error = %err,
                "Connection lost"
            );

            if self.transaction_active || self.max_attempts <= 1 {
                break err;
            }

            force_reconnect = true;
            self.current_attempt += 1;
            if self.current_attempt >= self.max_attempts {
                break err;
            }
        };

        Err(self.fail(cause, sql, bindings))
    }

    fn attempt(
        &mut self,
        sql: &str,
        bindings: Option<&Bindings>,
        options: &StatementOptions,
        force_reconnect: bool,
    ) -> DbResult<C::Statement> {
        let conn = self.connection(force_reconnect)?;
        let mut statement = conn.prepare(sql, options)?;
        statement.execute(bindings)?;
        Ok(statement)
    }

    /// The live connection, opening one if none is held or a reconnect is forced.
    fn connection(&mut self, force_reconnect: bool) -> DbResult<&mut C> {
        let conn = match self.live.take() {
            Some(conn) if !force_reconnect => conn,
            previous => {
                if previous.is_some() {
                    info!(attempt = self.current_attempt, "Reconnecting");
                }
                self.open()?
            }
        };
        Ok(self.live.insert(conn))
    }

    fn open(&mut self) -> DbResult<C> {
        let mut conn = self.connector.connect()?;
        conn.set_attribute(Attribute::ErrorMode, ErrorMode::Exception.into())?;
        debug!("Opened connection");
        Ok(conn)
    }

    fn live(&mut self) -> DbResult<&mut C> {
        self.connection(false)
    }

    fn fail(&mut self, cause: DbError, sql: &str, bindings: Option<Bindings>) -> DbError {
        self.transaction_active = false;
        let failure = ConnectionFailure::new(cause, self.current_attempt, sql, bindings);
        error!(
            attempts = failure.attempts(),
            sql = %sql,
            error = %failure.cause(),
            "Giving up on statement"
        );

        if let Some(notifier) = self.notifier.as_mut() {
            if let Err(e) = notifier.notify(&failure) {
                warn!(error = %e, "Failure notifier failed");
                return DbError::NotificationFailed {
                    source: e,
                    failure: Box::new(failure),
                };
            }
        }

        DbError::ConnectionLost(Box::new(failure))
    }
}

impl<C: DatabaseConnection> std::fmt::Debug for RetryingConnection<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryingConnection")
            .field("connected", &self.live.is_some())
            .field("max_attempts", &self.max_attempts)
            .field("current_attempt", &self.current_attempt)
            .field("transaction_active", &self.transaction_active)
            .finish()
    }
}

impl<C: DatabaseConnection> DatabaseConnection for RetryingConnection<C> {
    type Statement = C::Statement;

    fn prepare(&mut self, sql: &str, options: &StatementOptions) -> DbResult<C::Statement> {
        self.live()?.prepare(sql, options)
    }

    /// Always fails; statements go through [`RetryingConnection::run_query`].
    fn query(&mut self, _sql: &str) -> DbResult<C::Statement> {
        self.transaction_active = false;
        Err(DbError::unsupported("query"))
    }

    fn exec(&mut self, sql: &str) -> DbResult<u64> {
        self.live()?.exec(sql)
    }

    fn begin_transaction(&mut self) -> DbResult<bool> {
        let result = self.live().and_then(|conn| conn.begin_transaction());
        self.transaction_active = result.is_ok();
        result
    }

    fn commit(&mut self) -> DbResult<bool> {
        let result = self.live().and_then(|conn| conn.commit());
        self.transaction_active = false;
        result
    }

    fn rollback(&mut self) -> DbResult<bool> {
        let result = self.live().and_then(|conn| conn.rollback());
        self.transaction_active = false;
        result
    }

    fn in_transaction(&self) -> bool {
        self.transaction_active
    }

    fn error_code(&mut self) -> DbResult<String> {
        self.live()?.error_code()
    }

    fn error_info(&mut self) -> DbResult<ErrorInfo> {
        self.live()?.error_info()
    }

    fn get_attribute(&mut self, attribute: Attribute) -> DbResult<AttributeValue> {
        self.live()?.get_attribute(attribute)
    }

    fn set_attribute(&mut self, attribute: Attribute, value: AttributeValue) -> DbResult<bool> {
        self.live()?.set_attribute(attribute, value)
    }

    fn quote(&mut self, value: &str, param_type: ParamType) -> DbResult<String> {
        self.live()?.quote(value, param_type)
    }

    fn last_insert_id(&mut self, name: Option<&str>) -> DbResult<String> {
        self.live()?.last_insert_id(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Row;
    use std::cell::RefCell;
    use std::collections::VecDeque;
    use std::rc::Rc;

    #[derive(Debug, Default)]
    struct Counters {
        connects: u32,
        executions: u32,
        failures: VecDeque<DbError>,
    }

    struct FakeConnection {
        counters: Rc<RefCell<Counters>>,
        error_mode: ErrorMode,
    }

    #[derive(Debug)]
    struct FakeStatement {
        sql: String,
        counters: Rc<RefCell<Counters>>,
    }

    impl Statement for FakeStatement {
        fn sql(&self) -> &str {
            &self.sql
        }

        fn execute(&mut self, _bindings: Option<&Bindings>) -> DbResult<bool> {
            let mut counters = self.counters.borrow_mut();
            counters.executions += 1;
            match counters.failures.pop_front() {
                Some(err) => Err(err),
                None => Ok(true),
            }
        }

        fn fetch(&mut self) -> DbResult<Option<Row>> {
            Ok(None)
        }

        fn fetch_all(&mut self) -> DbResult<Vec<Row>> {
            Ok(Vec::new())
        }

        fn row_count(&self) -> u64 {
            0
        }

        fn column_count(&self) -> usize {
            0
        }
    }

    impl DatabaseConnection for FakeConnection {
        type Statement = FakeStatement;

        fn prepare(&mut self, sql: &str, _options: &StatementOptions) -> DbResult<FakeStatement> {
            Ok(FakeStatement {
                sql: sql.to_string(),
                counters: Rc::clone(&self.counters),
            })
        }

        fn query(&mut self, sql: &str) -> DbResult<FakeStatement> {
            self.prepare(sql, &StatementOptions::default())
        }

        fn exec(&mut self, _sql: &str) -> DbResult<u64> {
            Ok(0)
        }

        fn begin_transaction(&mut self) -> DbResult<bool> {
            Ok(true)
        }

        fn commit(&mut self) -> DbResult<bool> {
            Ok(true)
        }

        fn rollback(&mut self) -> DbResult<bool> {
            Ok(true)
        }

        fn in_transaction(&self) -> bool {
            false
        }

        fn error_code(&mut self) -> DbResult<String> {
            Ok(crate::models::SQLSTATE_SUCCESS.to_string())
        }

        fn error_info(&mut self) -> DbResult<ErrorInfo> {
            Ok(ErrorInfo::success())
        }

        fn get_attribute(&mut self, attribute: Attribute) -> DbResult<AttributeValue> {
            match attribute {
                Attribute::ErrorMode => Ok(self.error_mode.into()),
                other => Err(DbError::unsupported(other.name())),
            }
        }

        fn set_attribute(&mut self, attribute: Attribute, value: AttributeValue) -> DbResult<bool> {
            if attribute == Attribute::ErrorMode {
                self.error_mode = value.as_error_mode().unwrap_or_default();
            }
            Ok(true)
        }

        fn quote(&mut self, value: &str, _param_type: ParamType) -> DbResult<String> {
            Ok(format!("'{}'", value))
        }

        fn last_insert_id(&mut self, _name: Option<&str>) -> DbResult<String> {
            Ok("0".to_string())
        }
    }

    fn wrapper(failures: Vec<DbError>) -> (RetryingConnection<FakeConnection>, Rc<RefCell<Counters>>) {
        let counters = Rc::new(RefCell::new(Counters {
            failures: failures.into(),
            ..Default::default()
        }));
        let shared = Rc::clone(&counters);
        let conn = RetryingConnection::new(move || -> DbResult<FakeConnection> {
            shared.borrow_mut().connects += 1;
            Ok(FakeConnection {
                counters: Rc::clone(&shared),
                error_mode: ErrorMode::Silent,
            })
        });
        (conn, counters)
    }

    fn gone_away() -> DbError {
        DbError::database("MySQL server has gone away", Some("HY000".to_string()), "")
    }

    #[test]
    fn test_success_uses_one_connection() {
        let (mut conn, counters) = wrapper(vec![]);
        assert!(!conn.is_connected());
        let stmt = conn.run_query("SELECT 1", None, None).unwrap();
        assert_eq!(stmt.sql(), "SELECT 1");
        conn.run_query("SELECT 2", None, None).unwrap();
        assert_eq!(counters.borrow().connects, 1);
        assert_eq!(counters.borrow().executions, 2);
    }

    #[test]
    fn test_default_attempts_execute_twice() {
        let (mut conn, counters) = wrapper(vec![gone_away(), gone_away(), gone_away()]);
        let err = conn.run_query("SELECT 1", None, None).unwrap_err();
        let failure = err.connection_failure().unwrap();
        assert_eq!(failure.attempts(), 3);
        assert_eq!(counters.borrow().executions, 2);
        assert_eq!(counters.borrow().connects, 2);
    }

    #[test]
    fn test_recovers_after_reconnect() {
        let (mut conn, counters) = wrapper(vec![gone_away()]);
        conn.run_query("SELECT 1", None, None).unwrap();
        assert_eq!(conn.current_attempt(), 2);
        assert_eq!(counters.borrow().connects, 2);
    }

    #[test]
    fn test_single_attempt() {
        let (mut conn, counters) = wrapper(vec![gone_away()]);
        conn.set_max_attempts(0);
        assert_eq!(conn.max_attempts(), 1);
        let err = conn.run_query("SELECT 1", None, None).unwrap_err();
        assert_eq!(err.connection_failure().unwrap().attempts(), 1);
        assert_eq!(counters.borrow().executions, 1);
    }

    #[test]
    fn test_other_errors_pass_through() {
        let (mut conn, counters) = wrapper(vec![DbError::database(
            "no such table: notatable",
            Some("HY000".to_string()),
            "",
        )]);
        let err = conn.run_query("SELECT * FROM notatable", None, None).unwrap_err();
        assert!(matches!(err, DbError::Database { .. }));
        assert_eq!(counters.borrow().executions, 1);
    }

    #[test]
    fn test_transaction_blocks_retry() {
        let (mut conn, counters) = wrapper(vec![gone_away()]);
        conn.begin_transaction().unwrap();
        assert!(conn.in_transaction());
        let err = conn.run_query("SELECT 1", None, None).unwrap_err();
        assert_eq!(err.connection_failure().unwrap().attempts(), 1);
        assert_eq!(counters.borrow().executions, 1);
        assert!(!conn.in_transaction());
    }

    #[test]
    fn test_new_handles_use_exception_mode() {
        let (mut conn, _) = wrapper(vec![]);
        assert_eq!(
            conn.get_attribute(Attribute::ErrorMode).unwrap(),
            AttributeValue::ErrorMode(ErrorMode::Exception)
        );
    }

    #[test]
    fn test_query_is_unsupported() {
        let (mut conn, _) = wrapper(vec![]);
        conn.begin_transaction().unwrap();
        let err = conn.query("SELECT 1").unwrap_err();
        assert!(matches!(err, DbError::Unsupported { .. }));
        assert!(!conn.in_transaction());
    }
}
