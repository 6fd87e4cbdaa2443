//! SQLite driver built on sqlx.
//!
//! [`SqliteConnection`] exposes a blocking [`DatabaseConnection`] over an async
//! `sqlx::SqliteConnection`. Each connection owns a current-thread tokio runtime
//! that drives the sqlx futures to completion on the calling thread. The
//! connection and the statements it prepares share one session, so handles are
//! deliberately `!Send`: one connection, one owner.

use crate::db::connection::{DatabaseConnection, Statement};
use crate::db::params::{bind_sqlite_param, resolve_bindings, rewrite_named_placeholders};
use crate::db::types::RowToJson;
use crate::error::{DbError, DbResult};
use crate::models::{
    Attribute, AttributeValue, Bindings, ErrorInfo, ErrorMode, ParamType, QueryParam, Row,
    SQLSTATE_GENERAL_ERROR, StatementOptions,
};
use sqlx::sqlite::SqliteConnectOptions;
use sqlx::{ConnectOptions, Executor};
use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use std::str::FromStr;
use tokio::runtime::Runtime;
use tracing::{debug, warn};

/// Driver name reported through [`Attribute::DriverName`].
pub const DRIVER_NAME: &str = "sqlite";

/// Run a sqlx future against the session's connection and record the outcome
/// in the session's error info.
macro_rules! with_conn {
    ($session:expr, |$conn:ident| $body:expr) => {{
        let session: &mut Session = &mut $session;
        let result = {
            let Session {
                runtime,
                conn: $conn,
                ..
            } = &mut *session;
            runtime.block_on($body)
        };
        session.record(result)
    }};
}

struct Session {
    // dropped before the runtime that drives it
    conn: sqlx::SqliteConnection,
    runtime: Runtime,
    error_mode: ErrorMode,
    last_error: ErrorInfo,
    in_transaction: bool,
    timeout_secs: i64,
}

impl Session {
    fn record<T>(&mut self, result: Result<T, sqlx::Error>) -> DbResult<T> {
        match result {
            Ok(value) => {
                self.last_error = ErrorInfo::success();
                Ok(value)
            }
            Err(err) => {
                self.last_error = error_info_for(&err);
                Err(DbError::from(err))
            }
        }
    }
}

fn error_info_for(err: &sqlx::Error) -> ErrorInfo {
    match err {
        sqlx::Error::Database(db_err) => ErrorInfo {
            sql_state: SQLSTATE_GENERAL_ERROR.to_string(),
            driver_code: db_err.code().and_then(|c| c.parse().ok()),
            message: Some(db_err.message().to_string()),
        },
        other => ErrorInfo {
            sql_state: SQLSTATE_GENERAL_ERROR.to_string(),
            driver_code: None,
            message: Some(other.to_string()),
        },
    }
}

type SharedSession = Rc<RefCell<Session>>;

/// A live SQLite connection.
pub struct SqliteConnection {
    session: SharedSession,
}

impl SqliteConnection {
    /// Open a connection from a URL such as `sqlite::memory:` or
    /// `sqlite:data.db?mode=rwc`.
    pub fn open(url: &str) -> DbResult<Self> {
        let options = SqliteConnectOptions::from_str(url)?;
        Self::open_with(options)
    }

    /// Open a connection from explicit connect options.
    pub fn open_with(options: SqliteConnectOptions) -> DbResult<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| DbError::internal(format!("Failed to start runtime: {}", e)))?;

        let conn = runtime.block_on(options.connect())?;
        debug!(driver = DRIVER_NAME, "Opened connection");

        Ok(Self {
            session: Rc::new(RefCell::new(Session {
                conn,
                runtime,
                error_mode: ErrorMode::default(),
                last_error: ErrorInfo::success(),
                in_transaction: false,
                timeout_secs: 0,
            })),
        })
    }

    fn run_control(&mut self, sql: &'static str) -> DbResult<()> {
        let mut session = self.session.borrow_mut();
        with_conn!(session, |conn| conn.execute(sql)).map(|_| ())
    }
}

impl std::fmt::Debug for SqliteConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let session = self.session.borrow();
        f.debug_struct("SqliteConnection")
            .field("error_mode", &session.error_mode)
            .field("in_transaction", &session.in_transaction)
            .finish()
    }
}

impl DatabaseConnection for SqliteConnection {
    type Statement = SqliteStatement;

    fn prepare(&mut self, sql: &str, options: &StatementOptions) -> DbResult<SqliteStatement> {
        let (expanded_sql, _) = rewrite_named_placeholders(sql);

        // Preparing against the live database surfaces missing tables and
        // syntax errors before execution.
        let column_count = {
            let mut session = self.session.borrow_mut();
            with_conn!(session, |conn| conn.prepare(expanded_sql.as_str()))
                .map(|stmt| sqlx::Statement::columns(&stmt).len())?
        };

        Ok(SqliteStatement {
            session: Rc::clone(&self.session),
            sql: sql.to_string(),
            expanded_sql,
            persistent: options.persistent.unwrap_or(true),
            column_count,
            rows: VecDeque::new(),
            rows_affected: 0,
        })
    }

    fn query(&mut self, sql: &str) -> DbResult<SqliteStatement> {
        let mut statement = self.prepare(sql, &StatementOptions::default())?;
        statement.execute(None)?;
        Ok(statement)
    }

    fn exec(&mut self, sql: &str) -> DbResult<u64> {
        let mut session = self.session.borrow_mut();
        with_conn!(session, |conn| sqlx::raw_sql(sql).execute(&mut *conn))
            .map(|done| done.rows_affected())
    }

    fn begin_transaction(&mut self) -> DbResult<bool> {
        self.run_control("BEGIN")?;
        self.session.borrow_mut().in_transaction = true;
        Ok(true)
    }

    fn commit(&mut self) -> DbResult<bool> {
        self.run_control("COMMIT")?;
        self.session.borrow_mut().in_transaction = false;
        Ok(true)
    }

    fn rollback(&mut self) -> DbResult<bool> {
        self.run_control("ROLLBACK")?;
        self.session.borrow_mut().in_transaction = false;
        Ok(true)
    }

    fn in_transaction(&self) -> bool {
        self.session.borrow().in_transaction
    }

    fn error_code(&mut self) -> DbResult<String> {
        Ok(self.session.borrow().last_error.sql_state.clone())
    }

    fn error_info(&mut self) -> DbResult<ErrorInfo> {
        Ok(self.session.borrow().last_error.clone())
    }

    fn get_attribute(&mut self, attribute: Attribute) -> DbResult<AttributeValue> {
        let mut session = self.session.borrow_mut();
        match attribute {
            Attribute::ErrorMode => Ok(AttributeValue::ErrorMode(session.error_mode)),
            Attribute::DriverName => Ok(AttributeValue::Text(DRIVER_NAME.to_string())),
            Attribute::ServerVersion => with_conn!(session, |conn| {
                sqlx::query_scalar::<_, String>("SELECT sqlite_version()").fetch_one(&mut *conn)
            })
            .map(AttributeValue::Text),
            Attribute::Timeout => Ok(AttributeValue::Int(session.timeout_secs)),
            Attribute::Autocommit => Ok(AttributeValue::Bool(!session.in_transaction)),
        }
    }

    fn set_attribute(&mut self, attribute: Attribute, value: AttributeValue) -> DbResult<bool> {
        let mut session = self.session.borrow_mut();
        match attribute {
            Attribute::ErrorMode => {
                let mode = value.as_error_mode().ok_or_else(|| {
                    DbError::invalid_input(format!("Expected an error mode, got {:?}", value))
                })?;
                session.error_mode = mode;
                Ok(true)
            }
            Attribute::Timeout => {
                let secs = value
                    .as_int()
                    .filter(|secs| *secs >= 0)
                    .ok_or_else(|| {
                        DbError::invalid_input(format!(
                            "Expected a non-negative timeout in seconds, got {:?}",
                            value
                        ))
                    })?;
                let pragma = format!("PRAGMA busy_timeout = {}", secs.saturating_mul(1000));
                with_conn!(session, |conn| sqlx::raw_sql(&pragma).execute(&mut *conn))?;
                session.timeout_secs = secs;
                Ok(true)
            }
            Attribute::DriverName | Attribute::ServerVersion | Attribute::Autocommit => Err(
                DbError::invalid_input(format!("Attribute {} is read-only", attribute)),
            ),
        }
    }

    fn quote(&mut self, value: &str, _param_type: ParamType) -> DbResult<String> {
        Ok(format!("'{}'", value.replace('\'', "''")))
    }

    fn last_insert_id(&mut self, _name: Option<&str>) -> DbResult<String> {
        let mut session = self.session.borrow_mut();
        with_conn!(session, |conn| {
            sqlx::query_scalar::<_, i64>("SELECT last_insert_rowid()").fetch_one(&mut *conn)
        })
        .map(|id| id.to_string())
    }
}

/// A statement prepared on a [`SqliteConnection`].
///
/// Rows are buffered on execution and handed out by `fetch`/`fetch_all`.
pub struct SqliteStatement {
    session: SharedSession,
    sql: String,
    /// `sql` with named placeholders rewritten to `?N`
    expanded_sql: String,
    persistent: bool,
    column_count: usize,
    rows: VecDeque<Row>,
    rows_affected: u64,
}

impl SqliteStatement {
    fn run(&self, params: &[QueryParam]) -> DbResult<(Vec<Row>, u64)> {
        let mut session = self.session.borrow_mut();
        let mut query = sqlx::query(self.expanded_sql.as_str()).persistent(self.persistent);
        for param in params {
            query = bind_sqlite_param(query, param);
        }

        if self.column_count > 0 {
            let rows = with_conn!(session, |conn| query.fetch_all(&mut *conn))?;
            let count = rows.len() as u64;
            Ok((rows.iter().map(|r| r.to_json_map()).collect(), count))
        } else {
            let done = with_conn!(session, |conn| query.execute(&mut *conn))?;
            Ok((Vec::new(), done.rows_affected()))
        }
    }
}

impl std::fmt::Debug for SqliteStatement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStatement")
            .field("sql", &self.sql)
            .field("column_count", &self.column_count)
            .field("buffered_rows", &self.rows.len())
            .finish()
    }
}

impl Statement for SqliteStatement {
    fn sql(&self) -> &str {
        &self.sql
    }

    fn execute(&mut self, bindings: Option<&Bindings>) -> DbResult<bool> {
        self.rows.clear();
        self.rows_affected = 0;

        let outcome = resolve_bindings(&self.sql, bindings).and_then(|params| self.run(&params));
        match outcome {
            Ok((rows, affected)) => {
                self.rows = rows.into();
                self.rows_affected = affected;
                Ok(true)
            }
            Err(err) => match self.session.borrow().error_mode {
                ErrorMode::Exception => Err(err),
                ErrorMode::Warning => {
                    warn!(sql = %self.sql, error = %err, "Statement failed");
                    Ok(false)
                }
                ErrorMode::Silent => Ok(false),
            },
        }
    }

    fn fetch(&mut self) -> DbResult<Option<Row>> {
        Ok(self.rows.pop_front())
    }

    fn fetch_all(&mut self) -> DbResult<Vec<Row>> {
        Ok(self.rows.drain(..).collect())
    }

    fn row_count(&self) -> u64 {
        self.rows_affected
    }

    fn column_count(&self) -> usize {
        self.column_count
    }
}
