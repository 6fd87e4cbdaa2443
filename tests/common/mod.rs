//! Shared fixtures for integration tests.
//!
//! `ScriptedConnection` is an in-test driver whose connect/execute/begin
//! failures are toggled through a shared [`Script`], so retry behavior can be
//! exercised without a real server dropping connections.

#![allow(dead_code)]

use db_retry_wrapper::db::{DatabaseConnection, RetryingConnection, SqliteConnection, Statement};
use db_retry_wrapper::error::{DbError, DbResult};
use db_retry_wrapper::models::{
    Attribute, AttributeValue, Bindings, ErrorInfo, ErrorMode, ParamType, Row, SQLSTATE_SUCCESS,
    StatementOptions,
};
use std::cell::RefCell;
use std::rc::Rc;

/// Failure kinds a script can inject.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Injected {
    /// MySQL-style "server has gone away"
    GoneAway,
    /// A statement error unrelated to the connection
    MissingTable,
}

impl Injected {
    pub fn error(self) -> DbError {
        match self {
            Self::GoneAway => DbError::database(
                "SQLSTATE[HY000]: General error: 2006 MySQL server has gone away",
                Some("HY000".to_string()),
                "Reconnect",
            ),
            Self::MissingTable => DbError::database(
                "SQLSTATE[42S02]: Base table or view not found: 1146 Table 'test.notatable' doesn't exist",
                Some("42S02".to_string()),
                "Check the table name",
            ),
        }
    }
}

#[derive(Debug, Default)]
pub struct Script {
    pub on_connect: Option<Injected>,
    pub on_execute: Option<Injected>,
    pub on_begin: Option<Injected>,
    /// Fail only the next N executions, then succeed.
    pub execute_failures_left: Option<u32>,
    pub connects: u32,
    pub connect_calls: u32,
    pub executions: u32,
    /// Error modes set on handles, in order.
    pub handle_modes: Vec<ErrorMode>,
    pub last_sql: Option<String>,
}

pub type SharedScript = Rc<RefCell<Script>>;

pub struct ScriptedConnection {
    id: u32,
    script: SharedScript,
    error_mode: ErrorMode,
    in_transaction: bool,
}

impl ScriptedConnection {
    pub fn id(&self) -> u32 {
        self.id
    }
}

#[derive(Debug)]
pub struct ScriptedStatement {
    sql: String,
    script: SharedScript,
    rows: Vec<Row>,
}

impl Statement for ScriptedStatement {
    fn sql(&self) -> &str {
        &self.sql
    }

    fn execute(&mut self, _bindings: Option<&Bindings>) -> DbResult<bool> {
        let mut script = self.script.borrow_mut();
        script.executions += 1;
        script.last_sql = Some(self.sql.clone());

        let injected = match script.execute_failures_left {
            Some(0) => None,
            Some(n) => {
                script.execute_failures_left = Some(n - 1);
                script.on_execute
            }
            None => script.on_execute,
        };
        match injected {
            Some(kind) => Err(kind.error()),
            None => {
                let mut row = Row::new();
                row.insert("ok".to_string(), true.into());
                self.rows = vec![row];
                Ok(true)
            }
        }
    }

    fn fetch(&mut self) -> DbResult<Option<Row>> {
        Ok(if self.rows.is_empty() {
            None
        } else {
            Some(self.rows.remove(0))
        })
    }

    fn fetch_all(&mut self) -> DbResult<Vec<Row>> {
        Ok(std::mem::take(&mut self.rows))
    }

    fn row_count(&self) -> u64 {
        0
    }

    fn column_count(&self) -> usize {
        1
    }
}

impl DatabaseConnection for ScriptedConnection {
    type Statement = ScriptedStatement;

    fn prepare(&mut self, sql: &str, _options: &StatementOptions) -> DbResult<ScriptedStatement> {
        Ok(ScriptedStatement {
            sql: sql.to_string(),
            script: Rc::clone(&self.script),
            rows: Vec::new(),
        })
    }

    fn query(&mut self, sql: &str) -> DbResult<ScriptedStatement> {
        let mut statement = self.prepare(sql, &StatementOptions::default())?;
        statement.execute(None)?;
        Ok(statement)
    }

    fn exec(&mut self, _sql: &str) -> DbResult<u64> {
        Ok(1)
    }

    fn begin_transaction(&mut self) -> DbResult<bool> {
        if let Some(kind) = self.script.borrow().on_begin {
            return Err(kind.error());
        }
        self.in_transaction = true;
        Ok(true)
    }

    fn commit(&mut self) -> DbResult<bool> {
        if !self.in_transaction {
            return Err(DbError::database("There is no active transaction", None, ""));
        }
        self.in_transaction = false;
        Ok(true)
    }

    fn rollback(&mut self) -> DbResult<bool> {
        self.commit()
    }

    fn in_transaction(&self) -> bool {
        self.in_transaction
    }

    fn error_code(&mut self) -> DbResult<String> {
        Ok(SQLSTATE_SUCCESS.to_string())
    }

    fn error_info(&mut self) -> DbResult<ErrorInfo> {
        Ok(ErrorInfo::success())
    }

    fn get_attribute(&mut self, attribute: Attribute) -> DbResult<AttributeValue> {
        match attribute {
            Attribute::ErrorMode => Ok(self.error_mode.into()),
            Attribute::DriverName => Ok("scripted".into()),
            other => Err(DbError::invalid_input(format!("{} not available", other))),
        }
    }

    fn set_attribute(&mut self, attribute: Attribute, value: AttributeValue) -> DbResult<bool> {
        match (attribute, value.as_error_mode()) {
            (Attribute::ErrorMode, Some(mode)) => {
                self.error_mode = mode;
                self.script.borrow_mut().handle_modes.push(mode);
                Ok(true)
            }
            _ => Err(DbError::invalid_input("read-only attribute")),
        }
    }

    fn quote(&mut self, value: &str, _param_type: ParamType) -> DbResult<String> {
        Ok(format!("'{}'", value.replace('\'', "''")))
    }

    fn last_insert_id(&mut self, _name: Option<&str>) -> DbResult<String> {
        Ok(self.id.to_string())
    }
}

/// A retrying connection over the scripted driver, plus the script controlling it.
pub fn scripted() -> (RetryingConnection<ScriptedConnection>, SharedScript) {
    let script: SharedScript = Rc::new(RefCell::new(Script::default()));
    let shared = Rc::clone(&script);

    let conn = RetryingConnection::new(move || -> DbResult<ScriptedConnection> {
        let mut s = shared.borrow_mut();
        s.connect_calls += 1;
        if let Some(kind) = s.on_connect {
            return Err(kind.error());
        }
        s.connects += 1;
        Ok(ScriptedConnection {
            id: s.connects,
            script: Rc::clone(&shared),
            error_mode: ErrorMode::Silent,
            in_transaction: false,
        })
    });

    (conn, script)
}

/// Records every report handed to the failure notifier.
#[derive(Debug, Default)]
pub struct Reports {
    pub calls: u32,
    pub attempts: Vec<u32>,
    pub statements: Vec<String>,
    pub parameters: Vec<Option<Bindings>>,
}

pub type SharedReports = Rc<RefCell<Reports>>;

pub const USERS_SCHEMA: &str = "
    CREATE TABLE users (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL,
        email TEXT NOT NULL UNIQUE
    );
    INSERT INTO users (name, email) VALUES ('One', 'one@example.com');
    INSERT INTO users (name, email) VALUES ('Two', 'two@example.com');
";

/// Open a SQLite connection and create the two-row `users` table.
pub fn sqlite_with_users(url: &str) -> DbResult<SqliteConnection> {
    let mut conn = SqliteConnection::open(url)?;
    conn.exec(USERS_SCHEMA)?;
    Ok(conn)
}

/// A retrying connection whose connector opens an in-memory database seeded
/// with `users`.
pub fn sqlite_memory() -> RetryingConnection<SqliteConnection> {
    RetryingConnection::new(|| sqlite_with_users("sqlite::memory:"))
}
