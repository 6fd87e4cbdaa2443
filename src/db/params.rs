//! Parameter binding utilities for database queries.
//!
//! This module resolves [`Bindings`] into the positional order a driver binds
//! them in, and binds `QueryParam` values to sqlx SQLite queries.

use crate::error::{DbError, DbResult};
use crate::models::{Bindings, QueryParam};
use sqlx::Sqlite;
use sqlx::sqlite::SqliteArguments;

/// Named placeholders (`:name`, `@name`, `$name`) in order of first appearance.
///
/// Placeholders inside string literals, quoted identifiers and comments are
/// ignored. Names are returned without their prefix character.
pub fn named_placeholders(sql: &str) -> Vec<String> {
    rewrite_named_placeholders(sql).1
}

/// Replace named placeholders with numbered `?N` placeholders.
///
/// Every occurrence of the same name maps to the same number, numbered by
/// first appearance. Returns the rewritten SQL and the names in number order.
pub fn rewrite_named_placeholders(sql: &str) -> (String, Vec<String>) {
    let chars: Vec<char> = sql.chars().collect();
    let mut out = String::with_capacity(sql.len());
    let mut names: Vec<String> = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            '\'' | '"' | '`' => {
                let mut end = i + 1;
                while end < chars.len() && chars[end] != c {
                    end += 1;
                }
                let end = (end + 1).min(chars.len());
                out.extend(&chars[i..end]);
                i = end;
            }
            '-' if chars.get(i + 1) == Some(&'-') => {
                let mut end = i;
                while end < chars.len() && chars[end] != '\n' {
                    end += 1;
                }
                out.extend(&chars[i..end]);
                i = end;
            }
            '/' if chars.get(i + 1) == Some(&'*') => {
                let mut end = i + 2;
                while end < chars.len() && !(chars[end] == '*' && chars.get(end + 1) == Some(&'/')) {
                    end += 1;
                }
                let end = (end + 2).min(chars.len());
                out.extend(&chars[i..end]);
                i = end;
            }
            // `::type` casts are not placeholders
            ':' if chars.get(i + 1) == Some(&':') => {
                out.push_str("::");
                i += 2;
            }
            ':' | '@' | '$' if chars.get(i + 1).is_some_and(|n| is_name_start(*n)) => {
                let start = i + 1;
                let mut end = start;
                while end < chars.len() && is_name_char(chars[end]) {
                    end += 1;
                }
                let name: String = chars[start..end].iter().collect();
                let number = match names.iter().position(|n| *n == name) {
                    Some(pos) => pos + 1,
                    None => {
                        names.push(name);
                        names.len()
                    }
                };
                out.push('?');
                out.push_str(&number.to_string());
                i = end;
            }
            _ => {
                out.push(c);
                i += 1;
            }
        }
    }

    (out, names)
}

// SQLite accepts digits and non-ASCII characters in parameter names (`:1`, `@été`)
fn is_name_start(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

fn is_name_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Flatten bindings into positional order for `sql`.
///
/// Positional bindings are returned as-is. Named bindings are ordered by the
/// first appearance of each placeholder; a placeholder without a value is an
/// input error.
pub fn resolve_bindings(sql: &str, bindings: Option<&Bindings>) -> DbResult<Vec<QueryParam>> {
    match bindings {
        None => Ok(Vec::new()),
        Some(Bindings::Positional(params)) => Ok(params.clone()),
        Some(named @ Bindings::Named(_)) => named_placeholders(sql)
            .iter()
            .map(|name| {
                named.get_named(name).cloned().ok_or_else(|| {
                    DbError::invalid_input(format!("No value bound for placeholder :{}", name))
                })
            })
            .collect(),
    }
}

/// Bind a parameter to a SQLite query.
pub(crate) fn bind_sqlite_param<'q>(
    query: sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>>,
    param: &'q QueryParam,
) -> sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>> {
    match param {
        QueryParam::Null => query.bind(None::<String>),
        QueryParam::Bool(v) => query.bind(*v),
        QueryParam::Int(v) => query.bind(*v),
        QueryParam::Float(v) => query.bind(*v),
        QueryParam::String(v) => query.bind(v.as_str()),
        QueryParam::Bytes(v) => query.bind(v.as_slice()),
    }
}
