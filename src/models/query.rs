//! Query-related data models.
//!
//! This module defines the parameter, binding and row types that flow through
//! `run_query` and the driver statements.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;

/// A fetched row, keyed by column name.
pub type Row = serde_json::Map<String, JsonValue>;

/// A parameter value for parameterized queries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum QueryParam {
    /// NULL value
    Null,
    /// Boolean value
    Bool(bool),
    /// Integer value (stored as i64 for maximum range)
    Int(i64),
    /// Floating point value
    Float(f64),
    /// String value
    String(String),
    /// Binary data (base64 encoded in JSON)
    #[serde(with = "base64_bytes")]
    Bytes(Vec<u8>),
}

impl QueryParam {
    /// Check if this parameter is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Get the type name of this parameter for debugging.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::String(_) => "string",
            Self::Bytes(_) => "bytes",
        }
    }

    /// Convert a JSON value into a parameter.
    ///
    /// Arrays and objects are bound as their JSON text.
    pub fn from_json(value: JsonValue) -> Self {
        match value {
            JsonValue::Null => Self::Null,
            JsonValue::Bool(b) => Self::Bool(b),
            JsonValue::Number(n) => match n.as_i64() {
                Some(i) => Self::Int(i),
                None => Self::Float(n.as_f64().unwrap_or_default()),
            },
            JsonValue::String(s) => Self::String(s),
            other => Self::String(other.to_string()),
        }
    }
}

impl From<bool> for QueryParam {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for QueryParam {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<i32> for QueryParam {
    fn from(value: i32) -> Self {
        Self::Int(value.into())
    }
}

impl From<f64> for QueryParam {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for QueryParam {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for QueryParam {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<Vec<u8>> for QueryParam {
    fn from(value: Vec<u8>) -> Self {
        Self::Bytes(value)
    }
}

impl<T: Into<QueryParam>> From<Option<T>> for QueryParam {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Self::Null)
    }
}

/// Custom serialization for binary data as base64.
mod base64_bytes {
    use base64::{Engine as _, engine::general_purpose::STANDARD};
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S>(bytes: &Vec<u8>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        STANDARD.encode(bytes).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        STANDARD.decode(&s).map_err(serde::de::Error::custom)
    }
}

/// Values bound to a statement: either by position or by placeholder name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Bindings {
    Positional(Vec<QueryParam>),
    /// Keys may be given with or without the leading `:`.
    Named(#[serde(deserialize_with = "normalized_keys")] BTreeMap<String, QueryParam>),
}

impl Bindings {
    /// Build positional bindings from anything convertible to parameters.
    pub fn positional<I, P>(params: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<QueryParam>,
    {
        Self::Positional(params.into_iter().map(Into::into).collect())
    }

    /// Build named bindings from `(name, value)` pairs.
    pub fn named<I, K, P>(params: I) -> Self
    where
        I: IntoIterator<Item = (K, P)>,
        K: Into<String>,
        P: Into<QueryParam>,
    {
        Self::Named(
            params
                .into_iter()
                .map(|(k, v)| {
                    let key: String = k.into();
                    (normalize_name(&key).to_string(), v.into())
                })
                .collect(),
        )
    }

    /// Number of bound values.
    pub fn len(&self) -> usize {
        match self {
            Self::Positional(params) => params.len(),
            Self::Named(params) => params.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Look up a named value, accepting `:name`, `@name`, `$name` or `name`.
    pub fn get_named(&self, name: &str) -> Option<&QueryParam> {
        match self {
            Self::Named(params) => params.get(normalize_name(name)),
            Self::Positional(_) => None,
        }
    }
}

impl From<Vec<QueryParam>> for Bindings {
    fn from(params: Vec<QueryParam>) -> Self {
        Self::Positional(params)
    }
}

impl From<BTreeMap<String, QueryParam>> for Bindings {
    fn from(params: BTreeMap<String, QueryParam>) -> Self {
        Self::Named(normalize_keys(params))
    }
}

fn normalize_name(name: &str) -> &str {
    name.trim_start_matches([':', '@', '$'])
}

fn normalize_keys(params: BTreeMap<String, QueryParam>) -> BTreeMap<String, QueryParam> {
    params
        .into_iter()
        .map(|(k, v)| (normalize_name(&k).to_string(), v))
        .collect()
}

fn normalized_keys<'de, D>(deserializer: D) -> Result<BTreeMap<String, QueryParam>, D::Error>
where
    D: Deserializer<'de>,
{
    BTreeMap::deserialize(deserializer).map(normalize_keys)
}

/// Driver options applied when preparing a statement.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatementOptions {
    /// Whether the driver may cache the prepared statement for reuse.
    /// Drivers decide the default when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub persistent: Option<bool>,
}

impl StatementOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set whether the prepared statement is cached.
    pub fn with_persistent(mut self, persistent: bool) -> Self {
        self.persistent = Some(persistent);
        self
    }
}
