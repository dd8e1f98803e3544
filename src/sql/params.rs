//! Values bound to composed statements.

use serde::Serialize;
use serde_json::Value;

/// A value that can be bound to a PostgreSQL query. Arrays are bound as
/// `text[]` / `int8[]` and compared with `= ANY(?)`.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum BindValue {
    Null,
    Bool(bool),
    I64(i64),
    F64(f64),
    Text(String),
    TextArray(Vec<String>),
    I64Array(Vec<i64>),
}

impl BindValue {
    pub fn text(s: impl Into<String>) -> Self {
        BindValue::Text(s.into())
    }

    /// Convert a JSON cell (e.g. an entity key read back from a row) into a bind value.
    pub fn from_json(v: &Value) -> Self {
        match v {
            Value::Null => BindValue::Null,
            Value::Bool(b) => BindValue::Bool(*b),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    BindValue::I64(i)
                } else {
                    BindValue::F64(n.as_f64().unwrap_or(0.0))
                }
            }
            Value::String(s) => BindValue::Text(s.clone()),
            other => BindValue::Text(other.to_string()),
        }
    }
}

/// Identifier list produced by a scoping query and reused by every query of
/// one request.
#[derive(Clone, Debug, PartialEq)]
pub enum KeyList {
    Ints(Vec<i64>),
    Texts(Vec<String>),
}

impl KeyList {
    /// Collect keys from result rows, reading `column` from each. Integer keys
    /// stay integers unless any row carries a non-integer key.
    pub fn from_rows(rows: &[Value], column: &str) -> Self {
        let cells: Vec<&Value> = rows.iter().filter_map(|r| r.get(column)).filter(|v| !v.is_null()).collect();
        let ints: Option<Vec<i64>> = cells.iter().map(|v| v.as_i64()).collect();
        match ints {
            Some(ints) => KeyList::Ints(ints),
            None => KeyList::Texts(
                cells
                    .iter()
                    .map(|v| match v {
                        Value::String(s) => s.clone(),
                        other => other.to_string(),
                    })
                    .collect(),
            ),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            KeyList::Ints(v) => v.len(),
            KeyList::Texts(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn to_bind(&self) -> BindValue {
        match self {
            KeyList::Ints(v) => BindValue::I64Array(v.clone()),
            KeyList::Texts(v) => BindValue::TextArray(v.clone()),
        }
    }
}
