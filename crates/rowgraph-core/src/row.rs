//! Rows as read from a cursor, plus the column header they share.

use crate::Result;
use crate::error::{Error, TypeError};
use crate::types::SqlType;
use crate::value::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Header of one result set: labels, declared types and a lookup index.
///
/// Labels resolve exactly first, then ignoring ASCII case. When two labels
/// differ only by case the leftmost one wins the case-insensitive lookup.
#[derive(Debug, Clone)]
pub struct ColumnInfo {
    labels: Vec<String>,
    declared: Vec<SqlType>,
    exact: HashMap<String, usize>,
    folded: HashMap<String, usize>,
}

impl ColumnInfo {
    /// Header whose declared types are all unknown.
    pub fn new(labels: Vec<String>) -> Self {
        Self::with_types(labels, Vec::new())
    }

    /// Header with declared types; short type lists pad with `Unknown`.
    pub fn with_types(labels: Vec<String>, mut declared: Vec<SqlType>) -> Self {
        declared.resize(labels.len(), SqlType::Unknown);
        let mut exact = HashMap::with_capacity(labels.len());
        let mut folded = HashMap::with_capacity(labels.len());
        for (position, label) in labels.iter().enumerate() {
            exact.entry(label.clone()).or_insert(position);
            folded.entry(label.to_ascii_uppercase()).or_insert(position);
        }
        Self {
            labels,
            declared,
            exact,
            folded,
        }
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Position of a label, if the result set carries it.
    pub fn index_of(&self, label: &str) -> Option<usize> {
        if let Some(&position) = self.exact.get(label) {
            return Some(position);
        }
        self.folded.get(&label.to_ascii_uppercase()).copied()
    }

    pub fn type_at(&self, position: usize) -> Option<&SqlType> {
        self.declared.get(position)
    }

    pub fn type_of(&self, label: &str) -> Option<&SqlType> {
        self.index_of(label).and_then(|position| self.type_at(position))
    }

    /// Labels in cursor order.
    pub fn names(&self) -> &[String] {
        &self.labels
    }
}

/// One row of a result set.
#[derive(Debug, Clone)]
pub struct Row {
    header: Arc<ColumnInfo>,
    cells: Vec<Value>,
}

impl Row {
    /// Standalone row with its own header. Cursors share one header
    /// across rows through [`Row::with_columns`] instead.
    pub fn new(labels: Vec<String>, cells: Vec<Value>) -> Self {
        Self::with_columns(Arc::new(ColumnInfo::new(labels)), cells)
    }

    pub fn with_columns(header: Arc<ColumnInfo>, cells: Vec<Value>) -> Self {
        Self { header, cells }
    }

    pub fn column_info(&self) -> Arc<ColumnInfo> {
        Arc::clone(&self.header)
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn get(&self, position: usize) -> Option<&Value> {
        self.cells.get(position)
    }

    pub fn get_by_name(&self, label: &str) -> Option<&Value> {
        self.header
            .index_of(label)
            .and_then(|position| self.cells.get(position))
    }

    /// Cell under `label`; an absent column reads as NULL.
    pub fn value_or_null(&self, label: &str) -> &Value {
        static NULL: Value = Value::Null;
        self.get_by_name(label).unwrap_or(&NULL)
    }

    /// `(label, cell)` pairs in cursor order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.header
            .names()
            .iter()
            .map(String::as_str)
            .zip(&self.cells)
    }
}

/// Strict conversion out of a [`Value`] into a Rust scalar.
///
/// NULL never converts; callers decide what an absent value means.
pub trait FromValue: Sized {
    #[allow(clippy::result_large_err)]
    fn from_value(value: &Value) -> Result<Self>;
}

fn cannot_read(expected: &'static str, actual: impl Into<String>) -> Error {
    Error::Type(TypeError {
        expected,
        actual: actual.into(),
        column: None,
    })
}

fn wrong_kind(expected: &'static str, value: &Value) -> Error {
    cannot_read(expected, value.type_name())
}

impl FromValue for bool {
    fn from_value(value: &Value) -> Result<Self> {
        value.as_bool().ok_or_else(|| wrong_kind("bool", value))
    }
}

impl FromValue for i64 {
    fn from_value(value: &Value) -> Result<Self> {
        value.as_i64().ok_or_else(|| wrong_kind("i64", value))
    }
}

impl FromValue for i32 {
    fn from_value(value: &Value) -> Result<Self> {
        let wide = i64::from_value(value).map_err(|_| wrong_kind("i32", value))?;
        i32::try_from(wide).map_err(|_| cannot_read("i32", format!("{wide} overflows i32")))
    }
}

impl FromValue for f64 {
    fn from_value(value: &Value) -> Result<Self> {
        value.as_f64().ok_or_else(|| wrong_kind("f64", value))
    }
}

impl FromValue for String {
    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Text(text) | Value::Decimal(text) => Ok(text.clone()),
            Value::Null | Value::Bytes(_) | Value::Json(_) | Value::Array(_) => {
                Err(wrong_kind("text", value))
            }
            scalar => Ok(scalar.to_string()),
        }
    }
}

impl FromValue for Vec<u8> {
    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Bytes(bytes) => Ok(bytes.clone()),
            Value::Text(text) => Ok(text.clone().into_bytes()),
            other => Err(wrong_kind("bytes", other)),
        }
    }
}

impl FromValue for [u8; 16] {
    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Uuid(uuid) => Ok(*uuid),
            Value::Bytes(bytes) => <[u8; 16]>::try_from(bytes.as_slice())
                .map_err(|_| cannot_read("uuid", format!("{} bytes", bytes.len()))),
            other => Err(wrong_kind("uuid", other)),
        }
    }
}

impl FromValue for serde_json::Value {
    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Json(json) => Ok(json.clone()),
            Value::Text(text) => {
                serde_json::from_str(text).map_err(|e| cannot_read("json", e.to_string()))
            }
            other => Err(wrong_kind("json", other)),
        }
    }
}
