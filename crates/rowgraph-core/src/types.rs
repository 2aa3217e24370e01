//! Column types and target value types.

use crate::value::Value;
use std::fmt;

/// Column type as declared by the cursor, when it reports one.
///
/// Converter lookup keys on this alongside the [`TargetType`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SqlType {
    TinyInt,
    SmallInt,
    Integer,
    BigInt,
    Real,
    Double,
    Decimal { precision: u8, scale: u8 },
    Boolean,
    VarChar(u32),
    Text,
    Blob,
    Date,
    Time,
    Timestamp,
    Uuid,
    Json,
    Array(Box<SqlType>),
    /// Not reported by the cursor
    Unknown,
}

impl SqlType {
    /// Name as it appears in error messages.
    pub fn sql_name(&self) -> String {
        let name = match self {
            SqlType::Decimal { precision, scale } => return format!("DECIMAL({precision}, {scale})"),
            SqlType::VarChar(len) => return format!("VARCHAR({len})"),
            SqlType::Array(inner) => return format!("{}[]", inner.sql_name()),
            SqlType::TinyInt => "TINYINT",
            SqlType::SmallInt => "SMALLINT",
            SqlType::Integer => "INTEGER",
            SqlType::BigInt => "BIGINT",
            SqlType::Real => "REAL",
            SqlType::Double => "DOUBLE PRECISION",
            SqlType::Boolean => "BOOLEAN",
            SqlType::Text => "TEXT",
            SqlType::Blob => "BLOB",
            SqlType::Date => "DATE",
            SqlType::Time => "TIME",
            SqlType::Timestamp => "TIMESTAMP",
            SqlType::Uuid => "UUID",
            SqlType::Json => "JSON",
            SqlType::Unknown => "UNKNOWN",
        };
        name.to_string()
    }

    /// Best guess at a declared type from a sample cell, for cursors
    /// without column metadata. NULL tells nothing.
    pub fn of_value(value: &Value) -> Self {
        match value {
            Value::Null => SqlType::Unknown,
            Value::Bool(_) => SqlType::Boolean,
            Value::TinyInt(_) => SqlType::TinyInt,
            Value::SmallInt(_) => SqlType::SmallInt,
            Value::Int(_) => SqlType::Integer,
            Value::BigInt(_) => SqlType::BigInt,
            Value::Float(_) => SqlType::Real,
            Value::Double(_) => SqlType::Double,
            Value::Decimal(_) => SqlType::Decimal {
                precision: 38,
                scale: 10,
            },
            Value::Text(_) => SqlType::Text,
            Value::Bytes(_) => SqlType::Blob,
            Value::Date(_) => SqlType::Date,
            Value::Time(_) => SqlType::Time,
            Value::Timestamp(_) => SqlType::Timestamp,
            Value::Uuid(_) => SqlType::Uuid,
            Value::Json(_) => SqlType::Json,
            Value::Array(items) => SqlType::Array(Box::new(
                items.first().map_or(SqlType::Unknown, SqlType::of_value),
            )),
        }
    }
}

/// The value type a property, constructor argument or mapping plan produces.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TargetType {
    /// Whatever the column holds, unconverted
    Any,
    Bool,
    I32,
    I64,
    F64,
    Decimal,
    Text,
    Bytes,
    Date,
    Time,
    Timestamp,
    Uuid,
    Json,
    /// Generic keyed container; every column name is a settable key
    Map,
    /// Ordered collection of the inner type
    List(Box<TargetType>),
    /// Named object type described in the type registry
    Object(String),
}

impl TargetType {
    /// Named object type.
    pub fn object(name: impl Into<String>) -> Self {
        TargetType::Object(name.into())
    }

    /// Collection of the given element type.
    pub fn list(element: TargetType) -> Self {
        TargetType::List(Box::new(element))
    }

    /// Is this a single-value type a converter can produce directly?
    pub const fn is_scalar(&self) -> bool {
        !matches!(
            self,
            TargetType::Map | TargetType::List(_) | TargetType::Object(_)
        )
    }

    pub const fn is_collection(&self) -> bool {
        matches!(self, TargetType::List(_))
    }

    /// Element type of a collection, or the type itself.
    pub fn element_type(&self) -> &TargetType {
        match self {
            TargetType::List(inner) => inner,
            other => other,
        }
    }
}

impl fmt::Display for TargetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetType::Any => write!(f, "any"),
            TargetType::Bool => write!(f, "bool"),
            TargetType::I32 => write!(f, "i32"),
            TargetType::I64 => write!(f, "i64"),
            TargetType::F64 => write!(f, "f64"),
            TargetType::Decimal => write!(f, "decimal"),
            TargetType::Text => write!(f, "text"),
            TargetType::Bytes => write!(f, "bytes"),
            TargetType::Date => write!(f, "date"),
            TargetType::Time => write!(f, "time"),
            TargetType::Timestamp => write!(f, "timestamp"),
            TargetType::Uuid => write!(f, "uuid"),
            TargetType::Json => write!(f, "json"),
            TargetType::Map => write!(f, "map"),
            TargetType::List(inner) => write!(f, "list<{}>", inner),
            TargetType::Object(name) => write!(f, "{}", name),
        }
    }
}
