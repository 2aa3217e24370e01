//! Cell values as a cursor hands them over.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};

/// One cell of a row, typed the way the driver reported it.
///
/// Converters turn cells into the representation a target property
/// expects; keys and discriminators read them through [`fmt::Display`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    Bool(bool),
    TinyInt(i8),
    SmallInt(i16),
    Int(i32),
    BigInt(i64),
    Float(f32),
    Double(f64),
    /// Exact decimal kept in its textual form
    Decimal(String),
    Text(String),
    Bytes(Vec<u8>),
    /// Days since the Unix epoch
    Date(i32),
    /// Microseconds since midnight
    Time(i64),
    /// Microseconds since the Unix epoch
    Timestamp(i64),
    Uuid([u8; 16]),
    Json(serde_json::Value),
    Array(Vec<Value>),
}

impl Value {
    pub const fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Driver-style name of the variant, used in conversion errors.
    pub const fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "NULL",
            Value::Bool(_) => "BOOLEAN",
            Value::TinyInt(_) => "TINYINT",
            Value::SmallInt(_) => "SMALLINT",
            Value::Int(_) => "INTEGER",
            Value::BigInt(_) => "BIGINT",
            Value::Float(_) => "REAL",
            Value::Double(_) => "DOUBLE",
            Value::Decimal(_) => "DECIMAL",
            Value::Text(_) => "TEXT",
            Value::Bytes(_) => "BLOB",
            Value::Date(_) => "DATE",
            Value::Time(_) => "TIME",
            Value::Timestamp(_) => "TIMESTAMP",
            Value::Uuid(_) => "UUID",
            Value::Json(_) => "JSON",
            Value::Array(_) => "ARRAY",
        }
    }

    /// Integers read as booleans by comparing against zero.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(flag) => Some(*flag),
            _ => self.as_integer().map(|n| n != 0),
        }
    }

    /// Integer cells widened to `i64`; numeric text is parsed.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Bool(flag) => Some(i64::from(*flag)),
            Value::Decimal(text) | Value::Text(text) => text.trim().parse().ok(),
            _ => self.as_integer(),
        }
    }

    #[allow(clippy::cast_precision_loss)]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(n) => Some(f64::from(*n)),
            Value::Double(n) => Some(*n),
            Value::Decimal(text) => text.trim().parse().ok(),
            _ => self.as_integer().map(|n| n as f64),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(text) | Value::Decimal(text) => Some(text),
            _ => None,
        }
    }

    fn as_integer(&self) -> Option<i64> {
        match *self {
            Value::TinyInt(n) => Some(i64::from(n)),
            Value::SmallInt(n) => Some(i64::from(n)),
            Value::Int(n) => Some(i64::from(n)),
            Value::BigInt(n) => Some(n),
            _ => None,
        }
    }

    /// Feed the cell into a hasher for row keys.
    ///
    /// The variant tag goes in first, so `Int(1)` and `BigInt(1)` land in
    /// different buckets. Floats hash by bit pattern, JSON by its text.
    pub fn hash_into<H: Hasher>(&self, hasher: &mut H) {
        std::mem::discriminant(self).hash(hasher);
        match self {
            Value::Null => {}
            Value::Bool(flag) => flag.hash(hasher),
            Value::TinyInt(n) => n.hash(hasher),
            Value::SmallInt(n) => n.hash(hasher),
            Value::Int(n) | Value::Date(n) => n.hash(hasher),
            Value::BigInt(n) | Value::Time(n) | Value::Timestamp(n) => n.hash(hasher),
            Value::Float(n) => n.to_bits().hash(hasher),
            Value::Double(n) => n.to_bits().hash(hasher),
            Value::Decimal(text) | Value::Text(text) => text.hash(hasher),
            Value::Bytes(bytes) => bytes.hash(hasher),
            Value::Uuid(uuid) => uuid.hash(hasher),
            Value::Json(json) => json.to_string().hash(hasher),
            Value::Array(items) => {
                items.len().hash(hasher);
                for item in items {
                    item.hash_into(hasher);
                }
            }
        }
    }

    /// JSON rendering used when dumping an object graph.
    ///
    /// Numbers stay numbers; text-like and binary cells become strings.
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::Value as Json;

        match self {
            Value::Null => Json::Null,
            Value::Bool(flag) => Json::Bool(*flag),
            Value::Float(n) => Json::from(f64::from(*n)),
            Value::Double(n) => Json::from(*n),
            Value::Date(n) => Json::from(*n),
            Value::Time(n) | Value::Timestamp(n) => Json::from(*n),
            Value::Json(json) => json.clone(),
            Value::Array(items) => items.iter().map(Value::to_json).collect(),
            other => match other.as_integer() {
                Some(n) => Json::from(n),
                None => Json::String(other.to_string()),
            },
        }
    }
}

fn write_hex(f: &mut fmt::Formatter<'_>, bytes: &[u8], dash_after: &[usize]) -> fmt::Result {
    for (position, byte) in bytes.iter().enumerate() {
        if dash_after.contains(&position) {
            f.write_str("-")?;
        }
        write!(f, "{byte:02x}")?;
    }
    Ok(())
}

/// Text form read by discriminator lookup and correlation keys.
/// NULL prints as `null`.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Bool(flag) => write!(f, "{flag}"),
            Value::Float(n) => write!(f, "{n}"),
            Value::Double(n) => write!(f, "{n}"),
            Value::Decimal(text) | Value::Text(text) => f.write_str(text),
            Value::Date(n) => write!(f, "{n}"),
            Value::Time(n) | Value::Timestamp(n) => write!(f, "{n}"),
            Value::Bytes(bytes) => write_hex(f, bytes, &[]),
            Value::Uuid(uuid) => write_hex(f, uuid, &[4, 6, 8, 10]),
            Value::Json(json) => write!(f, "{json}"),
            Value::Array(items) => {
                f.write_str("[")?;
                for (position, item) in items.iter().enumerate() {
                    if position > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
            integer => match integer.as_integer() {
                Some(n) => write!(f, "{n}"),
                None => Ok(()),
            },
        }
    }
}

macro_rules! value_from {
    ($($source:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$source> for Value {
                #[allow(clippy::useless_conversion)]
                fn from(v: $source) -> Self {
                    Value::$variant(v.into())
                }
            }
        )*
    };
}

value_from! {
    bool => Bool,
    i8 => TinyInt,
    i16 => SmallInt,
    i32 => Int,
    i64 => BigInt,
    f32 => Float,
    f64 => Double,
    String => Text,
    &str => Text,
    Vec<u8> => Bytes,
    [u8; 16] => Uuid,
    serde_json::Value => Json,
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::hash_map::DefaultHasher;

    fn hash_of(value: &Value) -> u64 {
        let mut hasher = DefaultHasher::new();
        value.hash_into(&mut hasher);
        hasher.finish()
    }

    #[test]
    fn test_display_for_keys() {
        assert_eq!(Value::Null.to_string(), "null");
        assert_eq!(Value::Int(7).to_string(), "7");
        assert_eq!(Value::BigInt(7).to_string(), "7");
        assert_eq!(Value::Text("car".into()).to_string(), "car");
        assert_eq!(Value::Bool(true).to_string(), "true");
        assert_eq!(Value::Bytes(vec![0xde, 0xad]).to_string(), "dead");
        assert_eq!(
            Value::Uuid([0xab; 16]).to_string(),
            "abababab-abab-abab-abab-abababababab"
        );
        assert_eq!(
            Value::Array(vec![Value::Int(1), Value::Int(2)]).to_string(),
            "[1,2]"
        );
    }

    #[test]
    fn test_hash_distinguishes_types() {
        assert_ne!(hash_of(&Value::Int(1)), hash_of(&Value::BigInt(1)));
        assert_ne!(hash_of(&Value::Int(1)), hash_of(&Value::Date(1)));
        assert_eq!(
            hash_of(&Value::Text("a".into())),
            hash_of(&Value::Text("a".into()))
        );
        assert_eq!(hash_of(&Value::Double(1.5)), hash_of(&Value::Double(1.5)));
    }

    #[test]
    fn test_numeric_accessors() {
        assert_eq!(Value::Int(5).as_i64(), Some(5));
        assert_eq!(Value::Text(" 42 ".into()).as_i64(), Some(42));
        assert_eq!(Value::Float(1.5).as_f64(), Some(1.5));
        assert_eq!(Value::Bool(true).as_i64(), Some(1));
        assert_eq!(Value::SmallInt(0).as_bool(), Some(false));
        assert_eq!(Value::Bytes(vec![1]).as_i64(), None);
    }

    #[test]
    fn test_to_json() {
        assert_eq!(Value::Int(3).to_json(), serde_json::json!(3));
        assert_eq!(Value::Null.to_json(), serde_json::Value::Null);
        assert_eq!(Value::Text("x".into()).to_json(), serde_json::json!("x"));
        assert_eq!(
            Value::Array(vec![Value::Bool(false)]).to_json(),
            serde_json::json!([false])
        );
    }

    #[test]
    fn test_option_conversion() {
        assert_eq!(Value::from(Some(3_i32)), Value::Int(3));
        assert_eq!(Value::from(None::<i32>), Value::Null);
    }
}
