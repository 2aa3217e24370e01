//! Column-to-value converters.
//!
//! A converter turns the raw cell of a column into the value a target type
//! expects. The registry resolves a converter for a
//! (target type, declared column type) pair, falling back to a converter
//! registered for the target type alone.

use crate::error::{Error, Result};
use crate::row::{FromValue, Row};
use crate::types::{SqlType, TargetType};
use crate::value::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Converts a column value into a target representation.
pub trait Converter: Send + Sync + fmt::Debug {
    /// Convert one raw value. NULL must map to NULL.
    fn convert(&self, value: &Value) -> Result<Value>;

    /// Read and convert a column of a row. Absent columns read as NULL.
    fn read(&self, row: &Row, column: &str) -> Result<Value> {
        self.convert(row.value_or_null(column)).map_err(|e| match e {
            Error::Type(mut te) => {
                te.column = Some(column.to_string());
                Error::Type(te)
            }
            e => e,
        })
    }
}

/// Built-in converter for a scalar target type.
#[derive(Debug, Clone)]
pub struct ScalarConverter {
    target: TargetType,
}

impl ScalarConverter {
    pub fn new(target: TargetType) -> Self {
        Self { target }
    }
}

impl Converter for ScalarConverter {
    fn convert(&self, value: &Value) -> Result<Value> {
        if value.is_null() {
            return Ok(Value::Null);
        }
        Ok(match &self.target {
            TargetType::Bool => Value::Bool(bool::from_value(value)?),
            TargetType::I32 => Value::Int(i32::from_value(value)?),
            TargetType::I64 => Value::BigInt(i64::from_value(value)?),
            TargetType::F64 => Value::Double(f64::from_value(value)?),
            TargetType::Decimal => match value {
                Value::Decimal(s) => Value::Decimal(s.clone()),
                other if other.as_f64().is_some() => Value::Decimal(other.to_string()),
                other => Value::Decimal(String::from_value(other)?),
            },
            TargetType::Text => Value::Text(String::from_value(value)?),
            TargetType::Bytes => Value::Bytes(Vec::<u8>::from_value(value)?),
            TargetType::Date => match value {
                Value::Date(d) => Value::Date(*d),
                other => Value::Date(i32::from_value(other)?),
            },
            TargetType::Time => match value {
                Value::Time(t) => Value::Time(*t),
                other => Value::Time(i64::from_value(other)?),
            },
            TargetType::Timestamp => match value {
                Value::Timestamp(t) => Value::Timestamp(*t),
                other => Value::Timestamp(i64::from_value(other)?),
            },
            TargetType::Uuid => Value::Uuid(<[u8; 16]>::from_value(value)?),
            TargetType::Json => Value::Json(serde_json::Value::from_value(value)?),
            _ => value.clone(),
        })
    }
}

/// Converter backed by a function.
#[derive(Clone)]
pub struct FnConverter {
    name: &'static str,
    func: Arc<dyn Fn(&Value) -> Result<Value> + Send + Sync>,
}

impl FnConverter {
    pub fn new(
        name: &'static str,
        func: impl Fn(&Value) -> Result<Value> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name,
            func: Arc::new(func),
        }
    }
}

impl fmt::Debug for FnConverter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnConverter").field("name", &self.name).finish()
    }
}

impl Converter for FnConverter {
    fn convert(&self, value: &Value) -> Result<Value> {
        if value.is_null() {
            return Ok(Value::Null);
        }
        (self.func)(value)
    }
}

/// Resolves converters by (target type, column type).
#[derive(Debug, Clone, Default)]
pub struct ConverterRegistry {
    converters: HashMap<TargetType, HashMap<Option<SqlType>, Arc<dyn Converter>>>,
}

impl ConverterRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with a converter for every scalar target type.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        for target in [
            TargetType::Any,
            TargetType::Bool,
            TargetType::I32,
            TargetType::I64,
            TargetType::F64,
            TargetType::Decimal,
            TargetType::Text,
            TargetType::Bytes,
            TargetType::Date,
            TargetType::Time,
            TargetType::Timestamp,
            TargetType::Uuid,
            TargetType::Json,
        ] {
            registry.register(
                target.clone(),
                None,
                Arc::new(ScalarConverter::new(target)),
            );
        }
        registry
    }

    /// Register a converter; `column: None` matches any column type.
    pub fn register(
        &mut self,
        target: TargetType,
        column: Option<SqlType>,
        converter: Arc<dyn Converter>,
    ) {
        self.converters
            .entry(target)
            .or_default()
            .insert(column, converter);
    }

    /// Converter for a target type reading a column of the given type.
    pub fn get(&self, target: &TargetType, column: Option<&SqlType>) -> Option<Arc<dyn Converter>> {
        let by_column = self.converters.get(target)?;
        column
            .and_then(|c| by_column.get(&Some(c.clone())))
            .or_else(|| by_column.get(&None))
            .cloned()
    }

    pub fn has(&self, target: &TargetType, column: Option<&SqlType>) -> bool {
        self.get(target, column).is_some()
    }

    /// Whether any converter exists for the target type.
    pub fn has_any(&self, target: &TargetType) -> bool {
        self.converters.get(target).is_some_and(|m| !m.is_empty())
    }
}
