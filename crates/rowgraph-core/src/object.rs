//! Materialized object model.
//!
//! Rows become `Datum`s: scalars, shared object records, lists, or deferred
//! cells. Objects are shared through `ObjectRef` (`Arc<RwLock<Record>>`) so the
//! same logical entity reached through several join rows, or through a cyclic
//! back reference, is one instance.

use crate::deferred::DeferredValue;
use crate::error::Result;
use crate::value::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// A materialized value.
#[derive(Clone)]
pub enum Datum {
    /// A single converted column value (possibly NULL)
    Scalar(Value),
    /// A shared object instance
    Object(ObjectRef),
    /// An ordered collection
    List(Vec<Datum>),
    /// A value computed on first read
    Deferred(Arc<DeferredValue>),
}

impl Datum {
    /// The NULL datum.
    pub const fn null() -> Self {
        Datum::Scalar(Value::Null)
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Datum::Scalar(Value::Null))
    }

    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Datum::Scalar(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&ObjectRef> {
        match self {
            Datum::Object(obj) => Some(obj),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Datum]> {
        match self {
            Datum::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_deferred(&self) -> Option<&Arc<DeferredValue>> {
        match self {
            Datum::Deferred(cell) => Some(cell),
            _ => None,
        }
    }

    /// Resolve a deferred cell; other datums are returned as-is.
    pub fn resolved(&self) -> Result<Datum> {
        match self {
            Datum::Deferred(cell) => cell.resolve(),
            other => Ok(other.clone()),
        }
    }

    /// Render as JSON. Objects already on the current path render as
    /// `{"$ref": "<type>"}`; unloaded deferred cells as `{"$deferred": true}`.
    pub fn to_json(&self) -> serde_json::Value {
        let mut path = Vec::new();
        self.to_json_inner(&mut path)
    }

    fn to_json_inner(&self, path: &mut Vec<*const RwLock<Record>>) -> serde_json::Value {
        match self {
            Datum::Scalar(value) => value.to_json(),
            Datum::List(items) => {
                serde_json::Value::Array(items.iter().map(|d| d.to_json_inner(path)).collect())
            }
            Datum::Deferred(cell) => match cell.peek() {
                Some(value) => value.to_json_inner(path),
                None => serde_json::json!({ "$deferred": true }),
            },
            Datum::Object(obj) => {
                let ptr = Arc::as_ptr(&obj.0);
                if path.contains(&ptr) {
                    return serde_json::json!({ "$ref": obj.type_name() });
                }
                path.push(ptr);
                let fields: Vec<(String, Datum)> = {
                    let record = obj.read();
                    record
                        .fields
                        .iter()
                        .map(|(k, v)| (k.clone(), v.clone()))
                        .collect()
                };
                let mut map = serde_json::Map::new();
                for (name, value) in fields {
                    map.insert(name, value.to_json_inner(path));
                }
                path.pop();
                serde_json::Value::Object(map)
            }
        }
    }
}

impl From<Value> for Datum {
    fn from(value: Value) -> Self {
        Datum::Scalar(value)
    }
}

impl From<ObjectRef> for Datum {
    fn from(obj: ObjectRef) -> Self {
        Datum::Object(obj)
    }
}

/// Scalars compare by value, objects and cells by identity, lists
/// element-wise.
impl PartialEq for Datum {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Datum::Scalar(a), Datum::Scalar(b)) => a == b,
            (Datum::Object(a), Datum::Object(b)) => a.ptr_eq(b),
            (Datum::List(a), Datum::List(b)) => a == b,
            (Datum::Deferred(a), Datum::Deferred(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Debug for Datum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Datum::Scalar(value) => write!(f, "{:?}", value),
            Datum::Object(obj) => write!(f, "{:?}", obj),
            Datum::List(items) => f.debug_list().entries(items).finish(),
            Datum::Deferred(cell) => write!(f, "{:?}", cell),
        }
    }
}

/// Field storage of one object instance.
#[derive(Clone)]
pub struct Record {
    type_name: String,
    fields: BTreeMap<String, Datum>,
}

impl Record {
    /// Empty record of the named type.
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            fields: BTreeMap::new(),
        }
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Stored field; a deferred cell is returned as is, unresolved.
    pub fn get(&self, name: &str) -> Option<&Datum> {
        self.fields.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Datum> {
        self.fields.get_mut(name)
    }

    /// Set a field, replacing any previous value.
    pub fn set(&mut self, name: impl Into<String>, value: Datum) {
        self.fields.insert(name.into(), value);
    }

    pub fn remove(&mut self, name: &str) -> Option<Datum> {
        self.fields.remove(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Iterate over (field name, value) pairs in name order.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &Datum)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl fmt::Debug for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct(&self.type_name);
        for (name, value) in &self.fields {
            s.field(name, value);
        }
        s.finish()
    }
}

/// Shared handle to an object instance.
#[derive(Clone)]
pub struct ObjectRef(Arc<RwLock<Record>>);

impl ObjectRef {
    pub fn new(record: Record) -> Self {
        Self(Arc::new(RwLock::new(record)))
    }

    /// Read access. A poisoned lock still yields the record.
    pub fn read(&self) -> RwLockReadGuard<'_, Record> {
        self.0.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Write access. A poisoned lock still yields the record.
    pub fn write(&self) -> RwLockWriteGuard<'_, Record> {
        self.0.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Check whether both handles point at the same instance.
    pub fn ptr_eq(&self, other: &ObjectRef) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    pub fn type_name(&self) -> String {
        self.read().type_name().to_string()
    }

    /// Current content of a field, deferred cells unresolved.
    pub fn get(&self, name: &str) -> Option<Datum> {
        self.read().get(name).cloned()
    }

    /// Field value as a scalar, NULL when absent or not scalar.
    pub fn value(&self, name: &str) -> Value {
        match self.read().get(name) {
            Some(Datum::Scalar(value)) => value.clone(),
            _ => Value::Null,
        }
    }

    pub fn set(&self, name: impl Into<String>, value: Datum) {
        self.write().set(name, value);
    }

    /// Field value with any deferred cell resolved.
    ///
    /// The record lock is released before the cell loads, so loaders may
    /// read this object.
    pub fn resolve(&self, name: &str) -> Result<Option<Datum>> {
        match self.get(name) {
            Some(Datum::Deferred(cell)) => cell.resolve().map(Some),
            other => Ok(other),
        }
    }

    /// Objects held by a list field, in order.
    pub fn list(&self, name: &str) -> Vec<Datum> {
        match self.read().get(name) {
            Some(Datum::List(items)) => items.clone(),
            _ => Vec::new(),
        }
    }
}

impl fmt::Debug for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Shallow: object graphs may be cyclic.
        write!(f, "{}@{:p}", self.type_name(), Arc::as_ptr(&self.0))
    }
}
