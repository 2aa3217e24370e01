//! Core types for rowgraph.
//!
//! This crate provides the vocabulary shared by the materialization engine:
//!
//! - `Value`, `Row` and `RowCursor` for reading tabular results
//! - `ConverterRegistry` for turning column values into target values
//! - `MappingPlan` and `FieldMapping` describing how rows become objects
//! - `Datum`, `ObjectRef` and `DeferredValue`, the materialized object model
//! - `TypeRegistry` and `ObjectFactory` for constructing target types
//! - `Settings` and `Configuration`, the immutable bundle passed into every call

pub mod config;
pub mod convert;
pub mod cursor;
pub mod deferred;
pub mod error;
pub mod mapping;
pub mod meta;
pub mod object;
pub mod row;
pub mod types;
pub mod value;

pub use config::{
    AutoMappingBehavior, Configuration, ConfigurationBuilder, Settings, UnknownColumnPolicy,
};
pub use convert::{Converter, ConverterRegistry, FnConverter, ScalarConverter};
pub use cursor::{RowCursor, VecCursor};
pub use deferred::{DeferredValue, ValueLoader};
pub use error::{Error, MappingErrorKind, Result};
pub use mapping::{
    Discriminator, FieldMapping, MappingPlan, MappingPlanBuilder, StatementPlan,
    parse_composite_columns,
};
pub use meta::{
    ConstructorDescriptor, DefaultObjectFactory, ObjectFactory, ParamDescriptor,
    PropertyDescriptor, TypeDescriptor, TypeRegistry,
};
pub use object::{Datum, ObjectRef, Record};
pub use row::{ColumnInfo, FromValue, Row};
pub use types::{SqlType, TargetType};
pub use value::Value;
