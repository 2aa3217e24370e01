//! rowgraph - materialize object graphs from tabular query results.
//!
//! Rows come in through a [`RowCursor`]; a [`Configuration`] holding frozen
//! [`MappingPlan`]s says how columns become objects. The engine rebuilds
//! flat objects and nested, possibly cyclic, graphs from joined rows:
//!
//! - repeated parent rows are deduplicated by identity columns
//! - child collections grow in row-arrival order
//! - discriminators pick sub-plans per row
//! - nested queries run eagerly or on first read
//! - later named result sets are correlated back to their holders
//!
//! # Quick Start
//!
//! ```
//! use rowgraph::prelude::*;
//!
//! let config = Configuration::builder()
//!     .types(
//!         TypeRegistry::new()
//!             .with(
//!                 TypeDescriptor::new("Blog")
//!                     .property("id", TargetType::I64)
//!                     .property("posts", TargetType::list(TargetType::object("Post"))),
//!             )
//!             .with(TypeDescriptor::new("Post").property("id", TargetType::I64)),
//!     )
//!     .plan(
//!         MappingPlan::builder("blog", TargetType::object("Blog"))
//!             .mapping(FieldMapping::id("id", "blog_id"))
//!             .mapping(FieldMapping::nested("posts", "post"))
//!             .build()?,
//!     )
//!     .plan(
//!         MappingPlan::builder("post", TargetType::object("Post"))
//!             .mapping(FieldMapping::id("id", "post_id"))
//!             .build()?,
//!     )
//!     .build()?;
//!
//! let statement = StatementPlan::new("selectBlogs").plan("blog");
//! let cursor = VecCursor::new(
//!     &["blog_id", "post_id"],
//!     vec![
//!         vec![Value::BigInt(1), Value::BigInt(10)],
//!         vec![Value::BigInt(1), Value::BigInt(11)],
//!     ],
//! );
//!
//! let blogs = rowgraph::select_list(&config, &statement, vec![Box::new(cursor)])?;
//! assert_eq!(blogs.len(), 1);
//! let blog = blogs[0].as_object().unwrap();
//! assert_eq!(blog.list("posts").len(), 2);
//! # Ok::<(), rowgraph::Error>(())
//! ```

pub use rowgraph_core::{
    AutoMappingBehavior, ColumnInfo, Configuration, ConfigurationBuilder, ConstructorDescriptor,
    Converter, ConverterRegistry, Datum, DefaultObjectFactory, DeferredValue, Discriminator,
    Error, FieldMapping, FnConverter, FromValue, MappingErrorKind, MappingPlan,
    MappingPlanBuilder, ObjectFactory, ObjectRef, ParamDescriptor, PropertyDescriptor, Record,
    Result, Row, RowCursor, ScalarConverter, Settings, SqlType, StatementPlan, TargetType,
    TypeDescriptor, TypeRegistry, UnknownColumnPolicy, Value, ValueLoader, VecCursor,
    parse_composite_columns,
};
pub use rowgraph_core::error;

pub use rowgraph_engine::{
    CachingExecutor, DefaultResultHandler, MaterializedResults, NestedQueryExecutor, QueryCache,
    QueryKey, QueryParams, QueryRunner, ResultContext, ResultHandler, ResultSetMaterializer,
    RowBounds, RowKey, extract_object_from_list, query_key_hash,
};

/// Materialize a statement's cursors into a list of top-level objects.
///
/// With several mapped result sets each entry is a `Datum::List` holding one
/// result set's objects.
pub fn select_list(
    config: &Configuration,
    statement: &StatementPlan,
    cursors: Vec<Box<dyn RowCursor>>,
) -> Result<Vec<Datum>> {
    ResultSetMaterializer::new(config, statement)
        .handle_result_sets(cursors)
        .map(MaterializedResults::into_datums)
}

/// Materialize at most one top-level object.
pub fn select_one(
    config: &Configuration,
    statement: &StatementPlan,
    cursors: Vec<Box<dyn RowCursor>>,
) -> Result<Option<Datum>> {
    ResultSetMaterializer::new(config, statement).select_one(cursors)
}

pub mod prelude {
    pub use crate::{
        CachingExecutor,
        Configuration,
        Datum,
        Discriminator,
        Error,
        FieldMapping,
        MappingPlan,
        MaterializedResults,
        NestedQueryExecutor,
        ObjectRef,
        QueryParams,
        Result,
        ResultContext,
        ResultHandler,
        ResultSetMaterializer,
        Row,
        RowBounds,
        RowCursor,
        Settings,
        StatementPlan,
        TargetType,
        TypeDescriptor,
        TypeRegistry,
        Value,
        VecCursor,
    };
}
