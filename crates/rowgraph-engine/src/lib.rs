//! Result-set materialization for rowgraph.
//!
//! `ResultSetMaterializer` consumes the cursors of one statement execution
//! and builds object graphs from their rows, following the `MappingPlan`s in
//! a shared `Configuration`:
//!
//! - identity deduplication across joined rows (`RowKey`)
//! - nested plans with column prefixes, guard columns and cycles
//! - discriminated plan selection
//! - constructor selection and automatic column matching
//! - nested queries, run eagerly or installed as deferred cells
//! - correlation of later named result sets with their holders
//! - row windows and streaming consumers

pub mod bounds;
mod columns;
mod construct;
mod correlate;
mod discriminator;
pub mod extract;
pub mod handler;
mod identity;
pub mod key;
pub mod materializer;
mod nested;
pub mod nested_query;
mod populate;

pub use bounds::RowBounds;
pub use extract::extract_object_from_list;
pub use handler::{DefaultResultHandler, ResultContext, ResultHandler};
pub use key::RowKey;
pub use materializer::{MaterializedResults, ResultSetMaterializer};
pub use nested_query::{
    CachingExecutor, NestedQueryExecutor, QueryCache, QueryKey, QueryParams, QueryRunner,
    query_key_hash,
};
