//! Nested query execution.
//!
//! A field mapping may name a query that produces its value from the
//! current row's columns. The engine never runs SQL itself: it hands a
//! `QueryKey` to a `NestedQueryExecutor`, and either uses the rows inline or
//! installs a `DeferredValue` that runs the query on first read.
//!
//! `CachingExecutor` wraps any query runner with an LRU result cache keyed by
//! (query id, parameters). A cached key is what makes the engine install a
//! deferred cell instead of an immediate value.

use crate::columns::prefixed;
use crate::extract::extract_object_from_list;
use crate::materializer::ResultSetMaterializer;
use crate::populate::PropertyValue;
use rowgraph_core::error::NestedQueryError;
use rowgraph_core::{
    Datum, DeferredValue, Error, FieldMapping, MappingErrorKind, ObjectFactory, ObjectRef, Result,
    Row, TargetType, Value, ValueLoader,
};
use std::collections::hash_map::DefaultHasher;
use std::collections::{BTreeMap, HashMap};
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

/// Parameter object handed to a nested query.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryParams {
    /// The value of the mapping's single column
    Single(Value),
    /// Composite key components by property name
    Composite(BTreeMap<String, Value>),
}

impl QueryParams {
    /// Look up a parameter: the single value answers to any name.
    pub fn get(&self, name: &str) -> Option<&Value> {
        match self {
            QueryParams::Single(value) => Some(value),
            QueryParams::Composite(values) => values.get(name),
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            QueryParams::Single(value) => value.to_json(),
            QueryParams::Composite(values) => serde_json::Value::Object(
                values
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
        }
    }

    fn hash_into<H: Hasher>(&self, state: &mut H) {
        match self {
            QueryParams::Single(value) => {
                0u8.hash(state);
                value.hash_into(state);
            }
            QueryParams::Composite(values) => {
                1u8.hash(state);
                for (name, value) in values {
                    name.hash(state);
                    value.hash_into(state);
                }
            }
        }
    }
}

/// (query id, parameters): the unit of nested query caching.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryKey {
    pub query_id: String,
    pub params: QueryParams,
}

impl QueryKey {
    pub fn new(query_id: impl Into<String>, params: QueryParams) -> Self {
        Self {
            query_id: query_id.into(),
            params,
        }
    }
}

impl Eq for QueryKey {}

impl Hash for QueryKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.query_id.hash(state);
        self.params.hash_into(state);
    }
}

/// The external facility that runs nested queries.
pub trait NestedQueryExecutor: Send + Sync {
    /// Run a query and return its materialized rows.
    fn run(&self, query_id: &str, params: &QueryParams) -> Result<Vec<Datum>>;

    /// Rows already cached for this key, if any.
    fn cached(&self, _key: &QueryKey) -> Option<Vec<Datum>> {
        None
    }

    fn is_cached(&self, key: &QueryKey) -> bool {
        self.cached(key).is_some()
    }
}

/// Run a nested query and shape its rows for the target type.
pub(crate) fn execute_nested_query(
    executor: &dyn NestedQueryExecutor,
    key: &QueryKey,
    target: &TargetType,
    factory: &dyn ObjectFactory,
    prefer_cache: bool,
) -> Result<Datum> {
    let cached = if prefer_cache {
        executor.cached(key)
    } else {
        None
    };
    let rows = match cached {
        Some(rows) => rows,
        None => executor
            .run(&key.query_id, &key.params)
            .map_err(|e| nested_query_error(&key.query_id, e))?,
    };
    extract_object_from_list(rows, target, factory)
}

fn nested_query_error(query_id: &str, err: Error) -> Error {
    match err {
        Error::NestedQuery(_) => err,
        other => Error::NestedQuery(NestedQueryError {
            query_id: query_id.to_string(),
            message: other.to_string(),
            source: Some(Box::new(other)),
        }),
    }
}

/// Loader behind a deferred nested-query cell.
pub(crate) struct QueryLoader {
    executor: Arc<dyn NestedQueryExecutor>,
    factory: Arc<dyn ObjectFactory>,
    key: QueryKey,
    target: TargetType,
    from_cache: bool,
}

impl QueryLoader {
    pub(crate) fn new(
        executor: Arc<dyn NestedQueryExecutor>,
        factory: Arc<dyn ObjectFactory>,
        key: QueryKey,
        target: TargetType,
        from_cache: bool,
    ) -> Self {
        Self {
            executor,
            factory,
            key,
            target,
            from_cache,
        }
    }
}

impl ValueLoader for QueryLoader {
    fn load(&self) -> Result<Datum> {
        execute_nested_query(
            self.executor.as_ref(),
            &self.key,
            &self.target,
            self.factory.as_ref(),
            self.from_cache,
        )
    }

    fn describe(&self) -> String {
        format!("{}({})", self.key.query_id, self.key.params.to_json())
    }
}

impl ResultSetMaterializer<'_> {
    fn require_executor(&self, query_id: &str) -> Result<Arc<dyn NestedQueryExecutor>> {
        self.executor.clone().ok_or_else(|| {
            Error::mapping(
                MappingErrorKind::MissingExecutor,
                format!("Nested query '{}' needs a query executor", query_id),
            )
        })
    }

    /// Value of a nested-query property mapping.
    ///
    /// A cached result or a lazy mapping installs a deferred cell on the
    /// object directly; otherwise the query runs now.
    pub(crate) fn get_nested_query_mapping_value(
        &mut self,
        row: &Row,
        owner: &TargetType,
        object: &ObjectRef,
        mapping: &Arc<FieldMapping>,
        prefix: Option<&str>,
    ) -> Result<PropertyValue> {
        let Some(query_id) = mapping.nested_query.as_deref() else {
            return Ok(PropertyValue::Value(Datum::null()));
        };
        let executor = self.require_executor(query_id)?;
        let Some(params) = prepare_parameter_for_nested_query(row, mapping, prefix)? else {
            return Ok(PropertyValue::Value(Datum::null()));
        };

        let target = mapping
            .ty
            .clone()
            .or_else(|| {
                mapping
                    .property
                    .as_deref()
                    .and_then(|p| self.config.types().setter_type(owner, p))
                    .map(|(ty, _)| ty)
            })
            .unwrap_or(TargetType::Any);
        let key = QueryKey::new(query_id, params);
        let factory = Arc::clone(self.config.factory());

        let from_cache = executor.is_cached(&key);
        let lazy = mapping.lazy && self.config.settings().lazy_loading_enabled;
        if from_cache || lazy {
            let Some(property) = &mapping.property else {
                return Ok(PropertyValue::Deferred);
            };
            tracing::debug!(
                query_id = %query_id,
                property = %property,
                from_cache,
                "Deferring nested query"
            );
            let loader = QueryLoader::new(executor, factory, key, target, from_cache);
            object.set(
                property.clone(),
                Datum::Deferred(Arc::new(DeferredValue::new(loader))),
            );
            return Ok(PropertyValue::Deferred);
        }

        tracing::trace!(query_id = %query_id, "Running nested query");
        let value = execute_nested_query(executor.as_ref(), &key, &target, factory.as_ref(), false)?;
        Ok(PropertyValue::Value(value))
    }

    /// Value of a nested-query constructor argument. Always runs now.
    pub(crate) fn get_nested_query_constructor_value(
        &mut self,
        row: &Row,
        mapping: &Arc<FieldMapping>,
        ty: &TargetType,
        prefix: Option<&str>,
    ) -> Result<Datum> {
        let Some(query_id) = mapping.nested_query.as_deref() else {
            return Ok(Datum::null());
        };
        let executor = self.require_executor(query_id)?;
        let Some(params) = prepare_parameter_for_nested_query(row, mapping, prefix)? else {
            return Ok(Datum::null());
        };
        let key = QueryKey::new(query_id, params);
        execute_nested_query(
            executor.as_ref(),
            &key,
            ty,
            self.config.factory().as_ref(),
            false,
        )
    }
}

/// Parameter object for a nested query, or `None` when a parameter column is
/// NULL and the query must not run.
fn prepare_parameter_for_nested_query(
    row: &Row,
    mapping: &FieldMapping,
    prefix: Option<&str>,
) -> Result<Option<QueryParams>> {
    if mapping.is_composite() {
        let mut values = BTreeMap::new();
        for component in &mapping.composites {
            let (Some(name), Some(column)) = (
                component.property.as_deref(),
                prefixed(component.column.as_deref(), prefix),
            ) else {
                continue;
            };
            let value = read_parameter(row, component, &column)?;
            if value.is_null() {
                return Ok(None);
            }
            values.insert(name.to_string(), value);
        }
        return Ok(Some(QueryParams::Composite(values)));
    }

    let Some(column) = prefixed(mapping.column.as_deref(), prefix) else {
        return Ok(None);
    };
    let value = read_parameter(row, mapping, &column)?;
    Ok((!value.is_null()).then_some(QueryParams::Single(value)))
}

fn read_parameter(row: &Row, mapping: &FieldMapping, column: &str) -> Result<Value> {
    match &mapping.converter {
        Some(converter) => converter.read(row, column),
        None => Ok(row.value_or_null(column).clone()),
    }
}

struct CachedResult {
    rows: Vec<Datum>,
    last_used: Instant,
    hit_count: u64,
}

/// LRU cache of nested query results.
pub struct QueryCache {
    cache: HashMap<QueryKey, CachedResult>,
    max_size: usize,
}

impl QueryCache {
    /// Create a cache holding at most `max_size` results.
    pub fn new(max_size: usize) -> Self {
        Self {
            cache: HashMap::with_capacity(max_size.min(1024)),
            max_size: max_size.max(1),
        }
    }

    /// Rows for a key, marking the entry as recently used.
    pub fn get(&mut self, key: &QueryKey) -> Option<Vec<Datum>> {
        let entry = self.cache.get_mut(key)?;
        entry.last_used = Instant::now();
        entry.hit_count += 1;
        Some(entry.rows.clone())
    }

    /// Store the rows for a key, evicting the least recently used entry
    /// when a new key would overflow the cache.
    pub fn insert(&mut self, key: QueryKey, rows: Vec<Datum>) {
        if !self.cache.contains_key(&key) && self.cache.len() >= self.max_size {
            self.evict_lru();
        }
        self.cache.insert(
            key,
            CachedResult {
                rows,
                last_used: Instant::now(),
                hit_count: 0,
            },
        );
    }

    /// Whether a key is cached. Does not count as a use.
    pub fn contains(&self, key: &QueryKey) -> bool {
        self.cache.contains_key(key)
    }

    /// Times the entry was served from cache.
    pub fn hits(&self, key: &QueryKey) -> Option<u64> {
        self.cache.get(key).map(|e| e.hit_count)
    }

    /// Number of cached results.
    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    pub fn clear(&mut self) {
        self.cache.clear();
    }

    fn evict_lru(&mut self) {
        let lru_key = self
            .cache
            .iter()
            .min_by_key(|(_, entry)| entry.last_used)
            .map(|(key, _)| key.clone());
        if let Some(key) = lru_key {
            self.cache.remove(&key);
        }
    }
}

impl Default for QueryCache {
    fn default() -> Self {
        Self::new(1024)
    }
}

/// Query runner signature wrapped by `CachingExecutor`.
pub type QueryRunner = dyn Fn(&str, &QueryParams) -> Result<Vec<Datum>> + Send + Sync;

/// A nested query executor with an LRU result cache.
pub struct CachingExecutor {
    runner: Box<QueryRunner>,
    cache: Mutex<QueryCache>,
}

impl CachingExecutor {
    pub fn new(
        runner: impl Fn(&str, &QueryParams) -> Result<Vec<Datum>> + Send + Sync + 'static,
    ) -> Self {
        Self::with_capacity(1024, runner)
    }

    pub fn with_capacity(
        max_size: usize,
        runner: impl Fn(&str, &QueryParams) -> Result<Vec<Datum>> + Send + Sync + 'static,
    ) -> Self {
        Self {
            runner: Box::new(runner),
            cache: Mutex::new(QueryCache::new(max_size)),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, QueryCache> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of cached results.
    pub fn cached_len(&self) -> usize {
        self.lock().len()
    }

    pub fn clear_cache(&self) {
        self.lock().clear();
    }
}

impl NestedQueryExecutor for CachingExecutor {
    fn run(&self, query_id: &str, params: &QueryParams) -> Result<Vec<Datum>> {
        let key = QueryKey::new(query_id, params.clone());
        if let Some(rows) = self.lock().get(&key) {
            tracing::trace!(query_id = %query_id, "Nested query served from cache");
            return Ok(rows);
        }

        // The lock is not held while the runner executes; runners may
        // re-enter the executor for their own nested queries.
        let rows = (self.runner)(query_id, params)?;
        self.lock().insert(key, rows.clone());
        Ok(rows)
    }

    fn cached(&self, key: &QueryKey) -> Option<Vec<Datum>> {
        self.lock().get(key)
    }

    fn is_cached(&self, key: &QueryKey) -> bool {
        self.lock().contains(key)
    }
}

impl std::fmt::Debug for CachingExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachingExecutor")
            .field("cached", &self.cached_len())
            .finish_non_exhaustive()
    }
}

/// Hash a query key to a stable u64, for logging and external caches.
pub fn query_key_hash(key: &QueryKey) -> u64 {
    let mut hasher = DefaultHasher::new();
    key.hash(&mut hasher);
    hasher.finish()
}
