//! The result-set materializer.
//!
//! One `ResultSetMaterializer` serves one statement execution. It reads the
//! statement's cursors in order and turns their rows into object graphs:
//!
//! - flat plans map each row to one object
//! - plans with nested plans deduplicate rows by identity and grow nested
//!   collections across joined rows
//! - mappings fed by a later named result set are linked once that cursor
//!   is read
//!
//! All mutable state (identity cache, ancestor frame, pending relations,
//! automatic mapping cache) lives on the materializer and is discarded when
//! the call ends. The `Configuration` is only read.

use crate::bounds::RowBounds;
use crate::columns::ResultSetView;
use crate::correlate::PendingRelation;
use crate::handler::{DefaultResultHandler, ResultContext, ResultHandler};
use crate::key::RowKey;
use crate::nested_query::NestedQueryExecutor;
use crate::populate::AutoMapping;
use rowgraph_core::{
    Configuration, Datum, Error, FieldMapping, MappingErrorKind, MappingPlan, ObjectRef, Result,
    Row, RowCursor, StatementPlan,
};
use std::collections::HashMap;
use std::sync::Arc;

/// Output of the bulk contract.
#[derive(Debug, Clone, PartialEq)]
pub enum MaterializedResults {
    /// The statement produced one result list
    Single(Vec<Datum>),
    /// One list per mapped result set
    Multiple(Vec<Vec<Datum>>),
}

impl MaterializedResults {
    fn collapse(mut lists: Vec<Vec<Datum>>) -> Self {
        if lists.len() == 1 {
            MaterializedResults::Single(lists.pop().unwrap_or_default())
        } else {
            MaterializedResults::Multiple(lists)
        }
    }

    /// The single list, or the first of several.
    pub fn into_single(self) -> Vec<Datum> {
        match self {
            MaterializedResults::Single(list) => list,
            MaterializedResults::Multiple(lists) => lists.into_iter().next().unwrap_or_default(),
        }
    }

    /// Every list, one per result set.
    pub fn into_lists(self) -> Vec<Vec<Datum>> {
        match self {
            MaterializedResults::Single(list) => vec![list],
            MaterializedResults::Multiple(lists) => lists,
        }
    }

    /// The results as one datum list; several result sets become nested lists.
    pub fn into_datums(self) -> Vec<Datum> {
        match self {
            MaterializedResults::Single(list) => list,
            MaterializedResults::Multiple(lists) => lists.into_iter().map(Datum::List).collect(),
        }
    }
}

/// Materializes the cursors of one statement execution.
pub struct ResultSetMaterializer<'a> {
    pub(crate) config: &'a Configuration,
    pub(crate) statement: &'a StatementPlan,
    pub(crate) bounds: RowBounds,
    pub(crate) executor: Option<Arc<dyn NestedQueryExecutor>>,

    /// Identity cache: combined row key -> object
    pub(crate) nested_result_objects: HashMap<RowKey, Datum>,
    /// Plan id -> object under construction on the current recursion path
    pub(crate) ancestor_objects: HashMap<String, ObjectRef>,
    /// Last top-level object of an unfinished nested pass, with its row
    pub(crate) previous_row_value: Option<(Datum, Row)>,
    /// Result set name -> mapping waiting for its rows
    pub(crate) next_result_maps: HashMap<String, Arc<FieldMapping>>,
    pub(crate) pending_relations: HashMap<RowKey, Vec<PendingRelation>>,
    /// "plan id:prefix" -> automatic mappings
    pub(crate) auto_mapping_cache: HashMap<String, Arc<Vec<AutoMapping>>>,

    /// Rows read from the current cursor, skipped ones included
    rows_read: usize,
    /// Zero-based position of the row being materialized
    pub(crate) current_row: usize,
}

impl<'a> ResultSetMaterializer<'a> {
    pub fn new(config: &'a Configuration, statement: &'a StatementPlan) -> Self {
        Self {
            config,
            statement,
            bounds: RowBounds::default(),
            executor: None,
            nested_result_objects: HashMap::new(),
            ancestor_objects: HashMap::new(),
            previous_row_value: None,
            next_result_maps: HashMap::new(),
            pending_relations: HashMap::new(),
            auto_mapping_cache: HashMap::new(),
            rows_read: 0,
            current_row: 0,
        }
    }

    #[must_use]
    pub fn with_bounds(mut self, bounds: RowBounds) -> Self {
        self.bounds = bounds;
        self
    }

    /// Executor for field mappings backed by nested queries.
    #[must_use]
    pub fn with_executor(mut self, executor: Arc<dyn NestedQueryExecutor>) -> Self {
        self.executor = Some(executor);
        self
    }

    /// Materialize every cursor into lists (the bulk contract).
    ///
    /// One mapped result set yields `Single`; several yield `Multiple`.
    #[tracing::instrument(level = "debug", skip(self, cursors), fields(statement = %self.statement.id))]
    pub fn handle_result_sets(
        &mut self,
        cursors: Vec<Box<dyn RowCursor>>,
    ) -> Result<MaterializedResults> {
        let lists = self.run(cursors, None)?;
        tracing::debug!(
            result_sets = lists.len(),
            objects = lists.iter().map(Vec::len).sum::<usize>(),
            "Materialized result sets"
        );
        Ok(MaterializedResults::collapse(lists))
    }

    /// Hand each top-level object to `handler` as soon as it is created.
    #[tracing::instrument(level = "debug", skip(self, cursors, handler), fields(statement = %self.statement.id))]
    pub fn stream_result_sets(
        &mut self,
        cursors: Vec<Box<dyn RowCursor>>,
        handler: &mut dyn ResultHandler,
    ) -> Result<()> {
        self.run(cursors, Some(handler)).map(|_| ())
    }

    /// At most one result; more than one is a cardinality error.
    #[tracing::instrument(level = "debug", skip(self, cursors), fields(statement = %self.statement.id))]
    pub fn select_one(&mut self, cursors: Vec<Box<dyn RowCursor>>) -> Result<Option<Datum>> {
        let lists = self.run(cursors, None)?;
        let mut results = MaterializedResults::collapse(lists).into_datums();
        match results.len() {
            0 => Ok(None),
            1 => Ok(results.pop()),
            found => Err(Error::TooManyResults { expected: 1, found }),
        }
    }

    /// Run a pass and close every cursor whatever the outcome.
    fn run(
        &mut self,
        mut cursors: Vec<Box<dyn RowCursor>>,
        mut handler: Option<&mut dyn ResultHandler>,
    ) -> Result<Vec<Vec<Datum>>> {
        self.reset();
        let outcome = self.process_cursors(&mut cursors, &mut handler);
        let closed = close_all(&mut cursors);
        self.reset();
        let lists = outcome?;
        closed?;
        Ok(lists)
    }

    fn reset(&mut self) {
        self.nested_result_objects.clear();
        self.ancestor_objects.clear();
        self.previous_row_value = None;
        self.next_result_maps.clear();
        self.pending_relations.clear();
        self.auto_mapping_cache.clear();
        self.rows_read = 0;
        self.current_row = 0;
    }

    fn process_cursors(
        &mut self,
        cursors: &mut [Box<dyn RowCursor>],
        handler: &mut Option<&mut dyn ResultHandler>,
    ) -> Result<Vec<Vec<Datum>>> {
        let statement = self.statement;
        if statement.result_ordered && self.bounds.is_bounded() {
            return Err(Error::mapping(
                MappingErrorKind::UnsafeRowBounds,
                format!(
                    "Statement '{}' is result-ordered and cannot be combined with a row window",
                    statement.id
                ),
            ));
        }
        if statement.result_plans.is_empty() && !cursors.is_empty() {
            return Err(Error::mapping(
                MappingErrorKind::NoMappingPlans,
                format!(
                    "A query was run and no mapping plans were found for statement '{}'",
                    statement.id
                ),
            ));
        }

        let mut lists = Vec::new();
        for (index, cursor) in cursors.iter_mut().enumerate() {
            let cursor = cursor.as_mut();
            if let Some(plan_id) = statement.result_plans.get(index) {
                let plan = Arc::clone(self.config.require_plan(plan_id)?);
                if let Some(handler) = handler {
                    self.handle_row_values(cursor, &plan, &mut **handler, self.bounds, None, true)?;
                } else {
                    let mut collector = DefaultResultHandler::new();
                    self.handle_row_values(cursor, &plan, &mut collector, self.bounds, None, false)?;
                    lists.push(collector.into_results());
                }
            } else if let Some(parent) = statement
                .result_sets
                .get(index)
                .and_then(|name| self.next_result_maps.get(name))
                .cloned()
            {
                let plan_id = parent.nested_plan.as_deref().ok_or_else(|| {
                    Error::mapping(
                        MappingErrorKind::InvalidMapping,
                        format!("Mapping '{}' names a result set but no plan", parent.label()),
                    )
                })?;
                let plan = Arc::clone(self.config.require_plan(plan_id)?);
                let mut discard = DefaultResultHandler::new();
                self.handle_row_values(
                    cursor,
                    &plan,
                    &mut discard,
                    RowBounds::default(),
                    Some(&parent),
                    false,
                )?;
            } else {
                tracing::debug!(index, "Skipping result set without a mapping plan");
            }

            if !cursor.is_closed() {
                cursor.close()?;
            }
            self.clean_up_after_result_set();
        }
        Ok(lists)
    }

    fn clean_up_after_result_set(&mut self) {
        self.nested_result_objects.clear();
        self.auto_mapping_cache.clear();
    }

    fn handle_row_values(
        &mut self,
        cursor: &mut dyn RowCursor,
        plan: &Arc<MappingPlan>,
        handler: &mut dyn ResultHandler,
        bounds: RowBounds,
        parent: Option<&Arc<FieldMapping>>,
        custom_handler: bool,
    ) -> Result<()> {
        let mut view = ResultSetView::new(cursor.columns());
        self.rows_read = 0;
        self.current_row = 0;

        if plan.has_nested_plans() {
            self.ensure_no_row_bounds(bounds)?;
            if custom_handler {
                self.check_result_handler()?;
            }
            self.handle_row_values_for_nested(&mut view, cursor, plan, handler, bounds, parent)
        } else {
            self.handle_row_values_for_simple(&mut view, cursor, plan, handler, bounds, parent)
        }
    }

    fn ensure_no_row_bounds(&self, bounds: RowBounds) -> Result<()> {
        if self.config.settings().safe_row_bounds_enabled && bounds.is_bounded() {
            return Err(Error::mapping(
                MappingErrorKind::UnsafeRowBounds,
                "Mapped statements with nested plans cannot be safely constrained by a row window. \
                 Disable safe_row_bounds_enabled to bypass this check.",
            ));
        }
        Ok(())
    }

    fn check_result_handler(&self) -> Result<()> {
        if self.config.settings().safe_result_handler_enabled && !self.statement.result_ordered {
            return Err(Error::mapping(
                MappingErrorKind::UnsafeResultHandler,
                "Mapped statements with nested plans cannot be safely used with a custom result handler. \
                 Mark the statement result-ordered or disable safe_result_handler_enabled to bypass this check.",
            ));
        }
        Ok(())
    }

    fn skip_rows(&mut self, cursor: &mut dyn RowCursor, bounds: RowBounds, plan: &MappingPlan) -> Result<()> {
        if bounds.offset > RowBounds::NO_ROW_OFFSET {
            let skipped = cursor
                .skip_rows(bounds.offset)
                .map_err(|e| e.at_row(plan.id(), None, self.rows_read))?;
            self.rows_read += skipped;
        }
        Ok(())
    }

    fn next_row(&mut self, cursor: &mut dyn RowCursor, plan: &MappingPlan) -> Result<Option<Row>> {
        let row = cursor
            .next_row()
            .map_err(|e| e.at_row(plan.id(), None, self.rows_read))?;
        if row.is_some() {
            self.current_row = self.rows_read;
            self.rows_read += 1;
        }
        Ok(row)
    }

    fn should_process_more_rows(context: &ResultContext, bounds: RowBounds) -> bool {
        !context.is_stopped() && context.result_count() < bounds.limit
    }

    fn store_object(
        &mut self,
        handler: &mut dyn ResultHandler,
        context: &mut ResultContext,
        value: Option<Datum>,
        parent: Option<&Arc<FieldMapping>>,
        row: &Row,
    ) -> Result<()> {
        if let Some(parent) = parent {
            self.link_to_parents(row, parent, value)
        } else {
            context.next(value.unwrap_or_else(Datum::null));
            handler.handle_result(context)
        }
    }

    fn handle_row_values_for_simple(
        &mut self,
        view: &mut ResultSetView,
        cursor: &mut dyn RowCursor,
        plan: &Arc<MappingPlan>,
        handler: &mut dyn ResultHandler,
        bounds: RowBounds,
        parent: Option<&Arc<FieldMapping>>,
    ) -> Result<()> {
        let mut context = ResultContext::new();
        self.skip_rows(cursor, bounds, plan)?;

        while Self::should_process_more_rows(&context, bounds) {
            let Some(row) = self.next_row(cursor, plan)? else {
                break;
            };
            let value = self
                .resolve_discriminated_plan(view, &row, plan, None)
                .and_then(|discriminated| self.get_row_value(view, &row, &discriminated, None))
                .map_err(|e| e.at_row(plan.id(), None, self.current_row))?;
            self.store_object(handler, &mut context, value, parent, &row)?;
        }

        tracing::debug!(
            plan_id = %plan.id(),
            rows = self.rows_read,
            objects = context.result_count(),
            "Materialized flat result set"
        );
        Ok(())
    }

    fn handle_row_values_for_nested(
        &mut self,
        view: &mut ResultSetView,
        cursor: &mut dyn RowCursor,
        plan: &Arc<MappingPlan>,
        handler: &mut dyn ResultHandler,
        bounds: RowBounds,
        parent: Option<&Arc<FieldMapping>>,
    ) -> Result<()> {
        let mut context = ResultContext::new();
        self.skip_rows(cursor, bounds, plan)?;
        let ordered = self.statement.result_ordered;
        let mut row_value = self.previous_row_value.take();

        while Self::should_process_more_rows(&context, bounds) {
            let Some(row) = self.next_row(cursor, plan)? else {
                break;
            };
            let discriminated = self
                .resolve_discriminated_plan(view, &row, plan, None)
                .map_err(|e| e.at_row(plan.id(), None, self.current_row))?;
            let row_key = self
                .create_row_key(view, &row, &discriminated, None)
                .map_err(|e| e.at_row(discriminated.id(), None, self.current_row))?;
            let partial = row_key
                .as_ref()
                .and_then(|key| self.nested_result_objects.get(key))
                .cloned();

            if ordered && partial.is_none() {
                if let Some((previous, previous_row)) = row_value.take() {
                    tracing::debug!(plan_id = %plan.id(), "Flushing completed top-level object");
                    // Sorted input never returns to a flushed object, so its
                    // children leave the cache with it.
                    self.nested_result_objects.clear();
                    self.store_object(handler, &mut context, Some(previous), parent, &previous_row)?;
                }
            }

            let is_new = partial.is_none();
            let value = self
                .get_row_value_nested(view, &row, &discriminated, row_key, None, partial)
                .map_err(|e| e.at_row(discriminated.id(), None, self.current_row))?;

            if !ordered && is_new {
                self.store_object(handler, &mut context, value.clone(), parent, &row)?;
            }
            row_value = value.map(|v| (v, row));
        }

        if let Some((value, row)) = row_value {
            if ordered && Self::should_process_more_rows(&context, bounds) {
                self.store_object(handler, &mut context, Some(value), parent, &row)?;
            } else {
                self.previous_row_value = Some((value, row));
            }
        }

        tracing::debug!(
            plan_id = %plan.id(),
            rows = self.rows_read,
            objects = context.result_count(),
            cached = self.nested_result_objects.len(),
            "Materialized nested result set"
        );
        Ok(())
    }
}

/// Close every cursor not yet closed; report the first failure.
fn close_all(cursors: &mut [Box<dyn RowCursor>]) -> Result<()> {
    let mut first_error = None;
    for cursor in cursors.iter_mut() {
        if cursor.is_closed() {
            continue;
        }
        if let Err(e) = cursor.close() {
            tracing::debug!(error = %e, "Failed to close cursor");
            first_error.get_or_insert(e);
        }
    }
    first_error.map_or(Ok(()), Err)
}

impl std::fmt::Debug for ResultSetMaterializer<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultSetMaterializer")
            .field("statement", &self.statement.id)
            .field("bounds", &self.bounds)
            .field("cached_objects", &self.nested_result_objects.len())
            .field("pending_relations", &self.pending_relations.len())
            .finish_non_exhaustive()
    }
}
