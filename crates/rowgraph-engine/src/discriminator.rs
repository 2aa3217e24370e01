//! Discriminator resolution.

use crate::columns::{ResultSetView, prefixed};
use crate::materializer::ResultSetMaterializer;
use rowgraph_core::{Discriminator, Error, MappingErrorKind, MappingPlan, Result, Row, Value};
use std::collections::HashSet;
use std::sync::Arc;

impl ResultSetMaterializer<'_> {
    /// Follow discriminators from `plan` to the most specific plan for `row`.
    ///
    /// An unmatched tag, an unknown target plan, a discriminator that repeats
    /// itself or a revisited plan id all end the chain at the last plan
    /// reached.
    pub(crate) fn resolve_discriminated_plan(
        &self,
        view: &ResultSetView,
        row: &Row,
        plan: &Arc<MappingPlan>,
        prefix: Option<&str>,
    ) -> Result<Arc<MappingPlan>> {
        let mut visited = HashSet::new();
        let mut current = Arc::clone(plan);
        let mut discriminator = current.discriminator().cloned();

        while let Some(last) = discriminator {
            let value = self.discriminator_value(view, row, &last, prefix)?;
            let tag = value.to_string();
            let Some(next) = last
                .plan_for(&tag)
                .and_then(|id| self.config.plan(id))
                .cloned()
            else {
                break;
            };

            tracing::trace!(from = %current.id(), to = %next.id(), tag = %tag, "Discriminator switched plan");
            current = next;
            discriminator = current.discriminator().cloned();
            let repeats = discriminator
                .as_ref()
                .is_some_and(|d| Arc::ptr_eq(d, &last));
            if repeats || !visited.insert(current.id().to_string()) {
                break;
            }
        }
        Ok(current)
    }

    fn discriminator_value(
        &self,
        view: &ResultSetView,
        row: &Row,
        discriminator: &Discriminator,
        prefix: Option<&str>,
    ) -> Result<Value> {
        let column = prefixed(Some(&discriminator.column), prefix)
            .unwrap_or_else(|| discriminator.column.clone());
        let converter = match &discriminator.converter {
            Some(converter) => Arc::clone(converter),
            None => self
                .config
                .converters()
                .get(&discriminator.ty, view.column_type(&column))
                .ok_or_else(|| {
                    Error::mapping(
                        MappingErrorKind::MissingConverter,
                        format!(
                            "No converter for discriminator column '{}' as {}",
                            column, discriminator.ty
                        ),
                    )
                })?,
        };
        converter.read(row, &column)
    }
}
