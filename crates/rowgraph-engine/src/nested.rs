//! Nested plan recursion within joined rows.

use crate::columns::{ResultSetView, join_prefix, prefixed};
use crate::key::RowKey;
use crate::materializer::ResultSetMaterializer;
use rowgraph_core::meta::MAP_TYPE_NAME;
use rowgraph_core::{
    Datum, Error, FieldMapping, MappingErrorKind, MappingPlan, ObjectRef, Result, Row, TargetType,
};
use std::sync::Arc;

impl ResultSetMaterializer<'_> {
    /// Map one row with a plan that has nested plans.
    ///
    /// With a `partial` object (same identity seen on an earlier row) only
    /// the nested mappings run, growing its collections. Otherwise a new
    /// object is built and cached under `combined_key`.
    pub(crate) fn get_row_value_nested(
        &mut self,
        view: &mut ResultSetView,
        row: &Row,
        plan: &Arc<MappingPlan>,
        combined_key: Option<RowKey>,
        prefix: Option<&str>,
        partial: Option<Datum>,
    ) -> Result<Option<Datum>> {
        let plan_id = plan.id().to_string();

        if let Some(partial) = partial {
            if let Datum::Object(object) = &partial {
                self.ancestor_objects.insert(plan_id.clone(), object.clone());
                let applied = self.apply_nested_result_mappings(
                    view,
                    row,
                    plan,
                    object,
                    prefix,
                    combined_key.as_ref(),
                    false,
                );
                self.ancestor_objects.remove(&plan_id);
                applied?;
            }
            tracing::trace!(plan_id = %plan_id, "Identity cache hit");
            return Ok(Some(partial));
        }

        let created = self.create_result_object(view, row, plan, prefix)?;
        let Some(value) = created.value else {
            return Ok(None);
        };
        let mut found = created.used_constructor_args;

        if let Datum::Object(object) = &value {
            if !self.has_converter_for_result_object(view, plan.target()) {
                if self.should_apply_automatic_mappings(plan, true) {
                    found |= self.apply_automatic_mappings(view, row, plan, object, prefix)?;
                }
                found |= self.apply_property_mappings(view, row, plan, object, prefix)?;

                self.ancestor_objects.insert(plan_id.clone(), object.clone());
                let applied = self.apply_nested_result_mappings(
                    view,
                    row,
                    plan,
                    object,
                    prefix,
                    combined_key.as_ref(),
                    true,
                );
                self.ancestor_objects.remove(&plan_id);
                found |= applied?;

                if !found && !self.config.settings().return_instance_for_empty_row {
                    return Ok(None);
                }
            }
        }

        if let Some(key) = combined_key {
            tracing::trace!(plan_id = %plan_id, "Identity cache miss, caching new object");
            self.nested_result_objects.insert(key, value.clone());
        }
        Ok(Some(value))
    }

    /// Apply every nested-plan mapping of `plan` to `object`. Returns whether
    /// any nested value was found.
    #[allow(clippy::too_many_arguments)]
    fn apply_nested_result_mappings(
        &mut self,
        view: &mut ResultSetView,
        row: &Row,
        plan: &MappingPlan,
        object: &ObjectRef,
        parent_prefix: Option<&str>,
        parent_key: Option<&RowKey>,
        new_object: bool,
    ) -> Result<bool> {
        let mut found = false;

        for mapping in plan.property_mappings() {
            let Some(nested_id) = &mapping.nested_plan else {
                continue;
            };
            if mapping.result_set.is_some() {
                continue;
            }

            let applied = self.apply_nested_result_mapping(
                view,
                row,
                object,
                mapping,
                nested_id,
                parent_prefix,
                parent_key,
                new_object,
            );
            found |= applied
                .map_err(|e| e.at_row(plan.id(), mapping.property.as_deref(), self.current_row))?;
        }
        Ok(found)
    }

    #[allow(clippy::too_many_arguments)]
    fn apply_nested_result_mapping(
        &mut self,
        view: &mut ResultSetView,
        row: &Row,
        object: &ObjectRef,
        mapping: &FieldMapping,
        nested_id: &str,
        parent_prefix: Option<&str>,
        parent_key: Option<&RowKey>,
        new_object: bool,
    ) -> Result<bool> {
        let prefix = join_prefix(parent_prefix, mapping.column_prefix.as_deref());
        let prefix = prefix.as_deref();
        let nested = Arc::clone(self.config.require_plan(nested_id)?);
        let nested = self.resolve_discriminated_plan(view, row, &nested, prefix)?;

        if mapping.column_prefix.is_none() {
            let ancestor = self
                .ancestor_objects
                .get(nested_id)
                .or_else(|| self.ancestor_objects.get(nested.id()))
                .cloned();
            if let Some(ancestor) = ancestor {
                // Cycle back to an object still under construction.
                if new_object {
                    self.link_objects(object, mapping, Datum::Object(ancestor))?;
                }
                return Ok(false);
            }
        }

        let row_key = self.create_row_key(view, row, &nested, prefix)?;
        let combined_key = row_key.as_ref().and_then(|k| k.combine(parent_key));
        let known = combined_key
            .as_ref()
            .and_then(|k| self.nested_result_objects.get(k))
            .cloned();
        let is_new = known.is_none();

        self.instantiate_collection_property_if_appropriate(object, mapping)?;
        if !self.any_not_null_column_has_value(view, row, mapping, prefix) {
            return Ok(false);
        }

        let value = self.get_row_value_nested(view, row, &nested, combined_key, prefix, known)?;
        match value {
            Some(value) if is_new => {
                self.link_objects(object, mapping, value)?;
                Ok(true)
            }
            Some(_) => Ok(true),
            None => Ok(false),
        }
    }

    /// Whether this row carries data for a nested mapping: any guard column
    /// non-null, or, without guards, any column under the prefix.
    fn any_not_null_column_has_value(
        &self,
        view: &ResultSetView,
        row: &Row,
        mapping: &FieldMapping,
        prefix: Option<&str>,
    ) -> bool {
        if !mapping.not_null_columns.is_empty() {
            return mapping.not_null_columns.iter().any(|column| {
                prefixed(Some(column), prefix)
                    .is_some_and(|c| !row.value_or_null(&c).is_null())
            });
        }
        match prefix {
            Some(prefix) => view.has_prefixed_column(prefix),
            None => true,
        }
    }

    /// Link `value` into `owner`: appended for collection properties, set
    /// otherwise.
    pub(crate) fn link_objects(
        &self,
        owner: &ObjectRef,
        mapping: &FieldMapping,
        value: Datum,
    ) -> Result<()> {
        let Some(property) = &mapping.property else {
            return Ok(());
        };
        let is_collection = self.instantiate_collection_property_if_appropriate(owner, mapping)?;
        let mut record = owner.write();
        if is_collection {
            match record.get_mut(property) {
                Some(Datum::List(items)) => items.push(value),
                _ => record.set(property.clone(), Datum::List(vec![value])),
            }
        } else {
            record.set(property.clone(), value);
        }
        Ok(())
    }

    /// Make sure a collection property holds a collection. Returns whether
    /// the property is a collection.
    pub(crate) fn instantiate_collection_property_if_appropriate(
        &self,
        owner: &ObjectRef,
        mapping: &FieldMapping,
    ) -> Result<bool> {
        let Some(property) = &mapping.property else {
            return Ok(false);
        };
        match owner.get(property) {
            Some(Datum::List(_)) => return Ok(true),
            Some(current) if !current.is_null() => return Ok(false),
            _ => {}
        }

        let owner_type = owner_target_type(owner);
        let ty = mapping.ty.clone().or_else(|| {
            self.config
                .types()
                .setter_type(&owner_type, property)
                .map(|(ty, _)| ty)
                .filter(|ty| *ty != TargetType::Any)
        });
        match ty {
            Some(ty) if self.config.factory().is_collection_type(&ty) => {
                let collection = self.config.factory().new_instance(&ty)?;
                owner.set(property.clone(), collection);
                Ok(true)
            }
            Some(_) => Ok(false),
            None if owner_type == TargetType::Map => Ok(false),
            None => Err(Error::mapping(
                MappingErrorKind::AmbiguousCollection,
                format!(
                    "Cannot determine the type of property '{}' on {}; declare it on the mapping or the type",
                    property, owner_type
                ),
            )),
        }
    }
}

fn owner_target_type(owner: &ObjectRef) -> TargetType {
    let name = owner.type_name();
    if name == MAP_TYPE_NAME {
        TargetType::Map
    } else {
        TargetType::Object(name)
    }
}
