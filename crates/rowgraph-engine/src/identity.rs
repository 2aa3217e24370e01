//! Row identity construction.

use crate::columns::{ResultSetView, join_prefix, prefixed, strip_prefix};
use crate::key::RowKey;
use crate::materializer::ResultSetMaterializer;
use rowgraph_core::{FieldMapping, MappingPlan, Result, Row, TargetType, Value};
use std::sync::Arc;

impl ResultSetMaterializer<'_> {
    /// Identity of `row` under `plan`, or `None` when the row cannot be
    /// identified and must not be deduplicated.
    pub(crate) fn create_row_key(
        &self,
        view: &mut ResultSetView,
        row: &Row,
        plan: &MappingPlan,
        prefix: Option<&str>,
    ) -> Result<Option<RowKey>> {
        let mut key = RowKey::seeded(plan.id());
        let mappings = Self::row_key_mappings(plan);

        if mappings.is_empty() {
            if *plan.target() == TargetType::Map {
                Self::row_key_for_map(row, &mut key);
            } else {
                self.row_key_for_unmapped_properties(view, row, plan, &mut key, prefix);
            }
        } else {
            self.row_key_for_mapped_properties(view, row, plan, &mut key, mappings, prefix)?;
        }

        let stable = key.into_stable();
        tracing::trace!(plan_id = %plan.id(), stable = stable.is_some(), "Computed row key");
        Ok(stable)
    }

    /// Identity mappings, else plain property mappings, else constructor
    /// arguments.
    fn row_key_mappings(plan: &MappingPlan) -> &[Arc<FieldMapping>] {
        if !plan.id_mappings().is_empty() {
            plan.id_mappings()
        } else if !plan.property_mappings().is_empty() {
            plan.property_mappings()
        } else {
            plan.constructor_mappings()
        }
    }

    fn row_key_for_mapped_properties(
        &self,
        view: &mut ResultSetView,
        row: &Row,
        plan: &MappingPlan,
        key: &mut RowKey,
        mappings: &[Arc<FieldMapping>],
        prefix: Option<&str>,
    ) -> Result<()> {
        let partition = view.partition(plan, prefix);
        for mapping in mappings {
            if mapping.result_set.is_some() || mapping.nested_query.is_some() {
                continue;
            }
            if let Some(nested_id) = &mapping.nested_plan {
                // Nested objects contribute their constructor arguments.
                let nested = Arc::clone(self.config.require_plan(nested_id)?);
                let nested_prefix = join_prefix(prefix, mapping.column_prefix.as_deref());
                self.row_key_for_mapped_properties(
                    view,
                    row,
                    &nested,
                    key,
                    nested.constructor_mappings(),
                    nested_prefix.as_deref(),
                )?;
                continue;
            }

            let Some(column) = prefixed(mapping.column.as_deref(), prefix) else {
                continue;
            };
            if !partition.is_mapped(&column) {
                continue;
            }
            let converter = self.mapping_converter(plan.target(), mapping, view.column_type(&column))?;
            let value = converter.read(row, &column)?;
            if !value.is_null() || self.config.settings().return_instance_for_empty_row {
                key.update_label(&column);
                key.update_value(&value);
            }
        }
        Ok(())
    }

    fn row_key_for_unmapped_properties(
        &self,
        view: &mut ResultSetView,
        row: &Row,
        plan: &MappingPlan,
        key: &mut RowKey,
        prefix: Option<&str>,
    ) {
        let camel_case = self.config.settings().map_underscore_to_camel_case;
        let partition = view.partition(plan, prefix);
        for column in partition.unmapped() {
            let Some(property) = strip_prefix(column, prefix) else {
                continue;
            };
            if self
                .config
                .types()
                .find_property(plan.target(), property, camel_case)
                .is_none()
            {
                continue;
            }
            let value = row.value_or_null(column);
            if !value.is_null() {
                key.update_label(column);
                key.update_value(&Value::Text(value.to_string()));
            }
        }
    }

    fn row_key_for_map(row: &Row, key: &mut RowKey) {
        for (column, value) in row.iter() {
            if !value.is_null() {
                key.update_label(column);
                key.update_value(&Value::Text(value.to_string()));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rowgraph_core::{
        ColumnInfo, Configuration, StatementPlan, TypeDescriptor, TypeRegistry,
    };

    fn columns() -> Arc<ColumnInfo> {
        Arc::new(ColumnInfo::new(vec![
            "id".into(),
            "title".into(),
            "extra".into(),
        ]))
    }

    fn key_for(config: &Configuration, plan_id: &str, values: Vec<Value>) -> Option<RowKey> {
        let statement = StatementPlan::new("s").plan(plan_id);
        let materializer = ResultSetMaterializer::new(config, &statement);
        let mut view = ResultSetView::new(columns());
        let row = Row::with_columns(columns(), values);
        let plan = config.plan(plan_id).unwrap();
        materializer
            .create_row_key(&mut view, &row, plan, None)
            .unwrap()
    }

    fn config() -> Configuration {
        Configuration::builder()
            .types(TypeRegistry::new().with(
                TypeDescriptor::new("Blog")
                    .property("id", TargetType::I64)
                    .property("title", TargetType::Text),
            ))
            .plan(
                MappingPlan::builder("withId", TargetType::object("Blog"))
                    .mapping(FieldMapping::id("id", "id"))
                    .mapping(FieldMapping::property("title", "title"))
                    .build()
                    .unwrap(),
            )
            .plan(
                MappingPlan::builder("noId", TargetType::object("Blog"))
                    .mapping(FieldMapping::property("title", "title"))
                    .build()
                    .unwrap(),
            )
            .plan(MappingPlan::builder("reflective", TargetType::object("Blog")).build().unwrap())
            .plan(MappingPlan::builder("map", TargetType::Map).build().unwrap())
            .build()
            .unwrap()
    }

    fn row(id: i64, title: &str, extra: &str) -> Vec<Value> {
        vec![Value::BigInt(id), Value::Text(title.into()), Value::Text(extra.into())]
    }

    #[test]
    fn test_identity_columns_only() {
        let config = config();
        let a = key_for(&config, "withId", row(1, "a", "x"));
        let b = key_for(&config, "withId", row(1, "b", "y"));
        let c = key_for(&config, "withId", row(2, "a", "x"));
        assert!(a.is_some());
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_falls_back_to_property_mappings() {
        let config = config();
        let a = key_for(&config, "noId", row(1, "a", "x"));
        let b = key_for(&config, "noId", row(2, "a", "y"));
        assert_eq!(a, b);
    }

    #[test]
    fn test_null_identity_is_unstable() {
        let config = config();
        let key = key_for(
            &config,
            "withId",
            vec![Value::Null, Value::Text("a".into()), Value::Null],
        );
        assert!(key.is_none());
    }

    #[test]
    fn test_reflective_and_map_keys() {
        let config = config();
        // "extra" is not a property of Blog and does not count
        let a = key_for(&config, "reflective", row(1, "a", "x"));
        let b = key_for(&config, "reflective", row(1, "a", "y"));
        assert_eq!(a, b);

        let a = key_for(&config, "map", row(1, "a", "x"));
        let b = key_for(&config, "map", row(1, "a", "y"));
        assert_ne!(a, b);
    }
}
