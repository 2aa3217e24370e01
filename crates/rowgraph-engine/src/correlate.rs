//! Correlation of later named result sets with their holders.
//!
//! A mapping fed by a named result set records each holder under a key
//! built from the holder row's local columns. When the named cursor is
//! read, each of its rows computes the same key from the foreign columns
//! and is linked into every holder waiting on it.

use crate::key::RowKey;
use crate::materializer::ResultSetMaterializer;
use rowgraph_core::{Datum, Error, FieldMapping, MappingErrorKind, ObjectRef, Result, Row, Value};
use std::sync::Arc;

/// A holder waiting for rows of a later result set.
#[derive(Debug, Clone)]
pub(crate) struct PendingRelation {
    pub(crate) owner: ObjectRef,
    pub(crate) mapping: Arc<FieldMapping>,
}

impl ResultSetMaterializer<'_> {
    /// Register `owner` as waiting for the result set named by `mapping`.
    pub(crate) fn add_pending_child_relation(
        &mut self,
        row: &Row,
        owner: &ObjectRef,
        mapping: &Arc<FieldMapping>,
    ) -> Result<()> {
        let Some(result_set) = mapping.result_set.as_deref() else {
            return Ok(());
        };
        let key = create_key_for_multiple_results(
            row,
            mapping,
            mapping.column.as_deref(),
            mapping.column.as_deref(),
        );
        self.pending_relations
            .entry(key)
            .or_default()
            .push(PendingRelation {
                owner: owner.clone(),
                mapping: Arc::clone(mapping),
            });

        match self.next_result_maps.get(result_set) {
            None => {
                tracing::debug!(result_set, mapping = %mapping.label(), "Registered pending relation");
                self.next_result_maps
                    .insert(result_set.to_string(), Arc::clone(mapping));
            }
            Some(previous) if !same_relation(previous, mapping) => {
                return Err(Error::mapping(
                    MappingErrorKind::DuplicateResultSetMapping,
                    format!(
                        "Two different properties are mapped to the same result set '{}'",
                        result_set
                    ),
                ));
            }
            Some(_) => {}
        }
        Ok(())
    }

    /// Link a row of a later result set into every holder with its key.
    pub(crate) fn link_to_parents(
        &mut self,
        row: &Row,
        parent_mapping: &Arc<FieldMapping>,
        value: Option<Datum>,
    ) -> Result<()> {
        let key = create_key_for_multiple_results(
            row,
            parent_mapping,
            parent_mapping.column.as_deref(),
            parent_mapping.foreign_column.as_deref(),
        );
        let Some(value) = value else {
            return Ok(());
        };
        let Some(parents) = self.pending_relations.get(&key).cloned() else {
            return Ok(());
        };
        for parent in &parents {
            self.link_objects(&parent.owner, &parent.mapping, value.clone())?;
        }
        Ok(())
    }
}

/// Sub-plans of a discriminator may each declare the relation; they agree
/// when they fill the same property through the same nested plan.
fn same_relation(previous: &FieldMapping, mapping: &FieldMapping) -> bool {
    previous.property == mapping.property && previous.nested_plan == mapping.nested_plan
}

/// Key from `names[i]` paired with the value of `columns[i]`; NULL columns
/// are left out.
fn create_key_for_multiple_results(
    row: &Row,
    mapping: &FieldMapping,
    names: Option<&str>,
    columns: Option<&str>,
) -> RowKey {
    let mut key = RowKey::new();
    key.update_label(mapping.result_set.as_deref().unwrap_or(""));
    key.update_label(&mapping.label());
    if let (Some(names), Some(columns)) = (names, columns) {
        for (name, column) in names.split(',').zip(columns.split(',')) {
            let value = row.value_or_null(column.trim());
            if !value.is_null() {
                key.update_label(name.trim());
                key.update_value(&Value::Text(value.to_string()));
            }
        }
    }
    key
}

#[cfg(test)]
mod tests {
    use super::*;
    use rowgraph_core::{Configuration, Record, StatementPlan, TargetType, TypeDescriptor, TypeRegistry};

    fn config() -> Configuration {
        Configuration::builder()
            .types(TypeRegistry::new().with(
                TypeDescriptor::new("Blog").property("posts", TargetType::list(TargetType::Any)),
            ))
            .build()
            .unwrap()
    }

    fn posts_mapping() -> Arc<FieldMapping> {
        Arc::new(FieldMapping::result_set("posts", "post", "posts", "id", "blog_id"))
    }

    #[test]
    fn test_keys_match_across_sides() {
        let mapping = posts_mapping();
        let parent = Row::new(vec!["id".into()], vec![Value::Int(1)]);
        let child = Row::new(
            vec!["post_id".into(), "blog_id".into()],
            vec![Value::Int(10), Value::BigInt(1)],
        );
        let parent_key = create_key_for_multiple_results(&parent, &mapping, Some("id"), Some("id"));
        let child_key =
            create_key_for_multiple_results(&child, &mapping, Some("id"), Some("blog_id"));
        assert_eq!(parent_key, child_key);
    }

    #[test]
    fn test_fan_out_to_matching_holders_only() {
        let config = config();
        let statement = StatementPlan::new("s");
        let mut materializer = ResultSetMaterializer::new(&config, &statement);
        let mapping = posts_mapping();

        let blogs: Vec<ObjectRef> = (0..3).map(|_| ObjectRef::new(Record::new("Blog"))).collect();
        for (blog, id) in blogs.iter().zip([1, 1, 2]) {
            let row = Row::new(vec!["id".into()], vec![Value::Int(id)]);
            materializer.add_pending_child_relation(&row, blog, &mapping).unwrap();
        }

        let child = Row::new(vec!["blog_id".into()], vec![Value::Int(1)]);
        materializer
            .link_to_parents(&child, &mapping, Some(Datum::from(Value::Int(10))))
            .unwrap();

        assert_eq!(blogs[0].list("posts").len(), 1);
        assert_eq!(blogs[1].list("posts").len(), 1);
        assert!(blogs[2].list("posts").is_empty());
    }

    #[test]
    fn test_equal_mappings_share_a_result_set() {
        let config = config();
        let statement = StatementPlan::new("s");
        let mut materializer = ResultSetMaterializer::new(&config, &statement);
        let first = ObjectRef::new(Record::new("Blog"));
        let second = ObjectRef::new(Record::new("Blog"));
        let row = Row::new(vec!["id".into()], vec![Value::Int(1)]);

        materializer.add_pending_child_relation(&row, &first, &posts_mapping()).unwrap();
        materializer.add_pending_child_relation(&row, &second, &posts_mapping()).unwrap();

        let child = Row::new(vec!["blog_id".into()], vec![Value::Int(1)]);
        materializer
            .link_to_parents(&child, &posts_mapping(), Some(Datum::from(Value::Int(10))))
            .unwrap();
        assert_eq!(first.list("posts").len(), 1);
        assert_eq!(second.list("posts").len(), 1);
    }

    #[test]
    fn test_two_properties_for_one_result_set() {
        let config = config();
        let statement = StatementPlan::new("s");
        let mut materializer = ResultSetMaterializer::new(&config, &statement);
        let blog = ObjectRef::new(Record::new("Blog"));
        let row = Row::new(vec!["id".into()], vec![Value::Int(1)]);
        let drafts = Arc::new(FieldMapping::result_set("drafts", "post", "posts", "id", "blog_id"));

        materializer.add_pending_child_relation(&row, &blog, &posts_mapping()).unwrap();
        let err = materializer
            .add_pending_child_relation(&row, &blog, &drafts)
            .unwrap_err();
        assert_eq!(
            err.mapping_kind(),
            Some(MappingErrorKind::DuplicateResultSetMapping)
        );
    }
}
