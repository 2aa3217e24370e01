//! Object construction strategies.

use crate::columns::{ResultSetView, join_prefix, prefixed};
use crate::materializer::ResultSetMaterializer;
use rowgraph_core::{
    ConstructorDescriptor, Datum, Error, MappingErrorKind, MappingPlan, Result, Row, TargetType,
};
use std::sync::Arc;

/// Outcome of creating the object for a row.
#[derive(Debug)]
pub(crate) struct CreatedObject {
    pub(crate) value: Option<Datum>,
    /// Constructor arguments were read from the row
    pub(crate) used_constructor_args: bool,
}

impl CreatedObject {
    fn plain(value: Datum) -> Self {
        Self {
            value: Some(value),
            used_constructor_args: false,
        }
    }

    fn none() -> Self {
        Self {
            value: None,
            used_constructor_args: false,
        }
    }
}

impl ResultSetMaterializer<'_> {
    /// Create the result object for a row, trying in order: direct scalar
    /// conversion, declared constructor arguments, a default instance, and
    /// matching a constructor signature against the columns.
    pub(crate) fn create_result_object(
        &mut self,
        view: &mut ResultSetView,
        row: &Row,
        plan: &Arc<MappingPlan>,
        prefix: Option<&str>,
    ) -> Result<CreatedObject> {
        let target = plan.target();

        if self.has_converter_for_result_object(view, target) {
            return self.create_primitive_result_object(view, row, plan, prefix);
        }
        if !plan.constructor_mappings().is_empty() {
            return self.create_parameterized_result_object(view, row, plan, prefix);
        }
        if self.config.factory().can_create_default(target) {
            return Ok(CreatedObject::plain(self.config.factory().new_instance(target)?));
        }
        if self.should_apply_automatic_mappings(plan, false) {
            return self.create_by_constructor_signature(view, row, plan);
        }
        Err(Error::mapping(
            MappingErrorKind::NoConstructor,
            format!("Do not know how to create an instance of {}", target),
        ))
    }

    /// A single converter can produce the target from the row as a whole.
    pub(crate) fn has_converter_for_result_object(&self, view: &ResultSetView, target: &TargetType) -> bool {
        let converters = self.config.converters();
        if view.len() == 1 {
            converters.has(target, view.type_at(0))
        } else {
            converters.has_any(target)
        }
    }

    fn create_primitive_result_object(
        &self,
        view: &ResultSetView,
        row: &Row,
        plan: &MappingPlan,
        prefix: Option<&str>,
    ) -> Result<CreatedObject> {
        let column = match plan.mappings().first() {
            Some(mapping) => prefixed(mapping.column.as_deref(), prefix),
            None => view.column_names().first().cloned(),
        };
        let Some(column) = column else {
            return Ok(CreatedObject::none());
        };
        let converter = self.converter_for(plan.target(), view.column_type(&column), &column)?;
        let value = converter.read(row, &column)?;
        if value.is_null() {
            return Ok(CreatedObject::none());
        }
        Ok(CreatedObject::plain(Datum::Scalar(value)))
    }

    fn create_parameterized_result_object(
        &mut self,
        view: &mut ResultSetView,
        row: &Row,
        plan: &Arc<MappingPlan>,
        prefix: Option<&str>,
    ) -> Result<CreatedObject> {
        let mut arg_types = Vec::with_capacity(plan.constructor_mappings().len());
        let mut args = Vec::with_capacity(plan.constructor_mappings().len());
        let mut found = false;

        for mapping in plan.constructor_mappings() {
            let ty = mapping.ty.clone().unwrap_or(TargetType::Any);
            let evaluated = if mapping.nested_query.is_some() {
                self.get_nested_query_constructor_value(row, mapping, &ty, prefix)
            } else if let Some(nested_id) = &mapping.nested_plan {
                let nested = Arc::clone(self.config.require_plan(nested_id)?);
                let nested_prefix = join_prefix(prefix, mapping.column_prefix.as_deref());
                self.get_row_value(view, row, &nested, nested_prefix.as_deref())
                    .map(|v| v.unwrap_or_else(Datum::null))
            } else {
                self.read_mapped_column(view, row, plan.target(), mapping, prefix)
                    .map(Datum::Scalar)
            };
            let value = evaluated
                .map_err(|e| e.at_row(plan.id(), mapping.property.as_deref(), self.current_row))?;

            found |= !value.is_null();
            arg_types.push(ty);
            args.push(value);
        }

        if !found && !self.config.settings().return_instance_for_empty_row {
            return Ok(CreatedObject::none());
        }
        let value = self
            .config
            .factory()
            .new_instance_with_args(plan.target(), &arg_types, args)?;
        Ok(CreatedObject {
            value: Some(value),
            used_constructor_args: true,
        })
    }

    /// Pick a declared constructor and feed it the columns positionally.
    fn create_by_constructor_signature(
        &self,
        view: &ResultSetView,
        row: &Row,
        plan: &MappingPlan,
    ) -> Result<CreatedObject> {
        let target = plan.target();
        let constructors = self.config.types().constructors(target);
        let constructor = match Self::default_constructor(target, constructors)? {
            Some(constructor) => constructor,
            None => constructors
                .iter()
                .find(|c| self.allowed_constructor_using_converters(view, c))
                .ok_or_else(|| {
                    let column_types: Vec<String> = (0..view.len())
                        .map(|i| view.type_at(i).map_or_else(|| "unknown".to_string(), |t| t.sql_name()))
                        .collect();
                    Error::mapping(
                        MappingErrorKind::NoConstructor,
                        format!(
                            "No constructor found in {} matching [{}]",
                            target,
                            column_types.join(", ")
                        ),
                    )
                })?,
        };
        self.create_using_constructor(view, row, plan, constructor)
    }

    /// The only constructor, or the one marked canonical.
    fn default_constructor<'c>(
        target: &TargetType,
        constructors: &'c [ConstructorDescriptor],
    ) -> Result<Option<&'c ConstructorDescriptor>> {
        if let [only] = constructors {
            return Ok(Some(only));
        }
        let mut canonical = constructors.iter().filter(|c| c.canonical);
        let first = canonical.next();
        if first.is_some() && canonical.next().is_some() {
            return Err(Error::mapping(
                MappingErrorKind::NoConstructor,
                format!("{} marks more than one constructor as canonical", target),
            ));
        }
        Ok(first)
    }

    fn allowed_constructor_using_converters(
        &self,
        view: &ResultSetView,
        constructor: &ConstructorDescriptor,
    ) -> bool {
        constructor.params.len() == view.len()
            && constructor
                .params
                .iter()
                .enumerate()
                .all(|(i, p)| self.config.converters().has(&p.ty, view.type_at(i)))
    }

    fn create_using_constructor(
        &self,
        view: &ResultSetView,
        row: &Row,
        plan: &MappingPlan,
        constructor: &ConstructorDescriptor,
    ) -> Result<CreatedObject> {
        let mut args = Vec::with_capacity(constructor.params.len());
        let mut found = false;

        for (index, param) in constructor.params.iter().enumerate() {
            let column = view.column_names().get(index).ok_or_else(|| {
                Error::mapping(
                    MappingErrorKind::NoConstructor,
                    format!(
                        "Constructor parameter '{}' of {} has no column at position {}",
                        param.name,
                        plan.target(),
                        index
                    ),
                )
            })?;
            let converter = self.converter_for(&param.ty, view.type_at(index), column)?;
            let value = converter
                .read(row, column)
                .map_err(|e| e.at_row(plan.id(), Some(&param.name), self.current_row))?;
            found |= !value.is_null();
            args.push(Datum::Scalar(value));
        }

        if !found && !self.config.settings().return_instance_for_empty_row {
            return Ok(CreatedObject::none());
        }
        let value = self.config.factory().new_instance_with_args(
            plan.target(),
            &constructor.param_types(),
            args,
        )?;
        Ok(CreatedObject {
            value: Some(value),
            used_constructor_args: true,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rowgraph_core::{
        ColumnInfo, Configuration, FieldMapping, Settings, SqlType, StatementPlan,
        TypeDescriptor, TypeRegistry, Value,
    };

    fn types() -> TypeRegistry {
        TypeRegistry::new()
            .with(
                TypeDescriptor::new("Point")
                    .constructor(&[("x", TargetType::I64), ("y", TargetType::I64)])
                    .constructor(&[("label", TargetType::Text)]),
            )
            .with(TypeDescriptor::new("Blog").property("id", TargetType::I64))
    }

    fn create(
        config: &Configuration,
        plan_id: &str,
        names: &[&str],
        types: Vec<SqlType>,
        values: Vec<Value>,
    ) -> Result<CreatedObject> {
        let statement = StatementPlan::new("s").plan(plan_id);
        let mut materializer = ResultSetMaterializer::new(config, &statement);
        let columns = Arc::new(ColumnInfo::with_types(
            names.iter().map(|n| (*n).to_string()).collect(),
            types,
        ));
        let mut view = ResultSetView::new(Arc::clone(&columns));
        let row = Row::with_columns(columns, values);
        let plan = Arc::clone(config.plan(plan_id).unwrap());
        materializer.create_result_object(&mut view, &row, &plan, None)
    }

    #[test]
    fn test_primitive_projection() {
        let config = Configuration::builder()
            .plan(MappingPlan::builder("count", TargetType::I64).build().unwrap())
            .build()
            .unwrap();
        let created = create(&config, "count", &["n"], vec![SqlType::Integer], vec![Value::Int(4)])
            .unwrap();
        assert_eq!(created.value, Some(Datum::Scalar(Value::BigInt(4))));
        assert!(!created.used_constructor_args);
    }

    #[test]
    fn test_explicit_constructor_args() {
        let config = Configuration::builder()
            .types(types())
            .plan(
                MappingPlan::builder("point", TargetType::object("Point"))
                    .mapping(FieldMapping::arg("x", "px", TargetType::I64))
                    .mapping(FieldMapping::arg("y", "py", TargetType::I64))
                    .build()
                    .unwrap(),
            )
            .build()
            .unwrap();
        let created = create(
            &config,
            "point",
            &["px", "py"],
            vec![SqlType::BigInt, SqlType::BigInt],
            vec![Value::BigInt(3), Value::Null],
        )
        .unwrap();
        let point = created.value.unwrap();
        let point = point.as_object().unwrap();
        assert_eq!(point.value("x"), Value::BigInt(3));
        assert!(created.used_constructor_args);

        // all-null arguments produce no object
        let created = create(
            &config,
            "point",
            &["px", "py"],
            vec![SqlType::BigInt, SqlType::BigInt],
            vec![Value::Null, Value::Null],
        )
        .unwrap();
        assert!(created.value.is_none());
    }

    #[test]
    fn test_all_null_args_kept_when_configured() {
        let config = Configuration::builder()
            .settings(Settings::new().return_instance_for_empty_row(true))
            .types(types())
            .plan(
                MappingPlan::builder("point", TargetType::object("Point"))
                    .mapping(FieldMapping::arg("x", "px", TargetType::I64))
                    .mapping(FieldMapping::arg("y", "py", TargetType::I64))
                    .build()
                    .unwrap(),
            )
            .build()
            .unwrap();
        let created = create(
            &config,
            "point",
            &["px", "py"],
            vec![SqlType::BigInt, SqlType::BigInt],
            vec![Value::Null, Value::Null],
        )
        .unwrap();
        assert!(created.value.is_some());
    }

    #[test]
    fn test_constructor_signature_matching() {
        let config = Configuration::builder()
            .types(types())
            .plan(MappingPlan::builder("point", TargetType::object("Point")).build().unwrap())
            .build()
            .unwrap();

        let created = create(
            &config,
            "point",
            &["a", "b"],
            vec![SqlType::BigInt, SqlType::BigInt],
            vec![Value::BigInt(1), Value::BigInt(2)],
        )
        .unwrap();
        let point = created.value.unwrap();
        assert_eq!(point.as_object().unwrap().value("y"), Value::BigInt(2));

        let created = create(
            &config,
            "point",
            &["name"],
            vec![SqlType::Text],
            vec![Value::Text("origin".into())],
        )
        .unwrap();
        let point = created.value.unwrap();
        assert_eq!(
            point.as_object().unwrap().value("label"),
            Value::Text("origin".into())
        );
    }

    #[test]
    fn test_canonical_constructor_wins() {
        let config = Configuration::builder()
            .types(TypeRegistry::new().with(
                TypeDescriptor::new("Range")
                    .constructor(&[("x", TargetType::I64), ("y", TargetType::I64)])
                    .canonical_constructor(&[("lo", TargetType::I64), ("hi", TargetType::I64)]),
            ))
            .plan(MappingPlan::builder("range", TargetType::object("Range")).build().unwrap())
            .build()
            .unwrap();

        let created = create(
            &config,
            "range",
            &["a", "b"],
            vec![SqlType::BigInt, SqlType::BigInt],
            vec![Value::BigInt(1), Value::BigInt(9)],
        )
        .unwrap();
        let range = created.value.unwrap();
        let range = range.as_object().unwrap();
        assert_eq!(range.value("lo"), Value::BigInt(1));
        assert_eq!(range.value("hi"), Value::BigInt(9));
        assert_eq!(range.get("x"), None);
    }

    #[test]
    fn test_two_canonical_constructors() {
        let config = Configuration::builder()
            .types(TypeRegistry::new().with(
                TypeDescriptor::new("Range")
                    .canonical_constructor(&[("x", TargetType::I64), ("y", TargetType::I64)])
                    .canonical_constructor(&[("lo", TargetType::I64), ("hi", TargetType::I64)]),
            ))
            .plan(MappingPlan::builder("range", TargetType::object("Range")).build().unwrap())
            .build()
            .unwrap();

        let err = create(
            &config,
            "range",
            &["a", "b"],
            vec![SqlType::BigInt, SqlType::BigInt],
            vec![Value::BigInt(1), Value::BigInt(9)],
        )
        .unwrap_err();
        assert_eq!(err.mapping_kind(), Some(MappingErrorKind::NoConstructor));
        assert!(err.to_string().contains("more than one constructor"));
    }

    #[test]
    fn test_no_usable_constructor() {
        let config = Configuration::builder()
            .types(types())
            .plan(MappingPlan::builder("point", TargetType::object("Point")).build().unwrap())
            .build()
            .unwrap();
        let err = create(
            &config,
            "point",
            &["a", "b", "c"],
            vec![SqlType::BigInt, SqlType::BigInt, SqlType::BigInt],
            vec![Value::BigInt(1), Value::BigInt(2), Value::BigInt(3)],
        )
        .unwrap_err();
        assert_eq!(err.mapping_kind(), Some(MappingErrorKind::NoConstructor));
        assert!(err.is_configuration_error());
    }

    #[test]
    fn test_default_instance() {
        let config = Configuration::builder()
            .types(types())
            .plan(MappingPlan::builder("blog", TargetType::object("Blog")).build().unwrap())
            .build()
            .unwrap();
        let created = create(
            &config,
            "blog",
            &["id", "title"],
            vec![SqlType::BigInt, SqlType::Text],
            vec![Value::BigInt(1), Value::Text("t".into())],
        )
        .unwrap();
        let blog = created.value.unwrap();
        assert_eq!(blog.as_object().unwrap().type_name(), "Blog");
        assert!(blog.as_object().unwrap().read().is_empty());
    }
}
