//! Property population: explicit mappings and automatic column matching.

use crate::columns::{ResultSetView, prefixed, strip_prefix};
use crate::materializer::ResultSetMaterializer;
use rowgraph_core::{
    AutoMappingBehavior, Converter, Datum, Error, FieldMapping, MappingErrorKind, MappingPlan,
    ObjectRef, Result, Row, SqlType, TargetType, UnknownColumnPolicy, Value,
};
use std::sync::Arc;

/// A column matched to a property by name.
#[derive(Debug, Clone)]
pub(crate) struct AutoMapping {
    column: String,
    property: String,
    converter: Arc<dyn Converter>,
    nullable: bool,
}

/// What resolving a property mapping produced.
#[derive(Debug)]
pub(crate) enum PropertyValue {
    Value(Datum),
    /// The value arrives later: a deferred cell was installed or a later
    /// result set will supply it
    Deferred,
}

impl ResultSetMaterializer<'_> {
    /// Map one row with a flat plan. `None` when the row maps no values and
    /// empty instances are not kept.
    pub(crate) fn get_row_value(
        &mut self,
        view: &mut ResultSetView,
        row: &Row,
        plan: &Arc<MappingPlan>,
        prefix: Option<&str>,
    ) -> Result<Option<Datum>> {
        let created = self.create_result_object(view, row, plan, prefix)?;
        let Some(value) = created.value else {
            return Ok(None);
        };
        if self.has_converter_for_result_object(view, plan.target()) {
            return Ok(Some(value));
        }
        let Datum::Object(object) = &value else {
            return Ok(Some(value));
        };

        let mut found = created.used_constructor_args;
        if self.should_apply_automatic_mappings(plan, false) {
            found |= self.apply_automatic_mappings(view, row, plan, object, prefix)?;
        }
        found |= self.apply_property_mappings(view, row, plan, object, prefix)?;

        if found || self.config.settings().return_instance_for_empty_row {
            Ok(Some(value))
        } else {
            Ok(None)
        }
    }

    /// Plan override first; otherwise nested plans auto-map only under
    /// `Full`, flat plans under anything but `None`.
    pub(crate) fn should_apply_automatic_mappings(&self, plan: &MappingPlan, nested: bool) -> bool {
        if let Some(enabled) = plan.auto_mapping() {
            return enabled;
        }
        let behavior = self.config.settings().auto_mapping_behavior;
        if nested {
            behavior == AutoMappingBehavior::Full
        } else {
            behavior != AutoMappingBehavior::None
        }
    }

    /// Apply the plain property mappings. Returns whether any value (or
    /// deferred value) was found.
    pub(crate) fn apply_property_mappings(
        &mut self,
        view: &mut ResultSetView,
        row: &Row,
        plan: &MappingPlan,
        object: &ObjectRef,
        prefix: Option<&str>,
    ) -> Result<bool> {
        let partition = view.partition(plan, prefix);
        let mut found = false;

        for mapping in plan.property_mappings() {
            let column = if mapping.nested_plan.is_some() && mapping.result_set.is_none() {
                None
            } else {
                prefixed(mapping.column.as_deref(), prefix)
            };
            let mapped = column.as_deref().is_some_and(|c| partition.is_mapped(c));
            if !(mapping.is_composite() || mapped || mapping.result_set.is_some()) {
                continue;
            }

            let value = self
                .get_property_mapping_value(view, row, plan, object, mapping, column.as_deref(), prefix)
                .map_err(|e| e.at_row(plan.id(), mapping.property.as_deref(), self.current_row))?;
            let Some(property) = &mapping.property else {
                continue;
            };

            match value {
                PropertyValue::Deferred => found = true,
                PropertyValue::Value(datum) => {
                    if !datum.is_null() {
                        found = true;
                        object.set(property.clone(), datum);
                    } else if self.config.settings().call_setters_on_nulls
                        && self.accepts_null(plan.target(), property)
                    {
                        object.set(property.clone(), datum);
                    }
                }
            }
        }
        Ok(found)
    }

    fn get_property_mapping_value(
        &mut self,
        view: &ResultSetView,
        row: &Row,
        plan: &MappingPlan,
        object: &ObjectRef,
        mapping: &Arc<FieldMapping>,
        column: Option<&str>,
        prefix: Option<&str>,
    ) -> Result<PropertyValue> {
        if mapping.nested_query.is_some() {
            return self.get_nested_query_mapping_value(row, plan.target(), object, mapping, prefix);
        }
        if mapping.result_set.is_some() {
            self.add_pending_child_relation(row, object, mapping)?;
            return Ok(PropertyValue::Deferred);
        }
        let Some(column) = column else {
            return Ok(PropertyValue::Value(Datum::null()));
        };
        let converter = self.mapping_converter(plan.target(), mapping, view.column_type(column))?;
        Ok(PropertyValue::Value(Datum::Scalar(converter.read(row, column)?)))
    }

    /// Whether a NULL may be assigned; unknown properties accept it.
    fn accepts_null(&self, owner: &TargetType, property: &str) -> bool {
        self.config
            .types()
            .setter_type(owner, property)
            .is_none_or(|(_, nullable)| nullable)
    }

    /// Read a mapping's column through its converter; NULL when the
    /// mapping reads no column.
    pub(crate) fn read_mapped_column(
        &self,
        view: &ResultSetView,
        row: &Row,
        owner: &TargetType,
        mapping: &FieldMapping,
        prefix: Option<&str>,
    ) -> Result<Value> {
        let Some(column) = prefixed(mapping.column.as_deref(), prefix) else {
            return Ok(Value::Null);
        };
        let converter = self.mapping_converter(owner, mapping, view.column_type(&column))?;
        converter.read(row, &column)
    }

    /// The mapping's own converter, else one for its declared type, else
    /// one for the owner's property type.
    pub(crate) fn mapping_converter(
        &self,
        owner: &TargetType,
        mapping: &FieldMapping,
        column_type: Option<&SqlType>,
    ) -> Result<Arc<dyn Converter>> {
        if let Some(converter) = &mapping.converter {
            return Ok(Arc::clone(converter));
        }
        let target = match (&mapping.ty, &mapping.property) {
            (Some(ty), _) => ty.clone(),
            (None, Some(property)) => self
                .config
                .types()
                .setter_type(owner, property)
                .map_or(TargetType::Any, |(ty, _)| ty),
            (None, None) => TargetType::Any,
        };
        self.converter_for(&target, column_type, &mapping.label())
    }

    pub(crate) fn converter_for(
        &self,
        target: &TargetType,
        column_type: Option<&SqlType>,
        what: &str,
    ) -> Result<Arc<dyn Converter>> {
        self.config.converters().get(target, column_type).ok_or_else(|| {
            Error::mapping(
                MappingErrorKind::MissingConverter,
                format!(
                    "No converter for '{}' producing {} from {}",
                    what,
                    target,
                    column_type.map_or_else(|| "an undeclared column".to_string(), SqlType::sql_name)
                ),
            )
        })
    }

    /// Set properties from columns no explicit mapping covers.
    pub(crate) fn apply_automatic_mappings(
        &mut self,
        view: &mut ResultSetView,
        row: &Row,
        plan: &MappingPlan,
        object: &ObjectRef,
        prefix: Option<&str>,
    ) -> Result<bool> {
        let mappings = self.create_automatic_mappings(view, plan, prefix)?;
        let call_setters_on_nulls = self.config.settings().call_setters_on_nulls;
        let mut found = false;

        for mapping in mappings.iter() {
            let value = mapping
                .converter
                .read(row, &mapping.column)
                .map_err(|e| e.at_row(plan.id(), Some(&mapping.property), self.current_row))?;
            if !value.is_null() {
                found = true;
                object.set(mapping.property.clone(), Datum::Scalar(value));
            } else if call_setters_on_nulls && mapping.nullable {
                object.set(mapping.property.clone(), Datum::null());
            }
        }
        Ok(found)
    }

    fn create_automatic_mappings(
        &mut self,
        view: &mut ResultSetView,
        plan: &MappingPlan,
        prefix: Option<&str>,
    ) -> Result<Arc<Vec<AutoMapping>>> {
        let cache_key = format!("{}:{}", plan.id(), prefix.unwrap_or(""));
        if let Some(mappings) = self.auto_mapping_cache.get(&cache_key) {
            return Ok(Arc::clone(mappings));
        }

        let config = self.config;
        let settings = config.settings();
        let types = config.types();
        let target = plan.target();
        let partition = view.partition(plan, prefix);
        let mut mappings = Vec::new();

        for column in partition.unmapped() {
            let Some(name) = strip_prefix(column, prefix) else {
                continue;
            };
            let property = types.find_property(target, name, settings.map_underscore_to_camel_case);
            let setter = property
                .as_deref()
                .and_then(|p| types.setter_type(target, p).map(|s| (p, s)));

            match setter {
                Some((property, (ty, nullable))) => {
                    if plan.mapped_properties().contains(property) {
                        continue;
                    }
                    match config.converters().get(&ty, view.column_type(column)) {
                        Some(converter) => mappings.push(AutoMapping {
                            column: column.clone(),
                            property: property.to_string(),
                            converter,
                            nullable,
                        }),
                        None => self.report_unknown_column(column, property, Some(&ty))?,
                    }
                }
                None => self.report_unknown_column(column, property.as_deref().unwrap_or(name), None)?,
            }
        }

        tracing::debug!(
            plan_id = %plan.id(),
            prefix = prefix.unwrap_or(""),
            columns = mappings.len(),
            "Computed automatic mappings"
        );
        let mappings = Arc::new(mappings);
        self.auto_mapping_cache.insert(cache_key, Arc::clone(&mappings));
        Ok(mappings)
    }

    fn report_unknown_column(
        &self,
        column: &str,
        property: &str,
        ty: Option<&TargetType>,
    ) -> Result<()> {
        let policy = self.config.settings().auto_mapping_unknown_column_behavior;
        if policy == UnknownColumnPolicy::None {
            return Ok(());
        }
        let message = format!(
            "Unknown column is detected on '{}' auto-mapping. Mapping parameters are \
             [columnName={},propertyName={},propertyType={}]",
            self.statement.id,
            column,
            property,
            ty.map_or_else(|| "null".to_string(), ToString::to_string)
        );
        match policy {
            UnknownColumnPolicy::Failing => {
                Err(Error::mapping(MappingErrorKind::UnknownColumn, message))
            }
            _ => {
                tracing::warn!(statement = %self.statement.id, column, "{}", message);
                Ok(())
            }
        }
    }
}
