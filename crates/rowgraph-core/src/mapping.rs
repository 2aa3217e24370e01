//! Mapping plans.
//!
//! A `MappingPlan` is the frozen description of how the columns of a row
//! become one instance of a target type. Plans are built once, validated,
//! and shared read-only by every materialization.

use crate::convert::Converter;
use crate::error::{ConfigError, Error, MappingErrorKind, Result};
use crate::types::TargetType;
use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, OnceLock};

/// How one property or constructor argument gets its value.
#[derive(Debug, Clone, Default)]
pub struct FieldMapping {
    /// Target property, or constructor parameter name
    pub property: Option<String>,
    /// Source column; for multi-cursor mappings the local correlation
    /// columns, comma separated
    pub column: Option<String>,
    /// Declared value type
    pub ty: Option<TargetType>,
    /// Explicit converter overriding registry lookup
    pub converter: Option<Arc<dyn Converter>>,
    /// Nested mapping plan id
    pub nested_plan: Option<String>,
    /// Nested query id
    pub nested_query: Option<String>,
    /// Column components of a composite key
    pub composites: Vec<FieldMapping>,
    /// Part of the row identity
    pub identity: bool,
    /// Constructor argument instead of property
    pub constructor: bool,
    /// Nested data is present only if one of these columns is non-null
    pub not_null_columns: Vec<String>,
    /// Prefix prepended to every column of the nested plan
    pub column_prefix: Option<String>,
    /// Named later result set carrying this mapping's rows
    pub result_set: Option<String>,
    /// Columns of the later result set matched against `column`
    pub foreign_column: Option<String>,
    /// Nested query runs on first read
    pub lazy: bool,
}

impl FieldMapping {
    /// Map a column to a property.
    pub fn property(property: impl Into<String>, column: impl Into<String>) -> Self {
        Self {
            property: Some(property.into()),
            column: Some(column.into()),
            ..Self::default()
        }
    }

    /// Map a column to a property and mark it as part of the row identity.
    pub fn id(property: impl Into<String>, column: impl Into<String>) -> Self {
        Self::property(property, column).identity()
    }

    /// Map a column to a constructor argument.
    pub fn arg(name: impl Into<String>, column: impl Into<String>, ty: TargetType) -> Self {
        Self {
            constructor: true,
            ..Self::property(name, column).typed(ty)
        }
    }

    /// Map a nested plan into a property.
    pub fn nested(property: impl Into<String>, plan_id: impl Into<String>) -> Self {
        Self {
            property: Some(property.into()),
            nested_plan: Some(plan_id.into()),
            ..Self::default()
        }
    }

    /// Fill a property by running a query with this row's column value.
    pub fn query(
        property: impl Into<String>,
        column: impl Into<String>,
        query_id: impl Into<String>,
    ) -> Self {
        Self {
            nested_query: Some(query_id.into()),
            ..Self::property(property, column)
        }
    }

    /// Fill a property from rows of a later named result set.
    pub fn result_set(
        property: impl Into<String>,
        plan_id: impl Into<String>,
        result_set: impl Into<String>,
        column: impl Into<String>,
        foreign_column: impl Into<String>,
    ) -> Self {
        Self {
            property: Some(property.into()),
            column: Some(column.into()),
            nested_plan: Some(plan_id.into()),
            result_set: Some(result_set.into()),
            foreign_column: Some(foreign_column.into()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn identity(mut self) -> Self {
        self.identity = true;
        self
    }

    #[must_use]
    pub fn as_constructor_arg(mut self) -> Self {
        self.constructor = true;
        self
    }

    #[must_use]
    pub fn typed(mut self, ty: TargetType) -> Self {
        self.ty = Some(ty);
        self
    }

    #[must_use]
    pub fn with_converter(mut self, converter: Arc<dyn Converter>) -> Self {
        self.converter = Some(converter);
        self
    }

    #[must_use]
    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.column_prefix = Some(prefix.into());
        self
    }

    #[must_use]
    pub fn not_null(mut self, columns: &[&str]) -> Self {
        self.not_null_columns = columns.iter().map(|c| (*c).to_string()).collect();
        self
    }

    #[must_use]
    pub fn lazy(mut self) -> Self {
        self.lazy = true;
        self
    }

    /// Replace the column with composite components parsed from
    /// `{prop=col,prop2=col2}` syntax. A plain column name is kept as is.
    pub fn with_column_spec(mut self, spec: &str) -> Result<Self> {
        if spec.trim_start().starts_with('{') {
            self.composites = parse_composite_columns(spec)?;
            self.column = None;
        } else {
            self.column = Some(spec.trim().to_string());
        }
        Ok(self)
    }

    pub fn is_composite(&self) -> bool {
        !self.composites.is_empty()
    }

    /// Display label used in error messages and correlation keys.
    pub fn label(&self) -> String {
        match (&self.property, &self.column) {
            (Some(p), Some(c)) => format!("{}<-{}", p, c),
            (Some(p), None) => p.clone(),
            (None, Some(c)) => c.clone(),
            (None, None) => "<unnamed>".to_string(),
        }
    }

    /// Every column this mapping reads directly.
    fn columns(&self) -> impl Iterator<Item = &str> {
        self.column
            .as_deref()
            .into_iter()
            .chain(self.composites.iter().filter_map(|c| c.column.as_deref()))
    }
}

fn composite_pattern() -> std::result::Result<&'static Regex, &'static regex::Error> {
    static PATTERN: OnceLock<std::result::Result<Regex, regex::Error>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"^\s*([A-Za-z_][\w.]*)\s*=\s*([A-Za-z_][\w.$]*)\s*$"))
        .as_ref()
}

/// Parse `{prop=col,prop2=col2}` into composite column mappings.
pub fn parse_composite_columns(spec: &str) -> Result<Vec<FieldMapping>> {
    let invalid = || {
        Error::mapping(
            MappingErrorKind::InvalidMapping,
            format!("Invalid composite column syntax '{}'", spec),
        )
    };
    let pattern = composite_pattern().map_err(|e| {
        Error::Config(ConfigError {
            message: "composite column pattern failed to compile".to_string(),
            source: Some(Box::new(e.clone())),
        })
    })?;

    let inner = spec
        .trim()
        .strip_prefix('{')
        .and_then(|s| s.strip_suffix('}'))
        .ok_or_else(invalid)?;

    let mut composites = Vec::new();
    for pair in inner.split(',').filter(|p| !p.trim().is_empty()) {
        let captures = pattern.captures(pair).ok_or_else(invalid)?;
        composites.push(FieldMapping::property(&captures[1], &captures[2]));
    }
    if composites.is_empty() {
        return Err(invalid());
    }
    Ok(composites)
}

/// Tag-column dispatch to more specific plans.
#[derive(Debug, Clone)]
pub struct Discriminator {
    pub column: String,
    pub ty: TargetType,
    pub converter: Option<Arc<dyn Converter>>,
    /// Stringified tag value -> plan id
    pub cases: HashMap<String, String>,
}

impl Discriminator {
    pub fn new(column: impl Into<String>, ty: TargetType) -> Self {
        Self {
            column: column.into(),
            ty,
            converter: None,
            cases: HashMap::new(),
        }
    }

    #[must_use]
    pub fn case(mut self, value: impl Into<String>, plan_id: impl Into<String>) -> Self {
        self.cases.insert(value.into(), plan_id.into());
        self
    }

    #[must_use]
    pub fn with_converter(mut self, converter: Arc<dyn Converter>) -> Self {
        self.converter = Some(converter);
        self
    }

    pub fn plan_for(&self, value: &str) -> Option<&str> {
        self.cases.get(value).map(String::as_str)
    }
}

/// A validated, immutable mapping plan.
#[derive(Debug)]
pub struct MappingPlan {
    id: String,
    target: TargetType,
    mappings: Vec<Arc<FieldMapping>>,
    id_mappings: Vec<Arc<FieldMapping>>,
    constructor_mappings: Vec<Arc<FieldMapping>>,
    property_mappings: Vec<Arc<FieldMapping>>,
    mapped_columns: HashSet<String>,
    mapped_properties: HashSet<String>,
    discriminator: Option<Arc<Discriminator>>,
    has_nested_plans: bool,
    has_nested_queries: bool,
    auto_mapping: Option<bool>,
}

impl MappingPlan {
    pub fn builder(id: impl Into<String>, target: TargetType) -> MappingPlanBuilder {
        MappingPlanBuilder {
            id: id.into(),
            target,
            mappings: Vec::new(),
            discriminator: None,
            auto_mapping: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn target(&self) -> &TargetType {
        &self.target
    }

    /// All mappings in declared order.
    pub fn mappings(&self) -> &[Arc<FieldMapping>] {
        &self.mappings
    }

    /// Identity-flagged mappings.
    pub fn id_mappings(&self) -> &[Arc<FieldMapping>] {
        &self.id_mappings
    }

    /// Constructor-argument mappings in declared order.
    pub fn constructor_mappings(&self) -> &[Arc<FieldMapping>] {
        &self.constructor_mappings
    }

    /// Plain property mappings.
    pub fn property_mappings(&self) -> &[Arc<FieldMapping>] {
        &self.property_mappings
    }

    /// Upper-cased names of every column read by an explicit mapping.
    pub fn mapped_columns(&self) -> &HashSet<String> {
        &self.mapped_columns
    }

    pub fn mapped_properties(&self) -> &HashSet<String> {
        &self.mapped_properties
    }

    pub fn discriminator(&self) -> Option<&Arc<Discriminator>> {
        self.discriminator.as_ref()
    }

    /// Whether any mapping recurses into a nested plan within the same rows.
    pub fn has_nested_plans(&self) -> bool {
        self.has_nested_plans
    }

    pub fn has_nested_queries(&self) -> bool {
        self.has_nested_queries
    }

    /// Per-plan automatic mapping override.
    pub fn auto_mapping(&self) -> Option<bool> {
        self.auto_mapping
    }
}

/// Builder for `MappingPlan`.
#[derive(Debug)]
pub struct MappingPlanBuilder {
    id: String,
    target: TargetType,
    mappings: Vec<FieldMapping>,
    discriminator: Option<Discriminator>,
    auto_mapping: Option<bool>,
}

impl MappingPlanBuilder {
    #[must_use]
    pub fn mapping(mut self, mapping: FieldMapping) -> Self {
        self.mappings.push(mapping);
        self
    }

    #[must_use]
    pub fn discriminator(mut self, discriminator: Discriminator) -> Self {
        self.discriminator = Some(discriminator);
        self
    }

    #[must_use]
    pub fn auto_mapping(mut self, enabled: bool) -> Self {
        self.auto_mapping = Some(enabled);
        self
    }

    /// Validate the mappings and derive the partitions.
    pub fn build(self) -> Result<MappingPlan> {
        let mut plan = MappingPlan {
            id: self.id,
            target: self.target,
            mappings: Vec::with_capacity(self.mappings.len()),
            id_mappings: Vec::new(),
            constructor_mappings: Vec::new(),
            property_mappings: Vec::new(),
            mapped_columns: HashSet::new(),
            mapped_properties: HashSet::new(),
            discriminator: self.discriminator.map(Arc::new),
            has_nested_plans: false,
            has_nested_queries: false,
            auto_mapping: self.auto_mapping,
        };

        for mapping in self.mappings {
            if mapping.nested_plan.is_some() && mapping.nested_query.is_some() {
                return Err(Error::mapping(
                    MappingErrorKind::InvalidMapping,
                    format!(
                        "Mapping '{}' in '{}' cannot use both a nested plan and a nested query",
                        mapping.label(),
                        plan.id
                    ),
                ));
            }
            if mapping.result_set.is_some()
                && (mapping.column.is_none() || mapping.foreign_column.is_none())
            {
                return Err(Error::mapping(
                    MappingErrorKind::InvalidMapping,
                    format!(
                        "Mapping '{}' in '{}' names a result set but lacks correlation columns",
                        mapping.label(),
                        plan.id
                    ),
                ));
            }

            plan.has_nested_queries |= mapping.nested_query.is_some();
            plan.has_nested_plans |= mapping.nested_plan.is_some() && mapping.result_set.is_none();

            if mapping.result_set.is_none() {
                for column in mapping.columns() {
                    plan.mapped_columns.insert(column.to_ascii_uppercase());
                }
            }
            if let Some(property) = &mapping.property {
                plan.mapped_properties.insert(property.clone());
            }

            let mapping = Arc::new(mapping);
            if mapping.constructor {
                plan.constructor_mappings.push(Arc::clone(&mapping));
            } else {
                plan.property_mappings.push(Arc::clone(&mapping));
            }
            if mapping.identity {
                plan.id_mappings.push(Arc::clone(&mapping));
            }
            plan.mappings.push(mapping);
        }

        Ok(plan)
    }
}

/// What a statement produces: which plans map its result sets.
#[derive(Debug, Clone, Default)]
pub struct StatementPlan {
    pub id: String,
    /// Plan ids for the leading result sets, in order
    pub result_plans: Vec<String>,
    /// Names of every result set, by position
    pub result_sets: Vec<String>,
    /// Rows arrive sorted by top-level identity
    pub result_ordered: bool,
}

impl StatementPlan {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn plan(mut self, plan_id: impl Into<String>) -> Self {
        self.result_plans.push(plan_id.into());
        self
    }

    #[must_use]
    pub fn result_sets(mut self, names: &[&str]) -> Self {
        self.result_sets = names.iter().map(|n| (*n).to_string()).collect();
        self
    }

    #[must_use]
    pub fn ordered(mut self, ordered: bool) -> Self {
        self.result_ordered = ordered;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partitions() {
        let plan = MappingPlan::builder("blog", TargetType::object("Blog"))
            .mapping(FieldMapping::arg("id", "blog_id", TargetType::I64).identity())
            .mapping(FieldMapping::property("title", "blog_title"))
            .mapping(FieldMapping::nested("posts", "post").typed(TargetType::list(
                TargetType::object("Post"),
            )))
            .build()
            .unwrap();

        assert_eq!(plan.mappings().len(), 3);
        assert_eq!(plan.constructor_mappings().len(), 1);
        assert_eq!(plan.property_mappings().len(), 2);
        assert_eq!(plan.id_mappings().len(), 1);
        assert!(plan.has_nested_plans());
        assert!(!plan.has_nested_queries());
        assert!(plan.mapped_columns().contains("BLOG_TITLE"));
        assert!(plan.mapped_properties().contains("posts"));
    }

    #[test]
    fn test_result_set_mapping_not_nested_plan() {
        let plan = MappingPlan::builder("blog", TargetType::object("Blog"))
            .mapping(FieldMapping::result_set("posts", "post", "posts", "id", "blog_id"))
            .build()
            .unwrap();
        assert!(!plan.has_nested_plans());
        assert!(!plan.mapped_columns().contains("ID"));
    }

    #[test]
    fn test_rejects_plan_and_query() {
        let mut mapping = FieldMapping::nested("author", "author");
        mapping.nested_query = Some("selectAuthor".to_string());
        let err = MappingPlan::builder("blog", TargetType::object("Blog"))
            .mapping(mapping)
            .build()
            .unwrap_err();
        assert_eq!(err.mapping_kind(), Some(MappingErrorKind::InvalidMapping));
    }

    #[test]
    fn test_composite_syntax() {
        let composites = parse_composite_columns("{id = author_id, name=author_name}").unwrap();
        assert_eq!(composites.len(), 2);
        assert_eq!(composites[0].property.as_deref(), Some("id"));
        assert_eq!(composites[1].column.as_deref(), Some("author_name"));

        assert!(parse_composite_columns("{}").is_err());
        assert!(parse_composite_columns("{id}").is_err());
        assert!(parse_composite_columns("id=author_id").is_err());

        let mapping = FieldMapping::query("author", "", "selectAuthor")
            .with_column_spec("{id=author_id}")
            .unwrap();
        assert!(mapping.is_composite());
        assert!(mapping.column.is_none());
    }

    #[test]
    fn test_discriminator_cases() {
        let d = Discriminator::new("kind", TargetType::Text)
            .case("car", "carPlan")
            .case("1", "truckPlan");
        assert_eq!(d.plan_for("car"), Some("carPlan"));
        assert_eq!(d.plan_for("bike"), None);
    }
}
