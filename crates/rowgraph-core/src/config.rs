//! Materialization settings and the shared configuration bundle.

use crate::convert::ConverterRegistry;
use crate::error::{ConfigError, Error, MappingErrorKind, Result};
use crate::mapping::MappingPlan;
use crate::meta::{DefaultObjectFactory, ObjectFactory, TypeRegistry};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Which plans get automatic column-to-property mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AutoMappingBehavior {
    /// Never auto-map
    None,
    /// Auto-map plans without nested plans
    #[default]
    Partial,
    /// Auto-map every plan, nested ones included
    Full,
}

/// What to do with a column automatic mapping cannot place.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnknownColumnPolicy {
    /// Ignore the column
    #[default]
    None,
    /// Log a warning and continue
    Warning,
    /// Abort materialization
    Failing,
}

/// Settings that shape materialization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub auto_mapping_behavior: AutoMappingBehavior,
    pub auto_mapping_unknown_column_behavior: UnknownColumnPolicy,
    /// Match `author_id` columns to `authorId` properties
    pub map_underscore_to_camel_case: bool,
    /// Assign NULL column values to nullable properties
    pub call_setters_on_nulls: bool,
    /// Keep an all-default instance when a row maps no values
    pub return_instance_for_empty_row: bool,
    /// Reject row windows on plans with nested plans
    pub safe_row_bounds_enabled: bool,
    /// Reject custom consumers on unordered plans with nested plans
    pub safe_result_handler_enabled: bool,
    /// Honor lazy flags on nested queries
    pub lazy_loading_enabled: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            auto_mapping_behavior: AutoMappingBehavior::Partial,
            auto_mapping_unknown_column_behavior: UnknownColumnPolicy::None,
            map_underscore_to_camel_case: false,
            call_setters_on_nulls: false,
            return_instance_for_empty_row: false,
            safe_row_bounds_enabled: true,
            safe_result_handler_enabled: true,
            lazy_loading_enabled: true,
        }
    }
}

impl Settings {
    /// Create default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse settings from JSON; missing keys keep their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| {
            Error::Config(ConfigError {
                message: format!("invalid settings: {}", e),
                source: Some(Box::new(e)),
            })
        })
    }

    #[must_use]
    pub fn auto_mapping_behavior(mut self, value: AutoMappingBehavior) -> Self {
        self.auto_mapping_behavior = value;
        self
    }

    #[must_use]
    pub fn unknown_column_policy(mut self, value: UnknownColumnPolicy) -> Self {
        self.auto_mapping_unknown_column_behavior = value;
        self
    }

    #[must_use]
    pub fn map_underscore_to_camel_case(mut self, value: bool) -> Self {
        self.map_underscore_to_camel_case = value;
        self
    }

    #[must_use]
    pub fn call_setters_on_nulls(mut self, value: bool) -> Self {
        self.call_setters_on_nulls = value;
        self
    }

    #[must_use]
    pub fn return_instance_for_empty_row(mut self, value: bool) -> Self {
        self.return_instance_for_empty_row = value;
        self
    }

    #[must_use]
    pub fn safe_row_bounds_enabled(mut self, value: bool) -> Self {
        self.safe_row_bounds_enabled = value;
        self
    }

    #[must_use]
    pub fn safe_result_handler_enabled(mut self, value: bool) -> Self {
        self.safe_result_handler_enabled = value;
        self
    }

    #[must_use]
    pub fn lazy_loading_enabled(mut self, value: bool) -> Self {
        self.lazy_loading_enabled = value;
        self
    }
}

/// The immutable bundle every materialization reads.
///
/// Cheap to share: everything inside is behind `Arc`.
#[derive(Clone)]
pub struct Configuration {
    settings: Settings,
    plans: Arc<HashMap<String, Arc<MappingPlan>>>,
    converters: Arc<ConverterRegistry>,
    types: Arc<TypeRegistry>,
    factory: Arc<dyn ObjectFactory>,
}

impl Configuration {
    pub fn builder() -> ConfigurationBuilder {
        ConfigurationBuilder::default()
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn plan(&self, id: &str) -> Option<&Arc<MappingPlan>> {
        self.plans.get(id)
    }

    /// Look up a plan that must exist.
    pub fn require_plan(&self, id: &str) -> Result<&Arc<MappingPlan>> {
        self.plan(id).ok_or_else(|| {
            Error::mapping(
                MappingErrorKind::UnknownPlan,
                format!("Unknown mapping plan '{}'", id),
            )
        })
    }

    pub fn converters(&self) -> &ConverterRegistry {
        &self.converters
    }

    pub fn types(&self) -> &TypeRegistry {
        &self.types
    }

    pub fn factory(&self) -> &Arc<dyn ObjectFactory> {
        &self.factory
    }
}

impl fmt::Debug for Configuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut plan_ids: Vec<&String> = self.plans.keys().collect();
        plan_ids.sort();
        f.debug_struct("Configuration")
            .field("settings", &self.settings)
            .field("plans", &plan_ids)
            .finish_non_exhaustive()
    }
}

/// Builder for `Configuration`.
#[derive(Default)]
pub struct ConfigurationBuilder {
    settings: Settings,
    plans: Vec<MappingPlan>,
    converters: Option<ConverterRegistry>,
    types: Option<TypeRegistry>,
    factory: Option<Arc<dyn ObjectFactory>>,
}

impl ConfigurationBuilder {
    #[must_use]
    pub fn settings(mut self, settings: Settings) -> Self {
        self.settings = settings;
        self
    }

    #[must_use]
    pub fn plan(mut self, plan: MappingPlan) -> Self {
        self.plans.push(plan);
        self
    }

    /// Converter registry; defaults to the built-in scalar converters.
    #[must_use]
    pub fn converters(mut self, converters: ConverterRegistry) -> Self {
        self.converters = Some(converters);
        self
    }

    #[must_use]
    pub fn types(mut self, types: TypeRegistry) -> Self {
        self.types = Some(types);
        self
    }

    /// Object factory; defaults to `DefaultObjectFactory` over the types.
    #[must_use]
    pub fn factory(mut self, factory: Arc<dyn ObjectFactory>) -> Self {
        self.factory = Some(factory);
        self
    }

    /// Check plan ids are unique and nested plan references resolve.
    pub fn build(self) -> Result<Configuration> {
        let mut plans = HashMap::with_capacity(self.plans.len());
        for plan in self.plans {
            let id = plan.id().to_string();
            if plans.insert(id.clone(), Arc::new(plan)).is_some() {
                return Err(Error::mapping(
                    MappingErrorKind::InvalidMapping,
                    format!("Mapping plan '{}' is defined twice", id),
                ));
            }
        }

        for plan in plans.values() {
            for mapping in plan.mappings() {
                if let Some(nested) = &mapping.nested_plan {
                    if !plans.contains_key(nested) {
                        return Err(Error::mapping(
                            MappingErrorKind::UnknownPlan,
                            format!(
                                "Mapping plan '{}' references unknown plan '{}'",
                                plan.id(),
                                nested
                            ),
                        ));
                    }
                }
            }
        }

        let types = Arc::new(self.types.unwrap_or_default());
        let factory = self
            .factory
            .unwrap_or_else(|| Arc::new(DefaultObjectFactory::new(Arc::clone(&types))));

        tracing::debug!(plans = plans.len(), "Built materialization configuration");

        Ok(Configuration {
            settings: self.settings,
            plans: Arc::new(plans),
            converters: Arc::new(
                self.converters
                    .unwrap_or_else(ConverterRegistry::with_builtins),
            ),
            types,
            factory,
        })
    }
}
