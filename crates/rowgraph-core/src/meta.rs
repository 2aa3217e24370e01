//! Type descriptors and object construction.
//!
//! Descriptors stand in for runtime reflection: they list the settable
//! properties and declared constructors of each named object type. They are
//! built once alongside the mapping plans and only read afterwards.

use crate::error::{Error, MappingErrorKind, Result};
use crate::object::{Datum, ObjectRef, Record};
use crate::types::TargetType;
use std::collections::HashMap;
use std::sync::Arc;

/// Record type name used for generic keyed containers.
pub const MAP_TYPE_NAME: &str = "map";

/// A settable property of an object type.
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyDescriptor {
    pub name: String,
    pub ty: TargetType,
    /// Whether NULL may be assigned
    pub nullable: bool,
}

/// One constructor parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamDescriptor {
    pub name: String,
    pub ty: TargetType,
}

/// A declared constructor.
#[derive(Debug, Clone, PartialEq)]
pub struct ConstructorDescriptor {
    pub params: Vec<ParamDescriptor>,
    /// Marked as the one to use for implicit constructor matching
    pub canonical: bool,
}

impl ConstructorDescriptor {
    pub fn param_types(&self) -> Vec<TargetType> {
        self.params.iter().map(|p| p.ty.clone()).collect()
    }

    fn accepts(&self, arg_types: &[TargetType]) -> bool {
        self.params.len() == arg_types.len()
            && self
                .params
                .iter()
                .zip(arg_types)
                .all(|(p, t)| p.ty == *t || p.ty == TargetType::Any || *t == TargetType::Any)
    }
}

/// Shape of a named object type.
///
/// A type without declared constructors has an implicit parameterless one.
#[derive(Debug, Clone)]
pub struct TypeDescriptor {
    pub name: String,
    pub properties: Vec<PropertyDescriptor>,
    pub constructors: Vec<ConstructorDescriptor>,
    /// Abstract types are instantiated through `implementation`
    pub is_abstract: bool,
    pub implementation: Option<String>,
    explicit_default: bool,
}

impl TypeDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            properties: Vec::new(),
            constructors: Vec::new(),
            is_abstract: false,
            implementation: None,
            explicit_default: false,
        }
    }

    /// Add a non-nullable property.
    #[must_use]
    pub fn property(mut self, name: impl Into<String>, ty: TargetType) -> Self {
        self.properties.push(PropertyDescriptor {
            name: name.into(),
            ty,
            nullable: false,
        });
        self
    }

    /// Add a property that accepts NULL.
    #[must_use]
    pub fn nullable_property(mut self, name: impl Into<String>, ty: TargetType) -> Self {
        self.properties.push(PropertyDescriptor {
            name: name.into(),
            ty,
            nullable: true,
        });
        self
    }

    /// Declare a constructor.
    #[must_use]
    pub fn constructor(mut self, params: &[(&str, TargetType)]) -> Self {
        self.constructors.push(Self::build_constructor(params, false));
        self
    }

    /// Declare the constructor preferred by implicit constructor matching.
    #[must_use]
    pub fn canonical_constructor(mut self, params: &[(&str, TargetType)]) -> Self {
        self.constructors.push(Self::build_constructor(params, true));
        self
    }

    /// Keep a parameterless constructor alongside declared ones.
    #[must_use]
    pub fn default_constructor(mut self) -> Self {
        self.explicit_default = true;
        self
    }

    /// Mark the type abstract, instantiated as `implementation`.
    #[must_use]
    pub fn implemented_by(mut self, implementation: impl Into<String>) -> Self {
        self.is_abstract = true;
        self.implementation = Some(implementation.into());
        self
    }

    fn build_constructor(params: &[(&str, TargetType)], canonical: bool) -> ConstructorDescriptor {
        ConstructorDescriptor {
            params: params
                .iter()
                .map(|(name, ty)| ParamDescriptor {
                    name: (*name).to_string(),
                    ty: ty.clone(),
                })
                .collect(),
            canonical,
        }
    }

    pub fn has_default_constructor(&self) -> bool {
        self.explicit_default
            || self.constructors.is_empty()
            || self.constructors.iter().any(|c| c.params.is_empty())
    }

    /// Look up a property by exact name.
    pub fn get_property(&self, name: &str) -> Option<&PropertyDescriptor> {
        self.properties.iter().find(|p| p.name == name)
    }

    /// Find a property by column-style name: case-insensitive, and with
    /// `camel_case` underscores are ignored (`author_id` finds `authorId`).
    pub fn find_property(&self, name: &str, camel_case: bool) -> Option<&PropertyDescriptor> {
        let wanted = normalize_name(name, camel_case);
        self.properties
            .iter()
            .find(|p| normalize_name(&p.name, camel_case) == wanted)
    }
}

fn normalize_name(name: &str, camel_case: bool) -> String {
    if camel_case {
        name.chars()
            .filter(|c| *c != '_')
            .map(|c| c.to_ascii_uppercase())
            .collect()
    } else {
        name.to_ascii_uppercase()
    }
}

/// Registry of object type descriptors.
#[derive(Debug, Clone, Default)]
pub struct TypeRegistry {
    types: HashMap<String, Arc<TypeDescriptor>>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a descriptor, replacing any previous one of the same name.
    pub fn register(&mut self, descriptor: TypeDescriptor) {
        self.types
            .insert(descriptor.name.clone(), Arc::new(descriptor));
    }

    /// Builder-style `register`.
    #[must_use]
    pub fn with(mut self, descriptor: TypeDescriptor) -> Self {
        self.register(descriptor);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Arc<TypeDescriptor>> {
        self.types.get(name)
    }

    /// Descriptor for an object target type.
    pub fn describe(&self, ty: &TargetType) -> Option<&Arc<TypeDescriptor>> {
        match ty {
            TargetType::Object(name) => self.get(name),
            _ => None,
        }
    }

    /// Type and nullability of a settable property.
    ///
    /// Every key of a generic keyed container is settable and untyped.
    pub fn setter_type(&self, owner: &TargetType, property: &str) -> Option<(TargetType, bool)> {
        match owner {
            TargetType::Map => Some((TargetType::Any, true)),
            TargetType::Object(_) => self
                .describe(owner)
                .and_then(|d| d.get_property(property))
                .map(|p| (p.ty.clone(), p.nullable)),
            _ => None,
        }
    }

    /// Resolve a column-style name to a settable property name.
    pub fn find_property(&self, owner: &TargetType, name: &str, camel_case: bool) -> Option<String> {
        match owner {
            TargetType::Map => Some(name.to_string()),
            TargetType::Object(_) => self
                .describe(owner)
                .and_then(|d| d.find_property(name, camel_case))
                .map(|p| p.name.clone()),
            _ => None,
        }
    }

    /// Declared constructors of an object type.
    pub fn constructors(&self, ty: &TargetType) -> &[ConstructorDescriptor] {
        self.describe(ty).map_or(&[], |d| d.constructors.as_slice())
    }
}

/// The external object-construction facility.
pub trait ObjectFactory: Send + Sync {
    /// Create an empty instance with the parameterless constructor.
    fn new_instance(&self, ty: &TargetType) -> Result<Datum>;

    /// Create an instance with the constructor matching `arg_types`.
    fn new_instance_with_args(
        &self,
        ty: &TargetType,
        arg_types: &[TargetType],
        args: Vec<Datum>,
    ) -> Result<Datum>;

    /// Whether `new_instance` can produce `ty` without arguments, either
    /// through a parameterless constructor or a concrete implementation.
    fn can_create_default(&self, ty: &TargetType) -> bool;

    fn is_collection_type(&self, ty: &TargetType) -> bool {
        ty.is_collection()
    }
}

/// Object factory producing `Record`s from registered descriptors.
#[derive(Debug, Clone)]
pub struct DefaultObjectFactory {
    types: Arc<TypeRegistry>,
}

impl DefaultObjectFactory {
    pub fn new(types: Arc<TypeRegistry>) -> Self {
        Self { types }
    }

    /// Follow abstract types to their concrete implementation.
    fn concrete(&self, name: &str) -> Result<Arc<TypeDescriptor>> {
        let mut current = name.to_string();
        for _ in 0..16 {
            let descriptor = self.types.get(&current).ok_or_else(|| {
                Error::mapping(
                    MappingErrorKind::UnknownType,
                    format!("Unknown type '{}'", current),
                )
            })?;
            if !descriptor.is_abstract {
                return Ok(Arc::clone(descriptor));
            }
            current = descriptor.implementation.clone().ok_or_else(|| {
                Error::mapping(
                    MappingErrorKind::UnknownType,
                    format!("Abstract type '{}' has no implementation", current),
                )
            })?;
        }
        Err(Error::mapping(
            MappingErrorKind::UnknownType,
            format!("Implementation chain of '{}' does not end", name),
        ))
    }
}

impl ObjectFactory for DefaultObjectFactory {
    fn new_instance(&self, ty: &TargetType) -> Result<Datum> {
        match ty {
            TargetType::Map => Ok(Datum::Object(ObjectRef::new(Record::new(MAP_TYPE_NAME)))),
            TargetType::List(_) => Ok(Datum::List(Vec::new())),
            TargetType::Object(name) => {
                let descriptor = self.concrete(name)?;
                if !descriptor.has_default_constructor() {
                    return Err(Error::mapping(
                        MappingErrorKind::NoConstructor,
                        format!("Type '{}' has no parameterless constructor", descriptor.name),
                    ));
                }
                Ok(Datum::Object(ObjectRef::new(Record::new(
                    descriptor.name.clone(),
                ))))
            }
            scalar => Err(Error::mapping(
                MappingErrorKind::UnknownType,
                format!("Cannot instantiate scalar type '{}'", scalar),
            )),
        }
    }

    fn new_instance_with_args(
        &self,
        ty: &TargetType,
        arg_types: &[TargetType],
        args: Vec<Datum>,
    ) -> Result<Datum> {
        let TargetType::Object(name) = ty else {
            return Err(Error::mapping(
                MappingErrorKind::NoConstructor,
                format!("Type '{}' has no constructors", ty),
            ));
        };
        let descriptor = self.concrete(name)?;
        let constructor = descriptor
            .constructors
            .iter()
            .find(|c| c.accepts(arg_types))
            .ok_or_else(|| {
                let types: Vec<String> = arg_types.iter().map(ToString::to_string).collect();
                Error::mapping(
                    MappingErrorKind::NoConstructor,
                    format!(
                        "No constructor found in {} matching [{}]",
                        descriptor.name,
                        types.join(", ")
                    ),
                )
            })?;

        let mut record = Record::new(descriptor.name.clone());
        for (param, arg) in constructor.params.iter().zip(args) {
            record.set(param.name.clone(), arg);
        }
        Ok(Datum::Object(ObjectRef::new(record)))
    }

    fn can_create_default(&self, ty: &TargetType) -> bool {
        match ty {
            TargetType::Map | TargetType::List(_) => true,
            TargetType::Object(name) => self
                .concrete(name)
                .is_ok_and(|d| d.has_default_constructor()),
            _ => false,
        }
    }
}
