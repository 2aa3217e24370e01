//! Error types for row materialization.

use std::fmt;

/// The primary error type for all materialization operations.
#[derive(Debug)]
pub enum Error {
    /// Type conversion errors
    Type(TypeError),
    /// Underlying row cursor failures
    Cursor(CursorError),
    /// Fatal mapping configuration errors
    Mapping(MappingError),
    /// A data error raised while materializing a specific row
    Row(RowError),
    /// Single-object contract received more than one result
    TooManyResults { expected: usize, found: usize },
    /// Nested query failures
    NestedQuery(NestedQueryError),
    /// Settings errors
    Config(ConfigError),
    /// Custom error with message
    Custom(String),
}

/// A cell that could not be read as the requested representation.
#[derive(Debug)]
pub struct TypeError {
    pub expected: &'static str,
    pub actual: String,
    pub column: Option<String>,
}

#[derive(Debug)]
pub struct CursorError {
    pub message: String,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

#[derive(Debug)]
pub struct MappingError {
    pub kind: MappingErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MappingErrorKind {
    /// No constructor of the target type can be used for the row
    NoConstructor,
    /// Target type has no descriptor or cannot be instantiated
    UnknownType,
    /// Collection property without a declared or discoverable type
    AmbiguousCollection,
    /// Statement declares no mapping plans but produced rows
    NoMappingPlans,
    /// Referenced mapping plan id is not registered
    UnknownPlan,
    /// Two properties claim the same named result set
    DuplicateResultSetMapping,
    /// Unmapped column rejected by the failing unknown-column policy
    UnknownColumn,
    /// Row window combined with nested mapping or ordered mode
    UnsafeRowBounds,
    /// Custom consumer combined with unordered nested mapping
    UnsafeResultHandler,
    /// No converter for a (target type, column type) pair
    MissingConverter,
    /// Nested query mapping without a query executor
    MissingExecutor,
    /// Malformed mapping definition
    InvalidMapping,
}

/// A data error annotated with the mapping context it happened in.
#[derive(Debug)]
pub struct RowError {
    pub plan_id: String,
    pub property: Option<String>,
    /// Zero-based position of the row within its cursor
    pub row: usize,
    pub source: Box<Error>,
}

#[derive(Debug)]
pub struct NestedQueryError {
    pub query_id: String,
    pub message: String,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

#[derive(Debug)]
pub struct ConfigError {
    pub message: String,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl Error {
    /// Build a fatal mapping configuration error.
    pub fn mapping(kind: MappingErrorKind, message: impl Into<String>) -> Self {
        Error::Mapping(MappingError {
            kind,
            message: message.into(),
        })
    }

    /// Build a cursor error from a message.
    pub fn cursor(message: impl Into<String>) -> Self {
        Error::Cursor(CursorError {
            message: message.into(),
            source: None,
        })
    }

    /// Is this one of the fatal configuration errors?
    pub fn is_configuration_error(&self) -> bool {
        match self {
            Error::Mapping(_) | Error::Config(_) => true,
            Error::Row(e) => e.source.is_configuration_error(),
            _ => false,
        }
    }

    /// The mapping error kind, looking through row context.
    pub fn mapping_kind(&self) -> Option<MappingErrorKind> {
        match self {
            Error::Mapping(e) => Some(e.kind),
            Error::Row(e) => e.source.mapping_kind(),
            _ => None,
        }
    }

    /// Row position recorded by the innermost row context, if any.
    pub fn row_position(&self) -> Option<usize> {
        match self {
            Error::Row(e) => Some(e.row),
            _ => None,
        }
    }

    /// Copy of this error for reporting it a second time.
    ///
    /// Kinds, messages and row context carry over; foreign boxed sources
    /// are not cloneable and are dropped from the copy.
    pub fn replay(&self) -> Self {
        match self {
            Error::Type(e) => Error::Type(TypeError {
                expected: e.expected,
                actual: e.actual.clone(),
                column: e.column.clone(),
            }),
            Error::Cursor(e) => Error::cursor(e.message.clone()),
            Error::Mapping(e) => Error::mapping(e.kind, e.message.clone()),
            Error::Row(e) => Error::Row(RowError {
                plan_id: e.plan_id.clone(),
                property: e.property.clone(),
                row: e.row,
                source: Box::new(e.source.replay()),
            }),
            Error::TooManyResults { expected, found } => Error::TooManyResults {
                expected: *expected,
                found: *found,
            },
            Error::NestedQuery(e) => Error::NestedQuery(NestedQueryError {
                query_id: e.query_id.clone(),
                message: e.message.clone(),
                source: None,
            }),
            Error::Config(e) => Error::Config(ConfigError {
                message: e.message.clone(),
                source: None,
            }),
            Error::Custom(message) => Error::Custom(message.clone()),
        }
    }

    /// Attach row context unless the error already carries it.
    pub fn at_row(self, plan_id: &str, property: Option<&str>, row: usize) -> Self {
        match self {
            Error::Row(_) => self,
            Error::Mapping(_) | Error::Config(_) | Error::TooManyResults { .. } => self,
            other => Error::Row(RowError {
                plan_id: plan_id.to_string(),
                property: property.map(str::to_string),
                row,
                source: Box::new(other),
            }),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Type(e) => write!(f, "Cannot convert value: {e}"),
            Error::Cursor(e) => write!(f, "Cursor error: {}", e.message),
            Error::Mapping(e) => write!(f, "Mapping error: {}", e.message),
            Error::Row(e) => write!(f, "{}", e),
            Error::TooManyResults { expected, found } => write!(
                f,
                "Expected at most {} result(s), but found {}",
                expected, found
            ),
            Error::NestedQuery(e) => {
                write!(f, "Nested query '{}' failed: {}", e.query_id, e.message)
            }
            Error::Config(e) => write!(f, "Configuration error: {}", e.message),
            Error::Custom(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Cursor(e) => e
                .source
                .as_deref()
                .map(|err| err as &(dyn std::error::Error + 'static)),
            Error::Row(e) => Some(e.source.as_ref()),
            Error::NestedQuery(e) => e
                .source
                .as_deref()
                .map(|err| err as &(dyn std::error::Error + 'static)),
            Error::Config(e) => e
                .source
                .as_deref()
                .map(|err| err as &(dyn std::error::Error + 'static)),
            _ => None,
        }
    }
}

impl fmt::Display for TypeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "wanted {} but got {}", self.expected, self.actual)?;
        match &self.column {
            Some(column) => write!(f, " (column '{column}')"),
            None => Ok(()),
        }
    }
}

impl fmt::Display for CursorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl fmt::Display for MappingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl fmt::Display for RowError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.property {
            Some(property) => write!(
                f,
                "Error materializing row {} for mapping '{}', property '{}': {}",
                self.row, self.plan_id, property, self.source
            ),
            None => write!(
                f,
                "Error materializing row {} for mapping '{}': {}",
                self.row, self.plan_id, self.source
            ),
        }
    }
}

impl fmt::Display for NestedQueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl From<TypeError> for Error {
    fn from(err: TypeError) -> Self {
        Error::Type(err)
    }
}

impl From<CursorError> for Error {
    fn from(err: CursorError) -> Self {
        Error::Cursor(err)
    }
}

impl From<MappingError> for Error {
    fn from(err: MappingError) -> Self {
        Error::Mapping(err)
    }
}

impl From<RowError> for Error {
    fn from(err: RowError) -> Self {
        Error::Row(err)
    }
}

impl From<NestedQueryError> for Error {
    fn from(err: NestedQueryError) -> Self {
        Error::NestedQuery(err)
    }
}

impl From<ConfigError> for Error {
    fn from(err: ConfigError) -> Self {
        Error::Config(err)
    }
}

/// Result type alias for materialization operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_context_wraps_data_errors_once() {
        let err = Error::Type(TypeError {
            expected: "i64",
            actual: "TEXT".to_string(),
            column: Some("id".to_string()),
        });

        let wrapped = err.at_row("blog", Some("id"), 3);
        assert_eq!(wrapped.row_position(), Some(3));

        let rewrapped = wrapped.at_row("outer", None, 9);
        assert_eq!(rewrapped.row_position(), Some(3));
        assert!(rewrapped.to_string().contains("mapping 'blog'"));
        assert!(std::error::Error::source(&rewrapped).is_some());
    }

    #[test]
    fn configuration_errors_are_not_wrapped() {
        let err = Error::mapping(MappingErrorKind::NoConstructor, "no constructor");
        let err = err.at_row("blog", None, 0);

        assert!(err.is_configuration_error());
        assert_eq!(err.mapping_kind(), Some(MappingErrorKind::NoConstructor));
        assert_eq!(err.row_position(), None);
    }

    #[test]
    fn too_many_results_display() {
        let err = Error::TooManyResults {
            expected: 1,
            found: 2,
        };
        assert_eq!(err.to_string(), "Expected at most 1 result(s), but found 2");
        assert!(!err.is_configuration_error());
    }

    #[test]
    fn replay_keeps_kind_and_context() {
        let err = Error::NestedQuery(NestedQueryError {
            query_id: "selectAuthor".to_string(),
            message: "connection reset".to_string(),
            source: Some(Box::new(std::io::Error::other("reset"))),
        })
        .at_row("blog", Some("author"), 2);

        let copy = err.replay();
        assert_eq!(copy.to_string(), err.to_string());
        assert_eq!(copy.row_position(), Some(2));
        let Error::Row(row) = copy else {
            panic!("expected row context");
        };
        assert!(matches!(*row.source, Error::NestedQuery(ref e) if e.source.is_none()));
    }
}
