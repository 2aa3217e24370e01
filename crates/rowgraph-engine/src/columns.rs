//! Column bookkeeping for one cursor.

use rowgraph_core::{ColumnInfo, MappingPlan, SqlType};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Columns of a cursor split by whether a plan maps them explicitly.
#[derive(Debug, Default)]
pub(crate) struct ColumnPartition {
    /// Upper-cased names of explicitly mapped columns present in the cursor
    mapped: HashSet<String>,
    /// Remaining column names, original case, cursor order
    unmapped: Vec<String>,
}

impl ColumnPartition {
    pub(crate) fn is_mapped(&self, column: &str) -> bool {
        self.mapped.contains(&column.to_ascii_uppercase())
    }

    pub(crate) fn unmapped(&self) -> &[String] {
        &self.unmapped
    }
}

/// A cursor's columns plus per-(plan, prefix) partitions computed once.
#[derive(Debug)]
pub(crate) struct ResultSetView {
    columns: Arc<ColumnInfo>,
    partitions: HashMap<String, Arc<ColumnPartition>>,
}

impl ResultSetView {
    pub(crate) fn new(columns: Arc<ColumnInfo>) -> Self {
        Self {
            columns,
            partitions: HashMap::new(),
        }
    }

    pub(crate) fn column_names(&self) -> &[String] {
        self.columns.names()
    }

    pub(crate) fn len(&self) -> usize {
        self.columns.len()
    }

    /// Declared type of a column; `Unknown` reads as undeclared.
    pub(crate) fn column_type(&self, name: &str) -> Option<&SqlType> {
        self.columns
            .type_of(name)
            .filter(|t| !matches!(t, SqlType::Unknown))
    }

    pub(crate) fn type_at(&self, index: usize) -> Option<&SqlType> {
        self.columns
            .type_at(index)
            .filter(|t| !matches!(t, SqlType::Unknown))
    }

    /// Whether any column starts with the (upper-cased) prefix.
    pub(crate) fn has_prefixed_column(&self, prefix: &str) -> bool {
        self.column_names()
            .iter()
            .any(|c| c.to_ascii_uppercase().starts_with(prefix))
    }

    /// Mapped/unmapped split for a plan under a column prefix.
    pub(crate) fn partition(&mut self, plan: &MappingPlan, prefix: Option<&str>) -> Arc<ColumnPartition> {
        let prefix = prefix.unwrap_or("").to_ascii_uppercase();
        let cache_key = format!("{}:{}", plan.id(), prefix);
        if let Some(partition) = self.partitions.get(&cache_key) {
            return Arc::clone(partition);
        }

        let mapped_columns: HashSet<String> = plan
            .mapped_columns()
            .iter()
            .map(|c| format!("{}{}", prefix, c))
            .collect();

        let mut partition = ColumnPartition::default();
        for name in self.columns.names() {
            let upper = name.to_ascii_uppercase();
            if mapped_columns.contains(&upper) {
                partition.mapped.insert(upper);
            } else {
                partition.unmapped.push(name.clone());
            }
        }

        let partition = Arc::new(partition);
        self.partitions.insert(cache_key, Arc::clone(&partition));
        partition
    }
}

/// Join an enclosing prefix and a local one; empty means no prefix.
pub(crate) fn join_prefix(parent: Option<&str>, local: Option<&str>) -> Option<String> {
    let joined = format!("{}{}", parent.unwrap_or(""), local.unwrap_or(""));
    (!joined.is_empty()).then(|| joined.to_ascii_uppercase())
}

/// Column name with the prefix applied.
pub(crate) fn prefixed(column: Option<&str>, prefix: Option<&str>) -> Option<String> {
    let column = column.filter(|c| !c.is_empty())?;
    match prefix.filter(|p| !p.is_empty()) {
        Some(prefix) => Some(format!("{}{}", prefix, column)),
        None => Some(column.to_string()),
    }
}

/// Strip a prefix from a column name, case-insensitively.
pub(crate) fn strip_prefix<'c>(column: &'c str, prefix: Option<&str>) -> Option<&'c str> {
    match prefix.filter(|p| !p.is_empty()) {
        None => Some(column),
        Some(prefix) => {
            let head = column.get(..prefix.len())?;
            head.eq_ignore_ascii_case(prefix)
                .then(|| &column[prefix.len()..])
        }
    }
}
