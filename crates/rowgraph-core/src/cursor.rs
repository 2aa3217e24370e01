//! Row cursors.
//!
//! A cursor hands out rows one at a time and owns whatever resource backs
//! them. Materialization closes every cursor it is given exactly once, on
//! success and on error.

use crate::error::{CursorError, Error, Result};
use crate::row::{ColumnInfo, Row};
use crate::types::SqlType;
use crate::value::Value;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Sequential, optionally seekable access to the rows of one result set.
pub trait RowCursor {
    /// Column metadata shared by every row of this cursor.
    fn columns(&self) -> Arc<ColumnInfo>;

    /// Advance and return the next row, or `None` when exhausted.
    fn next_row(&mut self) -> Result<Option<Row>>;

    /// Skip up to `count` rows, returning how many were skipped.
    ///
    /// Seekable cursors override this to jump directly.
    fn skip_rows(&mut self, count: usize) -> Result<usize> {
        let mut skipped = 0;
        while skipped < count {
            if self.next_row()?.is_none() {
                break;
            }
            skipped += 1;
        }
        Ok(skipped)
    }

    /// Release the underlying resource.
    fn close(&mut self) -> Result<()>;

    fn is_closed(&self) -> bool;
}

/// An in-memory cursor over pre-built rows.
///
/// Counts `close` calls through a shared handle so callers can verify
/// resource release after handing the cursor away.
#[derive(Debug)]
pub struct VecCursor {
    columns: Arc<ColumnInfo>,
    rows: Vec<Vec<Value>>,
    position: usize,
    closed: bool,
    close_count: Arc<AtomicUsize>,
    fail_at: Option<(usize, String)>,
}

impl VecCursor {
    /// Create a cursor; declared column types are inferred from the first
    /// non-null value of each column.
    pub fn new(names: &[&str], rows: Vec<Vec<Value>>) -> Self {
        let types = (0..names.len())
            .map(|i| {
                rows.iter()
                    .filter_map(|row| row.get(i))
                    .find(|value| !value.is_null())
                    .map_or(SqlType::Unknown, SqlType::of_value)
            })
            .collect();
        let names = names.iter().map(|name| (*name).to_string()).collect();
        Self::with_columns(Arc::new(ColumnInfo::with_types(names, types)), rows)
    }

    /// Create a cursor with explicit column metadata.
    pub fn with_columns(columns: Arc<ColumnInfo>, rows: Vec<Vec<Value>>) -> Self {
        Self {
            columns,
            rows,
            position: 0,
            closed: false,
            close_count: Arc::new(AtomicUsize::new(0)),
            fail_at: None,
        }
    }

    /// Make the read of row `index` fail with a cursor error.
    #[must_use]
    pub fn fail_at(mut self, index: usize, message: impl Into<String>) -> Self {
        self.fail_at = Some((index, message.into()));
        self
    }

    /// Shared counter of `close` calls.
    pub fn close_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.close_count)
    }

    /// Zero-based index of the next row to be read.
    pub fn position(&self) -> usize {
        self.position
    }
}

impl RowCursor for VecCursor {
    fn columns(&self) -> Arc<ColumnInfo> {
        Arc::clone(&self.columns)
    }

    fn next_row(&mut self) -> Result<Option<Row>> {
        if self.closed {
            return Err(Error::cursor("cursor is closed"));
        }
        if let Some((index, message)) = &self.fail_at {
            if *index == self.position {
                return Err(Error::Cursor(CursorError {
                    message: message.clone(),
                    source: None,
                }));
            }
        }
        let Some(values) = self.rows.get(self.position) else {
            return Ok(None);
        };
        self.position += 1;
        Ok(Some(Row::with_columns(
            Arc::clone(&self.columns),
            values.clone(),
        )))
    }

    fn skip_rows(&mut self, count: usize) -> Result<usize> {
        if self.closed {
            return Err(Error::cursor("cursor is closed"));
        }
        let skipped = count.min(self.rows.len().saturating_sub(self.position));
        self.position += skipped;
        Ok(skipped)
    }

    fn close(&mut self) -> Result<()> {
        if !self.closed {
            self.closed = true;
            self.close_count.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed
    }
}
