//! Row windows.

/// Offset and limit applied to the top-level objects of a pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowBounds {
    pub offset: usize,
    pub limit: usize,
}

impl RowBounds {
    pub const NO_ROW_OFFSET: usize = 0;
    pub const NO_ROW_LIMIT: usize = usize::MAX;

    pub const fn new(offset: usize, limit: usize) -> Self {
        Self { offset, limit }
    }

    /// The first `limit` objects.
    pub const fn first(limit: usize) -> Self {
        Self::new(Self::NO_ROW_OFFSET, limit)
    }

    /// No window at all.
    pub const fn unbounded() -> Self {
        Self::new(Self::NO_ROW_OFFSET, Self::NO_ROW_LIMIT)
    }

    pub const fn is_bounded(&self) -> bool {
        self.offset > Self::NO_ROW_OFFSET || self.limit < Self::NO_ROW_LIMIT
    }
}

impl Default for RowBounds {
    fn default() -> Self {
        Self::unbounded()
    }
}
