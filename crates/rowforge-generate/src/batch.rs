use std::fmt;

use crate::ids::RowSpec;

/// Compact, hashable identity of a batch: its first and last row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BatchId {
    pub first: RowSpec,
    pub last: RowSpec,
}

impl fmt::Display for BatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}..{}]", self.first, self.last)
    }
}

/// Group of rows dispatched to a worker as one unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    pub id: BatchId,
    pub rows: Vec<RowSpec>,
}

impl Batch {
    /// `None` for an empty list of rows.
    pub fn new(rows: Vec<RowSpec>) -> Option<Self> {
        let first = *rows.first()?;
        let last = *rows.last()?;
        Some(Self {
            id: BatchId { first, last },
            rows,
        })
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Splits a row stream into batches of `size` rows; the last batch holds
/// whatever is left.
#[derive(Debug, Clone)]
pub struct Batches<I> {
    inner: I,
    size: usize,
}

impl<I: Iterator<Item = RowSpec>> Batches<I> {
    pub fn new(inner: I, size: usize) -> Self {
        Self {
            inner,
            size: size.max(1),
        }
    }
}

impl<I: Iterator<Item = RowSpec>> Iterator for Batches<I> {
    type Item = Batch;

    fn next(&mut self) -> Option<Batch> {
        let rows: Vec<RowSpec> = self.inner.by_ref().take(self.size).collect();
        Batch::new(rows)
    }
}
