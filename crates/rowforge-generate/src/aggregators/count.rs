use std::collections::BTreeSet;

use rowforge_core::{Aggregator, GeneratedRow, Result};

/// Counts the rows it sees.
#[derive(Debug, Clone, Copy, Default)]
pub struct RowCounter;

impl Aggregator for RowCounter {
    type Output = u64;

    fn name(&self) -> &str {
        "row_counter"
    }

    fn fields_needed(&self) -> BTreeSet<String> {
        BTreeSet::new()
    }

    fn map(&mut self, _row: &GeneratedRow) -> Result<u64> {
        Ok(1)
    }

    fn reduce(&mut self, larger: u64, smaller: u64) -> Result<u64> {
        Ok(larger + smaller)
    }
}
