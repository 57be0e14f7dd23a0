use std::collections::BTreeSet;

use rowforge_core::{Aggregator, Error, GeneratedRow, GeneratedValue, Result};

/// Ids of the rows whose field equals a target value; the expected answer of
/// an equality query over the generated rows.
#[derive(Debug, Clone)]
pub struct MatchCollector {
    field: String,
    target: GeneratedValue,
}

impl MatchCollector {
    pub fn new(field: impl Into<String>, target: GeneratedValue) -> Self {
        Self {
            field: field.into(),
            target,
        }
    }
}

impl Aggregator for MatchCollector {
    type Output = BTreeSet<u64>;

    fn name(&self) -> &str {
        "match_collector"
    }

    fn fields_needed(&self) -> BTreeSet<String> {
        BTreeSet::from([self.field.clone()])
    }

    fn map(&mut self, row: &GeneratedRow) -> Result<BTreeSet<u64>> {
        let value = row.value(&self.field).ok_or_else(|| {
            Error::aggregator(
                "match_collector",
                format!("row {} has no field '{}'", row.id(), self.field),
            )
        })?;
        let mut ids = BTreeSet::new();
        if value == self.target || value.to_csv() == self.target.to_csv() {
            ids.insert(row.id());
        }
        Ok(ids)
    }

    fn reduce(&mut self, mut larger: BTreeSet<u64>, smaller: BTreeSet<u64>) -> Result<BTreeSet<u64>> {
        larger.extend(smaller);
        Ok(larger)
    }
}
