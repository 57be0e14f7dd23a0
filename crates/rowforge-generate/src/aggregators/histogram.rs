use std::collections::{BTreeMap, BTreeSet};

use rowforge_core::{Aggregator, Error, GeneratedRow, Result};

/// Number of rows per distinct value of one field, keyed by the value's
/// text form.
#[derive(Debug, Clone)]
pub struct FieldHistogram {
    field: String,
}

impl FieldHistogram {
    pub fn new(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
        }
    }

    pub fn field(&self) -> &str {
        &self.field
    }
}

impl Aggregator for FieldHistogram {
    type Output = BTreeMap<String, u64>;

    fn name(&self) -> &str {
        "field_histogram"
    }

    fn fields_needed(&self) -> BTreeSet<String> {
        BTreeSet::from([self.field.clone()])
    }

    fn map(&mut self, row: &GeneratedRow) -> Result<Self::Output> {
        let value = row.value(&self.field).ok_or_else(|| {
            Error::aggregator(
                "field_histogram",
                format!("row {} has no field '{}'", row.id(), self.field),
            )
        })?;
        Ok(BTreeMap::from([(value.to_csv(), 1)]))
    }

    fn reduce(&mut self, mut larger: Self::Output, smaller: Self::Output) -> Result<Self::Output> {
        for (value, count) in smaller {
            *larger.entry(value).or_insert(0) += count;
        }
        Ok(larger)
    }
}
