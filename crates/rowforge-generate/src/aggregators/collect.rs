use std::collections::{BTreeMap, BTreeSet};

use rowforge_core::{Aggregator, Error, GeneratedRow, GeneratedValue, Result};

/// Selected field values of every row, keyed by row id.
#[derive(Debug, Clone)]
pub struct RowCollector {
    fields: Vec<String>,
}

impl RowCollector {
    pub fn new<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            fields: fields.into_iter().map(Into::into).collect(),
        }
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }
}

impl Aggregator for RowCollector {
    type Output = BTreeMap<u64, Vec<GeneratedValue>>;

    fn name(&self) -> &str {
        "row_collector"
    }

    fn fields_needed(&self) -> BTreeSet<String> {
        self.fields.iter().cloned().collect()
    }

    fn map(&mut self, row: &GeneratedRow) -> Result<Self::Output> {
        let mut values = Vec::with_capacity(self.fields.len());
        for field in &self.fields {
            let value = row.value(field).ok_or_else(|| {
                Error::aggregator(
                    "row_collector",
                    format!("row {} has no field '{field}'", row.id()),
                )
            })?;
            values.push(value);
        }
        Ok(BTreeMap::from([(row.id(), values)]))
    }

    fn reduce(&mut self, mut larger: Self::Output, smaller: Self::Output) -> Result<Self::Output> {
        for (id, values) in smaller {
            if larger.insert(id, values).is_some() {
                return Err(Error::aggregator(
                    "row_collector",
                    format!("row {id} collected twice"),
                ));
            }
        }
        Ok(larger)
    }
}
