//! Stock aggregators.

mod collect;
mod count;
mod csv_writer;
mod histogram;
mod matches;

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use rowforge_core::{AggregateResults, AggregatorBox, GeneratedValue};

use crate::errors::GenerationError;

pub use self::collect::RowCollector;
pub use self::count::RowCounter;
pub use self::csv_writer::CsvRowWriter;
pub use self::histogram::FieldHistogram;
pub use self::matches::MatchCollector;

/// Description of a stock aggregator, as written in run files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AggregatorSpec {
    Count,
    Histogram {
        field: String,
    },
    Collect {
        fields: Vec<String>,
    },
    Csv {
        dir: PathBuf,
        fields: Vec<String>,
        #[serde(default)]
        prefix: Option<String>,
    },
    Matches {
        field: String,
        /// Compared against the text form of the field's value.
        value: String,
    },
}

impl AggregatorSpec {
    pub fn build(&self) -> AggregatorBox {
        match self {
            AggregatorSpec::Count => Box::new(RowCounter),
            AggregatorSpec::Histogram { field } => Box::new(FieldHistogram::new(field.clone())),
            AggregatorSpec::Collect { fields } => Box::new(RowCollector::new(fields.clone())),
            AggregatorSpec::Csv {
                dir,
                fields,
                prefix,
            } => {
                let writer = CsvRowWriter::new(dir.clone(), fields.clone());
                match prefix {
                    Some(prefix) => Box::new(writer.with_prefix(prefix.clone())),
                    None => Box::new(writer),
                }
            }
            AggregatorSpec::Matches { field, value } => Box::new(MatchCollector::new(
                field.clone(),
                GeneratedValue::Text(value.clone()),
            )),
        }
    }

    /// JSON rendering of this aggregator's final result at `index`.
    pub fn summarize(
        &self,
        results: &AggregateResults,
        index: usize,
    ) -> Result<Value, GenerationError> {
        let value = match self {
            AggregatorSpec::Count | AggregatorSpec::Csv { .. } => {
                json!(results.expect_typed::<u64>(index)?)
            }
            AggregatorSpec::Histogram { .. } => {
                json!(results.expect_typed::<BTreeMap<String, u64>>(index)?)
            }
            AggregatorSpec::Collect { .. } => {
                let rows = results.expect_typed::<BTreeMap<u64, Vec<GeneratedValue>>>(index)?;
                let rows: BTreeMap<String, &Vec<GeneratedValue>> = rows
                    .iter()
                    .map(|(id, values)| (id.to_string(), values))
                    .collect();
                serde_json::to_value(rows)?
            }
            AggregatorSpec::Matches { .. } => {
                json!(results.expect_typed::<BTreeSet<u64>>(index)?)
            }
        };
        Ok(value)
    }
}
