//! Stock field distributions and their serializable descriptions.

mod primitives;

use std::sync::Arc;

use chrono::NaiveDate;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use rowforge_core::{Distribution, DistributionHolder, Error, Result};

pub use primitives::{BoolDist, Bucket, Choice, DateRange, FloatRange, IntRange, UuidDist};

/// Description of a stock distribution, as written in run files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DistributionSpec {
    Bool {
        #[serde(default = "default_probability")]
        probability: f64,
    },
    IntRange {
        min: i64,
        max: i64,
    },
    FloatRange {
        min: f64,
        max: f64,
    },
    Choice {
        options: Vec<WeightedOption>,
    },
    Uuid,
    /// Dates are `YYYY-MM-DD`.
    DateRange {
        min: String,
        max: String,
    },
    Bucket {
        /// Integer field drawn earlier in the row.
        source: String,
        thresholds: Vec<i64>,
        labels: Vec<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct WeightedOption {
    pub label: String,
    #[serde(default = "default_weight")]
    pub weight: f64,
}

fn default_probability() -> f64 {
    0.5
}

fn default_weight() -> f64 {
    1.0
}

impl DistributionSpec {
    pub fn build(&self) -> Result<Arc<dyn Distribution>> {
        let dist: Arc<dyn Distribution> = match self {
            DistributionSpec::Bool { probability } => Arc::new(BoolDist::new(*probability)?),
            DistributionSpec::IntRange { min, max } => Arc::new(IntRange::new(*min, *max)?),
            DistributionSpec::FloatRange { min, max } => Arc::new(FloatRange::new(*min, *max)?),
            DistributionSpec::Choice { options } => Arc::new(Choice::new(
                options
                    .iter()
                    .map(|option| (option.label.clone(), option.weight)),
            )?),
            DistributionSpec::Uuid => Arc::new(UuidDist),
            DistributionSpec::DateRange { min, max } => {
                Arc::new(DateRange::new(parse_date(min)?, parse_date(max)?)?)
            }
            DistributionSpec::Bucket {
                source,
                thresholds,
                labels,
            } => Arc::new(Bucket::new(source.clone(), thresholds.clone(), labels.clone())?),
        };
        Ok(dist)
    }
}

/// A named field in a run file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct FieldSpec {
    pub name: String,
    #[serde(flatten)]
    pub distribution: DistributionSpec,
}

/// Build a holder whose generation order is the order of `fields`.
///
/// A bucket must come after its source field, or it would read a value that
/// has not been drawn yet.
pub fn build_holder(fields: &[FieldSpec]) -> Result<DistributionHolder> {
    let mut holder = DistributionHolder::new();
    for field in fields {
        if let DistributionSpec::Bucket { source, .. } = &field.distribution {
            if !holder.contains(source) && source != rowforge_core::ROW_ID_FIELD {
                return Err(Error::InvalidArgument(format!(
                    "field '{}' buckets '{source}', which must be declared before it",
                    field.name
                )));
            }
        }
        holder.push_shared(field.name.clone(), field.distribution.build()?)?;
    }
    Ok(holder)
}

fn parse_date(value: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map_err(|err| Error::InvalidArgument(format!("invalid date '{value}': {err}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field(name: &str, distribution: DistributionSpec) -> FieldSpec {
        FieldSpec {
            name: name.to_string(),
            distribution,
        }
    }

    #[test]
    fn specs_parse_from_tagged_json() {
        let fields: Vec<FieldSpec> = serde_json::from_str(
            r#"[
                {"name": "age", "kind": "int_range", "min": 0, "max": 99},
                {"name": "active", "kind": "bool"},
                {"name": "joined", "kind": "date_range", "min": "2020-01-01", "max": "2020-12-31"}
            ]"#,
        )
        .expect("parse fields");
        assert_eq!(fields[0].distribution, DistributionSpec::IntRange { min: 0, max: 99 });
        assert_eq!(fields[1].distribution, DistributionSpec::Bool { probability: 0.5 });

        let holder = build_holder(&fields).expect("holder");
        assert_eq!(holder.var_order(), ["age", "active", "joined"]);
    }

    #[test]
    fn bucket_source_must_come_first() {
        let bucket = DistributionSpec::Bucket {
            source: "age".to_string(),
            thresholds: vec![18],
            labels: vec!["minor".to_string(), "adult".to_string()],
        };
        let fields = [
            field("band", bucket.clone()),
            field("age", DistributionSpec::IntRange { min: 0, max: 99 }),
        ];
        assert!(build_holder(&fields).is_err());

        let fields = [
            field("age", DistributionSpec::IntRange { min: 0, max: 99 }),
            field("band", bucket),
        ];
        assert!(build_holder(&fields).is_ok());
    }

    #[test]
    fn bad_dates_are_rejected() {
        let spec = DistributionSpec::DateRange {
            min: "2020-13-01".to_string(),
            max: "2020-12-31".to_string(),
        };
        assert_eq!(spec.build().err().map(|err| err.kind()), Some("invalid_argument"));
    }
}
