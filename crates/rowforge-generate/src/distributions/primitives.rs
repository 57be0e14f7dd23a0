use chrono::NaiveDate;
use rand::distr::Distribution as _;
use rand::distr::weighted::WeightedIndex;
use rand::{Rng, RngCore};

use rowforge_core::{Distribution, Error, GeneratedRow, GeneratedValue, Result};

/// `true` with the given probability.
#[derive(Debug, Clone)]
pub struct BoolDist {
    probability: f64,
}

impl BoolDist {
    pub fn new(probability: f64) -> Result<Self> {
        if !(0.0..=1.0).contains(&probability) {
            return Err(Error::InvalidArgument(format!(
                "bool probability must be in [0, 1], got {probability}"
            )));
        }
        Ok(Self { probability })
    }
}

impl Distribution for BoolDist {
    fn generate(&self, _row: &GeneratedRow, rng: &mut dyn RngCore) -> Result<GeneratedValue> {
        Ok(GeneratedValue::Bool(rng.random_bool(self.probability)))
    }
}

/// Uniform integer in `min..=max`.
#[derive(Debug, Clone)]
pub struct IntRange {
    min: i64,
    max: i64,
}

impl IntRange {
    pub fn new(min: i64, max: i64) -> Result<Self> {
        if min > max {
            return Err(Error::InvalidArgument(format!(
                "int_range min must be <= max, got {min} > {max}"
            )));
        }
        Ok(Self { min, max })
    }
}

impl Distribution for IntRange {
    fn generate(&self, _row: &GeneratedRow, rng: &mut dyn RngCore) -> Result<GeneratedValue> {
        Ok(GeneratedValue::Int(rng.random_range(self.min..=self.max)))
    }
}

/// Uniform float in `min..=max`.
#[derive(Debug, Clone)]
pub struct FloatRange {
    min: f64,
    max: f64,
}

impl FloatRange {
    pub fn new(min: f64, max: f64) -> Result<Self> {
        if !min.is_finite() || !max.is_finite() || min > max {
            return Err(Error::InvalidArgument(format!(
                "float_range needs finite min <= max, got {min}..{max}"
            )));
        }
        if !(max - min).is_finite() {
            return Err(Error::InvalidArgument(format!(
                "float_range span {min}..{max} is too wide to sample"
            )));
        }
        Ok(Self { min, max })
    }
}

impl Distribution for FloatRange {
    fn generate(&self, _row: &GeneratedRow, rng: &mut dyn RngCore) -> Result<GeneratedValue> {
        Ok(GeneratedValue::Float(rng.random_range(self.min..=self.max)))
    }
}

/// One of a fixed set of labels, picked by weight.
#[derive(Debug, Clone)]
pub struct Choice {
    labels: Vec<String>,
    index: WeightedIndex<f64>,
}

impl Choice {
    pub fn new(options: impl IntoIterator<Item = (String, f64)>) -> Result<Self> {
        let (labels, weights): (Vec<String>, Vec<f64>) = options.into_iter().unzip();
        let index = WeightedIndex::new(&weights)
            .map_err(|err| Error::InvalidArgument(format!("choice weights: {err}")))?;
        Ok(Self { labels, index })
    }
}

impl Distribution for Choice {
    fn generate(&self, _row: &GeneratedRow, rng: &mut dyn RngCore) -> Result<GeneratedValue> {
        let label = &self.labels[self.index.sample(rng)];
        Ok(GeneratedValue::Text(label.clone()))
    }
}

/// Random version 4 UUID built from the row RNG, so it replays with the row.
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidDist;

impl Distribution for UuidDist {
    fn generate(&self, _row: &GeneratedRow, rng: &mut dyn RngCore) -> Result<GeneratedValue> {
        let mut bytes = [0_u8; 16];
        rng.fill_bytes(&mut bytes);
        let id = uuid::Builder::from_random_bytes(bytes).into_uuid();
        Ok(GeneratedValue::Uuid(id.to_string()))
    }
}

/// Uniform date in `min..=max`.
#[derive(Debug, Clone)]
pub struct DateRange {
    min: NaiveDate,
    span_days: i64,
}

impl DateRange {
    pub fn new(min: NaiveDate, max: NaiveDate) -> Result<Self> {
        if min > max {
            return Err(Error::InvalidArgument(format!(
                "date_range min must be <= max, got {min} > {max}"
            )));
        }
        Ok(Self {
            min,
            span_days: (max - min).num_days(),
        })
    }
}

impl Distribution for DateRange {
    fn generate(&self, _row: &GeneratedRow, rng: &mut dyn RngCore) -> Result<GeneratedValue> {
        let offset = rng.random_range(0..=self.span_days);
        Ok(GeneratedValue::Date(self.min + chrono::Duration::days(offset)))
    }
}

/// Label derived from an integer field drawn earlier in the row.
///
/// `labels[i]` is used for values below `thresholds[i]`; the last label takes
/// everything else. Draws nothing from the RNG.
#[derive(Debug, Clone)]
pub struct Bucket {
    source: String,
    thresholds: Vec<i64>,
    labels: Vec<String>,
}

impl Bucket {
    pub fn new(source: impl Into<String>, thresholds: Vec<i64>, labels: Vec<String>) -> Result<Self> {
        let source = source.into();
        if labels.len() != thresholds.len() + 1 {
            return Err(Error::InvalidArgument(format!(
                "bucket on '{source}' needs one more label than thresholds ({} labels, {} thresholds)",
                labels.len(),
                thresholds.len()
            )));
        }
        if thresholds.windows(2).any(|pair| pair[0] >= pair[1]) {
            return Err(Error::InvalidArgument(format!(
                "bucket thresholds on '{source}' must be strictly increasing"
            )));
        }
        Ok(Self {
            source,
            thresholds,
            labels,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }
}

impl Distribution for Bucket {
    fn generate(&self, row: &GeneratedRow, _rng: &mut dyn RngCore) -> Result<GeneratedValue> {
        let value = row
            .value(&self.source)
            .and_then(|value| value.as_i64())
            .ok_or_else(|| {
                Error::distribution(
                    &self.source,
                    "bucket source must be an integer generated earlier in the row",
                )
            })?;
        let index = self.thresholds.partition_point(|threshold| *threshold <= value);
        Ok(GeneratedValue::Text(self.labels[index].clone()))
    }
}
