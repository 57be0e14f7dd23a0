use rowforge_core::{Aggregator, AggregatorBox, Error, Result};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::ids::{RowIdSeedGenerator, STRIPE_WIDTH};

/// Options for a generation run.
#[derive(Debug, Clone)]
pub struct GenerationOptions {
    /// Run seed. `None` makes the run non-reproducible.
    pub random_seed: Option<i64>,
    /// Number of workers. `1` generates on the calling thread.
    pub num_processes: usize,
    /// Number of rows to generate.
    pub num_rows: u64,
    /// Rows sent to a worker in one message. Larger batches mean less
    /// coordination but slower feedback.
    pub batch_size: usize,
    /// Row ids per stripe.
    pub stripe_width: u64,
    /// Report progress at info level instead of debug.
    pub verbose: bool,
    /// Aggregators fed with every row, in result order.
    pub aggregators: Vec<AggregatorBox>,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        GenerationSettings::default().into_options(Vec::new())
    }
}

impl GenerationOptions {
    pub fn with_seed(mut self, random_seed: Option<i64>) -> Self {
        self.random_seed = random_seed;
        self
    }

    pub fn with_processes(mut self, num_processes: usize) -> Self {
        self.num_processes = num_processes;
        self
    }

    pub fn with_rows(mut self, num_rows: u64) -> Self {
        self.num_rows = num_rows;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_stripe_width(mut self, stripe_width: u64) -> Self {
        self.stripe_width = stripe_width;
        self
    }

    pub fn with_aggregator(mut self, aggregator: impl Aggregator) -> Self {
        self.aggregators.push(Box::new(aggregator));
        self
    }

    pub fn push_aggregator(&mut self, aggregator: AggregatorBox) {
        self.aggregators.push(aggregator);
    }

    /// Check every option that can be checked before generation starts.
    pub fn validate(&self) -> Result<()> {
        if self.num_processes == 0 {
            return Err(Error::InvalidArgument(
                "num_processes must be >= 1".to_string(),
            ));
        }
        if self.batch_size == 0 {
            return Err(Error::InvalidArgument("batch_size must be >= 1".to_string()));
        }
        if self.num_rows == 0 {
            return Err(Error::InvalidArgument("num_rows must be >= 1".to_string()));
        }
        if self.aggregators.is_empty() {
            return Err(Error::InvalidArgument(
                "at least one aggregator is required".to_string(),
            ));
        }
        // Surfaces stripe-width and stripe-count problems without keeping the
        // stream around.
        self.id_generator().generate(0)?;
        let num_stripes = self.num_rows.div_ceil(self.stripe_width);
        if num_stripes > 1 << 32 {
            return Err(Error::InvalidArgument(format!(
                "num_rows {} does not fit in stripes of width {}",
                self.num_rows, self.stripe_width
            )));
        }
        Ok(())
    }

    pub fn id_generator(&self) -> RowIdSeedGenerator {
        RowIdSeedGenerator::new(self.random_seed).with_stripe_width(self.stripe_width)
    }

    pub fn settings(&self) -> GenerationSettings {
        GenerationSettings {
            random_seed: self.random_seed,
            num_processes: self.num_processes,
            num_rows: self.num_rows,
            batch_size: self.batch_size,
            stripe_width: self.stripe_width,
            verbose: self.verbose,
        }
    }
}

/// Serializable part of [`GenerationOptions`], as read from run files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct GenerationSettings {
    /// Run seed. `null` (JSON) makes the run non-reproducible; TOML has no
    /// null, so run files fall back to the default seed when it is omitted.
    pub random_seed: Option<i64>,
    /// Number of workers.
    pub num_processes: usize,
    /// Number of rows to generate.
    pub num_rows: u64,
    /// Rows per dispatched batch.
    pub batch_size: usize,
    /// Row ids per stripe.
    pub stripe_width: u64,
    /// Report progress at info level.
    pub verbose: bool,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            random_seed: Some(1),
            num_processes: 1,
            num_rows: 100,
            batch_size: 5,
            stripe_width: STRIPE_WIDTH,
            verbose: false,
        }
    }
}

impl GenerationSettings {
    pub fn into_options(self, aggregators: Vec<AggregatorBox>) -> GenerationOptions {
        GenerationOptions {
            random_seed: self.random_seed,
            num_processes: self.num_processes,
            num_rows: self.num_rows,
            batch_size: self.batch_size,
            stripe_width: self.stripe_width,
            verbose: self.verbose,
            aggregators,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregators::RowCounter;

    #[test]
    fn defaults_match_documented_values() {
        let options = GenerationOptions::default();
        assert_eq!(options.random_seed, Some(1));
        assert_eq!(options.num_processes, 1);
        assert_eq!(options.num_rows, 100);
        assert_eq!(options.batch_size, 5);
        assert_eq!(options.stripe_width, STRIPE_WIDTH);
        assert!(options.aggregators.is_empty());
    }

    #[test]
    fn validate_rejects_out_of_range_options() {
        let valid = GenerationOptions::default().with_aggregator(RowCounter);
        assert!(valid.validate().is_ok());

        let cases = [
            valid.clone().with_rows(0),
            valid.clone().with_processes(0),
            valid.clone().with_batch_size(0),
            valid.clone().with_stripe_width(0),
            GenerationOptions::default(),
        ];
        for options in cases {
            let err = options.validate().unwrap_err();
            assert_eq!(err.kind(), "invalid_argument", "{err}");
        }
    }

    #[test]
    fn settings_parse_with_defaults() {
        let settings: GenerationSettings =
            serde_json::from_str(r#"{"num_rows": 10, "random_seed": null}"#).expect("parse");
        assert_eq!(settings.num_rows, 10);
        assert_eq!(settings.random_seed, None);
        assert_eq!(settings.batch_size, 5);
    }
}
