use std::path::{Path, PathBuf};

use rowforge_core::{AggregatorBox, DistributionHolder};
use rowforge_generate::{
    AggregatorSpec, FieldSpec, GenerationOptions, GenerationSettings, build_holder,
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid run file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid run file: {0}")]
    Invalid(#[from] rowforge_core::Error),
}

/// A generation run as described in a TOML run file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct RunConfig {
    #[serde(default)]
    pub generation: GenerationSettings,
    /// Fields in generation order.
    pub fields: Vec<FieldSpec>,
    /// Aggregators in result order.
    pub aggregators: Vec<AggregatorSpec>,
}

/// Values given on the command line, which win over the run file.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub seed: Option<i64>,
    pub unseeded: bool,
    pub workers: Option<usize>,
    pub rows: Option<u64>,
    pub batch_size: Option<usize>,
    pub verbose: bool,
}

impl RunConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&text)
    }

    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    pub fn apply(&mut self, overrides: &Overrides) {
        let settings = &mut self.generation;
        if overrides.unseeded {
            settings.random_seed = None;
        } else if let Some(seed) = overrides.seed {
            settings.random_seed = Some(seed);
        }
        if let Some(workers) = overrides.workers {
            settings.num_processes = workers;
        }
        if let Some(rows) = overrides.rows {
            settings.num_rows = rows;
        }
        if let Some(batch_size) = overrides.batch_size {
            settings.batch_size = batch_size;
        }
        settings.verbose |= overrides.verbose;
    }

    pub fn distributions(&self) -> Result<DistributionHolder, ConfigError> {
        Ok(build_holder(&self.fields)?)
    }

    pub fn options(&self) -> GenerationOptions {
        let aggregators: Vec<AggregatorBox> =
            self.aggregators.iter().map(AggregatorSpec::build).collect();
        self.generation.clone().into_options(aggregators)
    }
}

#[cfg(test)]
mod tests {
    use rowforge_generate::DistributionSpec;

    use super::*;

    const DEMO: &str = include_str!("../demos/run.toml");

    #[test]
    fn demo_run_file_parses() {
        let config = RunConfig::from_toml(DEMO).expect("parse demo");
        assert_eq!(config.generation.random_seed, Some(1234));
        assert_eq!(config.generation.num_processes, 2);
        assert_eq!(config.fields.len(), 5);
        assert_eq!(
            config.fields[0].distribution,
            DistributionSpec::IntRange { min: 0, max: 99 }
        );
        assert_eq!(config.aggregators[0], AggregatorSpec::Count);

        let holder = config.distributions().expect("distributions");
        assert_eq!(
            holder.var_order(),
            ["age", "band", "region", "signup", "member"]
        );
        let options = config.options();
        assert_eq!(options.aggregators.len(), 3);
        options.validate().expect("demo options are valid");
    }

    #[test]
    fn command_line_wins_over_file() {
        let mut config = RunConfig::from_toml(DEMO).expect("parse demo");
        config.apply(&Overrides {
            seed: Some(9),
            workers: Some(4),
            rows: Some(50),
            ..Overrides::default()
        });
        assert_eq!(config.generation.random_seed, Some(9));
        assert_eq!(config.generation.num_processes, 4);
        assert_eq!(config.generation.num_rows, 50);
        assert_eq!(config.generation.batch_size, 100);

        config.apply(&Overrides {
            unseeded: true,
            ..Overrides::default()
        });
        assert_eq!(config.generation.random_seed, None);
    }

    #[test]
    fn missing_generation_table_uses_defaults() {
        let config = RunConfig::from_toml(
            r#"
            [[fields]]
            name = "flag"
            kind = "bool"

            [[aggregators]]
            kind = "count"
            "#,
        )
        .expect("parse");
        assert_eq!(config.generation, GenerationSettings::default());
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = RunConfig::from_toml("fields = []\naggregators = []\nextra = 1\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }
}
