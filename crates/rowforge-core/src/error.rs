use std::collections::BTreeSet;

use thiserror::Error;

/// Core error type shared across rowforge crates.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum Error {
    /// A caller-supplied option or argument is out of range.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// A reduction or map-reduce was asked to fold zero values.
    #[error("empty input: {0}")]
    EmptyInput(String),
    /// Aggregators need fields that no distribution can produce.
    #[error("cannot generate needed fields: {}", join_fields(.0))]
    MissingFields(BTreeSet<String>),
    /// An aggregator failed inside one of its lifecycle hooks.
    #[error("aggregator '{name}' failed: {message}")]
    Aggregator { name: String, message: String },
    /// A distribution failed to draw a value.
    #[error("distribution for field '{field}' failed: {message}")]
    Distribution { field: String, message: String },
}

impl Error {
    pub fn aggregator(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Aggregator {
            name: name.into(),
            message: message.into(),
        }
    }

    pub fn distribution(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Distribution {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Stable machine-readable name of the variant.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::InvalidArgument(_) => "invalid_argument",
            Error::EmptyInput(_) => "empty_input",
            Error::MissingFields(_) => "missing_fields",
            Error::Aggregator { .. } => "aggregator",
            Error::Distribution { .. } => "distribution",
        }
    }
}

fn join_fields(fields: &BTreeSet<String>) -> String {
    fields.iter().cloned().collect::<Vec<_>>().join(", ")
}

/// Convenience alias for results returned by rowforge crates.
pub type Result<T> = std::result::Result<T, Error>;
