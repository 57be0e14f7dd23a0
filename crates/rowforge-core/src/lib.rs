//! Core contracts shared by the rowforge crates.
//!
//! Defines generated values and rows, the distribution seam that draws field
//! values, and the map-reduce aggregator contract every row consumer
//! implements.

pub mod aggregator;
pub mod distribution;
pub mod error;
pub mod row;
pub mod value;

pub use aggregator::{
    AggregateResults, AggregateValue, Aggregator, AggregatorBox, DynAggregator,
};
pub use distribution::{Distribution, DistributionHolder};
pub use error::{Error, Result};
pub use row::{GeneratedRow, ROW_ID_FIELD};
pub use value::GeneratedValue;
