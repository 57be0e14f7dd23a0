//! Concurrent row generation and aggregation for rowforge.
//!
//! Rows are identified by a shuffled, collision-free stream of
//! `(row id, seed)` pairs, drawn field by field from a
//! [`DistributionHolder`](rowforge_core::DistributionHolder), and fed in
//! batches to every configured aggregator. The [`Coordinator`] runs the
//! batches on the calling thread or fans them out to a pool of workers; both
//! paths produce identical results for the same seed.

pub mod aggregators;
pub mod batch;
pub mod distributions;
pub mod engine;
pub mod errors;
pub mod ids;
pub mod options;
pub mod pool;
pub mod progress;

pub use aggregators::AggregatorSpec;
pub use batch::{Batch, BatchId, Batches};
pub use distributions::{DistributionSpec, FieldSpec, build_holder};
pub use engine::{GenerationEngine, select_fields_to_generate};
pub use errors::{ErrorInfo, GenerationError, WorkerFailure};
pub use ids::{RowIdSeedGenerator, RowSpec, RowSpecs, STRIPE_WIDTH};
pub use options::{GenerationOptions, GenerationSettings};
pub use pool::{Coordinator, CoordinatorState};
pub use progress::ProgressReporter;
