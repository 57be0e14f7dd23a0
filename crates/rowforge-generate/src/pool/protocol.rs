//! Messages exchanged between the coordinator and its workers.
//!
//! Three channels connect them: tasks flow to the workers, reports and
//! failures flow back. Failures get a channel of their own so the
//! coordinator can look at them before anything else.

use rowforge_core::AggregateValue;

use crate::batch::{Batch, BatchId};
use crate::errors::ErrorInfo;

/// Work for a worker.
#[derive(Debug)]
pub enum Task {
    Batch(Batch),
    /// No more batches will follow; finish and exit.
    Done,
}

/// Regular report from a worker.
pub enum WorkerReport {
    /// One accumulator per aggregator for a completed batch.
    Generated {
        id: BatchId,
        worker_id: usize,
        results: Vec<AggregateValue>,
    },
    /// The worker ran `done` successfully and is exiting.
    Dying { worker_id: usize },
}

impl std::fmt::Debug for WorkerReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WorkerReport::Generated { id, worker_id, results } => f
                .debug_struct("Generated")
                .field("id", id)
                .field("worker_id", worker_id)
                .field("results", &results.len())
                .finish(),
            WorkerReport::Dying { worker_id } => {
                f.debug_struct("Dying").field("worker_id", worker_id).finish()
            }
        }
    }
}

/// Failure reported by a worker just before it exits.
#[derive(Debug, Clone)]
pub struct WorkerException {
    pub worker_id: usize,
    pub info: ErrorInfo,
}
