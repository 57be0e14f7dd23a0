//! Batch dispatch across a pool of worker threads.
//!
//! The [`Coordinator`] owns the run. With one worker it drives a
//! [`GenerationEngine`](crate::engine::GenerationEngine) on the calling
//! thread; with more it spawns worker threads, keeps a bounded number of
//! batches queued for them and folds their partial results. Each worker owns
//! its own engine and aggregator copies, so nothing mutable is shared.

mod coordinator;
mod protocol;
mod worker;

pub use coordinator::{Coordinator, CoordinatorState};
pub use protocol::{Task, WorkerException, WorkerReport};
pub use worker::WorkerExit;
