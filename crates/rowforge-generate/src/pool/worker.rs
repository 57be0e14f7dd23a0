use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};

use rowforge_core::DistributionHolder;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tracing::{debug, warn};

use crate::engine::GenerationEngine;
use crate::errors::{ErrorInfo, GenerationError};
use crate::options::GenerationOptions;
use crate::pool::protocol::{Task, WorkerException, WorkerReport};

/// How a worker thread ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerExit {
    /// Received `Done`, ran `done` and reported `Dying`.
    Finished,
    /// Reported an exception.
    Failed,
    /// Stopped because the run was aborted elsewhere. Nothing is reported.
    Cancelled,
}

/// Outcome of a body run under [`guarded`].
pub(crate) enum Guarded<T> {
    Finished(T),
    Cancelled,
    Failed(ErrorInfo),
}

/// Run `body`, turning errors and panics into [`ErrorInfo`].
pub(crate) fn guarded<T>(body: impl FnOnce() -> Result<T, GenerationError>) -> Guarded<T> {
    match panic::catch_unwind(AssertUnwindSafe(body)) {
        Ok(Ok(value)) => Guarded::Finished(value),
        Ok(Err(GenerationError::Cancelled)) => Guarded::Cancelled,
        Ok(Err(err)) => Guarded::Failed(ErrorInfo::from_error(&err)),
        Err(panic) => Guarded::Failed(ErrorInfo::from_panic(panic)),
    }
}

/// Engine of one worker plus whether its `done` has been called, so the
/// failure path knows whether a best-effort `done` is still owed.
#[derive(Default)]
pub(crate) struct EngineSlot {
    engine: Option<GenerationEngine>,
    done_attempted: bool,
}

impl EngineSlot {
    pub(crate) fn start(
        &mut self,
        options: &GenerationOptions,
        distributions: &DistributionHolder,
        cancel: Arc<AtomicBool>,
    ) -> Result<&mut GenerationEngine, GenerationError> {
        let engine = GenerationEngine::new(options, distributions)?.with_cancellation(cancel);
        Ok(self.engine.insert(engine))
    }

    pub(crate) fn finish(&mut self) -> Result<(), GenerationError> {
        self.done_attempted = true;
        match self.engine.as_mut() {
            Some(engine) => engine.done(),
            None => Ok(()),
        }
    }

    /// `done` after a failure. Errors and panics are swallowed.
    pub(crate) fn finish_quietly(&mut self) {
        if self.done_attempted {
            return;
        }
        if let Guarded::Failed(info) = guarded(|| self.finish()) {
            debug!(kind = %info.kind, message = %info.message, "done after failure also failed");
        }
    }
}

pub(crate) struct Worker {
    pub worker_id: usize,
    pub options: GenerationOptions,
    pub distributions: DistributionHolder,
    pub tasks: Arc<Mutex<UnboundedReceiver<Task>>>,
    pub reports: UnboundedSender<WorkerReport>,
    pub errors: UnboundedSender<WorkerException>,
    pub cancel: Arc<AtomicBool>,
}

impl Worker {
    pub(crate) fn spawn(self) -> io::Result<JoinHandle<WorkerExit>> {
        thread::Builder::new()
            .name(format!("rowforge-worker-{}", self.worker_id))
            .spawn(move || self.run())
    }

    fn run(self) -> WorkerExit {
        debug!(worker = self.worker_id, "worker started");
        let mut slot = EngineSlot::default();
        match guarded(|| self.serve(&mut slot)) {
            Guarded::Finished(()) => {
                debug!(worker = self.worker_id, "worker finished");
                WorkerExit::Finished
            }
            Guarded::Cancelled => {
                debug!(worker = self.worker_id, "worker cancelled");
                WorkerExit::Cancelled
            }
            Guarded::Failed(info) => {
                warn!(
                    worker = self.worker_id,
                    kind = %info.kind,
                    message = %info.message,
                    "worker failed"
                );
                // The coordinator may already be gone; nothing to do then.
                let _ = self.errors.send(WorkerException {
                    worker_id: self.worker_id,
                    info,
                });
                slot.finish_quietly();
                WorkerExit::Failed
            }
        }
    }

    fn serve(&self, slot: &mut EngineSlot) -> Result<(), GenerationError> {
        let engine = slot.start(&self.options, &self.distributions, self.cancel.clone())?;
        loop {
            let task = self.next_task();
            if self.cancelled() {
                return Err(GenerationError::Cancelled);
            }
            match task {
                Some(Task::Batch(batch)) => {
                    let results = engine.generate_and_aggregate(&batch.rows)?;
                    self.reports
                        .send(WorkerReport::Generated {
                            id: batch.id,
                            worker_id: self.worker_id,
                            results,
                        })
                        .map_err(|_| self.hung_up("result"))?;
                }
                Some(Task::Done) => break,
                None => return Err(self.hung_up("task")),
            }
        }
        slot.finish()?;
        self.reports
            .send(WorkerReport::Dying {
                worker_id: self.worker_id,
            })
            .map_err(|_| self.hung_up("result"))
    }

    fn next_task(&self) -> Option<Task> {
        let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        tasks.blocking_recv()
    }

    fn cancelled(&self) -> bool {
        self.cancel.load(Ordering::Relaxed)
    }

    fn hung_up(&self, channel: &str) -> GenerationError {
        if self.cancelled() {
            GenerationError::Cancelled
        } else {
            GenerationError::Protocol(format!("{channel} channel closed before done"))
        }
    }
}
