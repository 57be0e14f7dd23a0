use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use rowforge_core::{AggregateResults, AggregateValue, AggregatorBox, DistributionHolder};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, error, info, warn};

use crate::batch::{Batch, BatchId, Batches};
use crate::engine::select_fields_to_generate;
use crate::errors::{GenerationError, WorkerFailure};
use crate::ids::{RowSpec, RowSpecs};
use crate::options::GenerationOptions;
use crate::pool::protocol::{Task, WorkerException, WorkerReport};
use crate::pool::worker::{EngineSlot, Guarded, Worker, WorkerExit, guarded};
use crate::progress::ProgressReporter;

/// Batches queued per worker when the pool starts.
const QUEUED_BATCHES_PER_WORKER: usize = 4;
/// How long the running loop waits for a result before checking on workers.
const RESULT_POLL: Duration = Duration::from_millis(100);
/// How often the draining loop logs while workers are finishing.
const DRAIN_POLL: Duration = Duration::from_secs(5);

/// Lifecycle of a [`Coordinator`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinatorState {
    /// Constructed; batches are queued and workers spawned on `start`.
    Filling,
    /// Batches are outstanding.
    Running,
    /// Every batch is back; workers are finishing.
    Draining,
    /// Finished or aborted. Cannot be restarted.
    Terminated,
}

impl fmt::Display for CoordinatorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            CoordinatorState::Filling => "filling",
            CoordinatorState::Running => "running",
            CoordinatorState::Draining => "draining",
            CoordinatorState::Terminated => "terminated",
        };
        f.write_str(label)
    }
}

/// Runs a whole generation: row ids, dispatch, and the final reduction.
pub struct Coordinator {
    options: GenerationOptions,
    distributions: DistributionHolder,
    state: CoordinatorState,
}

impl Coordinator {
    /// Validate the options and check that every needed field can be drawn.
    /// Nothing is started yet.
    pub fn new(
        options: GenerationOptions,
        distributions: DistributionHolder,
    ) -> Result<Self, GenerationError> {
        options.validate()?;
        select_fields_to_generate(&distributions, &options.aggregators)?;
        Ok(Self {
            options,
            distributions,
            state: CoordinatorState::Filling,
        })
    }

    pub fn state(&self) -> CoordinatorState {
        self.state
    }

    pub fn options(&self) -> &GenerationOptions {
        &self.options
    }

    /// The coordinator's own aggregator copies. They are only ever used to
    /// reduce results, never to map rows.
    pub fn aggregators(&self) -> &[AggregatorBox] {
        &self.options.aggregators
    }

    /// Run the generation to completion, blocking the calling thread.
    ///
    /// Must not be called from inside an async runtime; use
    /// [`Coordinator::start_async`] there.
    pub fn start(&mut self) -> Result<AggregateResults, GenerationError> {
        self.ensure_not_started()?;
        if self.options.num_processes == 1 {
            return self.run_inline();
        }
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()?;
        runtime.block_on(self.run_pool())
    }

    /// Async form of [`Coordinator::start`].
    pub async fn start_async(&mut self) -> Result<AggregateResults, GenerationError> {
        self.ensure_not_started()?;
        if self.options.num_processes == 1 {
            return self.run_inline();
        }
        self.run_pool().await
    }

    fn ensure_not_started(&self) -> Result<(), GenerationError> {
        if self.state != CoordinatorState::Filling {
            return Err(rowforge_core::Error::InvalidArgument(format!(
                "coordinator already started (state: {})",
                self.state
            ))
            .into());
        }
        Ok(())
    }

    fn row_specs(&self) -> Result<RowSpecs, GenerationError> {
        Ok(self.options.id_generator().generate(self.options.num_rows)?)
    }

    fn progress(&self) -> ProgressReporter {
        ProgressReporter::new(self.options.num_rows).verbose(self.options.verbose)
    }

    /// Single-worker mode: the calling thread is worker 0.
    fn run_inline(&mut self) -> Result<AggregateResults, GenerationError> {
        let started = Instant::now();
        let specs = self.row_specs()?;
        let mut progress = self.progress();
        let mut tally = BatchTally::new(self.options.aggregators.len());
        info!(
            rows = self.options.num_rows,
            batch_size = self.options.batch_size,
            seed = ?self.options.random_seed,
            "generating on the calling thread"
        );

        self.state = CoordinatorState::Running;
        let mut slot = EngineSlot::default();
        let options = &self.options;
        let distributions = &self.distributions;
        let outcome = guarded(|| {
            let cancel = Arc::new(AtomicBool::new(false));
            let engine = slot.start(options, distributions, cancel)?;
            for batch in Batches::new(specs, options.batch_size) {
                let results = engine.generate_and_aggregate(&batch.rows)?;
                tally.record(results)?;
                progress.add(batch.len() as u64);
            }
            slot.finish()
        });
        match outcome {
            Guarded::Finished(()) => {}
            Guarded::Cancelled => {
                self.state = CoordinatorState::Terminated;
                return Err(GenerationError::Cancelled);
            }
            Guarded::Failed(info) => {
                slot.finish_quietly();
                self.state = CoordinatorState::Terminated;
                error!(kind = %info.kind, message = %info.message, "generation failed");
                return Err(GenerationError::WorkerFailure(WorkerFailure::new(0, info)));
            }
        }

        self.state = CoordinatorState::Draining;
        let results = self.reduce(tally);
        self.state = CoordinatorState::Terminated;
        progress.done();
        debug!(duration_ms = started.elapsed().as_millis() as u64, "run complete");
        results
    }

    async fn run_pool(&mut self) -> Result<AggregateResults, GenerationError> {
        let started = Instant::now();
        let workers = self.options.num_processes;
        let mut batches = Batches::new(self.row_specs()?, self.options.batch_size);
        let mut progress = self.progress();
        info!(
            rows = self.options.num_rows,
            workers,
            batch_size = self.options.batch_size,
            seed = ?self.options.random_seed,
            "starting worker pool"
        );

        let (task_tx, task_rx) = mpsc::unbounded_channel();
        let (report_tx, report_rx) = mpsc::unbounded_channel();
        let (error_tx, error_rx) = mpsc::unbounded_channel();
        let mut pool = Pool {
            tasks: Some(task_tx),
            reports: report_rx,
            errors: error_rx,
            handles: Vec::with_capacity(workers),
            cancel: Arc::new(AtomicBool::new(false)),
            outstanding: HashMap::new(),
        };

        for batch in batches.by_ref().take(QUEUED_BATCHES_PER_WORKER * workers) {
            pool.dispatch(batch)?;
        }
        debug!(queued = pool.outstanding.len(), "initial batches queued");

        let task_rx = Arc::new(Mutex::new(task_rx));
        for worker_id in 0..workers {
            let worker = Worker {
                worker_id,
                options: self.options.clone(),
                distributions: self.distributions.clone(),
                tasks: task_rx.clone(),
                reports: report_tx.clone(),
                errors: error_tx.clone(),
                cancel: pool.cancel.clone(),
            };
            match worker.spawn() {
                Ok(handle) => pool.handles.push(handle),
                Err(err) => {
                    pool.abort();
                    self.state = CoordinatorState::Terminated;
                    return Err(err.into());
                }
            }
        }
        drop(report_tx);
        drop(error_tx);

        let aggregators = self.options.aggregators.len();
        let drive = pool.drive(&mut self.state, aggregators, &mut batches, &mut progress);
        let tally = match drive.await {
            Ok(tally) => tally,
            Err(err) => {
                pool.abort();
                self.state = CoordinatorState::Terminated;
                return Err(err);
            }
        };
        let joined = pool.join();
        self.state = CoordinatorState::Terminated;
        joined?;

        let results = self.reduce(tally);
        progress.done();
        debug!(duration_ms = started.elapsed().as_millis() as u64, "run complete");
        results
    }

    /// Fold every aggregator's batch results on the coordinator's copy.
    fn reduce(&mut self, tally: BatchTally) -> Result<AggregateResults, GenerationError> {
        let total = self.options.aggregators.len();
        let mut names = Vec::with_capacity(total);
        let mut values = Vec::with_capacity(total);
        for (index, (aggregator, results)) in self
            .options
            .aggregators
            .iter_mut()
            .zip(tally.per_aggregator)
            .enumerate()
        {
            debug!(
                aggregator = aggregator.name(),
                batches = results.len(),
                "reduction {} of {total}",
                index + 1
            );
            names.push(aggregator.name().to_string());
            values.push(aggregator.reduce_list(results)?);
        }
        Ok(AggregateResults::new(names, values))
    }
}

/// Batch results collected per aggregator, in arrival order.
struct BatchTally {
    per_aggregator: Vec<Vec<AggregateValue>>,
}

impl BatchTally {
    fn new(aggregators: usize) -> Self {
        Self {
            per_aggregator: (0..aggregators).map(|_| Vec::new()).collect(),
        }
    }

    fn record(&mut self, results: Vec<AggregateValue>) -> Result<(), GenerationError> {
        if results.len() != self.per_aggregator.len() {
            return Err(GenerationError::Protocol(format!(
                "expected {} batch results, got {}",
                self.per_aggregator.len(),
                results.len()
            )));
        }
        for (slot, value) in self.per_aggregator.iter_mut().zip(results) {
            slot.push(value);
        }
        Ok(())
    }
}

/// Channels and threads of a running pool.
struct Pool {
    tasks: Option<UnboundedSender<Task>>,
    reports: UnboundedReceiver<WorkerReport>,
    errors: UnboundedReceiver<WorkerException>,
    handles: Vec<JoinHandle<WorkerExit>>,
    cancel: Arc<AtomicBool>,
    /// Dispatched batches not yet reported back, with their row counts.
    outstanding: HashMap<BatchId, usize>,
}

impl Pool {
    fn send(&self, task: Task) -> Result<(), GenerationError> {
        self.tasks
            .as_ref()
            .ok_or_else(|| GenerationError::Protocol("task channel already closed".to_string()))?
            .send(task)
            .map_err(|_| GenerationError::Protocol("every worker has exited".to_string()))
    }

    fn dispatch(&mut self, batch: Batch) -> Result<(), GenerationError> {
        self.outstanding.insert(batch.id, batch.len());
        self.send(Task::Batch(batch))
    }

    async fn drive<I>(
        &mut self,
        state: &mut CoordinatorState,
        aggregators: usize,
        batches: &mut Batches<I>,
        progress: &mut ProgressReporter,
    ) -> Result<BatchTally, GenerationError>
    where
        I: Iterator<Item = RowSpec>,
    {
        let workers = self.handles.len();
        let mut tally = BatchTally::new(aggregators);

        *state = CoordinatorState::Running;
        while !self.outstanding.is_empty() {
            tokio::select! {
                biased;
                Some(exception) = self.errors.recv() => return Err(failure(exception)),
                polled = tokio::time::timeout(RESULT_POLL, self.reports.recv()) => match polled {
                    Err(_) => self.check_workers(&BTreeSet::new())?,
                    Ok(Some(WorkerReport::Generated { id, worker_id, results })) => {
                        let rows = self.outstanding.remove(&id).ok_or_else(|| {
                            GenerationError::Protocol(format!(
                                "unexpected batch {id} from worker {worker_id}"
                            ))
                        })?;
                        debug!(batch = %id, worker = worker_id, rows, "batch generated");
                        tally.record(results)?;
                        progress.add(rows as u64);
                        if let Some(batch) = batches.next() {
                            self.dispatch(batch)?;
                        }
                    }
                    Ok(Some(WorkerReport::Dying { worker_id })) => {
                        return Err(GenerationError::Protocol(format!(
                            "worker {worker_id} exited while batches were outstanding"
                        )));
                    }
                    Ok(None) => {
                        return Err(GenerationError::Protocol(
                            "result channel closed while batches were outstanding".to_string(),
                        ));
                    }
                }
            }
        }

        *state = CoordinatorState::Draining;
        for _ in 0..workers {
            self.send(Task::Done)?;
        }
        let mut dying = BTreeSet::new();
        while dying.len() < workers {
            tokio::select! {
                biased;
                Some(exception) = self.errors.recv() => return Err(failure(exception)),
                polled = tokio::time::timeout(DRAIN_POLL, self.reports.recv()) => match polled {
                    Err(_) => {
                        info!(finished = dying.len(), workers, "still waiting for workers to finish");
                        self.check_workers(&dying)?;
                    }
                    Ok(Some(WorkerReport::Dying { worker_id })) => {
                        debug!(worker = worker_id, "worker done");
                        dying.insert(worker_id);
                    }
                    Ok(Some(WorkerReport::Generated { id, worker_id, .. })) => {
                        return Err(GenerationError::Protocol(format!(
                            "unexpected batch {id} from worker {worker_id} while draining"
                        )));
                    }
                    Ok(None) => {
                        return Err(GenerationError::Protocol(
                            "result channel closed before every worker finished".to_string(),
                        ));
                    }
                }
            }
        }
        Ok(tally)
    }

    /// A worker thread that ended without reporting `Dying` or an exception
    /// would leave the coordinator waiting forever.
    fn check_workers(&mut self, dying: &BTreeSet<usize>) -> Result<(), GenerationError> {
        let stopped: Vec<usize> = self
            .handles
            .iter()
            .enumerate()
            .filter(|(worker_id, handle)| handle.is_finished() && !dying.contains(worker_id))
            .map(|(worker_id, _)| worker_id)
            .collect();
        // A stopped worker has already queued everything it will ever send.
        if let Ok(exception) = self.errors.try_recv() {
            return Err(failure(exception));
        }
        match stopped.first() {
            Some(worker_id) if self.reports.is_empty() => Err(GenerationError::Protocol(
                format!("worker {worker_id} stopped without reporting"),
            )),
            _ => Ok(()),
        }
    }

    /// Close the task channel and wait for every worker thread.
    fn join(&mut self) -> Result<(), GenerationError> {
        self.tasks = None;
        let mut outcome = Ok(());
        for (worker_id, handle) in self.handles.drain(..).enumerate() {
            match handle.join() {
                Ok(WorkerExit::Finished) => {}
                Ok(exit) => {
                    warn!(worker = worker_id, ?exit, "worker ended abnormally");
                    if outcome.is_ok() {
                        outcome = Err(GenerationError::Protocol(format!(
                            "worker {worker_id} ended with {exit:?}"
                        )));
                    }
                }
                Err(_) => {
                    warn!(worker = worker_id, "worker thread panicked");
                    if outcome.is_ok() {
                        outcome = Err(GenerationError::Protocol(format!(
                            "worker {worker_id} thread panicked"
                        )));
                    }
                }
            }
        }
        outcome
    }

    /// Stop every worker and throw away whatever is still in flight.
    fn abort(&mut self) {
        warn!(
            outstanding = self.outstanding.len(),
            workers = self.handles.len(),
            "aborting generation"
        );
        self.cancel.store(true, Ordering::Relaxed);
        self.tasks = None;
        while self.reports.try_recv().is_ok() {}
        while let Ok(exception) = self.errors.try_recv() {
            debug!(
                worker = exception.worker_id,
                message = %exception.info.message,
                "discarding failure reported during abort"
            );
        }
        for handle in self.handles.drain(..) {
            let _ = handle.join();
        }
        self.outstanding.clear();
    }
}

fn failure(exception: WorkerException) -> GenerationError {
    error!(
        worker = exception.worker_id,
        kind = %exception.info.kind,
        message = %exception.info.message,
        "worker reported a failure"
    );
    GenerationError::WorkerFailure(WorkerFailure::new(exception.worker_id, exception.info))
}
