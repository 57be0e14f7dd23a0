use std::any::Any;
use std::backtrace::Backtrace;
use std::fmt;

use thiserror::Error;

/// Errors emitted by the generation engine and the worker pool.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error(transparent)]
    Core(#[from] rowforge_core::Error),
    /// A worker (or the calling thread in single-worker mode) failed while
    /// generating or aggregating. Always fatal to the run.
    #[error("{0}")]
    WorkerFailure(WorkerFailure),
    /// The run was aborted while this worker was still busy.
    #[error("generation cancelled")]
    Cancelled,
    /// A message arrived that the coordinator did not expect in its state.
    #[error("worker protocol violation: {0}")]
    Protocol(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl GenerationError {
    /// Core error behind this failure, looking through worker failures.
    pub fn core_cause(&self) -> Option<&rowforge_core::Error> {
        match self {
            GenerationError::Core(err) => Some(err),
            GenerationError::WorkerFailure(failure) => failure.cause(),
            _ => None,
        }
    }
}

/// Reconstructed description of a failure that happened on a worker.
#[derive(Debug, Clone)]
pub struct WorkerFailure {
    pub worker_id: usize,
    pub info: ErrorInfo,
}

impl WorkerFailure {
    pub fn new(worker_id: usize, info: ErrorInfo) -> Self {
        Self { worker_id, info }
    }

    pub fn cause(&self) -> Option<&rowforge_core::Error> {
        self.info.cause.as_ref()
    }
}

impl fmt::Display for WorkerFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "worker {} failed ({}): {}",
            self.worker_id, self.info.kind, self.info.message
        )
    }
}

/// Everything needed to report a worker failure on another thread. The
/// backtrace is captured as text where the failure was caught.
#[derive(Debug, Clone)]
pub struct ErrorInfo {
    pub kind: String,
    pub message: String,
    pub backtrace: String,
    pub cause: Option<rowforge_core::Error>,
}

impl ErrorInfo {
    pub fn from_error(err: &GenerationError) -> Self {
        let (kind, cause) = match err {
            GenerationError::Core(core) => (core.kind().to_string(), Some(core.clone())),
            GenerationError::WorkerFailure(failure) => {
                (failure.info.kind.clone(), failure.info.cause.clone())
            }
            GenerationError::Cancelled => ("cancelled".to_string(), None),
            GenerationError::Protocol(_) => ("protocol".to_string(), None),
            GenerationError::Io(_) => ("io".to_string(), None),
            GenerationError::Csv(_) => ("csv".to_string(), None),
            GenerationError::Json(_) => ("json".to_string(), None),
        };
        Self {
            kind,
            message: err.to_string(),
            backtrace: Backtrace::force_capture().to_string(),
            cause,
        }
    }

    pub fn from_panic(panic: Box<dyn Any + Send>) -> Self {
        Self {
            kind: "panic".to_string(),
            message: panic_message(panic),
            backtrace: Backtrace::force_capture().to_string(),
            cause: None,
        }
    }
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "panic during generation".to_string()
    }
}
