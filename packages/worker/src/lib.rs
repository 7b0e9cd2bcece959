//! Job queue worker.
//!
//! - [`WorkerLoop`] keeps executing jobs from one queue and survives every
//!   job-level or unexpected failure
//! - [`FailureReporter`] turns failures into operator lines and log entries
//! - [`QueueReporter`] lists the head of a backlog with omitted and total
//!   counts
//! - [`JobManager`] is the bundled [`QueueEngine`], backed by the `db` crate
//!
//! # Usage
//!
//! ```ignore
//! use worker::{ConsoleOutput, FailureReporter, JobManager, TracingFailureLog, WorkerLoop};
//!
//! let manager = JobManager::new(handlers);
//! let reporter = FailureReporter::new(TracingFailureLog, ConsoleOutput::new());
//! let summary = WorkerLoop::new(manager, reporter).run("mail", shutdown).await;
//! ```

mod config;
mod engine;
mod failure;
mod handler;
mod output;
mod reporter;
mod worker_loop;

#[cfg(test)]
mod testing;

pub use config::{ConfigError, DEFAULT_POLL_INTERVAL, WorkerConfig, default_worker_id};
pub use engine::{EngineError, JobManager, JobOutcome, NewJob, QueueEngine};
pub use failure::{
    FailureContext, FailureLog, FailureReporter, StorageFailureLog, TracingFailureLog,
    UNEXPECTED_HEADLINE,
};
pub use handler::{FnHandler, HandlerFuture, HandlerResult, JobHandler, JobHandlerRegistry};
pub use output::{BufferedOutput, ConsoleOutput, OperatorOutput, Style};
pub use reporter::{DEFAULT_LIST_LIMIT, ListReport, QueueReporter};
pub use worker_loop::{WorkerLoop, WorkerSummary};

pub use queue_core::Job;
pub use tokio_util::sync::CancellationToken;
