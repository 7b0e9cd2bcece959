//! Domain error kinds raised by the job queue subsystem.

use thiserror::Error;

use crate::failure::{ExecutionFailure, FailureCause};

/// Boxed error used for causes coming from other layers (database, I/O).
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors that are meaningful to the job queue, as opposed to arbitrary
/// failures of the environment.
#[derive(Debug, Error)]
pub enum JobQueueError {
    #[error("Could not fetch a job from queue {queue}")]
    Fetch {
        queue: String,
        #[source]
        cause: BoxError,
    },

    #[error("No handler registered for job type {0}")]
    NoHandler(String),

    #[error("Job {label} failed")]
    JobFailed { label: String, reason: String },

    #[error("Job {label} timed out after {secs}s")]
    Timeout { label: String, secs: u64 },

    #[error("Malformed job {id}: {reason}")]
    MalformedJob { id: String, reason: String },
}

impl JobQueueError {
    /// Convert into the tagged failure handed to the worker loop.
    ///
    /// Wrapped causes get a fresh reference code so their logged detail can
    /// be found again.
    pub fn into_failure(self) -> ExecutionFailure {
        let message = self.to_string();
        let cause = match self {
            JobQueueError::Fetch { cause, .. } => Some(FailureCause::logged(cause.to_string())),
            JobQueueError::JobFailed { reason, .. } => Some(FailureCause::logged(reason)),
            JobQueueError::NoHandler(_)
            | JobQueueError::Timeout { .. }
            | JobQueueError::MalformedJob { .. } => None,
        };
        ExecutionFailure::Domain { message, cause }
    }
}

impl From<JobQueueError> for ExecutionFailure {
    fn from(err: JobQueueError) -> Self {
        err.into_failure()
    }
}
