//! The long-running fetch, execute and report loop bound to one queue.

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::engine::QueueEngine;
use crate::failure::{FailureLog, FailureReporter};
use crate::output::OperatorOutput;

/// Counters for one run of a [`WorkerLoop`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerSummary {
    pub iterations: u64,
    pub completed: u64,
    pub failed: u64,
}

/// Keeps taking jobs from a queue until shut down.
///
/// No failure ends the loop. Every failed attempt is reported and the next
/// wait starts right away, or after `failure_backoff` when one is set.
pub struct WorkerLoop<E, L, O> {
    engine: E,
    reporter: FailureReporter<L, O>,
    failure_backoff: Duration,
}

impl<E, L, O> WorkerLoop<E, L, O>
where
    E: QueueEngine,
    L: FailureLog,
    O: OperatorOutput,
{
    pub fn new(engine: E, reporter: FailureReporter<L, O>) -> Self {
        Self {
            engine,
            reporter,
            failure_backoff: Duration::ZERO,
        }
    }

    pub fn with_failure_backoff(mut self, backoff: Duration) -> Self {
        self.failure_backoff = backoff;
        self
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// Run until `shutdown` is cancelled.
    ///
    /// Cancellation is checked before each iteration and interrupts both the
    /// wait for a job and the backoff pause.
    pub async fn run(&self, queue_name: &str, shutdown: CancellationToken) -> WorkerSummary {
        let mut summary = WorkerSummary::default();
        tracing::info!(queue = queue_name, "Worker started");

        while !shutdown.is_cancelled() {
            let result = tokio::select! {
                biased;
                () = shutdown.cancelled() => break,
                result = self.engine.wait_and_execute(queue_name) => result,
            };
            summary.iterations += 1;

            match result {
                Ok(outcome) => {
                    summary.completed += 1;
                    tracing::info!(
                        queue = queue_name,
                        job_id = %outcome.job_id,
                        attempts = outcome.attempts,
                        "Job {} completed: {}",
                        outcome.label,
                        outcome.summary
                    );
                }
                Err(failure) => {
                    summary.failed += 1;
                    tracing::warn!(
                        queue = queue_name,
                        domain = failure.is_domain(),
                        "Job execution failed: {}",
                        failure
                    );
                    self.reporter.report(&failure, queue_name).await;

                    if !self.failure_backoff.is_zero() {
                        tokio::select! {
                            () = shutdown.cancelled() => break,
                            () = tokio::time::sleep(self.failure_backoff) => {}
                        }
                    }
                }
            }
        }

        tracing::info!(
            queue = queue_name,
            iterations = summary.iterations,
            completed = summary.completed,
            failed = summary.failed,
            "Worker stopped"
        );
        summary
    }
}
