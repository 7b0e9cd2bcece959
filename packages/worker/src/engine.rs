//! Queue engine contract and the bundled SurrealDB-backed engine.

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use db::DbError;
use db::repositories::{JobRepository, QueueRepository};
use futures_util::FutureExt;
use queue_core::{ExecutionFailure, Job, JobId, JobQueueError, Priority};
use thiserror::Error;
use tokio_util::task::TaskTracker;

use crate::config::{DEFAULT_POLL_INTERVAL, default_worker_id};
use crate::handler::JobHandlerRegistry;

/// Errors from non-executing engine calls (peek, count, enqueue).
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Db(#[from] DbError),
    #[error(transparent)]
    Queue(#[from] JobQueueError),
}

/// A job that ran to completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobOutcome {
    pub job_id: JobId,
    pub label: String,
    pub summary: String,
    pub attempts: u32,
}

/// What the worker loop and the reporter need from a queue.
pub trait QueueEngine: Send + Sync {
    /// Wait until a job is available on `queue`, execute it and report how
    /// it went. Never returns an empty result.
    fn wait_and_execute(
        &self,
        queue: &str,
    ) -> impl Future<Output = Result<JobOutcome, ExecutionFailure>> + Send;

    /// Up to `limit` pending jobs in delivery order. Does not dequeue.
    fn peek(
        &self,
        queue: &str,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<Job>, EngineError>> + Send;

    /// Number of pending jobs.
    fn count(&self, queue: &str) -> impl Future<Output = Result<u64, EngineError>> + Send;
}

/// Parameters for a job to enqueue.
#[derive(Debug, Clone)]
pub struct NewJob {
    pub job_type: String,
    pub payload: serde_json::Value,
    pub label: Option<String>,
    pub priority: Priority,
    /// Overrides the queue default when set.
    pub max_retries: Option<u32>,
    /// Overrides the queue default when set.
    pub timeout_secs: Option<u64>,
}

impl NewJob {
    pub fn new(job_type: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            job_type: job_type.into(),
            payload,
            label: None,
            priority: Priority::default(),
            max_retries: None,
            timeout_secs: None,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = Some(timeout_secs);
        self
    }
}

/// Queue engine over the `db` repositories and a handler registry.
///
/// Jobs are claimed with a conditional update so several managers may work
/// the same queue. Handlers run under the job timeout; a panicking handler
/// fails its job without affecting the caller.
///
/// Each claim attempt, together with the execution and bookkeeping of the
/// job it claims, runs as one tracked task. Dropping a `wait_and_execute`
/// future therefore only abandons the idle wait between attempts, never a
/// claimed job. Call [`JobManager::drain`] before shutting the runtime down.
#[derive(Clone)]
pub struct JobManager {
    handlers: Arc<JobHandlerRegistry>,
    worker_id: String,
    poll_interval: Duration,
    in_flight: TaskTracker,
}

impl JobManager {
    pub fn new(handlers: JobHandlerRegistry) -> Self {
        Self {
            handlers: Arc::new(handlers),
            worker_id: default_worker_id(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            in_flight: TaskTracker::new(),
        }
    }

    pub fn with_worker_id(mut self, worker_id: impl Into<String>) -> Self {
        self.worker_id = worker_id.into();
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    pub fn handlers(&self) -> &JobHandlerRegistry {
        &self.handlers
    }

    /// Wait for claim attempts and claimed jobs of this manager to finish.
    pub async fn drain(&self) {
        self.in_flight.close();
        if !self.in_flight.is_empty() {
            tracing::info!("Waiting for {} in-flight job(s)", self.in_flight.len());
        }
        self.in_flight.wait().await;
    }

    /// Enqueue a job, creating the queue on first use.
    ///
    /// Retry and timeout settings not given on `new_job` come from the
    /// queue's defaults.
    pub async fn queue(&self, queue_name: &str, new_job: NewJob) -> Result<Job, EngineError> {
        let queue = QueueRepository::ensure(queue_name).await?;
        let mut job = Job::new(queue_name, new_job.job_type, new_job.payload)
            .with_priority(new_job.priority)
            .with_max_retries(
                new_job
                    .max_retries
                    .unwrap_or(queue.config.default_max_retries),
            )
            .with_timeout(
                new_job
                    .timeout_secs
                    .unwrap_or(queue.config.default_timeout_secs),
            );
        if let Some(label) = new_job.label {
            job = job.with_label(label);
        }

        let job = JobRepository::create(&job).await?;
        tracing::info!(
            queue = queue_name,
            job_id = %job.id,
            job_type = %job.job_type,
            "Queued job {}",
            job.label()
        );
        Ok(job)
    }

    /// Claim and run the next job of `queue`. `None` when the backlog is
    /// empty.
    async fn attempt(self, queue: String) -> Option<Result<JobOutcome, ExecutionFailure>> {
        match JobRepository::claim_next(&queue, &self.worker_id).await {
            Ok(Some(job)) => {
                tracing::debug!(
                    job_id = %job.id,
                    attempt = job.attempts,
                    "Claimed job {}",
                    job.label()
                );
                Some(self.execute(job).await)
            }
            Ok(None) => None,
            Err(DbError::Malformed { id, reason }) => {
                Some(Err(JobQueueError::MalformedJob { id, reason }.into()))
            }
            Err(e) => Some(Err(JobQueueError::Fetch {
                queue,
                cause: Box::new(e),
            }
            .into())),
        }
    }

    async fn execute(&self, job: Job) -> Result<JobOutcome, ExecutionFailure> {
        let label = job.label();

        let handler = match self.handlers.resolve(&job) {
            Ok(handler) => handler,
            Err(err) => {
                self.fail_and_archive(&job, &err.to_string()).await;
                return Err(err.into());
            }
        };

        let timeout = Duration::from_secs(job.timeout_secs);
        let run = tokio::time::timeout(timeout, async { handler.handle(&job).await });

        match AssertUnwindSafe(run).catch_unwind().await {
            Ok(Ok(Ok(summary))) => self.complete(&job, label, summary).await,
            Ok(Ok(Err(reason))) => Err(self.record_failure(&job, label, reason).await),
            Ok(Err(_elapsed)) => {
                let reason = JobQueueError::Timeout {
                    label: label.clone(),
                    secs: job.timeout_secs,
                }
                .to_string();
                Err(self.record_failure(&job, label, reason).await)
            }
            Err(payload) => {
                let message = panic_message(payload);
                tracing::error!(job_id = %job.id, "Handler panicked: {}", message);
                self.fail_and_archive(&job, &format!("panicked: {message}"))
                    .await;
                Err(ExecutionFailure::unexpected(format!(
                    "Job {label} panicked: {message}"
                )))
            }
        }
    }

    async fn complete(
        &self,
        job: &Job,
        label: String,
        summary: String,
    ) -> Result<JobOutcome, ExecutionFailure> {
        let done = JobRepository::complete(job.id, &summary)
            .await
            .map_err(|e| {
                ExecutionFailure::unexpected(format!(
                    "Could not record completion of job {label}: {e}"
                ))
            })?;

        if let Err(e) = JobRepository::archive(&done).await {
            tracing::warn!(job_id = %job.id, "Could not archive completed job: {}", e);
        }

        Ok(JobOutcome {
            job_id: done.id,
            label,
            summary,
            attempts: done.attempts,
        })
    }

    /// Hand the job back for another attempt, or fail it for good once its
    /// retries are used up.
    async fn record_failure(&self, job: &Job, label: String, reason: String) -> ExecutionFailure {
        if job.can_retry() {
            tracing::debug!(
                job_id = %job.id,
                attempt = job.attempts,
                max_retries = job.max_retries,
                "Releasing job for retry"
            );
            if let Err(e) = JobRepository::release(job.id, &reason).await {
                tracing::warn!(job_id = %job.id, "Could not release job: {}", e);
            }
        } else {
            self.fail_and_archive(job, &reason).await;
        }

        JobQueueError::JobFailed { label, reason }.into_failure()
    }

    async fn fail_and_archive(&self, job: &Job, reason: &str) {
        match JobRepository::fail(job.id, reason).await {
            Ok(failed) => {
                if let Err(e) = JobRepository::archive(&failed).await {
                    tracing::warn!(job_id = %job.id, "Could not archive failed job: {}", e);
                }
            }
            Err(e) => tracing::warn!(job_id = %job.id, "Could not mark job failed: {}", e),
        }
    }
}

impl QueueEngine for JobManager {
    async fn wait_and_execute(&self, queue: &str) -> Result<JobOutcome, ExecutionFailure> {
        loop {
            let attempt = self
                .in_flight
                .spawn(self.clone().attempt(queue.to_string()));

            match attempt.await {
                Ok(Some(result)) => return result,
                Ok(None) => tokio::time::sleep(self.poll_interval).await,
                Err(join_error) => {
                    let reason = if join_error.is_panic() {
                        panic_message(join_error.into_panic())
                    } else {
                        "cancelled".to_string()
                    };
                    return Err(ExecutionFailure::unexpected(format!(
                        "Work on queue {queue} was interrupted: {reason}"
                    )));
                }
            }
        }
    }

    async fn peek(&self, queue: &str, limit: usize) -> Result<Vec<Job>, EngineError> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        Ok(JobRepository::peek_pending(queue, limit).await?)
    }

    async fn count(&self, queue: &str) -> Result<u64, EngineError> {
        Ok(JobRepository::count_pending(queue).await?)
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
