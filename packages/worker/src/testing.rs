//! In-memory engine with scripted results, shared by unit tests.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use queue_core::{ExecutionFailure, Job, JobId, JobQueueError};
use tokio_util::sync::CancellationToken;

use crate::engine::{EngineError, JobOutcome, QueueEngine};

pub(crate) struct ScriptedEngine {
    script: Mutex<VecDeque<Result<JobOutcome, ExecutionFailure>>>,
    backlog: Vec<Job>,
    count_override: Option<u64>,
    read_error: bool,
    calls: AtomicUsize,
    /// Cancelled once the script runs dry.
    shutdown: Option<CancellationToken>,
}

impl ScriptedEngine {
    pub(crate) fn new(script: Vec<Result<JobOutcome, ExecutionFailure>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            backlog: Vec::new(),
            count_override: None,
            read_error: false,
            calls: AtomicUsize::new(0),
            shutdown: None,
        }
    }

    pub(crate) fn with_backlog(mut self, backlog: Vec<Job>) -> Self {
        self.backlog = backlog;
        self
    }

    pub(crate) fn with_count_override(mut self, count: u64) -> Self {
        self.count_override = Some(count);
        self
    }

    pub(crate) fn with_read_error(mut self) -> Self {
        self.read_error = true;
        self
    }

    pub(crate) fn cancel_when_done(mut self, token: CancellationToken) -> Self {
        self.shutdown = Some(token);
        self
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub(crate) fn backlog_len(&self) -> usize {
        self.backlog.len()
    }
}

pub(crate) fn outcome(label: &str) -> JobOutcome {
    JobOutcome {
        job_id: JobId::new(),
        label: label.to_string(),
        summary: "done".to_string(),
        attempts: 1,
    }
}

impl QueueEngine for ScriptedEngine {
    async fn wait_and_execute(&self, _queue: &str) -> Result<JobOutcome, ExecutionFailure> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let next = self.script.lock().unwrap().pop_front();
        match next {
            Some(result) => result,
            None => {
                if let Some(token) = &self.shutdown {
                    token.cancel();
                }
                std::future::pending::<Result<JobOutcome, ExecutionFailure>>().await
            }
        }
    }

    async fn peek(&self, queue: &str, limit: usize) -> Result<Vec<Job>, EngineError> {
        if self.read_error {
            return Err(unreachable_store(queue));
        }
        Ok(self.backlog.iter().take(limit).cloned().collect())
    }

    async fn count(&self, queue: &str) -> Result<u64, EngineError> {
        if self.read_error {
            return Err(unreachable_store(queue));
        }
        Ok(self
            .count_override
            .unwrap_or(self.backlog.len() as u64))
    }
}

fn unreachable_store(queue: &str) -> EngineError {
    JobQueueError::Fetch {
        queue: queue.to_string(),
        cause: "connection refused".into(),
    }
    .into()
}
