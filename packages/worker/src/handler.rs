//! Job handlers, looked up by job type.

use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use queue_core::{Job, JobQueueError};

/// A short summary on success, the failure reason otherwise.
pub type HandlerResult = Result<String, String>;

/// Boxed future returned by [`JobHandler::handle`].
pub type HandlerFuture = Pin<Box<dyn Future<Output = HandlerResult> + Send>>;

/// Executes jobs of one type.
///
/// The returned future must own what it uses; the engine polls it under the
/// job's timeout and treats a panic inside it as an unexpected failure.
pub trait JobHandler: Send + Sync + 'static {
    fn job_type(&self) -> &str;

    fn handle(&self, job: &Job) -> HandlerFuture;
}

/// Handlers known to a worker.
#[derive(Default)]
pub struct JobHandlerRegistry {
    by_type: BTreeMap<String, Arc<dyn JobHandler>>,
}

impl JobHandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A later registration for the same job type wins.
    pub fn register<H: JobHandler>(&mut self, handler: H) {
        let job_type = handler.job_type().to_string();
        if self.by_type.insert(job_type.clone(), Arc::new(handler)).is_some() {
            tracing::debug!("Replaced handler for job type '{}'", job_type);
        }
    }

    pub fn with<H: JobHandler>(mut self, handler: H) -> Self {
        self.register(handler);
        self
    }

    pub fn get(&self, job_type: &str) -> Option<Arc<dyn JobHandler>> {
        self.by_type.get(job_type).cloned()
    }

    /// The handler for `job`, or [`JobQueueError::NoHandler`].
    pub fn resolve(&self, job: &Job) -> Result<Arc<dyn JobHandler>, JobQueueError> {
        self.get(&job.job_type)
            .ok_or_else(|| JobQueueError::NoHandler(job.job_type.clone()))
    }

    /// Registered job types in name order.
    pub fn job_types(&self) -> Vec<&str> {
        self.by_type.keys().map(String::as_str).collect()
    }
}

/// Handler backed by a closure.
pub struct FnHandler<F> {
    job_type: String,
    run: F,
}

impl<F> FnHandler<F>
where
    F: Fn(&Job) -> HandlerFuture + Send + Sync + 'static,
{
    pub fn new(job_type: impl Into<String>, run: F) -> Self {
        Self {
            job_type: job_type.into(),
            run,
        }
    }
}

impl<F> JobHandler for FnHandler<F>
where
    F: Fn(&Job) -> HandlerFuture + Send + Sync + 'static,
{
    fn job_type(&self) -> &str {
        &self.job_type
    }

    fn handle(&self, job: &Job) -> HandlerFuture {
        (self.run)(job)
    }
}

/// Build an [`FnHandler`] whose body runs in an async block over an owned
/// copy of the job.
///
/// ```ignore
/// let handler = job_handler!("echo", |job| Ok(format!("echoed {}", job.payload)));
/// ```
#[macro_export]
macro_rules! job_handler {
    ($job_type:expr, |$job:ident| $body:expr) => {
        $crate::FnHandler::new($job_type, |$job: &$crate::Job| {
            let $job = $job.clone();
            ::std::boxed::Box::pin(async move { $body })
        })
    };
}
