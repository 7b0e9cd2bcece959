//! Classification and reporting of failed fetch-and-execute attempts.
//!
//! Domain failures print their message and, when they wrap a cause, the
//! cause message plus a note saying where its detail was logged. Anything
//! else is framed as an unexpected exception and logged the same way.

use std::future::Future;
use std::sync::Arc;

use chrono::Utc;
use queue_core::{ExecutionFailure, FailureCause};
use storage::Storage;

use crate::output::OperatorOutput;

/// Headline used for failures that are not job-queue conditions.
pub const UNEXPECTED_HEADLINE: &str = "Unexpected exception during job execution";

/// Context attached to every logged failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureContext {
    pub queue_name: String,
}

impl FailureContext {
    pub fn new(queue_name: impl Into<String>) -> Self {
        Self {
            queue_name: queue_name.into(),
        }
    }

    /// Structured form, `{"queueName": <name>}`.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({ "queueName": self.queue_name })
    }
}

/// Durable failure log. Implementations swallow their own errors.
pub trait FailureLog: Send + Sync {
    fn log_failure(
        &self,
        failure: &FailureCause,
        context: &FailureContext,
    ) -> impl Future<Output = ()> + Send;
}

impl<L: FailureLog> FailureLog for Arc<L> {
    fn log_failure(
        &self,
        failure: &FailureCause,
        context: &FailureContext,
    ) -> impl Future<Output = ()> + Send {
        (**self).log_failure(failure, context)
    }
}

/// Logs failures as tracing events only.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingFailureLog;

impl FailureLog for TracingFailureLog {
    async fn log_failure(&self, failure: &FailureCause, context: &FailureContext) {
        tracing::error!(
            queue_name = %context.queue_name,
            reference_code = failure.reference_code.as_ref().map(|c| c.as_str()),
            "{}",
            failure.message
        );
    }
}

/// Logs failures as tracing events and stores a text dump per reference code.
#[derive(Clone)]
pub struct StorageFailureLog {
    storage: Storage,
}

impl StorageFailureLog {
    pub fn new(storage: Storage) -> Self {
        Self { storage }
    }

    fn dump(failure: &FailureCause, context: &FailureContext) -> String {
        let reference = failure
            .reference_code
            .as_ref()
            .map_or("-", |c| c.as_str());
        format!(
            "Reference: {reference}\nLogged at: {}\nQueue: {}\nContext: {}\n\n{}\n",
            Utc::now().to_rfc3339(),
            context.queue_name,
            context.to_json(),
            failure.message
        )
    }
}

impl FailureLog for StorageFailureLog {
    async fn log_failure(&self, failure: &FailureCause, context: &FailureContext) {
        TracingFailureLog.log_failure(failure, context).await;

        let Some(code) = &failure.reference_code else {
            return;
        };
        let key = code.file_name();
        if let Err(e) = self
            .storage
            .put_text(&key, &Self::dump(failure, context))
            .await
        {
            tracing::warn!(
                reference_code = code.as_str(),
                backend = self.storage.kind_str(),
                "Could not store exception detail: {}",
                e
            );
        }
    }
}

/// Turns an [`ExecutionFailure`] into operator lines and a log entry.
pub struct FailureReporter<L, O> {
    log: L,
    output: O,
}

impl<L: FailureLog, O: OperatorOutput> FailureReporter<L, O> {
    pub fn new(log: L, output: O) -> Self {
        Self { log, output }
    }

    pub fn output(&self) -> &O {
        &self.output
    }

    pub async fn report(&self, failure: &ExecutionFailure, queue_name: &str) {
        let context = FailureContext::new(queue_name);

        match failure {
            ExecutionFailure::Domain { message, cause } => {
                self.output.error(message);
                if let Some(cause) = cause {
                    self.output.plain(&cause.message);
                    self.report_logged(cause, &context).await;
                }
            }
            ExecutionFailure::Unexpected {
                message,
                reference_code,
            } => {
                self.output
                    .error(&format!("{UNEXPECTED_HEADLINE}: {message}"));
                let logged = FailureCause {
                    message: message.clone(),
                    reference_code: reference_code.clone(),
                };
                self.report_logged(&logged, &context).await;
            }
        }
    }

    async fn report_logged(&self, failure: &FailureCause, context: &FailureContext) {
        self.log.log_failure(failure, context).await;

        let note = match &failure.reference_code {
            Some(code) => format!("Exception logged as {}", code.file_name()),
            None => "Exception logged".to_string(),
        };
        self.output.emphasis(&note);
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::output::{BufferedOutput, Style};
    use queue_core::{JobQueueError, ReferenceCode};
    use std::sync::Mutex;

    /// Failure log that remembers what it was given.
    #[derive(Clone, Default)]
    pub(crate) struct RecordingLog {
        entries: Arc<Mutex<Vec<(FailureCause, FailureContext)>>>,
    }

    impl RecordingLog {
        pub(crate) fn entries(&self) -> Vec<(FailureCause, FailureContext)> {
            self.entries.lock().unwrap().clone()
        }
    }

    impl FailureLog for RecordingLog {
        async fn log_failure(&self, failure: &FailureCause, context: &FailureContext) {
            self.entries
                .lock()
                .unwrap()
                .push((failure.clone(), context.clone()));
        }
    }

    fn reporter() -> (FailureReporter<RecordingLog, BufferedOutput>, RecordingLog, BufferedOutput) {
        let log = RecordingLog::default();
        let output = BufferedOutput::new();
        (
            FailureReporter::new(log.clone(), output.clone()),
            log,
            output,
        )
    }

    #[tokio::test]
    async fn domain_failure_with_cause_names_reference_file() {
        let (reporter, log, output) = reporter();
        let failure = ExecutionFailure::domain_with_cause(
            "Could not fetch a job from queue mail",
            FailureCause::new("connection refused").with_reference_code(ReferenceCode::new("R123")),
        );

        reporter.report(&failure, "mail").await;

        assert_eq!(
            output.lines(),
            vec![
                (Style::Error, "Could not fetch a job from queue mail".to_string()),
                (Style::Plain, "connection refused".to_string()),
                (Style::Emphasis, "Exception logged as R123.txt".to_string()),
            ]
        );
        let entries = log.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].0.message, "connection refused");
        assert_eq!(entries[0].1.to_json(), serde_json::json!({ "queueName": "mail" }));
    }

    #[tokio::test]
    async fn domain_failure_with_unreferenced_cause_uses_plain_note() {
        let (reporter, log, output) = reporter();
        let failure =
            ExecutionFailure::domain_with_cause("Job welcome failed", FailureCause::new("smtp down"));

        reporter.report(&failure, "mail").await;

        assert_eq!(
            output.texts(),
            vec!["Job welcome failed", "smtp down", "Exception logged"]
        );
        assert_eq!(log.entries().len(), 1);
    }

    #[tokio::test]
    async fn domain_failure_without_cause_prints_only_message() {
        let (reporter, log, output) = reporter();
        let failure: ExecutionFailure = JobQueueError::NoHandler("resize".into()).into();

        reporter.report(&failure, "images").await;

        assert_eq!(
            output.lines(),
            vec![(
                Style::Error,
                "No handler registered for job type resize".to_string()
            )]
        );
        assert!(log.entries().is_empty());
    }

    #[tokio::test]
    async fn unexpected_failure_uses_generic_headline() {
        let (reporter, log, output) = reporter();
        let failure = ExecutionFailure::Unexpected {
            message: "index out of bounds".into(),
            reference_code: Some(ReferenceCode::new("R9")),
        };

        reporter.report(&failure, "q").await;

        assert_eq!(
            output.lines(),
            vec![
                (
                    Style::Error,
                    "Unexpected exception during job execution: index out of bounds".to_string()
                ),
                (Style::Emphasis, "Exception logged as R9.txt".to_string()),
            ]
        );
        let entries = log.entries();
        assert_eq!(entries[0].0.message, "index out of bounds");
        assert_eq!(entries[0].1.queue_name, "q");
    }

    #[tokio::test]
    async fn unexpected_failure_without_code_still_notes_logging() {
        let (reporter, _log, output) = reporter();
        let failure = ExecutionFailure::Unexpected {
            message: "boom".into(),
            reference_code: None,
        };

        reporter.report(&failure, "q").await;

        assert_eq!(output.texts().last().map(String::as_str), Some("Exception logged"));
    }

    #[tokio::test]
    async fn storage_log_writes_reference_file() {
        let storage = Storage::new(storage::StorageConfig::memory()).await.unwrap();
        let log = StorageFailureLog::new(storage.clone());
        let cause = FailureCause::new("disk full").with_reference_code(ReferenceCode::new("R42"));

        log.log_failure(&cause, &FailureContext::new("backups")).await;

        let dump = storage.get_text("R42.txt").await.unwrap();
        assert!(dump.starts_with("Reference: R42\n"));
        assert!(dump.contains("Queue: backups"));
        assert!(dump.contains(r#""queueName":"backups""#));
        assert!(dump.trim_end().ends_with("disk full"));
    }

    #[tokio::test]
    async fn storage_log_skips_dump_without_reference() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::new(storage::StorageConfig::filesystem(dir.path()))
            .await
            .unwrap();
        let log = StorageFailureLog::new(storage);

        log.log_failure(&FailureCause::new("oops"), &FailureContext::new("q"))
            .await;

        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
