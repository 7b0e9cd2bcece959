//! Read-only listing of a queue's backlog.

use crate::engine::{EngineError, QueueEngine};
use crate::output::OperatorOutput;

/// Number of jobs listed when no limit is given.
pub const DEFAULT_LIST_LIMIT: usize = 1;

/// What a listing showed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListReport {
    pub labels: Vec<String>,
    /// Pending jobs not listed. Never negative, even if the backlog changed
    /// between peek and count.
    pub omitted: u64,
    pub total: u64,
}

/// Lists the head of a queue followed by omitted and total counts.
pub struct QueueReporter<'a, E, O> {
    engine: &'a E,
    output: &'a O,
}

impl<'a, E: QueueEngine, O: OperatorOutput> QueueReporter<'a, E, O> {
    pub fn new(engine: &'a E, output: &'a O) -> Self {
        Self { engine, output }
    }

    pub async fn list(&self, queue_name: &str, limit: usize) -> Result<ListReport, EngineError> {
        let jobs = self.engine.peek(queue_name, limit).await?;
        let total = self.engine.count(queue_name).await?;

        let labels: Vec<String> = jobs.iter().map(|job| job.label()).collect();
        let omitted = total.saturating_sub(labels.len() as u64);

        for label in &labels {
            self.output.plain(label);
        }
        if omitted > 0 {
            self.output.plain(&format!("({omitted} omitted) ..."));
        }
        self.output.plain(&format!("({total} total)"));

        tracing::debug!(
            queue = queue_name,
            limit,
            listed = labels.len(),
            total,
            "Listed queue"
        );

        Ok(ListReport {
            labels,
            omitted,
            total,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::{BufferedOutput, Style};
    use crate::testing::ScriptedEngine;
    use queue_core::{Job, JobQueueError};
    use serde_json::Value;

    fn backlog(labels: &[&str]) -> Vec<Job> {
        labels
            .iter()
            .map(|label| Job::new("Q", "echo", Value::Null).with_label(*label))
            .collect()
    }

    fn engine() -> ScriptedEngine {
        ScriptedEngine::new(Vec::new()).with_backlog(backlog(&["A", "B", "C", "D", "E"]))
    }

    #[tokio::test]
    async fn lists_head_and_omitted_count() {
        let engine = engine();
        let output = BufferedOutput::new();

        let report = QueueReporter::new(&engine, &output).list("Q", 3).await.unwrap();

        assert_eq!(
            output.texts(),
            vec!["A", "B", "C", "(2 omitted) ...", "(5 total)"]
        );
        assert!(output.lines().iter().all(|(style, _)| *style == Style::Plain));
        assert_eq!(report.omitted, 2);
        assert_eq!(report.total, 5);
    }

    #[tokio::test]
    async fn limit_beyond_backlog_lists_everything() {
        let engine = engine();
        let output = BufferedOutput::new();

        let report = QueueReporter::new(&engine, &output).list("Q", 10).await.unwrap();

        assert_eq!(
            output.texts(),
            vec!["A", "B", "C", "D", "E", "(5 total)"]
        );
        assert_eq!(report.omitted, 0);
    }

    #[tokio::test]
    async fn default_limit_and_zero_limit() {
        let engine = engine();
        let output = BufferedOutput::new();
        let reporter = QueueReporter::new(&engine, &output);

        reporter.list("Q", DEFAULT_LIST_LIMIT).await.unwrap();
        assert_eq!(output.texts(), vec!["A", "(4 omitted) ...", "(5 total)"]);

        output.clear();
        let report = reporter.list("Q", 0).await.unwrap();
        assert!(report.labels.is_empty());
        assert_eq!(output.texts(), vec!["(5 omitted) ...", "(5 total)"]);
    }

    #[tokio::test]
    async fn empty_queue_only_prints_total() {
        let engine = ScriptedEngine::new(Vec::new());
        let output = BufferedOutput::new();

        QueueReporter::new(&engine, &output).list("Q", 1).await.unwrap();

        assert_eq!(output.texts(), vec!["(0 total)"]);
    }

    #[tokio::test]
    async fn omitted_is_clamped_when_count_lags() {
        let engine = engine().with_count_override(2);
        let output = BufferedOutput::new();

        let report = QueueReporter::new(&engine, &output).list("Q", 3).await.unwrap();

        assert_eq!(report.omitted, 0);
        assert_eq!(output.texts(), vec!["A", "B", "C", "(2 total)"]);
    }

    #[tokio::test]
    async fn listing_is_idempotent() {
        let engine = engine();
        let first = BufferedOutput::new();
        let second = BufferedOutput::new();

        QueueReporter::new(&engine, &first).list("Q", 3).await.unwrap();
        QueueReporter::new(&engine, &second).list("Q", 3).await.unwrap();

        assert_eq!(first.lines(), second.lines());
        assert_eq!(engine.backlog_len(), 5);
    }

    #[tokio::test]
    async fn engine_errors_propagate() {
        let engine = engine().with_read_error();
        let output = BufferedOutput::new();

        let err = QueueReporter::new(&engine, &output)
            .list("Q", 3)
            .await
            .unwrap_err();

        assert!(matches!(err, EngineError::Queue(JobQueueError::Fetch { .. })));
        assert!(output.lines().is_empty());
    }
}
