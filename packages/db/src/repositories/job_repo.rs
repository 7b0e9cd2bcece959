//! Job repository: backlog reads, claims and state transitions.

use chrono::Utc;
use queue_core::{Job, JobId, JobStatus, Priority};
use serde::{Deserialize, Serialize};

use super::{parse_stamp, stamp};
use crate::{DbError, get_db};

/// Repository for job persistence operations.
pub struct JobRepository;

/// Storage shape of a job. Status detail is flattened into optional columns.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct JobRecord {
    job_id: String,
    queue: String,
    job_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    label: Option<String>,
    payload: String,
    priority: i64,
    status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    worker_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    started_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    finished_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    attempts: u32,
    max_retries: u32,
    timeout_secs: u64,
    created_at: String,
    updated_at: String,
}

impl JobRecord {
    fn from_job(job: &Job) -> Result<Self, DbError> {
        let mut record = Self {
            job_id: job.id.to_string(),
            queue: job.queue.clone(),
            job_type: job.job_type.clone(),
            label: job.label.clone(),
            payload: serde_json::to_string(&job.payload)?,
            priority: job.priority.rank(),
            status: job.status.as_str().to_string(),
            worker_id: None,
            started_at: None,
            finished_at: None,
            summary: None,
            error: None,
            attempts: job.attempts,
            max_retries: job.max_retries,
            timeout_secs: job.timeout_secs,
            created_at: stamp(job.created_at),
            updated_at: stamp(job.updated_at),
        };

        match &job.status {
            JobStatus::Pending => {}
            JobStatus::Running {
                started_at,
                worker_id,
            } => {
                record.started_at = Some(stamp(*started_at));
                record.worker_id = Some(worker_id.clone());
            }
            JobStatus::Completed {
                started_at,
                completed_at,
                summary,
            } => {
                record.started_at = Some(stamp(*started_at));
                record.finished_at = Some(stamp(*completed_at));
                record.summary = Some(summary.clone());
            }
            JobStatus::Failed {
                failed_at, error, ..
            } => {
                record.finished_at = Some(stamp(*failed_at));
                record.error = Some(error.clone());
            }
        }

        Ok(record)
    }

    fn into_job(self) -> Result<Job, DbError> {
        let id = JobId::parse(&self.job_id)
            .map_err(|e| DbError::Serialization(format!("invalid job id {}: {e}", self.job_id)))?;
        let payload = serde_json::from_str(&self.payload)?;
        let updated_at = parse_stamp(&self.updated_at)?;
        let started_at = match &self.started_at {
            Some(s) => parse_stamp(s)?,
            None => updated_at,
        };
        let finished_at = match &self.finished_at {
            Some(s) => parse_stamp(s)?,
            None => updated_at,
        };

        let status = match self.status.as_str() {
            "pending" => JobStatus::Pending,
            "running" => JobStatus::Running {
                started_at,
                worker_id: self.worker_id.unwrap_or_default(),
            },
            "completed" => JobStatus::Completed {
                started_at,
                completed_at: finished_at,
                summary: self.summary.unwrap_or_default(),
            },
            "failed" => JobStatus::Failed {
                failed_at: finished_at,
                error: self.error.unwrap_or_default(),
                attempts: self.attempts,
            },
            other => {
                return Err(DbError::Serialization(format!(
                    "unknown job status '{other}' for job {id}"
                )));
            }
        };

        Ok(Job {
            id,
            queue: self.queue,
            job_type: self.job_type,
            label: self.label,
            payload,
            priority: Priority::from_rank(self.priority),
            status,
            attempts: self.attempts,
            max_retries: self.max_retries,
            timeout_secs: self.timeout_secs,
            created_at: parse_stamp(&self.created_at)?,
            updated_at,
        })
    }
}

fn into_jobs(records: Vec<JobRecord>) -> Result<Vec<Job>, DbError> {
    records.into_iter().map(JobRecord::into_job).collect()
}

/// Archived record of a finished job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobHistoryRecord {
    pub job_id: String,
    pub queue: String,
    pub job_type: String,
    pub label: String,
    pub priority: String,
    pub final_status: String,
    pub attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    pub created_at: String,
    pub archived_at: String,
}

/// Upper bound on candidates tried per claim round.
const CLAIM_CANDIDATES: i64 = 8;

impl JobRepository {
    /// Create a new job in the database.
    pub async fn create(job: &Job) -> Result<Job, DbError> {
        let db = get_db()?;
        let record = JobRecord::from_job(job)?;

        let created: Option<JobRecord> = db
            .create(("job", job.id.to_string()))
            .content(record)
            .await?;

        created
            .ok_or_else(|| DbError::Query("Failed to create job".into()))?
            .into_job()
    }

    /// Get a job by ID.
    pub async fn get(id: JobId) -> Result<Job, DbError> {
        let db = get_db()?;

        let record: Option<JobRecord> = db.select(("job", id.to_string())).await?;

        record
            .ok_or_else(|| DbError::NotFound(format!("Job not found: {}", id)))?
            .into_job()
    }

    /// Pending jobs of a queue in delivery order, without removing them.
    pub async fn peek_pending(queue: &str, limit: usize) -> Result<Vec<Job>, DbError> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let db = get_db()?;
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);

        let mut result = db
            .query(
                r#"
                SELECT * FROM job
                WHERE queue = $queue AND status = "pending"
                ORDER BY priority DESC, created_at ASC, job_id ASC
                LIMIT $limit
                "#,
            )
            .bind(("queue", queue.to_string()))
            .bind(("limit", limit))
            .await?;

        let records: Vec<JobRecord> = result.take(0)?;
        into_jobs(records)
    }

    /// Number of pending jobs in a queue.
    pub async fn count_pending(queue: &str) -> Result<u64, DbError> {
        let db = get_db()?;

        let mut result = db
            .query(
                r#"
                SELECT count() AS count FROM job
                WHERE queue = $queue AND status = "pending"
                GROUP ALL
                "#,
            )
            .bind(("queue", queue.to_string()))
            .await?;

        #[derive(Deserialize)]
        struct CountResult {
            count: i64,
        }

        let counts: Vec<CountResult> = result.take(0)?;

        Ok(counts
            .first()
            .map(|c| u64::try_from(c.count).unwrap_or(0))
            .unwrap_or(0))
    }

    /// Claim the next pending job of a queue for a worker.
    ///
    /// The transition to `running` is conditional on the job still being
    /// pending, so concurrent workers never claim the same job. Returns
    /// `None` when the backlog is empty.
    ///
    /// A claimed record that cannot be read back is failed and archived,
    /// and reported as [`DbError::Malformed`].
    pub async fn claim_next(queue: &str, worker_id: &str) -> Result<Option<Job>, DbError> {
        let db = get_db()?;

        loop {
            let mut result = db
                .query(
                    r#"
                    SELECT * FROM job
                    WHERE queue = $queue AND status = "pending"
                    ORDER BY priority DESC, created_at ASC, job_id ASC
                    LIMIT $limit
                    "#,
                )
                .bind(("queue", queue.to_string()))
                .bind(("limit", CLAIM_CANDIDATES))
                .await?;

            let candidates: Vec<JobRecord> = result.take(0)?;
            if candidates.is_empty() {
                return Ok(None);
            }

            for candidate in candidates {
                let now = stamp(Utc::now());
                let mut updated = db
                    .query(
                        r#"
                        UPDATE type::thing('job', $id)
                        SET status = "running",
                            worker_id = $worker_id,
                            started_at = $now,
                            attempts += 1,
                            updated_at = $now
                        WHERE status = "pending"
                        RETURN AFTER
                        "#,
                    )
                    .bind(("id", candidate.job_id.clone()))
                    .bind(("worker_id", worker_id.to_string()))
                    .bind(("now", now))
                    .await?;

                let claimed: Vec<JobRecord> = updated.take(0)?;
                if let Some(record) = claimed.into_iter().next() {
                    return match record.clone().into_job() {
                        Ok(job) => Ok(Some(job)),
                        Err(e) => {
                            let reason = e.to_string();
                            Self::discard_unreadable(&record, &reason).await?;
                            Err(DbError::Malformed {
                                id: record.job_id,
                                reason,
                            })
                        }
                    };
                }

                tracing::debug!(
                    "Job {} was claimed by another worker, trying next",
                    candidate.job_id
                );
            }
        }
    }

    /// Fail a claimed job whose record cannot be turned back into a [`Job`],
    /// archiving it straight from the raw record so it does not stay
    /// `running`.
    async fn discard_unreadable(record: &JobRecord, reason: &str) -> Result<(), DbError> {
        let db = get_db()?;
        let now = stamp(Utc::now());

        let history = JobHistoryRecord {
            job_id: record.job_id.clone(),
            queue: record.queue.clone(),
            job_type: record.job_type.clone(),
            label: record
                .label
                .clone()
                .unwrap_or_else(|| format!("{} ({})", record.job_type, record.job_id)),
            priority: Priority::from_rank(record.priority).to_string(),
            final_status: "failed".to_string(),
            attempts: record.attempts,
            duration_ms: None,
            error: Some(reason.to_string()),
            summary: None,
            created_at: record.created_at.clone(),
            archived_at: now,
        };
        let _: Option<JobHistoryRecord> = db.create("job_history").content(history).await?;
        let _: Option<JobRecord> = db.delete(("job", record.job_id.clone())).await?;

        tracing::warn!(job_id = %record.job_id, "Discarded unreadable job: {}", reason);
        Ok(())
    }

    /// Mark a running job as completed.
    pub async fn complete(id: JobId, summary: &str) -> Result<Job, DbError> {
        Self::transition(
            id,
            r#"
            UPDATE type::thing('job', $id)
            SET status = "completed", summary = $text, finished_at = $now, updated_at = $now
            RETURN AFTER
            "#,
            summary,
        )
        .await
    }

    /// Hand a job back to the backlog after a failed attempt.
    pub async fn release(id: JobId, error: &str) -> Result<Job, DbError> {
        Self::transition(
            id,
            r#"
            UPDATE type::thing('job', $id)
            SET status = "pending", error = $text, worker_id = NONE, started_at = NONE, updated_at = $now
            RETURN AFTER
            "#,
            error,
        )
        .await
    }

    /// Mark a job as permanently failed.
    pub async fn fail(id: JobId, error: &str) -> Result<Job, DbError> {
        Self::transition(
            id,
            r#"
            UPDATE type::thing('job', $id)
            SET status = "failed", error = $text, finished_at = $now, updated_at = $now
            RETURN AFTER
            "#,
            error,
        )
        .await
    }

    async fn transition(id: JobId, statement: &'static str, text: &str) -> Result<Job, DbError> {
        let db = get_db()?;

        let mut result = db
            .query(statement)
            .bind(("id", id.to_string()))
            .bind(("text", text.to_string()))
            .bind(("now", stamp(Utc::now())))
            .await?;

        let records: Vec<JobRecord> = result.take(0)?;

        records
            .into_iter()
            .next()
            .ok_or_else(|| DbError::NotFound(format!("Job not found: {}", id)))?
            .into_job()
    }

    /// Delete a job.
    pub async fn delete(id: JobId) -> Result<(), DbError> {
        let db = get_db()?;

        let _: Option<JobRecord> = db.delete(("job", id.to_string())).await?;

        Ok(())
    }

    /// Archive a finished job to history and remove it from the backlog.
    pub async fn archive(job: &Job) -> Result<(), DbError> {
        let db = get_db()?;

        let (final_status, duration_ms, error, summary) = match &job.status {
            JobStatus::Completed {
                started_at,
                completed_at,
                summary,
            } => {
                let duration = (*completed_at - *started_at).num_milliseconds().max(0) as u64;
                ("completed", Some(duration), None, Some(summary.clone()))
            }
            JobStatus::Failed { error, .. } => ("failed", None, Some(error.clone()), None),
            // Only terminal jobs are archived
            _ => return Ok(()),
        };

        let history = JobHistoryRecord {
            job_id: job.id.to_string(),
            queue: job.queue.clone(),
            job_type: job.job_type.clone(),
            label: job.label(),
            priority: job.priority.to_string(),
            final_status: final_status.to_string(),
            attempts: job.attempts,
            duration_ms,
            error,
            summary,
            created_at: stamp(job.created_at),
            archived_at: stamp(Utc::now()),
        };

        let _: Option<JobHistoryRecord> = db.create("job_history").content(history).await?;

        Self::delete(job.id).await?;

        Ok(())
    }

    /// Archived history of a queue, most recent first.
    pub async fn history(queue: &str, limit: usize) -> Result<Vec<JobHistoryRecord>, DbError> {
        let db = get_db()?;
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);

        let mut result = db
            .query(
                r#"
                SELECT * FROM job_history
                WHERE queue = $queue
                ORDER BY archived_at DESC
                LIMIT $limit
                "#,
            )
            .bind(("queue", queue.to_string()))
            .bind(("limit", limit))
            .await?;

        Ok(result.take(0)?)
    }
}
