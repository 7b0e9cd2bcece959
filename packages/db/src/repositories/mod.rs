//! Repository implementations for database operations.

mod job_repo;
mod queue_repo;

pub use job_repo::{JobHistoryRecord, JobRepository};
pub use queue_repo::QueueRepository;

use chrono::{DateTime, Utc};

use crate::DbError;

/// Fixed-width timestamp so lexical order equals chronological order.
pub(crate) fn stamp(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%dT%H:%M:%S%.9fZ").to_string()
}

pub(crate) fn parse_stamp(value: &str) -> Result<DateTime<Utc>, DbError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| DbError::Serialization(format!("invalid timestamp '{value}': {e}")))
}
