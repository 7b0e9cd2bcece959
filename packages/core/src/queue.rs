//! Named backlogs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::id::QueueId;

/// Settings a queue hands to jobs enqueued without their own.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    pub default_timeout_secs: u64,
    /// Delivery attempts before a job is failed for good.
    pub default_max_retries: u32,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            default_timeout_secs: 300,
            default_max_retries: 3,
        }
    }
}

/// A named backlog of jobs.
///
/// The name is the identity operators and workers use; two handles with the
/// same name always resolve to the same backlog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Queue {
    pub id: QueueId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub config: QueueConfig,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Queue {
    /// A queue with default settings.
    pub fn new(name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: QueueId::new(),
            name: name.into(),
            description: None,
            config: QueueConfig::default(),
            created_at: now,
            updated_at: now,
        }
    }
}
