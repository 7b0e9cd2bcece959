//! Queue repository: named backlogs and their defaults.

use chrono::Utc;
use queue_core::{Queue, QueueConfig, QueueId};
use serde::{Deserialize, Serialize};

use super::{parse_stamp, stamp};
use crate::{DbError, get_db};

/// Repository for queue persistence operations.
pub struct QueueRepository;

/// Storage shape of a queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct QueueRecord {
    queue_id: String,
    name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    config: QueueConfig,
    created_at: String,
    updated_at: String,
}

impl QueueRecord {
    fn from_queue(queue: &Queue) -> Self {
        Self {
            queue_id: queue.id.to_string(),
            name: queue.name.clone(),
            description: queue.description.clone(),
            config: queue.config.clone(),
            created_at: stamp(queue.created_at),
            updated_at: stamp(queue.updated_at),
        }
    }

    fn into_queue(self) -> Result<Queue, DbError> {
        let id = QueueId::parse(&self.queue_id).map_err(|e| {
            DbError::Serialization(format!("invalid queue id {}: {e}", self.queue_id))
        })?;

        Ok(Queue {
            id,
            name: self.name,
            description: self.description,
            config: self.config,
            created_at: parse_stamp(&self.created_at)?,
            updated_at: parse_stamp(&self.updated_at)?,
        })
    }
}

impl QueueRepository {
    /// Create a new queue. Fails if the name is already taken.
    pub async fn create(queue: &Queue) -> Result<Queue, DbError> {
        let db = get_db()?;

        let record: Option<QueueRecord> = db
            .create(("queue", queue.id.to_string()))
            .content(QueueRecord::from_queue(queue))
            .await?;

        record
            .ok_or_else(|| DbError::Query("Failed to create queue".into()))?
            .into_queue()
    }

    /// Look up a queue by name.
    pub async fn find_by_name(name: &str) -> Result<Option<Queue>, DbError> {
        let db = get_db()?;

        let mut result = db
            .query("SELECT * FROM queue WHERE name = $name LIMIT 1")
            .bind(("name", name.to_string()))
            .await?;

        let records: Vec<QueueRecord> = result.take(0)?;

        records.into_iter().next().map(QueueRecord::into_queue).transpose()
    }

    /// Get a queue by name.
    pub async fn get_by_name(name: &str) -> Result<Queue, DbError> {
        Self::find_by_name(name)
            .await?
            .ok_or_else(|| DbError::NotFound(format!("Queue not found: {}", name)))
    }

    /// Get the queue with this name, creating it with defaults if needed.
    pub async fn ensure(name: &str) -> Result<Queue, DbError> {
        if let Some(queue) = Self::find_by_name(name).await? {
            return Ok(queue);
        }

        match Self::create(&Queue::new(name)).await {
            Ok(queue) => {
                tracing::info!("Created queue '{}'", name);
                Ok(queue)
            }
            // Lost a race against another process creating the same name
            Err(e) => match Self::find_by_name(name).await? {
                Some(queue) => Ok(queue),
                None => Err(e),
            },
        }
    }

    /// List all queues ordered by name.
    pub async fn list() -> Result<Vec<Queue>, DbError> {
        let db = get_db()?;

        let mut result = db.query("SELECT * FROM queue ORDER BY name ASC").await?;
        let records: Vec<QueueRecord> = result.take(0)?;

        records.into_iter().map(QueueRecord::into_queue).collect()
    }

    /// Update a queue's description and defaults.
    pub async fn update(queue: &Queue) -> Result<Queue, DbError> {
        let db = get_db()?;

        let mut result = db
            .query(
                "UPDATE type::thing('queue', $id) SET description = $description, config = $config, updated_at = $now RETURN AFTER",
            )
            .bind(("id", queue.id.to_string()))
            .bind(("description", queue.description.clone()))
            .bind(("config", queue.config.clone()))
            .bind(("now", stamp(Utc::now())))
            .await?;

        let records: Vec<QueueRecord> = result.take(0)?;

        records
            .into_iter()
            .next()
            .ok_or_else(|| DbError::NotFound(format!("Queue not found: {}", queue.id)))?
            .into_queue()
    }

    /// Delete a queue.
    pub async fn delete(id: QueueId) -> Result<(), DbError> {
        let db = get_db()?;

        let _: Option<QueueRecord> = db.delete(("queue", id.to_string())).await?;

        Ok(())
    }

    /// Check if a queue name exists.
    pub async fn name_exists(name: &str) -> Result<bool, DbError> {
        let db = get_db()?;

        let mut result = db
            .query("SELECT count() FROM queue WHERE name = $name GROUP ALL")
            .bind(("name", name.to_string()))
            .await?;

        #[derive(Deserialize)]
        struct CountResult {
            count: i64,
        }

        let counts: Vec<CountResult> = result.take(0)?;

        Ok(counts.first().is_some_and(|c| c.count > 0))
    }
}
