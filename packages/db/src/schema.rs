//! Database schema definitions using SurrealQL.

use crate::{DbError, get_db};

/// Initialize the database schema.
///
/// This creates all necessary tables, fields, and indexes.
pub async fn init_schema() -> Result<(), DbError> {
    let db = get_db()?;

    tracing::info!("Initializing database schema...");

    db.query(QUEUE_SCHEMA).await?.check()?;
    db.query(JOB_SCHEMA).await?.check()?;
    db.query(JOB_HISTORY_SCHEMA).await?.check()?;

    tracing::info!("Database schema initialized");

    Ok(())
}

// Timestamps are stored as fixed-width RFC 3339 strings so that string
// ordering matches chronological ordering.

/// Queue table schema.
const QUEUE_SCHEMA: &str = r#"
DEFINE TABLE IF NOT EXISTS queue SCHEMAFULL;

DEFINE FIELD IF NOT EXISTS queue_id ON queue TYPE string;
DEFINE FIELD IF NOT EXISTS name ON queue TYPE string;
DEFINE FIELD IF NOT EXISTS description ON queue TYPE option<string>;
DEFINE FIELD IF NOT EXISTS config ON queue TYPE object;
DEFINE FIELD IF NOT EXISTS config.default_timeout_secs ON queue TYPE int DEFAULT 300;
DEFINE FIELD IF NOT EXISTS config.default_max_retries ON queue TYPE int DEFAULT 3;
DEFINE FIELD IF NOT EXISTS created_at ON queue TYPE string;
DEFINE FIELD IF NOT EXISTS updated_at ON queue TYPE string;

-- A queue name identifies exactly one backlog
DEFINE INDEX IF NOT EXISTS queue_name ON queue FIELDS name UNIQUE;
"#;

/// Job table schema.
const JOB_SCHEMA: &str = r#"
DEFINE TABLE IF NOT EXISTS job SCHEMAFULL;

DEFINE FIELD IF NOT EXISTS job_id ON job TYPE string;
DEFINE FIELD IF NOT EXISTS queue ON job TYPE string;
DEFINE FIELD IF NOT EXISTS job_type ON job TYPE string;
DEFINE FIELD IF NOT EXISTS label ON job TYPE option<string>;
DEFINE FIELD IF NOT EXISTS payload ON job TYPE string;
DEFINE FIELD IF NOT EXISTS priority ON job TYPE int DEFAULT 1;
DEFINE FIELD IF NOT EXISTS status ON job TYPE string DEFAULT "pending";
DEFINE FIELD IF NOT EXISTS worker_id ON job TYPE option<string>;
DEFINE FIELD IF NOT EXISTS started_at ON job TYPE option<string>;
DEFINE FIELD IF NOT EXISTS finished_at ON job TYPE option<string>;
DEFINE FIELD IF NOT EXISTS summary ON job TYPE option<string>;
DEFINE FIELD IF NOT EXISTS error ON job TYPE option<string>;
DEFINE FIELD IF NOT EXISTS attempts ON job TYPE int DEFAULT 0;
DEFINE FIELD IF NOT EXISTS max_retries ON job TYPE int DEFAULT 3;
DEFINE FIELD IF NOT EXISTS timeout_secs ON job TYPE int DEFAULT 300;
DEFINE FIELD IF NOT EXISTS created_at ON job TYPE string;
DEFINE FIELD IF NOT EXISTS updated_at ON job TYPE string;

DEFINE INDEX IF NOT EXISTS job_queue ON job FIELDS queue;
DEFINE INDEX IF NOT EXISTS job_status ON job FIELDS status;

-- Compound index for backlog polling (pending jobs by priority)
DEFINE INDEX IF NOT EXISTS job_queue_pending ON job FIELDS queue, status, priority;
"#;

/// Job history table schema for auditing finished jobs.
const JOB_HISTORY_SCHEMA: &str = r#"
DEFINE TABLE IF NOT EXISTS job_history SCHEMAFULL;

DEFINE FIELD IF NOT EXISTS job_id ON job_history TYPE string;
DEFINE FIELD IF NOT EXISTS queue ON job_history TYPE string;
DEFINE FIELD IF NOT EXISTS job_type ON job_history TYPE string;
DEFINE FIELD IF NOT EXISTS label ON job_history TYPE string;
DEFINE FIELD IF NOT EXISTS priority ON job_history TYPE string;
DEFINE FIELD IF NOT EXISTS final_status ON job_history TYPE string;
DEFINE FIELD IF NOT EXISTS attempts ON job_history TYPE int DEFAULT 1;
DEFINE FIELD IF NOT EXISTS duration_ms ON job_history TYPE option<int>;
DEFINE FIELD IF NOT EXISTS error ON job_history TYPE option<string>;
DEFINE FIELD IF NOT EXISTS summary ON job_history TYPE option<string>;
DEFINE FIELD IF NOT EXISTS created_at ON job_history TYPE string;
DEFINE FIELD IF NOT EXISTS archived_at ON job_history TYPE string;

DEFINE INDEX IF NOT EXISTS history_queue ON job_history FIELDS queue;
DEFINE INDEX IF NOT EXISTS history_status ON job_history FIELDS final_status;
"#;
