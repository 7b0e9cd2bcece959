//! Process-wide SurrealDB connection.

use std::sync::LazyLock;

use surrealdb::Surreal;
use surrealdb::engine::any::{Any, connect};
use surrealdb::opt::auth::Root;
use thiserror::Error;
use tokio::sync::OnceCell;

static DB: LazyLock<OnceCell<Surreal<Any>>> = LazyLock::new(OnceCell::new);

/// Handle to the shared connection.
pub type Database = Surreal<Any>;

/// On-disk store shared by every process started from the same directory.
pub const DEFAULT_ENDPOINT: &str = "rocksdb://./data/queue";

const DEFAULT_NAMESPACE: &str = "jobqueue";
const DEFAULT_DATABASE: &str = "main";

/// Where and how to connect.
///
/// `endpoint` is anything `surrealdb::engine::any` understands and this
/// build has a feature for: `mem://`, `rocksdb://<path>` (`rocksdb`) or a
/// `ws://` server URL (`remote`).
#[derive(Debug, Clone)]
pub struct DbConfig {
    pub endpoint: String,
    pub namespace: String,
    pub database: String,
    /// Root user and password, for servers that require sign-in.
    pub credentials: Option<(String, String)>,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self::endpoint(DEFAULT_ENDPOINT)
    }
}

impl DbConfig {
    pub fn endpoint(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            namespace: DEFAULT_NAMESPACE.to_string(),
            database: DEFAULT_DATABASE.to_string(),
            credentials: None,
        }
    }

    /// Fresh in-memory database, private to this process.
    pub fn memory() -> Self {
        Self::endpoint("mem://")
    }

    /// On-disk database shared by every process pointing at `path`.
    pub fn rocksdb(path: impl AsRef<str>) -> Self {
        Self::endpoint(format!("rocksdb://{}", path.as_ref()))
    }

    pub fn with_namespace(self, namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            ..self
        }
    }

    pub fn with_database(self, database: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            ..self
        }
    }

    pub fn with_credentials(self, username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            credentials: Some((username.into(), password.into())),
            ..self
        }
    }
}

#[derive(Debug, Error)]
pub enum DbError {
    #[error("database not initialized, call db::init first")]
    NotInitialized,
    #[error("database error: {0}")]
    Connection(#[from] surrealdb::Error),
    #[error("query error: {0}")]
    Query(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("serialization error: {0}")]
    Serialization(String),
    #[error("unreadable job {id}: {reason}")]
    Malformed { id: String, reason: String },
    #[error("could not prepare database directory: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for DbError {
    fn from(err: serde_json::Error) -> Self {
        DbError::Serialization(err.to_string())
    }
}

/// Connect once per process. Later calls return the existing connection and
/// ignore `config`.
pub async fn init_db(config: DbConfig) -> Result<&'static Database, DbError> {
    DB.get_or_try_init(|| open(config)).await
}

async fn open(config: DbConfig) -> Result<Database, DbError> {
    tracing::info!(endpoint = %config.endpoint, "Connecting to database");
    if let Some(path) = config.endpoint.strip_prefix("rocksdb://") {
        tokio::fs::create_dir_all(path).await?;
    }
    let db = connect(config.endpoint.as_str()).await?;

    if let Some((username, password)) = &config.credentials {
        db.signin(Root { username, password }).await?;
    }
    db.use_ns(config.namespace.as_str())
        .use_db(config.database.as_str())
        .await?;

    tracing::info!(
        namespace = %config.namespace,
        database = %config.database,
        "Database ready"
    );
    Ok(db)
}

/// The shared connection, if [`init_db`] has run.
pub fn get_db() -> Result<&'static Database, DbError> {
    DB.get().ok_or(DbError::NotInitialized)
}
