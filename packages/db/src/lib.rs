//! SurrealDB persistence behind the bundled queue engine.
//!
//! Queues are looked up by name. Each queue's backlog is its set of pending
//! jobs, ordered by priority, then age, then id. Finished jobs move to a
//! history table.
//!
//! # Features
//!
//! - `memory` (default): `mem://`, one database per process
//! - `rocksdb`: `rocksdb://<path>`, the on-disk store the CLI uses
//! - `remote`: `ws://` and `wss://` connections to a SurrealDB server

mod connection;
pub mod repositories;
mod schema;

pub use connection::{DEFAULT_ENDPOINT, Database, DbConfig, DbError, get_db, init_db};
pub use schema::init_schema;

/// Connect and make sure the schema exists. Call once at startup.
pub async fn init(config: DbConfig) -> Result<(), DbError> {
    init_db(config).await?;
    init_schema().await
}
