use std::sync::LazyLock;
use std::time::Duration;

use tokio::sync::{Mutex, MutexGuard};

use db::{DbConfig, DbError};
use worker::{FnHandler, Job, JobHandlerRegistry, JobManager, job_handler};

static TEST_LOCK: LazyLock<Mutex<()>> = LazyLock::new(|| Mutex::new(()));

/// Serialize tests against the shared in-memory database and start empty.
pub async fn setup_db() -> Result<MutexGuard<'static, ()>, DbError> {
    let guard = TEST_LOCK.lock().await;
    db::init(DbConfig::memory()).await?;
    db::get_db()?
        .query("DELETE job_history; DELETE job; DELETE queue;")
        .await?;
    Ok(guard)
}

/// Manager with handlers covering every execution outcome.
pub fn manager() -> JobManager {
    let handlers = JobHandlerRegistry::new()
        .with(job_handler!("echo", |job| Ok(format!("echoed {}", job.payload))))
        .with(FnHandler::new("fail", |_job: &Job| {
            Box::pin(async { Err("smtp down".to_string()) })
        }))
        .with(FnHandler::new("panic", |_job: &Job| {
            Box::pin(async {
                let items: Vec<u32> = Vec::new();
                Ok(items[0].to_string())
            })
        }))
        .with(FnHandler::new("nap", |_job: &Job| {
            Box::pin(async {
                tokio::time::sleep(Duration::from_millis(300)).await;
                Ok("rested".to_string())
            })
        }))
        .with(FnHandler::new("slow", |_job: &Job| {
            Box::pin(async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok("finally".to_string())
            })
        }));

    JobManager::new(handlers)
        .with_worker_id("test-worker")
        .with_poll_interval(Duration::from_millis(10))
}
