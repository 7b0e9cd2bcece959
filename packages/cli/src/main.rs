//! `jobqueue`: run a worker on a queue, inspect a backlog, submit jobs.

mod handlers;

use anyhow::Context;
use clap::{Parser, Subcommand};
use queue_core::Priority;
use storage::Storage;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};
use worker::{
    CancellationToken, ConsoleOutput, DEFAULT_LIST_LIMIT, FailureReporter, JobManager, NewJob,
    QueueReporter, StorageFailureLog, WorkerConfig, WorkerLoop,
};

#[derive(Parser, Debug)]
#[command(name = "jobqueue")]
#[command(about = "Job queue worker and inspection tool", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log filter, e.g. `debug` or `worker=debug,db=info` (overrides RUST_LOG)
    #[arg(long, global = true)]
    log_level: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Work on a queue and execute jobs until interrupted
    Work {
        /// Name of the queue
        queue_name: String,
    },
    /// List queued jobs
    List {
        /// Name of the queue
        queue_name: String,

        /// Number of jobs to list
        #[arg(long, default_value_t = DEFAULT_LIST_LIMIT)]
        limit: usize,
    },
    /// Add a job to a queue
    Submit {
        /// Name of the queue
        queue_name: String,

        /// Handler to run, e.g. `echo`, `sleep` or `fail`
        job_type: String,

        /// JSON payload
        #[arg(long, default_value = "{}")]
        payload: String,

        /// Label shown when listing the queue
        #[arg(long)]
        label: Option<String>,

        /// low, normal, high or critical
        #[arg(long, default_value_t = Priority::Normal)]
        priority: Priority,

        /// Maximum delivery attempts (queue default if omitted)
        #[arg(long)]
        max_retries: Option<u32>,

        /// Timeout in seconds (queue default if omitted)
        #[arg(long)]
        timeout: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = WorkerConfig::from_env().context("Invalid worker configuration")?;

    // Logs go to stderr; stdout is for operator output
    let filter = match &cli.log_level {
        Some(level) => EnvFilter::try_new(level).context("Invalid --log-level")?,
        None => EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(&config.log_level))
            .context("Invalid JOBQUEUE_LOG_LEVEL")?,
    };
    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    db::init(config.db.clone())
        .await
        .with_context(|| format!("Failed to open database at {}", config.db.endpoint))?;

    let manager = JobManager::new(handlers::builtin())
        .with_worker_id(config.worker_id.clone())
        .with_poll_interval(config.poll_interval);

    match cli.command {
        Commands::Work { queue_name } => work(manager, &config, &queue_name).await,
        Commands::List { queue_name, limit } => {
            let output = ConsoleOutput::new();
            QueueReporter::new(&manager, &output)
                .list(&queue_name, limit)
                .await
                .with_context(|| format!("Failed to list queue {queue_name}"))?;
            Ok(())
        }
        Commands::Submit {
            queue_name,
            job_type,
            payload,
            label,
            priority,
            max_retries,
            timeout,
        } => {
            let payload: serde_json::Value =
                serde_json::from_str(&payload).context("--payload is not valid JSON")?;
            let mut new_job = NewJob::new(job_type, payload).with_priority(priority);
            if let Some(label) = label {
                new_job = new_job.with_label(label);
            }
            if let Some(max_retries) = max_retries {
                new_job = new_job.with_max_retries(max_retries);
            }
            if let Some(timeout) = timeout {
                new_job = new_job.with_timeout(timeout);
            }

            let job = manager
                .queue(&queue_name, new_job)
                .await
                .with_context(|| format!("Failed to queue job on {queue_name}"))?;
            println!("{}", job.id);
            Ok(())
        }
    }
}

async fn work(manager: JobManager, config: &WorkerConfig, queue_name: &str) -> anyhow::Result<()> {
    let storage = Storage::from_env()
        .await
        .context("Failed to set up exception storage")?;
    tracing::info!(
        worker_id = manager.worker_id(),
        storage = storage.kind_str(),
        handlers = ?manager.handlers().job_types(),
        "Starting worker"
    );

    let reporter = FailureReporter::new(StorageFailureLog::new(storage), ConsoleOutput::new());
    let worker =
        WorkerLoop::new(manager.clone(), reporter).with_failure_backoff(config.failure_backoff);

    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Could not listen for Ctrl-C: {}", e);
            return;
        }
        tracing::info!("Received shutdown signal");
        signal.cancel();
    });

    let summary = worker.run(queue_name, shutdown).await;
    manager.drain().await;

    tracing::info!(
        completed = summary.completed,
        failed = summary.failed,
        "Worker finished"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn list_defaults_to_one_job() {
        let cli = Cli::try_parse_from(["jobqueue", "list", "mail"]).unwrap();
        match cli.command {
            Commands::List { queue_name, limit } => {
                assert_eq!(queue_name, "mail");
                assert_eq!(limit, 1);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn list_rejects_negative_limit() {
        assert!(Cli::try_parse_from(["jobqueue", "list", "mail", "--limit", "-3"]).is_err());
    }

    #[test]
    fn submit_parses_priority_and_global_log_level() {
        let cli = Cli::try_parse_from([
            "jobqueue",
            "submit",
            "mail",
            "echo",
            "--priority",
            "high",
            "--label",
            "welcome",
            "--log-level",
            "debug",
        ])
        .unwrap();

        assert_eq!(cli.log_level.as_deref(), Some("debug"));
        match cli.command {
            Commands::Submit {
                priority,
                label,
                payload,
                ..
            } => {
                assert_eq!(priority, Priority::High);
                assert_eq!(label.as_deref(), Some("welcome"));
                assert_eq!(payload, "{}");
            }
            other => panic!("unexpected command {other:?}"),
        }
    }
}
