//! Worker configuration from environment variables.

use std::time::Duration;

use db::DbConfig;
use thiserror::Error;

/// Default pause between claim attempts on an empty queue.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {var}: '{value}' ({reason})")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
    #[error("{0} requires {1} to be set as well")]
    Incomplete(&'static str, &'static str),
}

/// Runtime settings for a worker process.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub db: DbConfig,
    pub poll_interval: Duration,
    /// Pause after a failed iteration. Zero disables it.
    pub failure_backoff: Duration,
    pub worker_id: String,
    pub log_level: String,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            db: DbConfig::default(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            failure_backoff: Duration::ZERO,
            worker_id: default_worker_id(),
            log_level: "info".to_string(),
        }
    }
}

impl WorkerConfig {
    /// Build a config from environment variables.
    ///
    /// - `JOBQUEUE_DB_ENDPOINT` (default: [`db::DEFAULT_ENDPOINT`])
    /// - `JOBQUEUE_DB_NAMESPACE`, `JOBQUEUE_DB_DATABASE`
    /// - `JOBQUEUE_DB_USER` / `JOBQUEUE_DB_PASS` (both or neither)
    /// - `JOBQUEUE_POLL_INTERVAL_MS` (default: 500)
    /// - `JOBQUEUE_FAILURE_BACKOFF_MS` (default: 0)
    /// - `JOBQUEUE_WORKER_ID` (default: `<host>-<pid>`)
    /// - `JOBQUEUE_LOG_LEVEL` (default: `info`)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Same as [`WorkerConfig::from_env`] over an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |var: &str| {
            lookup(var)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let defaults = Self::default();

        let mut db = match get("JOBQUEUE_DB_ENDPOINT") {
            Some(endpoint) => DbConfig::endpoint(endpoint),
            None => defaults.db,
        };
        if let Some(ns) = get("JOBQUEUE_DB_NAMESPACE") {
            db = db.with_namespace(ns);
        }
        if let Some(name) = get("JOBQUEUE_DB_DATABASE") {
            db = db.with_database(name);
        }
        match (get("JOBQUEUE_DB_USER"), get("JOBQUEUE_DB_PASS")) {
            (Some(user), Some(pass)) => db = db.with_credentials(user, pass),
            (Some(_), None) => {
                return Err(ConfigError::Incomplete("JOBQUEUE_DB_USER", "JOBQUEUE_DB_PASS"));
            }
            (None, Some(_)) => {
                return Err(ConfigError::Incomplete("JOBQUEUE_DB_PASS", "JOBQUEUE_DB_USER"));
            }
            (None, None) => {}
        }

        let poll_interval = match get("JOBQUEUE_POLL_INTERVAL_MS") {
            Some(raw) => parse_millis("JOBQUEUE_POLL_INTERVAL_MS", &raw)?,
            None => defaults.poll_interval,
        };
        if poll_interval.is_zero() {
            return Err(ConfigError::Invalid {
                var: "JOBQUEUE_POLL_INTERVAL_MS",
                value: "0".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }
        let failure_backoff = match get("JOBQUEUE_FAILURE_BACKOFF_MS") {
            Some(raw) => parse_millis("JOBQUEUE_FAILURE_BACKOFF_MS", &raw)?,
            None => defaults.failure_backoff,
        };

        Ok(Self {
            db,
            poll_interval,
            failure_backoff,
            worker_id: get("JOBQUEUE_WORKER_ID").unwrap_or(defaults.worker_id),
            log_level: get("JOBQUEUE_LOG_LEVEL").unwrap_or(defaults.log_level),
        })
    }
}

fn parse_millis(var: &'static str, raw: &str) -> Result<Duration, ConfigError> {
    raw.parse::<u64>()
        .map(Duration::from_millis)
        .map_err(|e| ConfigError::Invalid {
            var,
            value: raw.to_string(),
            reason: e.to_string(),
        })
}

/// Worker id derived from the host name and process id.
pub fn default_worker_id() -> String {
    let host = std::env::var("HOSTNAME")
        .ok()
        .filter(|h| !h.trim().is_empty())
        .unwrap_or_else(|| "worker".to_string());
    format!("{}-{}", host.trim(), std::process::id())
}
