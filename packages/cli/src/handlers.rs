//! Handlers bundled with the binary.

use std::time::Duration;

use worker::{FnHandler, Job, JobHandlerRegistry, job_handler};

/// Echo, sleep and fail handlers, enough to exercise a queue end to end.
pub fn builtin() -> JobHandlerRegistry {
    let mut handlers = JobHandlerRegistry::new();

    handlers.register(job_handler!("echo", |job| {
        tracing::info!("Echo job: {}", job.payload);
        Ok(format!("Echoed {}", job.payload))
    }));

    handlers.register(FnHandler::new("sleep", |job: &Job| {
        let seconds = job
            .payload
            .get("seconds")
            .and_then(|v| v.as_u64())
            .unwrap_or(5);
        Box::pin(async move {
            tracing::info!("Sleeping for {} seconds", seconds);
            tokio::time::sleep(Duration::from_secs(seconds)).await;
            Ok(format!("Slept for {seconds} seconds"))
        })
    }));

    // Fails unless the payload says otherwise; handy for watching retries
    handlers.register(FnHandler::new("fail", |job: &Job| {
        let should_fail = job
            .payload
            .get("fail")
            .and_then(|v| v.as_bool())
            .unwrap_or(true);
        let reason = job
            .payload
            .get("reason")
            .and_then(|v| v.as_str())
            .unwrap_or("Intentional failure")
            .to_string();
        Box::pin(async move {
            if should_fail {
                Err(reason)
            } else {
                Ok("Success".to_string())
            }
        })
    }));

    handlers
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn builtin_handlers() {
        let handlers = builtin();
        assert_eq!(handlers.job_types(), vec!["echo", "fail", "sleep"]);

        let job = Job::new("q", "fail", json!({ "reason": "disk full" }));
        let fail = handlers.get("fail").unwrap();
        assert_eq!(fail.handle(&job).await, Err("disk full".to_string()));

        let job = Job::new("q", "fail", json!({ "fail": false }));
        assert_eq!(fail.handle(&job).await, Ok("Success".to_string()));

        let job = Job::new("q", "sleep", json!({ "seconds": 0 }));
        let sleep = handlers.get("sleep").unwrap();
        assert_eq!(sleep.handle(&job).await, Ok("Slept for 0 seconds".to_string()));
    }
}
