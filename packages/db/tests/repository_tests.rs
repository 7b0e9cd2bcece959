#![allow(clippy::disallowed_methods)]

mod common;

use queue_core::{Job, JobStatus, Priority, Queue, QueueConfig};
use serde_json::json;
use std::error::Error;

use db::{DbError, repositories::JobRepository, repositories::QueueRepository};

fn labelled(queue: &str, label: &str) -> Job {
    Job::new(queue, "echo", json!({ "msg": label })).with_label(label)
}

#[tokio::test]
async fn test_repositories() -> Result<(), Box<dyn Error>> {
    let _guard = common::setup_db().await?;

    // QueueRepository: create/get_by_name/update/delete
    let mut queue = Queue::new("alpha");
    let created = QueueRepository::create(&queue).await?;
    assert_eq!(created.name, "alpha");
    assert_eq!(created.id, queue.id);

    let loaded = QueueRepository::get_by_name("alpha").await?;
    assert_eq!(loaded.id, queue.id);

    queue.description = Some("updated".to_string());
    queue.config = QueueConfig {
        default_timeout_secs: 120,
        default_max_retries: 1,
    };
    let updated = QueueRepository::update(&queue).await?;
    assert_eq!(updated.description.as_deref(), Some("updated"));
    assert_eq!(updated.config.default_max_retries, 1);

    assert!(QueueRepository::name_exists("alpha").await?);
    assert!(!QueueRepository::name_exists("missing").await?);

    let duplicate = QueueRepository::create(&Queue::new("alpha")).await;
    assert!(duplicate.is_err());

    let ensured = QueueRepository::ensure("alpha").await?;
    assert_eq!(ensured.id, queue.id);
    let fresh = QueueRepository::ensure("beta").await?;
    assert_eq!(fresh.name, "beta");

    let names: Vec<String> = QueueRepository::list()
        .await?
        .into_iter()
        .map(|q| q.name)
        .collect();
    assert_eq!(names, vec!["alpha".to_string(), "beta".to_string()]);

    QueueRepository::delete(queue.id).await?;
    let missing = QueueRepository::get_by_name("alpha").await;
    assert!(matches!(missing, Err(DbError::NotFound(_))));

    // JobRepository: create/get round trip keeps label, payload and priority
    common::reset_db().await?;
    let job = labelled("mail", "welcome").with_priority(Priority::High);
    let created = JobRepository::create(&job).await?;
    assert_eq!(created.id, job.id);
    assert_eq!(created.label(), "welcome");
    assert_eq!(created.payload, json!({ "msg": "welcome" }));
    assert_eq!(created.priority, Priority::High);
    assert_eq!(created.status, JobStatus::Pending);

    let loaded = JobRepository::get(job.id).await?;
    assert_eq!(loaded.job_type, "echo");

    JobRepository::delete(job.id).await?;
    assert!(matches!(
        JobRepository::get(job.id).await,
        Err(DbError::NotFound(_))
    ));

    // Backlog: peek order, no mutation, count per queue
    common::reset_db().await?;
    for label in ["A", "B", "C", "D", "E"] {
        JobRepository::create(&labelled("Q", label)).await?;
    }
    JobRepository::create(&labelled("other", "X")).await?;

    let peeked: Vec<String> = JobRepository::peek_pending("Q", 3)
        .await?
        .iter()
        .map(Job::label)
        .collect();
    assert_eq!(peeked, vec!["A", "B", "C"]);
    assert_eq!(JobRepository::count_pending("Q").await?, 5);
    assert_eq!(JobRepository::peek_pending("Q", 10).await?.len(), 5);
    assert!(JobRepository::peek_pending("Q", 0).await?.is_empty());
    assert_eq!(JobRepository::count_pending("Q").await?, 5);
    assert_eq!(JobRepository::count_pending("empty").await?, 0);

    // Priority jumps the line
    let urgent = labelled("Q", "urgent").with_priority(Priority::Critical);
    JobRepository::create(&urgent).await?;
    let first = JobRepository::peek_pending("Q", 1).await?;
    assert_eq!(first[0].label(), "urgent");

    // Claiming: pending -> running, attempts counted, removed from backlog
    let claimed = JobRepository::claim_next("Q", "worker-1").await?;
    let claimed = claimed.expect("a job should be claimable");
    assert_eq!(claimed.label(), "urgent");
    assert_eq!(claimed.attempts, 1);
    assert!(matches!(
        &claimed.status,
        JobStatus::Running { worker_id, .. } if worker_id == "worker-1"
    ));
    assert_eq!(JobRepository::count_pending("Q").await?, 5);

    // Release hands it back, fail and complete are terminal
    let released = JobRepository::release(claimed.id, "flaky").await?;
    assert_eq!(released.status, JobStatus::Pending);
    assert_eq!(released.attempts, 1);
    assert_eq!(JobRepository::count_pending("Q").await?, 6);

    let again = JobRepository::claim_next("Q", "worker-2").await?.unwrap();
    assert_eq!(again.id, claimed.id);
    assert_eq!(again.attempts, 2);
    let failed = JobRepository::fail(again.id, "gave up").await?;
    assert!(matches!(&failed.status, JobStatus::Failed { error, .. } if error == "gave up"));

    let next = JobRepository::claim_next("Q", "worker-1").await?.unwrap();
    assert_eq!(next.label(), "A");
    let done = JobRepository::complete(next.id, "sent").await?;
    assert!(matches!(&done.status, JobStatus::Completed { summary, .. } if summary == "sent"));

    // Archive moves terminal jobs to history
    JobRepository::archive(&done).await?;
    JobRepository::archive(&failed).await?;
    assert!(matches!(
        JobRepository::get(done.id).await,
        Err(DbError::NotFound(_))
    ));
    let history = JobRepository::history("Q", 10).await?;
    assert_eq!(history.len(), 2);
    assert!(history.iter().any(|h| h.final_status == "failed"));
    assert!(history.iter().any(|h| h.final_status == "completed"));

    // A claimed job that cannot be read back is failed and archived, not left running
    common::reset_db().await?;
    let broken = labelled("M", "broken");
    JobRepository::create(&broken).await?;
    db::get_db()?
        .query("UPDATE type::thing('job', $id) SET payload = 'not json'")
        .bind(("id", broken.id.to_string()))
        .await?;
    assert_eq!(JobRepository::count_pending("M").await?, 1);

    let err = JobRepository::claim_next("M", "worker-1").await.unwrap_err();
    match err {
        DbError::Malformed { id, .. } => assert_eq!(id, broken.id.to_string()),
        other => panic!("expected an unreadable job error, got {other:?}"),
    }
    assert_eq!(JobRepository::count_pending("M").await?, 0);
    assert!(matches!(
        JobRepository::get(broken.id).await,
        Err(DbError::NotFound(_))
    ));
    let history = JobRepository::history("M", 10).await?;
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].label, "broken");
    assert_eq!(history[0].final_status, "failed");
    assert_eq!(history[0].attempts, 1);
    assert!(JobRepository::claim_next("M", "worker-1").await?.is_none());

    // Drained backlog yields nothing to claim
    common::reset_db().await?;
    assert!(JobRepository::claim_next("Q", "worker-1").await?.is_none());

    Ok(())
}
