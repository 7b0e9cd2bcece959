//! Core domain types for the job queue worker.
//!
//! This crate contains shared types used across all packages:
//! - Job and JobStatus for work items
//! - Queue and QueueConfig for named backlogs
//! - The failure model handed from the queue engine to the worker loop

mod error;
mod failure;
mod id;
mod job;
mod queue;

pub use error::{BoxError, JobQueueError};
pub use failure::{ExecutionFailure, FailureCause, ReferenceCode};
pub use id::{JobId, QueueId};
pub use job::{Job, JobStatus, Priority};
pub use queue::{Queue, QueueConfig};
