//! Task dispatch abstraction.
//!
//! This module provides:
//!
//! - [`ScheduledTask`]: one materialized firing of a job
//! - [`TaskManager`]: trait the engine hands tasks to for queueing, delayed
//!   scheduling, cancellation, and flushing
//! - [`InMemoryTaskManager`]: in-memory implementation for tests and local
//!   development
//!
//! The engine treats the task manager as an opaque sink: it enqueues tasks
//! and forgets them, and learns their fate only through status updates from
//! the resource-manager driver.

pub mod memory;

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use tempo_core::TaskId;

use crate::error::Result;
use crate::job::Job;

pub use memory::InMemoryTaskManager;

/// One concrete execution attempt of a job, materialized by the engine.
///
/// Transient: created during a horizon iteration (or by the retry and
/// dependency paths), handed to the task manager, and disposed when the
/// task reaches a terminal state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduledTask {
    /// The versioned task id; the sole key used throughout the lifecycle.
    pub id: TaskId,
    /// When the task is due to run.
    pub due: DateTime<Utc>,
    /// A snapshot of the job at materialization time.
    pub job: Job,
}

impl ScheduledTask {
    /// Materializes a firing of `job` at `due` with the given attempt.
    #[must_use]
    pub fn new(job: Job, due: DateTime<Utc>, attempt: u32) -> Self {
        Self {
            id: TaskId::at(job.name(), due, attempt),
            due,
            job,
        }
    }

    /// The name of the job this task executes.
    #[must_use]
    pub fn job_name(&self) -> &str {
        self.id.job_name()
    }

    /// The attempt number encoded in the task id.
    #[must_use]
    pub const fn attempt(&self) -> u32 {
        self.id.attempt()
    }
}

/// Sink for materialized tasks.
///
/// Implementations may target a cluster resource manager's offer queue, a
/// message broker, or an in-memory queue for tests. All methods are
/// `Send + Sync` because the engine, the retry path, and hydration all hand
/// tasks over concurrently.
#[async_trait]
pub trait TaskManager: Send + Sync {
    /// Queues a task for dispatch as soon as an offer matches.
    ///
    /// High-priority tasks jump ahead of normal ones.
    async fn enqueue(&self, task: ScheduledTask, high_priority: bool) -> Result<()>;

    /// Queues a task that becomes dispatchable only after `delay`.
    ///
    /// Used for future firings inside the horizon and for one-shot retries.
    async fn schedule(&self, delay: Duration, task: ScheduledTask) -> Result<()>;

    /// Cancels and removes every queued task belonging to `job_name`.
    async fn cancel_tasks(&self, job_name: &str) -> Result<()>;

    /// Drops all queued tasks.
    async fn flush(&self) -> Result<()>;

    /// Time until a queued task becomes dispatchable, if it is known.
    ///
    /// Returns `Ok(None)` for unknown ids and `Ok(Some(Duration::ZERO))`
    /// for tasks that are already dispatchable.
    async fn time_until_execution(&self, task_id: &TaskId) -> Result<Option<Duration>>;

    /// Number of queued tasks, for gauges and tests.
    async fn queue_depth(&self) -> Result<usize>;
}
