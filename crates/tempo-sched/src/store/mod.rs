//! Pluggable persistence for jobs and pending tasks.
//!
//! The [`JobStore`] trait is the durable side of the engine: every job
//! mutation writes through, every materialized task is persisted before it
//! is handed to the task manager, and a freshly elected leader hydrates
//! from the store before it schedules anything.
//!
//! ## Hydration Order
//!
//! Pending tasks MUST be loaded before jobs. Loading jobs first can
//! schedule a due firing before its pending-task state is restored,
//! producing a duplicate dispatch (at-least-once still holds, but the
//! ordering keeps the common path single-shot).

pub mod memory;

use async_trait::async_trait;

use tempo_core::TaskId;

use crate::dispatch::ScheduledTask;
use crate::error::Result;
use crate::job::Job;

pub use memory::InMemoryJobStore;

/// Storage abstraction for jobs and pending tasks.
///
/// Implementations must provide durability appropriate for the deployment:
/// in-memory for tests, a replicated key-value store in production. All
/// methods are `Send + Sync` because the engine, the hydration path, and
/// the retry path write concurrently.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Writes a job definition (insert or full replacement).
    async fn persist_job(&self, job: &Job) -> Result<()>;

    /// Deletes a job definition. Unknown names are a no-op.
    async fn remove_job(&self, name: &str) -> Result<()>;

    /// Writes a pending task keyed by its task id.
    async fn persist_task(&self, task: &ScheduledTask) -> Result<()>;

    /// Deletes a pending task. Unknown ids are a no-op.
    async fn remove_task(&self, task_id: &TaskId) -> Result<()>;

    /// Deletes every pending task belonging to `job_name`.
    async fn remove_tasks_for_job(&self, job_name: &str) -> Result<()>;

    /// Loads every persisted job.
    async fn load_jobs(&self) -> Result<Vec<Job>>;

    /// Loads every persisted pending task.
    async fn load_tasks(&self) -> Result<Vec<ScheduledTask>>;
}
