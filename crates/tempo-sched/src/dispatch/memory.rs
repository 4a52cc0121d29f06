//! In-memory task manager for tests and local development.
//!
//! Not suitable for production: tasks live in process memory and are lost
//! on exit. The queue models delayed visibility the way a real backend
//! would, so engine tests can assert on dispatch timing without a cluster.

use std::sync::{PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use tempo_core::TaskId;

use super::{ScheduledTask, TaskManager};
use crate::error::{Error, Result};

/// A queued task with its visibility time and priority.
#[derive(Debug, Clone)]
struct QueuedTask {
    task: ScheduledTask,
    high_priority: bool,
    not_before: DateTime<Utc>,
}

/// In-memory [`TaskManager`].
#[derive(Debug, Default)]
pub struct InMemoryTaskManager {
    queue: RwLock<Vec<QueuedTask>>,
}

fn poison_err<T>(_: PoisonError<T>) -> Error {
    Error::storage("task queue lock poisoned")
}

impl InMemoryTaskManager {
    /// Creates an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every queued task, high-priority first, then by
    /// visibility time.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the queue lock is poisoned.
    pub fn queued_tasks(&self) -> Result<Vec<ScheduledTask>> {
        let queue = self.queue.read().map_err(poison_err)?;
        let mut entries: Vec<QueuedTask> = queue.clone();
        drop(queue);
        entries.sort_by_key(|e| (!e.high_priority, e.not_before));
        Ok(entries.into_iter().map(|e| e.task).collect())
    }

    /// Snapshot of queued tasks belonging to one job.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the queue lock is poisoned.
    pub fn queued_tasks_for(&self, job_name: &str) -> Result<Vec<ScheduledTask>> {
        Ok(self
            .queued_tasks()?
            .into_iter()
            .filter(|t| t.job_name() == job_name)
            .collect())
    }
}

#[async_trait]
impl TaskManager for InMemoryTaskManager {
    async fn enqueue(&self, task: ScheduledTask, high_priority: bool) -> Result<()> {
        let mut queue = self.queue.write().map_err(poison_err)?;
        queue.push(QueuedTask {
            task,
            high_priority,
            not_before: Utc::now(),
        });
        Ok(())
    }

    async fn schedule(&self, delay: Duration, task: ScheduledTask) -> Result<()> {
        let not_before = Utc::now()
            + chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::zero());
        let high_priority = task.job.record().high_priority;
        let mut queue = self.queue.write().map_err(poison_err)?;
        queue.push(QueuedTask {
            task,
            high_priority,
            not_before,
        });
        Ok(())
    }

    async fn cancel_tasks(&self, job_name: &str) -> Result<()> {
        let mut queue = self.queue.write().map_err(poison_err)?;
        queue.retain(|entry| entry.task.job_name() != job_name);
        Ok(())
    }

    async fn flush(&self) -> Result<()> {
        let mut queue = self.queue.write().map_err(poison_err)?;
        queue.clear();
        Ok(())
    }

    async fn time_until_execution(&self, task_id: &TaskId) -> Result<Option<Duration>> {
        let queue = self.queue.read().map_err(poison_err)?;
        let entry = queue.iter().find(|entry| &entry.task.id == task_id);
        let remaining = entry.map(|entry| {
            (entry.not_before - Utc::now())
                .to_std()
                .unwrap_or(Duration::ZERO)
        });
        drop(queue);
        Ok(remaining)
    }

    async fn queue_depth(&self) -> Result<usize> {
        let queue = self.queue.read().map_err(poison_err)?;
        Ok(queue.len())
    }
}
