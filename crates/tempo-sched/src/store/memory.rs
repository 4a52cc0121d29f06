//! In-memory job store for tests and local development.
//!
//! Not suitable for production: all state is lost when the process exits.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;

use tempo_core::TaskId;

use super::JobStore;
use crate::dispatch::ScheduledTask;
use crate::error::{Error, Result};
use crate::job::Job;

/// In-memory [`JobStore`].
#[derive(Debug, Default)]
pub struct InMemoryJobStore {
    jobs: RwLock<HashMap<String, Job>>,
    tasks: RwLock<HashMap<String, ScheduledTask>>,
}

fn poison_err<T>(_: PoisonError<T>) -> Error {
    Error::storage("store lock poisoned")
}

impl InMemoryJobStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Looks up one persisted job, for tests.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the lock is poisoned.
    pub fn job(&self, name: &str) -> Result<Option<Job>> {
        let jobs = self.jobs.read().map_err(poison_err)?;
        Ok(jobs.get(name).cloned())
    }

    /// Number of persisted pending tasks, for tests.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the lock is poisoned.
    pub fn task_count(&self) -> Result<usize> {
        let tasks = self.tasks.read().map_err(poison_err)?;
        Ok(tasks.len())
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn persist_job(&self, job: &Job) -> Result<()> {
        let mut jobs = self.jobs.write().map_err(poison_err)?;
        jobs.insert(job.name().to_string(), job.clone());
        Ok(())
    }

    async fn remove_job(&self, name: &str) -> Result<()> {
        let mut jobs = self.jobs.write().map_err(poison_err)?;
        jobs.remove(name);
        Ok(())
    }

    async fn persist_task(&self, task: &ScheduledTask) -> Result<()> {
        let mut tasks = self.tasks.write().map_err(poison_err)?;
        tasks.insert(task.id.to_string(), task.clone());
        Ok(())
    }

    async fn remove_task(&self, task_id: &TaskId) -> Result<()> {
        let mut tasks = self.tasks.write().map_err(poison_err)?;
        tasks.remove(&task_id.to_string());
        Ok(())
    }

    async fn remove_tasks_for_job(&self, job_name: &str) -> Result<()> {
        let mut tasks = self.tasks.write().map_err(poison_err)?;
        tasks.retain(|_, task| task.job_name() != job_name);
        Ok(())
    }

    async fn load_jobs(&self) -> Result<Vec<Job>> {
        let jobs = self.jobs.read().map_err(poison_err)?;
        let mut out: Vec<Job> = jobs.values().cloned().collect();
        drop(jobs);
        out.sort_by(|a, b| a.name().cmp(b.name()));
        Ok(out)
    }

    async fn load_tasks(&self) -> Result<Vec<ScheduledTask>> {
        let tasks = self.tasks.read().map_err(poison_err)?;
        let mut out: Vec<ScheduledTask> = tasks.values().cloned().collect();
        drop(tasks);
        out.sort_by(|a, b| a.id.to_string().cmp(&b.id.to_string()));
        Ok(out)
    }
}
