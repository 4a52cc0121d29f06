//! Job stats: the per-task history sink.
//!
//! A capability distinct from the engine but fed by it through the observer
//! fan-out. It maintains an in-memory run-state map per job and appends
//! per-task history rows to an external columnar store keyed by
//! `(task_id, ts)`. For data-processing jobs, a counter table keyed by
//! `(job_name, task_id)` accumulates the element counts carried on
//! finished status updates, via conditional increments: an increment
//! applies only when the main table already holds a row for the task, and
//! repeated increments for a known task keep adding.
//!
//! All store operations are best-effort: a failure is logged, the session
//! is reset, and the caller proceeds. History unavailability never fails a
//! scheduling decision.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::warn;

use crate::driver::{TaskState, TaskStatusUpdate};
use crate::error::{Error, Result};
use crate::events::{JobEvent, JobObserver};
use crate::job::Job;

/// Coarse run state tracked per job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum JobRunState {
    /// No task in flight.
    #[default]
    Idle,
    /// A task is queued but not yet running.
    Queued,
    /// A task is executing on a worker.
    Running,
}

/// One history row, matching the columnar store's task table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskHistoryRow {
    /// Task id (row key, with `ts`).
    pub task_id: String,
    /// Row timestamp (row key, with `task_id`).
    pub ts: DateTime<Utc>,
    /// Job name.
    pub job_name: String,
    /// Job owner at the time of the row.
    pub job_owner: String,
    /// Schedule expression snapshot, for schedule-based jobs.
    pub job_schedule: Option<String>,
    /// Parent set snapshot, for dependency-based jobs.
    pub job_parents: Option<BTreeSet<String>>,
    /// Reported task state label.
    pub task_state: String,
    /// Worker node that reported the state.
    pub slave_id: String,
    /// Executor message, if any.
    pub message: Option<String>,
    /// Attempt number.
    pub attempt: u32,
    /// Whether this row records a failure.
    pub is_failure: bool,
}

impl TaskHistoryRow {
    fn from_status(job: &Job, status: &TaskStatusUpdate, state: &str, attempt: u32) -> Self {
        Self {
            task_id: status.task_id.clone(),
            ts: Utc::now(),
            job_name: job.name().to_string(),
            job_owner: job.record().owner.clone(),
            job_schedule: job.as_schedule().map(|s| s.schedule.clone()),
            job_parents: job.as_dependency().map(|d| d.parents.clone()),
            task_state: state.to_string(),
            slave_id: status.slave_id.clone(),
            message: status.message.clone(),
            attempt,
            is_failure: status.state.is_failure(),
        }
    }
}

/// The external, append-mostly history store.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Appends one history row.
    async fn append(&self, row: &TaskHistoryRow) -> Result<()>;

    /// Adds `elements` to the counter row for `(job_name, task_id)`.
    ///
    /// Conditional: the increment applies only when the main table already
    /// holds a row for the task; a count for a task the store never saw is
    /// dropped. Not idempotent on value: repeated increments for a known
    /// task keep adding.
    async fn increment_elements(&self, job_name: &str, task_id: &str, elements: i64) -> Result<()>;

    /// Tears down and re-establishes the store session after a connection
    /// loss. Default: no-op.
    async fn reset_session(&self) -> Result<()> {
        Ok(())
    }
}

/// In-memory [`HistoryStore`] for tests and local development.
#[derive(Debug, Default)]
pub struct InMemoryHistoryStore {
    rows: RwLock<Vec<TaskHistoryRow>>,
    counters: RwLock<HashMap<(String, String), i64>>,
}

fn poison_err<T>(_: PoisonError<T>) -> Error {
    Error::storage("history lock poisoned")
}

impl InMemoryHistoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every appended row.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the lock is poisoned.
    pub fn rows(&self) -> Result<Vec<TaskHistoryRow>> {
        let rows = self.rows.read().map_err(poison_err)?;
        Ok(rows.clone())
    }

    /// The accumulated element count for `(job_name, task_id)`.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the lock is poisoned.
    pub fn elements(&self, job_name: &str, task_id: &str) -> Result<i64> {
        let counters = self.counters.read().map_err(poison_err)?;
        Ok(counters
            .get(&(job_name.to_string(), task_id.to_string()))
            .copied()
            .unwrap_or(0))
    }
}

#[async_trait]
impl HistoryStore for InMemoryHistoryStore {
    async fn append(&self, row: &TaskHistoryRow) -> Result<()> {
        let mut rows = self.rows.write().map_err(poison_err)?;
        rows.push(row.clone());
        Ok(())
    }

    async fn increment_elements(&self, job_name: &str, task_id: &str, elements: i64) -> Result<()> {
        let known = {
            let rows = self.rows.read().map_err(poison_err)?;
            rows.iter()
                .any(|row| row.job_name == job_name && row.task_id == task_id)
        };
        if !known {
            return Ok(());
        }
        let mut counters = self.counters.write().map_err(poison_err)?;
        *counters
            .entry((job_name.to_string(), task_id.to_string()))
            .or_insert(0) += elements;
        Ok(())
    }
}

/// Observer that maintains run states and writes history rows.
pub struct JobStatsSink {
    states: RwLock<HashMap<String, JobRunState>>,
    store: Arc<dyn HistoryStore>,
}

impl JobStatsSink {
    /// Creates a sink backed by `store`.
    #[must_use]
    pub fn new(store: Arc<dyn HistoryStore>) -> Self {
        Self {
            states: RwLock::new(HashMap::new()),
            store,
        }
    }

    /// The current run state for `job_name` (`Idle` when untracked).
    #[must_use]
    pub fn run_state(&self, job_name: &str) -> JobRunState {
        self.states
            .read()
            .map(|states| states.get(job_name).copied().unwrap_or_default())
            .unwrap_or_default()
    }

    /// Records that a task for the job entered the dispatch queue.
    ///
    /// Called by the task-manager integration; a job already `Running` is
    /// not downgraded (the queued task is a second round racing the status
    /// feed).
    pub fn job_queued(&self, job_name: &str) {
        self.transition(job_name, JobRunState::Queued);
    }

    /// Records per-task element counts for a data-processing job.
    ///
    /// Fed from the element count on finished status updates; best-effort
    /// like every other store operation.
    pub async fn record_elements(&self, job_name: &str, task_id: &str, elements: i64) {
        if let Err(error) = self.store.increment_elements(job_name, task_id, elements).await {
            self.handle_store_failure("increment_elements", &error).await;
        }
    }

    fn transition(&self, job_name: &str, next: JobRunState) {
        let Ok(mut states) = self.states.write() else {
            return;
        };
        let current = states.get(job_name).copied().unwrap_or_default();
        if current == JobRunState::Running && next == JobRunState::Queued {
            return;
        }
        states.insert(job_name.to_string(), next);
    }

    async fn append_row(&self, row: TaskHistoryRow) {
        if let Err(error) = self.store.append(&row).await {
            self.handle_store_failure("append", &error).await;
        }
    }

    async fn handle_store_failure(&self, operation: &str, error: &Error) {
        warn!(%error, operation, "history store unavailable; resetting session");
        if let Err(reset_error) = self.store.reset_session().await {
            warn!(error = %reset_error, "history session reset failed");
        }
    }

    fn state_label(state: TaskState) -> &'static str {
        match state {
            TaskState::Running => "running",
            TaskState::Finished => "finished",
            TaskState::Failed => "failed",
            TaskState::Killed => "killed",
            TaskState::Lost => "lost",
        }
    }
}

#[async_trait]
impl JobObserver for JobStatsSink {
    async fn handle(&self, event: &JobEvent) -> Result<()> {
        match event {
            JobEvent::Started {
                job,
                status,
                attempt,
            } => {
                self.transition(job.name(), JobRunState::Running);
                self.append_row(TaskHistoryRow::from_status(
                    job,
                    status,
                    Self::state_label(status.state),
                    *attempt,
                ))
                .await;
            }
            JobEvent::Finished {
                job,
                status,
                attempt,
                ..
            } => {
                self.transition(job.name(), JobRunState::Idle);
                self.append_row(TaskHistoryRow::from_status(
                    job,
                    status,
                    Self::state_label(status.state),
                    *attempt,
                ))
                .await;
                if job.record().data_processing {
                    if let Some(elements) = status.elements_processed {
                        self.record_elements(job.name(), &status.task_id, elements).await;
                    }
                }
            }
            JobEvent::Failed {
                job: Some(job),
                status,
                attempt,
                ..
            } => {
                self.transition(job.name(), JobRunState::Idle);
                self.append_row(TaskHistoryRow::from_status(
                    job,
                    status,
                    Self::state_label(status.state),
                    *attempt,
                ))
                .await;
            }
            JobEvent::Removed { job } => {
                if let Ok(mut states) = self.states.write() {
                    states.remove(job.name());
                }
            }
            // Registration, policy, and skip events carry no per-task row.
            JobEvent::Failed { job: None, .. }
            | JobEvent::Registered { .. }
            | JobEvent::RetriesExhausted { .. }
            | JobEvent::Disabled { .. }
            | JobEvent::Skipped { .. } => {}
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::JobRecord;

    fn job(name: &str) -> Job {
        Job::schedule_based(
            JobRecord::new(name, "true", "ops@example.com"),
            "R1/2024-01-01T00:00:00Z/PT1M",
            "UTC",
        )
    }

    fn started(job_name: &str) -> JobEvent {
        JobEvent::Started {
            job: job(job_name),
            status: TaskStatusUpdate::new(
                format!("tt1:{job_name}:1704067200000:0"),
                TaskState::Running,
                "slave-1",
            ),
            attempt: 0,
        }
    }

    fn finished(job_name: &str) -> JobEvent {
        JobEvent::Finished {
            job: job(job_name),
            task_id: tempo_core::TaskId::new(job_name, 1_704_067_200_000, 0),
            status: TaskStatusUpdate::new(
                format!("tt1:{job_name}:1704067200000:0"),
                TaskState::Finished,
                "slave-1",
            ),
            attempt: 0,
        }
    }

    struct BrokenStore;

    #[async_trait]
    impl HistoryStore for BrokenStore {
        async fn append(&self, _row: &TaskHistoryRow) -> Result<()> {
            Err(Error::storage("connection lost"))
        }

        async fn increment_elements(&self, _job: &str, _task: &str, _n: i64) -> Result<()> {
            Err(Error::storage("connection lost"))
        }
    }

    #[tokio::test]
    async fn tracks_run_state_transitions() {
        let store = Arc::new(InMemoryHistoryStore::new());
        let sink = JobStatsSink::new(store);

        assert_eq!(sink.run_state("etl"), JobRunState::Idle);

        sink.job_queued("etl");
        assert_eq!(sink.run_state("etl"), JobRunState::Queued);

        sink.handle(&started("etl")).await.unwrap();
        assert_eq!(sink.run_state("etl"), JobRunState::Running);

        sink.handle(&finished("etl")).await.unwrap();
        assert_eq!(sink.run_state("etl"), JobRunState::Idle);
    }

    #[tokio::test]
    async fn running_is_never_downgraded_to_queued() {
        let sink = JobStatsSink::new(Arc::new(InMemoryHistoryStore::new()));

        sink.handle(&started("etl")).await.unwrap();
        sink.job_queued("etl");
        assert_eq!(sink.run_state("etl"), JobRunState::Running);
    }

    #[tokio::test]
    async fn appends_rows_with_job_snapshot() {
        let store = Arc::new(InMemoryHistoryStore::new());
        let sink = JobStatsSink::new(store.clone());

        sink.handle(&started("etl")).await.unwrap();
        sink.handle(&finished("etl")).await.unwrap();

        let rows = store.rows().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].task_state, "running");
        assert!(!rows[0].is_failure);
        assert_eq!(rows[0].job_schedule.as_deref(), Some("R1/2024-01-01T00:00:00Z/PT1M"));
        assert_eq!(rows[1].task_state, "finished");
    }

    #[tokio::test]
    async fn failed_rows_are_marked_failures() {
        let store = Arc::new(InMemoryHistoryStore::new());
        let sink = JobStatsSink::new(store.clone());

        let event = JobEvent::Failed {
            job: Some(job("etl")),
            job_name: "etl".into(),
            status: TaskStatusUpdate::new("tt1:etl:1704067200000:1", TaskState::Failed, "slave-2")
                .with_message("exit 1"),
            attempt: 1,
        };
        sink.handle(&event).await.unwrap();

        let rows = store.rows().unwrap();
        assert_eq!(rows.len(), 1);
        assert!(rows[0].is_failure);
        assert_eq!(rows[0].attempt, 1);
        assert_eq!(rows[0].message.as_deref(), Some("exit 1"));
    }

    #[tokio::test]
    async fn element_counters_accumulate_for_tasks_the_main_table_knows() {
        let store = Arc::new(InMemoryHistoryStore::new());
        let sink = JobStatsSink::new(store.clone());

        // The finish writes the task row; increments after it count.
        sink.handle(&finished("etl")).await.unwrap();
        sink.record_elements("etl", "tt1:etl:1704067200000:0", 100)
            .await;
        sink.record_elements("etl", "tt1:etl:1704067200000:0", 50)
            .await;

        assert_eq!(
            store.elements("etl", "tt1:etl:1704067200000:0").unwrap(),
            150
        );
    }

    #[tokio::test]
    async fn element_counter_drops_increments_for_unknown_tasks() {
        let store = Arc::new(InMemoryHistoryStore::new());
        let sink = JobStatsSink::new(store.clone());

        sink.record_elements("etl", "tt1:etl:42:0", 100).await;

        assert_eq!(store.elements("etl", "tt1:etl:42:0").unwrap(), 0);
    }

    #[tokio::test]
    async fn finished_data_processing_task_feeds_the_counter() {
        let store = Arc::new(InMemoryHistoryStore::new());
        let sink = JobStatsSink::new(store.clone());

        let mut pipeline = job("pipeline");
        pipeline.record_mut().data_processing = true;
        let event = JobEvent::Finished {
            job: pipeline,
            task_id: tempo_core::TaskId::new("pipeline", 1_704_067_200_000, 0),
            status: TaskStatusUpdate::new(
                "tt1:pipeline:1704067200000:0",
                TaskState::Finished,
                "slave-1",
            )
            .with_elements_processed(4_096),
            attempt: 0,
        };
        sink.handle(&event).await.unwrap();

        assert_eq!(
            store
                .elements("pipeline", "tt1:pipeline:1704067200000:0")
                .unwrap(),
            4_096
        );
    }

    #[tokio::test]
    async fn element_counts_on_ordinary_jobs_are_ignored() {
        let store = Arc::new(InMemoryHistoryStore::new());
        let sink = JobStatsSink::new(store.clone());

        let event = JobEvent::Finished {
            job: job("etl"),
            task_id: tempo_core::TaskId::new("etl", 1_704_067_200_000, 0),
            status: TaskStatusUpdate::new(
                "tt1:etl:1704067200000:0",
                TaskState::Finished,
                "slave-1",
            )
            .with_elements_processed(4_096),
            attempt: 0,
        };
        sink.handle(&event).await.unwrap();

        assert_eq!(store.elements("etl", "tt1:etl:1704067200000:0").unwrap(), 0);
    }

    #[tokio::test]
    async fn store_failures_never_propagate() {
        let sink = JobStatsSink::new(Arc::new(BrokenStore));

        // Both paths must swallow the error.
        sink.handle(&started("etl")).await.unwrap();
        sink.record_elements("etl", "tt1:etl:42:0", 1).await;
        assert_eq!(sink.run_state("etl"), JobRunState::Running);
    }

    #[tokio::test]
    async fn removed_jobs_are_forgotten() {
        let sink = JobStatsSink::new(Arc::new(InMemoryHistoryStore::new()));
        sink.handle(&started("etl")).await.unwrap();
        sink.handle(&JobEvent::Removed { job: job("etl") })
            .await
            .unwrap();
        assert_eq!(sink.run_state("etl"), JobRunState::Idle);
    }
}
