//! The resource-manager driver seam.
//!
//! The driver owns the connection to the external cluster resource manager:
//! it receives task offers, launches tasks on worker nodes, and feeds task
//! status updates back into the engine. The engine only ever calls
//! [`ExecutorDriver::start`] on election and [`ExecutorDriver::close`] on
//! defeat or shutdown; everything else flows inward through
//! [`TaskStatusUpdate`] values handed to the scheduler's callback methods.
//!
//! Production drivers should register with a failover timeout long enough
//! (a week by default, see [`crate::config::SchedulerConfig`]) that tasks
//! enqueued but unacknowledged across a crash still belong to this
//! framework when a replica comes back.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Task states reported by the resource manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskState {
    /// The task is executing on a worker.
    Running,
    /// The task completed successfully.
    Finished,
    /// The task failed.
    Failed,
    /// The task was killed.
    Killed,
    /// The resource manager lost track of the task.
    Lost,
}

impl TaskState {
    /// Returns true for states that count as failures in history rows.
    #[must_use]
    pub const fn is_failure(&self) -> bool {
        matches!(self, Self::Failed | Self::Killed | Self::Lost)
    }
}

/// An inbound status update for one task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskStatusUpdate {
    /// The raw task id as echoed by the resource manager. Parsed (and
    /// version-checked) by the engine; invalid ids are dropped, not fatal.
    pub task_id: String,
    /// The reported state.
    pub state: TaskState,
    /// The worker node that reported the state.
    pub slave_id: String,
    /// Free-form message from the executor, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Elements processed by the task, reported by data-processing
    /// executors. Feeds the history sink's counter table.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub elements_processed: Option<i64>,
}

impl TaskStatusUpdate {
    /// Creates a status update.
    #[must_use]
    pub fn new(task_id: impl Into<String>, state: TaskState, slave_id: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
            state,
            slave_id: slave_id.into(),
            message: None,
            elements_processed: None,
        }
    }

    /// Attaches an executor message.
    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Attaches a per-task element count.
    #[must_use]
    pub const fn with_elements_processed(mut self, elements: i64) -> Self {
        self.elements_processed = Some(elements);
        self
    }
}

/// Lifecycle handle for the resource-manager connection.
#[async_trait]
pub trait ExecutorDriver: Send + Sync {
    /// Connects to the resource manager and begins receiving offers.
    async fn start(&self) -> Result<()>;

    /// Disconnects. Queued-but-unlaunched work stays with the resource
    /// manager until the failover timeout elapses.
    async fn close(&self) -> Result<()>;
}

/// A driver that records lifecycle calls and talks to nothing.
#[derive(Debug, Default)]
pub struct NoopDriver {
    started: AtomicBool,
}

impl NoopDriver {
    /// Creates a stopped driver.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if the driver is currently started.
    #[must_use]
    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ExecutorDriver for NoopDriver {
    async fn start(&self) -> Result<()> {
        self.started.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.started.store(false, Ordering::SeqCst);
        Ok(())
    }
}
