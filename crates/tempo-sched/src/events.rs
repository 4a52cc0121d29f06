//! Domain events and the observer fan-out.
//!
//! The engine narrates the job lifecycle through [`JobEvent`] values handed
//! to every registered [`JobObserver`]. Observers are capability-only
//! sinks: the history store, a notification side-channel, test recorders.
//! An observer failure is logged and skipped; it never propagates back into
//! engine state transitions.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::warn;

use tempo_core::TaskId;

use crate::driver::TaskStatusUpdate;
use crate::error::Result;
use crate::job::Job;

/// A domain event emitted by the scheduler engine.
#[derive(Debug, Clone)]
pub enum JobEvent {
    /// A job was registered or its definition replaced.
    Registered {
        /// The registered job.
        job: Job,
    },

    /// A task for the job started executing on a worker.
    Started {
        /// The job the task executes.
        job: Job,
        /// The raw status update from the resource manager.
        status: TaskStatusUpdate,
        /// The attempt number parsed from the task id.
        attempt: u32,
    },

    /// A task for the job finished successfully.
    Finished {
        /// The job, with success counters already advanced.
        job: Job,
        /// The finished task's id.
        task_id: TaskId,
        /// The raw status update from the resource manager.
        status: TaskStatusUpdate,
        /// The attempt number parsed from the task id.
        attempt: u32,
    },

    /// A task failed (or was killed or lost).
    Failed {
        /// The job, when the task id still resolves to a vertex.
        job: Option<Job>,
        /// The job name parsed from the task id.
        job_name: String,
        /// The raw status update from the resource manager.
        status: TaskStatusUpdate,
        /// The attempt number parsed from the task id.
        attempt: u32,
    },

    /// A failed task had no retry budget left.
    RetriesExhausted {
        /// The job, with failure counters already advanced.
        job: Job,
        /// The final attempt number.
        attempt: u32,
    },

    /// The job was disabled by policy.
    Disabled {
        /// The disabled job.
        job: Job,
        /// Why it was disabled.
        reason: String,
    },

    /// A past firing fell outside the epsilon tolerance and was skipped.
    Skipped {
        /// The job whose firing was skipped.
        job: Job,
        /// The firing instant that was skipped.
        fire_time: DateTime<Utc>,
    },

    /// The job was deregistered and its vertex removed.
    Removed {
        /// The removed job.
        job: Job,
    },
}

impl JobEvent {
    /// The event name, `snake_case`, for logs and history rows.
    #[must_use]
    pub const fn event_name(&self) -> &'static str {
        match self {
            Self::Registered { .. } => "job_registered",
            Self::Started { .. } => "job_started",
            Self::Finished { .. } => "job_finished",
            Self::Failed { .. } => "job_failed",
            Self::RetriesExhausted { .. } => "job_retries_exhausted",
            Self::Disabled { .. } => "job_disabled",
            Self::Skipped { .. } => "job_skipped",
            Self::Removed { .. } => "job_removed",
        }
    }

    /// The name of the job this event concerns.
    #[must_use]
    pub fn job_name(&self) -> &str {
        match self {
            Self::Registered { job }
            | Self::Started { job, .. }
            | Self::Finished { job, .. }
            | Self::RetriesExhausted { job, .. }
            | Self::Disabled { job, .. }
            | Self::Skipped { job, .. }
            | Self::Removed { job } => job.name(),
            Self::Failed { job_name, .. } => job_name,
        }
    }
}

/// A capability sink for domain events.
#[async_trait]
pub trait JobObserver: Send + Sync {
    /// Handles one event.
    ///
    /// # Errors
    ///
    /// Implementations may fail; the fan-out logs the failure and proceeds.
    async fn handle(&self, event: &JobEvent) -> Result<()>;
}

/// Fan-out over every registered observer.
///
/// Cheap to clone; observers are shared.
#[derive(Clone, Default)]
pub struct ObserverSet {
    observers: Vec<Arc<dyn JobObserver>>,
}

impl ObserverSet {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an observer.
    pub fn register(&mut self, observer: Arc<dyn JobObserver>) {
        self.observers.push(observer);
    }

    /// Number of registered observers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.observers.len()
    }

    /// Returns true if no observers are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }

    /// Delivers `event` to every observer in registration order.
    ///
    /// Observer failures are logged and skipped so a broken sink cannot
    /// stall the engine.
    pub async fn notify(&self, event: &JobEvent) {
        for observer in &self.observers {
            if let Err(error) = observer.handle(event).await {
                warn!(
                    event = event.event_name(),
                    job = event.job_name(),
                    %error,
                    "observer failed; continuing"
                );
            }
        }
    }
}

impl std::fmt::Debug for ObserverSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObserverSet")
            .field("observers", &self.observers.len())
            .finish()
    }
}

/// An observer that records every event it sees, for tests.
#[derive(Debug, Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<JobEvent>>,
}

impl RecordingObserver {
    /// Creates an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the recorded events.
    ///
    /// # Panics
    ///
    /// Panics if the recorder mutex is poisoned (test-only type).
    #[must_use]
    pub fn events(&self) -> Vec<JobEvent> {
        self.events.lock().expect("recorder poisoned").clone()
    }

    /// Names of the recorded events, in order.
    #[must_use]
    pub fn event_names(&self) -> Vec<&'static str> {
        self.events().iter().map(JobEvent::event_name).collect()
    }
}

#[async_trait]
impl JobObserver for RecordingObserver {
    async fn handle(&self, event: &JobEvent) -> Result<()> {
        self.events
            .lock()
            .expect("recorder poisoned")
            .push(event.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::job::JobRecord;

    fn job(name: &str) -> Job {
        Job::schedule_based(
            JobRecord::new(name, "true", "ops@example.com"),
            "R1/2024-01-01T00:00:00Z/PT1M",
            "UTC",
        )
    }

    struct FailingObserver;

    #[async_trait]
    impl JobObserver for FailingObserver {
        async fn handle(&self, _event: &JobEvent) -> Result<()> {
            Err(Error::storage("sink unavailable"))
        }
    }

    #[test]
    fn event_names_are_stable() {
        assert_eq!(
            JobEvent::Registered { job: job("a") }.event_name(),
            "job_registered"
        );
        assert_eq!(
            JobEvent::Disabled {
                job: job("a"),
                reason: "recurrences exhausted".into()
            }
            .event_name(),
            "job_disabled"
        );
    }

    #[test]
    fn failed_event_exposes_name_without_job() {
        let event = JobEvent::Failed {
            job: None,
            job_name: "gone".into(),
            status: TaskStatusUpdate::new(
                "tt1:gone:0:0",
                crate::driver::TaskState::Killed,
                "slave-1",
            ),
            attempt: 0,
        };
        assert_eq!(event.job_name(), "gone");
    }

    #[tokio::test]
    async fn fan_out_delivers_in_registration_order() {
        let first = Arc::new(RecordingObserver::new());
        let second = Arc::new(RecordingObserver::new());

        let mut set = ObserverSet::new();
        set.register(first.clone());
        set.register(second.clone());
        assert_eq!(set.len(), 2);

        set.notify(&JobEvent::Registered { job: job("a") }).await;

        assert_eq!(first.event_names(), vec!["job_registered"]);
        assert_eq!(second.event_names(), vec!["job_registered"]);
    }

    #[tokio::test]
    async fn broken_observer_does_not_block_the_rest() {
        let recorder = Arc::new(RecordingObserver::new());

        let mut set = ObserverSet::new();
        set.register(Arc::new(FailingObserver));
        set.register(recorder.clone());

        set.notify(&JobEvent::Removed { job: job("a") }).await;

        assert_eq!(recorder.event_names(), vec!["job_removed"]);
    }
}
