//! # tempo-sched
//!
//! The scheduling engine of tempo, a fault-tolerant cluster job scheduler.
//!
//! tempo accepts user-defined jobs, decides when each should run — by time
//! or by dependency — and dispatches tasks to an external resource manager
//! that executes them on worker nodes. It runs as a highly available
//! service: replicas elect a single leader through a coordination service,
//! only the leader drives scheduling, and on failover another replica
//! resumes from durable state.
//!
//! ## Core Concepts
//!
//! - **Job**: a unit of work, either schedule-based (ISO-8601 repeating
//!   interval) or dependency-based (fires when all parents complete)
//! - **Schedule Stream**: the lazy sequence of pending firings for one
//!   schedule-based job
//! - **Task**: one concrete execution attempt, identified by a versioned
//!   task id that the whole lifecycle keys on
//! - **Schedule Horizon**: the look-ahead window during which firings are
//!   materialized as enqueued tasks
//!
//! ## Guarantees
//!
//! - **At-least-once**: tasks survive crashes and failovers; a firing may
//!   dispatch more than once across a crash, never silently not at all
//! - **Single writer**: one coarse monitor serializes every mutation of
//!   streams, graph, and persistence
//! - **Localized failure**: a bad schedule expression or task id skips that
//!   item; it never takes the engine down
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use chrono::Utc;
//! use tempo_sched::config::SchedulerConfig;
//! use tempo_sched::dispatch::InMemoryTaskManager;
//! use tempo_sched::error::Result;
//! use tempo_sched::events::ObserverSet;
//! use tempo_sched::job::{Job, JobRecord};
//! use tempo_sched::scheduler::Scheduler;
//! use tempo_sched::store::InMemoryJobStore;
//!
//! # async fn example() -> Result<()> {
//! let scheduler = Arc::new(Scheduler::new(
//!     SchedulerConfig::default(),
//!     Arc::new(InMemoryTaskManager::new()),
//!     Arc::new(InMemoryJobStore::new()),
//!     ObserverSet::new(),
//! ));
//!
//! scheduler.on_elected(Utc::now()).await?;
//! scheduler
//!     .register_jobs(
//!         vec![Job::schedule_based(
//!             JobRecord::new("nightly-report", "make report", "ops@example.com"),
//!             "R/2024-01-01T02:00:00Z/P1D",
//!             "UTC",
//!         )],
//!         true,
//!         Utc::now(),
//!     )
//!     .await?;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

pub mod config;
pub mod dispatch;
pub mod driver;
pub mod error;
pub mod events;
pub mod graph;
pub mod job;
pub mod leader;
pub mod metrics;
pub mod schedule;
pub mod scheduler;
pub mod stats;
pub mod store;

pub use config::SchedulerConfig;
pub use dispatch::{ScheduledTask, TaskManager};
pub use driver::{ExecutorDriver, TaskState, TaskStatusUpdate};
pub use error::{Error, Result};
pub use events::{JobEvent, JobObserver, ObserverSet};
pub use graph::JobGraph;
pub use job::{DependencyJob, Job, JobRecord, ScheduleJob};
pub use leader::{LeaderCoordinator, LeaderElector};
pub use schedule::ScheduleStream;
pub use scheduler::Scheduler;
