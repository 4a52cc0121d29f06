//! Leader election and the leader lifecycle.
//!
//! Multiple scheduler replicas elect a single leader through a coordination
//! service; only the leader drives scheduling. The [`LeaderElector`] trait
//! abstracts the coordination service as a lease: a replica acquires the
//! lease, renews it on a heartbeat, and loses leadership when renewal
//! fails. [`InMemoryLeaderElector`] backs tests; production deployments
//! plug in a real coordination-service client.
//!
//! [`LeaderCoordinator`] drives the lifecycle transitions:
//!
//! - **elected** — hydrate engine state (pending tasks strictly before
//!   jobs), start the run loop, start the resource-manager driver
//! - **defeated** — close the driver, halt scheduling, discard in-memory
//!   state, cancel the run-loop worker
//!
//! Hydration failure on election is fatal: the coordinator surfaces the
//! error and the process exits non-zero.

pub mod memory;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::driver::ExecutorDriver;
use crate::error::{Error, Result};
use crate::scheduler::Scheduler;

pub use memory::InMemoryLeaderElector;

/// Result of a leadership acquisition attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LeadershipResult {
    /// This replica now holds the lease.
    Acquired {
        /// Token that must accompany renewals and the release.
        lease_token: String,
        /// How long the lease lasts without renewal.
        lease_duration: Duration,
    },
    /// Another replica holds the lease.
    NotLeader {
        /// The current leader's instance id, if known.
        current_leader: Option<String>,
    },
}

impl LeadershipResult {
    /// Returns true if leadership was acquired.
    #[must_use]
    pub const fn is_leader(&self) -> bool {
        matches!(self, Self::Acquired { .. })
    }

    /// The lease token, if leadership was acquired.
    #[must_use]
    pub fn lease_token(&self) -> Option<&str> {
        match self {
            Self::Acquired { lease_token, .. } => Some(lease_token),
            Self::NotLeader { .. } => None,
        }
    }
}

/// Result of a lease renewal attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenewalResult {
    /// The lease was extended.
    Renewed,
    /// The lease expired or was taken by another replica.
    Lost,
    /// The token does not match the current lease.
    InvalidToken,
}

impl RenewalResult {
    /// Returns true if the lease was extended.
    #[must_use]
    pub const fn is_renewed(&self) -> bool {
        matches!(self, Self::Renewed)
    }
}

/// The coordination-service seam for leader election.
///
/// One election path per elector; replicas are distinguished by instance
/// id. All methods are `Send + Sync`.
#[async_trait]
pub trait LeaderElector: Send + Sync {
    /// Attempts to acquire leadership for `instance_id`.
    async fn try_acquire(&self, instance_id: &str) -> Result<LeadershipResult>;

    /// Renews the lease identified by `lease_token`.
    async fn renew(&self, lease_token: &str) -> Result<RenewalResult>;

    /// Voluntarily releases the lease. Returns true if this call released
    /// it.
    async fn release(&self, lease_token: &str) -> Result<bool>;

    /// The current leader's instance id, if any.
    async fn current_leader(&self) -> Result<Option<String>>;
}

/// Drives leadership transitions for one scheduler replica.
pub struct LeaderCoordinator {
    scheduler: Arc<Scheduler>,
    elector: Arc<dyn LeaderElector>,
    driver: Arc<dyn ExecutorDriver>,
    instance_id: String,
    poll_interval: Duration,
    shutting_down: AtomicBool,
    run_loop: Mutex<Option<JoinHandle<()>>>,
}

impl LeaderCoordinator {
    /// Creates a coordinator over the given collaborators.
    ///
    /// Instance id and poll interval come from the scheduler's
    /// configuration.
    #[must_use]
    pub fn new(
        scheduler: Arc<Scheduler>,
        elector: Arc<dyn LeaderElector>,
        driver: Arc<dyn ExecutorDriver>,
    ) -> Self {
        let instance_id = scheduler.config().instance_id.clone();
        let poll_interval = scheduler.config().leader_poll_interval;
        Self {
            scheduler,
            elector,
            driver,
            instance_id,
            poll_interval,
            shutting_down: AtomicBool::new(false),
            run_loop: Mutex::new(None),
        }
    }

    /// Runs the election loop until [`LeaderCoordinator::shutdown`] is
    /// called.
    ///
    /// # Errors
    ///
    /// Coordination-service failures and hydration failures are fatal and
    /// propagate; the caller is expected to exit the process non-zero.
    pub async fn run(&self) -> Result<()> {
        let mut lease: Option<String> = None;

        while !self.shutting_down.load(Ordering::SeqCst) {
            match lease {
                None => match self.elector.try_acquire(&self.instance_id).await? {
                    LeadershipResult::Acquired { lease_token, .. } => {
                        lease = Some(lease_token);
                        self.on_elected().await?;
                    }
                    LeadershipResult::NotLeader { current_leader } => {
                        if let Some(leader) = current_leader {
                            tracing::debug!(leader = %leader, "standing by");
                        }
                    }
                },
                Some(ref token) => match self.elector.renew(token).await? {
                    RenewalResult::Renewed => {}
                    RenewalResult::Lost | RenewalResult::InvalidToken => {
                        lease = None;
                        self.on_defeated().await;
                    }
                },
            }
            tokio::time::sleep(self.poll_interval).await;
        }

        // Orderly shutdown: hand the lease back so failover is fast.
        if let Some(token) = lease {
            if let Err(error) = self.elector.release(&token).await {
                warn!(%error, "failed to release lease on shutdown");
            }
            self.on_defeated().await;
        }
        Ok(())
    }

    /// Requests an orderly shutdown of the election loop.
    pub fn shutdown(&self) {
        self.shutting_down.store(true, Ordering::SeqCst);
    }

    /// The current leader's instance id as seen by the coordination
    /// service.
    ///
    /// # Errors
    ///
    /// A coordination-service failure here is fatal.
    pub async fn current_leader(&self) -> Result<Option<String>> {
        self.elector
            .current_leader()
            .await
            .map_err(|e| Error::coordination(format!("leader lookup failed: {e}")))
    }

    async fn on_elected(&self) -> Result<()> {
        info!(instance = %self.instance_id, "elected leader");

        // Hydrate before anything can schedule; any failure aborts.
        self.scheduler.on_elected(Utc::now()).await?;

        let handle = tokio::spawn(Arc::clone(&self.scheduler).run_loop());
        *self.run_loop.lock().await = Some(handle);

        if let Err(error) = self.driver.start().await {
            warn!(%error, "resource-manager driver failed to start");
        }
        Ok(())
    }

    async fn on_defeated(&self) {
        warn!(instance = %self.instance_id, "leadership lost");

        if let Err(error) = self.driver.close().await {
            warn!(%error, "resource-manager driver failed to close");
        }
        self.scheduler.on_defeated().await;
        if let Some(handle) = self.run_loop.lock().await.take() {
            handle.abort();
        }
    }
}
