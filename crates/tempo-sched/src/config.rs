//! Scheduler configuration.
//!
//! Services configure through environment variables, mirroring how the rest
//! of the deployment is wired. Every knob has a production-ready default so
//! a bare process comes up sane.

use std::time::Duration;

use crate::error::{Error, Result};

/// Tunables for the scheduler engine and leader lifecycle.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Look-ahead window during which firings are materialized as tasks.
    pub schedule_horizon: Duration,
    /// Delay before a failed task's one-shot retry.
    pub failure_retry_delay: Duration,
    /// Disable a job after this many consecutive failures; 0 disables the
    /// policy.
    pub disable_after_failures: u64,
    /// Resource-manager failover timeout. A week by default so tasks
    /// enqueued but unacknowledged across a crash still belong to this
    /// framework when a replica comes back.
    pub failover_timeout: Duration,
    /// Lease duration for leader election.
    pub leader_lease: Duration,
    /// How often a leader renews (and a follower retries) its lease.
    pub leader_poll_interval: Duration,
    /// Identifier this replica announces to the coordination service.
    pub instance_id: String,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            schedule_horizon: Duration::from_secs(60),
            failure_retry_delay: Duration::from_secs(60),
            disable_after_failures: 0,
            failover_timeout: Duration::from_secs(7 * 24 * 60 * 60),
            leader_lease: Duration::from_secs(30),
            leader_poll_interval: Duration::from_secs(5),
            instance_id: format!("tempo-{}", std::process::id()),
        }
    }
}

impl SchedulerConfig {
    /// Builds a configuration from `TEMPO_*` environment variables,
    /// falling back to defaults for anything unset.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if a set variable fails to parse.
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        Ok(Self {
            schedule_horizon: env_duration_secs(
                "TEMPO_SCHEDULE_HORIZON_SECS",
                defaults.schedule_horizon,
            )?,
            failure_retry_delay: env_duration_secs(
                "TEMPO_FAILURE_RETRY_DELAY_SECS",
                defaults.failure_retry_delay,
            )?,
            disable_after_failures: env_u64(
                "TEMPO_DISABLE_AFTER_FAILURES",
                defaults.disable_after_failures,
            )?,
            failover_timeout: env_duration_secs(
                "TEMPO_FAILOVER_TIMEOUT_SECS",
                defaults.failover_timeout,
            )?,
            leader_lease: env_duration_secs("TEMPO_LEADER_LEASE_SECS", defaults.leader_lease)?,
            leader_poll_interval: env_duration_secs(
                "TEMPO_LEADER_POLL_INTERVAL_SECS",
                defaults.leader_poll_interval,
            )?,
            instance_id: std::env::var("TEMPO_INSTANCE_ID").unwrap_or(defaults.instance_id),
        })
    }
}

fn env_u64(key: &str, default: u64) -> Result<u64> {
    match std::env::var(key) {
        Ok(raw) => raw
            .parse::<u64>()
            .map_err(|_| Error::configuration(format!("invalid {key}: '{raw}'"))),
        Err(_) => Ok(default),
    }
}

fn env_duration_secs(key: &str, default: Duration) -> Result<Duration> {
    env_u64(key, default.as_secs()).map(Duration::from_secs)
}
