//! Job definitions.
//!
//! A job is either **schedule-based** (fires on an ISO-8601 repeating
//! interval) or **dependency-based** (fires when all of its parents have
//! completed a round). Both variants share a common record of attributes and
//! counters; the engine dispatches on the variant. Names are unique across
//! both variants and renaming is unsupported.

use std::collections::BTreeSet;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Attributes and counters shared by both job variants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobRecord {
    /// Unique identifier. Renaming is unsupported; names may not contain `:`
    /// because they are embedded in colon-delimited task ids.
    pub name: String,
    /// The command handed to the resource manager for execution.
    pub command: String,
    /// Contact for the job.
    pub owner: String,
    /// Tolerance for how late a firing may be and still be dispatched.
    #[serde(default)]
    pub epsilon_seconds: u64,
    /// How many times a failed attempt is retried before giving up.
    #[serde(default)]
    pub retries: u32,
    /// Disabled jobs keep their vertex but never fire.
    #[serde(default)]
    pub disabled: bool,
    /// Soft-error jobs propagate to dependents even when they fail.
    #[serde(default)]
    pub soft_error: bool,
    /// High-priority tasks jump the dispatch queue.
    #[serde(default)]
    pub high_priority: bool,
    /// Asynchronous jobs report completion out of band.
    #[serde(rename = "async", default)]
    pub is_async: bool,
    /// Data-processing jobs report per-task element counts to the history
    /// sink's counter table.
    #[serde(default)]
    pub data_processing: bool,
    /// Total successful completions.
    #[serde(default)]
    pub success_count: u64,
    /// Total failed completions.
    #[serde(default)]
    pub error_count: u64,
    /// Consecutive failures since the last success.
    #[serde(default)]
    pub errors_since_last_success: u64,
    /// Wall-clock instant of the last success, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_success: Option<DateTime<Utc>>,
    /// Wall-clock instant of the last failure, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<DateTime<Utc>>,
}

impl JobRecord {
    /// Creates a record with fresh counters and default policy flags.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        command: impl Into<String>,
        owner: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            command: command.into(),
            owner: owner.into(),
            epsilon_seconds: 0,
            retries: 0,
            disabled: false,
            soft_error: false,
            high_priority: false,
            is_async: false,
            data_processing: false,
            success_count: 0,
            error_count: 0,
            errors_since_last_success: 0,
            last_success: None,
            last_error: None,
        }
    }

    /// The epsilon tolerance as a signed duration.
    #[must_use]
    pub fn epsilon(&self) -> Duration {
        Duration::seconds(i64::try_from(self.epsilon_seconds).unwrap_or(i64::MAX))
    }
}

/// A job that fires on an ISO-8601 repeating interval.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleJob {
    /// Shared attributes and counters.
    #[serde(flatten)]
    pub record: JobRecord,
    /// The repeating-interval expression `Rn/start-instant/period`.
    pub schedule: String,
    /// IANA time zone used to resolve zone-less start instants.
    #[serde(default)]
    pub schedule_time_zone: String,
}

/// A job that fires when all of its parents have completed a round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DependencyJob {
    /// Shared attributes and counters.
    #[serde(flatten)]
    pub record: JobRecord,
    /// Names of the jobs this one waits on. Unordered, must resolve to
    /// registered vertices at registration time.
    pub parents: BTreeSet<String>,
}

/// A user-defined unit of work: schedule-based or dependency-based, never
/// both.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Job {
    /// Fires by time.
    ScheduleBased(ScheduleJob),
    /// Fires by dependency.
    DependencyBased(DependencyJob),
}

impl Job {
    /// Convenience constructor for a schedule-based job.
    #[must_use]
    pub fn schedule_based(
        record: JobRecord,
        schedule: impl Into<String>,
        schedule_time_zone: impl Into<String>,
    ) -> Self {
        Self::ScheduleBased(ScheduleJob {
            record,
            schedule: schedule.into(),
            schedule_time_zone: schedule_time_zone.into(),
        })
    }

    /// Convenience constructor for a dependency-based job.
    #[must_use]
    pub fn dependency_based(record: JobRecord, parents: BTreeSet<String>) -> Self {
        Self::DependencyBased(DependencyJob { record, parents })
    }

    /// The job's unique name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.record().name
    }

    /// The shared record of attributes and counters.
    #[must_use]
    pub fn record(&self) -> &JobRecord {
        match self {
            Self::ScheduleBased(job) => &job.record,
            Self::DependencyBased(job) => &job.record,
        }
    }

    /// Mutable access to the shared record.
    pub fn record_mut(&mut self) -> &mut JobRecord {
        match self {
            Self::ScheduleBased(job) => &mut job.record,
            Self::DependencyBased(job) => &mut job.record,
        }
    }

    /// Returns true for the schedule-based variant.
    #[must_use]
    pub const fn is_schedule_based(&self) -> bool {
        matches!(self, Self::ScheduleBased(_))
    }

    /// The schedule-based payload, if this is a schedule-based job.
    #[must_use]
    pub const fn as_schedule(&self) -> Option<&ScheduleJob> {
        match self {
            Self::ScheduleBased(job) => Some(job),
            Self::DependencyBased(_) => None,
        }
    }

    /// The dependency-based payload, if this is a dependency-based job.
    #[must_use]
    pub const fn as_dependency(&self) -> Option<&DependencyJob> {
        match self {
            Self::ScheduleBased(_) => None,
            Self::DependencyBased(job) => Some(job),
        }
    }

    /// Returns a copy with the schedule expression replaced.
    ///
    /// No-op for dependency-based jobs.
    #[must_use]
    pub fn with_schedule(&self, schedule: impl Into<String>) -> Self {
        let mut job = self.clone();
        if let Self::ScheduleBased(ref mut inner) = job {
            inner.schedule = schedule.into();
        }
        job
    }

    /// Returns a copy with success counters advanced to `now`.
    #[must_use]
    pub fn mark_success(&self, now: DateTime<Utc>) -> Self {
        let mut job = self.clone();
        let record = job.record_mut();
        record.success_count += 1;
        record.errors_since_last_success = 0;
        record.last_success = Some(now);
        job
    }

    /// Returns a copy with failure counters advanced to `now`, optionally
    /// disabling the job.
    #[must_use]
    pub fn mark_failure(&self, now: DateTime<Utc>, disable: bool) -> Self {
        let mut job = self.clone();
        let record = job.record_mut();
        record.error_count += 1;
        record.errors_since_last_success += 1;
        record.last_error = Some(now);
        record.disabled = disable;
        job
    }

    /// Validates the job name for use in task ids.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidJob`] if the name is empty or contains `:`.
    pub fn validate_name(&self) -> Result<()> {
        let name = self.name();
        if name.is_empty() {
            return Err(Error::InvalidJob {
                name: name.to_string(),
                message: "name must not be empty".to_string(),
            });
        }
        if name.contains(':') {
            return Err(Error::InvalidJob {
                name: name.to_string(),
                message: "name must not contain ':'".to_string(),
            });
        }
        Ok(())
    }
}
