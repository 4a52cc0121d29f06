//! The structured task identifier used across the scheduler.
//!
//! A task id encodes everything the engine needs to route an asynchronous
//! status update back to its job without consulting any store:
//!
//! ```text
//! tt1:<job-name>:<due-instant-millis>:<attempt>
//! ```
//!
//! The leading segment is a version tag. The parser accepts only the current
//! version; ids minted by older scheduler builds are rejected wholesale so a
//! replica that takes over after an upgrade never misroutes a stale update.
//! Job names are forbidden from containing `:` at registration time, which
//! keeps the format unambiguous.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{Error, Result};

/// The version tag emitted by this build.
pub const TASK_ID_VERSION: &str = "tt1";

/// A unique identifier for one execution attempt of a job.
///
/// Task ids are the sole key used throughout the task lifecycle: the engine
/// mints them when materializing a firing, the resource manager echoes them
/// in status updates, and the history sink keys rows by them.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TaskId {
    job_name: String,
    due_ms: i64,
    attempt: u32,
}

impl TaskId {
    /// Creates a task id for the given job, due instant, and attempt.
    #[must_use]
    pub fn new(job_name: impl Into<String>, due_ms: i64, attempt: u32) -> Self {
        Self {
            job_name: job_name.into(),
            due_ms,
            attempt,
        }
    }

    /// Creates a task id from a due instant rather than raw milliseconds.
    #[must_use]
    pub fn at(job_name: impl Into<String>, due: DateTime<Utc>, attempt: u32) -> Self {
        Self::new(job_name, due.timestamp_millis(), attempt)
    }

    /// The name of the job this task executes.
    #[must_use]
    pub fn job_name(&self) -> &str {
        &self.job_name
    }

    /// The due instant in milliseconds since the Unix epoch.
    #[must_use]
    pub const fn due_ms(&self) -> i64 {
        self.due_ms
    }

    /// The attempt number (0-indexed; retries increment it).
    #[must_use]
    pub const fn attempt(&self) -> u32 {
        self.attempt
    }

    /// The due instant as an absolute UTC time.
    ///
    /// Falls back to the Unix epoch if the encoded millisecond value is out
    /// of chrono's representable range, which cannot happen for ids this
    /// build minted.
    #[must_use]
    pub fn due(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(self.due_ms).unwrap_or_default()
    }

    /// Returns a copy of this id with the attempt number replaced.
    ///
    /// Used by the retry path: a retry is a fresh task for the same firing
    /// with `attempt + 1`.
    #[must_use]
    pub fn with_attempt(&self, attempt: u32) -> Self {
        Self {
            job_name: self.job_name.clone(),
            due_ms: self.due_ms,
            attempt,
        }
    }

    /// Returns true if `raw` carries the current version tag.
    ///
    /// Cheaper than a full parse; used to drop foreign or stale updates
    /// before logging them as parse failures.
    #[must_use]
    pub fn is_current_version(raw: &str) -> bool {
        raw.split(':').next() == Some(TASK_ID_VERSION)
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{TASK_ID_VERSION}:{}:{}:{}",
            self.job_name, self.due_ms, self.attempt
        )
    }
}

impl FromStr for TaskId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let mut parts = s.split(':');

        let version = parts
            .next()
            .ok_or_else(|| Error::invalid_id(format!("empty task id: '{s}'")))?;
        if version != TASK_ID_VERSION {
            return Err(Error::invalid_id(format!(
                "unsupported task id version '{version}' in '{s}'"
            )));
        }

        let (Some(job_name), Some(due_raw), Some(attempt_raw), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(Error::invalid_id(format!(
                "expected 4 colon-delimited segments in '{s}'"
            )));
        };

        if job_name.is_empty() {
            return Err(Error::invalid_id(format!("empty job name in '{s}'")));
        }

        let due_ms = due_raw
            .parse::<i64>()
            .map_err(|e| Error::invalid_id(format!("bad due instant in '{s}': {e}")))?;
        let attempt = attempt_raw
            .parse::<u32>()
            .map_err(|e| Error::invalid_id(format!("bad attempt in '{s}': {e}")))?;

        Ok(Self {
            job_name: job_name.to_string(),
            due_ms,
            attempt,
        })
    }
}

impl Serialize for TaskId {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for TaskId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(D::Error::custom)
    }
}
