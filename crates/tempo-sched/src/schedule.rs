//! ISO-8601 repeating-interval schedules and their lazy firing streams.
//!
//! A schedule expression has the form `Rn/start-instant/period`:
//!
//! - `Rn` — remaining recurrences; `R` alone means unbounded, `R0` means
//!   exhausted
//! - `start-instant` — the next fire time, RFC 3339 or a zone-less local
//!   time resolved in the job's schedule time zone
//! - `period` — an ISO-8601 duration (`PT1M`, `PT24H`, `P1D`, ...)
//!
//! A [`ScheduleStream`] is the lazy sequence of remaining firings for one
//! schedule-based job: its head parses the current expression and its tail
//! re-serializes the expression with one recurrence consumed and the start
//! advanced by one period.

use chrono::{DateTime, Duration, NaiveDateTime, SecondsFormat, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

/// Remaining recurrences of a schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recurrences {
    /// The schedule repeats forever (`R`).
    Unbounded,
    /// The schedule has this many firings left (`Rn`).
    Finite(u64),
}

impl Recurrences {
    /// Returns true when no firings remain.
    #[must_use]
    pub const fn is_exhausted(&self) -> bool {
        matches!(self, Self::Finite(0))
    }
}

/// The parsed head of a schedule expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedSchedule {
    /// Remaining recurrences.
    pub recurrences: Recurrences,
    /// The next fire time, absolute UTC.
    pub next_fire: DateTime<Utc>,
    /// The interval between firings.
    pub period: Duration,
    /// The period exactly as written, kept for re-serialization.
    period_text: String,
}

/// Parses a schedule expression with its time zone.
///
/// Returns `None` on any syntactic failure: malformed segments, an unknown
/// time zone needed to resolve a zone-less start, or a zero-length period
/// (which could never make progress).
#[must_use]
pub fn parse(expr: &str, time_zone: &str) -> Option<ParsedSchedule> {
    let mut parts = expr.splitn(3, '/');
    let recurrence_part = parts.next()?;
    let start_part = parts.next()?;
    let period_part = parts.next()?;

    let recurrences = parse_recurrences(recurrence_part)?;
    let next_fire = parse_start(start_part, time_zone)?;
    let period = parse_period(period_part)?;
    if period <= Duration::zero() {
        return None;
    }

    Some(ParsedSchedule {
        recurrences,
        next_fire,
        period,
        period_text: period_part.to_string(),
    })
}

fn parse_recurrences(part: &str) -> Option<Recurrences> {
    let rest = part.strip_prefix('R')?;
    if rest.is_empty() {
        return Some(Recurrences::Unbounded);
    }
    rest.parse::<u64>().ok().map(Recurrences::Finite)
}

/// Resolves the start instant to UTC.
///
/// RFC 3339 instants are absolute; zone-less local times are interpreted in
/// the given time zone (UTC when none is configured). Ambiguous local times
/// during a fall-back transition resolve to the earlier instant.
fn parse_start(part: &str, time_zone: &str) -> Option<DateTime<Utc>> {
    if let Ok(instant) = DateTime::parse_from_rfc3339(part) {
        return Some(instant.with_timezone(&Utc));
    }

    let local = NaiveDateTime::parse_from_str(part, "%Y-%m-%dT%H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(part, "%Y-%m-%dT%H:%M:%S%.f"))
        .ok()?;
    let tz: Tz = if time_zone.is_empty() {
        chrono_tz::UTC
    } else {
        time_zone.parse().ok()?
    };
    local
        .and_local_timezone(tz)
        .earliest()
        .map(|t| t.with_timezone(&Utc))
}

/// Parses an ISO-8601 duration into a fixed-length interval.
///
/// Calendar designators normalize to fixed durations: a year is 365 days, a
/// month 30 days, a week 7 days.
fn parse_period(part: &str) -> Option<Duration> {
    let body = part.strip_prefix('P')?;
    if body.is_empty() {
        return None;
    }

    let (date_part, time_part) = match body.split_once('T') {
        Some((date, time)) if !time.is_empty() => (date, time),
        Some(_) => return None,
        None => (body, ""),
    };

    let mut total = Duration::zero();
    for (value, unit) in designators(date_part)? {
        let component = match unit {
            'Y' => Duration::try_days(value.checked_mul(365)?)?,
            'M' => Duration::try_days(value.checked_mul(30)?)?,
            'W' => Duration::try_days(value.checked_mul(7)?)?,
            'D' => Duration::try_days(value)?,
            _ => return None,
        };
        total = total.checked_add(&component)?;
    }
    for (value, unit) in designators(time_part)? {
        let component = match unit {
            'H' => Duration::try_hours(value)?,
            'M' => Duration::try_minutes(value)?,
            'S' => Duration::try_seconds(value)?,
            _ => return None,
        };
        total = total.checked_add(&component)?;
    }
    Some(total)
}

/// Splits `3H30M` into `[(3, 'H'), (30, 'M')]`.
fn designators(part: &str) -> Option<Vec<(i64, char)>> {
    let mut out = Vec::new();
    let mut digits = String::new();
    for c in part.chars() {
        if c.is_ascii_digit() {
            digits.push(c);
        } else {
            if digits.is_empty() {
                return None;
            }
            out.push((digits.parse().ok()?, c));
            digits.clear();
        }
    }
    if digits.is_empty() { Some(out) } else { None }
}

/// The lazy sequence of remaining planned firings for one schedule-based
/// job.
///
/// Immutable: advancing yields a fresh stream via [`ScheduleStream::tail`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleStream {
    schedule: String,
    job_name: String,
    time_zone: String,
}

impl ScheduleStream {
    /// Creates a stream from a schedule expression, job name, and time zone.
    #[must_use]
    pub fn new(
        schedule: impl Into<String>,
        job_name: impl Into<String>,
        time_zone: impl Into<String>,
    ) -> Self {
        Self {
            schedule: schedule.into(),
            job_name: job_name.into(),
            time_zone: time_zone.into(),
        }
    }

    /// The current schedule expression.
    #[must_use]
    pub fn schedule(&self) -> &str {
        &self.schedule
    }

    /// The job this stream belongs to.
    #[must_use]
    pub fn job_name(&self) -> &str {
        &self.job_name
    }

    /// The time zone used to resolve zone-less start instants.
    #[must_use]
    pub fn time_zone(&self) -> &str {
        &self.time_zone
    }

    /// Parses the head of the stream.
    #[must_use]
    pub fn head(&self) -> Option<ParsedSchedule> {
        parse(&self.schedule, &self.time_zone)
    }

    /// Consumes one recurrence: decrements the count by exactly one and
    /// advances the start by exactly one period.
    ///
    /// Returns `None` when the stream is exhausted or its expression does
    /// not parse.
    #[must_use]
    pub fn tail(&self) -> Option<Self> {
        let head = self.head()?;
        let remaining = match head.recurrences {
            Recurrences::Unbounded => "R".to_string(),
            Recurrences::Finite(0) => return None,
            Recurrences::Finite(n) => format!("R{}", n - 1),
        };
        let next_start = (head.next_fire + head.period)
            .to_rfc3339_opts(SecondsFormat::Secs, true);
        Some(Self {
            schedule: format!("{remaining}/{next_start}/{}", head.period_text),
            job_name: self.job_name.clone(),
            time_zone: self.time_zone.clone(),
        })
    }
}
