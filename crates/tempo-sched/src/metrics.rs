//! Observability metrics for the scheduler engine.
//!
//! Prometheus-compatible metrics via the `metrics` crate facade.
//!
//! ## Metrics Exported
//!
//! | Metric | Type | Labels | Description |
//! |--------|------|--------|-------------|
//! | `tempo_sched_tasks_total` | Counter | `state` | Task status updates by reported state |
//! | `tempo_sched_job_run_seconds` | Histogram | `job` | Wall time from due instant to completion |
//! | `tempo_sched_iterations_total` | Counter | - | Horizon iterations |
//! | `tempo_sched_iteration_duration_seconds` | Histogram | - | Horizon iteration processing time |
//! | `tempo_sched_active_streams` | Gauge | - | Live schedule streams |
//! | `tempo_sched_retries_total` | Counter | - | One-shot retries scheduled |
//! | `tempo_sched_skips_total` | Counter | - | Missed firings skipped past epsilon |
//! | `tempo_sched_failures_total` | Counter | `terminal` | Failed tasks; `terminal` marks exhausted/disabled |
//!
//! ## Integration
//!
//! Metrics are exposed via the `metrics` crate facade. The service binary
//! installs a Prometheus recorder with `metrics-exporter-prometheus`.

use std::time::{Duration, Instant};

use metrics::{counter, gauge, histogram};

/// Metric names as constants for consistency.
pub mod names {
    /// Counter: Task status updates by reported state.
    pub const TASKS_TOTAL: &str = "tempo_sched_tasks_total";
    /// Histogram: Wall time from due instant to completion in seconds.
    pub const JOB_RUN_SECONDS: &str = "tempo_sched_job_run_seconds";
    /// Counter: Horizon iterations.
    pub const ITERATIONS_TOTAL: &str = "tempo_sched_iterations_total";
    /// Histogram: Horizon iteration processing time in seconds.
    pub const ITERATION_DURATION_SECONDS: &str = "tempo_sched_iteration_duration_seconds";
    /// Gauge: Live schedule streams.
    pub const ACTIVE_STREAMS: &str = "tempo_sched_active_streams";
    /// Counter: One-shot retries scheduled.
    pub const RETRIES_TOTAL: &str = "tempo_sched_retries_total";
    /// Counter: Missed firings skipped past epsilon.
    pub const SKIPS_TOTAL: &str = "tempo_sched_skips_total";
    /// Counter: Failed tasks.
    pub const FAILURES_TOTAL: &str = "tempo_sched_failures_total";
}

/// Label keys used across metrics.
pub mod labels {
    /// Reported task state (running, finished, failed, killed, lost).
    pub const STATE: &str = "state";
    /// Job name.
    pub const JOB: &str = "job";
    /// Whether a failure was terminal (retries exhausted or disabled).
    pub const TERMINAL: &str = "terminal";
}

/// High-level interface for recording scheduler metrics.
///
/// Cheap to clone and share across workers.
#[derive(Debug, Clone, Copy, Default)]
pub struct SchedMetrics;

impl SchedMetrics {
    /// Creates a new metrics recorder.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Records an inbound task status update.
    pub fn record_status(&self, state: &str) {
        counter!(
            names::TASKS_TOTAL,
            labels::STATE => state.to_string(),
        )
        .increment(1);
    }

    /// Records the wall time from a task's due instant to its completion.
    pub fn observe_job_run(&self, job: &str, duration_secs: f64) {
        histogram!(
            names::JOB_RUN_SECONDS,
            labels::JOB => job.to_string(),
        )
        .record(duration_secs);
    }

    /// Records one horizon iteration and its duration.
    pub fn record_iteration(&self, duration: Duration) {
        counter!(names::ITERATIONS_TOTAL).increment(1);
        histogram!(names::ITERATION_DURATION_SECONDS).record(duration.as_secs_f64());
    }

    /// Sets the live stream count gauge.
    #[allow(clippy::cast_precision_loss)] // Gauge values are small
    pub fn set_active_streams(&self, count: usize) {
        gauge!(names::ACTIVE_STREAMS).set(count as f64);
    }

    /// Records a scheduled one-shot retry.
    pub fn record_retry(&self) {
        counter!(names::RETRIES_TOTAL).increment(1);
    }

    /// Records a skipped firing.
    pub fn record_skip(&self) {
        counter!(names::SKIPS_TOTAL).increment(1);
    }

    /// Records a task failure.
    pub fn record_failure(&self, terminal: bool) {
        counter!(
            names::FAILURES_TOTAL,
            labels::TERMINAL => terminal.to_string(),
        )
        .increment(1);
    }
}

/// RAII guard for timing operations.
///
/// Automatically records duration when dropped.
pub struct TimingGuard<F>
where
    F: FnOnce(Duration),
{
    start: Instant,
    on_drop: Option<F>,
}

impl<F> TimingGuard<F>
where
    F: FnOnce(Duration),
{
    /// Creates a timing guard that calls `on_drop` with the elapsed
    /// duration.
    pub fn new(on_drop: F) -> Self {
        Self {
            start: Instant::now(),
            on_drop: Some(on_drop),
        }
    }

    /// Elapsed time since the guard was created.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

impl<F> Drop for TimingGuard<F>
where
    F: FnOnce(Duration),
{
    fn drop(&mut self) {
        if let Some(f) = self.on_drop.take() {
            f(self.start.elapsed());
        }
    }
}
