//! Observability infrastructure for tempo.
//!
//! Structured logging with consistent spans. This module provides the
//! initialization helper and span constructors used across all tempo
//! components.

use std::sync::Once;
use tracing::Span;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

static INIT: Once = Once::new();

/// Log output format.
#[derive(Debug, Clone, Copy, Default)]
pub enum LogFormat {
    /// JSON structured logs (for production).
    Json,
    /// Pretty-printed logs (for development).
    #[default]
    Pretty,
}

/// Initializes the logging subsystem.
///
/// Call once at application startup. Safe to call multiple times;
/// subsequent calls are no-ops.
///
/// # Environment Variables
///
/// - `RUST_LOG`: Controls log levels (e.g., `info`, `tempo_sched=debug`)
///
/// # Example
///
/// ```rust
/// use tempo_core::observability::{init_logging, LogFormat};
///
/// init_logging(LogFormat::Pretty);
/// ```
pub fn init_logging(format: LogFormat) {
    INIT.call_once(|| {
        let env_filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        match format {
            LogFormat::Json => {
                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(fmt::layer().json())
                    .init();
            }
            LogFormat::Pretty => {
                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(fmt::layer().pretty())
                    .init();
            }
        }
    });
}

/// Creates a span for scheduler engine operations.
///
/// # Example
///
/// ```rust
/// use tempo_core::observability::scheduler_span;
///
/// let span = scheduler_span("register_jobs", "nightly-report");
/// let _guard = span.enter();
/// // ... mutate engine state
/// ```
#[must_use]
pub fn scheduler_span(operation: &str, job: &str) -> Span {
    tracing::info_span!("scheduler", op = operation, job = job)
}

/// Creates a span for task lifecycle callbacks.
#[must_use]
pub fn task_span(operation: &str, task_id: &str, attempt: u32) -> Span {
    tracing::info_span!("task", op = operation, task_id = task_id, attempt = attempt)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_logging_is_idempotent() {
        init_logging(LogFormat::Pretty);
        init_logging(LogFormat::Pretty);
    }

    #[test]
    fn scheduler_span_creates_span() {
        let span = scheduler_span("register_jobs", "nightly-report");
        let _guard = span.enter();
        tracing::info!("test message in span");
    }

    #[test]
    fn task_span_creates_span() {
        let span = task_span("handle_finished", "tt1:etl:42:0", 0);
        let _guard = span.enter();
        tracing::info!("task message");
    }
}
