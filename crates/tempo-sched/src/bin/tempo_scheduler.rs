//! The tempo scheduler service.
//!
//! Wires configuration, logging, and metrics around the engine and runs
//! the leader election loop until interrupted. Exits non-zero on
//! unrecoverable hydration failure or coordination-service I/O failure.
//!
//! This binary wires in-memory backends for the store, task manager,
//! history sink, and elector; a production deployment substitutes real
//! clients behind the same traits.

use std::net::SocketAddr;
use std::sync::Arc;

use metrics_exporter_prometheus::PrometheusBuilder;

use tempo_core::observability::{LogFormat, init_logging};
use tempo_sched::config::SchedulerConfig;
use tempo_sched::dispatch::InMemoryTaskManager;
use tempo_sched::driver::NoopDriver;
use tempo_sched::error::{Error, Result};
use tempo_sched::events::ObserverSet;
use tempo_sched::leader::{InMemoryLeaderElector, LeaderCoordinator};
use tempo_sched::scheduler::Scheduler;
use tempo_sched::stats::{InMemoryHistoryStore, JobStatsSink};
use tempo_sched::store::InMemoryJobStore;

fn log_format_from_env() -> LogFormat {
    match std::env::var("TEMPO_LOG_FORMAT") {
        Ok(value) if value.eq_ignore_ascii_case("json") => LogFormat::Json,
        _ => LogFormat::Pretty,
    }
}

fn resolve_metrics_port() -> Result<u16> {
    match std::env::var("TEMPO_METRICS_PORT") {
        Ok(port) => port
            .parse::<u16>()
            .map_err(|_| Error::configuration("invalid TEMPO_METRICS_PORT")),
        Err(_) => Ok(9090),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging(log_format_from_env());

    let config = SchedulerConfig::from_env()?;
    let metrics_port = resolve_metrics_port()?;
    PrometheusBuilder::new()
        .with_http_listener(SocketAddr::from(([0, 0, 0, 0], metrics_port)))
        .install()
        .map_err(|e| Error::configuration(format!("failed to install metrics exporter: {e}")))?;

    let history = Arc::new(InMemoryHistoryStore::new());
    let mut observers = ObserverSet::new();
    observers.register(Arc::new(JobStatsSink::new(history)));

    let lease = config.leader_lease;
    let scheduler = Arc::new(Scheduler::new(
        config,
        Arc::new(InMemoryTaskManager::new()),
        Arc::new(InMemoryJobStore::new()),
        observers,
    ));

    let coordinator = Arc::new(LeaderCoordinator::new(
        scheduler,
        Arc::new(InMemoryLeaderElector::new(lease)),
        Arc::new(NoopDriver::new()),
    ));

    let shutdown = {
        let coordinator = Arc::clone(&coordinator);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("interrupt received; shutting down");
                coordinator.shutdown();
            }
        })
    };

    let result = coordinator.run().await;
    shutdown.abort();
    result
}
