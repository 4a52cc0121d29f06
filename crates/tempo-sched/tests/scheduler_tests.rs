//! End-to-end scheduling scenarios against in-memory backends.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, TimeZone, Utc};

use tempo_sched::config::SchedulerConfig;
use tempo_sched::dispatch::InMemoryTaskManager;
use tempo_sched::events::{JobEvent, ObserverSet, RecordingObserver};
use tempo_sched::job::{Job, JobRecord};
use tempo_sched::scheduler::Scheduler;
use tempo_sched::stats::{InMemoryHistoryStore, JobStatsSink};
use tempo_sched::store::InMemoryJobStore;
use tempo_sched::{TaskManager, TaskState, TaskStatusUpdate};

struct Harness {
    scheduler: Arc<Scheduler>,
    task_manager: Arc<InMemoryTaskManager>,
    store: Arc<InMemoryJobStore>,
    observer: Arc<RecordingObserver>,
}

async fn harness() -> Harness {
    harness_with(SchedulerConfig::default()).await
}

async fn harness_with(config: SchedulerConfig) -> Harness {
    let task_manager = Arc::new(InMemoryTaskManager::new());
    let store = Arc::new(InMemoryJobStore::new());
    let observer = Arc::new(RecordingObserver::new());
    let mut observers = ObserverSet::new();
    observers.register(observer.clone());

    let scheduler = Arc::new(Scheduler::new(
        config,
        task_manager.clone(),
        store.clone(),
        observers,
    ));
    scheduler
        .on_elected(Utc::now())
        .await
        .expect("hydrating an empty store cannot fail");

    Harness {
        scheduler,
        task_manager,
        store,
        observer,
    }
}

fn schedule_job(name: &str, schedule: &str) -> Job {
    let mut record = JobRecord::new(name, "true", "ops@example.com");
    record.epsilon_seconds = 60;
    Job::schedule_based(record, schedule, "UTC")
}

fn dependency_job(name: &str, parents: &[&str]) -> Job {
    Job::dependency_based(
        JobRecord::new(name, "true", "ops@example.com"),
        parents.iter().map(ToString::to_string).collect(),
    )
}

fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, mo, d, h, mi, s).unwrap()
}

fn finished(task_id: &str) -> TaskStatusUpdate {
    TaskStatusUpdate::new(task_id, TaskState::Finished, "slave-1")
}

fn failed(task_id: &str) -> TaskStatusUpdate {
    TaskStatusUpdate::new(task_id, TaskState::Failed, "slave-1")
}

/// Single schedule, one firing: the task materializes at its due instant,
/// the schedule rewrites to `R0`, the stream is gone, and the finish
/// disables the exhausted job with exactly one `job_disabled`.
#[tokio::test]
async fn single_schedule_single_firing_runs_to_disabled() {
    let h = harness().await;
    let now = at(2024, 1, 1, 0, 0, 0);

    h.scheduler
        .register_jobs(
            vec![schedule_job("report", "R1/2024-01-01T00:00:00Z/PT1M")],
            true,
            now,
        )
        .await
        .unwrap();
    h.scheduler.run_iteration(now).await.unwrap();

    let queued = h.task_manager.queued_tasks().unwrap();
    assert_eq!(queued.len(), 1);
    assert_eq!(queued[0].id.to_string(), "tt1:report:1704067200000:0");

    let job = h.scheduler.lookup_job("report").await.unwrap();
    assert_eq!(
        job.as_schedule().unwrap().schedule,
        "R0/2024-01-01T00:01:00Z/PT1M"
    );
    assert!(h.scheduler.current_streams().await.is_empty());

    h.scheduler
        .handle_finished(finished("tt1:report:1704067200000:0"), None)
        .await;

    let job = h.scheduler.lookup_job("report").await.unwrap();
    assert!(job.record().disabled);
    assert_eq!(job.record().success_count, 1);

    let names = h.observer.event_names();
    assert_eq!(
        names.iter().filter(|n| **n == "job_disabled").count(),
        1,
        "disable is idempotent: exactly one event"
    );
    // The persisted definition reflects the disable.
    assert!(h.store.job("report").unwrap().unwrap().record().disabled);
}

/// Missed past firings: a schedule registered days late skips the stale
/// firings (one `job_skipped` each) and leaves the stream pending on the
/// first future fire time.
#[tokio::test]
async fn missed_past_firings_are_skipped_up_to_the_present() {
    let h = harness().await;
    // Days 1-3 are already stale when the engine first looks.
    let now = at(2020, 1, 3, 0, 2, 0);

    h.scheduler
        .register_jobs(
            vec![schedule_job("daily", "R5/2020-01-01T00:00:00Z/PT24H")],
            false,
            now,
        )
        .await
        .unwrap();
    h.scheduler.run_iteration(now).await.unwrap();

    let skipped: Vec<_> = h
        .observer
        .events()
        .into_iter()
        .filter_map(|event| match event {
            JobEvent::Skipped { fire_time, .. } => Some(fire_time),
            _ => None,
        })
        .collect();
    assert_eq!(
        skipped,
        vec![
            at(2020, 1, 1, 0, 0, 0),
            at(2020, 1, 2, 0, 0, 0),
            at(2020, 1, 3, 0, 0, 0),
        ]
    );
    assert_eq!(h.task_manager.queue_depth().await.unwrap(), 0);

    let streams = h.scheduler.current_streams().await;
    assert_eq!(streams.len(), 1);
    assert_eq!(
        streams[0].head().unwrap().next_fire,
        at(2020, 1, 4, 0, 0, 0)
    );
}

/// Dependency firing: a child with two parents fires only after both
/// complete, at the task date of the releasing completion, and its
/// invocation set clears when the child task starts.
#[tokio::test]
async fn dependency_child_fires_after_all_parents() {
    let h = harness().await;
    let now = at(2024, 1, 1, 0, 0, 0);

    h.scheduler
        .register_jobs(
            vec![
                schedule_job("a", "R/2030-01-01T00:00:00Z/PT1H"),
                schedule_job("b", "R/2030-01-01T00:00:00Z/PT1H"),
                dependency_job("c", &["a", "b"]),
            ],
            false,
            now,
        )
        .await
        .unwrap();

    let task_date = at(2024, 1, 1, 6, 0, 0);
    h.scheduler
        .handle_finished(finished("tt1:a:1704067200000:0"), Some(task_date))
        .await;
    assert_eq!(
        h.task_manager.queue_depth().await.unwrap(),
        0,
        "one parent is not enough"
    );

    h.scheduler
        .handle_finished(finished("tt1:b:1704067200000:0"), Some(task_date))
        .await;
    let queued = h.task_manager.queued_tasks().unwrap();
    assert_eq!(queued.len(), 1);
    assert_eq!(queued[0].job_name(), "c");
    assert_eq!(queued[0].due, task_date);

    // The child task starting clears its invocation set.
    h.scheduler
        .handle_started(TaskStatusUpdate::new(
            queued[0].id.to_string(),
            TaskState::Running,
            "slave-1",
        ))
        .await;

    // A fresh round requires both parents again.
    h.scheduler
        .handle_finished(finished("tt1:a:1704070800000:0"), None)
        .await;
    assert_eq!(h.task_manager.queue_depth().await.unwrap(), 1);
}

/// Retry-then-succeed: a fresh job's first failure schedules one delayed
/// retry with `attempt = 1`; that attempt finishing resets the error
/// streak and stamps `last_success`.
#[tokio::test]
async fn retry_then_succeed_resets_the_error_streak() {
    let mut config = SchedulerConfig::default();
    config.failure_retry_delay = StdDuration::from_secs(30);
    let h = harness_with(config).await;
    let now = at(2024, 1, 1, 0, 0, 0);

    let mut job = schedule_job("flaky", "R/2030-01-01T00:00:00Z/PT1H");
    job.record_mut().retries = 2;
    h.scheduler
        .register_jobs(vec![job], false, now)
        .await
        .unwrap();

    h.scheduler
        .handle_failed(failed("tt1:flaky:1704067200000:0"))
        .await;

    let queued = h.task_manager.queued_tasks().unwrap();
    assert_eq!(queued.len(), 1);
    assert_eq!(queued[0].attempt(), 1);
    let delay = h
        .task_manager
        .time_until_execution(&queued[0].id)
        .await
        .unwrap()
        .unwrap();
    assert!(delay > StdDuration::from_secs(25));
    assert!(delay <= StdDuration::from_secs(30));

    h.scheduler
        .handle_finished(finished(&queued[0].id.to_string()), None)
        .await;

    let job = h.scheduler.lookup_job("flaky").await.unwrap();
    assert_eq!(job.record().errors_since_last_success, 0);
    assert_eq!(job.record().success_count, 1);
    assert!(job.record().last_success.is_some());
}

/// Disable after N failures: with no retries and a disable threshold of
/// three, the first two failures exhaust retries and the third disables.
#[tokio::test]
async fn consecutive_failures_disable_at_the_threshold() {
    let mut config = SchedulerConfig::default();
    config.disable_after_failures = 3;
    let h = harness_with(config).await;
    let now = at(2024, 1, 1, 0, 0, 0);

    h.scheduler
        .register_jobs(
            vec![schedule_job("brittle", "R/2030-01-01T00:00:00Z/PT1H")],
            false,
            now,
        )
        .await
        .unwrap();

    for _ in 0..3 {
        h.scheduler
            .handle_failed(failed("tt1:brittle:1704067200000:0"))
            .await;
    }

    let names = h.observer.event_names();
    assert_eq!(
        names
            .iter()
            .filter(|n| **n == "job_retries_exhausted")
            .count(),
        2
    );
    assert_eq!(names.iter().filter(|n| **n == "job_disabled").count(), 1);

    let job = h.scheduler.lookup_job("brittle").await.unwrap();
    assert!(job.record().disabled);
    assert_eq!(job.record().error_count, 3);
    assert!(
        h.scheduler.current_streams().await.is_empty(),
        "disabled jobs keep no stream"
    );
}

/// Attempt numbers increase monotonically across retries until the budget
/// is spent, then exactly one terminal event fires.
#[tokio::test]
async fn attempts_increase_until_retries_exhaust() {
    let h = harness().await;
    let now = at(2024, 1, 1, 0, 0, 0);

    let mut job = schedule_job("flaky", "R/2030-01-01T00:00:00Z/PT1H");
    job.record_mut().retries = 2;
    h.scheduler
        .register_jobs(vec![job], false, now)
        .await
        .unwrap();

    // Attempt 0 fails -> retry 1. The retry path rewrites no counters, so
    // the guard stays open while the budget lasts.
    h.scheduler
        .handle_failed(failed("tt1:flaky:1704067200000:0"))
        .await;
    let queued = h.task_manager.queued_tasks().unwrap();
    assert_eq!(queued.len(), 1);
    assert_eq!(queued[0].attempt(), 1);
    let retry_1 = queued[0].id.to_string();

    // Attempt 1 fails -> retry 2.
    h.task_manager.flush().await.unwrap();
    h.scheduler.handle_failed(failed(&retry_1)).await;
    let queued = h.task_manager.queued_tasks().unwrap();
    assert_eq!(queued.len(), 1);
    assert_eq!(queued[0].attempt(), 2);
    let retry_2 = queued[0].id.to_string();

    // Attempt 2 == retries: the budget is spent. Exactly one terminal
    // event, and it is exhaustion, not disable.
    h.task_manager.flush().await.unwrap();
    h.scheduler.handle_failed(failed(&retry_2)).await;

    assert_eq!(h.task_manager.queue_depth().await.unwrap(), 0);
    let names = h.observer.event_names();
    assert_eq!(
        names
            .iter()
            .filter(|n| **n == "job_retries_exhausted")
            .count(),
        1
    );
    assert!(!names.contains(&"job_disabled"));
}

/// Element counts on finished status updates of data-processing jobs flow
/// through the observer into the history sink's counter table.
#[tokio::test]
async fn data_processing_elements_reach_the_history_counter() {
    let history = Arc::new(InMemoryHistoryStore::new());
    let mut observers = ObserverSet::new();
    observers.register(Arc::new(JobStatsSink::new(history.clone())));

    let scheduler = Arc::new(Scheduler::new(
        SchedulerConfig::default(),
        Arc::new(InMemoryTaskManager::new()),
        Arc::new(InMemoryJobStore::new()),
        observers,
    ));
    scheduler.on_elected(Utc::now()).await.unwrap();

    let mut job = schedule_job("pipeline", "R/2030-01-01T00:00:00Z/PT1H");
    job.record_mut().data_processing = true;
    scheduler
        .register_jobs(vec![job], false, Utc::now())
        .await
        .unwrap();

    scheduler
        .handle_finished(
            TaskStatusUpdate::new(
                "tt1:pipeline:1704067200000:0",
                TaskState::Finished,
                "slave-1",
            )
            .with_elements_processed(4_096),
            None,
        )
        .await;

    assert_eq!(
        history
            .elements("pipeline", "tt1:pipeline:1704067200000:0")
            .unwrap(),
        4_096
    );
}

/// The engine persists through every mutation: registration, schedule
/// rewrites, counters.
#[tokio::test]
async fn mutations_write_through_to_the_store() {
    let h = harness().await;
    let now = at(2024, 1, 1, 0, 0, 0);

    h.scheduler
        .register_jobs(
            vec![schedule_job("etl", "R2/2024-01-01T00:00:00Z/PT1H")],
            true,
            now,
        )
        .await
        .unwrap();
    assert!(h.store.job("etl").unwrap().is_some());

    h.scheduler.run_iteration(now).await.unwrap();
    assert_eq!(
        h.store.job("etl").unwrap().unwrap().as_schedule().unwrap().schedule,
        "R1/2024-01-01T01:00:00Z/PT1H"
    );
    assert_eq!(h.store.task_count().unwrap(), 1);

    h.scheduler
        .handle_finished(finished("tt1:etl:1704067200000:0"), None)
        .await;
    let stored = h.store.job("etl").unwrap().unwrap();
    assert_eq!(stored.record().success_count, 1);
    assert_eq!(h.store.task_count().unwrap(), 0, "terminal tasks are disposed");
}
