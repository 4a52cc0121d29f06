//! The scheduler engine.
//!
//! Owns the live set of schedule streams and the job graph, drives the
//! periodic horizon iteration, handles task-status callbacks from the
//! resource-manager driver, enforces the retry/disable policy, and
//! arbitrates every mutation of the graph and the persistence store.
//!
//! ## Locking
//!
//! One coarse monitor (`state`, a `tokio::sync::Mutex`) serializes every
//! mutation of the streams, the graph, and persistence writes. The atomic
//! `running` and `leader` flags are read without the lock. Side effects
//! aimed at external collaborators (task-manager enqueues, observer
//! notifications) are accumulated while the lock is held and issued after
//! release, so the monitor is never held across a call into another
//! service. Sleeps (the run loop's horizon sleep, delayed retries) happen
//! entirely outside the critical section.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use tempo_core::TaskId;

use crate::config::SchedulerConfig;
use crate::dispatch::{ScheduledTask, TaskManager};
use crate::driver::{TaskState, TaskStatusUpdate};
use crate::error::{Error, Result};
use crate::events::{JobEvent, ObserverSet};
use crate::graph::JobGraph;
use crate::job::Job;
use crate::metrics::{SchedMetrics, TimingGuard};
use crate::schedule::ScheduleStream;
use crate::store::JobStore;

/// State guarded by the engine monitor.
#[derive(Debug, Default)]
struct EngineState {
    /// Live streams, one per non-disabled schedule-based job.
    streams: Vec<ScheduleStream>,
    /// The job graph.
    graph: JobGraph,
}

/// Side effects accumulated under the monitor and issued after release.
#[derive(Debug, Default)]
struct SideEffects {
    events: Vec<JobEvent>,
    enqueues: Vec<Enqueue>,
}

#[derive(Debug)]
enum Enqueue {
    /// Queue for dispatch as soon as possible.
    Immediate {
        task: ScheduledTask,
        high_priority: bool,
    },
    /// Queue with delayed visibility.
    Delayed {
        delay: StdDuration,
        task: ScheduledTask,
    },
}

/// The scheduling engine.
pub struct Scheduler {
    state: Mutex<EngineState>,
    running: AtomicBool,
    leader: AtomicBool,
    task_manager: Arc<dyn TaskManager>,
    store: Arc<dyn JobStore>,
    observers: ObserverSet,
    config: SchedulerConfig,
    metrics: SchedMetrics,
}

impl Scheduler {
    /// Creates an engine over the given collaborators.
    ///
    /// The engine starts as a non-leader with the run loop stopped; the
    /// leader lifecycle flips it live.
    #[must_use]
    pub fn new(
        config: SchedulerConfig,
        task_manager: Arc<dyn TaskManager>,
        store: Arc<dyn JobStore>,
        observers: ObserverSet,
    ) -> Self {
        Self {
            state: Mutex::new(EngineState::default()),
            running: AtomicBool::new(false),
            leader: AtomicBool::new(false),
            task_manager,
            store,
            observers,
            config,
            metrics: SchedMetrics::new(),
        }
    }

    /// Returns true while the run loop should keep iterating.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Returns true while this replica holds leadership.
    #[must_use]
    pub fn is_leader(&self) -> bool {
        self.leader.load(Ordering::SeqCst)
    }

    /// The engine configuration.
    #[must_use]
    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Snapshot of the live streams, for gauges and tests.
    pub async fn current_streams(&self) -> Vec<ScheduleStream> {
        self.state.lock().await.streams.clone()
    }

    /// Looks up a job vertex by name.
    pub async fn lookup_job(&self, name: &str) -> Option<Job> {
        self.state.lock().await.graph.lookup_vertex(name).cloned()
    }

    // --- Registration ---

    /// Registers a batch of jobs.
    ///
    /// Vertices are inserted first so parents may arrive in the same batch
    /// as their children; dependency edges and fresh schedule streams
    /// follow. With `persist`, every definition writes through to the
    /// store.
    ///
    /// # Errors
    ///
    /// Refuses with [`Error::NotLeader`] on a non-leader replica. Fails on
    /// invalid names, unresolvable parents, or cycles.
    pub async fn register_jobs(
        &self,
        jobs: Vec<Job>,
        persist: bool,
        now: DateTime<Utc>,
    ) -> Result<()> {
        if !self.is_leader() {
            return Err(Error::NotLeader {
                operation: "register_jobs",
            });
        }

        let mut effects = SideEffects::default();
        {
            let mut state = self.state.lock().await;

            for job in &jobs {
                job.validate_name()?;
            }
            for job in &jobs {
                state.graph.add_vertex(job.clone())?;
            }
            for job in &jobs {
                if let Job::DependencyBased(dep) = job {
                    for parent in &dep.parents {
                        if state.graph.lookup_vertex(parent).is_none() {
                            return Err(Error::UnresolvableParent {
                                job: job.name().to_string(),
                                parent: parent.clone(),
                            });
                        }
                        state.graph.add_dependency(parent, job.name())?;
                    }
                }
            }

            for job in &jobs {
                if persist {
                    self.persist_job_logged(job).await;
                }
                if let Job::ScheduleBased(schedule_job) = job {
                    if !schedule_job.record.disabled {
                        Self::add_schedule(
                            &mut state.streams,
                            ScheduleStream::new(
                                schedule_job.schedule.clone(),
                                schedule_job.record.name.clone(),
                                schedule_job.schedule_time_zone.clone(),
                            ),
                        );
                    }
                }
                info!(job = job.name(), "job registered");
                effects.events.push(JobEvent::Registered { job: job.clone() });
            }
            debug!(%now, jobs = state.graph.len(), "registration complete");
        }
        self.apply(effects).await;
        Ok(())
    }

    /// Replaces a job definition in place.
    ///
    /// For a schedule-based replacement the old stream is dropped, a fresh
    /// stream is built from the new expression (unless disabled), and one
    /// horizon iteration runs so imminent firings materialize immediately.
    ///
    /// # Errors
    ///
    /// Fails on a rename attempt or an unknown vertex.
    pub async fn update_job(&self, old: &Job, new: Job) -> Result<()> {
        let now = Utc::now();
        let mut effects = SideEffects::default();
        {
            let mut state = self.state.lock().await;
            self.update_job_locked(&mut state, old, new, now, &mut effects)
                .await?;
        }
        self.apply(effects).await;
        Ok(())
    }

    async fn update_job_locked(
        &self,
        state: &mut EngineState,
        old: &Job,
        new: Job,
        now: DateTime<Utc>,
        effects: &mut SideEffects,
    ) -> Result<()> {
        if old.name() != new.name() {
            return Err(Error::RenameUnsupported {
                from: old.name().to_string(),
                to: new.name().to_string(),
            });
        }
        state.graph.replace_vertex(old, new.clone())?;

        if let Job::ScheduleBased(ref schedule_job) = new {
            let name = schedule_job.record.name.clone();
            state.streams.retain(|s| s.job_name() != name);
            if !schedule_job.record.disabled {
                Self::add_schedule(
                    &mut state.streams,
                    ScheduleStream::new(
                        schedule_job.schedule.clone(),
                        name,
                        schedule_job.schedule_time_zone.clone(),
                    ),
                );
            }
            self.persist_job_logged(&new).await;
            if !schedule_job.record.disabled {
                self.iterate_locked(now, state, effects).await?;
            }
        } else {
            self.persist_job_logged(&new).await;
        }
        Ok(())
    }

    /// Deregisters a job: dependent children with more than one parent are
    /// rewritten without it, the vertex and its stream are removed,
    /// in-flight tasks are cancelled, and the store entry is deleted when
    /// `persist` is set.
    ///
    /// # Errors
    ///
    /// Refuses with [`Error::NotLeader`] on a non-leader replica.
    pub async fn deregister_job(&self, job: &Job, persist: bool) -> Result<()> {
        if !self.is_leader() {
            return Err(Error::NotLeader {
                operation: "deregister_job",
            });
        }

        let now = Utc::now();
        let name = job.name().to_string();
        let mut effects = SideEffects::default();
        {
            let mut state = self.state.lock().await;

            for child_name in state.graph.children(&name) {
                let Some(Job::DependencyBased(dep)) =
                    state.graph.lookup_vertex(&child_name).cloned()
                else {
                    continue;
                };
                if dep.parents.len() > 1 {
                    let mut rewritten = dep.clone();
                    rewritten.parents.remove(&name);
                    self.update_job_locked(
                        &mut state,
                        &Job::DependencyBased(dep),
                        Job::DependencyBased(rewritten),
                        now,
                        &mut effects,
                    )
                    .await?;
                }
            }

            state.graph.remove_vertex(&name);
            state.streams.retain(|s| s.job_name() != name);
            if let Err(error) = self.store.remove_tasks_for_job(&name).await {
                warn!(job = %name, %error, "failed to remove pending tasks from store");
            }
            if persist {
                if let Err(error) = self.store.remove_job(&name).await {
                    warn!(job = %name, %error, "failed to remove job from store");
                }
            }
            info!(job = %name, "job removed");
            effects.events.push(JobEvent::Removed { job: job.clone() });
        }

        if let Err(error) = self.task_manager.cancel_tasks(&name).await {
            warn!(job = %name, %error, "failed to cancel queued tasks");
        }
        self.apply(effects).await;
        Ok(())
    }

    /// Replaces a job vertex and persists the replacement, with no stream
    /// side effects.
    ///
    /// # Errors
    ///
    /// Fails on a rename attempt or an unknown vertex.
    pub async fn replace_job(&self, old: &Job, new: Job) -> Result<()> {
        let mut state = self.state.lock().await;
        state.graph.replace_vertex(old, new.clone())?;
        self.persist_job_logged(&new).await;
        Ok(())
    }

    /// Clears streams and graph; with `purge_queue`, also flushes the task
    /// manager.
    pub async fn reset(&self, purge_queue: bool) {
        {
            let mut state = self.state.lock().await;
            state.streams.clear();
            state.graph.reset();
        }
        if purge_queue {
            if let Err(error) = self.task_manager.flush().await {
                warn!(%error, "failed to flush task manager");
            }
        }
    }

    /// Inserts a stream, replacing any existing stream for the same job so
    /// at most one stream per job survives.
    fn add_schedule(streams: &mut Vec<ScheduleStream>, stream: ScheduleStream) {
        streams.retain(|s| s.job_name() != stream.job_name());
        streams.push(stream);
    }

    // --- Horizon iteration ---

    /// Runs one horizon iteration against `now`.
    ///
    /// Every stream is advanced against the same instant, so schedule
    /// rewrites and task enqueues are mutually consistent.
    ///
    /// # Errors
    ///
    /// Propagates invariant violations; transient store failures are
    /// logged and retried on the next iteration.
    pub async fn run_iteration(&self, now: DateTime<Utc>) -> Result<()> {
        let mut effects = SideEffects::default();
        {
            let mut state = self.state.lock().await;
            self.iterate_locked(now, &mut state, &mut effects).await?;
        }
        self.apply(effects).await;
        Ok(())
    }

    async fn iterate_locked(
        &self,
        now: DateTime<Utc>,
        state: &mut EngineState,
        effects: &mut SideEffects,
    ) -> Result<()> {
        let metrics = self.metrics;
        let _timer = TimingGuard::new(move |elapsed| metrics.record_iteration(elapsed));

        let streams = std::mem::take(&mut state.streams);
        let mut survivors = Vec::with_capacity(streams.len());
        for stream in streams {
            if let Some(remaining) = self
                .advance_stream(now, stream, &mut state.graph, effects)
                .await?
            {
                survivors.push(remaining);
            }
        }
        state.streams = survivors;
        self.metrics.set_active_streams(state.streams.len());
        Ok(())
    }

    /// Advances one stream until it produces no task or is exhausted.
    ///
    /// Each produced task is persisted, queued with a delay of
    /// `due - now` (clamped non-negative), and the job's schedule field is
    /// rewritten to the tail's head expression.
    async fn advance_stream(
        &self,
        now: DateTime<Utc>,
        stream: ScheduleStream,
        graph: &mut JobGraph,
        effects: &mut SideEffects,
    ) -> Result<Option<ScheduleStream>> {
        let mut current = stream;
        loop {
            let (task, next_stream) = self.next(now, current, graph, effects);
            let Some(task) = task else {
                return Ok(next_stream);
            };

            if let Some(ref tail) = next_stream {
                if let Some(job) = graph.lookup_vertex(task.job_name()).cloned() {
                    let rewritten = job.with_schedule(tail.schedule());
                    graph.replace_vertex(&job, rewritten.clone())?;
                    self.persist_job_logged(&rewritten).await;
                }
            }

            if let Err(error) = self.store.persist_task(&task).await {
                warn!(task_id = %task.id, %error, "failed to persist task");
            }
            let delay = (task.due - now).to_std().unwrap_or(StdDuration::ZERO);
            debug!(task_id = %task.id, delay_secs = delay.as_secs(), "task materialized");
            effects.enqueues.push(Enqueue::Delayed { delay, task });

            match next_stream {
                Some(tail) => current = tail,
                None => return Ok(None),
            }
        }
    }

    /// The decision kernel: what one stream does against `now`.
    ///
    /// Returns the task to materialize (if any) and the surviving stream
    /// (if any). Missed firings outside the epsilon window are skipped
    /// here, consuming recurrences until the window is reached.
    fn next(
        &self,
        now: DateTime<Utc>,
        stream: ScheduleStream,
        graph: &JobGraph,
        effects: &mut SideEffects,
    ) -> (Option<ScheduledTask>, Option<ScheduleStream>) {
        let mut stream = stream;
        loop {
            let Some(job) = graph.lookup_vertex(stream.job_name()) else {
                debug!(job = stream.job_name(), "stream for unknown job forgotten");
                return (None, None);
            };
            let Some(head) = stream.head() else {
                warn!(
                    job = stream.job_name(),
                    schedule = stream.schedule(),
                    "unparseable schedule; keeping stream"
                );
                return (None, Some(stream));
            };
            if head.recurrences.is_exhausted() {
                // Vertex removal is deferred: a pending task may still fail
                // and needs its job.
                debug!(job = stream.job_name(), "recurrences exhausted; dropping stream");
                return (None, None);
            }

            let window_begin = now - job.record().epsilon();
            let window_end = now + self.horizon();
            if head.next_fire > window_begin && head.next_fire < window_end {
                let task = ScheduledTask::new(job.clone(), head.next_fire, 0);
                return (Some(task), stream.tail());
            } else if head.next_fire >= now {
                return (None, Some(stream));
            }

            // A missed firing, older than the epsilon tolerance.
            info!(
                job = stream.job_name(),
                fire_time = %head.next_fire,
                "firing skipped past epsilon"
            );
            self.metrics.record_skip();
            effects.events.push(JobEvent::Skipped {
                job: job.clone(),
                fire_time: head.next_fire,
            });
            match stream.tail() {
                Some(tail) => stream = tail,
                None => return (None, None),
            }
        }
    }

    /// The run loop: iterate, then sleep for exactly the schedule horizon.
    ///
    /// Iteration and sleep alternate; there is no other timer. The sleep
    /// happens outside the monitor.
    pub async fn run_loop(self: Arc<Self>) {
        while self.is_running() {
            if let Err(error) = self.run_iteration(Utc::now()).await {
                warn!(%error, "horizon iteration failed");
            }
            tokio::time::sleep(self.config.schedule_horizon).await;
        }
    }

    // --- Task lifecycle callbacks ---

    /// Routes an inbound status update to the matching handler.
    ///
    /// Lost tasks are treated as failures.
    pub async fn handle_status(&self, status: TaskStatusUpdate) {
        match status.state {
            TaskState::Running => self.handle_started(status).await,
            TaskState::Finished => self.handle_finished(status, None).await,
            TaskState::Failed | TaskState::Lost => self.handle_failed(status).await,
            TaskState::Killed => self.handle_killed(status).await,
        }
    }

    /// Parses a task id, dropping the update silently on version or format
    /// mismatch.
    fn parse_task_id(status: &TaskStatusUpdate) -> Option<TaskId> {
        match status.task_id.parse::<TaskId>() {
            Ok(id) => Some(id),
            Err(error) => {
                debug!(task_id = %status.task_id, %error, "dropping update with invalid task id");
                None
            }
        }
    }

    /// Handles a task that started executing on a worker.
    pub async fn handle_started(&self, status: TaskStatusUpdate) {
        self.metrics.record_status("running");
        let Some(id) = Self::parse_task_id(&status) else {
            return;
        };

        let mut effects = SideEffects::default();
        {
            let mut state = self.state.lock().await;
            let Some(job) = state.graph.lookup_vertex(id.job_name()).cloned() else {
                debug!(job = id.job_name(), "started update for unknown job dropped");
                return;
            };
            if !job.is_schedule_based() {
                state.graph.reset_dependency_invocations(job.name());
            }
            effects.events.push(JobEvent::Started {
                job,
                status,
                attempt: id.attempt(),
            });
        }
        self.apply(effects).await;
    }

    /// Handles a task that finished successfully.
    ///
    /// Records latency, advances success counters, replaces and persists
    /// the job, processes dependent children against `task_date` (default
    /// now), and disables a schedule-based job whose recurrences are
    /// exhausted.
    pub async fn handle_finished(
        &self,
        status: TaskStatusUpdate,
        task_date: Option<DateTime<Utc>>,
    ) {
        self.metrics.record_status("finished");
        let Some(id) = Self::parse_task_id(&status) else {
            return;
        };
        let now = Utc::now();

        let mut effects = SideEffects::default();
        {
            let mut state = self.state.lock().await;
            let Some(job) = state.graph.lookup_vertex(id.job_name()).cloned() else {
                debug!(job = id.job_name(), "finished update for unknown job dropped");
                return;
            };

            let elapsed = (now - id.due()).num_milliseconds().max(0);
            #[allow(clippy::cast_precision_loss)]
            self.metrics
                .observe_job_run(job.name(), elapsed as f64 / 1000.0);

            let updated = job.mark_success(now);
            if let Err(error) = state.graph.replace_vertex(&job, updated.clone()) {
                warn!(job = job.name(), %error, "failed to record success");
                return;
            }
            self.persist_job_logged(&updated).await;
            if let Err(error) = self.store.remove_task(&id).await {
                warn!(task_id = %id, %error, "failed to remove completed task");
            }
            effects.events.push(JobEvent::Finished {
                job: updated.clone(),
                task_id: id.clone(),
                status,
                attempt: id.attempt(),
            });

            self.process_dependencies_locked(
                &mut state,
                updated.name(),
                task_date.unwrap_or(now),
                &mut effects,
            )
            .await;

            if let Job::ScheduleBased(ref schedule_job) = updated {
                let exhausted = crate::schedule::parse(
                    &schedule_job.schedule,
                    &schedule_job.schedule_time_zone,
                )
                .is_some_and(|parsed| parsed.recurrences.is_exhausted());
                if exhausted && !schedule_job.record.disabled {
                    let mut disabled = updated.clone();
                    disabled.record_mut().disabled = true;
                    if state.graph.replace_vertex(&updated, disabled.clone()).is_ok() {
                        self.persist_job_logged(&disabled).await;
                        effects.events.push(JobEvent::Disabled {
                            job: disabled,
                            reason: "schedule recurrences exhausted".to_string(),
                        });
                    }
                }
            }
        }
        self.apply(effects).await;
    }

    /// Handles a failed (or lost) task, applying the retry/disable policy.
    pub async fn handle_failed(&self, status: TaskStatusUpdate) {
        self.metrics.record_status("failed");
        let Some(id) = Self::parse_task_id(&status) else {
            return;
        };
        let now = Utc::now();

        let mut effects = SideEffects::default();
        {
            let mut state = self.state.lock().await;
            let Some(job) = state.graph.lookup_vertex(id.job_name()).cloned() else {
                debug!(job = id.job_name(), "failed update for unknown job dropped");
                return;
            };

            effects.events.push(JobEvent::Failed {
                job: Some(job.clone()),
                job_name: job.name().to_string(),
                status,
                attempt: id.attempt(),
            });
            if let Err(error) = self.store.remove_task(&id).await {
                warn!(task_id = %id, %error, "failed to remove failed task");
            }

            let record = job.record();
            let has_attempts_left = id.attempt() < record.retries;
            let had_recent_success = match (record.last_error, record.last_success) {
                (Some(last_error), Some(last_success)) => last_success >= last_error,
                _ => false,
            };

            if has_attempts_left && (record.last_error.is_none() || had_recent_success) {
                let due = now + self.retry_delay();
                let retry = ScheduledTask::new(job.clone(), due, id.attempt() + 1);
                if let Err(error) = self.store.persist_task(&retry).await {
                    warn!(task_id = %retry.id, %error, "failed to persist retry task");
                }
                info!(
                    job = job.name(),
                    attempt = retry.attempt(),
                    "retry scheduled"
                );
                self.metrics.record_retry();
                self.metrics.record_failure(false);
                effects.enqueues.push(Enqueue::Delayed {
                    delay: self.config.failure_retry_delay,
                    task: retry,
                });
            } else {
                let disable = self.config.disable_after_failures > 0
                    && record.errors_since_last_success + 1 >= self.config.disable_after_failures;
                let updated = job.mark_failure(now, disable);
                if let Err(error) = self
                    .update_job_locked(&mut state, &job, updated.clone(), now, &mut effects)
                    .await
                {
                    warn!(job = job.name(), %error, "failed to record failure");
                    return;
                }

                if record.soft_error {
                    self.process_dependencies_locked(&mut state, updated.name(), now, &mut effects)
                        .await;
                }

                if disable {
                    effects.events.push(JobEvent::Disabled {
                        job: updated,
                        reason: format!(
                            "{} consecutive failures",
                            record.errors_since_last_success + 1
                        ),
                    });
                } else {
                    effects.events.push(JobEvent::RetriesExhausted {
                        job: updated,
                        attempt: id.attempt(),
                    });
                }
                self.metrics.record_failure(true);
            }
        }
        self.apply(effects).await;
    }

    /// Handles a killed task: observed, never acted on.
    pub async fn handle_killed(&self, status: TaskStatusUpdate) {
        self.metrics.record_status("killed");
        let Some(id) = Self::parse_task_id(&status) else {
            return;
        };

        let job = self.lookup_job(id.job_name()).await;
        self.observers
            .notify(&JobEvent::Failed {
                job,
                job_name: id.job_name().to_string(),
                status,
                attempt: id.attempt(),
            })
            .await;
    }

    /// Enqueues every executable, non-disabled child of `parent` at
    /// `task_date` with the child's own priority flag.
    async fn process_dependencies_locked(
        &self,
        state: &mut EngineState,
        parent: &str,
        task_date: DateTime<Utc>,
        effects: &mut SideEffects,
    ) {
        for child_name in state.graph.executable_children(parent) {
            let Some(child) = state.graph.lookup_vertex(&child_name).cloned() else {
                continue;
            };
            if child.record().disabled {
                continue;
            }
            let task = ScheduledTask::new(child.clone(), task_date, 0);
            if let Err(error) = self.store.persist_task(&task).await {
                warn!(task_id = %task.id, %error, "failed to persist dependent task");
            }
            debug!(job = %child_name, parent = %parent, "dependent job released");
            effects.enqueues.push(Enqueue::Immediate {
                task,
                high_priority: child.record().high_priority,
            });
        }
    }

    // --- Leader lifecycle hooks ---

    /// Called on election: marks this replica live and hydrates state.
    ///
    /// Pending tasks load strictly before jobs so a due firing cannot be
    /// re-materialized ahead of its restored pending-task state.
    ///
    /// # Errors
    ///
    /// Any load failure is a [`Error::Hydration`]; callers must treat it
    /// as fatal for the process.
    pub async fn on_elected(&self, now: DateTime<Utc>) -> Result<()> {
        self.leader.store(true, Ordering::SeqCst);
        self.running.store(true, Ordering::SeqCst);

        let tasks = self
            .store
            .load_tasks()
            .await
            .map_err(|e| Error::hydration(format!("loading pending tasks: {e}")))?;
        let task_count = tasks.len();
        for task in tasks {
            let delay = (task.due - now).to_std().unwrap_or(StdDuration::ZERO);
            self.task_manager
                .schedule(delay, task)
                .await
                .map_err(|e| Error::hydration(format!("restoring pending task: {e}")))?;
        }

        let jobs = self
            .store
            .load_jobs()
            .await
            .map_err(|e| Error::hydration(format!("loading jobs: {e}")))?;
        let job_count = jobs.len();
        self.register_jobs(jobs, false, now)
            .await
            .map_err(|e| Error::hydration(format!("registering loaded jobs: {e}")))?;

        info!(jobs = job_count, pending_tasks = task_count, "state hydrated");
        Ok(())
    }

    /// Called on defeat: halts scheduling and discards in-memory state,
    /// to be rebuilt on a future election.
    pub async fn on_defeated(&self) {
        self.running.store(false, Ordering::SeqCst);
        self.leader.store(false, Ordering::SeqCst);
        let mut state = self.state.lock().await;
        state.streams.clear();
        state.graph.reset();
        info!("scheduling halted; in-memory state discarded");
    }

    // --- Internals ---

    fn horizon(&self) -> Duration {
        Duration::from_std(self.config.schedule_horizon).unwrap_or_else(|_| Duration::seconds(60))
    }

    fn retry_delay(&self) -> Duration {
        Duration::from_std(self.config.failure_retry_delay)
            .unwrap_or_else(|_| Duration::seconds(60))
    }

    /// Write-through with the transient-store policy: log and retry on
    /// next use rather than failing the operation.
    async fn persist_job_logged(&self, job: &Job) {
        if let Err(error) = self.store.persist_job(job).await {
            warn!(job = job.name(), %error, "failed to persist job");
        }
    }

    /// Issues accumulated side effects outside the monitor.
    async fn apply(&self, effects: SideEffects) {
        for enqueue in effects.enqueues {
            let result = match enqueue {
                Enqueue::Immediate {
                    task,
                    high_priority,
                } => self.task_manager.enqueue(task, high_priority).await,
                Enqueue::Delayed { delay, task } => self.task_manager.schedule(delay, task).await,
            };
            if let Err(error) = result {
                warn!(%error, "task manager rejected task");
            }
        }
        for event in effects.events {
            self.observers.notify(&event).await;
        }
    }
}
