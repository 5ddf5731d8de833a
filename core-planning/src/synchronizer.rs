//! # Synchronizer
//!
//! Keeps the solver's model in step with the external runtime.
//!
//! Two actions are driven through an action register:
//!
//! - **Init solver executor** (cold start): waits for any previous solver run
//!   to stop, pulls every open task and the user directory, builds a fresh
//!   solution and starts the solver. Retried after the sync interval while
//!   the pull fails or returns no tasks.
//! - **Synchronize solution**: polls tasks modified since the last window,
//!   refreshes the user directory when due and diffs the result against the
//!   current solution. Non-empty change sets are reported to the handler;
//!   otherwise the window advances and the poll is repeated after the sync
//!   interval, until the optional unchanged-period timeout fires.
//!
//! Both actions are armed only while the worker is `STOPPED`. The worker
//! returns to `STOPPED` before it reports a result, so the handler may arm
//! the next action right away.

use crate::changes::ChangeSetBuilder;
use crate::context::SyncContext;
use crate::error::Result;
use crate::lifecycle::{WorkerLifecycle, WorkerStatus};
use crate::solution_builder::SolutionBuilder;
use crate::solver_runner::SolverRunner;
use bridge_traits::{Clock, TaskQuery, TaskRuntime, UserSystem};
use chrono::{DateTime, TimeDelta, Timelike, Utc};
use core_async::sync::Notify;
use core_async::time::{sleep_or_cancel, Duration};
use core_model::{ChangeCommand, ExternalTaskUpdate, ExternalUser, Solution};
use core_runtime::PlannerConfig;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, instrument, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncAction {
    InitSolverExecutor,
    SynchronizeSolution,
}

#[derive(Debug)]
pub enum SynchronizerResult {
    /// A change set ready for the solver, marker first
    Changes(Vec<ChangeCommand>),
    /// Nothing changed during the requested unchanged period
    UnchangedPeriodTimeout,
}

impl SynchronizerResult {
    pub fn has_changes(&self) -> bool {
        matches!(self, SynchronizerResult::Changes(_))
    }
}

pub type SynchronizerHandler = Arc<dyn Fn(SynchronizerResult) + Send + Sync>;

struct SyncRequest {
    solution: Arc<Solution>,
    from: DateTime<Utc>,
    unchanged_deadline: Option<DateTime<Utc>>,
}

#[derive(Default)]
struct SyncState {
    action: Option<SyncAction>,
    request: Option<SyncRequest>,
    /// Last directory pull, used to resolve task owners
    users: Vec<ExternalUser>,
    next_users_sync: Option<DateTime<Utc>>,
}

type Step = (Option<SyncAction>, Option<SynchronizerResult>);

pub struct Synchronizer {
    lifecycle: WorkerLifecycle,
    solver: Arc<SolverRunner>,
    runtime: Arc<dyn TaskRuntime>,
    user_system: Arc<dyn UserSystem>,
    context: Arc<SyncContext>,
    clock: Arc<dyn Clock>,
    sync_interval: Duration,
    users_sync_interval: Duration,
    state: Mutex<SyncState>,
    permit: Notify,
    handler: SynchronizerHandler,
}

impl Synchronizer {
    pub fn new(
        solver: Arc<SolverRunner>,
        runtime: Arc<dyn TaskRuntime>,
        user_system: Arc<dyn UserSystem>,
        context: Arc<SyncContext>,
        clock: Arc<dyn Clock>,
        config: &PlannerConfig,
        handler: SynchronizerHandler,
    ) -> Self {
        let state = SyncState {
            next_users_sync: add_duration(clock.now(), config.users_sync_interval),
            ..SyncState::default()
        };
        Self {
            lifecycle: WorkerLifecycle::new("synchronizer"),
            solver,
            runtime,
            user_system,
            context,
            clock,
            sync_interval: config.sync_interval,
            users_sync_interval: config.users_sync_interval,
            state: Mutex::new(state),
            permit: Notify::new(),
            handler,
        }
    }

    /// Arms a cold start.
    pub fn init_solver_executor(&self) -> Result<()> {
        self.lifecycle
            .transition(WorkerStatus::Stopped, WorkerStatus::Starting)?;
        self.state().action = Some(SyncAction::InitSolverExecutor);
        debug!("Cold start armed");
        self.permit.notify_one();
        Ok(())
    }

    /// Arms incremental polling of changes made since `from`.
    ///
    /// A non-zero `unchanged_period` makes the worker report
    /// [`SynchronizerResult::UnchangedPeriodTimeout`] once that much time
    /// passed without any change.
    pub fn synchronize_solution(
        &self,
        solution: Arc<Solution>,
        from: DateTime<Utc>,
        unchanged_period: Duration,
    ) -> Result<()> {
        self.lifecycle
            .transition(WorkerStatus::Stopped, WorkerStatus::Starting)?;
        let unchanged_deadline = if unchanged_period.is_zero() {
            None
        } else {
            add_duration(self.clock.now(), unchanged_period)
        };
        {
            let mut state = self.state();
            state.request = Some(SyncRequest {
                solution,
                from,
                unchanged_deadline,
            });
            state.action = Some(SyncAction::SynchronizeSolution);
        }
        debug!(%from, ?unchanged_period, "Synchronization armed");
        self.permit.notify_one();
        Ok(())
    }

    /// The action the worker will run next, if any.
    pub fn current_action(&self) -> Option<SyncAction> {
        self.state().action
    }

    pub fn status(&self) -> WorkerStatus {
        self.lifecycle.status()
    }

    pub fn is_alive(&self) -> bool {
        self.lifecycle.is_alive()
    }

    pub fn destroy(&self) -> bool {
        self.lifecycle.destroy()
    }

    /// Worker loop. Returns once the synchronizer is destroyed.
    #[instrument(skip(self), fields(worker = self.lifecycle.name()))]
    pub async fn run(self: Arc<Self>) {
        'worker: while self.lifecycle.is_alive() {
            core_async::select! {
                _ = self.lifecycle.token().cancelled() => break,
                _ = self.permit.notified() => {}
            }
            if !self
                .lifecycle
                .compare_and_set(WorkerStatus::Starting, WorkerStatus::Started)
            {
                continue;
            }

            loop {
                let action = self.state().action;
                let (next, result) = match action {
                    Some(SyncAction::InitSolverExecutor) => (self.cold_start().await, None),
                    Some(SyncAction::SynchronizeSolution) => self.synchronize().await,
                    None => (None, None),
                };
                self.state().action = next;

                if next.is_some() {
                    if !sleep_or_cancel(self.sync_interval, self.lifecycle.token()).await {
                        break 'worker;
                    }
                    continue;
                }

                if self
                    .lifecycle
                    .compare_and_set(WorkerStatus::Started, WorkerStatus::Stopped)
                {
                    if let Some(result) = result {
                        (self.handler)(result);
                    }
                }
                break;
            }
        }
        debug!("Synchronizer loop exited");
    }

    // ------------------------------------------------------------------
    // Cold start
    // ------------------------------------------------------------------

    async fn cold_start(&self) -> Option<SyncAction> {
        if !self.solver.is_stopped() {
            debug!(
                "Previous solver run has not finished yet, retrying in {:?}",
                self.sync_interval
            );
            return Some(SyncAction::InitSolverExecutor);
        }

        let (solution, task_count) = match self.recover_solution().await {
            Ok(recovered) => recovered,
            Err(e) => {
                warn!(
                    "Solution recovery failed, retrying in {:?}: {}",
                    self.sync_interval, e
                );
                return Some(SyncAction::InitSolverExecutor);
            }
        };

        if !self.lifecycle.is_alive() || self.solver.is_destroyed() {
            return None;
        }
        if task_count == 0 {
            debug!(
                "No tasks to recover yet, retrying in {:?}",
                self.sync_interval
            );
            return Some(SyncAction::InitSolverExecutor);
        }

        match self.solver.start(solution) {
            Ok(()) => {
                let starts = self.solver.start_count();
                info!(tasks = task_count, starts, "Solution recovered, solver started");
                if starts > 1 {
                    info!("Solver was restarted, likely after a failed plan execution");
                }
                None
            }
            Err(e) => {
                warn!("Solver could not be started: {}", e);
                Some(SyncAction::InitSolverExecutor)
            }
        }
    }

    async fn recover_solution(&self) -> Result<(Solution, usize)> {
        let result = self.runtime.find_tasks(TaskQuery::active_tasks()).await?;

        let next_query_time = self.context.shift_query_time(trim_millis(result.query_time));
        self.context.set_previous_query_time(next_query_time);
        self.context.set_next_query_time(next_query_time);
        self.context.clear_task_change_times();
        debug!(
            tasks = result.tasks.len(),
            query_time = %result.query_time,
            "Loaded tasks for solution recovery"
        );

        let users = self.user_system.find_all_users().await?;
        self.state().users = users.clone();

        let solution = SolutionBuilder::new(&self.context)
            .with_tasks(&result.tasks)
            .with_users(&users)
            .build();
        Ok((solution, result.tasks.len()))
    }

    // ------------------------------------------------------------------
    // Incremental synchronization
    // ------------------------------------------------------------------

    async fn synchronize(&self) -> Step {
        match self.try_synchronize().await {
            Ok(step) => step,
            Err(e) => {
                warn!(
                    "Synchronization failed, retrying in {:?}: {}",
                    self.sync_interval, e
                );
                (Some(SyncAction::SynchronizeSolution), None)
            }
        }
    }

    async fn try_synchronize(&self) -> Result<Step> {
        if !self.solver.is_started() {
            debug!("Solver is not started, nothing to synchronize");
            return Ok((None, None));
        }
        let (solution, from, unchanged_deadline) = {
            let state = self.state();
            match state.request.as_ref() {
                Some(request) => (
                    request.solution.clone(),
                    request.from,
                    request.unchanged_deadline,
                ),
                None => return Ok((None, None)),
            }
        };

        let result = self
            .runtime
            .find_tasks(TaskQuery::modified_since(from))
            .await?;
        debug!(
            modifications = result.tasks.len(),
            %from,
            query_time = %result.query_time,
            "Loaded task modifications"
        );

        let users_update = if self.lifecycle.is_alive() && self.is_users_sync_time() {
            self.load_users().await
        } else {
            None
        };
        if !self.lifecycle.is_alive() {
            return Ok((None, None));
        }

        let directory = self
            .owner_directory(&solution, &result.tasks, users_update.as_deref())
            .await;
        let builder = ChangeSetBuilder::new(&solution, &self.context)
            .with_updates(&result.tasks)
            .with_users(&directory);
        let changes = match users_update.as_deref() {
            Some(users) => builder.with_users_update(users).build(),
            None => builder.build(),
        };

        self.context.set_previous_query_time(from);
        let candidate = self.context.shift_query_time(trim_millis(result.query_time));
        let next_query_time = if self.context.has_minimal_distance(Some(from), candidate) {
            candidate
        } else {
            from
        };
        self.context.set_next_query_time(next_query_time);

        if !changes.is_empty() {
            debug!(changes = changes.len(), "Solution changes found");
            return Ok((None, Some(SynchronizerResult::Changes(changes))));
        }
        if unchanged_deadline.is_some_and(|deadline| self.clock.now() > deadline) {
            debug!("Unchanged period elapsed without modifications");
            return Ok((None, Some(SynchronizerResult::UnchangedPeriodTimeout)));
        }

        if let Some(request) = self.state().request.as_mut() {
            request.from = next_query_time;
        }
        Ok((Some(SyncAction::SynchronizeSolution), None))
    }

    fn is_users_sync_time(&self) -> bool {
        !self.users_sync_interval.is_zero()
            && self
                .state()
                .next_users_sync
                .is_some_and(|next| self.clock.now() > next)
    }

    /// Refreshes the directory; failures keep the task sync going.
    async fn load_users(&self) -> Option<Vec<ExternalUser>> {
        match self.user_system.find_all_users().await {
            Ok(users) => {
                info!(
                    users = users.len(),
                    "User directory refreshed, next refresh in {:?}",
                    self.users_sync_interval
                );
                let mut state = self.state();
                state.users = users.clone();
                state.next_users_sync = add_duration(self.clock.now(), self.users_sync_interval);
                Some(users)
            }
            Err(e) => {
                warn!(
                    "User directory refresh failed, tasks are still synchronized: {}",
                    e
                );
                None
            }
        }
    }

    /// Cached directory plus individually resolved owners the solution and
    /// directory do not know.
    async fn owner_directory(
        &self,
        solution: &Solution,
        updates: &[ExternalTaskUpdate],
        users_update: Option<&[ExternalUser]>,
    ) -> Vec<ExternalUser> {
        let mut directory = self.state().users.clone();
        let mut missing = HashSet::new();
        for owner in updates.iter().filter_map(|u| u.actual_owner.as_ref()) {
            let known = solution.user(owner).is_some()
                || directory.iter().any(|u| &u.id == owner)
                || users_update.is_some_and(|users| users.iter().any(|u| &u.id == owner));
            if !known {
                missing.insert(owner.clone());
            }
        }

        for owner in missing {
            match self.user_system.find_user(&owner).await {
                Ok(Some(user)) => directory.push(user),
                Ok(None) => {}
                Err(e) => warn!(user = %owner, "User lookup failed: {}", e),
            }
        }
        directory
    }

    fn state(&self) -> MutexGuard<'_, SyncState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn trim_millis(time: DateTime<Utc>) -> DateTime<Utc> {
    time.with_nanosecond(0).unwrap_or(time)
}

fn add_duration(time: DateTime<Utc>, duration: Duration) -> Option<DateTime<Utc>> {
    TimeDelta::from_std(duration)
        .ok()
        .and_then(|delta| time.checked_add_signed(delta))
}
