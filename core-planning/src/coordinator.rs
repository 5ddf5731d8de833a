//! # Coordinator
//!
//! Owns the solver runner, the publisher and the synchronizer, and routes
//! results between them.
//!
//! ## Cycle
//!
//! ```text
//! cold start -> solver running -> best solution -> publish
//!      ^                                             |
//!      |  fatal                      ok/recoverable  v
//!      +---------------------------------------- synchronize -> changes -> solver
//! ```
//!
//! ## Locking
//!
//! One mutex guards the current and last best solutions, the scheduled
//! publish and every change-set transition of the [`SyncContext`]. Worker
//! calls made under it never block. Solver callbacks arrive through a
//! channel drained by an event pump task, so they never run on the solver's
//! own stack while the lock is held.
//!
//! ## Debounce
//!
//! With a wait-for-improvement duration configured, the first qualifying best
//! solution schedules a publish and later ones only replace the last best
//! solution. When the timer fires it publishes whatever is the last best at
//! that moment. A generation counter identifies the pending schedule. Only
//! the pending timer's abort handle is kept; recovery and shutdown abort it
//! and clear the slot.

use crate::context::SyncContext;
use crate::error::{PlanningError, Result};
use crate::lifecycle::WorkerStatus;
use crate::publisher::{PublishHandler, PublishResult, Publisher};
use crate::solver_runner::SolverRunner;
use crate::synchronizer::{SyncAction, Synchronizer, SynchronizerHandler, SynchronizerResult};
use bridge_traits::{
    BestSolutionEvent, Clock, PlanExecutionResult, Solver, SystemClock, TaskRuntime, UserSystem,
};
use chrono::TimeDelta;
use core_async::future::join_all;
use core_async::runtime::Handle;
use core_async::sync::{mpsc, CancellationToken};
use core_async::task::{AbortHandle, JoinHandle};
use core_async::time::{sleep_or_cancel, timeout, Duration};
use core_model::{ChangeCommand, Solution, UserId};
use core_runtime::PlannerConfig;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use tracing::{debug, error, info, instrument, trace, warn};

#[derive(Debug, Default)]
struct HandlerState {
    current_solution: Option<Arc<Solution>>,
    last_best_solution: Option<Arc<Solution>>,
    background_improvement_sent: bool,
    /// Generation of the pending debounced publish
    scheduled_publish: Option<u64>,
    publish_generation: u64,
    publish_timer: Option<AbortHandle>,
}

impl HandlerState {
    fn cancel_scheduled_publish(&mut self) {
        self.scheduled_publish = None;
        if let Some(timer) = self.publish_timer.take() {
            timer.abort();
        }
    }
}

struct CoordinatorInner {
    me: Weak<CoordinatorInner>,
    config: PlannerConfig,
    clock: Arc<dyn Clock>,
    context: Arc<SyncContext>,
    solver: Arc<SolverRunner>,
    publisher: Arc<Publisher>,
    synchronizer: Arc<Synchronizer>,
    events: Mutex<Option<mpsc::UnboundedReceiver<BestSolutionEvent>>>,
    state: Mutex<HandlerState>,
    started: AtomicBool,
    shutdown: CancellationToken,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

/// Drives the solver and keeps it in step with the external runtime.
///
/// # Example
///
/// ```ignore
/// use core_planning::Coordinator;
/// use core_runtime::PlannerConfig;
///
/// let config = PlannerConfig::builder().target_user_id("planner").build()?;
/// let coordinator = Coordinator::new(config, solver, runtime, user_system)?;
/// coordinator.start()?;
/// // ...
/// coordinator.destroy().await;
/// ```
pub struct Coordinator {
    inner: Arc<CoordinatorInner>,
}

impl Coordinator {
    /// Validates `config` and wires the workers. Nothing runs until
    /// [`start`](Self::start).
    pub fn new(
        config: PlannerConfig,
        solver: Arc<dyn Solver>,
        runtime: Arc<dyn TaskRuntime>,
        user_system: Arc<dyn UserSystem>,
    ) -> Result<Self> {
        Self::with_clock(config, solver, runtime, user_system, Arc::new(SystemClock))
    }

    pub fn with_clock(
        config: PlannerConfig,
        solver: Arc<dyn Solver>,
        runtime: Arc<dyn TaskRuntime>,
        user_system: Arc<dyn UserSystem>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        config.validate()?;
        let queries_shift = TimeDelta::from_std(config.sync_queries_shift).map_err(|e| {
            core_runtime::Error::Config(format!("sync_queries_shift is out of range: {e}"))
        })?;
        let context = Arc::new(SyncContext::new(queries_shift));

        let inner = Arc::new_cyclic(|me: &Weak<CoordinatorInner>| {
            let (events_tx, events_rx) = mpsc::unbounded_channel();
            let solver = Arc::new(SolverRunner::new(solver, events_tx));

            let on_published = me.clone();
            let publish_handler: PublishHandler = Arc::new(move |result: PublishResult| {
                if let Some(inner) = on_published.upgrade() {
                    inner.on_published(result);
                }
            });
            let publisher = Arc::new(Publisher::new(
                runtime.clone(),
                UserId::new(config.target_user_id.clone()),
                config.publish_window_size,
                publish_handler,
            ));

            let on_synchronized = me.clone();
            let sync_handler: SynchronizerHandler =
                Arc::new(move |result: SynchronizerResult| {
                    if let Some(inner) = on_synchronized.upgrade() {
                        inner.on_synchronized(result);
                    }
                });
            let synchronizer = Arc::new(Synchronizer::new(
                solver.clone(),
                runtime,
                user_system,
                context.clone(),
                clock.clone(),
                &config,
                sync_handler,
            ));

            CoordinatorInner {
                me: me.clone(),
                config,
                clock,
                context,
                solver,
                publisher,
                synchronizer,
                events: Mutex::new(Some(events_rx)),
                state: Mutex::new(HandlerState::default()),
                started: AtomicBool::new(false),
                shutdown: CancellationToken::new(),
                workers: Mutex::new(Vec::new()),
            }
        });

        Ok(Self { inner })
    }

    /// Spawns the workers on the current runtime and schedules the first
    /// cold start after the configured init delay.
    #[instrument(skip(self))]
    pub fn start(&self) -> Result<()> {
        let inner = &self.inner;
        if inner.shutdown.is_cancelled() {
            return Err(PlanningError::Destroyed("coordinator"));
        }
        if inner.started.swap(true, Ordering::SeqCst) {
            return Err(PlanningError::StateConflict {
                component: "coordinator",
                expected: "STOPPED".to_string(),
                actual: "STARTED".to_string(),
            });
        }
        let handle = Handle::try_current().map_err(|e| {
            inner.started.store(false, Ordering::SeqCst);
            core_runtime::Error::Internal(format!("no async runtime available: {e}"))
        })?;
        let Some(events) = inner.lock_events().take() else {
            return Err(core_runtime::Error::Internal("event channel already taken".into()).into());
        };

        let mut workers = inner.lock_workers();
        workers.push(handle.spawn(inner.solver.clone().run()));
        workers.push(handle.spawn(inner.publisher.clone().run()));
        workers.push(handle.spawn(inner.synchronizer.clone().run()));
        workers.push(handle.spawn(pump_events(
            inner.me.clone(),
            events,
            inner.shutdown.clone(),
        )));

        let me = inner.me.clone();
        let shutdown = inner.shutdown.clone();
        let delay = inner.config.init_delay;
        workers.push(handle.spawn(async move {
            if !sleep_or_cancel(delay, &shutdown).await {
                return;
            }
            if let Some(inner) = me.upgrade() {
                if let Err(e) = inner.synchronizer.init_solver_executor() {
                    error!("Initial cold start could not be armed: {}", e);
                }
            }
        }));

        info!(
            target_user = %inner.config.target_user_id,
            init_delay = ?delay,
            "Coordinator started"
        );
        Ok(())
    }

    /// Destroys every worker and waits up to the configured timeout for
    /// their tasks to finish, aborting stragglers.
    #[instrument(skip(self))]
    pub async fn destroy(&self) {
        self.inner.shutdown();

        let workers: Vec<JoinHandle<()>> = self.inner.lock_workers().drain(..).collect();
        let aborts: Vec<AbortHandle> = workers.iter().map(JoinHandle::abort_handle).collect();
        match timeout(
            self.inner.config.destroy_timeout,
            join_all(workers),
        )
        .await
        {
            Ok(_) => debug!("Coordinator workers finished"),
            Err(_) => {
                warn!(
                    "Workers did not finish within {:?}, aborting",
                    self.inner.config.destroy_timeout
                );
                aborts.iter().for_each(AbortHandle::abort);
            }
        }
    }

    pub fn is_destroyed(&self) -> bool {
        self.inner.shutdown.is_cancelled()
    }

    /// Solution most recently handed to the publisher.
    pub fn current_solution(&self) -> Option<Arc<Solution>> {
        self.inner.lock_state().current_solution.clone()
    }

    pub fn last_best_solution(&self) -> Option<Arc<Solution>> {
        self.inner.lock_state().last_best_solution.clone()
    }

    pub fn context(&self) -> &SyncContext {
        &self.inner.context
    }

    pub fn synchronizer_action(&self) -> Option<SyncAction> {
        self.inner.synchronizer.current_action()
    }

    pub fn synchronizer_status(&self) -> WorkerStatus {
        self.inner.synchronizer.status()
    }

    pub fn solver_status(&self) -> WorkerStatus {
        self.inner.solver.status()
    }

    pub fn publisher_status(&self) -> WorkerStatus {
        self.inner.publisher.status()
    }

    /// Number of times the solver was started, restarts included.
    pub fn solver_starts(&self) -> u64 {
        self.inner.solver.start_count()
    }
}

impl Drop for Coordinator {
    fn drop(&mut self) {
        self.inner.shutdown();
    }
}

async fn pump_events(
    coordinator: Weak<CoordinatorInner>,
    mut events: mpsc::UnboundedReceiver<BestSolutionEvent>,
    shutdown: CancellationToken,
) {
    loop {
        let event = core_async::select! {
            _ = shutdown.cancelled() => break,
            event = events.recv() => match event {
                Some(event) => event,
                None => break,
            },
        };
        let Some(inner) = coordinator.upgrade() else {
            break;
        };
        inner.on_best_solution(event);
    }
    trace!("Best solution pump exited");
}

impl CoordinatorInner {
    fn shutdown(&self) {
        if self.shutdown.is_cancelled() {
            return;
        }
        self.shutdown.cancel();
        self.solver.destroy();
        self.synchronizer.destroy();
        self.publisher.destroy();
        self.lock_state().cancel_scheduled_publish();
        info!("Coordinator destroyed");
    }

    // ------------------------------------------------------------------
    // Solver events
    // ------------------------------------------------------------------

    #[instrument(skip(self, event), fields(change_set_id = event.solution.change_set_id))]
    fn on_best_solution(&self, event: BestSolutionEvent) {
        if !self.solver.is_started() {
            trace!("Ignoring best solution from a solver that is not running");
            return;
        }
        let mut state = self.lock_state();
        debug!(
            every_change_applied = event.every_change_applied,
            current_change_set_id = self.context.current_change_set_id(),
            current_processed = self.context.is_current_change_set_processed(),
            score = %event.solution.score,
            "New best solution"
        );

        if !event.every_change_applied || !event.solution.score.is_initialized() {
            return;
        }
        self.context
            .set_current_change_set_id(event.solution.change_set_id);
        let solution = Arc::new(event.solution);
        state.last_best_solution = Some(solution.clone());

        if self.config.has_publish_debounce() {
            self.schedule_publish(&mut state);
        } else if !self.context.is_current_change_set_processed() {
            self.execute_publish(&mut state, solution);
        }
    }

    fn schedule_publish(&self, state: &mut HandlerState) {
        if state.scheduled_publish.is_some() || self.context.is_current_change_set_processed() {
            return;
        }
        state.publish_generation += 1;
        let generation = state.publish_generation;
        state.scheduled_publish = Some(generation);

        let delay = self.config.wait_for_improved_solution_duration;
        debug!(generation, ?delay, "Publish scheduled");
        let me = self.me.clone();
        let shutdown = self.shutdown.clone();
        let timer = core_async::spawn(async move {
            if !sleep_or_cancel(delay, &shutdown).await {
                return;
            }
            if let Some(inner) = me.upgrade() {
                inner.fire_scheduled_publish(generation);
            }
        });
        // Only the latest timer is kept; earlier ones have already fired
        state.publish_timer = Some(timer.abort_handle());
    }

    fn fire_scheduled_publish(&self, generation: u64) {
        let mut state = self.lock_state();
        if state.scheduled_publish != Some(generation) {
            debug!(generation, "Dropping stale scheduled publish");
            return;
        }
        state.scheduled_publish = None;
        state.publish_timer = None;
        let Some(best) = state.last_best_solution.clone() else {
            return;
        };
        debug!(
            generation,
            score = %best.score,
            change_set_id = self.context.current_change_set_id(),
            "Publishing last best solution after debounce"
        );
        self.execute_publish(&mut state, best);
    }

    fn execute_publish(&self, state: &mut HandlerState, solution: Arc<Solution>) {
        if self.submit(state, solution) {
            self.context
                .set_processed_change_set(self.context.current_change_set_id());
        }
    }

    /// Hands `solution` to the publisher and makes it current on success.
    /// The publisher's handler needs the state lock, so it observes the new
    /// current solution.
    fn submit(&self, state: &mut HandlerState, solution: Arc<Solution>) -> bool {
        match self.publisher.submit(solution.clone()) {
            Ok(()) => {
                state.current_solution = Some(solution);
                true
            }
            Err(e) => {
                warn!("Solution could not be handed to the publisher: {}", e);
                false
            }
        }
    }

    // ------------------------------------------------------------------
    // Publisher results
    // ------------------------------------------------------------------

    #[instrument(skip(self, result))]
    fn on_published(&self, result: PublishResult) {
        let mut state = self.lock_state();

        if result.is_fatal() {
            match &result {
                PublishResult::Failed(e) => error!(
                    "Plan publishing failed, restarting the solver from a recovered solution: {}",
                    e
                ),
                PublishResult::Executed(outcome) => error!(
                    ?outcome,
                    "Plan execution failed, restarting the solver from a recovered solution"
                ),
            }
            self.recover(&mut state);
            return;
        }

        let Some(current) = state.current_solution.clone() else {
            warn!("Publish result arrived without a current solution");
            return;
        };

        if let PublishResult::Executed(PlanExecutionResult::RecoverableError { code, message }) =
            &result
        {
            debug!(
                ?code,
                %message,
                "Recoverable plan execution error, resynchronizing from the previous query time"
            );
            let from = self
                .context
                .previous_query_time()
                .unwrap_or_else(|| self.clock.now());
            self.synchronize(current, from, Duration::ZERO);
            return;
        }

        let from = self.advance_window();
        let unchanged_period =
            if self.config.has_background_improvement() && !state.background_improvement_sent {
                self.config.improve_solution_on_background_duration
            } else {
                Duration::ZERO
            };
        self.synchronize(current, from, unchanged_period);
    }

    /// Drops every in-memory solution and arms a cold start.
    fn recover(&self, state: &mut HandlerState) {
        self.solver.stop();
        self.context.clear_processed_change_set();
        state.current_solution = None;
        state.last_best_solution = None;
        state.background_improvement_sent = false;
        state.cancel_scheduled_publish();
        if let Err(e) = self.synchronizer.init_solver_executor() {
            error!("Cold start could not be armed: {}", e);
        }
    }

    /// Next query start; forgets task changes the next window no longer
    /// reaches.
    fn advance_window(&self) -> chrono::DateTime<chrono::Utc> {
        if let Some(previous) = self.context.previous_query_time() {
            self.context.clear_task_change_times_before(previous);
        }
        self.context
            .next_query_time()
            .unwrap_or_else(|| self.clock.now())
    }

    fn synchronize(
        &self,
        solution: Arc<Solution>,
        from: chrono::DateTime<chrono::Utc>,
        unchanged_period: Duration,
    ) {
        if let Err(e) = self
            .synchronizer
            .synchronize_solution(solution, from, unchanged_period)
        {
            warn!("Synchronization could not be armed: {}", e);
        }
    }

    // ------------------------------------------------------------------
    // Synchronizer results
    // ------------------------------------------------------------------

    #[instrument(skip(self, result), fields(has_changes = result.has_changes()))]
    fn on_synchronized(&self, result: SynchronizerResult) {
        let mut state = self.lock_state();
        match result {
            SynchronizerResult::Changes(changes) => self.add_change_commands(&mut state, changes),
            SynchronizerResult::UnchangedPeriodTimeout => {
                state.background_improvement_sent = true;
                let best = state.last_best_solution.clone();
                let Some(current) = state.current_solution.clone() else {
                    warn!("Unchanged period elapsed without a current solution");
                    return;
                };
                match best {
                    Some(best) if best.score > current.score => {
                        info!(
                            score = %best.score,
                            previous = %current.score,
                            "Publishing solution improved in background"
                        );
                        if !self.submit(&mut state, best) {
                            let from = self.advance_window();
                            self.synchronize(current, from, Duration::ZERO);
                        }
                    }
                    _ => {
                        debug!("No background improvement, restarting synchronization");
                        let from = self.advance_window();
                        self.synchronize(current, from, Duration::ZERO);
                    }
                }
            }
        }
    }

    fn add_change_commands(&self, state: &mut HandlerState, changes: Vec<ChangeCommand>) {
        if !self.solver.is_started() {
            info!(
                changes = changes.len(),
                "Solver is not started, discarding changes"
            );
            return;
        }
        if changes.is_empty() {
            info!("Empty change set has no effect on the solution");
            return;
        }
        state.background_improvement_sent = false;
        if let Err(e) = self.solver.add_change_commands(changes) {
            warn!("Changes could not be handed to the solver: {}", e);
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, HandlerState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn lock_workers(&self) -> MutexGuard<'_, Vec<JoinHandle<()>>> {
        self.workers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn lock_events(&self) -> MutexGuard<'_, Option<mpsc::UnboundedReceiver<BestSolutionEvent>>> {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{wait_until, BlockingSolver, FakeRuntime, FakeUserSystem};
    use bridge_traits::PlanErrorCode;
    use chrono::Utc;
    use core_model::{
        ExternalTaskUpdate, Score, Task, TaskId, TaskStatus, User, DUMMY_TASK_PLANNER_241_ID,
        PLANNING_USER_ID,
    };

    struct Fixture {
        solver: Arc<BlockingSolver>,
        runtime: Arc<FakeRuntime>,
        coordinator: Coordinator,
    }

    fn config() -> core_runtime::PlannerConfigBuilder {
        PlannerConfig::builder()
            .target_user_id("admin")
            .sync_interval(Duration::from_millis(10))
            .users_sync_interval(Duration::ZERO)
            .improve_solution_on_background_duration(Duration::ZERO)
    }

    async fn running(config: PlannerConfig) -> Fixture {
        let solver = Arc::new(BlockingSolver::default());
        let runtime = Arc::new(FakeRuntime::default());
        runtime.push_tasks(
            vec![ExternalTaskUpdate::new(1, TaskStatus::Ready, Utc::now())],
            Utc::now(),
        );
        let coordinator = Coordinator::new(
            config,
            solver.clone(),
            runtime.clone(),
            Arc::new(FakeUserSystem::with_users(&["alice"])),
        )
        .unwrap();
        coordinator.start().unwrap();
        wait_until(|| coordinator.solver_status() == WorkerStatus::Started && solver.is_solving())
            .await;
        Fixture {
            solver,
            runtime,
            coordinator,
        }
    }

    /// Alice holds task 1; the planning user holds dummy-241, so polling
    /// the empty fake runtime yields no changes.
    fn best(soft: i64) -> Solution {
        let mut alice = User::new("alice");
        alice.task_ids.push(TaskId(1));
        let mut planner = User::planning_user();
        planner.task_ids.push(DUMMY_TASK_PLANNER_241_ID);
        Solution::new(
            vec![
                Task::new(1, "t1", TaskStatus::Ready).with_user("alice"),
                Task::dummy_planner_241().with_user(PLANNING_USER_ID),
            ],
            vec![alice, planner],
        )
        .with_score(Score::initialized(0, soft))
    }

    #[tokio::test]
    async fn test_invalid_config_fails_fast() {
        let mut config = config().build().unwrap();
        config.publish_window_size = 0;
        let result = Coordinator::new(
            config,
            Arc::new(BlockingSolver::default()),
            Arc::new(FakeRuntime::default()),
            Arc::new(FakeUserSystem::default()),
        );
        assert!(matches!(
            result,
            Err(PlanningError::Runtime(core_runtime::Error::Config(_)))
        ));
    }

    #[tokio::test]
    async fn test_start_twice_is_rejected() {
        let fixture = running(config().build().unwrap()).await;
        assert!(matches!(
            fixture.coordinator.start(),
            Err(PlanningError::StateConflict { .. })
        ));
        fixture.coordinator.destroy().await;
    }

    #[tokio::test]
    async fn test_best_solution_is_published_then_synchronized() {
        let fixture = running(config().build().unwrap()).await;

        fixture.solver.emit(best(-1), true);
        wait_until(|| fixture.runtime.plan_count() == 1).await;
        wait_until(|| {
            fixture.coordinator.synchronizer_action() == Some(SyncAction::SynchronizeSolution)
        })
        .await;

        let current = fixture.coordinator.current_solution().unwrap();
        assert_eq!(current.score, Score::initialized(0, -1));
        assert!(fixture.coordinator.context().is_current_change_set_processed());
        fixture.coordinator.destroy().await;
    }

    #[tokio::test]
    async fn test_unfinished_or_uninitialized_solutions_are_not_published() {
        let fixture = running(config().build().unwrap()).await;

        fixture.solver.emit(best(-1), false);
        fixture
            .solver
            .emit(best(-1).with_score(Score::uninitialized(3)), true);
        core_async::sleep(Duration::from_millis(50)).await;

        assert_eq!(fixture.runtime.plan_count(), 0);
        assert!(fixture.coordinator.last_best_solution().is_none());
        fixture.coordinator.destroy().await;
    }

    #[tokio::test]
    async fn test_fatal_result_discards_solutions_and_arms_cold_start() {
        let fixture = running(config().build().unwrap()).await;
        fixture
            .runtime
            .push_plan_result(PlanExecutionResult::error(PlanErrorCode::Unexpected, "boom"));

        fixture.solver.emit(best(-1), true);
        wait_until(|| fixture.runtime.plan_count() == 1).await;
        wait_until(|| {
            fixture.coordinator.synchronizer_action() == Some(SyncAction::InitSolverExecutor)
        })
        .await;

        assert!(fixture.coordinator.current_solution().is_none());
        assert!(fixture.coordinator.last_best_solution().is_none());
        assert!(!fixture.coordinator.context().is_current_change_set_processed());
        fixture.coordinator.destroy().await;
    }

    #[tokio::test]
    async fn test_debounce_publishes_last_best_once() {
        let config = config()
            .wait_for_improved_solution_duration(Duration::from_millis(60))
            .build()
            .unwrap();
        let fixture = running(config).await;

        fixture.solver.emit(best(-3), true);
        fixture.solver.emit(best(-2), true);
        fixture.solver.emit(best(-1), true);
        wait_until(|| fixture.runtime.plan_count() == 1).await;
        core_async::sleep(Duration::from_millis(100)).await;

        assert_eq!(fixture.runtime.plan_count(), 1);
        let current = fixture.coordinator.current_solution().unwrap();
        assert_eq!(current.score, Score::initialized(0, -1));
        fixture.coordinator.destroy().await;
    }

    fn best_with_change_set(soft: i64, change_set_id: u64) -> Solution {
        let mut solution = best(soft);
        solution.change_set_id = change_set_id;
        solution
    }

    #[tokio::test]
    async fn test_debounce_timers_are_not_accumulated() {
        let config = config()
            .wait_for_improved_solution_duration(Duration::from_millis(1))
            .build()
            .unwrap();
        let fixture = running(config).await;
        let workers = fixture.coordinator.inner.lock_workers().len();

        for change_set_id in 1..=20u64 {
            fixture
                .solver
                .emit(best_with_change_set(-1, change_set_id), true);
            wait_until(|| {
                fixture.coordinator.context().is_processed_change_set(change_set_id)
                    && fixture.coordinator.publisher_status() == WorkerStatus::Stopped
            })
            .await;
        }

        assert_eq!(fixture.runtime.plan_count(), 20);
        assert_eq!(fixture.coordinator.inner.lock_workers().len(), workers);
        fixture.coordinator.destroy().await;
    }

    #[tokio::test]
    async fn test_rejected_submit_leaves_change_set_unprocessed() {
        let fixture = running(config().build().unwrap()).await;
        fixture.coordinator.inner.publisher.destroy();

        fixture.solver.emit(best(-1), true);
        wait_until(|| fixture.coordinator.last_best_solution().is_some()).await;

        assert!(fixture.coordinator.current_solution().is_none());
        assert!(!fixture.coordinator.context().is_current_change_set_processed());
        assert_eq!(fixture.runtime.plan_count(), 0);
        fixture.coordinator.destroy().await;
    }

    #[tokio::test]
    async fn test_background_improvement_is_published_when_better() {
        let config = config()
            .improve_solution_on_background_duration(Duration::from_millis(100))
            .build()
            .unwrap();
        let fixture = running(config).await;

        fixture.solver.emit(best(-5), true);
        wait_until(|| fixture.runtime.plan_count() == 1).await;
        // Same change set: kept as last best, not published right away
        fixture.solver.emit(best(-1), true);
        wait_until(|| fixture.runtime.plan_count() == 2).await;

        let current = fixture.coordinator.current_solution().unwrap();
        assert_eq!(current.score, Score::initialized(0, -1));
        assert!(fixture.coordinator.inner.lock_state().background_improvement_sent);
        fixture.coordinator.destroy().await;
    }

    #[tokio::test]
    async fn test_background_window_without_improvement_resumes_polling() {
        let config = config()
            .improve_solution_on_background_duration(Duration::from_millis(50))
            .build()
            .unwrap();
        let fixture = running(config).await;

        fixture.solver.emit(best(-5), true);
        wait_until(|| fixture.runtime.plan_count() == 1).await;
        wait_until(|| fixture.coordinator.inner.lock_state().background_improvement_sent).await;
        wait_until(|| {
            fixture.coordinator.synchronizer_action() == Some(SyncAction::SynchronizeSolution)
        })
        .await;
        core_async::sleep(Duration::from_millis(80)).await;

        assert_eq!(fixture.runtime.plan_count(), 1);
        assert_eq!(
            fixture.coordinator.synchronizer_action(),
            Some(SyncAction::SynchronizeSolution)
        );
        let current = fixture.coordinator.current_solution().unwrap();
        assert_eq!(current.score, Score::initialized(0, -5));
        fixture.coordinator.destroy().await;
    }

    #[tokio::test]
    async fn test_destroy_stops_every_worker() {
        let fixture = running(config().build().unwrap()).await;
        fixture.coordinator.destroy().await;

        assert!(fixture.coordinator.is_destroyed());
        assert_eq!(fixture.coordinator.solver_status(), WorkerStatus::Destroyed);
        assert_eq!(
            fixture.coordinator.publisher_status(),
            WorkerStatus::Destroyed
        );
        assert_eq!(
            fixture.coordinator.synchronizer_status(),
            WorkerStatus::Destroyed
        );
        assert!(matches!(
            fixture.coordinator.start(),
            Err(PlanningError::Destroyed("coordinator"))
        ));
    }
}
