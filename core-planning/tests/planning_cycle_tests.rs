//! Integration tests for the planning cycle
//!
//! These tests drive a full coordinator against in-memory collaborators:
//! - Cold start, first publish and incremental changes
//! - Recoverable plan errors resynchronizing without a restart
//! - Fatal plan errors restarting the solver from a recovered model
//! - Periodic user directory refresh

use async_trait::async_trait;
use bridge_traits::{
    error::{BridgeError, Result as BridgeResult},
    BestSolutionEvent, BestSolutionListener, PlanErrorCode, PlanExecutionResult, Solver,
    TaskQuery, TaskQueryResult, TaskRuntime, UserSystem,
};
use chrono::{TimeDelta, Utc};
use core_model::{
    ChangeCommand, ExternalTaskUpdate, ExternalUser, PlanItem, Score, Solution, TaskId,
    TaskStatus, UserId,
};
use core_planning::{Coordinator, SyncAction};
use core_runtime::PlannerConfig;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

// ============================================================================
// Mock Implementations
// ============================================================================

/// Runtime holding tasks in memory; plans are recorded, not applied.
#[derive(Default)]
struct MockTaskRuntime {
    tasks: Mutex<Vec<ExternalTaskUpdate>>,
    plan_results: Mutex<VecDeque<PlanExecutionResult>>,
    plans: Mutex<Vec<Vec<PlanItem>>>,
}

impl MockTaskRuntime {
    fn with_ready_tasks(ids: &[i64]) -> Self {
        let modified = Utc::now() - TimeDelta::hours(1);
        let runtime = Self::default();
        *runtime.tasks.lock().unwrap() = ids
            .iter()
            .map(|id| ExternalTaskUpdate::new(*id, TaskStatus::Ready, modified))
            .collect();
        runtime
    }

    fn complete(&self, id: i64) {
        let mut tasks = self.tasks.lock().unwrap();
        if let Some(task) = tasks.iter_mut().find(|t| t.task_id == TaskId(id)) {
            task.status = TaskStatus::Completed;
            task.last_modification = Utc::now();
        }
    }

    fn push_plan_result(&self, result: PlanExecutionResult) {
        self.plan_results.lock().unwrap().push_back(result);
    }

    fn plan_count(&self) -> usize {
        self.plans.lock().unwrap().len()
    }

    fn last_plan_tasks(&self) -> Vec<TaskId> {
        self.plans
            .lock()
            .unwrap()
            .last()
            .map(|plan| plan.iter().map(|item| item.task_id).collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl TaskRuntime for MockTaskRuntime {
    async fn find_tasks(&self, query: TaskQuery) -> BridgeResult<TaskQueryResult> {
        let tasks = self
            .tasks
            .lock()
            .unwrap()
            .iter()
            .filter(|t| {
                query
                    .statuses
                    .as_ref()
                    .map_or(true, |statuses| statuses.contains(&t.status))
            })
            .filter(|t| {
                query
                    .modified_since
                    .map_or(true, |from| t.last_modification >= from)
            })
            .cloned()
            .collect();
        Ok(TaskQueryResult {
            tasks,
            query_time: Utc::now(),
        })
    }

    async fn execute_plan(
        &self,
        items: Vec<PlanItem>,
        _on_behalf_of: &UserId,
    ) -> BridgeResult<PlanExecutionResult> {
        self.plans.lock().unwrap().push(items);
        let result = self.plan_results.lock().unwrap().pop_front();
        Ok(result.unwrap_or(PlanExecutionResult::Ok))
    }
}

struct MockUserDirectory {
    users: Mutex<Vec<ExternalUser>>,
}

impl MockUserDirectory {
    fn new(ids: &[&str]) -> Self {
        Self {
            users: Mutex::new(ids.iter().map(|id| ExternalUser::new(*id)).collect()),
        }
    }

    fn add(&self, id: &str) {
        self.users.lock().unwrap().push(ExternalUser::new(id));
    }
}

#[async_trait]
impl UserSystem for MockUserDirectory {
    async fn find_all_users(&self) -> BridgeResult<Vec<ExternalUser>> {
        Ok(self.users.lock().unwrap().clone())
    }

    async fn find_user(&self, id: &UserId) -> BridgeResult<Option<ExternalUser>> {
        Ok(self
            .users
            .lock()
            .unwrap()
            .iter()
            .find(|u| &u.id == id)
            .cloned())
    }
}

/// Solver that queues every unassigned task to the first real user, applies
/// change batches as they arrive and reports after each step.
#[derive(Default)]
struct GreedySolver {
    pending: Mutex<VecDeque<Vec<ChangeCommand>>>,
    applied: Mutex<Vec<ChangeCommand>>,
    wake: Notify,
    terminated: Notify,
    solves: AtomicUsize,
}

impl GreedySolver {
    fn has_applied(&self, matches: impl Fn(&ChangeCommand) -> bool) -> bool {
        self.applied.lock().unwrap().iter().any(matches)
    }

    fn assign_free_tasks(solution: &mut Solution) {
        let Some(user_index) = solution
            .users
            .iter()
            .position(|u| u.enabled && !u.is_planning_user())
        else {
            return;
        };
        let free: Vec<TaskId> = solution
            .tasks
            .iter()
            .filter(|t| !t.is_dummy() && t.user.is_none())
            .map(|t| t.id)
            .collect();
        let user_id = solution.users[user_index].id.clone();
        for id in free {
            if let Some(task) = solution.tasks.iter_mut().find(|t| t.id == id) {
                task.user = Some(user_id.clone());
            }
            solution.users[user_index].task_ids.push(id);
        }
        let assigned = solution.tasks.iter().filter(|t| t.user.is_some()).count();
        solution.score = Score::initialized(0, -(assigned as i64));
    }
}

#[async_trait]
impl Solver for GreedySolver {
    async fn solve(
        &self,
        mut problem: Solution,
        listener: BestSolutionListener,
    ) -> BridgeResult<Solution> {
        self.solves.fetch_add(1, Ordering::SeqCst);
        loop {
            let batches: Vec<_> = self.pending.lock().unwrap().drain(..).collect();
            for batch in batches {
                problem
                    .apply_all(&batch)
                    .map_err(|e| BridgeError::OperationFailed(e.to_string()))?;
                self.applied.lock().unwrap().extend(batch);
            }
            Self::assign_free_tasks(&mut problem);
            listener(BestSolutionEvent {
                solution: problem.clone(),
                every_change_applied: true,
            });

            tokio::select! {
                _ = self.terminated.notified() => return Ok(problem),
                _ = self.wake.notified() => {}
            }
        }
    }

    fn terminate_early(&self) -> bool {
        self.terminated.notify_one();
        true
    }

    fn add_change_commands(&self, commands: Vec<ChangeCommand>) -> BridgeResult<()> {
        self.pending.lock().unwrap().push_back(commands);
        self.wake.notify_one();
        Ok(())
    }
}

// ============================================================================
// Helpers
// ============================================================================

struct Harness {
    runtime: Arc<MockTaskRuntime>,
    users: Arc<MockUserDirectory>,
    solver: Arc<GreedySolver>,
    coordinator: Coordinator,
}

fn config() -> core_runtime::PlannerConfigBuilder {
    PlannerConfig::builder()
        .target_user_id("admin")
        .publish_window_size(5)
        .sync_interval(Duration::from_millis(10))
        .sync_queries_shift(Duration::from_millis(5))
        .users_sync_interval(Duration::ZERO)
        .wait_for_improved_solution_duration(Duration::ZERO)
        .improve_solution_on_background_duration(Duration::ZERO)
        .init_delay(Duration::ZERO)
        .destroy_timeout(Duration::from_secs(1))
}

fn start(config: PlannerConfig, runtime: MockTaskRuntime) -> Harness {
    let runtime = Arc::new(runtime);
    let users = Arc::new(MockUserDirectory::new(&["alice", "bob"]));
    let solver = Arc::new(GreedySolver::default());
    let coordinator = Coordinator::new(config, solver.clone(), runtime.clone(), users.clone())
        .expect("valid configuration");
    coordinator.start().expect("coordinator starts");
    Harness {
        runtime,
        users,
        solver,
        coordinator,
    }
}

async fn eventually(what: &str, condition: impl Fn() -> bool) {
    for _ in 0..400 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("timed out waiting for {what}");
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn test_cold_start_publishes_and_follows_changes() {
    let h = start(
        config().build().unwrap(),
        MockTaskRuntime::with_ready_tasks(&[1, 2]),
    );

    eventually("first plan", || h.runtime.plan_count() >= 1).await;
    let first = h.runtime.plans.lock().unwrap()[0].clone();
    assert_eq!(
        first.iter().map(|i| i.task_id).collect::<Vec<_>>(),
        vec![TaskId(1), TaskId(2)]
    );
    assert!(first
        .iter()
        .all(|i| i.user_id.as_str() == "alice" && i.published));

    h.runtime.complete(1);
    eventually("removal applied", || {
        h.solver
            .has_applied(|c| matches!(c, ChangeCommand::Remove { task } if task.id == TaskId(1)))
    })
    .await;
    eventually("plan without completed task", || {
        h.runtime.last_plan_tasks() == vec![TaskId(2)]
    })
    .await;

    assert!(h.coordinator.context().current_change_set_id() >= 1);
    assert_eq!(h.solver.solves.load(Ordering::SeqCst), 1);
    h.coordinator.destroy().await;
}

#[tokio::test]
async fn test_recoverable_error_resynchronizes_without_restart() {
    let runtime = MockTaskRuntime::with_ready_tasks(&[1]);
    runtime.push_plan_result(PlanExecutionResult::error(
        PlanErrorCode::TaskModifiedSincePlanCalculation,
        "task 1 changed",
    ));
    let h = start(config().build().unwrap(), runtime);

    eventually("republish after resync", || h.runtime.plan_count() >= 2).await;
    eventually("polling resumed", || {
        h.coordinator.synchronizer_action() == Some(SyncAction::SynchronizeSolution)
    })
    .await;

    assert_eq!(h.coordinator.solver_starts(), 1);
    assert!(h.coordinator.current_solution().is_some());
    h.coordinator.destroy().await;
}

#[tokio::test]
async fn test_fatal_error_restarts_solver_from_recovered_model() {
    let runtime = MockTaskRuntime::with_ready_tasks(&[1, 2]);
    runtime.push_plan_result(PlanExecutionResult::error(
        PlanErrorCode::Unexpected,
        "runtime rejected plan",
    ));
    let h = start(config().build().unwrap(), runtime);

    eventually("solver restart", || h.coordinator.solver_starts() == 2).await;
    eventually("publish after restart", || h.runtime.plan_count() >= 2).await;

    assert_eq!(h.solver.solves.load(Ordering::SeqCst), 2);
    let current = h.coordinator.current_solution().expect("republished solution");
    assert!(current.score.is_initialized());
    h.coordinator.destroy().await;
}

#[tokio::test]
async fn test_user_refresh_feeds_new_users_to_solver() {
    let config = config()
        .users_sync_interval(Duration::from_millis(20))
        .build()
        .unwrap();
    let h = start(config, MockTaskRuntime::with_ready_tasks(&[1]));

    eventually("first plan", || h.runtime.plan_count() >= 1).await;
    h.users.add("carol");

    eventually("carol added", || {
        h.solver
            .has_applied(|c| matches!(c, ChangeCommand::AddUser { user } if user.id.as_str() == "carol"))
    })
    .await;
    assert!(!h.solver.has_applied(
        |c| matches!(c, ChangeCommand::AddUser { user } if user.id.as_str() == "alice")
    ));
    h.coordinator.destroy().await;
}

#[tokio::test]
async fn test_destroy_is_idempotent_and_blocks_restart() {
    let h = start(
        config().build().unwrap(),
        MockTaskRuntime::with_ready_tasks(&[1]),
    );
    eventually("first plan", || h.runtime.plan_count() >= 1).await;

    h.coordinator.destroy().await;
    h.coordinator.destroy().await;

    assert!(h.coordinator.is_destroyed());
    assert!(h.coordinator.start().is_err());
}
