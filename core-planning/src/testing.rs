//! In-memory collaborators shared by unit tests.

use async_trait::async_trait;
use bridge_traits::error::Result as BridgeResult;
use bridge_traits::{
    BestSolutionEvent, BestSolutionListener, BridgeError, PlanExecutionResult, Solver, TaskQuery,
    TaskQueryResult, TaskRuntime, UserSystem,
};
use chrono::{DateTime, Utc};
use core_async::sync::Notify;
use core_async::time::{sleep, Duration};
use core_model::{ChangeCommand, ExternalTaskUpdate, ExternalUser, PlanItem, Solution, UserId};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

/// Solves until terminated, keeping the listener so tests can emit events.
#[derive(Default)]
pub(crate) struct BlockingSolver {
    terminated: Notify,
    listener: Mutex<Option<BestSolutionListener>>,
    pub batches: Mutex<Vec<Vec<ChangeCommand>>>,
}

impl BlockingSolver {
    pub fn emit(&self, solution: Solution, every_change_applied: bool) {
        let listener = self.listener.lock().unwrap().clone();
        if let Some(listener) = listener {
            listener(BestSolutionEvent {
                solution,
                every_change_applied,
            });
        }
    }

    pub fn is_solving(&self) -> bool {
        self.listener.lock().unwrap().is_some()
    }

    pub fn batch_count(&self) -> usize {
        self.batches.lock().unwrap().len()
    }
}

#[async_trait]
impl Solver for BlockingSolver {
    async fn solve(
        &self,
        problem: Solution,
        listener: BestSolutionListener,
    ) -> BridgeResult<Solution> {
        *self.listener.lock().unwrap() = Some(listener);
        self.terminated.notified().await;
        self.listener.lock().unwrap().take();
        Ok(problem)
    }

    fn terminate_early(&self) -> bool {
        self.terminated.notify_one();
        true
    }

    fn add_change_commands(&self, commands: Vec<ChangeCommand>) -> BridgeResult<()> {
        self.batches.lock().unwrap().push(commands);
        Ok(())
    }
}

/// Scripted runtime: queued query responses, recorded plans.
#[derive(Default)]
pub(crate) struct FakeRuntime {
    responses: Mutex<VecDeque<BridgeResult<TaskQueryResult>>>,
    plan_results: Mutex<VecDeque<PlanExecutionResult>>,
    pub queries: Mutex<Vec<TaskQuery>>,
    pub plans: Mutex<Vec<Vec<PlanItem>>>,
}

impl FakeRuntime {
    pub fn push_tasks(&self, tasks: Vec<ExternalTaskUpdate>, query_time: DateTime<Utc>) {
        self.responses
            .lock()
            .unwrap()
            .push_back(Ok(TaskQueryResult { tasks, query_time }));
    }

    pub fn push_query_error(&self) {
        self.responses
            .lock()
            .unwrap()
            .push_back(Err(BridgeError::QueryFailed("database unavailable".into())));
    }

    pub fn push_plan_result(&self, result: PlanExecutionResult) {
        self.plan_results.lock().unwrap().push_back(result);
    }

    pub fn query_count(&self) -> usize {
        self.queries.lock().unwrap().len()
    }

    pub fn plan_count(&self) -> usize {
        self.plans.lock().unwrap().len()
    }
}

#[async_trait]
impl TaskRuntime for FakeRuntime {
    async fn find_tasks(&self, query: TaskQuery) -> BridgeResult<TaskQueryResult> {
        self.queries.lock().unwrap().push(query);
        let response = self.responses.lock().unwrap().pop_front();
        response.unwrap_or_else(|| {
            Ok(TaskQueryResult {
                tasks: Vec::new(),
                query_time: Utc::now(),
            })
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

#[derive(Default)]
pub(crate) struct FakeUserSystem {
    pub users: Mutex<Vec<ExternalUser>>,
    pub failing: AtomicBool,
}

impl FakeUserSystem {
    pub fn with_users(ids: &[&str]) -> Self {
        let system = Self::default();
        *system.users.lock().unwrap() = ids.iter().map(|id| ExternalUser::new(*id)).collect();
        system
    }
}

#[async_trait]
impl UserSystem for FakeUserSystem {
    async fn find_all_users(&self) -> BridgeResult<Vec<ExternalUser>> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(BridgeError::NotAvailable("directory offline".into()));
        }
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

pub(crate) async fn wait_until(condition: impl Fn() -> bool) {
    for _ in 0..400 {
        if condition() {
            return;
        }
        sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not reached in time");
}
