//! # Publisher
//!
//! Single-slot worker that pushes a solution's plan to the runtime.
//!
//! `submit` is only accepted while the worker is `STOPPED`; it moves to
//! `STARTING` and hands the solution over a channel of depth one, so a
//! second submit while a job is in flight fails instead of queueing. The
//! worker builds a plan bounded by the publish window, executes it on behalf
//! of the target user and reports a [`PublishResult`]. Failures of the
//! runtime call, panics included, are folded into the result; the loop only
//! ends on destroy.

use crate::error::{PlanningError, Result};
use crate::lifecycle::{WorkerLifecycle, WorkerStatus};
use crate::plan::build_plan;
use bridge_traits::{PlanExecutionResult, TaskRuntime};
use core_async::sync::mpsc;
use core_model::{Solution, UserId};
use core_async::future::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, instrument, warn};

/// Outcome of one publish job.
#[derive(Debug)]
pub enum PublishResult {
    /// The runtime executed the plan and reported this result
    Executed(PlanExecutionResult),
    /// The runtime call itself failed
    Failed(PlanningError),
}

impl PublishResult {
    pub fn is_ok(&self) -> bool {
        matches!(self, PublishResult::Executed(PlanExecutionResult::Ok))
    }

    /// Fatal results invalidate the solver's model.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            PublishResult::Executed(PlanExecutionResult::FatalError { .. })
                | PublishResult::Failed(_)
        )
    }
}

pub type PublishHandler = Arc<dyn Fn(PublishResult) + Send + Sync>;

pub struct Publisher {
    lifecycle: WorkerLifecycle,
    runtime: Arc<dyn TaskRuntime>,
    target_user: UserId,
    window: usize,
    sender: mpsc::Sender<Arc<Solution>>,
    receiver: Mutex<Option<mpsc::Receiver<Arc<Solution>>>>,
    handler: PublishHandler,
}

impl Publisher {
    pub fn new(
        runtime: Arc<dyn TaskRuntime>,
        target_user: UserId,
        window: usize,
        handler: PublishHandler,
    ) -> Self {
        let (sender, receiver) = mpsc::channel(1);
        Self {
            lifecycle: WorkerLifecycle::new("publisher"),
            runtime,
            target_user,
            window,
            sender,
            receiver: Mutex::new(Some(receiver)),
            handler,
        }
    }

    /// Hands `solution` to the worker. Fails with a state conflict unless
    /// the publisher is idle.
    pub fn submit(&self, solution: Arc<Solution>) -> Result<()> {
        self.lifecycle
            .transition(WorkerStatus::Stopped, WorkerStatus::Starting)?;

        let change_set_id = solution.change_set_id;
        if self.sender.try_send(solution).is_err() {
            self.lifecycle
                .compare_and_set(WorkerStatus::Starting, WorkerStatus::Stopped);
            return Err(PlanningError::Destroyed(self.lifecycle.name()));
        }
        debug!(change_set_id, "Solution submitted for publishing");
        Ok(())
    }

    pub fn is_busy(&self) -> bool {
        self.lifecycle.status() != WorkerStatus::Stopped
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

    /// Worker loop. Returns once the publisher is destroyed.
    #[instrument(skip(self), fields(worker = self.lifecycle.name()))]
    pub async fn run(self: Arc<Self>) {
        let receiver = self
            .receiver
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        let Some(mut receiver) = receiver else {
            warn!("Publisher loop is already running");
            return;
        };

        while self.lifecycle.is_alive() {
            let solution = core_async::select! {
                _ = self.lifecycle.token().cancelled() => break,
                solution = receiver.recv() => match solution {
                    Some(solution) => solution,
                    None => break,
                },
            };

            if !self
                .lifecycle
                .compare_and_set(WorkerStatus::Starting, WorkerStatus::Started)
            {
                continue;
            }

            let result = self.publish(&solution).await;

            // Idle before reporting so the handler may submit again
            if !self
                .lifecycle
                .compare_and_set(WorkerStatus::Started, WorkerStatus::Stopped)
            {
                break;
            }
            (self.handler)(result);
        }
        debug!("Publisher loop exited");
    }

    async fn publish(&self, solution: &Solution) -> PublishResult {
        let plan = build_plan(solution, self.window);
        info!(
            items = plan.len(),
            change_set_id = solution.change_set_id,
            "Executing plan on behalf of {}",
            self.target_user
        );

        let execution = AssertUnwindSafe(self.runtime.execute_plan(plan, &self.target_user))
            .catch_unwind()
            .await;
        match execution {
            Ok(Ok(result)) => PublishResult::Executed(result),
            Ok(Err(e)) => PublishResult::Failed(e.into()),
            Err(_) => PublishResult::Failed(PlanningError::Publish(
                "plan execution panicked".to_string(),
            )),
        }
    }
}
