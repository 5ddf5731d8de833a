//! Runs the opaque [`Solver`] on a dedicated worker.
//!
//! `start` hands a problem to the worker through a single-slot channel.
//! Best-solution events are forwarded on an unbounded channel so the solver
//! never calls back into the coordinator directly.

use crate::error::{PlanningError, Result};
use crate::lifecycle::{WorkerLifecycle, WorkerStatus};
use bridge_traits::{BestSolutionEvent, BestSolutionListener, Solver};
use core_async::sync::{mpsc, CancellationToken};
use core_model::{ChangeCommand, Solution};
use core_async::future::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, error, info, instrument, warn};

pub struct SolverRunner {
    lifecycle: WorkerLifecycle,
    solver: Arc<dyn Solver>,
    events: mpsc::UnboundedSender<BestSolutionEvent>,
    sender: mpsc::Sender<Solution>,
    receiver: Mutex<Option<mpsc::Receiver<Solution>>>,
    /// Cancelled to stop the current solve
    run_token: Mutex<Option<CancellationToken>>,
    start_count: AtomicU64,
}

impl SolverRunner {
    pub fn new(
        solver: Arc<dyn Solver>,
        events: mpsc::UnboundedSender<BestSolutionEvent>,
    ) -> Self {
        let (sender, receiver) = mpsc::channel(1);
        Self {
            lifecycle: WorkerLifecycle::new("solver"),
            solver,
            events,
            sender,
            receiver: Mutex::new(Some(receiver)),
            run_token: Mutex::new(None),
            start_count: AtomicU64::new(0),
        }
    }

    /// Starts solving `solution`. Only valid while stopped.
    pub fn start(&self, solution: Solution) -> Result<()> {
        self.lifecycle
            .transition(WorkerStatus::Stopped, WorkerStatus::Starting)?;

        let tasks = solution.tasks.len();
        if self.sender.try_send(solution).is_err() {
            self.lifecycle
                .compare_and_set(WorkerStatus::Starting, WorkerStatus::Stopped);
            return Err(PlanningError::Destroyed(self.lifecycle.name()));
        }
        self.start_count.fetch_add(1, Ordering::Relaxed);
        info!(tasks, "Solver start requested");
        Ok(())
    }

    /// Asks a starting or running solver to stop. The worker returns to
    /// `STOPPED` once the solve has returned.
    pub fn stop(&self) {
        let stopping = self
            .lifecycle
            .compare_and_set(WorkerStatus::Started, WorkerStatus::Stopping)
            || self
                .lifecycle
                .compare_and_set(WorkerStatus::Starting, WorkerStatus::Stopping);
        if !stopping {
            debug!(status = %self.status(), "Solver stop ignored");
            return;
        }
        if let Some(token) = self.run_token().as_ref() {
            token.cancel();
        }
        info!("Solver stop requested");
    }

    pub fn add_change_commands(&self, commands: Vec<ChangeCommand>) -> Result<()> {
        if !self.is_started() {
            return Err(PlanningError::SolverNotStarted);
        }
        self.solver.add_change_commands(commands)?;
        Ok(())
    }

    pub fn status(&self) -> WorkerStatus {
        self.lifecycle.status()
    }

    pub fn is_started(&self) -> bool {
        self.status() == WorkerStatus::Started
    }

    pub fn is_stopped(&self) -> bool {
        self.status() == WorkerStatus::Stopped
    }

    pub fn is_destroyed(&self) -> bool {
        self.lifecycle.is_destroyed()
    }

    /// Number of accepted `start` calls.
    pub fn start_count(&self) -> u64 {
        self.start_count.load(Ordering::Relaxed)
    }

    pub fn destroy(&self) -> bool {
        let destroyed = self.lifecycle.destroy();
        if destroyed {
            self.solver.terminate_early();
            debug!("Solver runner destroyed");
        }
        destroyed
    }

    /// Worker loop. Returns once the runner is destroyed.
    #[instrument(skip(self), fields(worker = self.lifecycle.name()))]
    pub async fn run(self: Arc<Self>) {
        let Some(mut receiver) = self.take_receiver() else {
            warn!("Solver runner loop is already running");
            return;
        };

        while self.lifecycle.is_alive() {
            let problem = core_async::select! {
                _ = self.lifecycle.token().cancelled() => break,
                problem = receiver.recv() => match problem {
                    Some(problem) => problem,
                    None => break,
                },
            };

            let token = self.lifecycle.token().child_token();
            *self.run_token() = Some(token.clone());

            if !self
                .lifecycle
                .compare_and_set(WorkerStatus::Starting, WorkerStatus::Started)
            {
                debug!("Solver stopped before it started");
                self.lifecycle
                    .compare_and_set(WorkerStatus::Stopping, WorkerStatus::Stopped);
                continue;
            }

            self.solve(problem, token).await;
            self.run_token().take();

            if !self
                .lifecycle
                .compare_and_set(WorkerStatus::Started, WorkerStatus::Stopped)
            {
                self.lifecycle
                    .compare_and_set(WorkerStatus::Stopping, WorkerStatus::Stopped);
            }
        }
        debug!("Solver runner loop exited");
    }

    async fn solve(&self, problem: Solution, token: CancellationToken) {
        let events = self.events.clone();
        let listener: BestSolutionListener = Arc::new(move |event: BestSolutionEvent| {
            // Closed only while shutting down
            let _ = events.send(event);
        });

        let mut solve =
            std::pin::pin!(AssertUnwindSafe(self.solver.solve(problem, listener)).catch_unwind());
        let finished = core_async::select! {
            biased;
            outcome = &mut solve => Some(outcome),
            _ = token.cancelled() => None,
        };
        let outcome = match finished {
            Some(outcome) => outcome,
            None => {
                self.solver.terminate_early();
                solve.await
            }
        };

        match outcome {
            Ok(Ok(solution)) => info!(score = %solution.score, "Solver finished"),
            Ok(Err(e)) => error!("Solver failed: {}", e),
            Err(_) => error!("Solver panicked"),
        }
    }

    fn take_receiver(&self) -> Option<mpsc::Receiver<Solution>> {
        self.receiver
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take()
    }

    fn run_token(&self) -> MutexGuard<'_, Option<CancellationToken>> {
        self.run_token
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{wait_until, BlockingSolver};
    use async_trait::async_trait;
    use bridge_traits::error::Result as BridgeResult;
    use core_async::time::{timeout, Duration};

    struct PanickingSolver;

    #[async_trait]
    impl Solver for PanickingSolver {
        async fn solve(&self, _: Solution, _: BestSolutionListener) -> BridgeResult<Solution> {
            panic!("solver blew up");
        }

        fn terminate_early(&self) -> bool {
            false
        }

        fn add_change_commands(&self, _: Vec<ChangeCommand>) -> BridgeResult<()> {
            Ok(())
        }
    }

    fn runner(
        solver: Arc<dyn Solver>,
    ) -> (Arc<SolverRunner>, mpsc::UnboundedReceiver<BestSolutionEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(SolverRunner::new(solver, tx)), rx)
    }

    #[tokio::test]
    async fn test_start_stop_restart() {
        let solver = Arc::new(BlockingSolver::default());
        let (runner, mut events) = runner(solver.clone());
        let worker = tokio::spawn(runner.clone().run());

        runner.start(Solution::default()).unwrap();
        wait_until(|| runner.is_started() && solver.is_solving()).await;

        solver.emit(Solution::default(), true);
        let event = timeout(Duration::from_secs(1), events.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(event.every_change_applied);

        runner
            .add_change_commands(vec![ChangeCommand::ChangeSetMarker { change_set_id: 1 }])
            .unwrap();
        assert_eq!(solver.batch_count(), 1);

        runner.stop();
        wait_until(|| runner.is_stopped()).await;

        runner.start(Solution::default()).unwrap();
        wait_until(|| runner.is_started()).await;
        assert_eq!(runner.start_count(), 2);

        runner.destroy();
        timeout(Duration::from_secs(1), worker).await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_second_start_is_a_state_conflict() {
        let (runner, _events) = runner(Arc::new(BlockingSolver::default()));
        runner.start(Solution::default()).unwrap();

        let err = runner.start(Solution::default()).unwrap_err();
        assert!(matches!(err, PlanningError::StateConflict { .. }));
        assert_eq!(runner.start_count(), 1);
    }

    #[tokio::test]
    async fn test_changes_rejected_unless_started() {
        let (runner, _events) = runner(Arc::new(BlockingSolver::default()));
        let err = runner.add_change_commands(Vec::new()).unwrap_err();
        assert!(matches!(err, PlanningError::SolverNotStarted));
    }

    #[tokio::test]
    async fn test_stop_before_worker_picks_up_job() {
        let (runner, _events) = runner(Arc::new(BlockingSolver::default()));
        runner.start(Solution::default()).unwrap();
        runner.stop();
        assert_eq!(runner.status(), WorkerStatus::Stopping);

        let worker = tokio::spawn(runner.clone().run());
        wait_until(|| runner.is_stopped()).await;
        runner.destroy();
        timeout(Duration::from_secs(1), worker).await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_panicking_solver_returns_to_stopped() {
        let (runner, _events) = runner(Arc::new(PanickingSolver));
        let worker = tokio::spawn(runner.clone().run());

        runner.start(Solution::default()).unwrap();
        wait_until(|| runner.is_stopped()).await;

        runner.destroy();
        timeout(Duration::from_secs(1), worker).await.unwrap().unwrap();
        assert!(runner.is_destroyed());
    }

    #[tokio::test]
    async fn test_destroy_wakes_idle_worker() {
        let (runner, _events) = runner(Arc::new(BlockingSolver::default()));
        let worker = tokio::spawn(runner.clone().run());

        assert!(runner.destroy());
        assert!(!runner.destroy());
        timeout(Duration::from_secs(1), worker).await.unwrap().unwrap();
        assert!(runner.start(Solution::default()).is_err());
    }
}
