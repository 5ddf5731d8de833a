//! # Sync Context
//!
//! Bookkeeping shared by the synchronizer and the coordinator.
//!
//! ## Change sets
//!
//! Every non-empty batch sent to the solver opens a change set with a fresh,
//! increasing id. The solver records the id of the last set it applied on
//! its solution, and the coordinator marks a set *processed* once a solution
//! carrying it has been handed to the publisher. A best solution is only
//! published while its change set is unprocessed, so a plan never leaks out
//! before every submitted change is reflected in it.
//!
//! ## Task change times
//!
//! The last modification time seen for each task. An update whose time is
//! not newer than the recorded one has already been processed.
//!
//! ## Query window
//!
//! Polls ask for tasks modified since `previous_query_time`. The next window
//! starts at the poll timestamp shifted back by a safety margin, so updates
//! landing concurrently with a poll are seen again on the following one.
//! Delivery is at-least-once; task change times filter the repeats.

use chrono::{DateTime, TimeDelta, Utc};
use core_model::TaskId;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Default)]
struct ContextState {
    last_change_set_id: u64,
    current_change_set_id: u64,
    processed_change_set_id: Option<u64>,
    task_change_times: HashMap<TaskId, DateTime<Utc>>,
    previous_query_time: Option<DateTime<Utc>>,
    next_query_time: Option<DateTime<Utc>>,
}

#[derive(Debug)]
pub struct SyncContext {
    queries_shift: TimeDelta,
    state: Mutex<ContextState>,
}

impl SyncContext {
    pub fn new(queries_shift: TimeDelta) -> Self {
        Self {
            queries_shift,
            state: Mutex::new(ContextState::default()),
        }
    }

    fn state(&self) -> MutexGuard<'_, ContextState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    // ------------------------------------------------------------------
    // Change sets
    // ------------------------------------------------------------------

    /// Allocates the id for a new change set.
    pub fn next_change_set_id(&self) -> u64 {
        let mut state = self.state();
        state.last_change_set_id += 1;
        state.last_change_set_id
    }

    pub fn current_change_set_id(&self) -> u64 {
        self.state().current_change_set_id
    }

    /// Records the change set reflected by the latest solver solution.
    pub fn set_current_change_set_id(&self, id: u64) {
        let mut state = self.state();
        state.current_change_set_id = id;
        if id > state.last_change_set_id {
            state.last_change_set_id = id;
        }
    }

    pub fn is_processed_change_set(&self, id: u64) -> bool {
        self.state()
            .processed_change_set_id
            .is_some_and(|processed| processed >= id)
    }

    pub fn set_processed_change_set(&self, id: u64) {
        self.state().processed_change_set_id = Some(id);
    }

    pub fn is_current_change_set_processed(&self) -> bool {
        let state = self.state();
        state
            .processed_change_set_id
            .is_some_and(|processed| processed >= state.current_change_set_id)
    }

    pub fn clear_processed_change_set(&self) {
        self.state().processed_change_set_id = None;
    }

    // ------------------------------------------------------------------
    // Task change times
    // ------------------------------------------------------------------

    pub fn set_task_change_time(&self, task_id: TaskId, change_time: DateTime<Utc>) {
        self.state().task_change_times.insert(task_id, change_time);
    }

    /// True if a change at `change_time` or later was already recorded.
    pub fn is_processed_task_change(&self, task_id: TaskId, change_time: DateTime<Utc>) -> bool {
        self.state()
            .task_change_times
            .get(&task_id)
            .is_some_and(|seen| change_time <= *seen)
    }

    pub fn clear_task_change_times(&self) {
        self.state().task_change_times.clear();
    }

    /// Forgets changes older than `until`; queries never reach back past it.
    pub fn clear_task_change_times_before(&self, until: DateTime<Utc>) {
        self.state()
            .task_change_times
            .retain(|_, seen| *seen >= until);
    }

    pub fn task_change_count(&self) -> usize {
        self.state().task_change_times.len()
    }

    // ------------------------------------------------------------------
    // Query window
    // ------------------------------------------------------------------

    pub fn previous_query_time(&self) -> Option<DateTime<Utc>> {
        self.state().previous_query_time
    }

    pub fn set_previous_query_time(&self, time: DateTime<Utc>) {
        self.state().previous_query_time = Some(time);
    }

    pub fn next_query_time(&self) -> Option<DateTime<Utc>> {
        self.state().next_query_time
    }

    pub fn set_next_query_time(&self, time: DateTime<Utc>) {
        self.state().next_query_time = Some(time);
    }

    /// `time` moved back by the configured safety margin.
    pub fn shift_query_time(&self, time: DateTime<Utc>) -> DateTime<Utc> {
        time.checked_sub_signed(self.queries_shift).unwrap_or(time)
    }

    /// True when `candidate` keeps the minimal (zero) distance after
    /// `previous`, i.e. the query window does not move backwards.
    pub fn has_minimal_distance(
        &self,
        previous: Option<DateTime<Utc>>,
        candidate: DateTime<Utc>,
    ) -> bool {
        previous.map_or(true, |previous| candidate >= previous)
    }
}
