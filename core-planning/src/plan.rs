//! Publish plan construction.

use core_model::{PlanItem, Solution};

/// Builds the plan pushed to the runtime for `solution`.
///
/// Each user's queue is walked in order. Pinned tasks are always part of the
/// plan; unpinned ones fill it up to `window` items per user.
pub fn build_plan(solution: &Solution, window: usize) -> Vec<PlanItem> {
    let mut items = Vec::new();
    for user in &solution.users {
        let mut count = 0;
        for (index, task) in solution.user_tasks(user).enumerate() {
            if task.is_dummy() {
                continue;
            }
            if !task.pinned && count >= window {
                break;
            }
            items.push(PlanItem {
                task_id: task.id,
                user_id: user.id.clone(),
                index,
                published: true,
            });
            count += 1;
        }
    }
    items
}
