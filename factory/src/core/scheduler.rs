//! Dependency-ordered task selection.

use std::collections::HashSet;

use crate::plan::{Plan, Task};

/// Result of a scheduling decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    /// Index (plan order) of the next task to work on.
    Task(usize),
    /// No eligible task remains. `blocked` lists unfinished tasks that can
    /// never become eligible in the current plan.
    Complete { blocked: Vec<BlockedTask> },
}

/// An unfinished task together with the dependencies it is waiting on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockedTask {
    pub id: String,
    pub unmet: Vec<String>,
}

/// Ids of every task with `passes == true`.
pub fn completed_ids(plan: &Plan) -> HashSet<&str> {
    plan.tasks
        .iter()
        .filter(|task| task.passes)
        .map(|task| task.id.as_str())
        .collect()
}

/// A task is eligible when it has not passed and every dependency has.
pub fn is_eligible(task: &Task, completed: &HashSet<&str>) -> bool {
    !task.passes
        && task
            .dependencies
            .iter()
            .all(|dep| completed.contains(dep.as_str()))
}

/// Pick the first eligible task in plan order.
pub fn select_next(plan: &Plan) -> Selection {
    let completed = completed_ids(plan);
    if let Some(index) = plan
        .tasks
        .iter()
        .position(|task| is_eligible(task, &completed))
    {
        return Selection::Task(index);
    }

    let blocked = plan
        .tasks
        .iter()
        .filter(|task| !task.passes)
        .map(|task| BlockedTask {
            id: task.id.clone(),
            unmet: task
                .dependencies
                .iter()
                .filter(|dep| !completed.contains(dep.as_str()))
                .cloned()
                .collect(),
        })
        .collect();
    Selection::Complete { blocked }
}
