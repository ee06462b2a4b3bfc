//! Soft dependency checks reported as warnings when a plan is loaded.
//!
//! Dangling references and cycles do not invalidate a plan; the scheduler
//! simply never reaches the affected tasks and reports them as blocked.

use std::collections::{HashMap, HashSet};

use crate::plan::Plan;

/// Human-readable warnings for dangling dependency ids and dependency cycles.
pub fn dependency_warnings(plan: &Plan) -> Vec<String> {
    let ids: HashSet<&str> = plan.tasks.iter().map(|task| task.id.as_str()).collect();
    let mut warnings = Vec::new();

    for task in &plan.tasks {
        for dep in &task.dependencies {
            if dep == &task.id {
                warnings.push(format!("task '{}' depends on itself", task.id));
            } else if !ids.contains(dep.as_str()) {
                warnings.push(format!(
                    "task '{}' depends on unknown task '{dep}'",
                    task.id
                ));
            }
        }
    }

    for cycle in find_cycles(plan) {
        warnings.push(format!("dependency cycle: {}", cycle.join(" -> ")));
    }
    warnings
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Visiting,
    Done,
}

/// Cycles of length two or more, each reported once from its first task in
/// plan order. Self-loops are reported separately.
fn find_cycles(plan: &Plan) -> Vec<Vec<String>> {
    let edges: HashMap<&str, Vec<&str>> = plan
        .tasks
        .iter()
        .map(|task| {
            let deps = task
                .dependencies
                .iter()
                .map(String::as_str)
                .filter(|dep| *dep != task.id)
                .collect();
            (task.id.as_str(), deps)
        })
        .collect();

    let mut marks: HashMap<&str, Mark> = HashMap::new();
    let mut cycles = Vec::new();
    for task in &plan.tasks {
        let mut stack = Vec::new();
        visit(task.id.as_str(), &edges, &mut marks, &mut stack, &mut cycles);
    }
    cycles
}

fn visit<'a>(
    id: &'a str,
    edges: &HashMap<&'a str, Vec<&'a str>>,
    marks: &mut HashMap<&'a str, Mark>,
    stack: &mut Vec<&'a str>,
    cycles: &mut Vec<Vec<String>>,
) {
    match marks.get(id) {
        Some(Mark::Done) => return,
        Some(Mark::Visiting) => {
            if let Some(start) = stack.iter().position(|entry| *entry == id) {
                let mut cycle: Vec<String> =
                    stack[start..].iter().map(|entry| (*entry).to_string()).collect();
                cycle.push(id.to_string());
                cycles.push(cycle);
            }
            return;
        }
        None => {}
    }

    let Some(deps) = edges.get(id) else {
        return;
    };
    marks.insert(id, Mark::Visiting);
    stack.push(id);
    for dep in deps {
        visit(*dep, edges, marks, stack, cycles);
    }
    stack.pop();
    marks.insert(id, Mark::Done);
}
