//! Semantic invariants not expressible via JSON Schema.

use std::collections::HashSet;

use crate::plan::Plan;

/// Check plan invariants that make scheduling ambiguous:
/// - No blank task ids
/// - No duplicate task ids
pub fn validate_plan_invariants(plan: &Plan) -> Vec<String> {
    let mut errors = Vec::new();
    let mut seen = HashSet::new();
    for (index, task) in plan.tasks.iter().enumerate() {
        if task.id.trim().is_empty() {
            errors.push(format!("tasks[{index}]: id must not be blank"));
            continue;
        }
        if !seen.insert(task.id.as_str()) {
            errors.push(format!("tasks[{index}]: duplicate id '{}'", task.id));
        }
    }
    errors
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{plan_with, task};

    #[test]
    fn reports_duplicate_and_blank_ids() {
        let plan = plan_with(vec![task("a", &[]), task(" ", &[]), task("a", &[])]);
        let errors = validate_plan_invariants(&plan);
        assert_eq!(errors.len(), 2);
        assert!(errors.iter().any(|err| err.contains("blank")));
        assert!(errors.iter().any(|err| err.contains("duplicate id 'a'")));
    }

    #[test]
    fn empty_plan_is_valid() {
        assert!(validate_plan_invariants(&plan_with(Vec::new())).is_empty());
    }
}
