//! Plan (PRD) data model.
//!
//! The plan file is produced by an external agent, so deserialization is
//! tolerant: unknown task statuses coerce to `pending`, `null` or missing
//! arrays become empty, and numeric ids are read as strings.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(from = "RawPlan")]
pub struct Plan {
    pub project: Project,
    pub tasks: Vec<Task>,
}

/// Wire shape accepting `user_stories` as a legacy name for `tasks`.
#[derive(Deserialize)]
struct RawPlan {
    project: Project,
    #[serde(default)]
    tasks: Option<Vec<Task>>,
    #[serde(default)]
    user_stories: Option<Vec<Task>>,
}

impl From<RawPlan> for Plan {
    fn from(raw: RawPlan) -> Self {
        Plan {
            project: raw.project,
            tasks: raw.tasks.or(raw.user_stories).unwrap_or_default(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Project {
    pub name: String,
    pub description: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub tech_stack: Vec<String>,
    pub test_command: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality_gate: Option<QualityGate>,
}

/// Optional commands the verifier runs in addition to the test command.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct QualityGate {
    #[serde(default)]
    pub lint_command: Option<String>,
    #[serde(default)]
    pub type_check: Option<String>,
    #[serde(default)]
    pub security_scan: Option<String>,
}

impl QualityGate {
    /// Configured commands as `label: command` lines, skipping blanks.
    pub fn commands(&self) -> Vec<String> {
        [
            ("lint", &self.lint_command),
            ("type check", &self.type_check),
            ("security scan", &self.security_scan),
        ]
        .into_iter()
        .filter_map(|(label, cmd)| {
            cmd.as_deref()
                .map(str::trim)
                .filter(|c| !c.is_empty())
                .map(|c| format!("{label}: {c}"))
        })
        .collect()
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Task {
    #[serde(deserialize_with = "lenient_id")]
    pub id: String,
    pub title: String,
    pub description: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub acceptance_criteria: Vec<String>,
    #[serde(default, deserialize_with = "lenient_ids")]
    pub dependencies: Vec<String>,
    #[serde(default)]
    pub status: TaskStatus,
    /// Authoritative completion flag; `status` is advisory.
    #[serde(default)]
    pub passes: bool,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient_metrics"
    )]
    pub metrics: Option<TaskMetrics>,
}

impl Task {
    /// Add `seconds` of wall-clock time to the task's metrics.
    pub fn record_duration(&mut self, seconds: f64) {
        let metrics = self.metrics.get_or_insert_with(TaskMetrics::default);
        metrics.duration_seconds += seconds;
    }
}

#[derive(Clone, Copy, Debug, Default, Serialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    #[default]
    Pending,
    Implementation,
    Verification,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Implementation => "implementation",
            TaskStatus::Verification => "verification",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
        }
    }

    /// Parse a status string, coercing anything unrecognized to `Pending`.
    pub fn coerce(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "implementation" => TaskStatus::Implementation,
            "verification" => TaskStatus::Verification,
            "completed" => TaskStatus::Completed,
            "failed" => TaskStatus::Failed,
            _ => TaskStatus::Pending,
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for TaskStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Ok(match value {
            Value::String(raw) => TaskStatus::coerce(&raw),
            _ => TaskStatus::Pending,
        })
    }
}

/// Accounting the orchestrator writes but never reads back for decisions.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct TaskMetrics {
    #[serde(default)]
    pub tokens_used: u64,
    #[serde(default)]
    pub estimated_cost_usd: f64,
    #[serde(default)]
    pub duration_seconds: f64,
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Deserialize)]
#[serde(untagged)]
enum IdValue {
    Text(String),
    Number(serde_json::Number),
}

impl From<IdValue> for String {
    fn from(value: IdValue) -> Self {
        match value {
            IdValue::Text(text) => text,
            IdValue::Number(number) => number.to_string(),
        }
    }
}

fn lenient_id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    IdValue::deserialize(deserializer).map(String::from)
}

fn lenient_ids<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
    let ids = Option::<Vec<IdValue>>::deserialize(deserializer)?.unwrap_or_default();
    Ok(ids.into_iter().map(String::from).collect())
}

/// Malformed metrics are dropped rather than failing the whole plan.
fn lenient_metrics<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<TaskMetrics>, D::Error> {
    let value = Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn task_json(status: Value) -> Value {
        json!({
            "id": "T1",
            "title": "Setup",
            "description": "Create skeleton",
            "acceptance_criteria": ["builds"],
            "dependencies": [],
            "status": status,
            "passes": false
        })
    }

    #[test]
    fn unknown_status_coerces_to_pending() {
        for raw in [json!("in-progress"), json!(""), json!(42), Value::Null] {
            let task: Task = serde_json::from_value(task_json(raw)).expect("task");
            assert_eq!(task.status, TaskStatus::Pending);
        }
    }

    #[test]
    fn known_status_is_case_insensitive() {
        let task: Task = serde_json::from_value(task_json(json!("Verification"))).expect("task");
        assert_eq!(task.status, TaskStatus::Verification);
    }

    #[test]
    fn missing_optional_fields_default() {
        let plan: Plan = serde_json::from_value(json!({
            "project": {
                "name": "demo",
                "description": "demo app",
                "tech_stack": null,
                "test_command": "make test"
            },
            "tasks": [{ "id": 7, "title": "t", "description": "d", "dependencies": [3, "x"] }]
        }))
        .expect("plan");

        assert!(plan.project.tech_stack.is_empty());
        let task = &plan.tasks[0];
        assert_eq!(task.id, "7");
        assert_eq!(task.dependencies, vec!["3".to_string(), "x".to_string()]);
        assert!(task.acceptance_criteria.is_empty());
        assert!(!task.passes);
        assert_eq!(task.status, TaskStatus::Pending);
    }

    #[test]
    fn user_stories_alias_is_read_and_tasks_is_written() {
        let plan: Plan = serde_json::from_value(json!({
            "project": { "name": "n", "description": "d", "tech_stack": [], "test_command": "t" },
            "user_stories": [task_json(json!("pending"))]
        }))
        .expect("plan");
        assert_eq!(plan.tasks.len(), 1);

        let out = serde_json::to_value(&plan).expect("serialize");
        assert!(out.get("tasks").is_some());
        assert!(out.get("user_stories").is_none());
    }

    /// Verifies `tasks` wins when a plan carries both task keys.
    #[test]
    fn tasks_preferred_over_user_stories() {
        let mut legacy = task_json(json!("pending"));
        legacy["id"] = json!("LEGACY");
        let plan: Plan = serde_json::from_value(json!({
            "project": { "name": "n", "description": "d", "tech_stack": [], "test_command": "t" },
            "tasks": [task_json(json!("completed"))],
            "user_stories": [legacy]
        }))
        .expect("plan");
        assert_eq!(plan.tasks.len(), 1);
        assert_eq!(plan.tasks[0].id, "T1");

        let plan: Plan = serde_json::from_value(json!({
            "project": { "name": "n", "description": "d", "tech_stack": [], "test_command": "t" },
            "tasks": null,
            "user_stories": [task_json(json!("pending"))]
        }))
        .expect("plan");
        assert_eq!(plan.tasks.len(), 1);
    }

    #[test]
    fn serialize_then_parse_preserves_required_fields() {
        let plan = Plan {
            project: Project {
                name: "factory".to_string(),
                description: "demo".to_string(),
                tech_stack: vec!["Rust".to_string()],
                test_command: "cargo test".to_string(),
                quality_gate: Some(QualityGate {
                    lint_command: Some("cargo clippy".to_string()),
                    ..QualityGate::default()
                }),
            },
            tasks: vec![Task {
                id: "T1".to_string(),
                title: "Setup".to_string(),
                description: "Create skeleton".to_string(),
                acceptance_criteria: vec!["builds".to_string()],
                dependencies: vec!["T0".to_string()],
                status: TaskStatus::Verification,
                passes: false,
                metrics: None,
            }],
        };

        let text = serde_json::to_string_pretty(&plan).expect("serialize");
        let parsed: Plan = serde_json::from_str(&text).expect("parse");
        assert_eq!(parsed, plan);
    }

    #[test]
    fn malformed_metrics_are_dropped() {
        let mut raw = task_json(json!("pending"));
        raw["metrics"] = json!({ "tokens_used": "lots" });
        let task: Task = serde_json::from_value(raw).expect("task");
        assert!(task.metrics.is_none());
    }

    #[test]
    fn record_duration_accumulates() {
        let mut task: Task = serde_json::from_value(task_json(json!("pending"))).expect("task");
        task.record_duration(1.5);
        task.record_duration(2.0);
        assert_eq!(task.metrics.expect("metrics").duration_seconds, 3.5);
    }

    #[test]
    fn quality_gate_lists_configured_commands() {
        let gate = QualityGate {
            lint_command: Some("eslint .".to_string()),
            type_check: Some("  ".to_string()),
            security_scan: None,
        };
        assert_eq!(gate.commands(), vec!["lint: eslint .".to_string()]);
    }
}
