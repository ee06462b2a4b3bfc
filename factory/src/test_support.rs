//! Test-only helpers: plan builders and a scripted agent.

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Result, anyhow};

use crate::io::agent::{Agent, AgentRequest, AgentRole};
use crate::io::plan_store::{plan_path, render_plan};
use crate::plan::{Plan, Project, Task, TaskStatus};

/// Deterministic project header.
pub fn sample_project() -> Project {
    Project {
        name: "demo".to_string(),
        description: "demo project".to_string(),
        tech_stack: vec!["Rust".to_string()],
        test_command: "cargo test".to_string(),
        quality_gate: None,
    }
}

/// Pending task with deterministic text fields.
pub fn task(id: &str, deps: &[&str]) -> Task {
    Task {
        id: id.to_string(),
        title: format!("{id} title"),
        description: format!("{id} description"),
        acceptance_criteria: vec![format!("{id} works")],
        dependencies: deps.iter().map(|dep| (*dep).to_string()).collect(),
        status: TaskStatus::Pending,
        passes: false,
        metrics: None,
    }
}

/// Mark a task as verified.
pub fn done(mut task: Task) -> Task {
    task.passes = true;
    task.status = TaskStatus::Completed;
    task
}

pub fn plan_with(tasks: Vec<Task>) -> Plan {
    Plan {
        project: sample_project(),
        tasks,
    }
}

/// Canonical JSON text for a plan, as an architect would print it.
pub fn plan_json(plan: &Plan) -> String {
    render_plan(plan).expect("render plan")
}

/// Write `plan` to the canonical location inside `workspace`.
pub fn write_plan_fixture(workspace: &Path, plan: &Plan) -> PathBuf {
    fs::create_dir_all(workspace).expect("create workspace");
    let path = plan_path(workspace);
    fs::write(&path, plan_json(plan)).expect("write plan fixture");
    path
}

/// Fresh temporary directory for a test workspace.
pub fn temp_workspace() -> tempfile::TempDir {
    tempfile::tempdir().expect("tempdir")
}

type ReplyFn = Box<dyn Fn(&AgentRequest) -> Result<String>>;

/// One scripted agent response.
pub enum ScriptedReply {
    /// Return the text.
    Text(String),
    /// Fail like a crashed or timed-out agent.
    Fail(String),
    /// Write `contents` to `path` (relative to the workdir), then return `reply`.
    WriteFile {
        path: PathBuf,
        contents: String,
        reply: String,
    },
    /// Arbitrary behaviour, e.g. requesting shutdown mid-run.
    Invoke(ReplyFn),
}

impl ScriptedReply {
    pub fn text(text: impl Into<String>) -> Self {
        ScriptedReply::Text(text.into())
    }

    pub fn fail(message: impl Into<String>) -> Self {
        ScriptedReply::Fail(message.into())
    }

    pub fn invoke(f: impl Fn(&AgentRequest) -> Result<String> + 'static) -> Self {
        ScriptedReply::Invoke(Box::new(f))
    }
}

/// Agent returning queued replies per role and recording every prompt.
///
/// When a role's queue is empty its fallback text is returned, or an error
/// when no fallback is set.
#[derive(Default)]
pub struct ScriptedAgent {
    queues: RefCell<HashMap<AgentRole, VecDeque<ScriptedReply>>>,
    fallbacks: HashMap<AgentRole, String>,
    calls: RefCell<Vec<(AgentRole, String)>>,
}

impl ScriptedAgent {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(self, role: AgentRole, reply: ScriptedReply) -> Self {
        self.push(role, reply);
        self
    }

    pub fn with_text(self, role: AgentRole, text: impl Into<String>) -> Self {
        self.with(role, ScriptedReply::text(text))
    }

    pub fn with_fallback(mut self, role: AgentRole, text: impl Into<String>) -> Self {
        self.fallbacks.insert(role, text.into());
        self
    }

    pub fn push(&self, role: AgentRole, reply: ScriptedReply) {
        self.queues
            .borrow_mut()
            .entry(role)
            .or_default()
            .push_back(reply);
    }

    /// Number of invocations for `role`.
    pub fn calls(&self, role: AgentRole) -> usize {
        self.calls
            .borrow()
            .iter()
            .filter(|(called, _)| *called == role)
            .count()
    }

    /// Prompts sent to `role`, in call order.
    pub fn prompts(&self, role: AgentRole) -> Vec<String> {
        self.calls
            .borrow()
            .iter()
            .filter(|(called, _)| *called == role)
            .map(|(_, prompt)| prompt.clone())
            .collect()
    }

    /// Roles in call order.
    pub fn call_order(&self) -> Vec<AgentRole> {
        self.calls.borrow().iter().map(|(role, _)| *role).collect()
    }
}

impl Agent for ScriptedAgent {
    fn invoke(&self, request: &AgentRequest) -> Result<String> {
        self.calls
            .borrow_mut()
            .push((request.role, request.prompt.clone()));
        let next = self
            .queues
            .borrow_mut()
            .get_mut(&request.role)
            .and_then(VecDeque::pop_front);
        match next {
            Some(ScriptedReply::Text(text)) => Ok(text),
            Some(ScriptedReply::Fail(message)) => Err(anyhow!(message)),
            Some(ScriptedReply::WriteFile {
                path,
                contents,
                reply,
            }) => {
                let target = request.workdir.join(path);
                if let Some(parent) = target.parent() {
                    fs::create_dir_all(parent)?;
                }
                fs::write(&target, contents)?;
                Ok(reply)
            }
            Some(ScriptedReply::Invoke(f)) => f(request),
            None => self
                .fallbacks
                .get(&request.role)
                .cloned()
                .ok_or_else(|| anyhow!("no scripted reply for {}", request.role)),
        }
    }
}
