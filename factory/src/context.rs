//! Per-run mutable state shared by the orchestration phases.
//!
//! [`RunContext`] owns the in-memory working copy of the plan. Every phase
//! mutates the plan through it and persists through it, so the shutdown path
//! can always flush the latest snapshot.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use tracing::{debug, info, warn};

use crate::io::plan_store::{self, plan_path};
use crate::plan::{Plan, Project, Task, TaskStatus};
use crate::shutdown::{Cancelled, ShutdownToken};

#[derive(Debug)]
pub struct RunContext {
    workspace: PathBuf,
    plan_path: PathBuf,
    plan: Option<Plan>,
    shutdown: ShutdownToken,
}

impl RunContext {
    pub fn new(workspace: impl Into<PathBuf>, shutdown: ShutdownToken) -> Self {
        let workspace = workspace.into();
        let plan_path = plan_path(&workspace);
        Self {
            workspace,
            plan_path,
            plan: None,
            shutdown,
        }
    }

    pub fn workspace(&self) -> &Path {
        &self.workspace
    }

    pub fn plan_path(&self) -> &Path {
        &self.plan_path
    }

    pub fn plan(&self) -> Option<&Plan> {
        self.plan.as_ref()
    }

    pub fn shutdown(&self) -> &ShutdownToken {
        &self.shutdown
    }

    /// Replace the working copy (after an architect draft or a re-read).
    pub fn set_plan(&mut self, plan: Plan) {
        self.plan = Some(plan);
    }

    pub fn project(&self) -> Result<&Project> {
        self.plan
            .as_ref()
            .map(|plan| &plan.project)
            .ok_or_else(|| anyhow!("no plan loaded"))
    }

    pub fn task(&self, index: usize) -> Result<&Task> {
        self.plan
            .as_ref()
            .and_then(|plan| plan.tasks.get(index))
            .ok_or_else(|| anyhow!("no task at index {index}"))
    }

    pub fn task_mut(&mut self, index: usize) -> Result<&mut Task> {
        self.plan
            .as_mut()
            .and_then(|plan| plan.tasks.get_mut(index))
            .ok_or_else(|| anyhow!("no task at index {index}"))
    }

    /// Set a task's status and persist immediately.
    pub fn set_task_status(&mut self, index: usize, status: TaskStatus) -> Result<()> {
        let task = self.task_mut(index)?;
        debug!(task_id = %task.id, from = %task.status, to = %status, "task status");
        task.status = status;
        self.persist()
    }

    /// Atomically write the working copy to the plan file.
    pub fn persist(&self) -> Result<()> {
        let plan = self
            .plan
            .as_ref()
            .ok_or_else(|| anyhow!("no plan loaded to persist"))?;
        plan_store::write_plan(&self.plan_path, plan)
            .with_context(|| format!("persist plan {}", self.plan_path.display()))
    }

    /// Best-effort backup of the on-disk plan before a state-changing write.
    pub fn backup_plan(&self) {
        if let Err(err) = plan_store::backup_plan(&self.plan_path) {
            warn!(err = %err, "plan backup failed");
        }
    }

    /// Best-effort backup of plan text captured before an agent could rewrite the file.
    pub fn backup_plan_text(&self, contents: &str) {
        if let Err(err) = plan_store::write_backup(&self.plan_path, contents) {
            warn!(err = %err, "plan backup failed");
        }
    }

    /// Loop-boundary cancellation check.
    pub fn checkpoint(&self) -> Result<(), Cancelled> {
        self.shutdown.check()
    }

    /// Persist whatever snapshot is held, for the shutdown and fatal-error paths.
    ///
    /// Returns `false` when no plan has been loaded yet.
    pub fn flush_snapshot(&self) -> Result<bool> {
        if self.plan.is_none() {
            debug!("no plan snapshot to flush");
            return Ok(false);
        }
        self.persist()?;
        info!(path = %self.plan_path.display(), "plan snapshot saved");
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::plan_store::{PlanValidation, load_plan};
    use crate::shutdown::CancelReason;
    use crate::test_support::{plan_with, task};

    #[test]
    fn status_changes_are_persisted() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut ctx = RunContext::new(temp.path(), ShutdownToken::unbounded());
        ctx.set_plan(plan_with(vec![task("a", &[])]));

        ctx.set_task_status(0, TaskStatus::Implementation)
            .expect("set status");

        let Some(PlanValidation::Valid(plan)) = load_plan(ctx.plan_path()).expect("load") else {
            panic!("expected persisted plan");
        };
        assert_eq!(plan.tasks[0].status, TaskStatus::Implementation);
    }

    #[test]
    fn flush_without_plan_is_a_no_op() {
        let temp = tempfile::tempdir().expect("tempdir");
        let ctx = RunContext::new(temp.path(), ShutdownToken::unbounded());
        assert!(!ctx.flush_snapshot().expect("flush"));
        assert!(!ctx.plan_path().exists());
    }

    #[test]
    fn unknown_task_index_is_an_error() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut ctx = RunContext::new(temp.path(), ShutdownToken::unbounded());
        ctx.set_plan(plan_with(Vec::new()));
        assert!(ctx.task_mut(0).is_err());
    }

    #[test]
    fn checkpoint_reports_cancellation() {
        let temp = tempfile::tempdir().expect("tempdir");
        let token = ShutdownToken::unbounded();
        let ctx = RunContext::new(temp.path(), token.clone());
        assert!(ctx.checkpoint().is_ok());
        token.cancel(CancelReason::Signal);
        assert_eq!(ctx.checkpoint().unwrap_err().reason, CancelReason::Signal);
    }
}
