//! Verification loop: worker attempts checked by the verifier role.

use std::time::Instant;

use anyhow::Result;
use tracing::{info, instrument, warn};

use crate::context::RunContext;
use crate::io::agent::{Agent, AgentHandle, AgentRole};
use crate::io::prompt::PromptLibrary;
use crate::plan::TaskStatus;
use crate::worker::run_worker_loop;

/// Sentinel a verifier prints when every acceptance criterion holds.
pub const PASS_SENTINEL: &str = "VERIFICATION_PASSED";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VerificationLimits {
    /// Worker + verifier rounds before the task is failed.
    pub cycles: u32,
    /// Worker invocations per round.
    pub worker_iterations: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerificationOutcome {
    Passed { cycles: u32 },
    /// Task marked `failed` and persisted.
    Exhausted { cycles: u32 },
}

/// Drive the task at `index` through worker and verifier rounds.
///
/// Each state transition is persisted before the next agent call. A passing
/// verification sets `passes` and `completed`; exhaustion sets `failed`.
#[instrument(skip_all, fields(task_id))]
pub fn verify_task<A: Agent>(
    ctx: &mut RunContext,
    agents: &AgentHandle<A>,
    prompts: &PromptLibrary,
    index: usize,
    limits: VerificationLimits,
) -> Result<VerificationOutcome> {
    let task_id = ctx.task(index)?.id.clone();
    tracing::Span::current().record("task_id", task_id.as_str());
    let started = Instant::now();
    let mut feedback: Option<String> = None;

    for cycle in 1..=limits.cycles {
        ctx.checkpoint()?;
        info!(cycle, max_cycles = limits.cycles, "verification cycle");

        ctx.set_task_status(index, TaskStatus::Implementation)?;
        let worker_prompt =
            prompts.render_worker(ctx.project()?, ctx.task(index)?, feedback.as_deref())?;
        let worker = run_worker_loop(
            agents,
            ctx.workspace(),
            &worker_prompt,
            limits.worker_iterations,
            ctx.shutdown(),
        )?;
        if !worker.completed {
            warn!(
                cycle,
                iterations = worker.iterations,
                "worker did not report completion, verifying anyway"
            );
        }

        ctx.checkpoint()?;
        ctx.set_task_status(index, TaskStatus::Verification)?;
        let verifier_prompt = prompts.render_verifier(ctx.project()?, ctx.task(index)?)?;
        let verdict = match agents.invoke(AgentRole::Verifier, verifier_prompt, ctx.workspace()) {
            Ok(text) => text,
            Err(err) => {
                warn!(cycle, err = %err, "verifier invocation failed");
                format!("Verifier invocation failed: {err:#}")
            }
        };

        if verdict.contains(PASS_SENTINEL) {
            ctx.backup_plan();
            let task = ctx.task_mut(index)?;
            task.passes = true;
            task.status = TaskStatus::Completed;
            task.record_duration(started.elapsed().as_secs_f64());
            ctx.persist()?;
            info!(
                cycle,
                duration_ms = started.elapsed().as_millis() as u64,
                "task verified"
            );
            return Ok(VerificationOutcome::Passed { cycles: cycle });
        }

        warn!(cycle, "verification failed");
        feedback = Some(verdict);
    }

    let task = ctx.task_mut(index)?;
    task.status = TaskStatus::Failed;
    task.record_duration(started.elapsed().as_secs_f64());
    ctx.persist()?;
    warn!(cycles = limits.cycles, "verification cycles exhausted");
    Ok(VerificationOutcome::Exhausted {
        cycles: limits.cycles,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::agent::AgentSettings;
    use crate::io::plan_store::{PlanValidation, load_plan};
    use crate::shutdown::ShutdownToken;
    use crate::test_support::{ScriptedAgent, ScriptedReply, plan_with, task};

    const LIMITS: VerificationLimits = VerificationLimits {
        cycles: 3,
        worker_iterations: 2,
    };

    fn context(dir: &std::path::Path) -> RunContext {
        let mut ctx = RunContext::new(dir, ShutdownToken::unbounded());
        ctx.set_plan(plan_with(vec![task("T1", &[]), task("T2", &["T1"])]));
        ctx
    }

    fn persisted(ctx: &RunContext) -> crate::plan::Plan {
        match load_plan(ctx.plan_path()).expect("load") {
            Some(PlanValidation::Valid(plan)) => plan,
            other => panic!("unexpected plan state: {other:?}"),
        }
    }

    /// Verifies a passing verifier marks the task completed and records duration.
    #[test]
    fn pass_marks_task_completed() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut ctx = context(temp.path());
        let agent = ScriptedAgent::new()
            .with_text(AgentRole::Worker, "<promise>COMPLETE</promise>")
            .with_text(AgentRole::Verifier, "All good. VERIFICATION_PASSED");
        let handle = AgentHandle::new(&agent, AgentSettings::default());
        let prompts = PromptLibrary::embedded().expect("prompts");

        let outcome = verify_task(&mut ctx, &handle, &prompts, 0, LIMITS).expect("verify");

        assert_eq!(outcome, VerificationOutcome::Passed { cycles: 1 });
        let plan = persisted(&ctx);
        assert!(plan.tasks[0].passes);
        assert_eq!(plan.tasks[0].status, TaskStatus::Completed);
        assert!(plan.tasks[0].metrics.is_some());
        assert_eq!(plan.tasks[1], task("T2", &["T1"]));
    }

    /// Verifies verifier feedback is fed to the next worker round as a fix request.
    #[test]
    fn failure_feedback_reaches_next_worker_prompt() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut ctx = context(temp.path());
        let agent = ScriptedAgent::new()
            .with_fallback(AgentRole::Worker, "<promise>COMPLETE</promise>")
            .with_text(AgentRole::Verifier, "1. test_add fails")
            .with_text(AgentRole::Verifier, "VERIFICATION_PASSED");
        let handle = AgentHandle::new(&agent, AgentSettings::default());
        let prompts = PromptLibrary::embedded().expect("prompts");

        let outcome = verify_task(&mut ctx, &handle, &prompts, 0, LIMITS).expect("verify");

        assert_eq!(outcome, VerificationOutcome::Passed { cycles: 2 });
        let worker_prompts = agent.prompts(AgentRole::Worker);
        assert_eq!(worker_prompts.len(), 2);
        assert!(!worker_prompts[0].contains("FIX REQUEST"));
        assert!(worker_prompts[1].contains("FIX REQUEST: 1. test_add fails"));
    }

    /// Verifies exhaustion marks the task failed and leaves other tasks untouched.
    #[test]
    fn exhaustion_marks_task_failed() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut ctx = context(temp.path());
        let agent = ScriptedAgent::new()
            .with_fallback(AgentRole::Worker, "tried")
            .with(AgentRole::Verifier, ScriptedReply::fail("verifier crashed"))
            .with_fallback(AgentRole::Verifier, "still broken");
        let handle = AgentHandle::new(&agent, AgentSettings::default());
        let prompts = PromptLibrary::embedded().expect("prompts");

        let outcome = verify_task(&mut ctx, &handle, &prompts, 0, LIMITS).expect("verify");

        assert_eq!(outcome, VerificationOutcome::Exhausted { cycles: 3 });
        assert_eq!(agent.calls(AgentRole::Verifier), 3);
        assert_eq!(agent.calls(AgentRole::Worker), 6);
        assert!(
            agent.prompts(AgentRole::Worker)[2].contains("FIX REQUEST: Verifier invocation failed")
        );
        let plan = persisted(&ctx);
        assert!(!plan.tasks[0].passes);
        assert_eq!(plan.tasks[0].status, TaskStatus::Failed);
        assert_eq!(plan.tasks[1], task("T2", &["T1"]));
    }
}
