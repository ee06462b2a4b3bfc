//! Top-level run: scenario detection, planning, then task execution.
//!
//! Expected terminations are reported as [`RunOutcome`] values. Only
//! persistence failures and other unexpected errors surface as `Err`.

use anyhow::Result;
use tracing::{error, info, instrument, warn};

use crate::context::RunContext;
use crate::core::dependencies::dependency_warnings;
use crate::core::scenario::Scenario;
use crate::core::scheduler::{Selection, select_next};
use crate::exit_codes;
use crate::io::agent::{Agent, AgentHandle};
use crate::io::config::FactoryConfig;
use crate::io::plan_store::{PlanValidation, load_plan};
use crate::io::prompt::PromptLibrary;
use crate::io::workspace::ensure_workspace;
use crate::negotiate::{NegotiationOutcome, NegotiationRequest, negotiate_plan};
use crate::scenario::detect_scenario;
use crate::shutdown::{CancelReason, Cancelled};
use crate::verify::{VerificationLimits, VerificationOutcome, verify_task};

/// What the operator asked for.
#[derive(Debug, Clone, Default)]
pub struct RunRequest {
    pub goal: Option<String>,
    pub scenario_override: Option<Scenario>,
    /// Report the scenario and next task without side effects.
    pub dry_run: bool,
    /// Stop after planning.
    pub plan_only: bool,
    pub verbose_planning: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunLimits {
    pub planning_cycles: u32,
    pub verification_cycles: u32,
    pub worker_iterations: u32,
    pub file_tree_limit: usize,
}

impl RunLimits {
    pub fn from_config(config: &FactoryConfig) -> Self {
        Self {
            planning_cycles: config.planning_cycles,
            verification_cycles: config.verification_cycles,
            worker_iterations: config.worker_iterations,
            file_tree_limit: config.file_tree_limit,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// No eligible task remains. `blocked` counts unfinished tasks that can
    /// never become eligible.
    Completed {
        tasks_completed: usize,
        blocked: usize,
    },
    DryRun {
        scenario: Scenario,
        next_task: Option<String>,
    },
    PlanOnly,
    PlanningExhausted {
        cycles: u32,
    },
    InvalidPlan {
        errors: Vec<String>,
    },
    TaskFailed {
        task_id: String,
        cycles: u32,
    },
    Cancelled(CancelReason),
}

impl RunOutcome {
    pub fn exit_code(&self) -> i32 {
        match self {
            RunOutcome::Completed { .. }
            | RunOutcome::DryRun { .. }
            | RunOutcome::PlanOnly
            | RunOutcome::Cancelled(CancelReason::Signal) => exit_codes::OK,
            RunOutcome::PlanningExhausted { .. }
            | RunOutcome::InvalidPlan { .. }
            | RunOutcome::TaskFailed { .. }
            | RunOutcome::Cancelled(CancelReason::Timeout) => exit_codes::FAILURE,
        }
    }
}

/// Run the factory to completion, cancellation or the first fatal outcome.
///
/// On cancellation the context's plan snapshot is flushed before returning.
pub fn run_factory<A: Agent>(
    ctx: &mut RunContext,
    agents: &AgentHandle<A>,
    prompts: &PromptLibrary,
    request: &RunRequest,
    limits: RunLimits,
) -> Result<RunOutcome> {
    match run_phases(ctx, agents, prompts, request, limits) {
        Ok(outcome) => Ok(outcome),
        Err(err) => {
            let Some(cancelled) = err.downcast_ref::<Cancelled>().copied() else {
                return Err(err);
            };
            warn!(reason = %cancelled.reason, "shutting down");
            ctx.flush_snapshot()?;
            Ok(RunOutcome::Cancelled(cancelled.reason))
        }
    }
}

/// Fatal-error exit path: log, save whatever plan snapshot is held, exit 1.
pub fn recover_fatal(ctx: &RunContext, err: &anyhow::Error) -> i32 {
    error!("{err:#}");
    if let Err(flush_err) = ctx.flush_snapshot() {
        warn!(err = %flush_err, "failed to save plan snapshot");
    }
    exit_codes::FAILURE
}

fn run_phases<A: Agent>(
    ctx: &mut RunContext,
    agents: &AgentHandle<A>,
    prompts: &PromptLibrary,
    request: &RunRequest,
    limits: RunLimits,
) -> Result<RunOutcome> {
    let goal = request
        .goal
        .as_deref()
        .map(str::trim)
        .filter(|goal| !goal.is_empty());
    let scenario = detect_scenario(ctx.workspace(), goal.is_some(), request.scenario_override)?;
    info!(%scenario, workspace = %ctx.workspace().display(), "scenario");

    if request.dry_run {
        return dry_run(ctx, scenario);
    }

    ctx.checkpoint()?;
    ensure_workspace(ctx.workspace())?;

    if let Some(goal) = goal {
        let negotiation = NegotiationRequest {
            goal,
            scenario,
            max_cycles: limits.planning_cycles,
            file_tree_limit: limits.file_tree_limit,
            verbose: request.verbose_planning,
        };
        match negotiate_plan(ctx, agents, prompts, &negotiation)? {
            NegotiationOutcome::Approved { cycles } => info!(cycles, "planning complete"),
            NegotiationOutcome::Skipped => {}
            NegotiationOutcome::Exhausted { cycles } => {
                return Ok(RunOutcome::PlanningExhausted { cycles });
            }
        }
    }

    if request.plan_only {
        info!("plan-only run, skipping execution");
        return Ok(RunOutcome::PlanOnly);
    }

    execute_tasks(ctx, agents, prompts, limits)
}

fn dry_run(ctx: &RunContext, scenario: Scenario) -> Result<RunOutcome> {
    let next_task = match load_plan(ctx.plan_path())? {
        Some(PlanValidation::Valid(plan)) => match select_next(&plan) {
            Selection::Task(index) => Some(plan.tasks[index].id.clone()),
            Selection::Complete { .. } => None,
        },
        Some(PlanValidation::Invalid(errors)) => {
            warn!(errors = ?errors, "plan on disk is invalid");
            None
        }
        None => None,
    };
    Ok(RunOutcome::DryRun {
        scenario,
        next_task,
    })
}

#[instrument(skip_all)]
fn execute_tasks<A: Agent>(
    ctx: &mut RunContext,
    agents: &AgentHandle<A>,
    prompts: &PromptLibrary,
    limits: RunLimits,
) -> Result<RunOutcome> {
    info!("execution phase");
    let verification = VerificationLimits {
        cycles: limits.verification_cycles,
        worker_iterations: limits.worker_iterations,
    };
    let mut warned = false;

    loop {
        ctx.checkpoint()?;

        // The agent may edit the plan file between tasks.
        let plan = match load_plan(ctx.plan_path())? {
            Some(PlanValidation::Valid(plan)) => plan,
            Some(PlanValidation::Invalid(errors)) => {
                error!(errors = ?errors, "plan file is invalid");
                return Ok(RunOutcome::InvalidPlan { errors });
            }
            None => {
                warn!(path = %ctx.plan_path().display(), "no plan to execute");
                return Ok(RunOutcome::Completed {
                    tasks_completed: 0,
                    blocked: 0,
                });
            }
        };
        if !warned {
            for warning in dependency_warnings(&plan) {
                warn!("{warning}");
            }
            warned = true;
        }

        let selection = select_next(&plan);
        ctx.set_plan(plan);
        let index = match selection {
            Selection::Task(index) => index,
            Selection::Complete { blocked } => {
                let tasks_completed = ctx
                    .plan()
                    .map_or(0, |plan| plan.tasks.iter().filter(|task| task.passes).count());
                for task in &blocked {
                    warn!(task_id = %task.id, unmet = ?task.unmet, "task blocked by unmet dependencies");
                }
                info!(tasks_completed, blocked = blocked.len(), "all eligible tasks complete");
                return Ok(RunOutcome::Completed {
                    tasks_completed,
                    blocked: blocked.len(),
                });
            }
        };

        let task_id = ctx.task(index)?.id.clone();
        info!(task_id = %task_id, title = %ctx.task(index)?.title, "starting task");
        match verify_task(ctx, agents, prompts, index, verification)? {
            VerificationOutcome::Passed { cycles } => {
                info!(task_id = %task_id, cycles, "task complete");
            }
            VerificationOutcome::Exhausted { cycles } => {
                error!(task_id = %task_id, cycles, "task failed verification, stopping");
                return Ok(RunOutcome::TaskFailed { task_id, cycles });
            }
        }
    }
}
