//! Architect/critic plan negotiation.

use std::sync::LazyLock;

use anyhow::Result;
use regex::Regex;
use tracing::{debug, error, info, instrument, warn};

use crate::context::RunContext;
use crate::core::dependencies::dependency_warnings;
use crate::core::scenario::Scenario;
use crate::io::agent::{Agent, AgentHandle, AgentRole};
use crate::io::extract::extract_json;
use crate::io::plan_store::{PlanValidation, read_plan_text, render_plan, validate_plan_text};
use crate::io::prompt::{ArchitectInputs, PromptLibrary};
use crate::io::workspace::{detect_test_files, scan_file_tree};

/// Sentinel a critic prints when the plan has no blocking problems.
pub const APPROVAL_SENTINEL: &str = "NO_CRITICAL_ISSUES";

/// Validation errors echoed to the log per rejected draft.
const LOGGED_ERRORS: usize = 5;

static NUMBERED_ITEM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d+\.\s+").expect("numbered item regex"));

#[derive(Debug, Clone)]
pub struct NegotiationRequest<'a> {
    pub goal: &'a str,
    pub scenario: Scenario,
    pub max_cycles: u32,
    /// Cap on the file tree shown to the architect.
    pub file_tree_limit: usize,
    /// Log full architect and critic output at info level.
    pub verbose: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NegotiationOutcome {
    Approved { cycles: u32 },
    /// Planning disabled; the plan on disk (if any) is final.
    Skipped,
    /// No approval within the cycle limit. The last valid draft stays on disk.
    Exhausted { cycles: u32 },
}

/// Number of numbered list items in a critique.
pub fn count_issues(critique: &str) -> usize {
    NUMBERED_ITEM.find_iter(critique).count()
}

/// Run architect/critic cycles until the critic approves or `max_cycles` is hit.
///
/// Every valid draft is backed up and persisted before the critic sees it.
/// Agent failures and unusable drafts consume a cycle.
#[instrument(skip_all, fields(max_cycles = request.max_cycles, scenario = %request.scenario))]
pub fn negotiate_plan<A: Agent>(
    ctx: &mut RunContext,
    agents: &AgentHandle<A>,
    prompts: &PromptLibrary,
    request: &NegotiationRequest<'_>,
) -> Result<NegotiationOutcome> {
    if request.max_cycles == 0 {
        info!("planning disabled");
        return Ok(NegotiationOutcome::Skipped);
    }

    let mode = request.scenario.architect_mode();
    let mut current_prd = read_plan_text(ctx.plan_path())?.unwrap_or_else(|| "{}".to_string());
    let mut feedback: Option<String> = None;

    for cycle in 1..=request.max_cycles {
        ctx.checkpoint()?;
        info!(cycle, max_cycles = request.max_cycles, "planning cycle");

        let goal = match &feedback {
            Some(feedback) => format!("{}\n\nCRITIC FEEDBACK: {feedback}", request.goal),
            None => request.goal.to_string(),
        };
        let file_tree = scan_file_tree(ctx.workspace(), request.file_tree_limit);
        let test_files = detect_test_files(ctx.workspace());
        let architect_prompt = prompts.render_architect(&ArchitectInputs {
            goal: &goal,
            current_prd: &current_prd,
            mode,
            file_tree: &file_tree,
            test_files: &test_files,
            prd_path: ctx.plan_path(),
        })?;

        // The architect may rewrite prd.json itself, so capture it first.
        let previous = match read_plan_text(ctx.plan_path()) {
            Ok(previous) => previous,
            Err(err) => {
                warn!(cycle, err = %err, "could not read plan before architect round");
                None
            }
        };
        let output = match agents.invoke(AgentRole::Architect, architect_prompt, ctx.workspace()) {
            Ok(output) => output,
            Err(err) => {
                warn!(cycle, err = %err, "architect invocation failed");
                continue;
            }
        };
        if request.verbose {
            info!(cycle, output = %output, "architect output");
        }

        let extraction = extract_json(&output, Some(ctx.plan_path()));
        debug!(
            cycle,
            strategy = extraction.strategy.as_str(),
            tool_call = extraction.tool_call_detected,
            "architect draft extracted"
        );
        let plan = match validate_plan_text(&extraction.json) {
            PlanValidation::Valid(plan) => plan,
            PlanValidation::Invalid(errors) => {
                let shown: Vec<&String> = errors.iter().take(LOGGED_ERRORS).collect();
                error!(
                    cycle,
                    strategy = extraction.strategy.as_str(),
                    total = errors.len(),
                    errors = ?shown,
                    "invalid plan from architect, retrying"
                );
                continue;
            }
        };

        for warning in dependency_warnings(&plan) {
            warn!(cycle, "{warning}");
        }
        if let Some(previous) = &previous {
            ctx.backup_plan_text(previous);
        }
        current_prd = render_plan(&plan)?;
        ctx.set_plan(plan);
        ctx.persist()?;
        info!(cycle, tasks = ctx.plan().map_or(0, |plan| plan.tasks.len()), "plan draft saved");

        ctx.checkpoint()?;
        let critic_prompt = prompts.render_critic(&current_prd, ctx.plan_path())?;
        let critique = match agents.invoke(AgentRole::Critic, critic_prompt, ctx.workspace()) {
            Ok(critique) => critique,
            Err(err) => {
                warn!(cycle, err = %err, "critic invocation failed");
                continue;
            }
        };
        if request.verbose {
            info!(cycle, output = %critique, "critic output");
        }

        if critique.contains(APPROVAL_SENTINEL) {
            info!(cycle, "plan approved");
            return Ok(NegotiationOutcome::Approved { cycles: cycle });
        }
        info!(cycle, issues = count_issues(&critique), "critic requested changes");
        feedback = Some(critique);
    }

    error!(cycles = request.max_cycles, "plan not approved within cycle limit");
    Ok(NegotiationOutcome::Exhausted {
        cycles: request.max_cycles,
    })
}
