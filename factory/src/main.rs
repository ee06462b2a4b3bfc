//! `factory` command line entry point.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info, warn};

use factory::context::RunContext;
use factory::core::scenario::Scenario;
use factory::exit_codes;
use factory::io::agent::{Agent, AgentHandle, AgentSettings, MockAgent, OpencodeAgent};
use factory::io::config::{DEFAULT_CONFIG_FILE, FactoryConfig, load_config};
use factory::io::prompt::PromptLibrary;
use factory::logging::{self, Verbosity};
use factory::orchestrator::{RunLimits, RunOutcome, RunRequest, recover_fatal, run_factory};
use factory::shutdown::{ShutdownToken, install_signal_handlers};

#[derive(Parser, Debug)]
#[command(
    name = "factory",
    version,
    about = "Plan, implement and verify a project with a code-generation agent"
)]
struct Cli {
    /// What to build. Omit to resume the existing plan.
    goal: Option<String>,

    /// Config file (TOML). Missing file means defaults.
    #[arg(long, env = "FACTORY_CONFIG", default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Model identifier passed to the agent.
    #[arg(long, env = "FACTORY_MODEL")]
    model: Option<String>,

    /// OpenAI-compatible endpoint exported to the agent.
    #[arg(long, env = "OPENAI_BASE_URL")]
    base_url: Option<String>,

    /// Architect/critic cycles (0 disables planning).
    #[arg(long, env = "FACTORY_PLANNING_CYCLES")]
    planning_cycles: Option<u32>,

    /// Worker + verifier cycles per task.
    #[arg(long, env = "FACTORY_VERIFICATION_CYCLES")]
    verify_cycles: Option<u32>,

    /// Worker invocations per verification cycle.
    #[arg(long, env = "FACTORY_WORKER_ITERATIONS")]
    worker_iters: Option<u32>,

    /// Global run timeout in seconds (0 disables).
    #[arg(long, env = "FACTORY_TIMEOUT")]
    timeout: Option<u64>,

    /// Project directory holding the generated code and `prd.json`.
    #[arg(long)]
    workspace: Option<PathBuf>,

    /// Directory with prompt template overrides (`architect.md`, ...).
    #[arg(long)]
    prompts_dir: Option<PathBuf>,

    /// Skip scenario detection.
    #[arg(long)]
    scenario: Option<Scenario>,

    /// Print the detected scenario and settings, then exit.
    #[arg(long)]
    dry_run: bool,

    /// Stop after planning.
    #[arg(long = "plan")]
    plan_only: bool,

    /// Use a canned agent response instead of spawning `opencode`.
    #[arg(long)]
    mock_llm: bool,

    /// Debug-level logging.
    #[arg(short, long)]
    verbose: bool,

    /// Warnings and errors only.
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Log full architect and critic output.
    #[arg(long)]
    verbose_planning: bool,

    /// Also write JSON-lines logs to this file.
    #[arg(long)]
    log_file: Option<PathBuf>,
}

impl Cli {
    fn apply_overrides(&self, config: &mut FactoryConfig) {
        if let Some(model) = &self.model {
            config.model.clone_from(model);
        }
        if let Some(base_url) = &self.base_url {
            config.base_url = Some(base_url.clone()).filter(|url| !url.trim().is_empty());
        }
        if let Some(cycles) = self.planning_cycles {
            config.planning_cycles = cycles;
        }
        if let Some(cycles) = self.verify_cycles {
            config.verification_cycles = cycles;
        }
        if let Some(iterations) = self.worker_iters {
            config.worker_iterations = iterations;
        }
        if let Some(timeout) = self.timeout {
            config.timeout_secs = timeout;
        }
        if let Some(workspace) = &self.workspace {
            config.workspace.clone_from(workspace);
        }
        if let Some(dir) = &self.prompts_dir {
            config.prompts_dir = Some(dir.clone());
        }
    }

    fn request(&self) -> RunRequest {
        RunRequest {
            goal: self.goal.clone().filter(|goal| !goal.trim().is_empty()),
            scenario_override: self.scenario,
            dry_run: self.dry_run,
            plan_only: self.plan_only,
            verbose_planning: self.verbose_planning,
        }
    }
}

fn main() {
    let cli = Cli::parse();
    if let Err(err) = logging::init(
        Verbosity::from_flags(cli.verbose, cli.quiet),
        cli.log_file.as_deref(),
    ) {
        eprintln!("{err:#}");
        std::process::exit(exit_codes::FAILURE);
    }
    let code = match run(&cli) {
        Ok(code) => code,
        Err(err) => {
            error!("{err:#}");
            exit_codes::FAILURE
        }
    };
    std::process::exit(code);
}

fn run(cli: &Cli) -> Result<i32> {
    let mut config = load_config(&cli.config)?;
    cli.apply_overrides(&mut config);
    config.validate().context("invalid configuration")?;

    let request = cli.request();
    info!(
        goal = request.goal.as_deref().unwrap_or("(resume)"),
        model = %config.model,
        "factory started"
    );

    let shutdown = ShutdownToken::new(config.global_timeout());
    if !request.dry_run {
        install_signal_handlers(shutdown.clone())?;
    }
    let mut ctx = RunContext::new(config.workspace.clone(), shutdown);
    let prompts = PromptLibrary::load(config.prompts_dir.as_deref())?;
    let settings = AgentSettings::from_config(&config);
    let limits = RunLimits::from_config(&config);

    let result = if cli.mock_llm {
        execute(&mut ctx, MockAgent, settings, &prompts, &request, limits)
    } else {
        execute(&mut ctx, OpencodeAgent, settings, &prompts, &request, limits)
    };

    match result {
        Ok(outcome) => {
            report(&outcome, &config);
            Ok(outcome.exit_code())
        }
        Err(err) => Ok(recover_fatal(&ctx, &err)),
    }
}

fn execute<A: Agent>(
    ctx: &mut RunContext,
    agent: A,
    settings: AgentSettings,
    prompts: &PromptLibrary,
    request: &RunRequest,
    limits: RunLimits,
) -> Result<RunOutcome> {
    let agents = AgentHandle::new(agent, settings);
    run_factory(ctx, &agents, prompts, request, limits)
}

fn report(outcome: &RunOutcome, config: &FactoryConfig) {
    match outcome {
        RunOutcome::Completed {
            tasks_completed,
            blocked,
        } => info!(tasks_completed, blocked, "factory finished"),
        RunOutcome::DryRun {
            scenario,
            next_task,
        } => {
            println!("scenario: {scenario}");
            println!("workspace: {}", config.workspace.display());
            println!("model: {}", config.model);
            println!("planning cycles: {}", config.planning_cycles);
            println!("verification cycles: {}", config.verification_cycles);
            println!("worker iterations: {}", config.worker_iterations);
            if let Some(task_id) = next_task {
                println!("next task: {task_id}");
            }
        }
        RunOutcome::PlanOnly => info!("plan ready"),
        RunOutcome::PlanningExhausted { cycles } => {
            error!(cycles, "failed to approve plan after maximum cycles");
        }
        RunOutcome::InvalidPlan { errors } => error!(errors = errors.len(), "invalid plan file"),
        RunOutcome::TaskFailed { task_id, cycles } => {
            error!(task_id = %task_id, cycles, "task failed verification");
        }
        RunOutcome::Cancelled(reason) => warn!(%reason, "run cancelled, progress saved"),
    }
}
