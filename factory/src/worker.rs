//! Bounded worker invocation loop for a single task.

use std::path::Path;
use std::time::{Duration, Instant};

use anyhow::Result;
use tracing::{debug, info, instrument, warn};

use crate::io::agent::{Agent, AgentHandle, AgentRole};
use crate::shutdown::ShutdownToken;

/// Marker a worker prints once it considers the task implemented.
pub const COMPLETION_MARKER: &str = "<promise>COMPLETE</promise>";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerOutcome {
    /// The completion marker was seen.
    pub completed: bool,
    /// Worker invocations made, including failed ones.
    pub iterations: u32,
    pub elapsed: Duration,
}

/// Invoke the worker with `prompt` until it prints [`COMPLETION_MARKER`] or
/// `max_iterations` calls have been made.
///
/// Agent failures consume an iteration. Cancellation is observed before each
/// iteration and returned as a [`crate::shutdown::Cancelled`] error.
#[instrument(skip_all, fields(max_iterations = max_iterations))]
pub fn run_worker_loop<A: Agent>(
    agents: &AgentHandle<A>,
    workdir: &Path,
    prompt: &str,
    max_iterations: u32,
    shutdown: &ShutdownToken,
) -> Result<WorkerOutcome> {
    let started = Instant::now();
    let mut iterations = 0;

    while iterations < max_iterations {
        shutdown.check()?;
        iterations += 1;
        debug!(iteration = iterations, "worker iteration");

        match agents.invoke(AgentRole::Worker, prompt.to_string(), workdir) {
            Ok(output) if output.contains(COMPLETION_MARKER) => {
                info!(iteration = iterations, "worker reported completion");
                return Ok(WorkerOutcome {
                    completed: true,
                    iterations,
                    elapsed: started.elapsed(),
                });
            }
            Ok(_) => debug!(iteration = iterations, "worker not finished"),
            Err(err) => warn!(iteration = iterations, err = %err, "worker invocation failed"),
        }
    }

    Ok(WorkerOutcome {
        completed: false,
        iterations,
        elapsed: started.elapsed(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::agent::AgentSettings;
    use crate::shutdown::{CancelReason, Cancelled};
    use crate::test_support::{ScriptedAgent, ScriptedReply};

    fn handle(agent: &ScriptedAgent) -> AgentHandle<&ScriptedAgent> {
        AgentHandle::new(agent, AgentSettings::default())
    }

    #[test]
    fn completes_on_third_call() {
        let temp = tempfile::tempdir().expect("tempdir");
        let agent = ScriptedAgent::new()
            .with_text(AgentRole::Worker, "working")
            .with_text(AgentRole::Worker, "still working")
            .with_text(AgentRole::Worker, "done <promise>COMPLETE</promise>");

        let outcome = run_worker_loop(
            &handle(&agent),
            temp.path(),
            "prompt",
            10,
            &ShutdownToken::unbounded(),
        )
        .expect("worker loop");

        assert!(outcome.completed);
        assert_eq!(outcome.iterations, 3);
        assert_eq!(agent.calls(AgentRole::Worker), 3);
    }

    #[test]
    fn failures_consume_iterations_until_cap() {
        let temp = tempfile::tempdir().expect("tempdir");
        let agent = ScriptedAgent::new()
            .with(AgentRole::Worker, ScriptedReply::fail("exit status 1"))
            .with_fallback(AgentRole::Worker, "no marker");

        let outcome = run_worker_loop(
            &handle(&agent),
            temp.path(),
            "prompt",
            4,
            &ShutdownToken::unbounded(),
        )
        .expect("worker loop");

        assert!(!outcome.completed);
        assert_eq!(outcome.iterations, 4);
    }

    #[test]
    fn zero_iterations_makes_no_calls() {
        let temp = tempfile::tempdir().expect("tempdir");
        let agent = ScriptedAgent::new();
        let outcome = run_worker_loop(
            &handle(&agent),
            temp.path(),
            "prompt",
            0,
            &ShutdownToken::unbounded(),
        )
        .expect("worker loop");
        assert_eq!(outcome.iterations, 0);
        assert_eq!(agent.calls(AgentRole::Worker), 0);
    }

    #[test]
    fn cancellation_stops_before_next_iteration() {
        let temp = tempfile::tempdir().expect("tempdir");
        let token = ShutdownToken::unbounded();
        let trigger = token.clone();
        let agent = ScriptedAgent::new().with(
            AgentRole::Worker,
            ScriptedReply::invoke(move |_| {
                trigger.cancel(CancelReason::Signal);
                Ok("partial".to_string())
            }),
        );

        let err = run_worker_loop(&handle(&agent), temp.path(), "prompt", 10, &token)
            .expect_err("cancelled");
        assert_eq!(
            err.downcast_ref::<Cancelled>().map(|c| c.reason),
            Some(CancelReason::Signal)
        );
        assert_eq!(agent.calls(AgentRole::Worker), 1);
    }
}
