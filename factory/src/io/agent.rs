//! Agent abstraction for role invocations.
//!
//! The [`Agent`] trait decouples the orchestration loops from the backend
//! (`opencode run`). Tests use scripted agents that return predetermined text
//! without spawning processes.

use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow};
use tracing::{debug, info, instrument, warn};

use crate::io::config::FactoryConfig;
use crate::io::process::run_command_with_timeout;

/// Response returned by [`MockAgent`].
pub const MOCK_RESPONSE: &str = "MOCK_RESPONSE";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AgentRole {
    Architect,
    Critic,
    Worker,
    Verifier,
}

impl AgentRole {
    pub fn as_str(self) -> &'static str {
        match self {
            AgentRole::Architect => "architect",
            AgentRole::Critic => "critic",
            AgentRole::Worker => "worker",
            AgentRole::Verifier => "verifier",
        }
    }
}

impl fmt::Display for AgentRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parameters for one agent invocation.
#[derive(Debug, Clone)]
pub struct AgentRequest {
    pub role: AgentRole,
    pub prompt: String,
    pub model: String,
    /// Exported to the agent as `OPENAI_BASE_URL` when set.
    pub base_url: Option<String>,
    pub workdir: PathBuf,
    pub timeout: Duration,
    pub output_limit_bytes: usize,
}

/// Abstraction over agent backends.
///
/// An `Err` is a transient failure (spawn error, non-zero exit, timeout); the
/// calling loop decides whether it consumes a retry.
pub trait Agent {
    fn invoke(&self, request: &AgentRequest) -> Result<String>;
}

impl<A: Agent + ?Sized> Agent for &A {
    fn invoke(&self, request: &AgentRequest) -> Result<String> {
        (**self).invoke(request)
    }
}

/// Agent that spawns `opencode run -m <model>` with the prompt on stdin.
pub struct OpencodeAgent;

impl Agent for OpencodeAgent {
    #[instrument(skip_all, fields(role = %request.role, model = %request.model))]
    fn invoke(&self, request: &AgentRequest) -> Result<String> {
        info!(workdir = %request.workdir.display(), "starting opencode run");
        let mut cmd = Command::new("opencode");
        cmd.arg("run")
            .arg("-m")
            .arg(&request.model)
            .current_dir(&request.workdir);
        if let Some(base_url) = &request.base_url {
            cmd.env("OPENAI_BASE_URL", base_url);
        }

        let output = run_command_with_timeout(
            cmd,
            Some(request.prompt.clone().into_bytes()),
            request.timeout,
            request.output_limit_bytes,
        )
        .with_context(|| format!("run opencode for {}", request.role))?;

        if output.timed_out {
            warn!(
                timeout_secs = request.timeout.as_secs(),
                "opencode run timed out"
            );
            return Err(anyhow!(
                "{} agent timed out after {:?}",
                request.role,
                request.timeout
            ));
        }
        if !output.status.success() {
            warn!(exit_code = ?output.status.code(), "opencode run failed");
            return Err(anyhow!(
                "{} agent exited with status {:?}: {}",
                request.role,
                output.status.code(),
                output.stderr_tail(5)
            ));
        }

        debug!(bytes = output.stdout.len(), "opencode run completed");
        Ok(output.stdout_lossy())
    }
}

/// Agent that never spawns a process and always answers [`MOCK_RESPONSE`].
pub struct MockAgent;

impl Agent for MockAgent {
    fn invoke(&self, request: &AgentRequest) -> Result<String> {
        debug!(role = %request.role, "mock agent invoked");
        Ok(MOCK_RESPONSE.to_string())
    }
}

/// Per-run invocation settings shared by every role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentSettings {
    pub model: String,
    pub base_url: Option<String>,
    pub timeout: Duration,
    pub output_limit_bytes: usize,
}

impl AgentSettings {
    pub fn from_config(config: &FactoryConfig) -> Self {
        Self {
            model: config.model.clone(),
            base_url: config.base_url.clone(),
            timeout: config.agent_timeout(),
            output_limit_bytes: config.agent_output_limit_bytes,
        }
    }
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self::from_config(&FactoryConfig::default())
    }
}

/// An agent bound to its run settings.
pub struct AgentHandle<A> {
    agent: A,
    settings: AgentSettings,
}

impl<A: Agent> AgentHandle<A> {
    pub fn new(agent: A, settings: AgentSettings) -> Self {
        Self { agent, settings }
    }

    /// Invoke `role` with `prompt` in `workdir`, logging the call duration.
    pub fn invoke(&self, role: AgentRole, prompt: String, workdir: &Path) -> Result<String> {
        let request = AgentRequest {
            role,
            prompt,
            model: self.settings.model.clone(),
            base_url: self.settings.base_url.clone(),
            workdir: workdir.to_path_buf(),
            timeout: self.settings.timeout,
            output_limit_bytes: self.settings.output_limit_bytes,
        };
        let started = Instant::now();
        let result = self.agent.invoke(&request);
        let duration_ms = started.elapsed().as_millis() as u64;
        match &result {
            Ok(text) => debug!(%role, duration_ms, bytes = text.len(), "agent call finished"),
            Err(err) => debug!(%role, duration_ms, err = %err, "agent call failed"),
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mock_agent_returns_fixed_response() {
        let temp = tempfile::tempdir().expect("tempdir");
        let handle = AgentHandle::new(MockAgent, AgentSettings::default());
        let text = handle
            .invoke(AgentRole::Worker, "prompt".to_string(), temp.path())
            .expect("invoke");
        assert_eq!(text, MOCK_RESPONSE);
    }

    #[test]
    fn settings_follow_config() {
        let config = FactoryConfig {
            model: "m".to_string(),
            base_url: Some("http://localhost:1234".to_string()),
            agent_timeout_secs: 5,
            ..FactoryConfig::default()
        };
        let settings = AgentSettings::from_config(&config);
        assert_eq!(settings.model, "m");
        assert_eq!(settings.base_url.as_deref(), Some("http://localhost:1234"));
        assert_eq!(settings.timeout, Duration::from_secs(5));
    }
}
