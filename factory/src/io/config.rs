//! Factory configuration loaded from `factory.toml`.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use tracing::debug;

pub const DEFAULT_CONFIG_FILE: &str = "factory.toml";

/// Factory configuration (TOML).
///
/// Every field is optional in the file. Environment variables and CLI flags
/// are layered on top by the binary.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct FactoryConfig {
    /// Model identifier passed to the agent backend.
    pub model: String,

    /// Exported to the agent as `OPENAI_BASE_URL` when set.
    pub base_url: Option<String>,

    /// Directory holding the generated project and its plan file.
    pub workspace: PathBuf,

    /// Directory of prompt template overrides (`<role>.md`).
    pub prompts_dir: Option<PathBuf>,

    /// Architect/critic cycles. `0` disables planning.
    pub planning_cycles: u32,

    /// Worker + verifier cycles per task.
    pub verification_cycles: u32,

    /// Worker invocations per verification cycle.
    pub worker_iterations: u32,

    /// Global wall-clock budget for the run in seconds. `0` disables it.
    pub timeout_secs: u64,

    /// Per agent call timeout in seconds.
    pub agent_timeout_secs: u64,

    /// Agent stdout/stderr kept in memory beyond this many bytes is discarded.
    pub agent_output_limit_bytes: usize,

    /// Maximum number of files listed in the architect's file tree.
    pub file_tree_limit: usize,
}

impl Default for FactoryConfig {
    fn default() -> Self {
        Self {
            model: "opencode/glm-4.7-free".to_string(),
            base_url: None,
            workspace: PathBuf::from("target_project"),
            prompts_dir: None,
            planning_cycles: 3,
            verification_cycles: 3,
            worker_iterations: 10,
            timeout_secs: 60 * 60,
            agent_timeout_secs: 30 * 60,
            agent_output_limit_bytes: 1_000_000,
            file_tree_limit: 100,
        }
    }
}

impl FactoryConfig {
    pub fn validate(&self) -> Result<()> {
        if self.model.trim().is_empty() {
            return Err(anyhow!("model must not be empty"));
        }
        if self.verification_cycles == 0 {
            return Err(anyhow!("verification_cycles must be > 0"));
        }
        if self.worker_iterations == 0 {
            return Err(anyhow!("worker_iterations must be > 0"));
        }
        if self.agent_timeout_secs == 0 {
            return Err(anyhow!("agent_timeout_secs must be > 0"));
        }
        if self.agent_output_limit_bytes == 0 {
            return Err(anyhow!("agent_output_limit_bytes must be > 0"));
        }
        Ok(())
    }

    pub fn global_timeout(&self) -> Option<Duration> {
        (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs))
    }

    pub fn agent_timeout(&self) -> Duration {
        Duration::from_secs(self.agent_timeout_secs)
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `FactoryConfig::default()`. Validation is
/// left to the caller so overrides can be applied first.
pub fn load_config(path: &Path) -> Result<FactoryConfig> {
    if !path.exists() {
        debug!(path = %path.display(), "config file missing, using defaults");
        return Ok(FactoryConfig::default());
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: FactoryConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    debug!(path = %path.display(), "config loaded");
    Ok(cfg)
}
