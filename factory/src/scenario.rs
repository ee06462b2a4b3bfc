//! Scenario detection against the workspace on disk.

use std::path::Path;

use anyhow::Result;
use tracing::debug;

use crate::core::scenario::{Scenario, classify};
use crate::io::plan_store::plan_path;
use crate::io::workspace::has_significant_entries;

/// Classify the run. An operator `override_scenario` short-circuits inspection.
pub fn detect_scenario(
    workspace: &Path,
    has_goal: bool,
    override_scenario: Option<Scenario>,
) -> Result<Scenario> {
    if let Some(scenario) = override_scenario {
        debug!(%scenario, "scenario overridden");
        return Ok(scenario);
    }
    let plan_exists = plan_path(workspace).is_file();
    let significant = !plan_exists && has_significant_entries(workspace)?;
    let scenario = classify(plan_exists, significant, has_goal);
    debug!(plan_exists, significant, has_goal, %scenario, "scenario detected");
    Ok(scenario)
}
