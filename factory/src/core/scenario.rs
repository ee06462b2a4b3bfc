//! Run scenario classification.

use std::fmt;
use std::str::FromStr;

/// How the run relates to the state of the workspace.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Scenario {
    /// No plan and an effectively empty workspace.
    NewProject,
    /// No plan, but the workspace already holds a codebase.
    Brownfield,
    /// A plan exists and a new goal was supplied.
    UpdateProject,
    /// A plan exists and no goal was supplied.
    Resume,
}

impl Scenario {
    pub fn as_str(self) -> &'static str {
        match self {
            Scenario::NewProject => "NEW_PROJECT",
            Scenario::Brownfield => "BROWNFIELD",
            Scenario::UpdateProject => "UPDATE_PROJECT",
            Scenario::Resume => "RESUME",
        }
    }

    /// Mode string handed to the architect. Only two modes exist: the
    /// architect either drafts from scratch or revises an existing plan.
    pub fn architect_mode(self) -> &'static str {
        match self {
            Scenario::UpdateProject | Scenario::Resume => "UPDATE_PROJECT",
            Scenario::NewProject | Scenario::Brownfield => "NEW_PROJECT",
        }
    }
}

impl fmt::Display for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Scenario {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_uppercase().replace('-', "_").as_str() {
            "NEW_PROJECT" => Ok(Scenario::NewProject),
            "BROWNFIELD" => Ok(Scenario::Brownfield),
            "UPDATE_PROJECT" => Ok(Scenario::UpdateProject),
            "RESUME" => Ok(Scenario::Resume),
            other => Err(format!(
                "unknown scenario '{other}' (expected NEW_PROJECT, BROWNFIELD, UPDATE_PROJECT or RESUME)"
            )),
        }
    }
}

/// Classify a run from observed workspace facts.
pub fn classify(plan_exists: bool, has_significant_content: bool, has_goal: bool) -> Scenario {
    match (plan_exists, has_goal) {
        (true, true) => Scenario::UpdateProject,
        (true, false) => Scenario::Resume,
        (false, _) if has_significant_content => Scenario::Brownfield,
        (false, _) => Scenario::NewProject,
    }
}

/// Entries that do not make a workspace count as an existing codebase.
pub fn is_trivial_entry(name: &str) -> bool {
    name.starts_with('.') || matches!(name, "README.md" | "LICENSE" | "node_modules")
}
