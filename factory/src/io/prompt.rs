//! Prompt templates for the four agent roles.
//!
//! Defaults are embedded in the binary. An override directory may replace any
//! of them with `<role>.md`. Templates use `{{NAME}}` placeholders.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use minijinja::{Environment, context};
use tracing::debug;

use crate::plan::{Project, Task};

const ARCHITECT_TEMPLATE: &str = include_str!("prompts/architect.md");
const CRITIC_TEMPLATE: &str = include_str!("prompts/critic.md");
const WORKER_TEMPLATE: &str = include_str!("prompts/worker.md");
const VERIFIER_TEMPLATE: &str = include_str!("prompts/verifier.md");

const TEMPLATES: [(&str, &str); 4] = [
    ("architect", ARCHITECT_TEMPLATE),
    ("critic", CRITIC_TEMPLATE),
    ("worker", WORKER_TEMPLATE),
    ("verifier", VERIFIER_TEMPLATE),
];

/// Inputs for the architect prompt.
#[derive(Debug, Clone)]
pub struct ArchitectInputs<'a> {
    pub goal: &'a str,
    pub current_prd: &'a str,
    pub mode: &'a str,
    pub file_tree: &'a [String],
    pub test_files: &'a [String],
    pub prd_path: &'a Path,
}

/// Template engine wrapper around minijinja.
pub struct PromptLibrary {
    env: Environment<'static>,
}

impl PromptLibrary {
    /// Load the embedded templates, replacing any found in `override_dir`.
    pub fn load(override_dir: Option<&Path>) -> Result<Self> {
        let mut env = Environment::new();
        for (name, default) in TEMPLATES {
            let source = match override_dir.map(|dir| dir.join(format!("{name}.md"))) {
                Some(path) if path.is_file() => {
                    debug!(template = name, path = %path.display(), "using prompt override");
                    fs::read_to_string(&path)
                        .with_context(|| format!("read prompt {}", path.display()))?
                }
                _ => default.to_string(),
            };
            env.add_template_owned(name, source)
                .with_context(|| format!("parse prompt template {name}"))?;
        }
        Ok(Self { env })
    }

    /// Embedded templates only.
    pub fn embedded() -> Result<Self> {
        Self::load(None)
    }

    pub fn render_architect(&self, inputs: &ArchitectInputs<'_>) -> Result<String> {
        self.render(
            "architect",
            context! {
                GOAL => inputs.goal,
                CURRENT_PRD => inputs.current_prd,
                MODE => inputs.mode,
                FILE_TREE => bullet_list(inputs.file_tree, "(empty workspace)"),
                TEST_FILES => bullet_list(inputs.test_files, "(none detected)"),
                PRD_PATH => inputs.prd_path.display().to_string(),
            },
        )
    }

    pub fn render_critic(&self, prd_content: &str, prd_path: &Path) -> Result<String> {
        self.render(
            "critic",
            context! {
                PRD_CONTENT => prd_content,
                PRD_PATH => prd_path.display().to_string(),
            },
        )
    }

    /// Worker prompt; `feedback` from a failed verification is appended to
    /// the task description as a fix request.
    pub fn render_worker(
        &self,
        project: &Project,
        task: &Task,
        feedback: Option<&str>,
    ) -> Result<String> {
        let description = match feedback {
            Some(feedback) => format!("{}\n\nFIX REQUEST: {feedback}", task.description),
            None => task.description.clone(),
        };
        let criteria = criteria_json(task)?;
        self.render(
            "worker",
            context! {
                TASK_ID => &task.id,
                TASK_TITLE => &task.title,
                TASK_DESCRIPTION => description,
                TASK_CRITERIA => criteria,
                TEST_COMMAND => &project.test_command,
            },
        )
    }

    pub fn render_verifier(&self, project: &Project, task: &Task) -> Result<String> {
        let gate = project
            .quality_gate
            .as_ref()
            .map(|gate| gate.commands())
            .unwrap_or_default();
        let criteria = criteria_json(task)?;
        self.render(
            "verifier",
            context! {
                TASK_ID => &task.id,
                TASK_TITLE => &task.title,
                TASK_CRITERIA => criteria,
                TEST_COMMAND => &project.test_command,
                QUALITY_GATE => bullet_list(&gate, "(none configured)"),
            },
        )
    }

    fn render(&self, name: &str, ctx: minijinja::Value) -> Result<String> {
        let template = self
            .env
            .get_template(name)
            .with_context(|| format!("load prompt template {name}"))?;
        template
            .render(ctx)
            .with_context(|| format!("render prompt template {name}"))
    }
}

fn criteria_json(task: &Task) -> Result<String> {
    serde_json::to_string(&task.acceptance_criteria).context("serialize acceptance criteria")
}

fn bullet_list(items: &[String], empty: &str) -> String {
    if items.is_empty() {
        return empty.to_string();
    }
    items
        .iter()
        .map(|item| format!("- {item}"))
        .collect::<Vec<_>>()
        .join("\n")
}
