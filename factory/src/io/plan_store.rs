//! Plan file load/save helpers with schema + invariant validation.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use anyhow::{Context, Result};
use jsonschema::Validator;
use serde_json::Value;
use tracing::{debug, warn};

use crate::core::invariants::validate_plan_invariants;
use crate::plan::Plan;

pub const PLAN_FILE_NAME: &str = "prd.json";

const PLAN_SCHEMA: &str = include_str!("../../schemas/plan.schema.json");

static PLAN_VALIDATOR: LazyLock<Result<Validator, String>> = LazyLock::new(|| {
    let schema: Value =
        serde_json::from_str(PLAN_SCHEMA).map_err(|err| format!("parse plan schema: {err}"))?;
    jsonschema::validator_for(&schema).map_err(|err| format!("invalid plan schema: {err}"))
});

/// Outcome of validating plan text.
#[derive(Debug, Clone, PartialEq)]
pub enum PlanValidation {
    Valid(Plan),
    Invalid(Vec<String>),
}

/// Canonical plan location inside a workspace.
pub fn plan_path(workspace: &Path) -> PathBuf {
    workspace.join(PLAN_FILE_NAME)
}

/// Sibling backup holding the last pre-mutation plan.
pub fn backup_path(plan_path: &Path) -> PathBuf {
    plan_path.with_extension("json.bak")
}

/// Validate candidate plan text: JSON syntax, schema, typed decode, invariants.
///
/// Every violation found at the first failing layer is reported.
pub fn validate_plan_text(text: &str) -> PlanValidation {
    let value: Value = match serde_json::from_str(text) {
        Ok(value) => value,
        Err(err) => return PlanValidation::Invalid(vec![format!("invalid JSON: {err}")]),
    };

    let validator = match &*PLAN_VALIDATOR {
        Ok(validator) => validator,
        Err(err) => return PlanValidation::Invalid(vec![err.clone()]),
    };
    let schema_errors: Vec<String> = validator
        .iter_errors(&value)
        .map(|err| err.to_string())
        .collect();
    if !schema_errors.is_empty() {
        return PlanValidation::Invalid(schema_errors);
    }

    let plan: Plan = match serde_json::from_value(value) {
        Ok(plan) => plan,
        Err(err) => return PlanValidation::Invalid(vec![format!("decode plan: {err}")]),
    };

    let invariant_errors = validate_plan_invariants(&plan);
    if invariant_errors.is_empty() {
        PlanValidation::Valid(plan)
    } else {
        PlanValidation::Invalid(invariant_errors)
    }
}

/// Read the raw plan text. A missing file is `Ok(None)`.
pub fn read_plan_text(path: &Path) -> Result<Option<String>> {
    match fs::read_to_string(path) {
        Ok(contents) => Ok(Some(contents)),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err).with_context(|| format!("read plan {}", path.display())),
    }
}

/// Load and validate the plan at `path`. A missing file is `Ok(None)`.
pub fn load_plan(path: &Path) -> Result<Option<PlanValidation>> {
    debug!(path = %path.display(), "loading plan");
    Ok(read_plan_text(path)?.map(|text| validate_plan_text(&text)))
}

/// Canonical on-disk rendering: pretty JSON with a trailing newline.
pub fn render_plan(plan: &Plan) -> Result<String> {
    let mut buf = serde_json::to_string_pretty(plan).context("serialize plan")?;
    buf.push('\n');
    Ok(buf)
}

/// Atomically write the plan to disk (temp file + rename).
pub fn write_plan(path: &Path, plan: &Plan) -> Result<()> {
    debug!(path = %path.display(), tasks = plan.tasks.len(), "writing plan");
    write_atomic(path, &render_plan(plan)?)
}

/// Copy the current plan file to its `.bak` sibling.
///
/// Returns `false` when there is no plan file to back up.
pub fn backup_plan(path: &Path) -> Result<bool> {
    if !path.exists() {
        return Ok(false);
    }
    let backup = backup_path(path);
    fs::copy(path, &backup)
        .with_context(|| format!("back up plan {} to {}", path.display(), backup.display()))?;
    debug!(backup = %backup.display(), "plan backed up");
    Ok(true)
}

/// Write `contents` to the `.bak` sibling of `plan_path`.
pub fn write_backup(plan_path: &Path, contents: &str) -> Result<()> {
    let backup = backup_path(plan_path);
    fs::write(&backup, contents).with_context(|| format!("write plan backup {}", backup.display()))?;
    debug!(backup = %backup.display(), "plan backed up");
    Ok(())
}

pub fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("plan path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("json.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp plan {}", tmp_path.display()))?;
    if let Err(err) = fs::rename(&tmp_path, path) {
        if let Err(cleanup) = fs::remove_file(&tmp_path) {
            warn!(err = %cleanup, path = %tmp_path.display(), "failed to remove temp plan");
        }
        return Err(err).with_context(|| format!("replace plan {}", path.display()));
    }
    Ok(())
}
