//! CLI tests for scenario detection and exit codes.
//!
//! Spawns the factory binary with `--mock-llm` so no agent process is ever
//! started, and checks stdout and exit codes.

use std::fs;
use std::path::Path;
use std::process::{Command, Output};

use factory::exit_codes;
use factory::test_support::{plan_with, task, temp_workspace, write_plan_fixture};

fn factory(cwd: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_factory"))
        .current_dir(cwd)
        .args(args)
        .env_remove("FACTORY_CONFIG")
        .env_remove("FACTORY_MODEL")
        .env_remove("FACTORY_PLANNING_CYCLES")
        .env_remove("FACTORY_VERIFICATION_CYCLES")
        .env_remove("FACTORY_WORKER_ITERATIONS")
        .env_remove("FACTORY_TIMEOUT")
        .env_remove("OPENAI_BASE_URL")
        .env("RUST_LOG", "warn")
        .output()
        .expect("run factory")
}

fn dry_run(cwd: &Path, goal: Option<&str>) -> (i32, String) {
    let mut args = vec!["--mock-llm", "--dry-run", "--workspace", "target_project"];
    if let Some(goal) = goal {
        args.insert(0, goal);
    }
    let output = factory(cwd, &args);
    (
        output.status.code().expect("exit code"),
        String::from_utf8_lossy(&output.stdout).into_owned(),
    )
}

#[test]
fn empty_workspace_with_goal_is_new_project() {
    let temp = temp_workspace();
    let (code, stdout) = dry_run(temp.path(), Some("Build a todo CLI"));
    assert_eq!(code, exit_codes::OK);
    assert!(stdout.contains("scenario: NEW_PROJECT"), "{stdout}");
    assert!(
        !temp.path().join("target_project").exists(),
        "dry run must not create the workspace"
    );
}

#[test]
fn existing_code_with_goal_is_brownfield() {
    let temp = temp_workspace();
    let workspace = temp.path().join("target_project");
    fs::create_dir_all(&workspace).expect("mkdir");
    fs::write(workspace.join("main.go"), "package main\n").expect("write");

    let (code, stdout) = dry_run(temp.path(), Some("Add a web server"));
    assert_eq!(code, exit_codes::OK);
    assert!(stdout.contains("scenario: BROWNFIELD"), "{stdout}");
}

#[test]
fn existing_plan_with_goal_is_update_project() {
    let temp = temp_workspace();
    write_plan_fixture(
        &temp.path().join("target_project"),
        &plan_with(vec![task("T1", &[])]),
    );

    let (code, stdout) = dry_run(temp.path(), Some("Add an export command"));
    assert_eq!(code, exit_codes::OK);
    assert!(stdout.contains("scenario: UPDATE_PROJECT"), "{stdout}");
}

#[test]
fn existing_plan_without_goal_resumes_pending_task() {
    let temp = temp_workspace();
    write_plan_fixture(
        &temp.path().join("target_project"),
        &plan_with(vec![task("T1", &[])]),
    );

    let (code, stdout) = dry_run(temp.path(), None);
    assert_eq!(code, exit_codes::OK);
    assert!(stdout.contains("scenario: RESUME"), "{stdout}");
    assert!(stdout.contains("next task: T1"), "{stdout}");
}

#[test]
fn mock_planning_never_approves() {
    let temp = temp_workspace();
    let output = factory(
        temp.path(),
        &[
            "Build a todo CLI",
            "--mock-llm",
            "--planning-cycles",
            "1",
            "--workspace",
            "target_project",
        ],
    );
    assert_eq!(output.status.code(), Some(exit_codes::FAILURE));
    assert!(!temp.path().join("target_project/prd.json").exists());
}

#[test]
fn invalid_configuration_exits_nonzero() {
    let temp = temp_workspace();
    let output = factory(
        temp.path(),
        &["--mock-llm", "--dry-run", "--verify-cycles", "0"],
    );
    assert_eq!(output.status.code(), Some(exit_codes::FAILURE));
}

#[test]
fn config_file_sets_workspace() {
    let temp = temp_workspace();
    fs::write(temp.path().join("factory.toml"), "workspace = \"custom\"\n").expect("write");
    write_plan_fixture(&temp.path().join("custom"), &plan_with(vec![task("C1", &[])]));

    let output = factory(temp.path(), &["--mock-llm", "--dry-run"]);
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(output.status.code(), Some(exit_codes::OK));
    assert!(stdout.contains("next task: C1"), "{stdout}");
}
