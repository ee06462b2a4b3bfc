//! Workspace inspection and preparation.

use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use std::sync::LazyLock;

use anyhow::{Context, Result};
use regex::Regex;
use tracing::{debug, info, warn};
use walkdir::{DirEntry, WalkDir};

use crate::core::scenario::is_trivial_entry;
use crate::io::git::Git;

/// Directory and file names skipped when scanning a workspace.
pub const IGNORED_NAMES: &[&str] = &[
    "node_modules",
    ".git",
    ".DS_Store",
    "dist",
    "build",
    "out",
    "vendor",
    ".idea",
    ".vscode",
    "coverage",
    ".next",
    ".nuxt",
    "target",
];

/// Entries visited while looking for test files.
pub const TEST_SCAN_LIMIT: usize = 1000;

static TEST_FILE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"(?i)(?:[._-](?:spec|test)\.(?:ts|js|jsx|tsx|mjs|cjs)$)",
        r"|(?:_test\.go$)",
        r"|(?:^test_.*\.py$)",
        r"|(?:(?:Test|Spec|Tests)\.(?:java|kt|scala|cs|swift|php)$)",
        r"|(?:_(?:test|spec)\.(?:rb|rs|exs)$)",
        r"|(?:_test\.(?:dart|c|cpp|h|hpp)$)",
    ))
    .expect("test file regex")
});

fn is_ignored(entry: &DirEntry) -> bool {
    entry.depth() > 0
        && entry
            .file_name()
            .to_str()
            .is_some_and(|name| IGNORED_NAMES.contains(&name))
}

fn walk(root: &Path) -> impl Iterator<Item = DirEntry> {
    WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| !is_ignored(entry))
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(err) => {
                debug!(err = %err, "skipping unreadable workspace entry");
                None
            }
        })
}

fn relative(root: &Path, entry: &DirEntry) -> String {
    entry
        .path()
        .strip_prefix(root)
        .unwrap_or(entry.path())
        .to_string_lossy()
        .replace('\\', "/")
}

/// Sorted depth-first file listing relative to `root`, at most `limit` files.
///
/// Returns an empty list when `root` does not exist.
pub fn scan_file_tree(root: &Path, limit: usize) -> Vec<String> {
    if !root.is_dir() {
        return Vec::new();
    }
    walk(root)
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| relative(root, &entry))
        .take(limit)
        .collect()
}

/// Whether a file name looks like a test file in a common ecosystem.
pub fn is_test_file(name: &str) -> bool {
    TEST_FILE.is_match(name)
}

/// Test files under `root`, visiting at most [`TEST_SCAN_LIMIT`] entries.
pub fn detect_test_files(root: &Path) -> Vec<String> {
    if !root.is_dir() {
        return Vec::new();
    }
    walk(root)
        .take(TEST_SCAN_LIMIT)
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| entry.file_name().to_str().is_some_and(is_test_file))
        .map(|entry| relative(root, &entry))
        .collect()
}

/// Whether `root` holds anything beyond trivial scaffolding.
///
/// A missing directory counts as empty.
pub fn has_significant_entries(root: &Path) -> Result<bool> {
    let entries = match fs::read_dir(root) {
        Ok(entries) => entries,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(false),
        Err(err) => return Err(err).with_context(|| format!("read workspace {}", root.display())),
    };
    for entry in entries {
        let entry = entry.with_context(|| format!("read workspace {}", root.display()))?;
        let name = entry.file_name();
        if !is_trivial_entry(&name.to_string_lossy()) {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Create the workspace directory if needed and initialize git in it.
///
/// Git initialization is best-effort; failures are logged and ignored.
pub fn ensure_workspace(root: &Path) -> Result<()> {
    if root.is_dir() {
        return Ok(());
    }
    fs::create_dir_all(root)
        .with_context(|| format!("create workspace {}", root.display()))?;
    info!(workspace = %root.display(), "created workspace");

    if let Err(err) = Git::new(root).init() {
        warn!(err = %err, "git init failed, continuing without a repository");
    }
    Ok(())
}
