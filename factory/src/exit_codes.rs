//! Stable exit codes for the factory CLI.

/// Run completed, dry-run or plan-only finished, or a termination signal was handled.
pub const OK: i32 = 0;
/// Planning or verification exhausted, invalid plan, global timeout or any other error.
pub const FAILURE: i32 = 1;
