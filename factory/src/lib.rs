//! Retry-bounded plan/implement/verify orchestrator for code-generation agents.
//!
//! A run turns a natural-language goal into a persisted plan (`prd.json`) via
//! an architect/critic exchange, then drives a worker and a verifier through
//! the plan's tasks in dependency order. The architecture enforces a strict
//! separation:
//!
//! - **[`core`]**: Pure, deterministic logic (scheduling, dependency checks,
//!   scenario classification, output extraction). No I/O.
//! - **[`io`]**: Side-effecting adapters (plan file, agent processes, prompt
//!   templates, workspace scanning, config).
//!
//! Orchestration modules ([`negotiate`], [`worker`], [`verify`],
//! [`orchestrator`]) coordinate core logic with I/O through a [`context::RunContext`]
//! that owns the in-memory plan snapshot.

pub mod context;
pub mod core;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod negotiate;
pub mod orchestrator;
pub mod plan;
pub mod scenario;
pub mod shutdown;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
pub mod verify;
pub mod worker;
