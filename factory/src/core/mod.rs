//! Deterministic, pure logic shared by the orchestrator.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! plans and agent text and return deterministic outputs suitable for tests.

pub mod dependencies;
pub mod extract;
pub mod invariants;
pub mod scenario;
pub mod scheduler;
