//! I/O adapters: filesystem, processes, agents, templates and config.

pub mod agent;
pub mod config;
pub mod extract;
pub mod git;
pub mod plan_store;
pub mod process;
pub mod prompt;
pub mod workspace;
