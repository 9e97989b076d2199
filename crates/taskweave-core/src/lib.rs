//! Taskweave Core Library
//!
//! This crate provides the core functionality for Taskweave, including:
//! - Task store (dependency-aware CRUD, batch create/update, search)
//! - Dependency graph analysis (readiness, cycle detection, reference validation)
//! - Dynamic task insertion with edge rewiring and rollback
//! - Execution memory (per-run contexts, reusable knowledge base)
//! - Chain execution engine (step state machine, error strategies, event log)
//! - Reasoning provider abstraction (sentinel + HTTP backends)

pub mod adjust;
pub mod chains;
pub mod config;
pub mod error;
pub mod graph;
pub mod memory;
pub mod provider;
pub mod storage;
pub mod tasks;
pub mod templates;

pub use error::{Error, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::adjust::{InsertOutcome, InsertRequest, TaskAdjuster};
    pub use crate::chains::{ChainDefinition, ChainEngine, ErrorStrategy, StepState};
    pub use crate::config::Config;
    pub use crate::error::{Error, Result};
    pub use crate::memory::{KnowledgeEntry, KnowledgeQuery, MemoryStore};
    pub use crate::tasks::{Task, TaskStatus, TaskStore};
}

#[cfg(test)]
mod config_tests;
#[cfg(test)]
mod graph_tests;
#[cfg(test)]
mod memory_tests;
#[cfg(test)]
mod provider_tests;
#[cfg(test)]
mod storage_tests;
#[cfg(test)]
mod tasks_tests;
