//! Error types for Taskweave

use thiserror::Error;

/// Result type alias using Taskweave's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Taskweave error types with helpful messages
#[derive(Error, Debug)]
pub enum Error {
    // Input errors
    #[error("Invalid input: {0}")]
    Validation(String),

    // Entity errors
    #[error("Task '{0}' not found. Run `taskweave task list` to see all tasks.")]
    TaskNotFound(String),

    #[error("Task '{0}' is completed and can no longer be modified or deleted")]
    TaskCompleted(String),

    #[error("Anchor task '{0}' not found; nothing was inserted")]
    AnchorNotFound(String),

    #[error("Execution context '{0}' not found")]
    ExecutionNotFound(String),

    #[error("Execution context '{0}' already finished; steps are append-only while running")]
    ExecutionFinished(String),

    #[error("Chain '{0}' not found")]
    ChainNotFound(String),

    #[error("Knowledge entry '{0}' not found")]
    KnowledgeNotFound(String),

    // Dependency errors
    #[error("Task '{task_id}' references unknown task '{reference}' in `{field}`")]
    MissingReference {
        task_id: String,
        field: &'static str,
        reference: String,
    },

    #[error("Dependency cycle detected: {}", path.join(" -> "))]
    CycleDetected { path: Vec<String> },

    // Chain errors
    #[error(transparent)]
    Chain(#[from] ChainError),

    // Provider errors
    #[error("Provider error: {0}")]
    Provider(String),

    #[error("Network error: {0}. Check your internet connection.")]
    Network(#[from] reqwest::Error),

    // Storage errors
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Config errors
    #[error("Configuration error: {0}")]
    Config(String),

    // Template errors
    #[error("Template '{0}' could not be loaded")]
    Template(String),
}

/// Chain-level errors, governed by the chain's error-handling strategy
#[derive(Error, Debug)]
pub enum ChainError {
    #[error("Step {step_index} failed: {reason}")]
    StepExecutionFailed { step_index: usize, reason: String },

    #[error("Data mapping failed: {0}")]
    DataMapping(String),

    #[error("Step {step_index} timed out after {timeout_secs}s")]
    Timeout { step_index: usize, timeout_secs: u64 },

    #[error("Chain dependency error: {0}")]
    Dependency(String),

    #[error("Chain system error: {0}")]
    System(String),
}

impl Error {
    /// Whether this error may be retried by a chain's retry strategy.
    ///
    /// Validation and not-found errors are never retried; they will fail
    /// the same way on every attempt.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            Error::Validation(_)
                | Error::TaskNotFound(_)
                | Error::TaskCompleted(_)
                | Error::AnchorNotFound(_)
                | Error::ExecutionNotFound(_)
                | Error::ExecutionFinished(_)
                | Error::ChainNotFound(_)
                | Error::KnowledgeNotFound(_)
        )
    }
}
