//! Chain execution - state machine, events and the engine
//!
//! A chain is a set of tasks sharing one `chain_id`, totally ordered by
//! `step_index` with optional named parallel tracks. Steps in the same
//! track, or connected by a parent/child edge, execute strictly in order;
//! steps in different, declared-independent tracks may run concurrently.
//!
//! Every state transition appends a typed event to the run's log, used
//! for audit and for resuming an interrupted run.

pub mod actions;
pub mod engine;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::ChainsConfig;
use crate::error::{Error, Result};

pub use actions::{ActionRegistry, PromptAction, StepAction, StepInput, StepOutput};
pub use engine::ChainEngine;

/// Per-step state machine
///
/// `WaitingForParent -> ReadyToExecute -> Executing -> {StepCompleted |
/// WaitingForData -> DataProcessing -> StepCompleted | ChainFailed}`;
/// `ChainCancelled` is reachable from any non-terminal state on explicit
/// cancellation.
///
/// `WaitingForData` is reserved for actions that source their output
/// asynchronously after returning. In-process actions deliver output with
/// their completion, so the engine goes straight to `DataProcessing` when
/// it merges step output into the chain data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepState {
    WaitingForParent,
    ReadyToExecute,
    Executing,
    WaitingForData,
    DataProcessing,
    StepCompleted,
    ChainFailed,
    ChainCancelled,
}

impl StepState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::StepCompleted | Self::ChainFailed | Self::ChainCancelled
        )
    }
}

impl std::fmt::Display for StepState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::WaitingForParent => "waiting_for_parent",
            Self::ReadyToExecute => "ready_to_execute",
            Self::Executing => "executing",
            Self::WaitingForData => "waiting_for_data",
            Self::DataProcessing => "data_processing",
            Self::StepCompleted => "step_completed",
            Self::ChainFailed => "chain_failed",
            Self::ChainCancelled => "chain_cancelled",
        };
        write!(f, "{s}")
    }
}

/// Chain-level run state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChainRunState {
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl ChainRunState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Running)
    }
}

/// Error-handling strategy, selected once per chain run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorStrategy {
    /// First step failure fails the whole chain and halts remaining steps
    FailFast,
    /// A failed step is marked failed; independent steps continue
    ContinueOnError,
    /// Retry up to `max_retries` before treating the step as failed
    RetryOnError,
    /// A failed step is marked completed with empty output; dependents proceed
    SkipOnError,
}

impl std::str::FromStr for ErrorStrategy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "fail_fast" => Ok(Self::FailFast),
            "continue_on_error" => Ok(Self::ContinueOnError),
            "retry_on_error" => Ok(Self::RetryOnError),
            "skip_on_error" => Ok(Self::SkipOnError),
            other => Err(Error::Validation(format!(
                "unknown error strategy '{other}'"
            ))),
        }
    }
}

/// Execution configuration of one chain run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionSettings {
    pub max_retries: u32,
    pub step_timeout_secs: u64,
    pub total_timeout_secs: u64,
    pub error_strategy: ErrorStrategy,
    pub parallel_enabled: bool,
}

impl Default for ExecutionSettings {
    fn default() -> Self {
        Self {
            max_retries: 2,
            step_timeout_secs: 300,
            total_timeout_secs: 3600,
            error_strategy: ErrorStrategy::FailFast,
            parallel_enabled: true,
        }
    }
}

impl ExecutionSettings {
    /// Derive settings from the configuration file section
    pub fn from_config(config: &ChainsConfig) -> Result<Self> {
        Ok(Self {
            max_retries: config.max_retries,
            step_timeout_secs: config.step_timeout_secs,
            total_timeout_secs: config.total_timeout_secs,
            error_strategy: config.error_strategy.parse()?,
            parallel_enabled: config.parallel_enabled,
        })
    }
}

/// One step of a chain definition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepDefinition {
    pub name: String,
    pub description: String,
    /// Action tag resolved through the registry; defaults to "prompt"
    #[serde(default = "default_action")]
    pub action: String,
    /// Explicit parent step index; overrides track/order-derived parents
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_step: Option<usize>,
    /// Named parallel track this step belongs to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub track: Option<String>,
}

fn default_action() -> String {
    "prompt".to_string()
}

/// Definition of a whole chain run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainDefinition {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chain_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub steps: Vec<StepDefinition>,
    #[serde(default)]
    pub settings: Option<ExecutionSettings>,
    /// Seed data available to the first steps
    #[serde(default)]
    pub initial_data: serde_json::Map<String, serde_json::Value>,
}

/// Typed event appended on every transition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChainEventKind {
    ChainStarted,
    StepStarted,
    StepCompleted,
    StepFailed,
    StepRetried,
    DataPassed,
    ChainCompleted,
    ChainFailed,
    ChainCancelled,
}

/// One entry of a chain's append-only event log
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainEvent {
    pub kind: ChainEventKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_index: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
}

impl ChainEvent {
    pub fn new(kind: ChainEventKind) -> Self {
        Self {
            kind,
            step_index: None,
            task_id: None,
            timestamp: Utc::now(),
            payload: None,
        }
    }

    pub fn step(kind: ChainEventKind, step_index: usize, task_id: impl Into<String>) -> Self {
        Self {
            kind,
            step_index: Some(step_index),
            task_id: Some(task_id.into()),
            timestamp: Utc::now(),
            payload: None,
        }
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = Some(payload);
        self
    }
}

/// Snapshot of one step for status reporting
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepReport {
    pub step_index: usize,
    pub task_id: String,
    pub name: String,
    pub state: StepState,
    pub attempts: u32,
}

/// Snapshot of a chain run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainStatusReport {
    pub chain_id: String,
    pub state: ChainRunState,
    pub steps: Vec<StepReport>,
    pub chain_data: serde_json::Map<String, serde_json::Value>,
    /// Non-fatal step failures surfaced under continue/skip strategies
    #[serde(default)]
    pub warnings: Vec<String>,
}
