//! Task model and the canonical task store
//!
//! Tasks form a dependency graph: a directed edge `A -> B` in
//! `dependencies` means "B must complete before A can run". The store in
//! [`store`] exclusively owns the collection; the graph analyzer and the
//! adjuster operate on snapshots taken from it.

pub mod store;

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::chains::StepState;

pub use store::{BatchItem, BatchMode, TaskStore};

/// Lifecycle status of a task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
    Blocked,
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::InProgress => write!(f, "in_progress"),
            Self::Completed => write!(f, "completed"),
            Self::Blocked => write!(f, "blocked"),
        }
    }
}

/// Urgency of a task; ordering follows variant order, `Critical` highest
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Urgency {
    Low,
    Medium,
    High,
    Critical,
}

impl std::fmt::Display for Urgency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
            Self::Critical => write!(f, "critical"),
        }
    }
}

/// A unit of work in the plan
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    /// Stable identifier (uuid v4)
    pub id: String,
    pub name: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub status: TaskStatus,
    /// Ids of tasks that must complete before this one (set semantics)
    #[serde(default)]
    pub dependencies: Vec<String>,
    /// Ids of tasks this one is explicitly blocked by
    #[serde(default)]
    pub blocked_by: Vec<String>,
    /// Ids of tasks this one declares it blocks; may reference tasks that
    /// do not exist yet
    #[serde(default)]
    pub blocks: Vec<String>,
    /// Priority 1-10; higher means more important
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub urgency: Option<Urgency>,
    #[serde(default)]
    pub related_files: Vec<String>,
    /// Completion summary; the only mutable field once completed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,

    // Chain membership (absent for plain tasks)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chain_id: Option<String>,
    /// 0-based position within the chain
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_index: Option<usize>,
    /// Key/value payload carried between chain steps
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub chain_data: serde_json::Map<String, serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_step_id: Option<String>,
    #[serde(default)]
    pub child_step_ids: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chain_status: Option<StepState>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Task {
    /// Create a new pending task with the given name and description
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            description: description.into(),
            notes: None,
            status: TaskStatus::Pending,
            dependencies: Vec::new(),
            blocked_by: Vec::new(),
            blocks: Vec::new(),
            priority: None,
            urgency: None,
            related_files: Vec::new(),
            summary: None,
            chain_id: None,
            step_index: None,
            chain_data: serde_json::Map::new(),
            parent_step_id: None,
            child_step_ids: Vec::new(),
            chain_status: None,
            created_at: now,
            updated_at: now,
            completed_at: None,
        }
    }

    pub fn with_dependencies(mut self, dependencies: Vec<String>) -> Self {
        self.dependencies = dependencies;
        self
    }

    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn with_urgency(mut self, urgency: Urgency) -> Self {
        self.urgency = Some(urgency);
        self
    }

    pub fn is_completed(&self) -> bool {
        self.status == TaskStatus::Completed
    }

    /// Whether this task and `other` share a chain
    pub fn shares_chain_with(&self, other: &Task) -> bool {
        match (&self.chain_id, &other.chain_id) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        }
    }
}

/// Request to create a single task
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateTask {
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub notes: Option<String>,
    /// Existing task ids this task depends on
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default)]
    pub related_files: Vec<String>,
    #[serde(default)]
    pub priority: Option<u8>,
    #[serde(default)]
    pub urgency: Option<Urgency>,
}

/// Partial update to a task; `None` fields are left untouched
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskPatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub notes: Option<String>,
    pub status: Option<TaskStatus>,
    pub dependencies: Option<Vec<String>>,
    pub blocked_by: Option<Vec<String>>,
    pub blocks: Option<Vec<String>>,
    pub priority: Option<u8>,
    pub urgency: Option<Urgency>,
    pub related_files: Option<Vec<String>>,
    pub summary: Option<String>,
    pub chain_data: Option<serde_json::Map<String, serde_json::Value>>,
    pub chain_status: Option<StepState>,
}

impl TaskPatch {
    /// Whether the patch touches anything other than `summary`/`status`,
    /// which are the only fields mutable on a completed task
    pub fn touches_immutable_fields(&self) -> bool {
        self.name.is_some()
            || self.description.is_some()
            || self.notes.is_some()
            || self.dependencies.is_some()
            || self.blocked_by.is_some()
            || self.blocks.is_some()
            || self.priority.is_some()
            || self.urgency.is_some()
            || self.related_files.is_some()
            || self.chain_data.is_some()
            || self.chain_status.is_some()
    }
}

/// Index tasks by id for reference resolution
pub fn index_by_id(tasks: &[Task]) -> HashMap<&str, &Task> {
    tasks.iter().map(|t| (t.id.as_str(), t)).collect()
}
