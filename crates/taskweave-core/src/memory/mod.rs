//! Execution memory - per-run contexts and the long-lived knowledge base
//!
//! One [`ExecutionContext`] is recorded per task-execution run: an ordered
//! list of steps plus the decisions made and discoveries found along the
//! way. Steps, decisions and discoveries are append-only once written; the
//! context itself transitions exactly once from running to a terminal
//! state.
//!
//! Knowledge entries are reusable, confidence-scored insights. They are
//! never mutated, only superseded by newer entries, and are retrieved by
//! matching applicability against a query context.

pub mod store;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub use store::{KnowledgeQuery, MemoryStore};

/// Status of an execution run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Running,
    Completed,
    Failed,
}

impl ExecutionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// One recorded action within an execution run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    pub action: String,
    pub description: String,
    pub recorded_at: DateTime<Utc>,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    #[serde(default)]
    pub resources: Vec<String>,
}

impl Step {
    pub fn new(action: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            description: description.into(),
            recorded_at: Utc::now(),
            status: "completed".to_string(),
            output: None,
            duration_ms: None,
            resources: Vec::new(),
        }
    }

    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = status.into();
        self
    }

    pub fn with_output(mut self, output: impl Into<String>) -> Self {
        self.output = Some(output.into());
        self
    }

    pub fn with_duration_ms(mut self, duration_ms: u64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }
}

/// A recorded decision: the options weighed, the one chosen, and why
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Decision {
    pub options: Vec<String>,
    pub chosen: String,
    pub reasoning: String,
    pub recorded_at: DateTime<Utc>,
}

impl Decision {
    pub fn new(
        options: Vec<String>,
        chosen: impl Into<String>,
        reasoning: impl Into<String>,
    ) -> Self {
        Self {
            options,
            chosen: chosen.into(),
            reasoning: reasoning.into(),
            recorded_at: Utc::now(),
        }
    }
}

/// Something learned during execution worth keeping with the run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Discovery {
    pub category: String,
    pub title: String,
    pub description: String,
    pub recorded_at: DateTime<Utc>,
}

impl Discovery {
    pub fn new(
        category: impl Into<String>,
        title: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            category: category.into(),
            title: title.into(),
            description: description.into(),
            recorded_at: Utc::now(),
        }
    }
}

/// Recorded history of one task-execution run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionContext {
    pub execution_id: String,
    pub task_id: String,
    pub steps: Vec<Step>,
    pub decisions: Vec<Decision>,
    pub discoveries: Vec<Discovery>,
    pub status: ExecutionStatus,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl ExecutionContext {
    pub fn new(task_id: impl Into<String>) -> Self {
        Self {
            execution_id: Uuid::new_v4().to_string(),
            task_id: task_id.into(),
            steps: Vec::new(),
            decisions: Vec::new(),
            discoveries: Vec::new(),
            status: ExecutionStatus::Running,
            started_at: Utc::now(),
            finished_at: None,
        }
    }
}

/// Where and when a knowledge entry came from
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Provenance {
    /// Source kind, e.g. "execution", "operator"
    pub source: String,
    pub recorded_at: DateTime<Utc>,
    /// Reliability of the source in [0, 1]
    pub reliability: f64,
    pub verified: bool,
}

impl Default for Provenance {
    fn default() -> Self {
        Self {
            source: "execution".to_string(),
            recorded_at: Utc::now(),
            reliability: 0.5,
            verified: false,
        }
    }
}

/// The situation a knowledge entry was produced in
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KnowledgeContext {
    #[serde(default)]
    pub domain: Option<String>,
    #[serde(default)]
    pub technologies: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scenario: Option<String>,
    #[serde(default)]
    pub constraints: Vec<String>,
    #[serde(default)]
    pub assumptions: Vec<String>,
}

/// Where a knowledge entry applies, and where it explicitly does not
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Applicability {
    #[serde(default)]
    pub task_types: Vec<String>,
    #[serde(default)]
    pub project_types: Vec<String>,
    #[serde(default)]
    pub conditions: Vec<String>,
    /// Domains or project types this entry must never be returned for
    #[serde(default)]
    pub exclusions: Vec<String>,
}

/// A reusable, confidence-scored insight
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeEntry {
    pub id: String,
    /// Entry kind, e.g. "solution", "pattern", "pitfall"
    pub kind: String,
    pub title: String,
    pub content: String,
    pub context: KnowledgeContext,
    pub applicability: Applicability,
    /// Confidence in [0, 1]
    pub confidence: f64,
    pub provenance: Provenance,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Ids of related knowledge entries
    #[serde(default)]
    pub related: Vec<String>,
    /// Id of the entry this one supersedes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub supersedes: Option<String>,
}

impl KnowledgeEntry {
    pub fn new(
        kind: impl Into<String>,
        title: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            kind: kind.into(),
            title: title.into(),
            content: content.into(),
            context: KnowledgeContext::default(),
            applicability: Applicability::default(),
            confidence: 0.5,
            provenance: Provenance::default(),
            tags: Vec::new(),
            related: Vec::new(),
            supersedes: None,
        }
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence.clamp(0.0, 1.0);
        self
    }

    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.context.domain = Some(domain.into());
        self
    }

    pub fn with_technologies(mut self, technologies: Vec<String>) -> Self {
        self.context.technologies = technologies;
        self
    }
}
