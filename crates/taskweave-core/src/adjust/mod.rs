//! Dynamic task insertion
//!
//! Inserts a new task into a running plan at a computed position, rewires
//! neighboring dependency edges so downstream ordering is preserved, and
//! reports suggestions and warnings. A post-insertion cycle check rolls
//! the whole insertion back rather than ever leaving the graph
//! inconsistent.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::graph;
use crate::memory::{Decision, ExecutionStatus, MemoryStore};
use crate::tasks::{CreateTask, Task, TaskStore, Urgency};
use crate::templates::{self, TemplateLoader};

/// Minimum title length accepted by [`TaskAdjuster::insert`]
const MIN_TITLE_LEN: usize = 3;
/// Minimum description length accepted by [`TaskAdjuster::insert`]
const MIN_DESCRIPTION_LEN: usize = 10;

const SUMMARY_TEMPLATE_ID: &str = "insertion_summary";
const SUMMARY_DEFAULT: &str =
    "Inserted task '{{title}}' {{position}}; {{adjusted}} task(s) rewired.";

/// Request to insert a task into the plan
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InsertRequest {
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub priority: Option<u8>,
    #[serde(default)]
    pub urgency: Option<Urgency>,
    /// Explicit anchor: the new task runs after this one
    #[serde(default)]
    pub insert_after: Option<String>,
    /// Explicit anchor: the new task runs before this one
    #[serde(default)]
    pub insert_before: Option<String>,
    #[serde(default)]
    pub related_task_ids: Vec<String>,
    /// Free-text context recorded with the insertion decision
    #[serde(default)]
    pub context: Option<String>,
}

/// A per-task adjustment emitted alongside an insertion
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdjustmentSuggestion {
    pub task_id: String,
    pub adjustment_type: String,
    pub reasoning: String,
    /// 1.0 for explicit anchors; [0.4, 0.8] for heuristic ones
    pub confidence: f64,
    pub impact: String,
}

/// Result of an insertion attempt
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InsertOutcome {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inserted_task: Option<Task>,
    pub adjusted_tasks: Vec<Task>,
    pub suggestions: Vec<AdjustmentSuggestion>,
    pub warnings: Vec<String>,
    pub summary: String,
}

/// Where the new task goes, relative to the rest of the plan
enum Anchor {
    After { task: Task, confidence: f64 },
    Before { task: Task, confidence: f64 },
    Append,
}

/// Inserts tasks into an existing plan without breaking ordering
pub struct TaskAdjuster {
    tasks: Arc<TaskStore>,
    memory: Arc<MemoryStore>,
    templates: Option<Arc<dyn TemplateLoader>>,
}

impl TaskAdjuster {
    pub fn new(tasks: Arc<TaskStore>, memory: Arc<MemoryStore>) -> Self {
        Self {
            tasks,
            memory,
            templates: None,
        }
    }

    /// Use a template loader for summary rendering
    pub fn with_templates(mut self, templates: Arc<dyn TemplateLoader>) -> Self {
        self.templates = Some(templates);
        self
    }

    /// Insert a task at a computed position, rewiring neighboring edges
    pub async fn insert(&self, request: InsertRequest) -> Result<InsertOutcome> {
        if request.title.trim().chars().count() < MIN_TITLE_LEN {
            return Err(Error::Validation(format!(
                "title must be at least {MIN_TITLE_LEN} characters"
            )));
        }
        if request.description.trim().chars().count() < MIN_DESCRIPTION_LEN {
            return Err(Error::Validation(format!(
                "description must be at least {MIN_DESCRIPTION_LEN} characters"
            )));
        }
        if request.insert_after.is_some() && request.insert_before.is_some() {
            return Err(Error::Validation(
                "specify at most one of insert_after and insert_before".into(),
            ));
        }

        let snapshot = self.tasks.snapshot().await;
        let anchor = self.resolve_anchor(&request, &snapshot)?;

        let dependencies = match &anchor {
            Anchor::After { task, .. } => vec![task.id.clone()],
            Anchor::Before { task, .. } => task.dependencies.clone(),
            Anchor::Append => Vec::new(),
        };

        let inserted = self
            .tasks
            .create(CreateTask {
                name: request.title.clone(),
                description: request.description.clone(),
                notes: request.context.clone(),
                dependencies,
                related_files: Vec::new(),
                priority: request.priority,
                urgency: request.urgency,
            })
            .await?;

        // Rewire neighbors, remembering prior edges for rollback.
        let mut rewires: Vec<(String, Vec<String>)> = Vec::new();
        let mut prior: Vec<(String, Vec<String>)> = Vec::new();
        match &anchor {
            Anchor::After { task: anchor_task, .. } => {
                // Completed dependents are immutable; their edge history
                // stays as recorded.
                for dependent in snapshot
                    .iter()
                    .filter(|t| t.dependencies.contains(&anchor_task.id) && !t.is_completed())
                {
                    let mut deps = dependent.dependencies.clone();
                    prior.push((dependent.id.clone(), deps.clone()));
                    for dep in deps.iter_mut() {
                        if *dep == anchor_task.id {
                            *dep = inserted.id.clone();
                        }
                    }
                    rewires.push((dependent.id.clone(), deps));
                }
            }
            Anchor::Before { task: anchor_task, .. } => {
                // The anchor's previous dependencies moved onto the new
                // task; the anchor now waits on the new task instead.
                prior.push((anchor_task.id.clone(), anchor_task.dependencies.clone()));
                rewires.push((anchor_task.id.clone(), vec![inserted.id.clone()]));
            }
            Anchor::Append => {}
        }

        let adjusted = if rewires.is_empty() {
            Vec::new()
        } else {
            self.tasks.rewire_dependencies(&rewires).await?
        };

        // Cycle check over the post-insertion graph; roll back on failure.
        let post = self.tasks.snapshot().await;
        let cycle = graph::detect_cycle(&post);
        if !cycle.is_empty() {
            warn!(task_id = %inserted.id, cycle = ?cycle, "insertion produced a cycle, rolling back");
            if !prior.is_empty() {
                self.tasks.rewire_dependencies(&prior).await?;
            }
            self.tasks.delete(&inserted.id).await?;
            return Ok(InsertOutcome {
                success: false,
                inserted_task: None,
                adjusted_tasks: Vec::new(),
                suggestions: Vec::new(),
                warnings: vec![format!("cycle detected: {}", cycle.join(" -> "))],
                summary: format!(
                    "Insertion of '{}' rolled back: it would have created a dependency cycle",
                    request.title
                ),
            });
        }

        let confidence = match &anchor {
            Anchor::After { confidence, .. } | Anchor::Before { confidence, .. } => *confidence,
            Anchor::Append => 1.0,
        };
        let suggestions: Vec<AdjustmentSuggestion> = adjusted
            .iter()
            .map(|task| AdjustmentSuggestion {
                task_id: task.id.clone(),
                adjustment_type: "dependency_rewired".to_string(),
                reasoning: format!(
                    "'{}' now waits on the inserted task so downstream ordering is preserved",
                    task.name
                ),
                confidence,
                impact: "execution order shifts by one step".to_string(),
            })
            .collect();

        let position = match &anchor {
            Anchor::After { task, .. } => format!("after '{}'", task.name),
            Anchor::Before { task, .. } => format!("before '{}'", task.name),
            Anchor::Append => "at the end of the plan".to_string(),
        };
        let summary = self.render_summary(&request.title, &position, adjusted.len());

        self.record_decision(&request, &inserted, &anchor).await;

        info!(task_id = %inserted.id, %position, adjusted = adjusted.len(), "task inserted");
        Ok(InsertOutcome {
            success: true,
            inserted_task: Some(inserted),
            adjusted_tasks: adjusted,
            suggestions,
            warnings: Vec::new(),
            summary,
        })
    }

    fn resolve_anchor(&self, request: &InsertRequest, snapshot: &[Task]) -> Result<Anchor> {
        if let Some(after) = &request.insert_after {
            let task = snapshot
                .iter()
                .find(|t| &t.id == after)
                .cloned()
                .ok_or_else(|| Error::AnchorNotFound(after.clone()))?;
            return Ok(Anchor::After {
                task,
                confidence: 1.0,
            });
        }
        if let Some(before) = &request.insert_before {
            let task = snapshot
                .iter()
                .find(|t| &t.id == before)
                .cloned()
                .ok_or_else(|| Error::AnchorNotFound(before.clone()))?;
            if task.is_completed() {
                return Err(Error::Validation(format!(
                    "cannot insert before completed task '{}'",
                    task.name
                )));
            }
            return Ok(Anchor::Before {
                task,
                confidence: 1.0,
            });
        }

        // Heuristic: highest-urgency, then highest-priority incomplete
        // task with no incomplete dependents; append when none qualifies.
        let candidates: Vec<&Task> = graph::tasks_without_incomplete_dependents(snapshot)
            .into_iter()
            .filter(|t| !t.is_completed())
            .collect();
        let Some(best) = candidates.iter().max_by(|a, b| {
            rank(a)
                .cmp(&rank(b))
                .then_with(|| b.created_at.cmp(&a.created_at))
        }) else {
            return Ok(Anchor::Append);
        };

        let tied = candidates
            .iter()
            .filter(|t| rank(t) == rank(best))
            .count()
            .max(1);
        let confidence = 0.4 + 0.4 / tied as f64;
        debug!(anchor = %best.id, tied, confidence, "heuristic anchor chosen");

        Ok(Anchor::After {
            task: (*best).clone(),
            confidence,
        })
    }

    fn render_summary(&self, title: &str, position: &str, adjusted: usize) -> String {
        let template = match &self.templates {
            Some(loader) => {
                templates::load_or_default(loader.as_ref(), SUMMARY_TEMPLATE_ID, SUMMARY_DEFAULT)
            }
            None => SUMMARY_DEFAULT.to_string(),
        };
        let mut values = HashMap::new();
        values.insert("title", title.to_string());
        values.insert("position", position.to_string());
        values.insert("adjusted", adjusted.to_string());
        templates::render(&template, &values)
    }

    /// Record why the plan changed so later pattern analysis can see it
    async fn record_decision(&self, request: &InsertRequest, inserted: &Task, anchor: &Anchor) {
        let chosen = match anchor {
            Anchor::After { .. } if request.insert_after.is_some() => "explicit_insert_after",
            Anchor::Before { .. } => "explicit_insert_before",
            Anchor::After { .. } => "heuristic_anchor",
            Anchor::Append => "append_to_end",
        };
        let reasoning = match &request.context {
            Some(context) => format!("operator context: {context}"),
            None => "no explicit anchor or context supplied".to_string(),
        };
        let decision = Decision::new(
            vec![
                "explicit_insert_after".to_string(),
                "explicit_insert_before".to_string(),
                "heuristic_anchor".to_string(),
                "append_to_end".to_string(),
            ],
            chosen,
            reasoning,
        );

        // Decision recording is best-effort bookkeeping; the insertion
        // itself already committed.
        let recorded = async {
            let context = self.memory.begin_execution(&inserted.id).await?;
            self.memory
                .record_decision(&context.execution_id, decision)
                .await?;
            self.memory
                .finish_execution(&context.execution_id, ExecutionStatus::Completed)
                .await?;
            Ok::<_, Error>(())
        }
        .await;
        if let Err(e) = recorded {
            warn!(task_id = %inserted.id, error = %e, "could not record insertion decision");
        }
    }
}

/// Ordering key for heuristic anchor selection
fn rank(task: &Task) -> (Urgency, u8) {
    (
        task.urgency.unwrap_or(Urgency::Low),
        task.priority.unwrap_or(0),
    )
}
