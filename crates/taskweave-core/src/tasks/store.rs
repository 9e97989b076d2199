//! Canonical task store
//!
//! The store exclusively owns the task collection. Every mutation runs
//! under a single collection-wide write lock: read the whole set, compute
//! the candidate collection, persist it, then commit in memory. Persisting
//! before the in-memory commit means a storage failure aborts the
//! operation with no partial state visible to anyone.

use std::collections::HashMap;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::graph;
use crate::storage::DocumentStore;

use super::{CreateTask, Task, TaskPatch, TaskStatus, Urgency, index_by_id};

const TASKS_COLLECTION: &str = "tasks";

/// How a batch of items is merged into the existing collection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BatchMode {
    /// Add every item as a new task
    Append,
    /// Discard all non-completed tasks, then insert the batch
    Overwrite,
    /// Update same-named non-completed tasks in place, append the rest
    Selective,
    /// Same discard semantics as `Overwrite`
    ClearAllTasks,
}

/// One item of a batch create/update
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchItem {
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub notes: Option<String>,
    /// References to other tasks, by id or by name; names are resolved
    /// within the batch first, then against existing tasks
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default)]
    pub related_files: Vec<String>,
    #[serde(default)]
    pub priority: Option<u8>,
    #[serde(default)]
    pub urgency: Option<Urgency>,
    #[serde(default)]
    pub chain_id: Option<String>,
    #[serde(default)]
    pub step_index: Option<usize>,
    /// Parent step reference, by id or by name within the batch
    #[serde(default)]
    pub parent_step_id: Option<String>,
    #[serde(default)]
    pub chain_data: serde_json::Map<String, serde_json::Value>,
}

/// Store owning the canonical task collection
pub struct TaskStore {
    docs: DocumentStore,
    inner: RwLock<Vec<Task>>,
}

impl TaskStore {
    /// Open the store, loading any previously persisted collection
    pub fn open(docs: DocumentStore) -> Result<Self> {
        let tasks: Vec<Task> = docs.read(TASKS_COLLECTION)?;
        debug!(count = tasks.len(), "task store opened");
        Ok(Self {
            docs,
            inner: RwLock::new(tasks),
        })
    }

    /// Snapshot the full collection for read-only analysis
    pub async fn snapshot(&self) -> Vec<Task> {
        self.inner.read().await.clone()
    }

    /// Create a single task
    pub async fn create(&self, request: CreateTask) -> Result<Task> {
        if request.name.trim().is_empty() {
            return Err(Error::Validation("task name must not be empty".into()));
        }
        if request.description.trim().is_empty() {
            return Err(Error::Validation(
                "task description must not be empty".into(),
            ));
        }
        if let Some(priority) = request.priority {
            validate_priority(priority)?;
        }

        let mut guard = self.inner.write().await;

        for dep in &request.dependencies {
            if !guard.iter().any(|t| &t.id == dep) {
                return Err(Error::TaskNotFound(dep.clone()));
            }
        }

        let mut task = Task::new(request.name, request.description);
        task.notes = request.notes;
        task.dependencies = dedup(request.dependencies);
        task.related_files = request.related_files;
        task.priority = request.priority;
        task.urgency = request.urgency;

        let mut candidate = guard.clone();
        candidate.push(task.clone());
        self.docs.write(TASKS_COLLECTION, &candidate)?;
        *guard = candidate;

        info!(task_id = %task.id, name = %task.name, "task created");
        Ok(task)
    }

    /// Get a task by id
    pub async fn get(&self, id: &str) -> Result<Task> {
        self.inner
            .read()
            .await
            .iter()
            .find(|t| t.id == id)
            .cloned()
            .ok_or_else(|| Error::TaskNotFound(id.to_string()))
    }

    /// List tasks, optionally filtered by status
    pub async fn list(&self, status: Option<TaskStatus>) -> Vec<Task> {
        let guard = self.inner.read().await;
        match status {
            Some(status) => guard.iter().filter(|t| t.status == status).cloned().collect(),
            None => guard.clone(),
        }
    }

    /// Search by exact id or case-insensitive keyword over name,
    /// description and notes
    pub async fn search(&self, query: &str) -> Vec<Task> {
        let guard = self.inner.read().await;
        if let Some(task) = guard.iter().find(|t| t.id == query) {
            return vec![task.clone()];
        }
        let needle = query.to_lowercase();
        guard
            .iter()
            .filter(|t| {
                t.name.to_lowercase().contains(&needle)
                    || t.description.to_lowercase().contains(&needle)
                    || t.notes
                        .as_deref()
                        .is_some_and(|n| n.to_lowercase().contains(&needle))
            })
            .cloned()
            .collect()
    }

    /// Apply a partial update, re-validating references and acyclicity
    ///
    /// A completed task accepts changes to `summary` and `status` only.
    pub async fn update(&self, id: &str, patch: TaskPatch) -> Result<Task> {
        if let Some(priority) = patch.priority {
            validate_priority(priority)?;
        }

        let mut guard = self.inner.write().await;
        let position = guard
            .iter()
            .position(|t| t.id == id)
            .ok_or_else(|| Error::TaskNotFound(id.to_string()))?;

        if guard[position].is_completed() && patch.touches_immutable_fields() {
            return Err(Error::TaskCompleted(id.to_string()));
        }

        let mut candidate = guard.clone();
        let deps_changed = patch.dependencies.is_some() || patch.blocked_by.is_some();
        apply_patch(&mut candidate[position], patch);

        if deps_changed {
            let issues = graph::validate_references(&candidate);
            if let Some(err) = issues.iter().find(|i| i.severity == graph::Severity::Error) {
                return Err(Error::MissingReference {
                    task_id: err.task_id.clone(),
                    field: err.field,
                    reference: err.reference.clone(),
                });
            }
            let cycle = graph::detect_cycle(&candidate);
            if !cycle.is_empty() {
                return Err(Error::CycleDetected { path: cycle });
            }
        }

        self.docs.write(TASKS_COLLECTION, &candidate)?;
        let task = candidate[position].clone();
        *guard = candidate;

        debug!(task_id = %id, "task updated");
        Ok(task)
    }

    /// Delete a task; completed tasks are never deleted
    ///
    /// The deleted id is also removed from other tasks' `dependencies` and
    /// `blocked_by` so the collection stays referentially consistent.
    pub async fn delete(&self, id: &str) -> Result<()> {
        let mut guard = self.inner.write().await;
        let position = guard
            .iter()
            .position(|t| t.id == id)
            .ok_or_else(|| Error::TaskNotFound(id.to_string()))?;

        if guard[position].is_completed() {
            return Err(Error::TaskCompleted(id.to_string()));
        }

        let mut candidate = guard.clone();
        candidate.remove(position);
        for task in candidate.iter_mut() {
            task.dependencies.retain(|d| d != id);
            task.blocked_by.retain(|d| d != id);
        }

        self.docs.write(TASKS_COLLECTION, &candidate)?;
        *guard = candidate;

        info!(task_id = %id, "task deleted");
        Ok(())
    }

    /// Create or update tasks in bulk
    ///
    /// Textual dependency references (names) are resolved to ids within
    /// the batch first, then against existing tasks.
    pub async fn batch(&self, items: Vec<BatchItem>, mode: BatchMode) -> Result<Vec<Task>> {
        for item in &items {
            if item.name.trim().is_empty() {
                return Err(Error::Validation("batch item name must not be empty".into()));
            }
            if let Some(priority) = item.priority {
                validate_priority(priority)?;
            }
        }

        let mut guard = self.inner.write().await;

        let mut candidate: Vec<Task> = match mode {
            BatchMode::Append | BatchMode::Selective => guard.clone(),
            BatchMode::Overwrite | BatchMode::ClearAllTasks => {
                guard.iter().filter(|t| t.is_completed()).cloned().collect()
            }
        };

        // Assign ids up front so in-batch name references can resolve.
        let mut prepared: Vec<(Task, BatchItem)> = Vec::with_capacity(items.len());
        let mut batch_names: HashMap<String, String> = HashMap::new();
        for item in items {
            let reuse = if mode == BatchMode::Selective {
                candidate
                    .iter()
                    .find(|t| t.name == item.name && !t.is_completed())
                    .cloned()
            } else {
                None
            };
            // Selective reuse keeps the existing task's identity and
            // lifecycle fields; only the batch-provided fields change.
            let task = match reuse {
                Some(mut existing) => {
                    existing.description = item.description.clone();
                    existing.updated_at = Utc::now();
                    existing
                }
                None => Task::new(item.name.clone(), item.description.clone()),
            };
            batch_names.insert(item.name.clone(), task.id.clone());
            prepared.push((task, item));
        }

        let existing_names: HashMap<String, String> = candidate
            .iter()
            .map(|t| (t.name.clone(), t.id.clone()))
            .collect();
        let existing_ids: Vec<String> = candidate.iter().map(|t| t.id.clone()).collect();

        let resolve = |reference: &str| -> Result<String> {
            if batch_names.values().any(|id| id == reference)
                || existing_ids.iter().any(|id| id == reference)
            {
                return Ok(reference.to_string());
            }
            if let Some(id) = batch_names.get(reference) {
                return Ok(id.clone());
            }
            if let Some(id) = existing_names.get(reference) {
                return Ok(id.clone());
            }
            Err(Error::Validation(format!(
                "dependency reference '{reference}' does not match any task id or name"
            )))
        };

        let mut affected = Vec::with_capacity(prepared.len());
        for (mut task, item) in prepared {
            task.notes = item.notes;
            task.related_files = item.related_files;
            task.priority = item.priority;
            task.urgency = item.urgency;
            task.chain_id = item.chain_id;
            task.step_index = item.step_index;
            task.chain_data = item.chain_data;
            let mut deps = Vec::with_capacity(item.dependencies.len());
            for reference in &item.dependencies {
                deps.push(resolve(reference)?);
            }
            task.dependencies = dedup(deps);
            if let Some(parent) = &item.parent_step_id {
                task.parent_step_id = Some(resolve(parent)?);
            }
            affected.push(task);
        }

        // Link parent -> child within the batch.
        let child_links: Vec<(String, String)> = affected
            .iter()
            .filter_map(|t| t.parent_step_id.clone().map(|p| (p, t.id.clone())))
            .collect();
        for (parent_id, child_id) in child_links {
            if let Some(parent) = affected.iter_mut().find(|t| t.id == parent_id) {
                if !parent.child_step_ids.contains(&child_id) {
                    parent.child_step_ids.push(child_id);
                }
            }
        }

        for task in &affected {
            if let Some(position) = candidate.iter().position(|t| t.id == task.id) {
                candidate[position] = task.clone();
            } else {
                candidate.push(task.clone());
            }
        }

        let cycle = graph::detect_cycle(&candidate);
        if !cycle.is_empty() {
            return Err(Error::CycleDetected { path: cycle });
        }

        self.docs.write(TASKS_COLLECTION, &candidate)?;
        *guard = candidate;

        info!(mode = ?mode, count = affected.len(), "batch applied");
        Ok(affected)
    }

    /// Insert fully-formed tasks in one atomic mutation
    ///
    /// Used by the chain engine, which assigns ids and chain fields up
    /// front so parent/child links can reference them.
    pub(crate) async fn insert_tasks(&self, tasks: Vec<Task>) -> Result<Vec<Task>> {
        let mut guard = self.inner.write().await;

        let mut candidate = guard.clone();
        for task in &tasks {
            if candidate.iter().any(|t| t.id == task.id) {
                return Err(Error::Validation(format!(
                    "task id '{}' already exists",
                    task.id
                )));
            }
            candidate.push(task.clone());
        }

        let cycle = graph::detect_cycle(&candidate);
        if !cycle.is_empty() {
            return Err(Error::CycleDetected { path: cycle });
        }

        self.docs.write(TASKS_COLLECTION, &candidate)?;
        *guard = candidate;

        info!(count = tasks.len(), "tasks inserted");
        Ok(tasks)
    }

    /// Replace the dependency sets of several tasks at once, all-or-nothing
    ///
    /// Completed tasks are immutable and rejected as targets. References
    /// are validated but acyclicity is the caller's concern;
    /// the adjuster checks for cycles after committing and rolls back via
    /// the same method.
    pub(crate) async fn rewire_dependencies(
        &self,
        changes: &[(String, Vec<String>)],
    ) -> Result<Vec<Task>> {
        let mut guard = self.inner.write().await;
        let mut candidate = guard.clone();

        {
            let by_id = index_by_id(&candidate);
            for (task_id, deps) in changes {
                let Some(target) = by_id.get(task_id.as_str()) else {
                    return Err(Error::TaskNotFound(task_id.clone()));
                };
                if target.is_completed() {
                    return Err(Error::TaskCompleted(task_id.clone()));
                }
                for dep in deps {
                    if !by_id.contains_key(dep.as_str()) {
                        return Err(Error::MissingReference {
                            task_id: task_id.clone(),
                            field: "dependencies",
                            reference: dep.clone(),
                        });
                    }
                }
            }
        }

        let now = Utc::now();
        let mut affected = Vec::with_capacity(changes.len());
        for (task_id, deps) in changes {
            let task = candidate
                .iter_mut()
                .find(|t| &t.id == task_id)
                .expect("validated above");
            task.dependencies = dedup(deps.clone());
            task.updated_at = now;
            affected.push(task.clone());
        }

        self.docs.write(TASKS_COLLECTION, &candidate)?;
        *guard = candidate;

        debug!(count = affected.len(), "dependencies rewired");
        Ok(affected)
    }
}

fn validate_priority(priority: u8) -> Result<()> {
    if !(1..=10).contains(&priority) {
        return Err(Error::Validation(format!(
            "priority must be between 1 and 10, got {priority}"
        )));
    }
    Ok(())
}

fn apply_patch(task: &mut Task, patch: TaskPatch) {
    if let Some(name) = patch.name {
        task.name = name;
    }
    if let Some(description) = patch.description {
        task.description = description;
    }
    if let Some(notes) = patch.notes {
        task.notes = Some(notes);
    }
    if let Some(status) = patch.status {
        task.status = status;
        if status == TaskStatus::Completed {
            task.completed_at = Some(Utc::now());
        }
    }
    if let Some(dependencies) = patch.dependencies {
        task.dependencies = dedup(dependencies);
    }
    if let Some(blocked_by) = patch.blocked_by {
        task.blocked_by = dedup(blocked_by);
    }
    if let Some(blocks) = patch.blocks {
        task.blocks = dedup(blocks);
    }
    if let Some(priority) = patch.priority {
        task.priority = Some(priority);
    }
    if let Some(urgency) = patch.urgency {
        task.urgency = Some(urgency);
    }
    if let Some(related_files) = patch.related_files {
        task.related_files = related_files;
    }
    if let Some(summary) = patch.summary {
        task.summary = Some(summary);
    }
    if let Some(chain_data) = patch.chain_data {
        task.chain_data = chain_data;
    }
    if let Some(chain_status) = patch.chain_status {
        task.chain_status = Some(chain_status);
    }
    task.updated_at = Utc::now();
}

fn dedup(mut ids: Vec<String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    ids.retain(|id| seen.insert(id.clone()));
    ids
}
