//! Dependency graph analyzer
//!
//! Pure functions over a snapshot of the task collection: execution
//! readiness, cycle detection and reference validation. Callers take a
//! snapshot from the task store so analysis never races a mutation.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::tasks::{Task, TaskStatus, index_by_id};

/// Result of a `can_execute` query
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Readiness {
    pub can_execute: bool,
    /// Ids of incomplete dependencies blocking execution
    #[serde(default)]
    pub blocked_by: Vec<String>,
}

impl Readiness {
    fn ready() -> Self {
        Self {
            can_execute: true,
            blocked_by: Vec::new(),
        }
    }

    fn blocked(blocked_by: Vec<String>) -> Self {
        Self {
            can_execute: false,
            blocked_by,
        }
    }
}

/// Severity of a reference validation issue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Error,
    Warning,
}

/// An unresolved reference found by [`validate_references`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReferenceIssue {
    pub severity: Severity,
    pub task_id: String,
    pub field: &'static str,
    pub reference: String,
}

/// Whether a task can run now
///
/// False when the task is missing, already completed, or any dependency is
/// not completed; `blocked_by` lists the incomplete dependency ids.
pub fn can_execute(tasks: &[Task], task_id: &str) -> Readiness {
    let by_id = index_by_id(tasks);
    let Some(task) = by_id.get(task_id) else {
        return Readiness::blocked(Vec::new());
    };
    if task.is_completed() {
        return Readiness::blocked(Vec::new());
    }

    let blocked_by: Vec<String> = task
        .dependencies
        .iter()
        .filter(|dep| !by_id.get(dep.as_str()).is_some_and(|d| d.is_completed()))
        .cloned()
        .collect();

    if blocked_by.is_empty() {
        Readiness::ready()
    } else {
        Readiness::blocked(blocked_by)
    }
}

/// Detect a dependency cycle, returning the witnessed path
///
/// Depth-first traversal over every component with a visited set and an
/// explicit stack, so arbitrarily deep dependency chains cannot overflow
/// the thread stack. On revisiting a node still on the path, returns the
/// path from that node back to itself inclusive. Empty when the relation
/// is a DAG.
pub fn detect_cycle(tasks: &[Task]) -> Vec<String> {
    let by_id = index_by_id(tasks);
    let mut visited: HashSet<&str> = HashSet::new();
    let mut on_stack: HashSet<&str> = HashSet::new();
    let mut path: Vec<&str> = Vec::new();
    // Frames of (node, index of the next dependency to explore).
    let mut frames: Vec<(&str, usize)> = Vec::new();

    for task in tasks {
        if visited.contains(task.id.as_str()) {
            continue;
        }
        let root = task.id.as_str();
        visited.insert(root);
        on_stack.insert(root);
        path.push(root);
        frames.push((root, 0));

        loop {
            let Some(frame) = frames.last_mut() else {
                break;
            };
            let (id, dep_index) = (frame.0, frame.1);
            frame.1 += 1;

            let deps = by_id
                .get(id)
                .map(|t| t.dependencies.as_slice())
                .unwrap_or_default();
            let Some(dep) = deps.get(dep_index) else {
                on_stack.remove(id);
                path.pop();
                frames.pop();
                continue;
            };

            let dep = dep.as_str();
            if on_stack.contains(dep) {
                // Path from the repeated node back to itself, inclusive.
                let start = path.iter().position(|n| *n == dep).unwrap_or(0);
                let mut cycle: Vec<String> =
                    path[start..].iter().map(|s| s.to_string()).collect();
                cycle.push(dep.to_string());
                return cycle;
            }
            if !visited.contains(dep) && by_id.contains_key(dep) {
                visited.insert(dep);
                on_stack.insert(dep);
                path.push(dep);
                frames.push((dep, 0));
            }
        }
    }
    Vec::new()
}

/// Validate that every reference resolves within the given task set
///
/// Unresolved `dependencies` and `blocked_by` are errors; unresolved
/// `blocks` are warnings, since a task may declare it blocks a task that
/// has not been created yet.
pub fn validate_references(tasks: &[Task]) -> Vec<ReferenceIssue> {
    let ids: HashSet<&str> = tasks.iter().map(|t| t.id.as_str()).collect();
    let mut issues = Vec::new();

    for task in tasks {
        for dep in &task.dependencies {
            if !ids.contains(dep.as_str()) {
                issues.push(ReferenceIssue {
                    severity: Severity::Error,
                    task_id: task.id.clone(),
                    field: "dependencies",
                    reference: dep.clone(),
                });
            }
        }
        for blocker in &task.blocked_by {
            if !ids.contains(blocker.as_str()) {
                issues.push(ReferenceIssue {
                    severity: Severity::Error,
                    task_id: task.id.clone(),
                    field: "blocked_by",
                    reference: blocker.clone(),
                });
            }
        }
        for blocked in &task.blocks {
            if !ids.contains(blocked.as_str()) {
                issues.push(ReferenceIssue {
                    severity: Severity::Warning,
                    task_id: task.id.clone(),
                    field: "blocks",
                    reference: blocked.clone(),
                });
            }
        }
    }

    issues
}

/// Tasks with no incomplete dependents, i.e. nothing pending depends on them
///
/// Used by the adjuster's heuristic anchor selection.
pub fn tasks_without_incomplete_dependents<'a>(tasks: &'a [Task]) -> Vec<&'a Task> {
    let mut has_incomplete_dependent: HashSet<&str> = HashSet::new();
    for task in tasks {
        if task.is_completed() {
            continue;
        }
        for dep in &task.dependencies {
            has_incomplete_dependent.insert(dep.as_str());
        }
    }
    tasks
        .iter()
        .filter(|t| !has_incomplete_dependent.contains(t.id.as_str()))
        .collect()
}
