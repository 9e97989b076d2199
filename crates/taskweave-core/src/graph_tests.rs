//! Dependency graph analyzer tests

use crate::graph::{self, Severity};
use crate::tasks::{Task, TaskStatus};

fn task(id: &str, deps: &[&str]) -> Task {
    let mut t = Task::new(id.to_uppercase(), format!("task {id}"));
    t.id = id.to_string();
    t.dependencies = deps.iter().map(|d| d.to_string()).collect();
    t
}

fn completed(mut t: Task) -> Task {
    t.status = TaskStatus::Completed;
    t
}

#[test]
fn test_detect_cycle_empty_for_dag() {
    let tasks = vec![task("a", &[]), task("b", &["a"]), task("c", &["a", "b"])];
    assert!(graph::detect_cycle(&tasks).is_empty());
}

#[test]
fn test_detect_cycle_empty_for_empty_set() {
    assert!(graph::detect_cycle(&[]).is_empty());
}

#[test]
fn test_detect_cycle_finds_triangle() {
    let tasks = vec![task("a", &["c"]), task("b", &["a"]), task("c", &["b"])];
    let cycle = graph::detect_cycle(&tasks);
    assert!(!cycle.is_empty());
    // The witnessed path starts and ends at the same task id.
    assert_eq!(cycle.first(), cycle.last());
    // Every node of the path is part of the triangle.
    for id in &cycle {
        assert!(["a", "b", "c"].contains(&id.as_str()));
    }
}

#[test]
fn test_detect_cycle_self_loop() {
    let tasks = vec![task("a", &["a"])];
    let cycle = graph::detect_cycle(&tasks);
    assert_eq!(cycle, vec!["a".to_string(), "a".to_string()]);
}

#[test]
fn test_detect_cycle_handles_deep_chains() {
    // Linear chain deep enough to overflow a recursive traversal.
    const DEPTH: usize = 50_000;
    let mut tasks: Vec<Task> = Vec::with_capacity(DEPTH);
    tasks.push(task("t0", &[]));
    for i in 1..DEPTH {
        let prev = format!("t{}", i - 1);
        tasks.push(task(&format!("t{i}"), &[prev.as_str()]));
    }
    assert!(graph::detect_cycle(&tasks).is_empty());

    // Close the loop from the head back to the tail.
    tasks[0].dependencies = vec![format!("t{}", DEPTH - 1)];
    let cycle = graph::detect_cycle(&tasks);
    assert!(!cycle.is_empty());
    assert_eq!(cycle.first(), cycle.last());
}

#[test]
fn test_detect_cycle_in_second_component() {
    let tasks = vec![
        task("a", &[]),
        task("b", &["a"]),
        task("x", &["y"]),
        task("y", &["x"]),
    ];
    let cycle = graph::detect_cycle(&tasks);
    assert!(!cycle.is_empty());
    assert_eq!(cycle.first(), cycle.last());
}

#[test]
fn test_can_execute_blocked_by_incomplete_dependency() {
    let tasks = vec![task("a", &[]), task("b", &["a"])];
    let readiness = graph::can_execute(&tasks, "b");
    assert!(!readiness.can_execute);
    assert_eq!(readiness.blocked_by, vec!["a".to_string()]);
}

#[test]
fn test_can_execute_after_dependency_completes() {
    let tasks = vec![completed(task("a", &[])), task("b", &["a"])];
    let readiness = graph::can_execute(&tasks, "b");
    assert!(readiness.can_execute);
    assert!(readiness.blocked_by.is_empty());
}

#[test]
fn test_can_execute_ignores_unrelated_pending_tasks() {
    // C depends only on completed B; pending A is unrelated.
    let tasks = vec![task("a", &[]), completed(task("b", &[])), task("c", &["b"])];
    assert!(graph::can_execute(&tasks, "c").can_execute);
}

#[test]
fn test_can_execute_false_for_missing_task() {
    assert!(!graph::can_execute(&[], "ghost").can_execute);
}

#[test]
fn test_can_execute_false_for_completed_task() {
    let tasks = vec![completed(task("a", &[]))];
    assert!(!graph::can_execute(&tasks, "a").can_execute);
}

#[test]
fn test_validate_references_unresolved_dependency_is_error() {
    let tasks = vec![task("a", &["ghost"])];
    let issues = graph::validate_references(&tasks);
    assert_eq!(issues.len(), 1);
    assert_eq!(issues[0].severity, Severity::Error);
    assert_eq!(issues[0].field, "dependencies");
    assert_eq!(issues[0].reference, "ghost");
}

#[test]
fn test_validate_references_unresolved_blocks_is_warning() {
    let mut a = task("a", &[]);
    a.blocks = vec!["future-task".to_string()];
    let issues = graph::validate_references(&[a]);
    assert_eq!(issues.len(), 1);
    assert_eq!(issues[0].severity, Severity::Warning);
    assert_eq!(issues[0].field, "blocks");
}

#[test]
fn test_validate_references_clean_set() {
    let tasks = vec![task("a", &[]), task("b", &["a"])];
    assert!(graph::validate_references(&tasks).is_empty());
}

#[test]
fn test_tasks_without_incomplete_dependents() {
    // B depends on A, so A has an incomplete dependent; B and lone C do not.
    let tasks = vec![task("a", &[]), task("b", &["a"]), task("c", &[])];
    let free: Vec<&str> = graph::tasks_without_incomplete_dependents(&tasks)
        .iter()
        .map(|t| t.id.as_str())
        .collect();
    assert_eq!(free, vec!["b", "c"]);
}
