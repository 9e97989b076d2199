//! Task store tests

use tempfile::TempDir;

use crate::error::Error;
use crate::storage::DocumentStore;
use crate::tasks::{BatchItem, BatchMode, CreateTask, Task, TaskPatch, TaskStatus, TaskStore};

fn store(dir: &TempDir) -> TaskStore {
    let docs = DocumentStore::new(dir.path()).unwrap();
    TaskStore::open(docs).unwrap()
}

fn create(name: &str) -> CreateTask {
    CreateTask {
        name: name.to_string(),
        description: format!("description of {name}"),
        ..Default::default()
    }
}

fn item(name: &str, deps: &[&str]) -> BatchItem {
    BatchItem {
        name: name.to_string(),
        description: format!("description of {name}"),
        dependencies: deps.iter().map(|d| d.to_string()).collect(),
        ..Default::default()
    }
}

async fn complete(store: &TaskStore, id: &str) -> Task {
    store
        .update(
            id,
            TaskPatch {
                status: Some(TaskStatus::Completed),
                ..Default::default()
            },
        )
        .await
        .unwrap()
}

#[tokio::test]
async fn test_create_and_get() {
    let dir = TempDir::new().unwrap();
    let store = store(&dir);

    let task = store.create(create("Build parser")).await.unwrap();
    assert_eq!(task.status, TaskStatus::Pending);
    assert!(task.completed_at.is_none());

    let fetched = store.get(&task.id).await.unwrap();
    assert_eq!(fetched.name, "Build parser");
}

#[tokio::test]
async fn test_create_rejects_empty_name() {
    let dir = TempDir::new().unwrap();
    let store = store(&dir);

    let result = store.create(create("   ")).await;
    assert!(matches!(result, Err(Error::Validation(_))));
}

#[tokio::test]
async fn test_create_rejects_unknown_dependency() {
    let dir = TempDir::new().unwrap();
    let store = store(&dir);

    let mut request = create("Dependent");
    request.dependencies = vec!["no-such-id".to_string()];
    let result = store.create(request).await;
    assert!(matches!(result, Err(Error::TaskNotFound(id)) if id == "no-such-id"));
}

#[tokio::test]
async fn test_create_rejects_out_of_range_priority() {
    let dir = TempDir::new().unwrap();
    let store = store(&dir);

    let mut request = create("Urgent");
    request.priority = Some(11);
    assert!(matches!(
        store.create(request).await,
        Err(Error::Validation(_))
    ));
}

#[tokio::test]
async fn test_update_sets_completed_at() {
    let dir = TempDir::new().unwrap();
    let store = store(&dir);

    let task = store.create(create("Finish me")).await.unwrap();
    let done = complete(&store, &task.id).await;
    assert_eq!(done.status, TaskStatus::Completed);
    assert!(done.completed_at.is_some());
}

#[tokio::test]
async fn test_completed_task_is_immutable_except_summary() {
    let dir = TempDir::new().unwrap();
    let store = store(&dir);

    let task = store.create(create("Frozen")).await.unwrap();
    complete(&store, &task.id).await;

    let result = store
        .update(
            &task.id,
            TaskPatch {
                name: Some("Renamed".to_string()),
                ..Default::default()
            },
        )
        .await;
    assert!(matches!(result, Err(Error::TaskCompleted(_))));

    let updated = store
        .update(
            &task.id,
            TaskPatch {
                summary: Some("all done".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.summary.as_deref(), Some("all done"));
}

#[tokio::test]
async fn test_update_rejects_unknown_dependency_reference() {
    let dir = TempDir::new().unwrap();
    let store = store(&dir);

    let task = store.create(create("Lonely")).await.unwrap();
    let result = store
        .update(
            &task.id,
            TaskPatch {
                dependencies: Some(vec!["ghost".to_string()]),
                ..Default::default()
            },
        )
        .await;
    assert!(matches!(
        result,
        Err(Error::MissingReference { reference, .. }) if reference == "ghost"
    ));
}

#[tokio::test]
async fn test_update_rejects_dependency_cycle() {
    let dir = TempDir::new().unwrap();
    let store = store(&dir);

    let a = store.create(create("A")).await.unwrap();
    let mut b_req = create("B");
    b_req.dependencies = vec![a.id.clone()];
    let b = store.create(b_req).await.unwrap();

    // A -> B would close the loop B -> A.
    let result = store
        .update(
            &a.id,
            TaskPatch {
                dependencies: Some(vec![b.id.clone()]),
                ..Default::default()
            },
        )
        .await;
    assert!(matches!(result, Err(Error::CycleDetected { .. })));

    // The failed update left A untouched.
    assert!(store.get(&a.id).await.unwrap().dependencies.is_empty());
}

#[tokio::test]
async fn test_delete_strips_references_from_other_tasks() {
    let dir = TempDir::new().unwrap();
    let store = store(&dir);

    let a = store.create(create("A")).await.unwrap();
    let mut b_req = create("B");
    b_req.dependencies = vec![a.id.clone()];
    let b = store.create(b_req).await.unwrap();

    store.delete(&a.id).await.unwrap();
    assert!(store.get(&b.id).await.unwrap().dependencies.is_empty());
}

#[tokio::test]
async fn test_delete_completed_task_always_fails() {
    let dir = TempDir::new().unwrap();
    let store = store(&dir);

    let task = store.create(create("Done")).await.unwrap();
    complete(&store, &task.id).await;

    let result = store.delete(&task.id).await;
    assert!(matches!(result, Err(Error::TaskCompleted(_))));

    // The store is unchanged.
    assert_eq!(store.list(None).await.len(), 1);
    assert!(store.get(&task.id).await.is_ok());
}

#[tokio::test]
async fn test_delete_missing_task() {
    let dir = TempDir::new().unwrap();
    let store = store(&dir);
    assert!(matches!(
        store.delete("ghost").await,
        Err(Error::TaskNotFound(_))
    ));
}

#[tokio::test]
async fn test_search_exact_id_wins_over_keyword() {
    let dir = TempDir::new().unwrap();
    let store = store(&dir);

    let a = store.create(create("alpha")).await.unwrap();
    store.create(create("alphabet")).await.unwrap();

    let by_id = store.search(&a.id).await;
    assert_eq!(by_id.len(), 1);
    assert_eq!(by_id[0].id, a.id);

    let by_keyword = store.search("ALPHA").await;
    assert_eq!(by_keyword.len(), 2);
}

#[tokio::test]
async fn test_list_filters_by_status() {
    let dir = TempDir::new().unwrap();
    let store = store(&dir);

    let a = store.create(create("A")).await.unwrap();
    store.create(create("B")).await.unwrap();
    complete(&store, &a.id).await;

    assert_eq!(store.list(Some(TaskStatus::Completed)).await.len(), 1);
    assert_eq!(store.list(Some(TaskStatus::Pending)).await.len(), 1);
    assert_eq!(store.list(None).await.len(), 2);
}

#[tokio::test]
async fn test_batch_append_resolves_name_references() {
    let dir = TempDir::new().unwrap();
    let store = store(&dir);

    let created = store
        .batch(
            vec![item("first", &[]), item("second", &["first"])],
            BatchMode::Append,
        )
        .await
        .unwrap();
    assert_eq!(created.len(), 2);
    assert_eq!(created[1].dependencies, vec![created[0].id.clone()]);
}

#[tokio::test]
async fn test_batch_rejects_unresolved_reference() {
    let dir = TempDir::new().unwrap();
    let store = store(&dir);

    let result = store
        .batch(vec![item("solo", &["missing"])], BatchMode::Append)
        .await;
    assert!(matches!(result, Err(Error::Validation(_))));
}

#[tokio::test]
async fn test_batch_overwrite_keeps_only_completed_tasks() {
    let dir = TempDir::new().unwrap();
    let store = store(&dir);

    let keep = store.create(create("keep")).await.unwrap();
    complete(&store, &keep.id).await;
    store.create(create("drop")).await.unwrap();

    store
        .batch(vec![item("fresh", &[])], BatchMode::Overwrite)
        .await
        .unwrap();

    let all = store.list(None).await;
    let names: Vec<&str> = all.iter().map(|t| t.name.as_str()).collect();
    assert!(names.contains(&"keep"));
    assert!(names.contains(&"fresh"));
    assert!(!names.contains(&"drop"));
}

#[tokio::test]
async fn test_batch_selective_reuses_existing_task() {
    let dir = TempDir::new().unwrap();
    let store = store(&dir);

    let existing = store.create(create("refactor")).await.unwrap();

    let updated = store
        .batch(
            vec![BatchItem {
                name: "refactor".to_string(),
                description: "new description, same task".to_string(),
                ..Default::default()
            }],
            BatchMode::Selective,
        )
        .await
        .unwrap();

    assert_eq!(updated[0].id, existing.id);
    assert_eq!(updated[0].created_at, existing.created_at);
    assert_eq!(updated[0].description, "new description, same task");
    assert_eq!(store.list(None).await.len(), 1);
}

#[tokio::test]
async fn test_batch_selective_never_touches_completed_tasks() {
    let dir = TempDir::new().unwrap();
    let store = store(&dir);

    let done = store.create(create("release")).await.unwrap();
    complete(&store, &done.id).await;

    let created = store
        .batch(vec![item("release", &[])], BatchMode::Selective)
        .await
        .unwrap();

    // A new task was appended instead of mutating the completed one.
    assert_ne!(created[0].id, done.id);
    assert_eq!(store.list(None).await.len(), 2);
    assert_eq!(
        store.get(&done.id).await.unwrap().status,
        TaskStatus::Completed
    );
}

#[tokio::test]
async fn test_batch_rejects_cycles() {
    let dir = TempDir::new().unwrap();
    let store = store(&dir);

    let result = store
        .batch(
            vec![item("a", &["b"]), item("b", &["a"])],
            BatchMode::Append,
        )
        .await;
    assert!(matches!(result, Err(Error::CycleDetected { .. })));
    assert!(store.list(None).await.is_empty());
}

#[tokio::test]
async fn test_batch_links_parent_and_child_steps() {
    let dir = TempDir::new().unwrap();
    let store = store(&dir);

    let mut child = item("child", &[]);
    child.parent_step_id = Some("parent".to_string());
    let created = store
        .batch(vec![item("parent", &[]), child], BatchMode::Append)
        .await
        .unwrap();

    let parent = &created[0];
    let child = &created[1];
    assert_eq!(child.parent_step_id.as_deref(), Some(parent.id.as_str()));
    assert_eq!(parent.child_step_ids, vec![child.id.clone()]);
}

#[tokio::test]
async fn test_collection_survives_reopen() {
    let dir = TempDir::new().unwrap();

    let first = store(&dir);
    let task = first.create(create("persisted")).await.unwrap();
    drop(first);

    let second = store(&dir);
    let fetched = second.get(&task.id).await.unwrap();
    assert_eq!(fetched.name, "persisted");
}
