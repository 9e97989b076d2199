//! Execution memory and knowledge base tests

use tempfile::TempDir;

use crate::error::Error;
use crate::memory::{
    Decision, Discovery, ExecutionStatus, KnowledgeEntry, KnowledgeQuery, MemoryStore, Step,
};
use crate::storage::DocumentStore;

fn store(dir: &TempDir) -> MemoryStore {
    let docs = DocumentStore::new(dir.path()).unwrap();
    MemoryStore::open(docs).unwrap()
}

#[tokio::test]
async fn test_execution_lifecycle() {
    let dir = TempDir::new().unwrap();
    let store = store(&dir);

    let context = store.begin_execution("task-1").await.unwrap();
    assert_eq!(context.status, ExecutionStatus::Running);

    store
        .record_step(
            &context.execution_id,
            Step::new("read_file", "read the config").with_duration_ms(12),
        )
        .await
        .unwrap();
    store
        .record_decision(
            &context.execution_id,
            Decision::new(
                vec!["toml".to_string(), "json".to_string()],
                "toml",
                "existing config is toml",
            ),
        )
        .await
        .unwrap();
    store
        .record_discovery(
            &context.execution_id,
            Discovery::new("gotcha", "env override", "env vars take precedence"),
        )
        .await
        .unwrap();

    let finished = store
        .finish_execution(&context.execution_id, ExecutionStatus::Completed)
        .await
        .unwrap();
    assert_eq!(finished.steps.len(), 1);
    assert_eq!(finished.decisions.len(), 1);
    assert_eq!(finished.discoveries.len(), 1);
    assert!(finished.finished_at.is_some());
}

#[tokio::test]
async fn test_finished_execution_rejects_appends() {
    let dir = TempDir::new().unwrap();
    let store = store(&dir);

    let context = store.begin_execution("task-1").await.unwrap();
    store
        .finish_execution(&context.execution_id, ExecutionStatus::Failed)
        .await
        .unwrap();

    let result = store
        .record_step(&context.execution_id, Step::new("late", "too late"))
        .await;
    assert!(matches!(result, Err(Error::ExecutionFinished(_))));
}

#[tokio::test]
async fn test_finish_execution_is_exactly_once() {
    let dir = TempDir::new().unwrap();
    let store = store(&dir);

    let context = store.begin_execution("task-1").await.unwrap();
    store
        .finish_execution(&context.execution_id, ExecutionStatus::Completed)
        .await
        .unwrap();

    let again = store
        .finish_execution(&context.execution_id, ExecutionStatus::Failed)
        .await;
    assert!(matches!(again, Err(Error::ExecutionFinished(_))));
}

#[tokio::test]
async fn test_finish_execution_requires_terminal_status() {
    let dir = TempDir::new().unwrap();
    let store = store(&dir);

    let context = store.begin_execution("task-1").await.unwrap();
    let result = store
        .finish_execution(&context.execution_id, ExecutionStatus::Running)
        .await;
    assert!(matches!(result, Err(Error::Validation(_))));
}

#[tokio::test]
async fn test_executions_for_task() {
    let dir = TempDir::new().unwrap();
    let store = store(&dir);

    store.begin_execution("task-1").await.unwrap();
    store.begin_execution("task-1").await.unwrap();
    store.begin_execution("task-2").await.unwrap();

    assert_eq!(store.executions_for_task("task-1").await.len(), 2);
    assert_eq!(store.executions_for_task("task-2").await.len(), 1);
    assert!(store.executions_for_task("task-3").await.is_empty());
}

#[tokio::test]
async fn test_record_knowledge_validates_confidence() {
    let dir = TempDir::new().unwrap();
    let store = store(&dir);

    let mut entry = KnowledgeEntry::new("pattern", "over-confident", "should be rejected");
    entry.confidence = 1.5;
    assert!(matches!(
        store.record_knowledge(entry).await,
        Err(Error::Validation(_))
    ));
}

#[tokio::test]
async fn test_record_knowledge_rejects_unknown_supersedes() {
    let dir = TempDir::new().unwrap();
    let store = store(&dir);

    let mut entry = KnowledgeEntry::new("solution", "orphan", "supersedes nothing real");
    entry.supersedes = Some("no-such-entry".to_string());
    assert!(matches!(
        store.record_knowledge(entry).await,
        Err(Error::KnowledgeNotFound(_))
    ));
}

#[tokio::test]
async fn test_query_orders_by_confidence_descending() {
    let dir = TempDir::new().unwrap();
    let store = store(&dir);

    store
        .record_knowledge(
            KnowledgeEntry::new("pattern", "low", "low confidence").with_confidence(0.3),
        )
        .await
        .unwrap();
    store
        .record_knowledge(
            KnowledgeEntry::new("pattern", "high", "high confidence").with_confidence(0.9),
        )
        .await
        .unwrap();
    store
        .record_knowledge(
            KnowledgeEntry::new("pattern", "mid", "mid confidence").with_confidence(0.6),
        )
        .await
        .unwrap();

    let results = store.query_knowledge(&KnowledgeQuery::default()).await;
    let titles: Vec<&str> = results.iter().map(|e| e.title.as_str()).collect();
    assert_eq!(titles, vec!["high", "mid", "low"]);
}

#[tokio::test]
async fn test_query_precision_for_domain_and_technologies() {
    let dir = TempDir::new().unwrap();
    let store = store(&dir);

    store
        .record_knowledge(
            KnowledgeEntry::new("solution", "react-state", "lift state up")
                .with_domain("frontend")
                .with_technologies(vec!["React".to_string()]),
        )
        .await
        .unwrap();
    store
        .record_knowledge(
            KnowledgeEntry::new("solution", "vue-state", "use a store")
                .with_domain("frontend")
                .with_technologies(vec!["Vue".to_string()]),
        )
        .await
        .unwrap();
    store
        .record_knowledge(
            KnowledgeEntry::new("solution", "sql-index", "add an index")
                .with_domain("backend")
                .with_technologies(vec!["React".to_string()]),
        )
        .await
        .unwrap();
    let mut excluded =
        KnowledgeEntry::new("pitfall", "not-for-frontend", "server-only technique")
            .with_technologies(vec!["React".to_string()]);
    excluded.applicability.exclusions = vec!["frontend".to_string()];
    store.record_knowledge(excluded).await.unwrap();

    let results = store
        .query_knowledge(&KnowledgeQuery {
            domain: Some("frontend".to_string()),
            technologies: vec!["react".to_string()],
            ..Default::default()
        })
        .await;

    let titles: Vec<&str> = results.iter().map(|e| e.title.as_str()).collect();
    assert_eq!(titles, vec!["react-state"]);
}

#[tokio::test]
async fn test_query_skips_superseded_entries() {
    let dir = TempDir::new().unwrap();
    let store = store(&dir);

    let old_id = store
        .record_knowledge(
            KnowledgeEntry::new("solution", "v1", "old advice").with_confidence(0.9),
        )
        .await
        .unwrap();
    let mut newer = KnowledgeEntry::new("solution", "v2", "better advice").with_confidence(0.7);
    newer.supersedes = Some(old_id.clone());
    store.record_knowledge(newer).await.unwrap();

    let results = store.query_knowledge(&KnowledgeQuery::default()).await;
    let titles: Vec<&str> = results.iter().map(|e| e.title.as_str()).collect();
    assert_eq!(titles, vec!["v2"]);

    // The superseded entry is still retrievable by id.
    assert!(store.get_knowledge(&old_id).await.is_ok());
}

#[tokio::test]
async fn test_memory_survives_reopen() {
    let dir = TempDir::new().unwrap();

    let first = store(&dir);
    let context = first.begin_execution("task-1").await.unwrap();
    first
        .record_knowledge(KnowledgeEntry::new("pattern", "kept", "persisted entry"))
        .await
        .unwrap();
    drop(first);

    let second = store(&dir);
    assert!(second.get_execution(&context.execution_id).await.is_ok());
    assert_eq!(
        second.query_knowledge(&KnowledgeQuery::default()).await.len(),
        1
    );
}
