//! Storage layer tests

use serde::{Deserialize, Serialize};
use tempfile::TempDir;

use crate::storage::{DocumentStore, EventLog};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Record {
    id: u32,
    label: String,
}

#[test]
fn test_read_missing_collection_returns_default() {
    let dir = TempDir::new().unwrap();
    let docs = DocumentStore::new(dir.path()).unwrap();

    let records: Vec<Record> = docs.read("nothing").unwrap();
    assert!(records.is_empty());
}

#[test]
fn test_write_then_read() {
    let dir = TempDir::new().unwrap();
    let docs = DocumentStore::new(dir.path()).unwrap();

    let records = vec![
        Record {
            id: 1,
            label: "one".to_string(),
        },
        Record {
            id: 2,
            label: "two".to_string(),
        },
    ];
    docs.write("records", &records).unwrap();

    let read: Vec<Record> = docs.read("records").unwrap();
    assert_eq!(read, records);
}

#[test]
fn test_write_leaves_no_temp_file() {
    let dir = TempDir::new().unwrap();
    let docs = DocumentStore::new(dir.path()).unwrap();

    docs.write("records", &vec![Record {
        id: 1,
        label: "one".to_string(),
    }])
    .unwrap();

    assert!(dir.path().join("records.json").exists());
    assert!(!dir.path().join(".records.json.tmp").exists());
}

#[test]
fn test_read_rejects_corrupt_collection() {
    let dir = TempDir::new().unwrap();
    let docs = DocumentStore::new(dir.path()).unwrap();
    std::fs::write(dir.path().join("records.json"), "not json at all").unwrap();

    let result: crate::Result<Vec<Record>> = docs.read("records");
    assert!(result.is_err());
}

#[test]
fn test_namespace_isolates_collections() {
    let dir = TempDir::new().unwrap();
    let docs = DocumentStore::new(dir.path()).unwrap();
    let inner = docs.namespace("memory").unwrap();

    inner
        .write("records", &vec![Record {
            id: 1,
            label: "nested".to_string(),
        }])
        .unwrap();

    let outer: Vec<Record> = docs.read("records").unwrap();
    assert!(outer.is_empty());
    assert!(dir.path().join("memory/records.json").exists());
}

#[test]
fn test_event_log_preserves_append_order() {
    let dir = TempDir::new().unwrap();
    let logs = EventLog::new(dir.path()).unwrap();

    for id in 0..5 {
        logs.append("run-1", &Record {
            id,
            label: format!("event {id}"),
        })
        .unwrap();
    }

    let events: Vec<Record> = logs.read_all("run-1").unwrap();
    let ids: Vec<u32> = events.iter().map(|e| e.id).collect();
    assert_eq!(ids, vec![0, 1, 2, 3, 4]);
}

#[test]
fn test_event_log_missing_file_is_empty() {
    let dir = TempDir::new().unwrap();
    let logs = EventLog::new(dir.path()).unwrap();
    let events: Vec<Record> = logs.read_all("no-such-run").unwrap();
    assert!(events.is_empty());
}

#[test]
fn test_event_logs_are_separate_per_id() {
    let dir = TempDir::new().unwrap();
    let logs = EventLog::new(dir.path()).unwrap();

    logs.append("run-1", &Record {
        id: 1,
        label: "first run".to_string(),
    })
    .unwrap();
    logs.append("run-2", &Record {
        id: 2,
        label: "second run".to_string(),
    })
    .unwrap();

    let first: Vec<Record> = logs.read_all("run-1").unwrap();
    let second: Vec<Record> = logs.read_all("run-2").unwrap();
    assert_eq!(first.len(), 1);
    assert_eq!(second.len(), 1);
    assert_eq!(first[0].id, 1);
    assert_eq!(second[0].id, 2);
}
