//! Storage layer - whole-document JSON collections + JSONL event logs
//!
//! Provides the durable storage the core requires:
//!
//! - `document`: one JSON document per collection, rewritten atomically
//!   (write-temp-then-rename) so concurrent readers never observe a
//!   partial write
//! - `event_log`: append-only JSONL logs, one file per chain run
//!
//! # Usage
//!
//! ```ignore
//! use taskweave_core::storage::DocumentStore;
//!
//! let store = DocumentStore::new(data_dir)?;
//! let tasks: Vec<Task> = store.read("tasks")?;
//! store.write("tasks", &tasks)?;
//! ```

pub mod document;
pub mod event_log;

pub use document::DocumentStore;
pub use event_log::EventLog;
