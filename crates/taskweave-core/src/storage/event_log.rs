//! Append-only JSONL event logs
//!
//! One log file per chain run, used for audit and for resuming an
//! interrupted run. Each line is one serialized event.

use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::{Error, Result};

/// Append-only JSONL writer/reader rooted at a log directory
#[derive(Debug, Clone)]
pub struct EventLog {
    root: PathBuf,
}

impl EventLog {
    /// Create a log store rooted at `root`, creating the directory if needed
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)
            .map_err(|e| Error::Storage(format!("create {}: {}", root.display(), e)))?;
        Ok(Self { root })
    }

    fn log_path(&self, log_id: &str) -> PathBuf {
        self.root.join(format!("{log_id}.jsonl"))
    }

    /// Append one event to the named log
    pub fn append<T: Serialize>(&self, log_id: &str, event: &T) -> Result<()> {
        let path = self.log_path(log_id);
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| Error::Storage(format!("open {}: {}", path.display(), e)))?;

        let line = serde_json::to_string(event)
            .map_err(|e| Error::Storage(format!("serialize event: {e}")))?;
        writeln!(file, "{line}")
            .map_err(|e| Error::Storage(format!("append {}: {}", path.display(), e)))?;

        Ok(())
    }

    /// Read all events of the named log in append order
    pub fn read_all<T: DeserializeOwned>(&self, log_id: &str) -> Result<Vec<T>> {
        let path = self.log_path(log_id);
        if !path.exists() {
            return Ok(Vec::new());
        }

        let file = fs::File::open(&path)
            .map_err(|e| Error::Storage(format!("open {}: {}", path.display(), e)))?;
        let reader = BufReader::new(file);

        let mut events = Vec::new();
        for (idx, line) in reader.lines().enumerate() {
            let line =
                line.map_err(|e| Error::Storage(format!("read {}: {}", path.display(), e)))?;
            if line.trim().is_empty() {
                continue;
            }
            let event = serde_json::from_str(&line).map_err(|e| {
                Error::Storage(format!("parse {} line {}: {}", path.display(), idx + 1, e))
            })?;
            events.push(event);
        }

        debug!(log_id, count = events.len(), "event log read");
        Ok(events)
    }
}
