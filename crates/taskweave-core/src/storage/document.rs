//! Whole-document JSON collection storage
//!
//! Each collection lives in a single `<name>.json` file under the data
//! directory. Writes go to a temp file in the same directory and are
//! renamed over the target, so a reader sees either the old document or
//! the new one, never a torn write.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// File-backed store for JSON-serializable collections
#[derive(Debug, Clone)]
pub struct DocumentStore {
    root: PathBuf,
}

impl DocumentStore {
    /// Create a store rooted at `root`, creating the directory if needed
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)
            .map_err(|e| Error::Storage(format!("create {}: {}", root.display(), e)))?;
        Ok(Self { root })
    }

    /// Create a namespaced sub-store (e.g. `memory/`)
    pub fn namespace(&self, name: &str) -> Result<Self> {
        Self::new(self.root.join(name))
    }

    /// Root directory of this store
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn collection_path(&self, collection: &str) -> PathBuf {
        self.root.join(format!("{collection}.json"))
    }

    /// Read a full collection, returning `T::default()` when the file does
    /// not exist yet
    pub fn read<T>(&self, collection: &str) -> Result<T>
    where
        T: DeserializeOwned + Default,
    {
        let path = self.collection_path(collection);
        if !path.exists() {
            debug!(collection, "collection file missing, returning default");
            return Ok(T::default());
        }

        let contents = fs::read_to_string(&path)
            .map_err(|e| Error::Storage(format!("read {}: {}", path.display(), e)))?;
        serde_json::from_str(&contents)
            .map_err(|e| Error::Storage(format!("parse {}: {}", path.display(), e)))
    }

    /// Atomically replace a full collection
    pub fn write<T>(&self, collection: &str, value: &T) -> Result<()>
    where
        T: Serialize,
    {
        let path = self.collection_path(collection);
        let tmp = self.root.join(format!(".{collection}.json.tmp"));

        let contents = serde_json::to_string_pretty(value)
            .map_err(|e| Error::Storage(format!("serialize {collection}: {e}")))?;

        fs::write(&tmp, contents)
            .map_err(|e| Error::Storage(format!("write {}: {}", tmp.display(), e)))?;

        // Rename is atomic on the same filesystem; the temp file lives next
        // to the target so this holds.
        if let Err(e) = fs::rename(&tmp, &path) {
            warn!(collection, error = %e, "atomic rename failed, removing temp file");
            let _ = fs::remove_file(&tmp);
            return Err(Error::Storage(format!(
                "rename {} -> {}: {}",
                tmp.display(),
                path.display(),
                e
            )));
        }

        debug!(collection, path = %path.display(), "collection persisted");
        Ok(())
    }
}
