//! Filesystem-backed store and sink.
//!
//! Artifacts live one file per key under a bucket directory; events are
//! appended as JSON lines to one file per collection.

use crate::store::{EventRecord, EventSink, ModelStore, StoreError};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Model store keeping each artifact in `<root>/<bucket>/<key>`.
#[derive(Debug, Clone)]
pub struct FsModelStore {
    dir: PathBuf,
}

impl FsModelStore {
    pub fn new(root: impl AsRef<Path>, bucket: &str) -> Self {
        Self {
            dir: root.as_ref().join(bucket),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, StoreError> {
        if key.is_empty() || key.contains(['/', '\\']) || key == "." || key == ".." {
            return Err(StoreError::Io(format!("Invalid artifact key '{key}'")));
        }
        Ok(self.dir.join(key))
    }
}

impl ModelStore for FsModelStore {
    fn exists(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self.path_for(key)?.is_file())
    }

    fn download(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        let path = self.path_for(key)?;
        std::fs::read(&path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => StoreError::NotFound(key.to_string()),
            _ => StoreError::Io(format!("Failed to read {path:?}: {e}")),
        })
    }

    fn upload(&self, key: &str, bytes: &[u8]) -> Result<(), StoreError> {
        let path = self.path_for(key)?;
        std::fs::create_dir_all(&self.dir)?;

        // Write then rename so a reader never sees a half-written artifact.
        let tmp = self.dir.join(format!(".{key}.tmp"));
        std::fs::write(&tmp, bytes)?;
        std::fs::rename(&tmp, &path)?;
        Ok(())
    }
}

/// Event sink appending JSON lines to `<root>/<collection>.jsonl`.
#[derive(Debug, Clone)]
pub struct JsonlEventSink {
    path: PathBuf,
}

impl JsonlEventSink {
    pub fn new(root: impl AsRef<Path>, collection: &str) -> Self {
        Self {
            path: root.as_ref().join(format!("{collection}.jsonl")),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read back every record in the collection.
    pub fn read_all(&self) -> Result<Vec<EventRecord>, StoreError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        std::fs::read_to_string(&self.path)?
            .lines()
            .filter(|l| !l.trim().is_empty())
            .map(|l| {
                serde_json::from_str(l).map_err(|e| StoreError::Serialization(e.to_string()))
            })
            .collect()
    }
}

impl EventSink for JsonlEventSink {
    fn append(&mut self, record: &EventRecord) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut line =
            serde_json::to_string(record).map_err(|e| StoreError::Serialization(e.to_string()))?;
        line.push('\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(line.as_bytes())?;
        Ok(())
    }
}
