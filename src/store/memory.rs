//! In-process store and sink.
//!
//! Clones share the same contents, so a test can hand one clone to the
//! monitor and inspect another.

use crate::store::{EventRecord, EventSink, ModelStore, StoreError};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

/// Model store backed by a shared map.
#[derive(Debug, Clone, Default)]
pub struct MemoryModelStore {
    objects: Arc<Mutex<HashMap<String, Vec<u8>>>>,
    uploads: Arc<Mutex<usize>>,
}

impl MemoryModelStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the store with an artifact, as if uploaded by another device.
    pub fn insert(&self, key: impl Into<String>, bytes: Vec<u8>) {
        lock(&self.objects).insert(key.into(), bytes);
    }

    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        lock(&self.objects).get(key).cloned()
    }

    /// Number of successful uploads so far.
    pub fn upload_count(&self) -> usize {
        *lock(&self.uploads)
    }
}

impl ModelStore for MemoryModelStore {
    fn exists(&self, key: &str) -> Result<bool, StoreError> {
        Ok(lock(&self.objects).contains_key(key))
    }

    fn download(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        self.get(key)
            .ok_or_else(|| StoreError::NotFound(key.to_string()))
    }

    fn upload(&self, key: &str, bytes: &[u8]) -> Result<(), StoreError> {
        lock(&self.objects).insert(key.to_string(), bytes.to_vec());
        *lock(&self.uploads) += 1;
        Ok(())
    }
}

/// Event sink collecting records in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryEventSink {
    records: Arc<Mutex<Vec<EventRecord>>>,
}

impl MemoryEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<EventRecord> {
        lock(&self.records).clone()
    }

    pub fn len(&self) -> usize {
        lock(&self.records).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl EventSink for MemoryEventSink {
    fn append(&mut self, record: &EventRecord) -> Result<(), StoreError> {
        lock(&self.records).push(record.clone());
        Ok(())
    }
}

// A poisoned lock only means another holder panicked mid-update; the data is
// still a valid map/vec.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::PredictionSource;
    use chrono::Utc;

    #[test]
    fn test_model_store_round_trip() {
        let store = MemoryModelStore::new();
        assert!(!store.exists("heart_model").unwrap());
        assert!(matches!(
            store.download("heart_model"),
            Err(StoreError::NotFound(_))
        ));

        store.upload("heart_model", b"v1").unwrap();
        store.upload("heart_model", b"v2").unwrap();

        assert!(store.exists("heart_model").unwrap());
        assert_eq!(store.download("heart_model").unwrap(), b"v2");
        assert_eq!(store.upload_count(), 2);
    }

    #[test]
    fn test_clones_share_contents() {
        let store = MemoryModelStore::new();
        store.clone().upload("k", b"x").unwrap();
        assert_eq!(store.get("k"), Some(b"x".to_vec()));

        let sink = MemoryEventSink::new();
        let mut writer = sink.clone();
        writer
            .append(&EventRecord::new(
                "dev",
                Utc::now(),
                80,
                false,
                false,
                PredictionSource::Fallback,
            ))
            .unwrap();
        assert_eq!(sink.len(), 1);
    }
}
