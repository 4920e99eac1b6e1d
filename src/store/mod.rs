//! Remote collaborators: the model artifact store and the event sink.
//!
//! Both are traits so the monitor can run against local directories, an HTTP
//! backend, or in-memory fakes without knowing which.

pub mod fs;
pub mod memory;
pub mod types;

#[cfg(feature = "remote")]
pub mod remote;

pub use fs::{FsModelStore, JsonlEventSink};
pub use memory::{MemoryEventSink, MemoryModelStore};
pub use types::{default_device_id, EventRecord, PredictionSource};

#[cfg(feature = "remote")]
pub use remote::{HttpEventSink, HttpModelStore, RemoteConfig};

/// Errors from a store or sink round trip.
#[derive(Debug)]
pub enum StoreError {
    /// No artifact under the requested key
    NotFound(String),
    /// Local filesystem error
    Io(String),
    /// Network/HTTP error
    Network(String),
    /// Server returned an error response
    Server { status: u16, message: String },
    /// JSON serialization error
    Serialization(String),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::NotFound(key) => write!(f, "No artifact stored under '{key}'"),
            StoreError::Io(msg) => write!(f, "Store IO error: {msg}"),
            StoreError::Network(msg) => write!(f, "Store network error: {msg}"),
            StoreError::Server { status, message } => {
                write!(f, "Store server error ({status}): {message}")
            }
            StoreError::Serialization(msg) => write!(f, "Store serialization error: {msg}"),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<std::io::Error> for StoreError {
    fn from(e: std::io::Error) -> Self {
        StoreError::Io(e.to_string())
    }
}

/// Key-value store for serialized model artifacts.
pub trait ModelStore {
    fn exists(&self, key: &str) -> Result<bool, StoreError>;

    fn download(&self, key: &str) -> Result<Vec<u8>, StoreError>;

    /// Store `bytes` under `key`, replacing whatever was there.
    fn upload(&self, key: &str, bytes: &[u8]) -> Result<(), StoreError>;
}

/// Append-only sink receiving one record per processed reading.
pub trait EventSink {
    fn append(&mut self, record: &EventRecord) -> Result<(), StoreError>;
}

impl<S: ModelStore + ?Sized> ModelStore for Box<S> {
    fn exists(&self, key: &str) -> Result<bool, StoreError> {
        (**self).exists(key)
    }

    fn download(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        (**self).download(key)
    }

    fn upload(&self, key: &str, bytes: &[u8]) -> Result<(), StoreError> {
        (**self).upload(key, bytes)
    }
}

impl<S: EventSink + ?Sized> EventSink for Box<S> {
    fn append(&mut self, record: &EventRecord) -> Result<(), StoreError> {
        (**self).append(record)
    }
}

/// Boxed store and sink pair.
pub type Backends = (Box<dyn ModelStore>, Box<dyn EventSink>);

/// Open the model store and event sink selected by the configuration.
pub fn open_backends(config: &crate::config::Config) -> Result<Backends, StoreError> {
    use crate::config::StorageBackend;

    let storage = &config.storage;
    let (models, events): Backends = match storage.backend {
        StorageBackend::Local => {
            let root = config.data_path.join("store");
            (
                Box::new(FsModelStore::new(&root, &storage.bucket)),
                Box::new(JsonlEventSink::new(&root, &storage.event_collection)),
            )
        }
        StorageBackend::Memory => (
            Box::new(MemoryModelStore::new()),
            Box::new(MemoryEventSink::new()),
        ),
        #[cfg(feature = "remote")]
        StorageBackend::Remote => {
            let url = storage
                .remote_url
                .as_deref()
                .ok_or_else(|| StoreError::Network("No remote URL configured".to_string()))?;
            let mut remote = RemoteConfig::new(url);
            if let Some(ref token) = storage.remote_token {
                remote = remote.with_token(token.clone());
            }
            (
                Box::new(HttpModelStore::new(remote.clone(), storage.bucket.clone())?),
                Box::new(HttpEventSink::new(remote, storage.event_collection.clone())?),
            )
        }
        #[cfg(not(feature = "remote"))]
        StorageBackend::Remote => {
            return Err(StoreError::Network(
                "Remote storage requires the `remote` feature".to_string(),
            ))
        }
    };
    Ok((models, events))
}
