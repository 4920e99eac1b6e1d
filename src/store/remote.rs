//! HTTP-backed model store and event sink.
//!
//! Talks to an object/document service with a small REST surface:
//!
//! ```text
//! HEAD/GET/PUT  {base}/buckets/{bucket}/objects/{key}
//! POST          {base}/collections/{collection}/records
//! ```
//!
//! The monitor loop is synchronous, so the async `reqwest` client is driven
//! by a private current-thread tokio runtime.

use crate::store::{EventRecord, EventSink, ModelStore, StoreError};
use reqwest::StatusCode;
use std::sync::Arc;
use std::time::Duration;

/// Connection settings for the remote service.
#[derive(Debug, Clone)]
pub struct RemoteConfig {
    /// Base URL, e.g. `https://store.example.net`
    pub base_url: String,
    /// Optional bearer token
    pub token: Option<String>,
    /// Per-request timeout
    pub timeout: Duration,
}

impl RemoteConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: None,
            timeout: Duration::from_secs(10),
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn object_url(&self, bucket: &str, key: &str) -> String {
        format!("{}/buckets/{bucket}/objects/{key}", self.base_url)
    }

    pub fn records_url(&self, collection: &str) -> String {
        format!("{}/collections/{collection}/records", self.base_url)
    }
}

/// Async client plus the runtime that drives it.
struct BlockingHttp {
    config: RemoteConfig,
    client: reqwest::Client,
    runtime: tokio::runtime::Runtime,
}

impl BlockingHttp {
    fn new(config: RemoteConfig) -> Result<Self, StoreError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| StoreError::Network(format!("Failed to create runtime: {e}")))?;

        let client = {
            let _guard = runtime.enter();
            reqwest::Client::builder()
                .timeout(config.timeout)
                .build()
                .map_err(|e| StoreError::Network(format!("Failed to create HTTP client: {e}")))?
        };

        Ok(Self {
            config,
            client,
            runtime,
        })
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.config.token {
            Some(ref token) => request.bearer_auth(token),
            None => request,
        }
    }

    fn send(&self, request: reqwest::RequestBuilder) -> Result<reqwest::Response, StoreError> {
        self.runtime
            .block_on(async { self.authorize(request).send().await })
            .map_err(|e| StoreError::Network(e.to_string()))
    }

    /// Turn a non-success response into a `StoreError::Server`.
    fn check(&self, response: reqwest::Response) -> Result<reqwest::Response, StoreError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let message = self
            .runtime
            .block_on(async { response.text().await })
            .unwrap_or_else(|_| "Unknown error".to_string());
        Err(StoreError::Server {
            status: status.as_u16(),
            message,
        })
    }
}

/// Model store on the remote object service.
#[derive(Clone)]
pub struct HttpModelStore {
    http: Arc<BlockingHttp>,
    bucket: String,
}

impl HttpModelStore {
    pub fn new(config: RemoteConfig, bucket: impl Into<String>) -> Result<Self, StoreError> {
        Ok(Self {
            http: Arc::new(BlockingHttp::new(config)?),
            bucket: bucket.into(),
        })
    }

    fn url(&self, key: &str) -> String {
        self.http.config.object_url(&self.bucket, key)
    }
}

impl ModelStore for HttpModelStore {
    fn exists(&self, key: &str) -> Result<bool, StoreError> {
        let response = self.http.send(self.http.client.head(self.url(key)))?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(false);
        }
        self.http.check(response).map(|_| true)
    }

    fn download(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        let response = self.http.send(self.http.client.get(self.url(key)))?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(StoreError::NotFound(key.to_string()));
        }
        let response = self.http.check(response)?;
        self.http
            .runtime
            .block_on(async { response.bytes().await })
            .map(|b| b.to_vec())
            .map_err(|e| StoreError::Network(e.to_string()))
    }

    fn upload(&self, key: &str, bytes: &[u8]) -> Result<(), StoreError> {
        let request = self
            .http
            .client
            .put(self.url(key))
            .header("Content-Type", "application/json")
            .body(bytes.to_vec());
        let response = self.http.send(request)?;
        self.http.check(response).map(|_| ())
    }
}

/// Event sink on the remote document service.
pub struct HttpEventSink {
    http: Arc<BlockingHttp>,
    collection: String,
}

impl HttpEventSink {
    pub fn new(config: RemoteConfig, collection: impl Into<String>) -> Result<Self, StoreError> {
        Ok(Self {
            http: Arc::new(BlockingHttp::new(config)?),
            collection: collection.into(),
        })
    }
}

impl EventSink for HttpEventSink {
    fn append(&mut self, record: &EventRecord) -> Result<(), StoreError> {
        let request = self
            .http
            .client
            .post(self.http.config.records_url(&self.collection))
            .json(record);
        let response = self.http.send(request)?;
        self.http.check(response).map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::thread;

    /// Serve one canned response per entry, then hang up.
    fn serve(responses: Vec<&'static str>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        thread::spawn(move || {
            for response in responses {
                let (mut stream, _) = listener.accept().unwrap();
                let mut request = Vec::new();
                let mut chunk = [0u8; 1024];
                while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                    match stream.read(&mut chunk) {
                        Ok(0) | Err(_) => break,
                        Ok(n) => request.extend_from_slice(&chunk[..n]),
                    }
                }
                let _ = stream.write_all(response.as_bytes());
            }
        });
        format!("http://{addr}")
    }

    fn quick_config(base_url: &str) -> RemoteConfig {
        let mut config = RemoteConfig::new(base_url);
        config.timeout = Duration::from_secs(5);
        config
    }

    #[test]
    fn test_remote_urls() {
        let config = RemoteConfig::new("http://127.0.0.1:8080/");
        assert_eq!(
            config.object_url("heart-models", "heart_model"),
            "http://127.0.0.1:8080/buckets/heart-models/objects/heart_model"
        );
        assert_eq!(
            config.records_url("heart_rate_data"),
            "http://127.0.0.1:8080/collections/heart_rate_data/records"
        );
    }

    #[test]
    fn test_unreachable_store_is_network_error() {
        let mut config = RemoteConfig::new("http://127.0.0.1:9");
        config.timeout = Duration::from_millis(200);
        let store = HttpModelStore::new(config, "heart-models").unwrap();

        assert!(matches!(
            store.exists("heart_model"),
            Err(StoreError::Network(_))
        ));
    }

    #[test]
    fn test_missing_object_on_live_server() {
        let url = serve(vec![
            "HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
        ]);
        let store = HttpModelStore::new(quick_config(&url), "heart-models").unwrap();

        assert!(matches!(store.exists("heart_model"), Ok(false)));
    }

    #[test]
    fn test_download_from_live_server() {
        let url = serve(vec![
            "HTTP/1.1 200 OK\r\nContent-Length: 2\r\nConnection: close\r\n\r\n{}",
            "HTTP/1.1 500 Internal Server Error\r\nContent-Length: 4\r\nConnection: close\r\n\r\nboom",
        ]);
        let store = HttpModelStore::new(quick_config(&url), "heart-models").unwrap();

        assert_eq!(store.download("heart_model").unwrap(), b"{}".to_vec());
        match store.download("heart_model") {
            Err(StoreError::Server { status, message }) => {
                assert_eq!(status, 500);
                assert_eq!(message, "boom");
            }
            other => panic!("unexpected result {other:?}"),
        }
    }
}
