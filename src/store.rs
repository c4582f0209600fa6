//! Object storage for the persisted JSON artifact.
//!
//! A write is a single whole-object put with overwrite semantics: writing the
//! same document to the same key twice leaves one object with the same bytes.
//!
//! * [`GcsStore`]: Google Cloud Storage JSON API, simple media upload.
//! * [`LocalStore`]: mirrors keys under a directory; atomic temp + rename.
//! * [`MemoryStore`]: in-process map, for embedding and tests.

use crate::error::StoreError;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, info};

pub const GCS_ENDPOINT: &str = "https://storage.googleapis.com";

/// Durable write-once-per-key blob storage.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Human-readable location, e.g. `gs://bucket`.
    fn describe(&self) -> String;

    /// Write `payload` as a JSON object at `key`, replacing any previous object.
    async fn put_json(&self, key: &str, payload: &[u8]) -> Result<(), StoreError>;
}

// ── GCS ──────────────────────────────────────────────────────────────────

/// Google Cloud Storage bucket.
///
/// Authenticates with an OAuth2 bearer token (e.g. the output of
/// `gcloud auth print-access-token`). Without a token requests are
/// anonymous, which only works against emulators or public-write buckets.
pub struct GcsStore {
    client: reqwest::Client,
    bucket: String,
    endpoint: String,
    token: Option<String>,
}

impl std::fmt::Debug for GcsStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GcsStore")
            .field("bucket", &self.bucket)
            .field("endpoint", &self.endpoint)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl GcsStore {
    pub fn new(
        bucket: impl Into<String>,
        token: Option<String>,
        timeout_secs: u64,
    ) -> Result<Self, StoreError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| StoreError::Request(e.to_string()))?;
        Ok(Self {
            client,
            bucket: bucket.into(),
            endpoint: GCS_ENDPOINT.to_string(),
            token: token.filter(|t| !t.is_empty()),
        })
    }

    /// Point at another endpoint, e.g. a local GCS emulator.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into().trim_end_matches('/').to_string();
        self
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Media-upload URL for `key`.
    pub fn upload_url(&self, key: &str) -> Result<reqwest::Url, StoreError> {
        let mut url = reqwest::Url::parse(&format!(
            "{}/upload/storage/v1/b/{}/o",
            self.endpoint, self.bucket
        ))
        .map_err(|e| StoreError::Request(format!("invalid endpoint: {e}")))?;
        url.query_pairs_mut()
            .append_pair("uploadType", "media")
            .append_pair("name", key);
        Ok(url)
    }
}

#[async_trait]
impl ObjectStore for GcsStore {
    fn describe(&self) -> String {
        format!("gs://{}", self.bucket)
    }

    async fn put_json(&self, key: &str, payload: &[u8]) -> Result<(), StoreError> {
        let url = self.upload_url(key)?;
        let mut request = self
            .client
            .post(url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(payload.to_vec());
        if let Some(ref token) = self.token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| StoreError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StoreError::Http {
                status: status.as_u16(),
                body,
            });
        }

        info!("Uploaded {} bytes to gs://{}/{}", payload.len(), self.bucket, key);
        Ok(())
    }
}

// ── Local directory ──────────────────────────────────────────────────────

/// Keys mirrored as files under `root`.
#[derive(Debug, Clone)]
pub struct LocalStore {
    root: PathBuf,
}

impl LocalStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// File path for `key`. Keys that would escape `root` are rejected.
    pub fn path_for(&self, key: &str) -> Result<PathBuf, StoreError> {
        let relative = Path::new(key);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)));
        if key.is_empty() || escapes {
            return Err(StoreError::Io {
                path: relative.to_path_buf(),
                source: std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    "key must be a relative path without '..'",
                ),
            });
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl ObjectStore for LocalStore {
    fn describe(&self) -> String {
        format!("file://{}", self.root.display())
    }

    async fn put_json(&self, key: &str, payload: &[u8]) -> Result<(), StoreError> {
        let path = self.path_for(key)?;
        let io_err = |source| StoreError::Io {
            path: path.clone(),
            source,
        };

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
        }

        // Atomic write: readers never observe a half-written artifact.
        let tmp_path = path.with_extension("json.tmp");
        tokio::fs::write(&tmp_path, payload).await.map_err(io_err)?;
        tokio::fs::rename(&tmp_path, &path).await.map_err(io_err)?;

        debug!("Wrote {} bytes to {}", payload.len(), path.display());
        Ok(())
    }
}

// ── In-memory ────────────────────────────────────────────────────────────

/// Objects kept in a map; cloning the payload on every put.
#[derive(Debug, Default)]
pub struct MemoryStore {
    objects: Mutex<BTreeMap<String, Vec<u8>>>,
    puts: Mutex<usize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.lock_objects().get(key).cloned()
    }

    pub fn keys(&self) -> Vec<String> {
        self.lock_objects().keys().cloned().collect()
    }

    /// Total successful puts, including overwrites.
    pub fn put_count(&self) -> usize {
        *self.puts.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_objects(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, Vec<u8>>> {
        self.objects.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    fn describe(&self) -> String {
        "memory://".to_string()
    }

    async fn put_json(&self, key: &str, payload: &[u8]) -> Result<(), StoreError> {
        self.lock_objects().insert(key.to_string(), payload.to_vec());
        *self.puts.lock().unwrap_or_else(|e| e.into_inner()) += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn gcs_upload_url_encodes_the_object_name() {
        let store = GcsStore::new("cesgs-dart", None, 10).unwrap();
        let url = store.upload_url("parsed/doc 1.json").unwrap();
        assert_eq!(url.host_str(), Some("storage.googleapis.com"));
        assert_eq!(url.path(), "/upload/storage/v1/b/cesgs-dart/o");
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert!(pairs.contains(&("uploadType".into(), "media".into())));
        assert!(pairs.contains(&("name".into(), "parsed/doc 1.json".into())));
        assert_eq!(store.describe(), "gs://cesgs-dart");
    }

    #[test]
    fn gcs_debug_redacts_the_token() {
        let store = GcsStore::new("b", Some("secret-token".into()), 10).unwrap();
        let dbg = format!("{store:?}");
        assert!(!dbg.contains("secret-token"));
    }

    #[tokio::test]
    async fn gcs_unreachable_endpoint_is_a_request_error() {
        let store = GcsStore::new("b", None, 2)
            .unwrap()
            .with_endpoint("http://127.0.0.1:9");
        let err = store.put_json("parsed/x.json", b"[]").await.unwrap_err();
        assert!(matches!(err, StoreError::Request(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn local_store_overwrites_in_place() {
        let dir = TempDir::new().unwrap();
        let store = LocalStore::new(dir.path());

        store.put_json("parsed/a.json", b"[1]").await.unwrap();
        store.put_json("parsed/a.json", b"[2]").await.unwrap();

        let written = std::fs::read(dir.path().join("parsed/a.json")).unwrap();
        assert_eq!(written, b"[2]");
        let entries: Vec<_> = std::fs::read_dir(dir.path().join("parsed"))
            .unwrap()
            .collect();
        assert_eq!(entries.len(), 1, "no temp file left behind");
    }

    #[tokio::test]
    async fn local_store_rejects_escaping_keys() {
        let dir = TempDir::new().unwrap();
        let store = LocalStore::new(dir.path());
        assert!(store.put_json("../evil.json", b"[]").await.is_err());
        assert!(store.put_json("/abs.json", b"[]").await.is_err());
    }

    #[tokio::test]
    async fn memory_store_counts_puts() {
        let store = MemoryStore::new();
        tokio_test::assert_ok!(store.put_json("k", b"[]").await);
        tokio_test::assert_ok!(store.put_json("k", b"[]").await);
        assert_eq!(store.put_count(), 2);
        assert_eq!(store.keys(), vec!["k".to_string()]);
        assert_eq!(store.get("k").unwrap(), b"[]");
    }
}
