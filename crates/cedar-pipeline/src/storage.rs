//! Remote storage: object stores and the dataset stager.

use crate::dataset::Dataset;
use crate::error::{PipelineError, PipelineResult};
use crate::format::{encode, LabelPlacement, TransportFormat};
use crate::retry::RetryPolicy;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("object not found: {0}")]
    NotFound(String),

    #[error("invalid object location: {0}")]
    InvalidLocation(String),

    #[error("storage unavailable: {0}")]
    Unavailable(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl StorageError {
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

/// Addressable blob storage (bucket + key).
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Write `bytes` under `bucket/key`, replacing any existing object.
    async fn put_object(&self, bucket: &str, key: &str, bytes: Vec<u8>) -> Result<(), StorageError>;

    async fn get_object(&self, bucket: &str, key: &str) -> Result<Vec<u8>, StorageError>;
}

/// `s3://bucket/key` style URI.
#[must_use]
pub fn object_uri(bucket: &str, key: &str) -> String {
    format!("s3://{bucket}/{}", key.trim_start_matches('/'))
}

/// Key for one split under `prefix`, e.g. `breast-cancer-xgboost/train.csv`.
#[must_use]
pub fn artifact_key(prefix: &str, split: &str, format: TransportFormat) -> String {
    let prefix = prefix.trim_matches('/');
    if prefix.is_empty() {
        format!("{split}.{}", format.extension())
    } else {
        format!("{prefix}/{split}.{}", format.extension())
    }
}

/// A dataset that has been uploaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StagedArtifact {
    pub bucket: String,
    pub key: String,
    pub format: TransportFormat,
    pub size_bytes: u64,
    pub sha256: String,
}

impl StagedArtifact {
    #[must_use]
    pub fn uri(&self) -> String {
        object_uri(&self.bucket, &self.key)
    }
}

/// Serializes datasets and uploads them to an [`ObjectStore`].
#[derive(Clone)]
pub struct RemoteStager {
    store: Arc<dyn ObjectStore>,
    format: TransportFormat,
    placement: LabelPlacement,
    retry: RetryPolicy,
}

impl RemoteStager {
    pub fn new(store: Arc<dyn ObjectStore>, format: TransportFormat, placement: LabelPlacement) -> Self {
        Self { store, format, placement, retry: RetryPolicy::default() }
    }

    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    #[must_use]
    pub fn format(&self) -> TransportFormat {
        self.format
    }

    /// Upload `dataset` to `bucket/key`. Either the whole object lands or an error is
    /// returned; an existing object under the same key is overwritten.
    pub async fn stage(&self, dataset: &Dataset, bucket: &str, key: &str) -> PipelineResult<StagedArtifact> {
        let uri = object_uri(bucket, key);
        if bucket.trim().is_empty() || key.trim().is_empty() {
            return Err(PipelineError::Staging { uri, message: "bucket and key are required".to_string() });
        }

        let bytes = encode(dataset, self.format, self.placement)?;
        let size_bytes = bytes.len() as u64;
        let sha256 = hex::encode(Sha256::digest(&bytes));

        info!(%uri, rows = dataset.len(), size_bytes, "staging dataset");
        self.retry
            .run("put_object", StorageError::is_transient, || self.store.put_object(bucket, key, bytes.clone()))
            .await
            .map_err(|e| PipelineError::Staging { uri: uri.clone(), message: e.to_string() })?;

        Ok(StagedArtifact {
            bucket: bucket.to_string(),
            key: key.to_string(),
            format: self.format,
            size_bytes,
            sha256,
        })
    }

    /// Read back a staged object.
    pub async fn fetch(&self, bucket: &str, key: &str) -> PipelineResult<Vec<u8>> {
        self.store
            .get_object(bucket, key)
            .await
            .map_err(|e| PipelineError::Staging { uri: object_uri(bucket, key), message: e.to_string() })
    }
}

/// Object store rooted in a local directory: `<root>/<bucket>/<key>`.
#[derive(Debug, Clone)]
pub struct LocalObjectStore {
    root: PathBuf,
}

impl LocalObjectStore {
    #[must_use]
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    fn object_path(&self, bucket: &str, key: &str) -> Result<PathBuf, StorageError> {
        let invalid = |part: &str| part.is_empty() || part.split('/').any(|seg| seg == ".." || seg == ".");
        let key = key.trim_start_matches('/');
        if invalid(bucket) || bucket.contains('/') || invalid(key) {
            return Err(StorageError::InvalidLocation(object_uri(bucket, key)));
        }
        Ok(self.root.join(bucket).join(key))
    }
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    async fn put_object(&self, bucket: &str, key: &str, bytes: Vec<u8>) -> Result<(), StorageError> {
        let path = self.object_path(bucket, key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        // Readers only ever see a complete object. The temp name keeps the full file name so
        // keys differing only by extension never share one.
        let mut tmp = path.clone().into_os_string();
        tmp.push(".partial");
        let tmp = PathBuf::from(tmp);
        tokio::fs::write(&tmp, &bytes).await?;
        if let Err(e) = tokio::fs::rename(&tmp, &path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        Ok(())
    }

    async fn get_object(&self, bucket: &str, key: &str) -> Result<Vec<u8>, StorageError> {
        let path = self.object_path(bucket, key)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(StorageError::NotFound(object_uri(bucket, key))),
            Err(e) => Err(e.into()),
        }
    }
}

/// In-process object store.
#[derive(Debug, Default)]
pub struct MemoryObjectStore {
    objects: Mutex<HashMap<(String, String), Vec<u8>>>,
}

impl MemoryObjectStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.objects.lock().map(|o| o.len()).unwrap_or(0)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn put_object(&self, bucket: &str, key: &str, bytes: Vec<u8>) -> Result<(), StorageError> {
        let mut objects = self.objects.lock().map_err(|_| StorageError::Unavailable("store lock poisoned".to_string()))?;
        objects.insert((bucket.to_string(), key.to_string()), bytes);
        Ok(())
    }

    async fn get_object(&self, bucket: &str, key: &str) -> Result<Vec<u8>, StorageError> {
        let objects = self.objects.lock().map_err(|_| StorageError::Unavailable("store lock poisoned".to_string()))?;
        objects
            .get(&(bucket.to_string(), key.to_string()))
            .cloned()
            .ok_or_else(|| StorageError::NotFound(object_uri(bucket, key)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::Value;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;
    use tempfile::TempDir;

    fn dataset() -> Dataset {
        Dataset::new(
            vec!["radius".to_string(), "target".to_string()],
            vec![vec![Value::Number(13.3), Value::Number(1.0)], vec![Value::Number(20.1), Value::Number(0.0)]],
        )
        .unwrap()
        .with_label("target")
        .unwrap()
    }

    /// Fails the first `failures` uploads with a transient error.
    struct FlakyStore {
        failures: u32,
        calls: AtomicU32,
        inner: MemoryObjectStore,
    }

    #[async_trait]
    impl ObjectStore for FlakyStore {
        async fn put_object(&self, bucket: &str, key: &str, bytes: Vec<u8>) -> Result<(), StorageError> {
            if self.calls.fetch_add(1, Ordering::SeqCst) < self.failures {
                return Err(StorageError::Unavailable("connection reset".to_string()));
            }
            self.inner.put_object(bucket, key, bytes).await
        }

        async fn get_object(&self, bucket: &str, key: &str) -> Result<Vec<u8>, StorageError> {
            self.inner.get_object(bucket, key).await
        }
    }

    #[test]
    fn test_artifact_key_and_uri() {
        assert_eq!(artifact_key("breast-cancer-xgboost/", "train", TransportFormat::DelimitedText), "breast-cancer-xgboost/train.csv");
        assert_eq!(artifact_key("", "test", TransportFormat::SparseVector), "test.libsvm");
        assert_eq!(object_uri("bucket", "/p/train.csv"), "s3://bucket/p/train.csv");
    }

    #[tokio::test]
    async fn test_stage_then_fetch_returns_serialized_bytes() {
        let temp = TempDir::new().unwrap();
        let store = Arc::new(LocalObjectStore::new(temp.path().to_path_buf()));
        let stager = RemoteStager::new(store, TransportFormat::DelimitedText, LabelPlacement::First);

        let artifact = stager.stage(&dataset(), "bucket", "prefix/train.csv").await.unwrap();
        assert_eq!(artifact.uri(), "s3://bucket/prefix/train.csv");

        let fetched = stager.fetch("bucket", "prefix/train.csv").await.unwrap();
        let expected = encode(&dataset(), TransportFormat::DelimitedText, LabelPlacement::First).unwrap();
        assert_eq!(fetched, expected);
        assert_eq!(artifact.size_bytes, expected.len() as u64);
        assert!(!temp.path().join("bucket/prefix/train.csv.partial").exists());
    }

    #[tokio::test]
    async fn test_restaging_overwrites() {
        let store = Arc::new(MemoryObjectStore::new());
        let stager = RemoteStager::new(store.clone(), TransportFormat::DelimitedText, LabelPlacement::AsIs);
        let first = stager.stage(&dataset(), "b", "k.csv").await.unwrap();

        let smaller = Dataset::new(vec!["target".to_string()], vec![vec![Value::Number(1.0)]])
            .unwrap()
            .with_label("target")
            .unwrap();
        let second = stager.stage(&smaller, "b", "k.csv").await.unwrap();

        assert_ne!(first.sha256, second.sha256);
        assert_eq!(store.len(), 1);
        assert_eq!(stager.fetch("b", "k.csv").await.unwrap(), b"1\n".to_vec());
    }

    #[tokio::test]
    async fn test_failed_upload_is_staging_error() {
        let store = Arc::new(FlakyStore { failures: 1, calls: AtomicU32::new(0), inner: MemoryObjectStore::new() });
        let stager = RemoteStager::new(store.clone(), TransportFormat::DelimitedText, LabelPlacement::First);

        let err = stager.stage(&dataset(), "b", "k.csv").await.unwrap_err();
        assert!(matches!(err, PipelineError::Staging { .. }));
        assert!(store.inner.is_empty());
    }

    #[tokio::test]
    async fn test_transient_upload_failure_is_retried() {
        let store = Arc::new(FlakyStore { failures: 2, calls: AtomicU32::new(0), inner: MemoryObjectStore::new() });
        let stager = RemoteStager::new(store.clone(), TransportFormat::DelimitedText, LabelPlacement::First)
            .with_retry(RetryPolicy::new(2, Duration::from_millis(1), Duration::from_millis(2), 2.0));

        stager.stage(&dataset(), "b", "k.csv").await.unwrap();
        assert_eq!(store.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_local_store_keys_differing_by_extension_do_not_collide() {
        let temp = TempDir::new().unwrap();
        let store = LocalObjectStore::new(temp.path().to_path_buf());

        let (csv, libsvm) = tokio::join!(
            store.put_object("bucket", "run/train.csv", b"csv".to_vec()),
            store.put_object("bucket", "run/train.libsvm", b"libsvm".to_vec()),
        );
        csv.unwrap();
        libsvm.unwrap();

        assert_eq!(store.get_object("bucket", "run/train.csv").await.unwrap(), b"csv".to_vec());
        assert_eq!(store.get_object("bucket", "run/train.libsvm").await.unwrap(), b"libsvm".to_vec());
        let names: Vec<_> = std::fs::read_dir(temp.path().join("bucket/run"))
            .unwrap()
            .map(|entry| entry.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(names.len(), 2);
        assert!(names.iter().all(|name| !name.ends_with(".partial")));
    }

    #[tokio::test]
    async fn test_local_store_rejects_traversal() {
        let temp = TempDir::new().unwrap();
        let store = LocalObjectStore::new(temp.path().to_path_buf());
        let err = store.put_object("bucket", "../escape.csv", vec![1]).await.unwrap_err();
        assert!(matches!(err, StorageError::InvalidLocation(_)));
        assert!(matches!(store.get_object("bucket", "missing.csv").await, Err(StorageError::NotFound(_))));
    }
}
