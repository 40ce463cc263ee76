//! Object storage interface for source extracts and published datasets.

use bytes::Bytes;
use object_store::{
    aws::AmazonS3Builder, local::LocalFileSystem, memory::InMemory, path::Path, ObjectStore,
    PutMode, PutOptions,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, instrument};

use nwp_common::{NwpError, NwpResult};

/// Which object store implementation backs an [`ObjectStorage`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// AWS S3 or an S3-compatible endpoint
    #[default]
    S3,
    /// A directory on the local filesystem
    Local,
    /// Process-local memory (tests and dry runs)
    Memory,
}

/// Configuration for object storage connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectStorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,
    /// Bucket name (S3) or informational label (local/memory)
    pub bucket: String,
    /// Custom S3 endpoint URL; `None` uses AWS
    #[serde(default)]
    pub endpoint: Option<String>,
    /// AWS region
    #[serde(default = "default_region")]
    pub region: String,
    /// Access key ID; `None` falls back to the AWS environment
    #[serde(default)]
    pub access_key_id: Option<String>,
    /// Secret access key; `None` falls back to the AWS environment
    #[serde(default)]
    pub secret_access_key: Option<String>,
    /// Allow HTTP (for local MinIO)
    #[serde(default)]
    pub allow_http: bool,
    /// Send unsigned requests (public open-data buckets)
    #[serde(default)]
    pub skip_signature: bool,
    /// Root directory for the local backend
    #[serde(default)]
    pub root: Option<String>,
}

fn default_region() -> String {
    "eu-west-1".to_string()
}

impl Default for ObjectStorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::S3,
            bucket: "uk-metoffice-nwp".to_string(),
            endpoint: None,
            region: default_region(),
            access_key_id: None,
            secret_access_key: None,
            allow_http: false,
            skip_signature: false,
            root: None,
        }
    }
}

impl ObjectStorageConfig {
    /// Same connection settings, different bucket.
    pub fn for_bucket(&self, bucket: &str) -> Self {
        Self {
            bucket: bucket.to_string(),
            ..self.clone()
        }
    }
}

/// Object storage client bound to one bucket.
#[derive(Clone)]
pub struct ObjectStorage {
    store: Arc<dyn ObjectStore>,
    bucket: String,
}

impl ObjectStorage {
    /// Create a new object storage client from config.
    pub fn new(config: &ObjectStorageConfig) -> NwpResult<Self> {
        let store: Arc<dyn ObjectStore> = match config.backend {
            StorageBackend::S3 => {
                let mut builder = AmazonS3Builder::from_env()
                    .with_bucket_name(&config.bucket)
                    .with_region(&config.region);

                if let Some(endpoint) = &config.endpoint {
                    builder = builder.with_endpoint(endpoint);
                }
                if let (Some(key), Some(secret)) =
                    (&config.access_key_id, &config.secret_access_key)
                {
                    builder = builder
                        .with_access_key_id(key)
                        .with_secret_access_key(secret);
                }
                if config.allow_http {
                    builder = builder.with_allow_http(true);
                }
                if config.skip_signature {
                    builder = builder.with_skip_signature(true);
                }

                let store = builder.build().map_err(|e| {
                    NwpError::StorageError(format!("Failed to create S3 client: {}", e))
                })?;
                Arc::new(store)
            }
            StorageBackend::Local => {
                let root = config.root.as_deref().ok_or_else(|| {
                    NwpError::ConfigError("local storage backend requires 'root'".to_string())
                })?;
                std::fs::create_dir_all(root)?;
                let store = LocalFileSystem::new_with_prefix(root).map_err(|e| {
                    NwpError::StorageError(format!("Failed to open {}: {}", root, e))
                })?;
                Arc::new(store)
            }
            StorageBackend::Memory => Arc::new(InMemory::new()),
        };

        Ok(Self {
            store,
            bucket: config.bucket.clone(),
        })
    }

    /// Wrap an existing store.
    pub fn from_store(store: Arc<dyn ObjectStore>, bucket: impl Into<String>) -> Self {
        Self {
            store,
            bucket: bucket.into(),
        }
    }

    /// A fresh in-memory store.
    pub fn in_memory(bucket: impl Into<String>) -> Self {
        Self::from_store(Arc::new(InMemory::new()), bucket)
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Write bytes to a path in the bucket, replacing any existing object.
    #[instrument(skip(self, data), fields(bucket = %self.bucket, path = %path))]
    pub async fn put(&self, path: &str, data: Bytes) -> NwpResult<()> {
        let location = Path::from(path);
        debug!(size = data.len(), "Writing object");

        self.store
            .put(&location, data)
            .await
            .map_err(|e| NwpError::StorageError(format!("Failed to write {}: {}", path, e)))?;

        Ok(())
    }

    /// Write bytes only if nothing exists at `path`.
    ///
    /// Returns `false` when another writer got there first. The check and the
    /// write are a single atomic operation on backends that support it.
    #[instrument(skip(self, data), fields(bucket = %self.bucket, path = %path))]
    pub async fn put_if_absent(&self, path: &str, data: Bytes) -> NwpResult<bool> {
        let location = Path::from(path);
        let opts = PutOptions {
            mode: PutMode::Create,
            ..Default::default()
        };

        match self.store.put_opts(&location, data, opts).await {
            Ok(_) => Ok(true),
            Err(object_store::Error::AlreadyExists { .. }) => {
                debug!("Object already exists");
                Ok(false)
            }
            Err(e) => Err(NwpError::StorageError(format!(
                "Failed to conditionally write {}: {}",
                path, e
            ))),
        }
    }

    /// Read bytes from a path.
    #[instrument(skip(self), fields(bucket = %self.bucket, path = %path))]
    pub async fn get(&self, path: &str) -> NwpResult<Bytes> {
        let location = Path::from(path);

        let result = self.store.get(&location).await.map_err(|e| match e {
            object_store::Error::NotFound { .. } => NwpError::NotFound(path.to_string()),
            e => NwpError::StorageError(format!("Failed to read {}: {}", path, e)),
        })?;

        let bytes = result
            .bytes()
            .await
            .map_err(|e| NwpError::StorageError(format!("Failed to read bytes: {}", e)))?;

        debug!(size = bytes.len(), "Read object");
        Ok(bytes)
    }

    /// Check if an object exists.
    pub async fn exists(&self, path: &str) -> NwpResult<bool> {
        let location = Path::from(path);

        match self.store.head(&location).await {
            Ok(_) => Ok(true),
            Err(object_store::Error::NotFound { .. }) => Ok(false),
            Err(e) => Err(NwpError::StorageError(format!(
                "Failed to check {}: {}",
                path, e
            ))),
        }
    }

    /// List objects with a given prefix.
    pub async fn list(&self, prefix: &str) -> NwpResult<Vec<String>> {
        use futures::TryStreamExt;

        let prefix_path = Path::from(prefix);
        let mut paths = Vec::new();

        let mut stream = self.store.list(Some(&prefix_path));
        while let Some(meta) = stream
            .try_next()
            .await
            .map_err(|e| NwpError::StorageError(format!("List failed: {}", e)))?
        {
            paths.push(meta.location.to_string());
        }

        Ok(paths)
    }

    /// Delete an object.
    #[instrument(skip(self), fields(bucket = %self.bucket, path = %path))]
    pub async fn delete(&self, path: &str) -> NwpResult<()> {
        let location = Path::from(path);

        self.store
            .delete(&location)
            .await
            .map_err(|e| NwpError::StorageError(format!("Failed to delete {}: {}", path, e)))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_get_exists() {
        let storage = ObjectStorage::in_memory("test");
        assert!(!storage.exists("a/b.txt").await.unwrap());

        storage.put("a/b.txt", Bytes::from_static(b"hello")).await.unwrap();
        assert!(storage.exists("a/b.txt").await.unwrap());
        assert_eq!(storage.get("a/b.txt").await.unwrap(), Bytes::from_static(b"hello"));
    }

    #[tokio::test]
    async fn test_put_if_absent_only_writes_once() {
        let storage = ObjectStorage::in_memory("test");

        assert!(storage
            .put_if_absent("marker", Bytes::from_static(b"first"))
            .await
            .unwrap());
        assert!(!storage
            .put_if_absent("marker", Bytes::from_static(b"second"))
            .await
            .unwrap());
        assert_eq!(storage.get("marker").await.unwrap(), Bytes::from_static(b"first"));
    }

    #[tokio::test]
    async fn test_get_missing_is_not_found() {
        let storage = ObjectStorage::in_memory("test");
        assert!(matches!(
            storage.get("nope").await,
            Err(NwpError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_list_prefix() {
        let storage = ObjectStorage::in_memory("test");
        storage.put("x/1", Bytes::new()).await.unwrap();
        storage.put("x/2", Bytes::new()).await.unwrap();
        storage.put("y/1", Bytes::new()).await.unwrap();

        let mut listed = storage.list("x").await.unwrap();
        listed.sort();
        assert_eq!(listed, vec!["x/1".to_string(), "x/2".to_string()]);
    }

    #[test]
    fn test_local_backend_requires_root() {
        let config = ObjectStorageConfig {
            backend: StorageBackend::Local,
            ..Default::default()
        };
        assert!(matches!(
            ObjectStorage::new(&config),
            Err(NwpError::ConfigError(_))
        ));
    }

    #[test]
    fn test_for_bucket() {
        let config = ObjectStorageConfig::default().for_bucket("aws-earth-mo-atmospheric-mogreps-uk-prd");
        assert_eq!(config.bucket, "aws-earth-mo-atmospheric-mogreps-uk-prd");
        assert_eq!(config.region, "eu-west-1");
    }
}
