//! Retrieval of source extracts named by availability records.

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::Mutex;
use storage::{ObjectStorage, ObjectStorageConfig};
use tracing::{debug, instrument};

use crate::error::{IngestionError, Result};
use crate::message::SourceLocation;

/// Fetches the raw payload of a source extract.
#[async_trait]
pub trait SourceFetcher: Send + Sync {
    async fn fetch(&self, location: &SourceLocation) -> Result<Bytes>;
}

/// Fetcher reading from object storage, one client per source bucket.
pub struct ObjectStoreFetcher {
    config: ObjectStorageConfig,
    clients: Mutex<HashMap<String, ObjectStorage>>,
}

impl ObjectStoreFetcher {
    /// `config` supplies credentials and endpoint; the bucket is taken from
    /// each record.
    pub fn new(config: ObjectStorageConfig) -> Self {
        Self {
            config,
            clients: Mutex::new(HashMap::new()),
        }
    }

    /// Fetcher that serves every bucket from one pre-built store.
    pub fn with_storage(storage: ObjectStorage) -> Self {
        let fetcher = Self::new(ObjectStorageConfig::default().for_bucket(storage.bucket()));
        fetcher.insert(storage);
        fetcher
    }

    fn insert(&self, storage: ObjectStorage) {
        self.clients
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(storage.bucket().to_string(), storage);
    }

    fn client(&self, bucket: &str) -> Result<ObjectStorage> {
        let mut clients = self.clients.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(storage) = clients.get(bucket) {
            return Ok(storage.clone());
        }
        let storage = ObjectStorage::new(&self.config.for_bucket(bucket))
            .map_err(|e| IngestionError::Fetch(e.to_string()))?;
        clients.insert(bucket.to_string(), storage.clone());
        Ok(storage)
    }
}

#[async_trait]
impl SourceFetcher for ObjectStoreFetcher {
    #[instrument(skip(self), fields(source = %location))]
    async fn fetch(&self, location: &SourceLocation) -> Result<Bytes> {
        let storage = self.client(&location.bucket)?;
        let bytes = storage
            .get(&location.key)
            .await
            .map_err(|e| IngestionError::Fetch(e.to_string()))?;
        debug!(size = bytes.len(), "Fetched source object");
        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fetch_from_registered_bucket() {
        let storage = ObjectStorage::in_memory("source-bucket");
        storage
            .put("extract.nc", Bytes::from_static(b"payload"))
            .await
            .unwrap();

        let fetcher = ObjectStoreFetcher::with_storage(storage);
        let location = SourceLocation {
            bucket: "source-bucket".to_string(),
            key: "extract.nc".to_string(),
        };
        assert_eq!(
            fetcher.fetch(&location).await.unwrap(),
            Bytes::from_static(b"payload")
        );
    }

    #[tokio::test]
    async fn test_missing_object_is_fetch_error() {
        let fetcher = ObjectStoreFetcher::with_storage(ObjectStorage::in_memory("b"));
        let location = SourceLocation {
            bucket: "b".to_string(),
            key: "missing.nc".to_string(),
        };
        assert!(matches!(
            fetcher.fetch(&location).await,
            Err(IngestionError::Fetch(_))
        ));
    }
}
