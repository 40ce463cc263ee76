//! Idempotent publication of datasets to object storage.
//!
//! A dataset is complete once its commit object (the Zarr root metadata)
//! exists. Payload objects are uploaded first and the commit object last, so
//! a crashed attempt leaves no commit and is simply redone on redelivery.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use storage::ObjectStorage;
use tracing::{debug, info, instrument};

use nwp_common::GridField;

use crate::error::{IngestionError, Result};
use crate::target::PublicationTarget;
use crate::upload::upload_directory;
use crate::zarr::DatasetEncoder;

/// How the commit object is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PublishMode {
    /// Existence check followed by a plain write. Two workers racing on the
    /// same target may both report `Published`.
    #[default]
    CheckThenWrite,
    /// Existence check followed by a write-if-absent commit, so exactly one
    /// racer reports `Published`.
    Conditional,
}

/// Summary of a successful publication.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Publication {
    pub target: PublicationTarget,
    /// Objects written, including the commit object
    pub objects: usize,
    pub bytes_written: u64,
}

/// Writes encoded datasets to a destination store at most once per target.
#[derive(Clone)]
pub struct Publisher {
    storage: ObjectStorage,
    encoder: Arc<dyn DatasetEncoder>,
    mode: PublishMode,
}

impl Publisher {
    pub fn new(storage: ObjectStorage, encoder: Arc<dyn DatasetEncoder>, mode: PublishMode) -> Self {
        Self {
            storage,
            encoder,
            mode,
        }
    }

    pub fn storage(&self) -> &ObjectStorage {
        &self.storage
    }

    pub fn mode(&self) -> PublishMode {
        self.mode
    }

    /// Whether a complete dataset already exists at `target`.
    pub async fn exists(&self, target: &PublicationTarget) -> Result<bool> {
        Ok(self.storage.exists(&target.commit_key()).await?)
    }

    /// Publish `field` to `target`.
    ///
    /// Returns [`IngestionError::AlreadyPublished`] without writing anything
    /// if the target is already complete.
    #[instrument(skip(self, field), fields(target = %target))]
    pub async fn publish(&self, field: Arc<GridField>, target: &PublicationTarget) -> Result<Publication> {
        if self.exists(target).await? {
            return Err(IngestionError::AlreadyPublished(target.key().to_string()));
        }

        let workdir = tempfile::Builder::new().prefix("nwp-publish-").tempdir()?;
        let root = workdir.path().join(target.file_name());

        let encoder = self.encoder.clone();
        let encode_root = root.clone();
        let commit = tokio::task::spawn_blocking(move || encoder.encode(&field, &encode_root))
            .await
            .map_err(|e| IngestionError::ZarrWrite(format!("encoder task failed: {}", e)))??;

        let uploaded = upload_directory(&self.storage, &root, target.key()).await?;
        debug!(objects = uploaded.objects, bytes = uploaded.bytes, "Uploaded payload");

        let commit_key = target.commit_key();
        let commit_len = commit.len() as u64;
        match self.mode {
            PublishMode::CheckThenWrite => {
                self.storage
                    .put(&commit_key, commit)
                    .await
                    .map_err(|e| IngestionError::StorageUpload(e.to_string()))?;
            }
            PublishMode::Conditional => {
                let written = self
                    .storage
                    .put_if_absent(&commit_key, commit)
                    .await
                    .map_err(|e| IngestionError::StorageUpload(e.to_string()))?;
                if !written {
                    return Err(IngestionError::AlreadyPublished(target.key().to_string()));
                }
            }
        }

        let publication = Publication {
            target: target.clone(),
            objects: uploaded.objects + 1,
            bytes_written: uploaded.bytes + commit_len,
        };
        info!(
            objects = publication.objects,
            bytes = publication.bytes_written,
            "Published dataset"
        );
        Ok(publication)
    }
}
