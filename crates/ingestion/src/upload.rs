//! Upload of locally encoded datasets.

use bytes::Bytes;
use std::path::Path;
use storage::ObjectStorage;
use tracing::debug;

use crate::error::{IngestionError, Result};

/// Totals of one directory upload.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UploadSummary {
    pub objects: usize,
    pub bytes: u64,
}

/// Upload every file below `local_path` to `storage_prefix`, keeping the
/// relative layout.
pub async fn upload_directory(
    storage: &ObjectStorage,
    local_path: &Path,
    storage_prefix: &str,
) -> Result<UploadSummary> {
    let mut summary = UploadSummary::default();

    for entry in walkdir::WalkDir::new(local_path).sort_by_file_name() {
        let entry = entry.map_err(|e| IngestionError::StorageUpload(e.to_string()))?;
        if !entry.file_type().is_file() {
            continue;
        }

        let relative_path = entry
            .path()
            .strip_prefix(local_path)
            .map_err(|e| IngestionError::StorageUpload(e.to_string()))?;
        let relative = relative_path
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        let storage_path = format!("{}/{}", storage_prefix.trim_end_matches('/'), relative);

        let file_data = tokio::fs::read(entry.path()).await?;
        let file_size = file_data.len() as u64;

        storage
            .put(&storage_path, Bytes::from(file_data))
            .await
            .map_err(|e| IngestionError::StorageUpload(e.to_string()))?;

        summary.objects += 1;
        summary.bytes += file_size;
        debug!(path = %storage_path, size = file_size, "Uploaded dataset object");
    }

    Ok(summary)
}
