//! Zarr V3 encoding of extracted fields.
//!
//! A field becomes a Zarr group holding one chunked array for the data
//! variable plus one array per coordinate dimension. Arrays are written to a
//! local directory and the group's root `zarr.json` is returned separately so
//! the publisher can write it last.

use std::path::Path;
use std::sync::Arc;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use zarrs::array::codec::bytes_to_bytes::blosc::{
    BloscCodec, BloscCompressionLevel, BloscCompressor, BloscShuffleMode,
};
use zarrs::array::{ArrayBuilder, DataType, FillValue};
use zarrs::array_subset::ArraySubset;
use zarrs::storage::{ReadableStorageTraits, WritableStorageTraits};
use zarrs_filesystem::FilesystemStore;

use nwp_common::grid::{X_DIM, Y_DIM};
use nwp_common::GridField;

use crate::error::{IngestionError, Result};

/// Attribute naming each array's dimensions, as read by xarray.
pub const ARRAY_DIMENSIONS_ATTR: &str = "_ARRAY_DIMENSIONS";

/// Turns a field into the objects of a published dataset.
pub trait DatasetEncoder: Send + Sync {
    /// Write every payload object of `field` under `root` and return the
    /// commit document, which must not be written under `root`.
    fn encode(&self, field: &GridField, root: &Path) -> Result<Bytes>;
}

/// Compression codec for Zarr arrays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ZarrCompression {
    None,
    BloscLz4,
    #[default]
    BloscZstd,
}

impl ZarrCompression {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::BloscLz4 => "blosc_lz4",
            Self::BloscZstd => "blosc_zstd",
        }
    }
}

/// Chunking and compression of written arrays.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ZarrSettings {
    /// Chunk edge along the projected x/y axes; other axes are chunked by 1.
    pub chunk_size: usize,
    pub compression: ZarrCompression,
    /// Compression level (1-9).
    pub compression_level: u8,
    pub shuffle: bool,
}

impl Default for ZarrSettings {
    fn default() -> Self {
        Self {
            chunk_size: 512,
            compression: ZarrCompression::BloscZstd,
            compression_level: 1,
            shuffle: true,
        }
    }
}

impl ZarrSettings {
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.chunk_size == 0 {
            return Err("zarr chunk_size must be > 0".to_string());
        }
        if self.compression_level == 0 || self.compression_level > 9 {
            return Err("zarr compression_level must be 1-9".to_string());
        }
        Ok(())
    }
}

/// Writer for Zarr V3 groups.
#[derive(Debug, Clone, Default)]
pub struct ZarrWriter {
    settings: ZarrSettings,
}

impl ZarrWriter {
    pub fn new(settings: ZarrSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &ZarrSettings {
        &self.settings
    }

    /// Root group metadata for a field.
    pub fn group_metadata(field: &GridField) -> Result<Bytes> {
        let mut attrs: serde_json::Map<String, serde_json::Value> = field
            .attributes
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        if let Some(t) = field.forecast_reference_time {
            attrs.insert(
                "forecast_reference_time".to_string(),
                serde_json::json!(t.to_rfc3339()),
            );
        }
        if let Some(t) = field.valid_time {
            attrs.insert("valid_time".to_string(), serde_json::json!(t.to_rfc3339()));
        }

        let doc = serde_json::json!({
            "zarr_format": 3,
            "node_type": "group",
            "attributes": attrs,
        });
        let bytes = serde_json::to_vec_pretty(&doc)
            .map_err(|e| IngestionError::ZarrWrite(e.to_string()))?;
        Ok(Bytes::from(bytes))
    }

    fn write_data_array<S: ReadableStorageTraits + WritableStorageTraits + 'static>(
        &self,
        store: Arc<S>,
        field: &GridField,
    ) -> Result<()> {
        let shape: Vec<u64> = field.shape().iter().map(|n| *n as u64).collect();
        let chunk_shape: Vec<u64> = field
            .dims
            .iter()
            .map(|d| {
                if d.name == X_DIM || d.name == Y_DIM {
                    d.len.min(self.settings.chunk_size).max(1) as u64
                } else {
                    1
                }
            })
            .collect();

        let mut attrs = serde_json::Map::new();
        attrs.insert(
            ARRAY_DIMENSIONS_ATTR.to_string(),
            serde_json::json!(field.dims.iter().map(|d| d.name.as_str()).collect::<Vec<_>>()),
        );
        if let Some(units) = &field.units {
            attrs.insert("units".to_string(), serde_json::json!(units));
        }

        let chunk_grid: zarrs::array::ChunkGrid = chunk_shape
            .try_into()
            .map_err(|e| IngestionError::ZarrWrite(format!("{:?}", e)))?;

        let mut binding = ArrayBuilder::new(
            shape.clone(),
            DataType::Float32,
            chunk_grid,
            FillValue::from(f32::NAN),
        );
        let mut builder = binding.attributes(attrs);
        if let Some(codec) = self.compression_codec(4)? {
            builder = builder.bytes_to_bytes_codecs(vec![codec]);
        }

        let array = builder
            .build(store, &format!("/{}", field.variable_name))
            .map_err(|e| IngestionError::ZarrWrite(e.to_string()))?;
        array
            .store_metadata()
            .map_err(|e| IngestionError::ZarrWrite(e.to_string()))?;

        let subset = ArraySubset::new_with_start_shape(vec![0; shape.len()], shape)
            .map_err(|e| IngestionError::ZarrWrite(e.to_string()))?;
        array
            .store_array_subset_elements(&subset, &field.values)
            .map_err(|e| IngestionError::ZarrWrite(e.to_string()))?;

        Ok(())
    }

    fn write_coordinate<S: ReadableStorageTraits + WritableStorageTraits + 'static>(
        &self,
        store: Arc<S>,
        name: &str,
        values: &[f64],
    ) -> Result<()> {
        let len = values.len() as u64;
        let chunk_grid: zarrs::array::ChunkGrid = vec![len.max(1)]
            .try_into()
            .map_err(|e| IngestionError::ZarrWrite(format!("{:?}", e)))?;

        let mut attrs = serde_json::Map::new();
        attrs.insert(ARRAY_DIMENSIONS_ATTR.to_string(), serde_json::json!([name]));

        let array = ArrayBuilder::new(vec![len], DataType::Float64, chunk_grid, FillValue::from(f64::NAN))
            .attributes(attrs)
            .build(store, &format!("/{}", name))
            .map_err(|e| IngestionError::ZarrWrite(e.to_string()))?;
        array
            .store_metadata()
            .map_err(|e| IngestionError::ZarrWrite(e.to_string()))?;

        let subset = ArraySubset::new_with_start_shape(vec![0], vec![len])
            .map_err(|e| IngestionError::ZarrWrite(e.to_string()))?;
        array
            .store_array_subset_elements(&subset, values)
            .map_err(|e| IngestionError::ZarrWrite(e.to_string()))?;

        Ok(())
    }

    fn compression_codec(
        &self,
        typesize: usize,
    ) -> Result<Option<Arc<dyn zarrs::array::codec::BytesToBytesCodecTraits>>> {
        let compressor = match self.settings.compression {
            ZarrCompression::None => return Ok(None),
            ZarrCompression::BloscLz4 => BloscCompressor::LZ4,
            ZarrCompression::BloscZstd => BloscCompressor::Zstd,
        };
        let level = BloscCompressionLevel::try_from(self.settings.compression_level)
            .map_err(|_| IngestionError::InvalidConfig("Invalid compression level".to_string()))?;

        // typesize is required when shuffle is enabled
        let (shuffle, typesize) = if self.settings.shuffle {
            (BloscShuffleMode::Shuffle, Some(typesize))
        } else {
            (BloscShuffleMode::NoShuffle, None)
        };

        let codec = BloscCodec::new(compressor, level, None, shuffle, typesize)
            .map_err(|e| IngestionError::InvalidConfig(e.to_string()))?;
        Ok(Some(Arc::new(codec)))
    }
}

impl DatasetEncoder for ZarrWriter {
    fn encode(&self, field: &GridField, root: &Path) -> Result<Bytes> {
        if field.dims.iter().any(|d| d.name == field.variable_name) {
            return Err(IngestionError::ZarrWrite(format!(
                "variable '{}' clashes with a dimension name",
                field.variable_name
            )));
        }

        std::fs::create_dir_all(root)?;
        let store = Arc::new(
            FilesystemStore::new(root).map_err(|e| IngestionError::ZarrWrite(e.to_string()))?,
        );

        self.write_data_array(store.clone(), field)?;
        for dim in &field.dims {
            if let Some(coords) = &dim.coords {
                self.write_coordinate(store.clone(), &dim.name, coords)?;
            }
        }

        Self::group_metadata(field)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use nwp_common::grid::HEIGHT_DIM;
    use nwp_common::Dimension;

    fn field() -> GridField {
        let t = Utc.with_ymd_and_hms(2020, 7, 16, 14, 0, 0).unwrap();
        GridField::new(
            "wind_speed",
            vec![
                Dimension::with_coords(HEIGHT_DIM, vec![10.0, 50.0]),
                Dimension::with_coords(Y_DIM, vec![0.0, 2000.0, 4000.0]),
                Dimension::with_coords(X_DIM, vec![0.0, 2000.0, 4000.0, 6000.0]),
            ],
            (0..24).map(|v| v as f32).collect(),
        )
        .unwrap()
        .with_units("m s-1")
        .with_times(t, t)
    }

    fn read_json(path: &Path) -> serde_json::Value {
        serde_json::from_slice(&std::fs::read(path).unwrap()).unwrap()
    }

    #[test]
    fn test_encode_writes_arrays_but_not_root() {
        let temp_dir = tempfile::tempdir().unwrap();
        let root = temp_dir.path().join("out.zarr");

        let commit = ZarrWriter::default().encode(&field(), &root).unwrap();

        assert!(!root.join("zarr.json").exists());
        let data_meta = read_json(&root.join("wind_speed").join("zarr.json"));
        assert_eq!(data_meta["shape"], serde_json::json!([2, 3, 4]));
        assert_eq!(
            data_meta["attributes"][ARRAY_DIMENSIONS_ATTR],
            serde_json::json!([HEIGHT_DIM, Y_DIM, X_DIM])
        );
        assert_eq!(data_meta["attributes"]["units"], "m s-1");
        for coord in [HEIGHT_DIM, Y_DIM, X_DIM] {
            assert!(root.join(coord).join("zarr.json").exists(), "{coord}");
        }

        let group: serde_json::Value = serde_json::from_slice(&commit).unwrap();
        assert_eq!(group["zarr_format"], 3);
        assert_eq!(group["node_type"], "group");
        assert_eq!(
            group["attributes"]["forecast_reference_time"],
            "2020-07-16T14:00:00+00:00"
        );
    }

    #[test]
    fn test_encode_uncompressed() {
        let temp_dir = tempfile::tempdir().unwrap();
        let writer = ZarrWriter::new(ZarrSettings {
            compression: ZarrCompression::None,
            chunk_size: 2,
            ..Default::default()
        });
        writer.encode(&field(), temp_dir.path()).unwrap();

        let data_meta = read_json(&temp_dir.path().join("wind_speed").join("zarr.json"));
        assert_eq!(
            data_meta["chunk_grid"]["configuration"]["chunk_shape"],
            serde_json::json!([1, 2, 2])
        );
    }

    #[test]
    fn test_settings_validate() {
        assert!(ZarrSettings::default().validate().is_ok());
        let bad = ZarrSettings {
            compression_level: 0,
            ..Default::default()
        };
        assert!(bad.validate().is_err());
    }
}
