//! Conversion of a fetched payload into the field to publish.

use bytes::Bytes;
use tracing::warn;

use nwp_common::GridField;

use crate::error::{IngestionError, Result};
use crate::message::AvailabilityRecord;
use crate::subset::{self, SubsetSpec};

/// Decodes and reduces one source payload.
///
/// Implementations are blocking and are run off the async runtime.
pub trait DatasetTransform: Send + Sync {
    fn transform(&self, record: &AvailabilityRecord, payload: Bytes) -> Result<GridField>;
}

/// NetCDF decoding followed by subsetting.
#[derive(Debug, Clone, Default)]
pub struct NetCdfTransform {
    subset: SubsetSpec,
}

impl NetCdfTransform {
    pub fn new(subset: SubsetSpec) -> Self {
        Self { subset }
    }
}

impl DatasetTransform for NetCdfTransform {
    fn transform(&self, record: &AvailabilityRecord, payload: Bytes) -> Result<GridField> {
        let field = netcdf_parser::decode_field(&payload, Some(&record.variable_name))?;
        finish(record, field, &self.subset)
    }
}

/// Subset a decoded field and stamp it with the record's times.
///
/// A field for a different variable than the record names is rejected, so
/// the message stays on the queue rather than publishing the wrong array.
pub fn finish(record: &AvailabilityRecord, field: GridField, spec: &SubsetSpec) -> Result<GridField> {
    if field.variable_name != record.variable_name {
        return Err(IngestionError::Decode(format!(
            "decoded variable '{}' but notification names '{}'",
            field.variable_name, record.variable_name
        )));
    }
    if let Some(t) = field.valid_time {
        if t != record.valid_time {
            warn!(file = %t, notification = %record.valid_time, "Valid time mismatch");
        }
    }
    if let Some(t) = field.forecast_reference_time {
        if t != record.forecast_reference_time {
            warn!(
                file = %t,
                notification = %record.forecast_reference_time,
                "Forecast reference time mismatch"
            );
        }
    }

    let subset = subset::apply(&field, spec)?;
    Ok(subset.with_times(record.forecast_reference_time, record.valid_time))
}
