//! Post-publication hook writing PV forecasts to object storage.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use tracing::info;

use ingestion::{AvailabilityRecord, PublishHook};
use nwp_common::GridField;
use storage::ObjectStorage;

use crate::error::{ForecastError, ForecastResult};
use crate::model::PvModel;
use crate::predict::predict_as_geojson;

/// Writes `<results_prefix>/<creation time>.geojson` for each new
/// irradiance dataset.
pub struct PvForecastHook {
    model: PvModel,
    storage: ObjectStorage,
    results_prefix: String,
}

impl PvForecastHook {
    pub fn new(model: PvModel, storage: ObjectStorage, results_prefix: impl Into<String>) -> Self {
        Self {
            model,
            storage,
            results_prefix: results_prefix.into(),
        }
    }

    /// Key of the forecast created at `created`.
    pub fn result_key(&self, created: DateTime<Utc>) -> String {
        let name = format!("{}.geojson", created.format("%Y-%m-%dT%H:%M:%SZ"));
        let prefix = self.results_prefix.trim_matches('/');
        if prefix.is_empty() {
            name
        } else {
            format!("{}/{}", prefix, name)
        }
    }

    /// Predict from `dataset` and write the result, returning its key.
    pub async fn write_forecast(&self, dataset: &GridField, created: DateTime<Utc>) -> ForecastResult<String> {
        let collection = predict_as_geojson(dataset, &self.model, created)?;
        let key = self.result_key(created);
        self.storage
            .put(&key, Bytes::from(collection.to_string()))
            .await
            .map_err(|e| ForecastError::Output(e.to_string()))?;
        Ok(key)
    }
}

#[async_trait]
impl PublishHook for PvForecastHook {
    async fn on_published(&self, record: &AvailabilityRecord, dataset: &GridField) -> anyhow::Result<()> {
        let key = self.write_forecast(dataset, Utc::now()).await?;
        info!(
            variable = %record.variable_name,
            systems = self.model.len(),
            path = %key,
            "Wrote PV forecast"
        );
        Ok(())
    }
}
