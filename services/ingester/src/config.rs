//! Ingester configuration.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

use ingestion::zarr::ZarrSettings;
use ingestion::{DesiredField, DesiredFieldCatalog, PipelineSettings, PublishMode, SubsetSpec};
use nwp_common::BoundingBox;
use storage::{ObjectStorageConfig, ReceiveRequest};

/// Queue the notifications arrive on.
pub const DEFAULT_QUEUE_URL: &str = "https://sqs.eu-west-1.amazonaws.com/741607616921/uk-metoffice-nwp";

/// Bucket datasets are published to.
pub const DEFAULT_DEST_BUCKET: &str = "uk-metoffice-nwp";

pub const DEFAULT_REGION: &str = "eu-west-1";

/// Variables copied when no catalog is configured.
pub const DEFAULT_VARIABLES: [&str; 8] = [
    "wind_speed",
    "wind_speed_of_gust",
    "wind_from_direction",
    "air_temperature",
    "surface_diffusive_downwelling_shortwave_flux_in_air",
    "surface_direct_downwelling_shortwave_flux_in_air",
    "surface_downwelling_shortwave_flux_in_air",
    "surface_temperature",
];

/// Top-level ingester configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngesterConfig {
    pub queue: QueueConfig,

    /// Connection settings for source buckets (bucket comes from each message)
    pub source: ObjectStorageConfig,

    pub destination: DestinationConfig,

    /// Fields to ingest, with optional required heights
    pub catalog: Vec<DesiredField>,

    /// Receive count above which a message is dropped unprocessed
    pub max_receive_count: u32,

    pub subset: SubsetConfig,

    pub zarr: ZarrSettings,

    /// Acknowledge (and log) envelopes that fail integrity or parsing
    pub quarantine_invalid_envelopes: bool,

    /// Seconds to wait after a failed cycle
    pub error_backoff_secs: u64,

    /// PV forecast triggered by new irradiance data
    pub forecast: Option<ForecastConfig>,

    pub metrics: MetricsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    pub url: String,
    pub region: String,
    /// Messages per receive (1-10)
    pub max_messages: i32,
    /// Long-poll wait (0-20 s)
    pub wait_time_secs: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_QUEUE_URL.to_string(),
            region: DEFAULT_REGION.to_string(),
            max_messages: 10,
            wait_time_secs: 20,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DestinationConfig {
    pub storage: ObjectStorageConfig,
    /// Prefix of every published key
    pub base_path: String,
    /// Commit datasets with write-if-absent
    pub conditional_writes: bool,
}

impl Default for DestinationConfig {
    fn default() -> Self {
        Self {
            storage: ObjectStorageConfig::default().for_bucket(DEFAULT_DEST_BUCKET),
            base_path: String::new(),
            conditional_writes: false,
        }
    }
}

impl DestinationConfig {
    pub fn publish_mode(&self) -> PublishMode {
        if self.conditional_writes {
            PublishMode::Conditional
        } else {
            PublishMode::CheckThenWrite
        }
    }
}

/// Compass bounds in the source grid's projection (m).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundsConfig {
    pub north: f64,
    pub south: f64,
    pub east: f64,
    pub west: f64,
}

impl BoundsConfig {
    /// Approximate UKV domain projected into MOGREPS-UK's Lambert Azimuthal
    /// Equal Area grid.
    pub fn ukv() -> Self {
        Self {
            north: 668920.2182797253,
            south: -742783.9449856092,
            east: 494613.07597373443,
            west: -611744.985010537,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SubsetConfig {
    pub height_meters: Option<Vec<f64>>,
    pub bounds: Option<BoundsConfig>,
}

impl Default for SubsetConfig {
    fn default() -> Self {
        Self {
            height_meters: Some(vec![10.0, 50.0, 100.0, 150.0]),
            bounds: Some(BoundsConfig::ukv()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForecastConfig {
    /// Variable whose publication triggers a forecast
    #[serde(default = "default_trigger_variable")]
    pub trigger_variable: String,
    /// Local path of the model CSV (`~` is expanded)
    pub model_path: String,
    /// Key prefix of written forecasts
    #[serde(default = "default_results_prefix")]
    pub results_prefix: String,
    /// Results bucket; defaults to the destination bucket
    #[serde(default)]
    pub results_bucket: Option<String>,
}

fn default_trigger_variable() -> String {
    "surface_downwelling_shortwave_flux_in_air".to_string()
}

fn default_results_prefix() -> String {
    "pv_predictions".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub port: u16,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: 9090,
        }
    }
}

impl Default for IngesterConfig {
    fn default() -> Self {
        Self {
            queue: QueueConfig::default(),
            source: ObjectStorageConfig::default(),
            destination: DestinationConfig::default(),
            catalog: DEFAULT_VARIABLES.iter().map(|n| DesiredField::any_level(*n)).collect(),
            max_receive_count: ingestion::catalog::DEFAULT_MAX_RECEIVE_COUNT,
            subset: SubsetConfig::default(),
            zarr: ZarrSettings::default(),
            quarantine_invalid_envelopes: true,
            error_backoff_secs: 5,
            forecast: None,
            metrics: MetricsConfig::default(),
        }
    }
}

impl IngesterConfig {
    /// Load configuration from environment variables (fallback when no
    /// config file exists).
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(url) = env::var("QUEUE_URL").or_else(|_| env::var("SQS_URL")) {
            config.queue.url = url;
        }
        if let Ok(region) = env::var("AWS_REGION") {
            config.queue.region = region.clone();
            config.source.region = region.clone();
            config.destination.storage.region = region;
        }
        if let Ok(bucket) = env::var("DEST_BUCKET") {
            config.destination.storage.bucket = bucket;
        }
        if let Ok(base_path) = env::var("DEST_BASE_PATH") {
            config.destination.base_path = base_path;
        }
        if let Ok(val) = env::var("CONDITIONAL_WRITES") {
            config.destination.conditional_writes = parse_bool(&val);
        }
        if let Ok(val) = env::var("MAX_RECEIVE_COUNT") {
            config.max_receive_count = val
                .parse()
                .with_context(|| format!("Invalid MAX_RECEIVE_COUNT: {}", val))?;
        }
        if let Ok(val) = env::var("QUARANTINE_INVALID_ENVELOPES") {
            config.quarantine_invalid_envelopes = parse_bool(&val);
        }
        if let Ok(model_path) = env::var("PV_MODEL_PATH") {
            config.forecast = Some(ForecastConfig {
                trigger_variable: default_trigger_variable(),
                model_path: shellexpand::tilde(&model_path).into_owned(),
                results_prefix: env::var("PV_RESULTS_PREFIX").unwrap_or_else(|_| default_results_prefix()),
                results_bucket: env::var("PV_RESULTS_BUCKET").ok(),
            });
        }
        if let Ok(port) = env::var("METRICS_PORT") {
            config.metrics.enabled = true;
            config.metrics.port = port
                .parse()
                .with_context(|| format!("Invalid METRICS_PORT: {}", port))?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Check the configuration for values the pipeline cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.queue.url.is_empty() {
            bail!("queue.url must be set");
        }
        if !(1..=10).contains(&self.queue.max_messages) {
            bail!("queue.max_messages must be 1-10, got {}", self.queue.max_messages);
        }
        if self.queue.wait_time_secs > 20 {
            bail!("queue.wait_time_secs must be at most 20, got {}", self.queue.wait_time_secs);
        }
        if self.destination.storage.bucket.is_empty() {
            bail!("destination.storage.bucket must be set");
        }
        if self.catalog.is_empty() {
            bail!("catalog must list at least one field");
        }
        if self.max_receive_count == 0 {
            bail!("max_receive_count must be > 0");
        }
        if let Some(b) = &self.subset.bounds {
            BoundingBox::from_bounds(b.north, b.south, b.east, b.west)
                .map_err(|e| anyhow::anyhow!("subset.bounds: {}", e))?;
        }
        self.zarr.validate().map_err(|e| anyhow::anyhow!(e))?;
        if let Some(forecast) = &self.forecast {
            if forecast.model_path.is_empty() {
                bail!("forecast.model_path must be set");
            }
        }
        Ok(())
    }

    pub fn desired_fields(&self) -> DesiredFieldCatalog {
        DesiredFieldCatalog::from_fields(&self.catalog)
    }

    pub fn subset_spec(&self) -> Result<SubsetSpec> {
        let bbox = self
            .subset
            .bounds
            .map(|b| BoundingBox::from_bounds(b.north, b.south, b.east, b.west))
            .transpose()
            .map_err(|e| anyhow::anyhow!("subset.bounds: {}", e))?;
        Ok(SubsetSpec::new(self.subset.height_meters.clone(), bbox))
    }

    pub fn pipeline_settings(&self) -> PipelineSettings {
        PipelineSettings {
            max_receive_count: self.max_receive_count,
            receive: ReceiveRequest {
                max_messages: self.queue.max_messages,
                wait_time: Duration::from_secs(self.queue.wait_time_secs),
            },
            base_path: self.destination.base_path.clone(),
            trigger_variable: self.forecast.as_ref().map(|f| f.trigger_variable.clone()),
            quarantine_invalid_envelopes: self.quarantine_invalid_envelopes,
            error_backoff: Duration::from_secs(self.error_backoff_secs),
        }
    }
}

fn parse_bool(val: &str) -> bool {
    val.eq_ignore_ascii_case("true") || val == "1"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = IngesterConfig::default();
        config.validate().unwrap();

        assert_eq!(config.catalog.len(), 8);
        assert_eq!(config.max_receive_count, 10);
        assert_eq!(config.destination.storage.bucket, DEFAULT_DEST_BUCKET);
        assert_eq!(config.destination.publish_mode(), PublishMode::CheckThenWrite);
    }

    #[test]
    fn test_subset_spec_from_bounds() {
        let spec = IngesterConfig::default().subset_spec().unwrap();
        let bbox = spec.bbox.unwrap();
        assert_eq!(bbox.north(), 668920.2182797253);
        assert_eq!(bbox.west(), -611744.985010537);
        assert_eq!(spec.height_meters, Some(vec![10.0, 50.0, 100.0, 150.0]));
    }

    #[test]
    fn test_inverted_bounds_rejected() {
        let mut config = IngesterConfig::default();
        config.subset.bounds = Some(BoundsConfig {
            north: -1.0,
            south: 1.0,
            east: 1.0,
            west: -1.0,
        });
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_pipeline_settings_carry_trigger() {
        let mut config = IngesterConfig::default();
        assert_eq!(config.pipeline_settings().trigger_variable, None);

        config.forecast = Some(ForecastConfig {
            trigger_variable: default_trigger_variable(),
            model_path: "model.csv".to_string(),
            results_prefix: default_results_prefix(),
            results_bucket: None,
        });
        let settings = config.pipeline_settings();
        assert_eq!(
            settings.trigger_variable.as_deref(),
            Some("surface_downwelling_shortwave_flux_in_air")
        );
        assert_eq!(settings.receive.wait_time, Duration::from_secs(20));
    }
}
