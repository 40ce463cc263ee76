//! NWP ingester service.
//!
//! Polls the availability-notification queue and publishes subsetted Zarr
//! datasets for the wanted Met Office NWP extracts.

mod clients;
mod config;
mod config_loader;

use anyhow::{Context, Result};
use clap::Parser;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use clients::AwsClientFactory;
use config::IngesterConfig;
use ingestion::{evaluate, parse_envelope, NetCdfTransform, Pipeline, PublicationTarget, ZarrWriter};
use pv_forecast::{PvForecastHook, PvModel};
use storage::{ObjectStorage, QueueMessage};

#[derive(Parser, Debug)]
#[command(name = "ingester")]
#[command(about = "Ingests NWP availability notifications into Zarr datasets")]
struct Args {
    /// Configuration file path (falls back to the environment if missing)
    #[arg(short, long, env = "INGESTER_CONFIG", default_value = "/etc/ingester/config.yaml")]
    config: String,

    /// Run a single poll cycle and exit
    #[arg(long)]
    once: bool,

    /// Parse a captured queue message (JSON) and report what would happen
    #[arg(long)]
    check_message: Option<String>,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    // Initialize tracing
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .with_thread_ids(true)
        .json()
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    let config = load_config(&args.config)?;

    if let Some(path) = &args.check_message {
        return check_message(&config, path);
    }

    info!("Starting NWP ingester");

    if config.metrics.enabled {
        metrics_exporter_prometheus::PrometheusBuilder::new()
            .with_http_listener(([0, 0, 0, 0], config.metrics.port))
            .install()
            .context("Failed to install Prometheus exporter")?;
        info!(port = config.metrics.port, "Prometheus metrics exporter listening");
    }

    netcdf_parser::silence_hdf5_errors();

    let pipeline = build_pipeline(&config)?;

    if args.once {
        info!("Running single poll cycle");
        let report = pipeline.run_once().await?;
        info!(?report, "Cycle complete");
        return Ok(());
    }

    let (shutdown_tx, _) = tokio::sync::broadcast::channel::<()>(1);
    let signal_tx = shutdown_tx.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for shutdown signal");
            return;
        }
        info!("Received shutdown signal, finishing current message");
        let _ = signal_tx.send(());
    });

    info!(queue = %config.queue.url, "Starting continuous polling");
    pipeline.run_forever(shutdown_tx.subscribe()).await?;

    info!("Ingester stopped");
    Ok(())
}

fn load_config(path: &str) -> Result<IngesterConfig> {
    let config = if Path::new(path).exists() {
        let config = config_loader::load_config(path)?;
        info!(path, "Loaded configuration file");
        config
    } else {
        let config = IngesterConfig::from_env()?;
        info!(path, "Config file not found, using environment");
        config
    };

    info!(
        fields = config.catalog.len(),
        destination = %config.destination.storage.bucket,
        base_path = %config.destination.base_path,
        forecast = config.forecast.is_some(),
        "Configuration ready"
    );
    Ok(config)
}

fn build_pipeline(config: &IngesterConfig) -> Result<Pipeline> {
    let encoder = Arc::new(ZarrWriter::new(config.zarr.clone()));
    let factory = AwsClientFactory::new(config.clone(), encoder);
    let transform = NetCdfTransform::new(config.subset_spec()?);

    let mut pipeline = Pipeline::new(
        config.pipeline_settings(),
        Arc::new(config.desired_fields()),
        Arc::new(factory),
        Arc::new(transform),
    );

    if let Some(forecast) = &config.forecast {
        let model = PvModel::load(Path::new(&forecast.model_path))
            .with_context(|| format!("Failed to load PV model {}", forecast.model_path))?;
        let bucket = forecast
            .results_bucket
            .as_deref()
            .unwrap_or(&config.destination.storage.bucket);
        let storage = ObjectStorage::new(&config.destination.storage.for_bucket(bucket))?;

        info!(
            systems = model.len(),
            trigger = %forecast.trigger_variable,
            "PV forecast enabled"
        );
        pipeline = pipeline.with_hook(Arc::new(PvForecastHook::new(
            model,
            storage,
            forecast.results_prefix.clone(),
        )));
    }

    Ok(pipeline)
}

/// Dry run of the envelope parser and wantedness filter on a saved message.
fn check_message(config: &IngesterConfig, path: &str) -> Result<()> {
    let content =
        std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path))?;
    let message: QueueMessage = serde_json::from_str(&content)?;

    let record = parse_envelope(&message)?;
    let wantedness = evaluate(&record, &config.desired_fields(), config.max_receive_count);
    let target = PublicationTarget::for_record(&record, &config.destination.base_path);

    println!("record:      {}", record);
    println!("source:      {}", record.source_url());
    println!("wantedness:  {}", wantedness.as_str());
    println!("destination: {}", target.key());
    Ok(())
}
