//! The polling loop that turns queue notifications into published datasets.
//!
//! Each cycle connects fresh clients, receives one batch and handles its
//! messages strictly in order. A message is acknowledged when it is not
//! wanted, when its dataset is published, or when the dataset already
//! existed; anything else leaves it on the queue for redelivery.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use metrics::{counter, histogram};
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use nwp_common::GridField;
use storage::{MessageQueue, QueueMessage, ReceiveRequest};

use crate::catalog::{evaluate, DesiredFieldCatalog, Wantedness, DEFAULT_MAX_RECEIVE_COUNT};
use crate::error::{IngestionError, Result};
use crate::hook::PublishHook;
use crate::message::{parse_envelope, AvailabilityRecord};
use crate::publisher::{Publication, Publisher};
use crate::source::SourceFetcher;
use crate::target::PublicationTarget;
use crate::timer::Timer;
use crate::transform::DatasetTransform;

/// Tunables of the ingestion loop.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub max_receive_count: u32,
    pub receive: ReceiveRequest,
    /// Prefix of every destination key
    pub base_path: String,
    /// Variable whose fresh publication invokes the hook
    pub trigger_variable: Option<String>,
    /// Acknowledge envelopes that fail integrity or parsing instead of
    /// failing the cycle
    pub quarantine_invalid_envelopes: bool,
    /// Pause after a failed cycle
    pub error_backoff: Duration,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            max_receive_count: DEFAULT_MAX_RECEIVE_COUNT,
            receive: ReceiveRequest::default(),
            base_path: String::new(),
            trigger_variable: None,
            quarantine_invalid_envelopes: true,
            error_backoff: Duration::from_secs(5),
        }
    }
}

/// Client handles used for one polling cycle.
#[derive(Clone)]
pub struct CycleClients {
    pub queue: Arc<dyn MessageQueue>,
    pub source: Arc<dyn SourceFetcher>,
    pub publisher: Publisher,
}

/// Creates the clients for each cycle.
#[async_trait]
pub trait ClientFactory: Send + Sync {
    async fn connect(&self) -> Result<CycleClients>;
}

/// Reuses the same handles every cycle.
#[async_trait]
impl ClientFactory for CycleClients {
    async fn connect(&self) -> Result<CycleClients> {
        Ok(self.clone())
    }
}

/// A dataset that this worker wrote.
#[derive(Debug, Clone)]
pub struct PublishedDataset {
    pub record: AvailabilityRecord,
    pub publication: Publication,
    pub dataset: Arc<GridField>,
}

/// What happened to one message.
#[derive(Debug, Clone)]
pub enum ProcessingOutcome {
    NotWanted(Wantedness),
    AlreadyPublished(String),
    Published(Box<PublishedDataset>),
    /// Left on the queue for redelivery
    Failed(String),
    /// Unreadable envelope, dropped from the queue
    Quarantined(String),
}

impl ProcessingOutcome {
    /// Whether the message should be deleted from the queue.
    pub fn should_ack(&self) -> bool {
        !matches!(self, ProcessingOutcome::Failed(_))
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessingOutcome::NotWanted(_) => "not_wanted",
            ProcessingOutcome::AlreadyPublished(_) => "already_published",
            ProcessingOutcome::Published(_) => "published",
            ProcessingOutcome::Failed(_) => "failed",
            ProcessingOutcome::Quarantined(_) => "quarantined",
        }
    }
}

/// Counts for one polling cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub received: usize,
    pub not_wanted: usize,
    pub already_published: usize,
    pub published: usize,
    pub failed: usize,
    pub quarantined: usize,
    pub acknowledged: usize,
}

impl CycleReport {
    fn record(&mut self, outcome: &ProcessingOutcome) {
        match outcome {
            ProcessingOutcome::NotWanted(_) => self.not_wanted += 1,
            ProcessingOutcome::AlreadyPublished(_) => self.already_published += 1,
            ProcessingOutcome::Published(_) => self.published += 1,
            ProcessingOutcome::Failed(_) => self.failed += 1,
            ProcessingOutcome::Quarantined(_) => self.quarantined += 1,
        }
    }
}

/// The ingestion loop.
pub struct Pipeline {
    settings: PipelineSettings,
    catalog: Arc<DesiredFieldCatalog>,
    factory: Arc<dyn ClientFactory>,
    transform: Arc<dyn DatasetTransform>,
    hook: Option<Arc<dyn PublishHook>>,
}

impl Pipeline {
    pub fn new(
        settings: PipelineSettings,
        catalog: Arc<DesiredFieldCatalog>,
        factory: Arc<dyn ClientFactory>,
        transform: Arc<dyn DatasetTransform>,
    ) -> Self {
        Self {
            settings,
            catalog,
            factory,
            transform,
            hook: None,
        }
    }

    /// Install the post-publication hook.
    pub fn with_hook(mut self, hook: Arc<dyn PublishHook>) -> Self {
        self.hook = Some(hook);
        self
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// Run cycles until a shutdown signal arrives.
    ///
    /// Connection and polling failures are logged and retried after a
    /// back-off. An invalid envelope ends the loop with an error only when
    /// quarantine is disabled.
    pub async fn run_forever(&self, mut shutdown: broadcast::Receiver<()>) -> Result<()> {
        info!(
            variables = self.catalog.len(),
            max_receive_count = self.settings.max_receive_count,
            "Starting ingestion loop"
        );

        loop {
            match self.run_once().await {
                Ok(report) => debug!(?report, "Cycle complete"),
                Err(e) if e.is_envelope_error() => return Err(e),
                Err(e) => {
                    error!(error = %e, "Ingestion cycle failed");
                    counter!("ingester_cycle_errors_total").increment(1);
                    tokio::select! {
                        _ = shutdown.recv() => break,
                        _ = tokio::time::sleep(self.settings.error_backoff) => {}
                    }
                }
            }

            if !matches!(shutdown.try_recv(), Err(broadcast::error::TryRecvError::Empty)) {
                break;
            }
        }

        info!("Shutting down ingestion loop");
        Ok(())
    }

    /// Run a single polling cycle.
    pub async fn run_once(&self) -> Result<CycleReport> {
        let clients = self.factory.connect().await?;
        let messages = clients.queue.receive(&self.settings.receive).await?;

        let mut report = CycleReport {
            received: messages.len(),
            ..Default::default()
        };
        if messages.is_empty() {
            info!("No more queue messages");
            return Ok(report);
        }

        let num_messages = messages.len();
        info!("{} queue messages received", num_messages);
        counter!("ingester_messages_received_total").increment(num_messages as u64);

        for (i, message) in messages.iter().enumerate() {
            let timer = Timer::start();
            let outcome = self
                .process_message(&clients, message, i + 1, num_messages)
                .await?;
            report.record(&outcome);

            if outcome.should_ack() {
                match acknowledge(clients.queue.as_ref(), message).await {
                    Ok(()) => report.acknowledged += 1,
                    Err(e) => {
                        error!(message_id = %message.message_id, error = %e, "Failed to delete message")
                    }
                }
            }

            if let ProcessingOutcome::Published(published) = &outcome {
                self.trigger_hook(published).await;
            }

            counter!("ingester_messages_processed_total", "outcome" => outcome.as_str()).increment(1);
            histogram!("ingester_message_duration_seconds").record(timer.total().as_secs_f64());
            info!(
                outcome = outcome.as_str(),
                elapsed_ms = timer.elapsed_ms(),
                "Message finished"
            );
        }

        Ok(report)
    }

    /// Decide what to do with one message and carry it out, short of
    /// acknowledging it.
    ///
    /// Returns an error only for an invalid envelope with quarantine
    /// disabled.
    pub async fn process_message(
        &self,
        clients: &CycleClients,
        message: &QueueMessage,
        position: usize,
        batch_size: usize,
    ) -> Result<ProcessingOutcome> {
        let record = match parse_envelope(message) {
            Ok(record) => record,
            Err(e) if self.settings.quarantine_invalid_envelopes => {
                error!(message_id = %message.message_id, error = %e, "Quarantining invalid message");
                return Ok(ProcessingOutcome::Quarantined(e.to_string()));
            }
            Err(e) => return Err(e),
        };

        info!("Loading message {}/{}: {}", position, batch_size, record);

        let wantedness = evaluate(&record, &self.catalog, self.settings.max_receive_count);
        if !wantedness.is_wanted() {
            info!(reason = wantedness.as_str(), "Message not wanted.");
            return Ok(ProcessingOutcome::NotWanted(wantedness));
        }

        info!("Message is wanted! Loading NetCDF file...");
        let outcome = match self.ingest(clients, &record).await {
            Ok((publication, dataset)) => {
                info!(dest_url = %publication.target, "SUCCESS!");
                ProcessingOutcome::Published(Box::new(PublishedDataset {
                    record,
                    publication,
                    dataset,
                }))
            }
            Err(IngestionError::AlreadyPublished(key)) => {
                warn!(dest_url = %key, "Destination already exists, skipping");
                ProcessingOutcome::AlreadyPublished(key)
            }
            Err(e) => {
                error!(message_id = %record.message_id, error = %e, "Failed to process message");
                ProcessingOutcome::Failed(e.to_string())
            }
        };
        Ok(outcome)
    }

    async fn ingest(
        &self,
        clients: &CycleClients,
        record: &AvailabilityRecord,
    ) -> Result<(Publication, Arc<GridField>)> {
        let mut timer = Timer::start();
        let target = PublicationTarget::for_record(record, &self.settings.base_path);

        // Skip the download when the dataset is already complete.
        if clients.publisher.exists(&target).await? {
            return Err(IngestionError::AlreadyPublished(target.key().to_string()));
        }

        let payload = clients.source.fetch(&record.source_location).await?;
        timer.tick("Fetching source object");

        let transform = self.transform.clone();
        let owned = record.clone();
        let field = tokio::task::spawn_blocking(move || transform.transform(&owned, payload))
            .await
            .map_err(|e| IngestionError::Decode(format!("decode task failed: {}", e)))??;
        timer.tick("Decoding & subsetting");

        let field = Arc::new(field);
        let publication = clients.publisher.publish(field.clone(), &target).await?;
        timer.tick("Compressing & writing Zarr");

        Ok((publication, field))
    }

    async fn trigger_hook(&self, published: &PublishedDataset) {
        let (Some(hook), Some(trigger)) = (&self.hook, &self.settings.trigger_variable) else {
            return;
        };
        if published.record.variable_name != *trigger {
            return;
        }

        info!(variable = %trigger, "Running post-publication hook");
        if let Err(e) = hook.on_published(&published.record, &published.dataset).await {
            error!(error = %e, "Post-publication hook failed");
        }
    }
}

async fn acknowledge(queue: &dyn MessageQueue, message: &QueueMessage) -> Result<()> {
    info!(receipt_handle = %message.receipt_handle, "Deleting message");
    queue.delete(&message.receipt_handle).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_failures_are_left_on_queue() {
        assert!(ProcessingOutcome::NotWanted(Wantedness::UnknownVariable).should_ack());
        assert!(ProcessingOutcome::AlreadyPublished("k".into()).should_ack());
        assert!(ProcessingOutcome::Quarantined("bad".into()).should_ack());
        assert!(!ProcessingOutcome::Failed("boom".into()).should_ack());
    }

    #[test]
    fn test_report_counts() {
        let mut report = CycleReport::default();
        report.record(&ProcessingOutcome::NotWanted(Wantedness::TooManyReceives));
        report.record(&ProcessingOutcome::Failed("x".into()));
        report.record(&ProcessingOutcome::Failed("y".into()));
        assert_eq!(report.not_wanted, 1);
        assert_eq!(report.failed, 2);
        assert_eq!(report.published, 0);
    }

    #[test]
    fn test_default_settings() {
        let settings = PipelineSettings::default();
        assert_eq!(settings.max_receive_count, 10);
        assert_eq!(settings.receive.max_messages, 10);
        assert_eq!(settings.receive.wait_time, Duration::from_secs(20));
        assert!(settings.quarantine_invalid_envelopes);
    }
}
