//! Per-cycle AWS clients.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

use ingestion::{
    ClientFactory, CycleClients, DatasetEncoder, ObjectStoreFetcher, PublishMode, Publisher,
};
use storage::{ObjectStorage, SqsQueue};

use crate::config::IngesterConfig;

/// Builds fresh SQS and S3 clients at the start of every cycle, so that
/// credentials and connections never outlive one poll.
pub struct AwsClientFactory {
    config: IngesterConfig,
    encoder: Arc<dyn DatasetEncoder>,
}

impl AwsClientFactory {
    pub fn new(config: IngesterConfig, encoder: Arc<dyn DatasetEncoder>) -> Self {
        Self { config, encoder }
    }

    fn publish_mode(&self) -> PublishMode {
        self.config.destination.publish_mode()
    }
}

#[async_trait]
impl ClientFactory for AwsClientFactory {
    async fn connect(&self) -> ingestion::Result<CycleClients> {
        debug!(queue = %self.config.queue.url, "Creating cycle clients");

        let queue = SqsQueue::connect(&self.config.queue.url, &self.config.queue.region).await;
        let source = ObjectStoreFetcher::new(self.config.source.clone());
        let destination = ObjectStorage::new(&self.config.destination.storage)?;

        Ok(CycleClients {
            queue: Arc::new(queue),
            source: Arc::new(source),
            publisher: Publisher::new(destination, self.encoder.clone(), self.publish_mode()),
        })
    }
}
