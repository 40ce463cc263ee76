//! Post-publication callbacks.

use async_trait::async_trait;

use nwp_common::GridField;

use crate::message::AvailabilityRecord;

/// Invoked after a dataset has been freshly published.
///
/// Failures are logged by the caller and never affect acknowledgement.
#[async_trait]
pub trait PublishHook: Send + Sync {
    async fn on_published(&self, record: &AvailabilityRecord, dataset: &GridField) -> anyhow::Result<()>;
}

/// Hook that does nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopHook;

#[async_trait]
impl PublishHook for NoopHook {
    async fn on_published(&self, _record: &AvailabilityRecord, _dataset: &GridField) -> anyhow::Result<()> {
        Ok(())
    }
}
