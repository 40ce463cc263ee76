//! NWP availability-notification ingestion library.
//!
//! Turns queue notifications about newly available Met Office NWP extracts
//! into subsetted Zarr datasets in object storage.
//!
//! # Architecture
//!
//! ```text
//! queue message -> envelope parser -> wantedness filter -> fetch
//!   -> decode + subset -> destination key -> idempotent publisher -> hook
//! ```
//!
//! - [`message`]: integrity check and double-JSON envelope decoding
//! - [`catalog`]: desired-field catalog and the wantedness filter
//! - [`target`]: deterministic destination keys
//! - [`publisher`]: at-most-once publication behind a commit object
//! - [`pipeline`]: the polling loop that ties it together

pub mod catalog;
pub mod error;
pub mod hook;
pub mod message;
pub mod pipeline;
pub mod publisher;
pub mod source;
pub mod subset;
pub mod target;
pub mod timer;
pub mod transform;
mod upload;
pub mod zarr;

// Re-exports
pub use catalog::{evaluate, is_wanted, DesiredField, DesiredFieldCatalog, Wantedness};
pub use error::{IngestionError, Result};
pub use hook::{NoopHook, PublishHook};
pub use message::{parse_envelope, AvailabilityRecord, SourceLocation, VerticalLevels};
pub use pipeline::{
    ClientFactory, CycleClients, CycleReport, Pipeline, PipelineSettings, ProcessingOutcome,
    PublishedDataset,
};
pub use publisher::{Publication, PublishMode, Publisher};
pub use source::{ObjectStoreFetcher, SourceFetcher};
pub use subset::SubsetSpec;
pub use target::{derive_key, PublicationTarget};
pub use transform::{DatasetTransform, NetCdfTransform};
pub use upload::{upload_directory, UploadSummary};
pub use zarr::{DatasetEncoder, ZarrCompression, ZarrSettings, ZarrWriter};
