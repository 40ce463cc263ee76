//! Storage abstractions for the NWP ingestion services.
//!
//! Provides unified interfaces for:
//! - Object storage (S3/local/in-memory) for source extracts and published datasets
//! - The notification queue (SQS) the ingester polls

pub mod object_store;
pub mod queue;

pub use self::object_store::{ObjectStorage, ObjectStorageConfig, StorageBackend};
pub use queue::{MemoryQueue, MessageQueue, QueueMessage, ReceiveRequest, SqsQueue};
