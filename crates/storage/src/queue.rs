//! Notification queue access.
//!
//! [`MessageQueue`] is the seam between the ingestion loop and the queue
//! service. [`SqsQueue`] talks to Amazon SQS; [`MemoryQueue`] keeps messages
//! in process and models receive counts and visibility so the loop's
//! acknowledgement behaviour can be exercised without AWS.

use async_trait::async_trait;
use aws_sdk_sqs::error::DisplayErrorContext;
use aws_sdk_sqs::types::MessageSystemAttributeName;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, instrument};
use uuid::Uuid;

use nwp_common::{NwpError, NwpResult};

/// Attribute carrying how many times a message has been handed out.
pub const APPROXIMATE_RECEIVE_COUNT: &str = "ApproximateReceiveCount";
/// Attribute carrying when the message was sent, in epoch milliseconds.
pub const SENT_TIMESTAMP: &str = "SentTimestamp";

/// A raw message as delivered by the queue.
///
/// Field names follow the SQS wire format so that captured messages can be
/// loaded straight from JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueMessage {
    #[serde(rename = "Body")]
    pub body: String,
    #[serde(rename = "MD5OfBody")]
    pub md5_of_body: String,
    #[serde(rename = "Attributes", default)]
    pub attributes: HashMap<String, String>,
    #[serde(rename = "MessageId")]
    pub message_id: String,
    #[serde(rename = "ReceiptHandle")]
    pub receipt_handle: String,
}

/// Parameters of one receive call.
#[derive(Debug, Clone, PartialEq)]
pub struct ReceiveRequest {
    /// Upper bound on messages returned (SQS allows 1..=10)
    pub max_messages: i32,
    /// Long-poll wait
    pub wait_time: Duration,
}

impl Default for ReceiveRequest {
    fn default() -> Self {
        Self {
            max_messages: 10,
            wait_time: Duration::from_secs(20),
        }
    }
}

/// A queue the ingestion loop can poll and acknowledge against.
#[async_trait]
pub trait MessageQueue: Send + Sync {
    /// Receive up to `request.max_messages`, waiting at most
    /// `request.wait_time` for the first one. The receive-count and
    /// sent-timestamp attributes are always requested.
    async fn receive(&self, request: &ReceiveRequest) -> NwpResult<Vec<QueueMessage>>;

    /// Permanently remove a received message.
    async fn delete(&self, receipt_handle: &str) -> NwpResult<()>;
}

// ============================================================================
// Amazon SQS
// ============================================================================

/// Amazon SQS queue client.
pub struct SqsQueue {
    client: aws_sdk_sqs::Client,
    queue_url: String,
}

impl SqsQueue {
    /// Build a client for `queue_url` using the default AWS credential chain.
    pub async fn connect(queue_url: &str, region: &str) -> Self {
        let config = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(aws_config::Region::new(region.to_string()))
            .load()
            .await;

        Self::from_client(aws_sdk_sqs::Client::new(&config), queue_url)
    }

    pub fn from_client(client: aws_sdk_sqs::Client, queue_url: &str) -> Self {
        Self {
            client,
            queue_url: queue_url.to_string(),
        }
    }

    pub fn queue_url(&self) -> &str {
        &self.queue_url
    }
}

#[async_trait]
impl MessageQueue for SqsQueue {
    #[instrument(skip(self), fields(queue = %self.queue_url))]
    async fn receive(&self, request: &ReceiveRequest) -> NwpResult<Vec<QueueMessage>> {
        let output = self
            .client
            .receive_message()
            .queue_url(&self.queue_url)
            .max_number_of_messages(request.max_messages)
            .wait_time_seconds(request.wait_time.as_secs() as i32)
            .message_system_attribute_names(MessageSystemAttributeName::ApproximateReceiveCount)
            .message_system_attribute_names(MessageSystemAttributeName::SentTimestamp)
            .send()
            .await
            .map_err(|e| {
                NwpError::QueueError(format!("ReceiveMessage failed: {}", DisplayErrorContext(&e)))
            })?;

        let mut messages = Vec::with_capacity(output.messages().len());
        for message in output.messages() {
            let attributes = message
                .attributes()
                .map(|attrs| {
                    attrs
                        .iter()
                        .map(|(name, value)| (name.as_str().to_string(), value.clone()))
                        .collect()
                })
                .unwrap_or_default();

            messages.push(QueueMessage {
                body: message.body().unwrap_or_default().to_string(),
                md5_of_body: message.md5_of_body().unwrap_or_default().to_string(),
                attributes,
                message_id: message.message_id().unwrap_or_default().to_string(),
                receipt_handle: message.receipt_handle().unwrap_or_default().to_string(),
            });
        }

        debug!(count = messages.len(), "Received messages");
        Ok(messages)
    }

    #[instrument(skip(self, receipt_handle), fields(queue = %self.queue_url))]
    async fn delete(&self, receipt_handle: &str) -> NwpResult<()> {
        self.client
            .delete_message()
            .queue_url(&self.queue_url)
            .receipt_handle(receipt_handle)
            .send()
            .await
            .map_err(|e| {
                NwpError::QueueError(format!("DeleteMessage failed: {}", DisplayErrorContext(&e)))
            })?;

        Ok(())
    }
}

// ============================================================================
// In-memory queue
// ============================================================================

#[derive(Debug)]
struct StoredMessage {
    message_id: String,
    body: String,
    md5_of_body: String,
    sent_timestamp_ms: i64,
    receive_count: u32,
    receipt_handle: Option<String>,
}

#[derive(Debug, Default)]
struct MemoryQueueState {
    messages: Vec<StoredMessage>,
    deleted: Vec<String>,
}

/// In-process queue with SQS-like receive counts and visibility.
///
/// A received message stays invisible until it is deleted or until
/// [`MemoryQueue::expire_visibility`] returns it to the queue, at which
/// point the next receive increments its receive count.
#[derive(Debug, Default)]
pub struct MemoryQueue {
    state: Mutex<MemoryQueueState>,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, MemoryQueueState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Enqueue a body with a correct MD5 digest. Returns the message id.
    pub fn send(&self, body: impl Into<String>) -> String {
        let body = body.into();
        let digest = format!("{:x}", md5::compute(body.as_bytes()));
        self.send_with_digest(body, digest)
    }

    /// Enqueue a body with an arbitrary digest (to simulate corruption).
    pub fn send_with_digest(&self, body: impl Into<String>, md5_of_body: impl Into<String>) -> String {
        let message_id = Uuid::new_v4().to_string();
        self.state().messages.push(StoredMessage {
            message_id: message_id.clone(),
            body: body.into(),
            md5_of_body: md5_of_body.into(),
            sent_timestamp_ms: chrono::Utc::now().timestamp_millis(),
            receive_count: 0,
            receipt_handle: None,
        });
        message_id
    }

    /// Make every in-flight message visible again, as if its visibility
    /// timeout had elapsed.
    pub fn expire_visibility(&self) {
        for message in self.state().messages.iter_mut() {
            message.receipt_handle = None;
        }
    }

    /// Messages not yet deleted (visible or in flight).
    pub fn len(&self) -> usize {
        self.state().messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Messages currently received but not deleted.
    pub fn in_flight(&self) -> usize {
        self.state()
            .messages
            .iter()
            .filter(|m| m.receipt_handle.is_some())
            .count()
    }

    /// Ids of deleted messages, in deletion order.
    pub fn deleted(&self) -> Vec<String> {
        self.state().deleted.clone()
    }

    /// Receive count of a message still in the queue.
    pub fn receive_count(&self, message_id: &str) -> Option<u32> {
        self.state()
            .messages
            .iter()
            .find(|m| m.message_id == message_id)
            .map(|m| m.receive_count)
    }
}

#[async_trait]
impl MessageQueue for MemoryQueue {
    async fn receive(&self, request: &ReceiveRequest) -> NwpResult<Vec<QueueMessage>> {
        let limit = request.max_messages.clamp(1, 10) as usize;
        let mut state = self.state();

        let received = state
            .messages
            .iter_mut()
            .filter(|m| m.receipt_handle.is_none())
            .take(limit)
            .map(|m| {
                m.receive_count += 1;
                let handle = Uuid::new_v4().to_string();
                m.receipt_handle = Some(handle.clone());

                let mut attributes = HashMap::new();
                attributes.insert(
                    APPROXIMATE_RECEIVE_COUNT.to_string(),
                    m.receive_count.to_string(),
                );
                attributes.insert(SENT_TIMESTAMP.to_string(), m.sent_timestamp_ms.to_string());

                QueueMessage {
                    body: m.body.clone(),
                    md5_of_body: m.md5_of_body.clone(),
                    attributes,
                    message_id: m.message_id.clone(),
                    receipt_handle: handle,
                }
            })
            .collect();

        Ok(received)
    }

    async fn delete(&self, receipt_handle: &str) -> NwpResult<()> {
        let mut state = self.state();
        let position = state
            .messages
            .iter()
            .position(|m| m.receipt_handle.as_deref() == Some(receipt_handle))
            .ok_or_else(|| {
                NwpError::QueueError(format!("Unknown receipt handle: {}", receipt_handle))
            })?;

        let removed = state.messages.remove(position);
        state.deleted.push(removed.message_id);
        Ok(())
    }
}
