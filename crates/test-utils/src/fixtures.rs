//! Common test fixtures: notification envelopes and source constants.

use std::collections::HashMap;

use chrono::{DateTime, TimeZone, Utc};
use storage::queue::{QueueMessage, APPROXIMATE_RECEIVE_COUNT, SENT_TIMESTAMP};

/// Source bucket of MOGREPS-UK extracts.
pub const MOGREPS_UK_BUCKET: &str = "aws-earth-mo-atmospheric-mogreps-uk-prd";

/// Model name carried by MOGREPS-UK notifications.
pub const MOGREPS_UK_MODEL: &str = "mo-atmospheric-mogreps-uk-prd";

/// Sent timestamp (epoch ms) used by fixture envelopes.
pub const FIXTURE_SENT_TIMESTAMP_MS: i64 = 1_590_792_230_383;

/// Builder for availability notifications as delivered by the queue.
#[derive(Debug, Clone)]
pub struct NotificationBuilder {
    pub name: String,
    pub height: Option<String>,
    pub bucket: String,
    pub key: String,
    pub object_size: u64,
    pub model: String,
    pub forecast_reference_time: DateTime<Utc>,
    pub created_time: DateTime<Utc>,
    pub time: DateTime<Utc>,
}

impl NotificationBuilder {
    /// A single-level notification for `name`.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            height: None,
            bucket: MOGREPS_UK_BUCKET.to_string(),
            key: format!("{}.nc", name),
            object_size: 1_024,
            model: MOGREPS_UK_MODEL.to_string(),
            forecast_reference_time: Utc.with_ymd_and_hms(2020, 5, 28, 20, 0, 0).unwrap(),
            created_time: Utc.with_ymd_and_hms(2020, 5, 28, 22, 39, 18).unwrap(),
            time: Utc.with_ymd_and_hms(2020, 6, 1, 22, 0, 0).unwrap(),
        }
    }

    pub fn heights(mut self, heights: &[f64]) -> Self {
        self.height = Some(
            heights
                .iter()
                .map(|h| format!("{:.1}", h))
                .collect::<Vec<_>>()
                .join(" "),
        );
        self
    }

    pub fn key(mut self, key: &str) -> Self {
        self.key = key.to_string();
        self
    }

    pub fn valid_time(mut self, time: DateTime<Utc>) -> Self {
        self.time = time;
        self
    }

    /// Inner notification payload.
    pub fn payload(&self) -> serde_json::Value {
        let mut payload = serde_json::json!({
            "name": self.name,
            "bucket": self.bucket,
            "key": self.key,
            "object_size": self.object_size,
            "model": self.model,
            "forecast_reference_time": self.forecast_reference_time.to_rfc3339(),
            "created_time": self.created_time.to_rfc3339(),
            "time": self.time.to_rfc3339(),
        });
        if let Some(height) = &self.height {
            payload["height"] = serde_json::json!(height);
        }
        payload
    }

    /// Queue body: an outer JSON object whose `Message` is the payload
    /// serialized as a string.
    pub fn body(&self) -> String {
        serde_json::json!({
            "Type": "Notification",
            "MessageId": "4d1c6b8e-0000-0000-0000-000000000000",
            "TopicArn": "arn:aws:sns:eu-west-2:021908831235:aws-earth-mo-atmospheric-mogreps-uk-prd",
            "Message": self.payload().to_string(),
        })
        .to_string()
    }

    /// A queue message with a correct digest.
    pub fn message(&self, message_id: &str, receive_count: u32) -> QueueMessage {
        let body = self.body();
        let mut attributes = HashMap::new();
        attributes.insert(APPROXIMATE_RECEIVE_COUNT.to_string(), receive_count.to_string());
        attributes.insert(SENT_TIMESTAMP.to_string(), FIXTURE_SENT_TIMESTAMP_MS.to_string());
        QueueMessage {
            md5_of_body: md5_hex(&body),
            body,
            attributes,
            message_id: message_id.to_string(),
            receipt_handle: format!("receipt-{}", message_id),
        }
    }
}

/// Lowercase hex MD5 of a string.
pub fn md5_hex(text: &str) -> String {
    format!("{:x}", md5::compute(text.as_bytes()))
}
