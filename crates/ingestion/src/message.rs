//! Decoding of queue notifications into availability records.
//!
//! A notification arrives as a queue message whose body is itself a JSON
//! object; its `Message` field holds a second JSON document (as a string)
//! describing one NetCDF extract:
//!
//! ```json
//! {
//!   "name": "wind_speed",
//!   "height": "5.0 10.0 50.0",
//!   "bucket": "aws-earth-mo-atmospheric-mogreps-uk-prd",
//!   "key": "f721851d2a5487bf08d1f8ac0ff2c9c05bb02892.nc",
//!   "object_size": 104558876,
//!   "model": "mo-atmospheric-mogreps-uk-prd",
//!   "forecast_reference_time": "2020-05-28T20:00:00Z",
//!   "created_time": "2020-05-28T22:39:18Z",
//!   "time": "2020-06-01T22:00:00Z"
//! }
//! ```

use chrono::{DateTime, SecondsFormat, TimeZone, Utc};
use serde::Deserialize;
use std::fmt;

use storage::queue::{QueueMessage, APPROXIMATE_RECEIVE_COUNT, SENT_TIMESTAMP};

use crate::error::{IngestionError, Result};

/// Set of heights (meters) at which a field is provided.
///
/// Stored sorted and de-duplicated; comparisons are exact.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VerticalLevels(Vec<f64>);

impl VerticalLevels {
    pub fn new(levels: impl IntoIterator<Item = f64>) -> Self {
        let mut levels: Vec<f64> = levels.into_iter().collect();
        levels.sort_by(|a, b| a.total_cmp(b));
        levels.dedup();
        Self(levels)
    }

    /// Parse a whitespace-delimited list such as `"5.0 10.0 50.0"`.
    pub fn parse(text: &str) -> Result<Self> {
        let levels = text
            .split_whitespace()
            .map(|token| {
                token.parse::<f64>().ok().filter(|v| v.is_finite()).ok_or_else(|| {
                    IngestionError::MalformedEnvelope(format!("invalid height '{}'", token))
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::new(levels))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, level: f64) -> bool {
        self.0.iter().any(|l| *l == level)
    }

    /// Whether every level in `required` is present here.
    pub fn is_superset_of(&self, required: &VerticalLevels) -> bool {
        required.0.iter().all(|level| self.contains(*level))
    }

    pub fn iter(&self) -> impl Iterator<Item = f64> + '_ {
        self.0.iter().copied()
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }
}

impl FromIterator<f64> for VerticalLevels {
    fn from_iter<I: IntoIterator<Item = f64>>(iter: I) -> Self {
        Self::new(iter)
    }
}

/// Where the announced extract can be fetched from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLocation {
    pub bucket: String,
    pub key: String,
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.bucket, self.key)
    }
}

/// One decoded NWP extract announcement plus its delivery metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct AvailabilityRecord {
    pub variable_name: String,
    pub vertical_levels: VerticalLevels,
    pub model_name: String,
    pub forecast_reference_time: DateTime<Utc>,
    pub valid_time: DateTime<Utc>,
    pub created_time: DateTime<Utc>,
    pub source_location: SourceLocation,
    pub object_size_bytes: u64,
    pub approx_receive_count: u32,
    pub sent_timestamp: DateTime<Utc>,
    pub message_id: String,
    pub ack_token: String,
}

impl AvailabilityRecord {
    /// True if the extract covers more than one vertical level.
    pub fn is_multi_level(&self) -> bool {
        self.vertical_levels.len() > 1
    }

    pub fn object_size_mb(&self) -> f64 {
        self.object_size_bytes as f64 / 1e6
    }

    pub fn source_url(&self) -> String {
        self.source_location.to_string()
    }
}

impl fmt::Display for AvailabilityRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "var_name={}; is_multi_level={}; object_size={:.1} MB; model={}; \
             SQS_message_sent_timestamp={}; forecast_reference_time={}; created_time={}; \
             time={}; source_url={}; SQS_approx_receive_count={}; SQS_message_ID={}",
            self.variable_name,
            if self.is_multi_level() { "True" } else { "False" },
            self.object_size_mb(),
            self.model_name,
            self.sent_timestamp.format("%Y-%m-%dT%H:%M:%S%.6f"),
            rfc3339(&self.forecast_reference_time),
            rfc3339(&self.created_time),
            rfc3339(&self.valid_time),
            self.source_url(),
            self.approx_receive_count,
            self.message_id,
        )
    }
}

fn rfc3339(t: &DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Secs, true)
}

#[derive(Deserialize)]
struct NotificationBody {
    #[serde(rename = "Message")]
    message: String,
}

#[derive(Deserialize)]
struct NotificationPayload {
    name: String,
    #[serde(default)]
    height: Option<serde_json::Value>,
    bucket: String,
    key: String,
    object_size: u64,
    model: String,
    forecast_reference_time: DateTime<Utc>,
    created_time: DateTime<Utc>,
    time: DateTime<Utc>,
}

/// Check the body against its MD5 digest (hex, case-insensitive).
pub fn verify_body_digest(message: &QueueMessage) -> Result<()> {
    let computed = format!("{:x}", md5::compute(message.body.as_bytes()));
    if computed.eq_ignore_ascii_case(message.md5_of_body.trim()) {
        Ok(())
    } else {
        Err(IngestionError::Integrity {
            message_id: message.message_id.clone(),
            expected: message.md5_of_body.clone(),
            computed,
        })
    }
}

/// Verify and decode a queue message into an [`AvailabilityRecord`].
pub fn parse_envelope(message: &QueueMessage) -> Result<AvailabilityRecord> {
    verify_body_digest(message)?;

    let body: NotificationBody = serde_json::from_str(&message.body)
        .map_err(|e| IngestionError::MalformedEnvelope(format!("body: {}", e)))?;
    let payload: NotificationPayload = serde_json::from_str(&body.message)
        .map_err(|e| IngestionError::MalformedEnvelope(format!("Message: {}", e)))?;

    let vertical_levels = match payload.height {
        None | Some(serde_json::Value::Null) => VerticalLevels::default(),
        Some(serde_json::Value::String(text)) => VerticalLevels::parse(&text)?,
        Some(serde_json::Value::Number(n)) => VerticalLevels::new(n.as_f64()),
        Some(other) => {
            return Err(IngestionError::MalformedEnvelope(format!(
                "unexpected height value: {}",
                other
            )))
        }
    };

    let approx_receive_count = attribute(message, APPROXIMATE_RECEIVE_COUNT)?
        .parse::<u32>()
        .map_err(|e| {
            IngestionError::MalformedEnvelope(format!("{}: {}", APPROXIMATE_RECEIVE_COUNT, e))
        })?;

    let sent_millis = attribute(message, SENT_TIMESTAMP)?
        .parse::<i64>()
        .map_err(|e| IngestionError::MalformedEnvelope(format!("{}: {}", SENT_TIMESTAMP, e)))?;
    let sent_timestamp = Utc.timestamp_millis_opt(sent_millis).single().ok_or_else(|| {
        IngestionError::MalformedEnvelope(format!("{} out of range: {}", SENT_TIMESTAMP, sent_millis))
    })?;

    Ok(AvailabilityRecord {
        variable_name: payload.name,
        vertical_levels,
        model_name: payload.model,
        forecast_reference_time: payload.forecast_reference_time,
        valid_time: payload.time,
        created_time: payload.created_time,
        source_location: SourceLocation {
            bucket: payload.bucket,
            key: payload.key,
        },
        object_size_bytes: payload.object_size,
        approx_receive_count,
        sent_timestamp,
        message_id: message.message_id.clone(),
        ack_token: message.receipt_handle.clone(),
    })
}

fn attribute<'a>(message: &'a QueueMessage, name: &str) -> Result<&'a str> {
    message
        .attributes
        .get(name)
        .map(String::as_str)
        .ok_or_else(|| IngestionError::MalformedEnvelope(format!("missing attribute {}", name)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn envelope(payload: serde_json::Value, receive_count: u32) -> QueueMessage {
        let body = serde_json::json!({
            "Type": "Notification",
            "Message": payload.to_string(),
        })
        .to_string();
        let mut attributes = HashMap::new();
        attributes.insert(APPROXIMATE_RECEIVE_COUNT.to_string(), receive_count.to_string());
        attributes.insert(SENT_TIMESTAMP.to_string(), "1590792230383".to_string());
        QueueMessage {
            md5_of_body: format!("{:x}", md5::compute(body.as_bytes())),
            body,
            attributes,
            message_id: "2f868f8c-a695-4654-99fc-7b6f73cdbd93".to_string(),
            receipt_handle: "receipt-1".to_string(),
        }
    }

    fn multi_level_wind() -> serde_json::Value {
        serde_json::json!({
            "name": "wind_speed",
            "height": "5.0 10.0 20.0 50.0 100.0 150.0 200.0 250.0 300.0",
            "bucket": "aws-earth-mo-atmospheric-mogreps-uk-prd",
            "key": "f721851d2a5487bf08d1f8ac0ff2c9c05bb02892.nc",
            "object_size": 104558876,
            "model": "mo-atmospheric-mogreps-uk-prd",
            "forecast_reference_time": "2020-05-28T20:00:00Z",
            "created_time": "2020-05-28T22:39:18Z",
            "time": "2020-06-01T22:00:00Z"
        })
    }

    #[test]
    fn test_parse_multi_level_wind() {
        let record = parse_envelope(&envelope(multi_level_wind(), 1)).unwrap();

        assert_eq!(record.variable_name, "wind_speed");
        assert!(record.is_multi_level());
        assert_eq!(record.vertical_levels.len(), 9);
        assert!(record.vertical_levels.contains(150.0));
        assert_eq!(record.approx_receive_count, 1);
        assert_eq!(record.ack_token, "receipt-1");
        assert_eq!(
            record.forecast_reference_time,
            Utc.with_ymd_and_hms(2020, 5, 28, 20, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_display_matches_log_format() {
        let record = parse_envelope(&envelope(multi_level_wind(), 1)).unwrap();
        assert_eq!(
            record.to_string(),
            "var_name=wind_speed; is_multi_level=True; object_size=104.6 MB; \
             model=mo-atmospheric-mogreps-uk-prd; \
             SQS_message_sent_timestamp=2020-05-29T22:43:50.383000; \
             forecast_reference_time=2020-05-28T20:00:00Z; created_time=2020-05-28T22:39:18Z; \
             time=2020-06-01T22:00:00Z; \
             source_url=aws-earth-mo-atmospheric-mogreps-uk-prd/f721851d2a5487bf08d1f8ac0ff2c9c05bb02892.nc; \
             SQS_approx_receive_count=1; SQS_message_ID=2f868f8c-a695-4654-99fc-7b6f73cdbd93"
        );
    }

    #[test]
    fn test_missing_height_is_single_level() {
        let mut payload = multi_level_wind();
        payload.as_object_mut().unwrap().remove("height");
        let record = parse_envelope(&envelope(payload, 1)).unwrap();
        assert!(record.vertical_levels.is_empty());
        assert!(!record.is_multi_level());
    }

    #[test]
    fn test_digest_mismatch_is_integrity_error() {
        let mut message = envelope(multi_level_wind(), 1);
        message.md5_of_body = "00000000000000000000000000000000".to_string();
        let err = parse_envelope(&message).unwrap_err();
        assert!(matches!(err, IngestionError::Integrity { .. }));
        assert!(err.is_envelope_error());
    }

    #[test]
    fn test_digest_is_case_insensitive() {
        let mut message = envelope(multi_level_wind(), 1);
        message.md5_of_body = message.md5_of_body.to_uppercase();
        assert!(parse_envelope(&message).is_ok());
    }

    #[test]
    fn test_missing_receive_count_is_malformed() {
        let mut message = envelope(multi_level_wind(), 1);
        message.attributes.remove(APPROXIMATE_RECEIVE_COUNT);
        assert!(matches!(
            parse_envelope(&message),
            Err(IngestionError::MalformedEnvelope(_))
        ));
    }

    #[test]
    fn test_bad_height_is_malformed() {
        let mut payload = multi_level_wind();
        payload["height"] = serde_json::json!("10.0 tall");
        assert!(matches!(
            parse_envelope(&envelope(payload, 1)),
            Err(IngestionError::MalformedEnvelope(_))
        ));
    }

    #[test]
    fn test_levels_are_a_set() {
        let a = VerticalLevels::parse("150 5 10 10 50").unwrap();
        let b = VerticalLevels::new([5.0, 10.0, 50.0, 150.0]);
        assert_eq!(a, b);
        assert!(a.is_superset_of(&VerticalLevels::new([50.0, 5.0])));
        assert!(!a.is_superset_of(&VerticalLevels::new([100.0])));
    }
}
