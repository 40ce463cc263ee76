//! Deterministic destination keys for published datasets.
//!
//! Layout:
//!
//! ```text
//! {base}/{model}/{variable}/{YYYY}/m{MM}/d{DD}/h{HH}/{model}__{variable}__{ref:%Y-%m-%dT%H}__{valid:%Y-%m-%dT%H}.zarr
//! ```
//!
//! The date directories come from the forecast reference time, so every
//! valid time of one model run lands in the same directory.

use chrono::{DateTime, Utc};
use std::fmt;

use crate::message::AvailabilityRecord;

/// Extension of the published container.
pub const DEFAULT_EXTENSION: &str = "zarr";

/// Name of the root metadata object written last to complete a dataset.
pub const COMMIT_OBJECT: &str = "zarr.json";

/// Output address of one published extract.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PublicationTarget {
    key: String,
}

impl PublicationTarget {
    /// Derive the target for a record under `base_path`.
    pub fn for_record(record: &AvailabilityRecord, base_path: &str) -> Self {
        Self::new(
            base_path,
            &record.model_name,
            &record.variable_name,
            record.forecast_reference_time,
            record.valid_time,
            DEFAULT_EXTENSION,
        )
    }

    pub fn new(
        base_path: &str,
        model_name: &str,
        variable_name: &str,
        forecast_reference_time: DateTime<Utc>,
        valid_time: DateTime<Utc>,
        extension: &str,
    ) -> Self {
        let directory = format!(
            "{}/{}/{}",
            model_name,
            variable_name,
            forecast_reference_time.format("%Y/m%m/d%d/h%H")
        );
        let basename = format!(
            "{}__{}__{}__{}.{}",
            model_name,
            variable_name,
            forecast_reference_time.format("%Y-%m-%dT%H"),
            valid_time.format("%Y-%m-%dT%H"),
            extension
        );

        let key = [base_path.trim_matches('/'), directory.as_str(), basename.as_str()]
            .iter()
            .filter(|part| !part.is_empty())
            .copied()
            .collect::<Vec<_>>()
            .join("/");

        Self { key }
    }

    /// Full object key of the dataset root.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Directory portion of the key.
    pub fn prefix(&self) -> &str {
        self.key.rsplit_once('/').map(|(dir, _)| dir).unwrap_or("")
    }

    /// File name portion of the key.
    pub fn file_name(&self) -> &str {
        self.key.rsplit_once('/').map(|(_, name)| name).unwrap_or(&self.key)
    }

    /// Key of an object inside the dataset.
    pub fn child(&self, relative: &str) -> String {
        format!("{}/{}", self.key, relative.trim_start_matches('/'))
    }

    /// Key whose presence marks the dataset as completely published.
    pub fn commit_key(&self) -> String {
        self.child(COMMIT_OBJECT)
    }
}

impl fmt::Display for PublicationTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key)
    }
}

/// Compute the destination key of a record under `base_path`.
pub fn derive_key(record: &AvailabilityRecord, base_path: &str) -> String {
    PublicationTarget::for_record(record, base_path).key
}
