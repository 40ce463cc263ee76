//! Desired-field catalog and the wantedness filter.
//!
//! Defines which NWP fields, and at which vertical levels, the pipeline
//! keeps. [`is_wanted`] is the only place that decides whether a record is
//! processed.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::message::{AvailabilityRecord, VerticalLevels};

/// Receive count above which a record is treated as a poison message.
pub const DEFAULT_MAX_RECEIVE_COUNT: u32 = 10;

/// One catalog entry as it appears in configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DesiredField {
    /// Variable name (e.g., "wind_speed")
    pub name: String,
    /// Heights (m) that must all be present; `None` accepts any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heights: Option<Vec<f64>>,
}

impl DesiredField {
    pub fn any_level(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            heights: None,
        }
    }

    pub fn with_heights(name: impl Into<String>, heights: impl IntoIterator<Item = f64>) -> Self {
        Self {
            name: name.into(),
            heights: Some(heights.into_iter().collect()),
        }
    }
}

/// Immutable mapping from variable name to an optional required level set.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DesiredFieldCatalog {
    fields: BTreeMap<String, Option<VerticalLevels>>,
}

impl DesiredFieldCatalog {
    /// Catalog of names wanted at any (or no) vertical resolution.
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            fields: names.into_iter().map(|n| (n.into(), None)).collect(),
        }
    }

    /// Catalog with per-field height constraints. Later entries for the same
    /// name replace earlier ones.
    pub fn from_fields<'a>(fields: impl IntoIterator<Item = &'a DesiredField>) -> Self {
        Self {
            fields: fields
                .into_iter()
                .map(|f| {
                    (
                        f.name.clone(),
                        f.heights.as_ref().map(|h| VerticalLevels::new(h.iter().copied())),
                    )
                })
                .collect(),
        }
    }

    /// Required levels for a variable: `None` if the variable is not wanted,
    /// `Some(None)` if it is wanted without a height constraint.
    pub fn requirement(&self, variable_name: &str) -> Option<Option<&VerticalLevels>> {
        self.fields.get(variable_name).map(Option::as_ref)
    }

    pub fn contains(&self, variable_name: &str) -> bool {
        self.fields.contains_key(variable_name)
    }

    pub fn variable_names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Why a record was or was not wanted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wantedness {
    Wanted,
    /// Redelivered more often than the ceiling allows
    TooManyReceives,
    /// Variable is not in the catalog
    UnknownVariable,
    /// Variable is in the catalog but some required heights are absent
    MissingLevels,
}

impl Wantedness {
    pub fn is_wanted(self) -> bool {
        self == Wantedness::Wanted
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Wantedness::Wanted => "wanted",
            Wantedness::TooManyReceives => "too_many_receives",
            Wantedness::UnknownVariable => "unknown_variable",
            Wantedness::MissingLevels => "missing_levels",
        }
    }
}

/// Decide whether a record should be processed, and why.
pub fn evaluate(
    record: &AvailabilityRecord,
    catalog: &DesiredFieldCatalog,
    max_receive_count: u32,
) -> Wantedness {
    if record.approx_receive_count > max_receive_count {
        return Wantedness::TooManyReceives;
    }

    match catalog.requirement(&record.variable_name) {
        None => Wantedness::UnknownVariable,
        Some(None) => Wantedness::Wanted,
        Some(Some(required)) if record.vertical_levels.is_superset_of(required) => {
            Wantedness::Wanted
        }
        Some(Some(_)) => Wantedness::MissingLevels,
    }
}

/// Returns `true` if this record describes an NWP extract we want.
///
/// Records received more than `max_receive_count` times are never wanted, so
/// that an extract which keeps failing is eventually dropped.
pub fn is_wanted(
    record: &AvailabilityRecord,
    catalog: &DesiredFieldCatalog,
    max_receive_count: u32,
) -> bool {
    evaluate(record, catalog, max_receive_count).is_wanted()
}
