//! Per-system linear PV models.

use serde::{Deserialize, Serialize};
use std::io;
use std::path::Path;
use tracing::info;

use crate::error::{ForecastError, ForecastResult};

/// One PV system and its regression parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PvSystem {
    pub system_id: i64,
    /// Projected x coordinate (m), same projection as the NWP grid
    pub easting: f64,
    /// Projected y coordinate (m)
    pub northing: f64,
    pub longitude: f64,
    pub latitude: f64,
    pub slope: f64,
    pub intercept: f64,
}

impl PvSystem {
    /// Predicted yield for an irradiance value (W m-2).
    pub fn predict(&self, irradiance: f64) -> f64 {
        self.slope * irradiance + self.intercept
    }
}

/// All systems of a fitted model.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PvModel {
    systems: Vec<PvSystem>,
}

impl PvModel {
    pub fn new(systems: Vec<PvSystem>) -> Self {
        Self { systems }
    }

    /// Load a model CSV with columns
    /// `system_id,easting,northing,longitude,latitude,slope,intercept`.
    /// Extra columns are ignored.
    pub fn load(path: &Path) -> ForecastResult<Self> {
        let file = std::fs::File::open(path)?;
        let model = Self::from_reader(file)?;
        info!(path = %path.display(), systems = model.len(), "Loaded PV model");
        Ok(model)
    }

    pub fn from_reader(reader: impl io::Read) -> ForecastResult<Self> {
        let mut csv_reader = csv::Reader::from_reader(reader);
        let systems = csv_reader
            .deserialize()
            .collect::<Result<Vec<PvSystem>, _>>()?;
        if systems.is_empty() {
            return Err(ForecastError::EmptyModel);
        }
        Ok(Self { systems })
    }

    pub fn systems(&self) -> &[PvSystem] {
        &self.systems
    }

    pub fn len(&self) -> usize {
        self.systems.len()
    }

    pub fn is_empty(&self) -> bool {
        self.systems.is_empty()
    }
}
