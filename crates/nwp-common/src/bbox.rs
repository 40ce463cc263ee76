//! Bounding box types and operations.

use serde::{Deserialize, Serialize};

use crate::error::{NwpError, NwpResult};

/// A projected bounding box.
///
/// Coordinates are in the native projection of the source grid (for the
/// Met Office UK models this is Lambert Azimuthal Equal Area, in meters).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl BoundingBox {
    /// Create a new bounding box from corner coordinates.
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    /// Create a bounding box from compass bounds.
    pub fn from_bounds(north: f64, south: f64, east: f64, west: f64) -> NwpResult<Self> {
        let bbox = Self::new(west, south, east, north);
        bbox.validate()?;
        Ok(bbox)
    }

    /// Check that min <= max on both axes and that all bounds are finite.
    pub fn validate(&self) -> NwpResult<()> {
        let finite = [self.min_x, self.min_y, self.max_x, self.max_y]
            .iter()
            .all(|v| v.is_finite());
        if !finite {
            return Err(NwpError::InvalidBbox(format!(
                "non-finite bound in {:?}",
                self
            )));
        }
        if self.min_x > self.max_x || self.min_y > self.max_y {
            return Err(NwpError::InvalidBbox(format!(
                "minimum exceeds maximum in {:?}",
                self
            )));
        }
        Ok(())
    }

    pub fn north(&self) -> f64 {
        self.max_y
    }

    pub fn south(&self) -> f64 {
        self.min_y
    }

    pub fn east(&self) -> f64 {
        self.max_x
    }

    pub fn west(&self) -> f64 {
        self.min_x
    }

    /// Width of the bounding box in coordinate units.
    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    /// Height of the bounding box in coordinate units.
    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    /// Whether an x coordinate lies within [min_x, max_x].
    pub fn contains_x(&self, x: f64) -> bool {
        x >= self.min_x && x <= self.max_x
    }

    /// Whether a y coordinate lies within [min_y, max_y].
    pub fn contains_y(&self, y: f64) -> bool {
        y >= self.min_y && y <= self.max_y
    }

    /// Check if a point is contained within this bbox.
    pub fn contains_point(&self, x: f64, y: f64) -> bool {
        self.contains_x(x) && self.contains_y(y)
    }
}
